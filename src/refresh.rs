//! Periodic feed refresh.
//!
//! PRIMING → STEADY
//!
//! The first download is awaited before the server starts; after that a
//! background task re-downloads on a fixed interval until stopped. Download
//! errors only skip a cycle. A failing cache write ends the task with the
//! error, since the cache could no longer be kept durable.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::FeedCache;
use crate::error::StoreError;
use crate::feed::FeedSource;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// What a single refresh attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    Unchanged,
    Empty,
    FetchFailed,
}

pub struct RefreshLoop<S> {
    cache: Arc<FeedCache>,
    source: Arc<S>,
    url: String,
    interval: Duration,
}

impl<S: FeedSource> RefreshLoop<S> {
    pub fn new(
        cache: Arc<FeedCache>,
        source: Arc<S>,
        url: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            url: url.into(),
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Download the feed once and offer its newest item to the cache.
    ///
    /// Only the first item counts; the feed lists newest first.
    pub async fn refresh_once(&self) -> Result<RefreshOutcome, StoreError> {
        let items = match self.source.fetch(&self.url).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Could not update feed: {e}");
                return Ok(RefreshOutcome::FetchFailed);
            }
        };

        let Some(newest) = items.first() else {
            warn!("Feed at {} has no items", self.url);
            return Ok(RefreshOutcome::Empty);
        };

        if self.cache.set_if_changed(newest)? {
            Ok(RefreshOutcome::Updated)
        } else {
            Ok(RefreshOutcome::Unchanged)
        }
    }

    /// Prime the cache, then keep refreshing in the background.
    ///
    /// A failed first download still starts the loop; the cache keeps its
    /// persisted value until a later cycle succeeds.
    pub async fn start(self) -> Result<RefreshHandle, StoreError> {
        info!("Initial download of {}", self.url);
        if self.refresh_once().await? == RefreshOutcome::FetchFailed {
            info!("Serving cached entry until the feed is reachable");
        }
        Ok(self.spawn())
    }

    fn spawn(self) -> RefreshHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task: JoinHandle<Result<(), StoreError>> = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Refreshing feed every {}s", self.interval.as_secs());

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        info!("Feed refresh stopped");
                        return Ok(());
                    }
                    _ = ticker.tick() => {
                        info!("Updating feed");
                        self.refresh_once().await?;
                    }
                }
            }
        });

        RefreshHandle { cancel, task }
    }
}

/// Stop handle for the background refresh task.
pub struct RefreshHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), StoreError>>,
}

impl RefreshHandle {
    /// Resolves only if the task ends on its own, i.e. a cache write failed.
    pub async fn wait(&mut self) -> Result<(), StoreError> {
        join_result((&mut self.task).await)
    }

    /// Cancel the timer and wait for an in-flight refresh to finish.
    pub async fn stop(self) -> Result<(), StoreError> {
        self.cancel.cancel();
        join_result(self.task.await)
    }
}

fn join_result(
    res: Result<Result<(), StoreError>, tokio::task::JoinError>,
) -> Result<(), StoreError> {
    match res {
        Ok(inner) => inner,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Ok(()),
    }
}
