//! Feed download.
//!
//! Fetches the wettermail RSS document and maps its items into [`FeedItem`]s,
//! newest first, the way the feed publishes them.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use rss::Channel;
use tracing::debug;

use crate::error::FetchError;

/// One entry of the feed, as handed to the transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    /// Verbatim `pubDate` string, used only for change detection.
    pub identity: String,
    pub title: String,
    pub raw_description: String,
    pub published_at: DateTime<FixedOffset>,
}

/// Anything that can produce the current feed items for a URL.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<FeedItem>, FetchError>> + Send;
}

/// Downloads the feed over HTTP(S).
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = resp.bytes().await?;
        let channel = Channel::read_from(&body[..])?;
        Ok(items_from_channel(&channel))
    }
}

/// Map channel items in document order, stopping at the first item without
/// a usable `pubDate`. An undated newest item yields no items at all, so an
/// older mail is never served as the current one.
fn items_from_channel(channel: &Channel) -> Vec<FeedItem> {
    channel
        .items()
        .iter()
        .map_while(|item| {
            let Some(pub_date) = item.pub_date() else {
                debug!("Feed item without pubDate: {:?}", item.title());
                return None;
            };
            let published_at = match DateTime::parse_from_rfc2822(pub_date.trim()) {
                Ok(date) => date,
                Err(e) => {
                    debug!("Feed item with bad pubDate '{pub_date}': {e}");
                    return None;
                }
            };
            Some(FeedItem {
                identity: pub_date.to_string(),
                title: item.title().unwrap_or_default().to_string(),
                raw_description: item.description().unwrap_or_default().to_string(),
                published_at,
            })
        })
        .collect()
}
