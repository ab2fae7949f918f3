//! The process-wide feed cache.
//!
//! The feed is refreshed in the background while requests read the cache,
//! so access goes through a reader/writer lock. A write holds the lock for
//! render + persist; readers always see a complete entry.

use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::StoreError;
use crate::feed::FeedItem;
use crate::store::{CacheEntry, CacheStore};
use crate::transform;

pub struct FeedCache {
    entry: RwLock<CacheEntry>,
    store: CacheStore,
}

impl FeedCache {
    /// Load the durable record, creating an empty one on first start.
    ///
    /// Anything other than a missing record is returned as-is; callers treat
    /// it as fatal.
    pub fn init(store: CacheStore) -> Result<Self, StoreError> {
        let entry = match store.load() {
            Ok(entry) => entry,
            Err(StoreError::NotFound(path)) => {
                info!("No cache at {}, creating an empty one", path.display());
                store.save(&CacheEntry::default())?;
                store.load()?
            }
            Err(e) => return Err(e),
        };

        info!(
            "Cache loaded from {} (identity: {:?})",
            store.path().display(),
            entry.identity
        );
        Ok(Self {
            entry: RwLock::new(entry),
            store,
        })
    }

    /// Current `(display_text, voice_markup)`.
    pub fn get(&self) -> (String, String) {
        let entry = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        (entry.display_text.clone(), entry.voice_markup.clone())
    }

    pub fn identity(&self) -> String {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .identity
            .clone()
    }

    /// Replace the entry if `item` is not the one already cached.
    ///
    /// Returns whether the entry changed. The new entry is persisted before it
    /// becomes visible, so memory never runs ahead of the record on disk.
    pub fn set_if_changed(&self, item: &FeedItem) -> Result<bool, StoreError> {
        let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        if entry.identity == item.identity {
            debug!("Feed item {:?} already cached", item.identity);
            return Ok(false);
        }

        let rendered = transform::render(item);
        debug!("-> speech {}", rendered.voice_markup);

        let next = CacheEntry {
            identity: item.identity.clone(),
            display_text: rendered.display_text,
            voice_markup: rendered.voice_markup,
        };
        self.store.save(&next)?;
        *entry = next;

        info!("Cache updated to feed item {:?}", item.identity);
        Ok(true)
    }
}
