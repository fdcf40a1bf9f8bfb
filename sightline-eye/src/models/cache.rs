//! Process-lifetime model payload cache

use crate::error::FetchError;
use crate::models::fetcher::{ModelFetcher, ProgressObserver};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Maps model identifiers to downloaded payloads. Entries are never evicted.
///
/// Concurrent misses for the same identifier may both fetch; the last one to
/// finish overwrites the entry with an equally valid payload.
pub struct ModelCache {
    fetcher: Arc<dyn ModelFetcher>,
    entries: RwLock<HashMap<String, Bytes>>,
}

impl ModelCache {
    pub fn new(fetcher: Arc<dyn ModelFetcher>) -> Self {
        Self {
            fetcher,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached payload, fetching and storing it on a miss.
    /// A hit performs no network read and fires no progress callback.
    pub async fn get_or_fetch(
        &self,
        model_identifier: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<Bytes, FetchError> {
        if let Some(bytes) = self.get(model_identifier) {
            debug!("Model cache hit for {}", model_identifier);
            return Ok(bytes);
        }

        debug!("Model cache miss for {}", model_identifier);
        let bytes = self.fetcher.fetch(model_identifier, observer).await?;
        self.entries
            .write()
            .insert(model_identifier.to_string(), bytes.clone());
        info!(
            "Cached model {} ({} bytes, {} entries)",
            model_identifier,
            bytes.len(),
            self.len()
        );
        Ok(bytes)
    }

    pub fn get(&self, model_identifier: &str) -> Option<Bytes> {
        self.entries.read().get(model_identifier).cloned()
    }

    pub fn contains(&self, model_identifier: &str) -> bool {
        self.entries.read().contains_key(model_identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
