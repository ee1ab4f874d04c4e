use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::state::CarrierRecord;

/// Cache entry; records are replaced wholesale, never edited in place
struct CacheEntry {
    record: CarrierRecord,
    cached_at: Instant,
}

/// Address → carrier cache shared by every worker in a batch.
///
/// Lookups take the read lock, inserts take the write lock. Hits hand out
/// clones so no caller can touch the shared record.
pub struct AsnCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl AsnCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, ip: &str) -> Option<CarrierRecord> {
        let entries = self.entries.read();
        entries
            .get(ip)
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| entry.record.clone())
    }

    pub fn insert(&self, ip: &str, record: CarrierRecord) {
        let mut entries = self.entries.write();
        entries.insert(
            ip.to_string(),
            CacheEntry {
                record,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Background sweep that clears the whole cache every `interval`
pub async fn run_cache_sweeper(cache: Arc<AsnCache>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // First tick fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            _ = ticker.tick() => {
                let dropped = cache.len();
                cache.clear();
                debug!(dropped, "swept ASN cache");
            }
        }
    }
}
