use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct CacheEntry {
    contents: String,
    stored_at: Instant,
    expires_at: Instant,
}

/// Short-lived key/value store for rendered artifacts.
///
/// Keys are fresh random UUIDs, never derived from content, so concurrent
/// writers cannot collide. Entries expire after the TTL; once the store
/// holds more than `threshold` entries, expired entries are pruned first and
/// then the oldest ones.
#[derive(Clone)]
pub struct ArtifactCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
    threshold: usize,
}

impl ArtifactCache {
    pub fn new(ttl: Duration, threshold: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            threshold: threshold.max(1),
        }
    }

    /// Store `contents` and return the generated key
    pub async fn set(&self, contents: impl Into<String>) -> String {
        let key = uuid::Uuid::new_v4().to_string();
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.len() >= self.threshold {
            prune(&mut entries, self.threshold, now);
        }
        entries.insert(
            key.clone(),
            CacheEntry {
                contents: contents.into(),
                stored_at: now,
                expires_at: now + self.ttl,
            },
        );
        key
    }

    /// Fetch contents by key; `None` when unknown or expired
    pub async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.contents.clone())
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Periodically purge expired entries in the background
    pub fn start_sweeper(&self, every: Duration) {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = cache.purge_expired().await;
                if removed > 0 {
                    tracing::debug!("Evicted {} expired artifacts", removed);
                }
            }
        });
    }
}

/// Make room for one more entry
fn prune(entries: &mut HashMap<String, CacheEntry>, threshold: usize, now: Instant) {
    entries.retain(|_, e| e.expires_at > now);
    if entries.len() < threshold {
        return;
    }

    let mut by_age: Vec<(Instant, String)> = entries
        .iter()
        .map(|(k, e)| (e.stored_at, k.clone()))
        .collect();
    by_age.sort();

    let excess = entries.len() + 1 - threshold;
    for (_, key) in by_age.into_iter().take(excess) {
        entries.remove(&key);
    }
}
