//! Process-wide DNS cache plugged into the HTTP engine.
//!
//! Lookups inside the TTL never hit the system resolver again; resolution
//! itself happens outside the lock so the critical sections stay short.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::{debug, trace};

const DNS_TTL: Duration = Duration::from_secs(5 * 60);
const DNS_CAPACITY: usize = 64;

struct DnsEntry {
    addrs: Vec<SocketAddr>,
    expires_at: Instant,
    inserted_at: Instant,
}

/// Host-keyed resolver cache. The engine hands us bare host names; the
/// connector applies the target port to whatever addresses we return.
pub struct DnsCache {
    entries: Mutex<HashMap<String, DnsEntry>>,
    ttl: Duration,
    capacity: usize,
    resolve_count: AtomicUsize,
}

impl DnsCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with(DNS_TTL, DNS_CAPACITY))
    }

    fn with(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity,
            resolve_count: AtomicUsize::new(0),
        }
    }

    fn cached(&self, host: &str) -> Option<Vec<SocketAddr>> {
        let entries = self.entries.lock();
        let entry = entries.get(host)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.addrs.clone())
    }

    fn store(&self, host: &str, addrs: Vec<SocketAddr>) {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if entries.len() >= self.capacity && !entries.contains_key(host) {
            // Prefer dropping an expired entry, then the oldest one.
            let victim = entries
                .iter()
                .find(|(_, e)| e.expires_at <= now)
                .or_else(|| entries.iter().min_by_key(|(_, e)| e.inserted_at))
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                entries.remove(&victim);
            }
        }

        entries.insert(
            host.to_string(),
            DnsEntry {
                addrs,
                expires_at: now + self.ttl,
                inserted_at: now,
            },
        );
    }

    /// Drop the cached endpoints for a host after a transport failure so the
    /// next request re-resolves.
    pub fn invalidate(&self, host: &str) {
        if self.entries.lock().remove(host).is_some() {
            debug!("invalidated DNS cache entry for {host}");
        }
    }

    /// Number of real resolver round-trips performed (cache misses).
    pub fn resolve_count(&self) -> usize {
        self.resolve_count.load(Ordering::Relaxed)
    }

    async fn lookup(self: Arc<Self>, host: String) -> std::io::Result<Vec<SocketAddr>> {
        if let Some(addrs) = self.cached(&host) {
            trace!("DNS cache hit for {host}");
            return Ok(addrs);
        }

        self.resolve_count.fetch_add(1, Ordering::Relaxed);
        trace!("resolving {host}");
        // Port is a placeholder; the connector rewrites it per request.
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0)).await?.collect();
        if !addrs.is_empty() {
            self.store(&host, addrs.clone());
        }
        Ok(addrs)
    }
}

/// The handle reqwest owns; resolution futures borrow the shared cache.
pub struct CachingResolver(pub Arc<DnsCache>);

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let cache = self.0.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            let addrs = cache
                .lookup(host)
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, last], 0))
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = DnsCache::with(Duration::from_millis(20), 4);
        cache.store("a.example", vec![addr(1)]);
        assert!(cache.cached("a.example").is_some());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.cached("a.example").is_none());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = DnsCache::with(Duration::from_secs(60), 2);
        cache.store("a.example", vec![addr(1)]);
        std::thread::sleep(Duration::from_millis(2));
        cache.store("b.example", vec![addr(2)]);
        std::thread::sleep(Duration::from_millis(2));
        cache.store("c.example", vec![addr(3)]);

        assert!(cache.cached("a.example").is_none());
        assert!(cache.cached("b.example").is_some());
        assert!(cache.cached("c.example").is_some());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = DnsCache::with(Duration::from_secs(60), 4);
        cache.store("a.example", vec![addr(1)]);
        cache.invalidate("a.example");
        assert!(cache.cached("a.example").is_none());
    }

    #[tokio::test]
    async fn second_lookup_within_ttl_uses_cache() {
        let cache = Arc::new(DnsCache::with(Duration::from_secs(60), 4));
        let first = cache.clone().lookup("localhost".into()).await.unwrap();
        let second = cache.clone().lookup("localhost".into()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.resolve_count(), 1);
    }
}
