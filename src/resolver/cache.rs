use std::hash::Hash;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

use super::{DnsError, MxRecord, SpfResolver, normalize_name};

const DEFAULT_TTL: Duration = Duration::from_secs(300);
const DEFAULT_PURGE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone)]
struct CachedAnswer<T> {
    answer: Result<T, DnsError>,
    expires_at: Instant,
}

/// In-memory answer cache in front of any [`SpfResolver`].
///
/// Positive answers and NXDOMAIN are kept for a fixed TTL; transient failures
/// are never cached. Concurrent misses may query the inner resolver twice; the
/// last answer written wins.
///
/// Expired answers are swept from a record type's map once it grows past the
/// purge threshold.
pub struct CachingResolver<R> {
    inner: R,
    ttl: Duration,
    purge_threshold: usize,
    txt: DashMap<String, CachedAnswer<Vec<String>>>,
    a: DashMap<String, CachedAnswer<Vec<Ipv4Addr>>>,
    aaaa: DashMap<String, CachedAnswer<Vec<Ipv6Addr>>>,
    mx: DashMap<String, CachedAnswer<Vec<MxRecord>>>,
    ptr: DashMap<IpAddr, CachedAnswer<Vec<String>>>,
}

impl<R> CachingResolver<R> {
    pub fn new(inner: R) -> Self {
        Self::with_ttl(inner, DEFAULT_TTL)
    }

    pub fn with_ttl(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            purge_threshold: DEFAULT_PURGE_THRESHOLD,
            txt: DashMap::new(),
            a: DashMap::new(),
            aaaa: DashMap::new(),
            mx: DashMap::new(),
            ptr: DashMap::new(),
        }
    }

    pub fn with_purge_threshold(mut self, entries: usize) -> Self {
        self.purge_threshold = entries;
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of cached answers across all record types.
    pub fn len(&self) -> usize {
        self.txt.len() + self.a.len() + self.aaaa.len() + self.mx.len() + self.ptr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.txt.clear();
        self.a.clear();
        self.aaaa.clear();
        self.mx.clear();
        self.ptr.clear();
    }

    /// Drops every expired answer.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.txt.retain(|_, entry| entry.expires_at > now);
        self.a.retain(|_, entry| entry.expires_at > now);
        self.aaaa.retain(|_, entry| entry.expires_at > now);
        self.mx.retain(|_, entry| entry.expires_at > now);
        self.ptr.retain(|_, entry| entry.expires_at > now);
    }

    fn cached<K, T, F>(&self, map: &DashMap<K, CachedAnswer<T>>, key: K, fetch: F) -> Result<T, DnsError>
    where
        K: Eq + Hash + std::fmt::Debug,
        T: Clone,
        F: FnOnce() -> Result<T, DnsError>,
    {
        if let Some(entry) = map.get(&key) {
            if entry.expires_at > Instant::now() {
                trace!(?key, "resolver cache hit");
                return entry.answer.clone();
            }
        }

        let answer = fetch();
        let cacheable = match &answer {
            Ok(_) => true,
            Err(err) => !err.is_transient(),
        };
        if cacheable && !self.ttl.is_zero() {
            let now = Instant::now();
            map.insert(
                key,
                CachedAnswer {
                    answer: answer.clone(),
                    expires_at: now + self.ttl,
                },
            );
            if map.len() > self.purge_threshold {
                map.retain(|_, entry| entry.expires_at > now);
                trace!(remaining = map.len(), "resolver cache swept");
            }
        }
        answer
    }
}

impl<R: SpfResolver> SpfResolver for CachingResolver<R> {
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        self.cached(&self.txt, normalize_name(name), || self.inner.lookup_txt(name))
    }

    fn lookup_a(&self, name: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        self.cached(&self.a, normalize_name(name), || self.inner.lookup_a(name))
    }

    fn lookup_aaaa(&self, name: &str) -> Result<Vec<Ipv6Addr>, DnsError> {
        self.cached(&self.aaaa, normalize_name(name), || self.inner.lookup_aaaa(name))
    }

    fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>, DnsError> {
        self.cached(&self.mx, normalize_name(name), || self.inner.lookup_mx(name))
    }

    fn lookup_ptr(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        self.cached(&self.ptr, ip, || self.inner.lookup_ptr(ip))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl SpfResolver for CountingResolver {
        fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match name {
                "flaky.example.com" => Err(DnsError::ServFail),
                "missing.example.com" => Err(DnsError::NxDomain),
                _ => Ok(vec!["v=spf1 -all".to_string()]),
            }
        }

        fn lookup_a(&self, _name: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Ipv4Addr::new(192, 0, 2, 1)])
        }

        fn lookup_aaaa(&self, _name: &str) -> Result<Vec<Ipv6Addr>, DnsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn lookup_mx(&self, _name: &str) -> Result<Vec<MxRecord>, DnsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![MxRecord::new(10, "mx.example.com")])
        }

        fn lookup_ptr(&self, _ip: IpAddr) -> Result<Vec<String>, DnsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["mail.example.com".to_string()])
        }
    }

    fn calls(cache: &CachingResolver<CountingResolver>) -> usize {
        cache.inner().calls.load(Ordering::SeqCst)
    }

    #[test]
    fn positive_answers_are_reused() {
        let cache = CachingResolver::new(CountingResolver::default());
        cache.lookup_txt("Example.com.").unwrap();
        cache.lookup_txt("example.com").unwrap();
        cache.lookup_a("example.com").unwrap();
        cache.lookup_a("example.com").unwrap();
        assert_eq!(calls(&cache), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn nxdomain_cached_but_servfail_retried() {
        let cache = CachingResolver::new(CountingResolver::default());
        assert_eq!(cache.lookup_txt("missing.example.com"), Err(DnsError::NxDomain));
        assert_eq!(cache.lookup_txt("missing.example.com"), Err(DnsError::NxDomain));
        assert_eq!(calls(&cache), 1);

        assert_eq!(cache.lookup_txt("flaky.example.com"), Err(DnsError::ServFail));
        assert_eq!(cache.lookup_txt("flaky.example.com"), Err(DnsError::ServFail));
        assert_eq!(calls(&cache), 3);
    }

    #[test]
    fn zero_ttl_disables_caching() {
        let cache = CachingResolver::with_ttl(CountingResolver::default(), Duration::ZERO);
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        cache.lookup_ptr(ip).unwrap();
        cache.lookup_ptr(ip).unwrap();
        assert_eq!(calls(&cache), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_answers_are_swept_past_the_threshold() {
        let cache = CachingResolver::with_ttl(CountingResolver::default(), Duration::from_millis(100))
            .with_purge_threshold(1);
        cache.lookup_txt("one.example.com").unwrap();
        std::thread::sleep(Duration::from_millis(150));
        cache.lookup_txt("two.example.com").unwrap();
        assert_eq!(cache.len(), 1);
        cache.lookup_txt("three.example.com").unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn purge_and_clear() {
        let cache = CachingResolver::new(CountingResolver::default());
        cache.lookup_mx("example.com").unwrap();
        cache.lookup_aaaa("example.com").unwrap();
        cache.purge_expired();
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
