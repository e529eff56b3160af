use async_trait::async_trait;
use cachify::keys::HASH_SUFFIX;
use cachify::ports::{CacheBackend, is_empty_input};
use cachify::print::emit_page;
use cachify::signature::now_timestamp;
use cachify::{CacheKey, CachedPage, MetricsProbe, PrintOutcome, Signature, StoreOutcome};
use moka::Expiry;
use moka::future::Cache;
use shared::{Result, TtlSecs};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWrite;
use tracing::debug;

/// Value kept in the in-process cache: the page plus its own lifetime.
#[derive(Clone, Debug)]
pub struct MemoryEntry {
    page: Arc<CachedPage>,
    ttl: Option<Duration>,
}

impl MemoryEntry {
    pub fn new(page: CachedPage, ttl: Option<Duration>) -> Self {
        Self {
            page: Arc::new(page),
            ttl,
        }
    }

    fn weight(&self) -> u32 {
        let bytes = self.page.data().len()
            + self.page.meta().map(|m| m.memory.len()).unwrap_or(0);
        u32::try_from(bytes).unwrap_or(u32::MAX).max(1)
    }
}

/// Per-entry expiry; replacing an entry restarts its lifetime.
struct PageExpiry;

impl Expiry<String, MemoryEntry> for PageExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Moka-backed in-process page cache, weighted by payload bytes.
pub struct MemoryBackend {
    cache: Cache<String, MemoryEntry>,
    signature: Signature,
}

impl MemoryBackend {
    pub const METHOD: &'static str = "Memory";

    /// Creates a cache bounded to `capacity_bytes` of payload.
    pub fn new(capacity_bytes: u64, probe: Arc<dyn MetricsProbe>) -> Self {
        Self::with_cache(Self::build_cache(capacity_bytes), probe)
    }

    /// Uses an existing cache instance that other components may share.
    pub fn with_cache(cache: Cache<String, MemoryEntry>, probe: Arc<dyn MetricsProbe>) -> Self {
        Self {
            cache,
            signature: Signature::new(Self::METHOD, probe),
        }
    }

    pub fn build_cache(capacity_bytes: u64) -> Cache<String, MemoryEntry> {
        Cache::builder()
            .name("cachify")
            .max_capacity(capacity_bytes)
            .weigher(|_key: &String, value: &MemoryEntry| value.weight())
            .expire_after(PageExpiry)
            .build()
    }

    fn owned_keys(&self) -> Vec<String> {
        self.cache
            .iter()
            .filter(|(key, _)| key.ends_with(HASH_SUFFIX))
            .map(|(key, _)| key.to_string())
            .collect()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn is_available(&self) -> bool {
        true
    }

    fn stringify_method(&self) -> &'static str {
        Self::METHOD
    }

    async fn store_item(
        &self,
        key: &CacheKey,
        data: &str,
        lifetime: TtlSecs,
        _sig_detail: bool,
    ) -> StoreOutcome {
        if is_empty_input(Self::METHOD, data) {
            return StoreOutcome::SkippedEmpty;
        }

        let page = CachedPage::Structured {
            data: data.to_string(),
            meta: Some(self.signature.capture_meta(now_timestamp())),
        };
        self.cache
            .insert(
                key.hash().to_string(),
                MemoryEntry::new(page, lifetime.as_duration()),
            )
            .await;
        debug!("Stored '{}' in memory cache", key.hash());
        StoreOutcome::Stored
    }

    async fn get_item(&self, key: &CacheKey) -> Option<CachedPage> {
        let entry = self.cache.get(key.hash()).await?;
        Some(entry.page.as_ref().clone())
    }

    async fn delete_item(&self, key: &CacheKey, _url: Option<&str>) {
        self.cache.invalidate(key.hash()).await;
    }

    async fn clear_cache(&self) {
        for key in self.owned_keys() {
            self.cache.invalidate(&key).await;
        }
    }

    async fn get_stats(&self) -> Option<u64> {
        self.cache.run_pending_tasks().await;
        let bytes: u64 = self
            .cache
            .iter()
            .filter(|(key, _)| key.ends_with(HASH_SUFFIX))
            .map(|(_, value)| value.page.data().len() as u64)
            .sum();
        if bytes == 0 { None } else { Some(bytes) }
    }

    async fn print_cache(
        &self,
        sig_detail: bool,
        entry: Option<&CachedPage>,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<PrintOutcome> {
        emit_page(entry, &self.signature, sig_detail, out).await
    }
}

impl Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entry_count", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachify::{FixedMetrics, PageMetrics, RequestIdentity};
    use tokio::time::sleep;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(1024 * 1024, probe())
    }

    fn probe() -> Arc<dyn MetricsProbe> {
        Arc::new(FixedMetrics(PageMetrics {
            queries: 5,
            timer: 0.02,
            memory: "1MB".into(),
        }))
    }

    fn key(uri: &str) -> CacheKey {
        CacheKey::for_request(RequestIdentity::new("example.com", uri))
    }

    #[tokio::test]
    async fn test_memory_store_and_get() {
        let backend = backend();
        let key = key("/hello/");

        let outcome = backend
            .store_item(&key, "<html>hello</html>", TtlSecs(60), false)
            .await;
        assert!(outcome.is_stored());

        let page = backend.get_item(&key).await.unwrap();
        assert_eq!(page.data(), "<html>hello</html>");
        assert_eq!(page.meta().unwrap().queries, 5);
    }

    #[tokio::test]
    async fn test_memory_empty_input_keeps_prior_entry() {
        let backend = backend();
        let key = key("/hello/");

        backend.store_item(&key, "first", TtlSecs(60), false).await;
        let outcome = backend.store_item(&key, "", TtlSecs(60), false).await;

        assert_eq!(outcome, StoreOutcome::SkippedEmpty);
        assert_eq!(backend.get_item(&key).await.unwrap().data(), "first");
    }

    #[tokio::test]
    async fn test_memory_delete_missing_is_noop() {
        let backend = backend();
        backend.delete_item(&key("/nothing/"), None).await;
        assert!(backend.get_item(&key("/nothing/")).await.is_none());
    }

    #[tokio::test]
    async fn test_memory_delete() {
        let backend = backend();
        let key = key("/gone/");
        backend.store_item(&key, "page", TtlSecs(60), false).await;
        backend.delete_item(&key, None).await;
        assert!(backend.get_item(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_memory_entry_expires() {
        let backend = backend();
        let key = key("/short/");
        backend.store_item(&key, "page", TtlSecs(1), false).await;
        assert!(backend.get_item(&key).await.is_some());

        sleep(Duration::from_millis(1200)).await;
        assert!(backend.get_item(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_memory_clear_leaves_foreign_entries() {
        let cache = MemoryBackend::build_cache(1024 * 1024);
        let backend = MemoryBackend::with_cache(cache.clone(), probe());
        let key = key("/mine/");

        backend.store_item(&key, "page", TtlSecs(60), false).await;
        cache
            .insert(
                "session:42".to_string(),
                MemoryEntry::new(CachedPage::Flat("foreign".into()), None),
            )
            .await;

        backend.clear_cache().await;

        assert!(backend.get_item(&key).await.is_none());
        assert!(cache.get("session:42").await.is_some());
    }

    #[tokio::test]
    async fn test_memory_stats() {
        let backend = backend();
        assert_eq!(backend.get_stats().await, None);

        backend.store_item(&key("/a/"), "12345", TtlSecs(60), false).await;
        backend.store_item(&key("/b/"), "123", TtlSecs(60), false).await;
        assert_eq!(backend.get_stats().await, Some(8));
    }

    #[tokio::test]
    async fn test_memory_print_cache_with_detail() {
        let backend = backend();
        let key = key("/detail/");
        backend.store_item(&key, "<p>body</p>", TtlSecs(60), true).await;

        let page = backend.get_item(&key).await;
        let mut out = Vec::new();
        let outcome = backend.print_cache(true, page.as_ref(), &mut out).await.unwrap();

        assert!(outcome.is_served());
        let body = String::from_utf8(out).unwrap();
        assert!(body.starts_with("<p>body</p>"));
        assert!(body.contains("Memory Cache @ "));
        assert!(body.contains("With Cachify: 5 DB queries, 0.02 seconds, 1MB"));
    }

    #[tokio::test]
    async fn test_memory_print_absent_passes_through() {
        let backend = backend();
        let mut out = Vec::new();
        let outcome = backend.print_cache(false, None, &mut out).await.unwrap();
        assert_eq!(outcome, PrintOutcome::PassThrough);
    }
}
