#![deny(clippy::all)]

use crate::domain::{CacheKey, CachedPage, PrintOutcome, StoreOutcome};
use async_trait::async_trait;
use shared::{Result, TtlSecs};
use tokio::io::AsyncWrite;
use tracing::warn;

// Ports are the pluggable extension points for the storage media pages are cached in

/// Uniform contract of a page cache backend.
///
/// Backend failures never escape this boundary: reads resolve to `None`, writes and
/// deletes are skipped, and the failure is logged.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Side-effect free capability probe, safe to call before any connection exists.
    fn is_available(&self) -> bool;

    /// Short name shown in diagnostics.
    fn stringify_method(&self) -> &'static str;

    async fn store_item(
        &self,
        key: &CacheKey,
        data: &str,
        lifetime: TtlSecs,
        sig_detail: bool,
    ) -> StoreOutcome;

    async fn get_item(&self, key: &CacheKey) -> Option<CachedPage>;

    /// `url` lets path-addressed backends rebuild the address of another page than
    /// the one `key` was built for.
    async fn delete_item(&self, key: &CacheKey, url: Option<&str>);

    /// Removes every entry owned by this cache, leaving foreign data in a shared store alone.
    async fn clear_cache(&self);

    /// Approximate size of the cache in bytes, `None` when unknown or empty.
    async fn get_stats(&self) -> Option<u64>;

    /// Writes a cached page to `out`. [`PrintOutcome::Served`] means the response is
    /// complete and the caller must stop handling the request.
    async fn print_cache(
        &self,
        sig_detail: bool,
        entry: Option<&CachedPage>,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<PrintOutcome>;

    /// Releases held connections.
    async fn close(&self) {}
}

/// Logs and reports an empty payload so the store can be skipped.
pub fn is_empty_input(method: &str, data: &str) -> bool {
    if data.is_empty() {
        warn!("{}::store_item: Empty input.", method);
        return true;
    }
    false
}
