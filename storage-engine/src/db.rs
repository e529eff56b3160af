use async_trait::async_trait;
use cachify::keys::HASH_SUFFIX;
use cachify::ports::{CacheBackend, is_empty_input};
use cachify::print::emit_page;
use cachify::signature::now_timestamp;
use cachify::{
    CacheKey, CachedPage, MetricsProbe, PageMeta, PrintOutcome, Signature, StoreOutcome,
};
use serde::{Deserialize, Serialize};
use shared::{Error, Result, TtlSecs};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

/// Prefix of every transient row; rows of this cache also end in [`HASH_SUFFIX`].
const TRANSIENT_PREFIX: &str = "_transient_";

/// One transient row.
#[derive(Debug, Serialize, Deserialize)]
struct TransientRow {
    data: String,
    meta: PageMeta,
    /// Unix seconds, `None` for rows without a lifetime.
    expires_at: Option<i64>,
}

impl TransientRow {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Page cache stored as transient rows of an embedded metadata store.
///
/// The store may be shared with other components; only rows named
/// `_transient_<hash>.cachify` belong to this cache.
pub struct DbBackend {
    db: sled::Db,
    signature: Signature,
}

impl DbBackend {
    pub const METHOD: &'static str = "DB";

    /// Opens the store, creating the parent directory if it doesn't exist
    pub fn open(path: impl AsRef<Path>, probe: Arc<dyn MetricsProbe>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }

        let db = sled::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open Sled database: {}", e)))?;

        Ok(Self::with_db(db, probe))
    }

    pub fn with_db(db: sled::Db, probe: Arc<dyn MetricsProbe>) -> Self {
        Self {
            db,
            signature: Signature::new(Self::METHOD, probe),
        }
    }

    fn row_name(hash: &str) -> String {
        format!("{}{}", TRANSIENT_PREFIX, hash)
    }

    fn is_owned_row(name: &[u8]) -> bool {
        name.starts_with(TRANSIENT_PREFIX.as_bytes()) && name.ends_with(HASH_SUFFIX.as_bytes())
    }

    fn write_row(&self, hash: &str, row: &TransientRow) -> Result<()> {
        let value = serde_json::to_vec(row)
            .map_err(|e| Error::Serialization(format!("Failed to serialize entry: {}", e)))?;
        self.db
            .insert(Self::row_name(hash).as_bytes(), value)
            .map_err(|e| Error::Storage(format!("Failed to save entry: {}", e)))?;
        Ok(())
    }

    fn read_row(&self, hash: &str) -> Result<Option<TransientRow>> {
        let name = Self::row_name(hash);
        let value = self
            .db
            .get(name.as_bytes())
            .map_err(|e| Error::Storage(format!("Failed to get entry: {}", e)))?;

        let Some(bytes) = value else {
            return Ok(None);
        };
        let row: TransientRow = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Serialization(format!("Malformed entry '{}': {}", name, e)))?;

        if row.is_expired(now_timestamp()) {
            self.remove_row(hash)?;
            return Ok(None);
        }
        Ok(Some(row))
    }

    fn remove_row(&self, hash: &str) -> Result<bool> {
        let removed = self
            .db
            .remove(Self::row_name(hash).as_bytes())
            .map_err(|e| Error::Storage(format!("Failed to delete entry: {}", e)))?
            .is_some();
        Ok(removed)
    }

    fn owned_rows(&self) -> Result<Vec<(sled::IVec, sled::IVec)>> {
        let mut rows = Vec::new();
        for result in self.db.scan_prefix(TRANSIENT_PREFIX.as_bytes()) {
            let (name, value) = result
                .map_err(|e| Error::Storage(format!("Failed to iterate database: {}", e)))?;
            if Self::is_owned_row(&name) {
                rows.push((name, value));
            }
        }
        Ok(rows)
    }

    fn clear_rows(&self) -> Result<usize> {
        let rows = self.owned_rows()?;
        for (name, _) in &rows {
            self.db
                .remove(name)
                .map_err(|e| Error::Storage(format!("Failed to delete entry: {}", e)))?;
        }
        self.db
            .flush()
            .map_err(|e| Error::Storage(format!("Failed to flush database: {}", e)))?;
        Ok(rows.len())
    }

    fn stored_bytes(&self) -> Result<u64> {
        let total = self
            .owned_rows()?
            .iter()
            .map(|(_, value)| value.len() as u64)
            .sum();
        Ok(total)
    }
}

#[async_trait]
impl CacheBackend for DbBackend {
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

        let now = now_timestamp();
        let row = TransientRow {
            data: data.to_string(),
            meta: self.signature.capture_meta(now),
            expires_at: lifetime.as_duration().map(|ttl| now + ttl.as_secs() as i64),
        };

        match self.write_row(key.hash(), &row) {
            Ok(()) => {
                debug!("Stored transient for '{}'", key.hash());
                StoreOutcome::Stored
            }
            Err(e) => {
                warn!("DB cache store failed: {}", e);
                StoreOutcome::Failed(e.to_string())
            }
        }
    }

    async fn get_item(&self, key: &CacheKey) -> Option<CachedPage> {
        match self.read_row(key.hash()) {
            Ok(row) => row.map(|row| CachedPage::Structured {
                data: row.data,
                meta: Some(row.meta),
            }),
            Err(e) => {
                warn!("DB cache read failed, treating as miss: {}", e);
                None
            }
        }
    }

    async fn delete_item(&self, key: &CacheKey, _url: Option<&str>) {
        if let Err(e) = self.remove_row(key.hash()) {
            warn!("DB cache delete failed: {}", e);
        }
    }

    async fn clear_cache(&self) {
        match self.clear_rows() {
            Ok(count) => debug!("Cleared {} transient(s)", count),
            Err(e) => warn!("DB cache clear failed: {}", e),
        }
    }

    async fn get_stats(&self) -> Option<u64> {
        match self.stored_bytes() {
            Ok(0) => None,
            Ok(total) => Some(total),
            Err(e) => {
                warn!("DB cache stats failed: {}", e);
                None
            }
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use cachify::{FixedMetrics, PageMetrics, RequestIdentity};

    fn probe() -> Arc<dyn MetricsProbe> {
        Arc::new(FixedMetrics(PageMetrics {
            queries: 5,
            timer: 0.02,
            memory: "1MB".into(),
        }))
    }

    fn open_backend() -> (tempfile::TempDir, DbBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = DbBackend::open(temp_dir.path().join("cachify.sled"), probe()).unwrap();
        (temp_dir, backend)
    }

    fn key(uri: &str) -> CacheKey {
        CacheKey::for_request(RequestIdentity::new("example.com", uri))
    }

    #[tokio::test]
    async fn test_db_store_and_get() {
        let (_dir, backend) = open_backend();
        let key = key("/post/");

        let outcome = backend
            .store_item(&key, "<html>ünïcode</html>", TtlSecs(3600), false)
            .await;
        assert!(outcome.is_stored());

        let page = backend.get_item(&key).await.unwrap();
        assert_eq!(page.data(), "<html>ünïcode</html>");
        let meta = page.meta().unwrap();
        assert_eq!(meta.queries, 5);
        assert_eq!(meta.memory, "1MB");
    }

    #[tokio::test]
    async fn test_db_empty_input_is_rejected() {
        let (_dir, backend) = open_backend();
        let key = key("/post/");

        backend.store_item(&key, "kept", TtlSecs(3600), false).await;
        let outcome = backend.store_item(&key, "", TtlSecs(3600), false).await;

        assert_eq!(outcome, StoreOutcome::SkippedEmpty);
        assert_eq!(backend.get_item(&key).await.unwrap().data(), "kept");
    }

    #[tokio::test]
    async fn test_db_missing_and_deleted_are_absent() {
        let (_dir, backend) = open_backend();
        let key = key("/post/");
        assert!(backend.get_item(&key).await.is_none());

        backend.store_item(&key, "page", TtlSecs(3600), false).await;
        backend.delete_item(&key, None).await;
        assert!(backend.get_item(&key).await.is_none());

        // Deleting again is silent
        backend.delete_item(&key, None).await;
    }

    #[tokio::test]
    async fn test_db_expired_row_is_absent_and_removed() {
        let (_dir, backend) = open_backend();
        let key = key("/old/");
        let row = TransientRow {
            data: "stale".into(),
            meta: backend.signature.capture_meta(0),
            expires_at: Some(now_timestamp() - 10),
        };
        backend.write_row(key.hash(), &row).unwrap();

        assert!(backend.get_item(&key).await.is_none());
        assert!(backend.db.get(DbBackend::row_name(key.hash())).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_db_malformed_row_is_a_miss() {
        let (_dir, backend) = open_backend();
        let key = key("/broken/");
        backend
            .db
            .insert(DbBackend::row_name(key.hash()).as_bytes(), b"not json".to_vec())
            .unwrap();

        assert!(backend.get_item(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_db_clear_keeps_foreign_rows() {
        let (_dir, backend) = open_backend();
        let key = key("/mine/");
        backend.store_item(&key, "page", TtlSecs(3600), false).await;
        backend.db.insert("_transient_feed_1234", "rss").unwrap();
        backend.db.insert("siteurl", "https://example.com").unwrap();

        backend.clear_cache().await;

        assert!(backend.get_item(&key).await.is_none());
        assert!(backend.db.get("_transient_feed_1234").unwrap().is_some());
        assert!(backend.db.get("siteurl").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_db_stats_counts_only_owned_rows() {
        let (_dir, backend) = open_backend();
        assert_eq!(backend.get_stats().await, None);

        backend.store_item(&key("/a/"), "page", TtlSecs(3600), false).await;
        let with_one = backend.get_stats().await.unwrap();
        assert!(with_one > 4);

        backend.db.insert("_transient_feed_1234", "rss").unwrap();
        assert_eq!(backend.get_stats().await, Some(with_one));
    }

    #[tokio::test]
    async fn test_db_stats_are_in_bytes() {
        let (_dir, backend) = open_backend();
        let key = key("/umlaut/");
        backend.store_item(&key, "<p>grüße ✓</p>", TtlSecs(3600), false).await;

        let row = backend
            .db
            .get(DbBackend::row_name(key.hash()).as_bytes())
            .unwrap()
            .unwrap();
        let chars = String::from_utf8(row.to_vec()).unwrap().chars().count() as u64;

        let stats = backend.get_stats().await.unwrap();
        assert_eq!(stats, row.len() as u64);
        assert!(stats > chars);
    }

    #[tokio::test]
    async fn test_db_print_cache_detail_signature() {
        let (_dir, backend) = open_backend();
        let key = key("/sig/");
        backend.store_item(&key, "<p>x</p>", TtlSecs(3600), true).await;

        let page = backend.get_item(&key).await;
        let mut out = Vec::new();
        let outcome = backend.print_cache(true, page.as_ref(), &mut out).await.unwrap();

        assert!(outcome.is_served());
        let body = String::from_utf8(out).unwrap();
        assert!(body.contains("DB Cache @ "));
        assert!(body.contains("Without Cachify: 5 DB queries, 0.02 seconds, 1MB"));
    }
}
