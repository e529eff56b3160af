use async_trait::async_trait;
use cachify::keys::derive_path;
use cachify::ports::{CacheBackend, is_empty_input};
use cachify::print::emit_page;
use cachify::signature::now_timestamp;
use cachify::{CacheKey, CachedPage, MetricsProbe, PrintOutcome, Signature, StoreOutcome};
use flate2::Compression;
use flate2::write::GzEncoder;
use shared::{Error, Result, TtlSecs};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

const PAGE_FILE: &str = "index.html";
const GZIP_FILE: &str = "index.html.gz";

/// Static HTML files laid out as `<cache_dir>/[https-]<host>/<path>/index.html`, the
/// layout a reverse proxy can serve with `try_files`. A gzip copy sits next to each page.
///
/// Files carry no expiry; they live until deleted or flushed.
pub struct HddBackend {
    cache_dir: PathBuf,
    signature: Signature,
}

impl HddBackend {
    pub const METHOD: &'static str = "HDD";

    pub fn new(cache_dir: impl Into<PathBuf>, probe: Arc<dyn MetricsProbe>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            signature: Signature::new(Self::METHOD, probe),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory of a page. Empty and dot segments are dropped so the result stays
    /// inside the cache directory.
    fn page_dir(&self, key: &CacheKey, url: Option<&str>) -> PathBuf {
        let request = key.request();
        let relative = derive_path(request, url);
        let mut segments = relative.split('/').filter(|s| !s.is_empty() && *s != "." && *s != "..");

        let mut dir = self.cache_dir.clone();
        if let Some(host) = segments.next() {
            let host = host.replace('\\', "");
            if request.https {
                dir.push(format!("https-{}", host));
            } else {
                dir.push(host);
            }
        }
        for segment in segments {
            dir.push(segment);
        }
        dir
    }

    async fn write_page(&self, dir: &Path, html: &str) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(PAGE_FILE), html.as_bytes()).await?;
        tokio::fs::write(dir.join(GZIP_FILE), gzip(html.as_bytes())?).await?;
        Ok(())
    }

    async fn remove_page(&self, dir: &Path) -> Result<()> {
        for file in [PAGE_FILE, GZIP_FILE] {
            match tokio::fs::remove_file(dir.join(file)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        // Only succeeds once no child pages remain
        let _ = tokio::fs::remove_dir(dir).await;
        Ok(())
    }

    async fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        let mut pending = vec![self.cache_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push(entry.path());
                } else {
                    total += metadata.len();
                }
            }
        }
        Ok(total)
    }
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(bytes)
        .map_err(|e| Error::Internal(format!("gzip failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::Internal(format!("gzip failed: {}", e)))
}

#[async_trait]
impl CacheBackend for HddBackend {
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
        _lifetime: TtlSecs,
        sig_detail: bool,
    ) -> StoreOutcome {
        if is_empty_input(Self::METHOD, data) {
            return StoreOutcome::SkippedEmpty;
        }

        let dir = self.page_dir(key, None);
        let html = format!(
            "{}{}",
            data,
            self.signature.embedded(sig_detail, now_timestamp())
        );
        match self.write_page(&dir, &html).await {
            Ok(()) => {
                debug!("Wrote {}", dir.join(PAGE_FILE).display());
                StoreOutcome::Stored
            }
            Err(e) => {
                warn!("HDD cache store failed for {}: {}", dir.display(), e);
                StoreOutcome::Failed(e.to_string())
            }
        }
    }

    async fn get_item(&self, key: &CacheKey) -> Option<CachedPage> {
        let file = self.page_dir(key, None).join(PAGE_FILE);
        match tokio::fs::read_to_string(&file).await {
            Ok(html) if !html.is_empty() => Some(CachedPage::Flat(html)),
            Ok(_) => None,
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("HDD cache read failed for {}: {}", file.display(), e);
                None
            }
        }
    }

    async fn delete_item(&self, key: &CacheKey, url: Option<&str>) {
        let dir = self.page_dir(key, url);
        if let Err(e) = self.remove_page(&dir).await {
            warn!("HDD cache delete failed for {}: {}", dir.display(), e);
        }
    }

    async fn clear_cache(&self) {
        match tokio::fs::remove_dir_all(&self.cache_dir).await {
            Ok(()) => debug!("Removed {}", self.cache_dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("HDD cache clear failed: {}", e),
        }
    }

    async fn get_stats(&self) -> Option<u64> {
        match self.total_size().await {
            Ok(0) => None,
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("HDD cache stats failed: {}", e);
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
