use serde::{Deserialize, Serialize};

use crate::keys;
use crate::metrics::PageMetrics;

/// Identity of the request whose rendered page is cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestIdentity {
    pub host: String,
    /// Request URI as sent by the client, query string included.
    pub uri: String,
    pub https: bool,
}

impl RequestIdentity {
    pub fn new(host: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            uri: uri.into(),
            https: false,
        }
    }

    pub fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }
}

/// Address of one cached page.
///
/// Hash-addressed backends use [`CacheKey::hash`]; path-addressed backends
/// rebuild a hierarchical path from [`CacheKey::request`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    hash: String,
    request: RequestIdentity,
}

impl CacheKey {
    pub fn for_request(request: RequestIdentity) -> Self {
        let hash = keys::hash_identity(&request);
        Self { hash, request }
    }

    /// Uses a hash precomputed by the caller.
    pub fn with_hash(hash: impl Into<String>, request: RequestIdentity) -> Self {
        Self {
            hash: hash.into(),
            request,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn request(&self) -> &RequestIdentity {
        &self.request
    }
}

/// Metrics captured when a page was rendered without the cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub queries: u32,
    pub timer: f64,
    pub memory: String,
    pub timestamp: i64,
}

impl PageMeta {
    pub fn capture(metrics: PageMetrics, timestamp: i64) -> Self {
        Self {
            queries: metrics.queries,
            timer: metrics.timer,
            memory: metrics.memory,
            timestamp,
        }
    }

    pub fn metrics(&self) -> PageMetrics {
        PageMetrics {
            queries: self.queries,
            timer: self.timer,
            memory: self.memory.clone(),
        }
    }
}

/// A cached page as returned by a backend.
#[derive(Clone, Debug, PartialEq)]
pub enum CachedPage {
    /// Payload and store-time metadata kept apart; the signature is rendered on emit.
    Structured { data: String, meta: Option<PageMeta> },
    /// Opaque blob with the signature already appended.
    Flat(String),
}

impl CachedPage {
    pub fn data(&self) -> &str {
        match self {
            CachedPage::Structured { data, .. } => data,
            CachedPage::Flat(data) => data,
        }
    }

    pub fn meta(&self) -> Option<&PageMeta> {
        match self {
            CachedPage::Structured { meta, .. } => meta.as_ref(),
            CachedPage::Flat(_) => None,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        !self.data().is_empty()
    }
}

/// Result of [`crate::ports::CacheBackend::store_item`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// Empty payload; nothing was written.
    SkippedEmpty,
    /// The backend could not be reached.
    SkippedUnavailable,
    /// The backend was reached but rejected the write.
    Failed(String),
}

impl StoreOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, StoreOutcome::Stored)
    }
}

/// Result of [`crate::ports::CacheBackend::print_cache`].
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrintOutcome {
    /// The response was written in full; request handling should stop here.
    Served,
    /// Nothing was written; render the page normally.
    PassThrough,
}

impl PrintOutcome {
    pub fn is_served(&self) -> bool {
        matches!(self, PrintOutcome::Served)
    }
}

/// Server environment signals consulted by availability probes.
#[derive(Clone, Debug, Default)]
pub struct ServerEnv {
    pub server_software: Option<String>,
}

impl ServerEnv {
    pub fn new(server_software: Option<String>) -> Self {
        Self { server_software }
    }

    pub fn is_nginx(&self) -> bool {
        self.server_software
            .as_deref()
            .map(|s| s.to_ascii_lowercase().contains("nginx"))
            .unwrap_or(false)
    }
}
