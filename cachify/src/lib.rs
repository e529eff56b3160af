//! Full-page output cache: the backend contract and the logic shared by every backend.

pub mod connector;
pub mod domain;
pub mod keys;
pub mod metrics;
pub mod ports;
pub mod print;
pub mod signature;

pub use connector::{Connector, Dial, EndpointFilter};
pub use domain::{
    CacheKey, CachedPage, PageMeta, PrintOutcome, RequestIdentity, ServerEnv, StoreOutcome,
};
pub use metrics::{FixedMetrics, MetricsProbe, PageMetrics, ProcessMetrics};
pub use ports::CacheBackend;
pub use signature::Signature;
