use crate::db::DbBackend;
use crate::hdd::HddBackend;
use crate::memory::MemoryBackend;
use crate::redis_store::RedisBackend;
use cachify::{CacheBackend, MetricsProbe, ServerEnv};
use shared::Result;
use shared::config::{CacheMethod, Config};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the configured backend once at startup.
///
/// A backend whose availability probe fails is replaced by the database backend.
pub fn create_backend(
    config: &Config,
    probe: Arc<dyn MetricsProbe>,
) -> Result<Arc<dyn CacheBackend>> {
    let env = ServerEnv::new(config.server_software.clone());

    let backend: Arc<dyn CacheBackend> = match config.method {
        CacheMethod::Db => Arc::new(DbBackend::open(config.db_path(), probe.clone())?),
        CacheMethod::Memory => Arc::new(MemoryBackend::new(
            config.memory_capacity_bytes,
            probe.clone(),
        )),
        CacheMethod::Hdd => Arc::new(HddBackend::new(config.hdd_dir(), probe.clone())),
        CacheMethod::Redis => Arc::new(
            RedisBackend::builder(env)
                .servers(config.redis_servers.clone())
                .policy(config.redis_policy)
                .database(config.redis_database)
                .probe(probe.clone())
                .build(),
        ),
    };

    if backend.is_available() {
        info!("Using {} cache", backend.stringify_method());
        return Ok(backend);
    }

    warn!(
        "{} cache is not available here, falling back to DB cache",
        backend.stringify_method()
    );
    Ok(Arc::new(DbBackend::open(config.db_path(), probe)?))
}
