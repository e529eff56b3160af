use async_trait::async_trait;
use cachify::keys::derive_path;
use cachify::ports::{CacheBackend, is_empty_input};
use cachify::print::emit_page;
use cachify::signature::now_timestamp;
use cachify::{
    CacheKey, CachedPage, Connector, Dial, EndpointFilter, MetricsProbe, PrintOutcome,
    ProcessMetrics, ServerEnv, Signature, StoreOutcome,
};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use shared::config::{ConnectPolicy, Endpoint};
use shared::{Error, Result, TtlSecs};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

/// Opens multiplexed connections to one database index, bounded by a connect timeout.
pub struct RedisDialer {
    timeout: Duration,
    database: u32,
}

impl RedisDialer {
    pub fn new(timeout: Duration, database: u32) -> Self {
        Self { timeout, database }
    }

    pub fn connection_url(&self, endpoint: &Endpoint) -> String {
        format!("redis://{}:{}/{}", endpoint.host, endpoint.port, self.database)
    }
}

#[async_trait]
impl Dial for RedisDialer {
    type Handle = MultiplexedConnection;

    async fn dial(&self, endpoint: &Endpoint) -> Result<MultiplexedConnection> {
        let client = redis::Client::open(self.connection_url(endpoint))
            .map_err(|e| Error::Connection(format!("Invalid redis endpoint: {}", e)))?;

        match tokio::time::timeout(self.timeout, client.get_multiplexed_async_connection()).await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(Error::Connection(e.to_string())),
            Err(_) => Err(Error::Connection(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

/// Page cache in a Redis database, keyed by `host/path/` so a reverse proxy can
/// serve hits without reaching the application.
pub struct RedisBackend {
    connector: Connector<RedisDialer>,
    env: ServerEnv,
    signature: Signature,
}

impl RedisBackend {
    pub const METHOD: &'static str = "Redis";

    pub fn builder(env: ServerEnv) -> RedisBackendBuilder {
        RedisBackendBuilder::new(env)
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        self.connector.endpoints()
    }

    pub fn connection_url(&self, endpoint: &Endpoint) -> String {
        self.connector.dialer().connection_url(endpoint)
    }

    async fn connection(&self) -> Option<MultiplexedConnection> {
        if !self.is_available() {
            return None;
        }
        match self.connector.connect().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!("Redis unavailable: {}", e);
                None
            }
        }
    }

    async fn used_memory(&self, conn: &mut MultiplexedConnection) -> Result<Option<u64>> {
        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(conn)
            .await
            .map_err(|e| Error::Storage(format!("INFO failed: {}", e)))?;
        Ok(parse_used_memory(&info))
    }
}

/// `used_memory` field of an `INFO` reply; zero counts as unknown.
fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .filter_map(|line| line.trim().strip_prefix("used_memory:"))
        .filter_map(|value| value.trim().parse::<u64>().ok())
        .find(|bytes| *bytes > 0)
}

pub struct RedisBackendBuilder {
    env: ServerEnv,
    servers: Vec<Endpoint>,
    policy: ConnectPolicy,
    database: u32,
    filter: Option<EndpointFilter>,
    timeout: Duration,
    probe: Option<Arc<dyn MetricsProbe>>,
}

impl RedisBackendBuilder {
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

    fn new(env: ServerEnv) -> Self {
        Self {
            env,
            servers: vec![Endpoint::new("127.0.0.1", 6379)],
            policy: ConnectPolicy::All,
            database: 0,
            filter: None,
            timeout: Self::DEFAULT_TIMEOUT,
            probe: None,
        }
    }

    pub fn servers(mut self, servers: Vec<Endpoint>) -> Self {
        self.servers = servers;
        self
    }

    pub fn policy(mut self, policy: ConnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Database index the cache owns; [`CacheBackend::clear_cache`] flushes all of it.
    pub fn database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    /// Registers a filter that can rewrite the endpoint list before connecting.
    pub fn with_endpoint_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Vec<Endpoint>) -> Vec<Endpoint> + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn MetricsProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn build(self) -> RedisBackend {
        let servers = match &self.filter {
            Some(filter) => filter(self.servers),
            None => self.servers,
        };
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(ProcessMetrics::new()));

        RedisBackend {
            connector: Connector::new(
                RedisDialer::new(self.timeout, self.database),
                servers,
                self.policy,
            ),
            env: self.env,
            signature: Signature::new(RedisBackend::METHOD, probe),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    /// Only usable behind nginx, which reads pages straight from Redis.
    fn is_available(&self) -> bool {
        self.env.is_nginx()
    }

    fn stringify_method(&self) -> &'static str {
        Self::METHOD
    }

    async fn store_item(
        &self,
        key: &CacheKey,
        data: &str,
        lifetime: TtlSecs,
        sig_detail: bool,
    ) -> StoreOutcome {
        if is_empty_input(Self::METHOD, data) {
            return StoreOutcome::SkippedEmpty;
        }
        let Some(mut conn) = self.connection().await else {
            return StoreOutcome::SkippedUnavailable;
        };

        let path = derive_path(key.request(), None);
        let value = format!(
            "{}{}",
            data,
            self.signature.embedded(sig_detail, now_timestamp())
        );
        let result: redis::RedisResult<()> = match lifetime.as_duration() {
            Some(ttl) => conn.set_ex(&path, value, ttl.as_secs()).await,
            None => conn.set(&path, value).await,
        };

        match result {
            Ok(()) => {
                debug!("Stored '{}' in redis", path);
                StoreOutcome::Stored
            }
            Err(e) => {
                warn!("Redis store failed for '{}': {}", path, e);
                StoreOutcome::Failed(e.to_string())
            }
        }
    }

    async fn get_item(&self, key: &CacheKey) -> Option<CachedPage> {
        let mut conn = self.connection().await?;
        let path = derive_path(key.request(), None);

        let result: redis::RedisResult<Option<String>> = conn.get(&path).await;
        match result {
            Ok(Some(value)) if !value.is_empty() => Some(CachedPage::Flat(value)),
            Ok(_) => None,
            Err(e) => {
                warn!("Redis read failed for '{}', treating as miss: {}", path, e);
                None
            }
        }
    }

    async fn delete_item(&self, key: &CacheKey, url: Option<&str>) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        let path = derive_path(key.request(), url);

        let result: redis::RedisResult<()> = conn.del(&path).await;
        if let Err(e) = result {
            warn!("Redis delete failed for '{}': {}", path, e);
        }
    }

    /// Flushes the configured database index, which this cache owns.
    async fn clear_cache(&self) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        let result: redis::RedisResult<()> = redis::cmd("FLUSHDB").query_async(&mut conn).await;
        if let Err(e) = result {
            warn!("Redis flush failed: {}", e);
        }
    }

    async fn get_stats(&self) -> Option<u64> {
        let mut conn = self.connection().await?;
        match self.used_memory(&mut conn).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Redis stats failed: {}", e);
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

    async fn close(&self) {
        self.connector.close().await;
    }
}
