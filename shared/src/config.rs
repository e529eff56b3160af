use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::{Error, TtlSecs};

/// Storage medium selected for page caching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheMethod {
    Db,
    Memory,
    Redis,
    Hdd,
}

impl FromStr for CacheMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "db" | "database" => Ok(CacheMethod::Db),
            "memory" | "apc" => Ok(CacheMethod::Memory),
            "redis" => Ok(CacheMethod::Redis),
            "hdd" | "disk" => Ok(CacheMethod::Hdd),
            other => Err(Error::Config(format!("unknown cache method '{}'", other))),
        }
    }
}

/// A `host:port` pair of a networked store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("endpoint '{}' is missing a port", s)))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("endpoint '{}' has an invalid port", s)))?;
        if host.is_empty() {
            return Err(Error::Config(format!("endpoint '{}' is missing a host", s)));
        }
        Ok(Endpoint::new(host, port))
    }
}

/// How the results of connecting to several endpoints are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectPolicy {
    /// Every endpoint must connect.
    #[default]
    All,
    /// The first endpoint that connects is enough.
    Any,
}

impl FromStr for ConnectPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "and" => Ok(ConnectPolicy::All),
            "any" | "or" => Ok(ConnectPolicy::Any),
            other => Err(Error::Config(format!("unknown connect policy '{}'", other))),
        }
    }
}

pub struct Config {
    pub method: CacheMethod,
    pub lifetime: TtlSecs,
    pub sig_detail: bool,
    pub redis_servers: Vec<Endpoint>,
    pub redis_policy: ConnectPolicy,
    /// Database index selected on every redis connection; flushed by a cache clear.
    pub redis_database: u32,
    pub data_dir: String,
    pub memory_capacity_bytes: u64,
    pub server_software: Option<String>,
}

impl Config {
    const DEFAULT_LIFETIME_SECS: u64 = 24 * 60 * 60;
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_REDIS_SERVER: &str = "127.0.0.1:6379";
    const DEFAULT_MEMORY_CAPACITY: u64 = 64 * 1024 * 1024;

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let method = parse_or(&lookup, "CACHIFY_METHOD", CacheMethod::Db);
        let lifetime = parse_or(&lookup, "CACHIFY_LIFETIME", Self::DEFAULT_LIFETIME_SECS);
        let sig_detail = lookup("CACHIFY_SIG_DETAIL")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        let redis_policy = parse_or(&lookup, "CACHIFY_REDIS_POLICY", ConnectPolicy::All);
        let redis_database = parse_or(&lookup, "CACHIFY_REDIS_DB", 0u32);
        let memory_capacity_bytes = parse_or(
            &lookup,
            "CACHIFY_MEMORY_CAPACITY_BYTES",
            Self::DEFAULT_MEMORY_CAPACITY,
        );

        let servers = lookup("CACHIFY_REDIS_SERVERS")
            .unwrap_or_else(|| Self::DEFAULT_REDIS_SERVER.to_string());
        let mut redis_servers = Vec::new();
        for raw in servers.split(',').filter(|s| !s.trim().is_empty()) {
            match raw.parse::<Endpoint>() {
                Ok(endpoint) => redis_servers.push(endpoint),
                Err(e) => warn!("Ignoring redis server entry: {}", e),
            }
        }
        if redis_servers.is_empty() {
            warn!(
                "No usable redis servers configured, using {}",
                Self::DEFAULT_REDIS_SERVER
            );
            redis_servers.push(Endpoint::new("127.0.0.1", 6379));
        }

        Self {
            method,
            lifetime: TtlSecs(lifetime),
            sig_detail,
            redis_servers,
            redis_policy,
            redis_database,
            data_dir: lookup("CACHIFY_DATA_DIR")
                .unwrap_or_else(|| Self::DEFAULT_DATA_DIR.to_string()),
            memory_capacity_bytes,
            server_software: lookup("SERVER_SOFTWARE"),
        }
    }

    pub fn db_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("cachify.sled")
    }

    pub fn hdd_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir)
            .join("cache")
            .join("cachify")
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        None => default,
    }
}
