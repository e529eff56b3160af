//! Lazy, reusable connections to networked stores.

use async_trait::async_trait;
use shared::config::{ConnectPolicy, Endpoint};
use shared::{Error, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Opens a session to a single endpoint.
#[async_trait]
pub trait Dial: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    async fn dial(&self, endpoint: &Endpoint) -> Result<Self::Handle>;
}

/// Endpoint list filter registered by the deployment, e.g. to point at non-default servers.
pub type EndpointFilter = Box<dyn Fn(Vec<Endpoint>) -> Vec<Endpoint> + Send + Sync>;

/// Owns the connection handle of one backend.
///
/// The handle is created on first use and reused afterwards. Attempts are serialized,
/// so concurrent first uses never open duplicate sessions. A failed attempt is not
/// remembered; the next operation tries again.
pub struct Connector<D: Dial> {
    dialer: D,
    endpoints: Vec<Endpoint>,
    policy: ConnectPolicy,
    handle: Mutex<Option<D::Handle>>,
}

impl<D: Dial> Connector<D> {
    pub fn new(dialer: D, endpoints: Vec<Endpoint>, policy: ConnectPolicy) -> Self {
        Self {
            dialer,
            endpoints,
            policy,
            handle: Mutex::new(None),
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    pub fn policy(&self) -> ConnectPolicy {
        self.policy
    }

    /// Returns the live handle, connecting first if needed.
    ///
    /// Under [`ConnectPolicy::All`] every endpoint is dialed and any failure fails the
    /// whole connect; the handle of the first endpoint is kept. Under
    /// [`ConnectPolicy::Any`] endpoints are tried in order and the first success wins.
    pub async fn connect(&self) -> Result<D::Handle> {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        if self.endpoints.is_empty() {
            return Err(Error::Connection("no endpoints configured".to_string()));
        }

        let handle = match self.policy {
            ConnectPolicy::All => self.connect_all().await?,
            ConnectPolicy::Any => self.connect_any().await?,
        };

        *slot = Some(handle.clone());
        Ok(handle)
    }

    async fn connect_all(&self) -> Result<D::Handle> {
        let mut primary = None;
        let mut failures = Vec::new();

        for endpoint in &self.endpoints {
            match self.dialer.dial(endpoint).await {
                Ok(handle) => {
                    debug!("Connected to {}", endpoint);
                    if primary.is_none() {
                        primary = Some(handle);
                    }
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", endpoint, e);
                    failures.push(format!("{}: {}", endpoint, e));
                }
            }
        }

        match primary {
            Some(handle) if failures.is_empty() => Ok(handle),
            _ => Err(Error::Connection(failures.join("; "))),
        }
    }

    async fn connect_any(&self) -> Result<D::Handle> {
        let mut failures = Vec::new();

        for endpoint in &self.endpoints {
            match self.dialer.dial(endpoint).await {
                Ok(handle) => {
                    debug!("Connected to {}", endpoint);
                    return Ok(handle);
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", endpoint, e);
                    failures.push(format!("{}: {}", endpoint, e));
                }
            }
        }

        Err(Error::Connection(failures.join("; ")))
    }

    pub async fn is_connected(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Drops the handle; the next operation reconnects.
    pub async fn close(&self) {
        self.handle.lock().await.take();
    }
}
