//! Owns the node connection shared by the scanner and every block worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::node::LedgerNode;
use super::rpc::{RpcClient, RpcClientConfig, RpcError};

/// Builds a fresh connection object. Construction itself does no I/O.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn LedgerNode>, RpcError>;
}

/// Connects to a JSON-RPC endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    config: RpcClientConfig,
}

impl HttpConnector {
    pub fn new(config: RpcClientConfig) -> Self {
        Self { config }
    }
}

impl Connector for HttpConnector {
    fn connect(&self) -> Result<Arc<dyn LedgerNode>, RpcError> {
        Ok(Arc::new(RpcClient::new(self.config.clone())?))
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Extra connection attempts after the first one fails its liveness probe
    pub reconnect_attempts: u32,
    /// Fixed spacing between connection attempts
    pub reconnect_delay: Duration,
    /// How long a successful liveness probe is trusted
    pub liveness_check_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(2),
            liveness_check_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
struct ConnectionState {
    handle: Option<Arc<dyn LedgerNode>>,
    last_live: Option<Instant>,
}

pub struct NodeSupervisor {
    connector: Box<dyn Connector>,
    config: SupervisorConfig,
    state: Mutex<ConnectionState>,
}

impl NodeSupervisor {
    pub fn new(connector: impl Connector + 'static, config: SupervisorConfig) -> Self {
        Self {
            connector: Box::new(connector),
            config,
            state: Mutex::new(ConnectionState::default()),
        }
    }

    /// Returns the current handle if it is live, reconnecting otherwise.
    ///
    /// When the node stays unreachable through every reconnect attempt the last
    /// constructed handle is still returned; operations on it fail with the
    /// node's own error.
    pub async fn provider(&self) -> Result<Arc<dyn LedgerNode>, RpcError> {
        let mut state = self.state.lock().await;

        if let Some(handle) = state.handle.clone() {
            let recently_live = state
                .last_live
                .is_some_and(|at| at.elapsed() < self.config.liveness_check_interval);
            if recently_live {
                return Ok(handle);
            }
            if handle.is_live().await {
                state.last_live = Some(Instant::now());
                return Ok(handle);
            }
            tracing::warn!("Node connection lost, reconnecting");
        }

        let (handle, live) = self.connect().await?;
        state.last_live = live.then(Instant::now);
        state.handle = Some(handle.clone());
        Ok(handle)
    }

    async fn connect(&self) -> Result<(Arc<dyn LedgerNode>, bool), RpcError> {
        let mut handle = self.connector.connect()?;
        let mut live = handle.is_live().await;
        let mut attempt = 0;

        while !live && attempt < self.config.reconnect_attempts {
            attempt += 1;
            tracing::warn!(
                "Waiting for node connection... (retry {}/{} in {:?})",
                attempt,
                self.config.reconnect_attempts,
                self.config.reconnect_delay
            );
            tokio::time::sleep(self.config.reconnect_delay).await;
            handle = self.connector.connect()?;
            live = handle.is_live().await;
        }

        if live {
            tracing::info!("Connected to node");
        } else {
            tracing::error!(
                "Node still unreachable after {} retries, continuing with last connection",
                self.config.reconnect_attempts
            );
        }

        Ok((handle, live))
    }
}

impl std::fmt::Debug for NodeSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSupervisor")
            .field("config", &self.config)
            .finish()
    }
}
