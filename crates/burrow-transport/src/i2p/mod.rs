//! I2P transport over an external router's SAM bridge.
//!
//! Sessions are created with `TRANSIENT` destinations: the router derives a
//! fresh destination per session and the bridge connection that created it
//! must stay open for the session's lifetime.

mod sam;

pub use sam::SamAcceptor;

use crate::address::{is_base64_destination, Address, TransportType};
use crate::bootstrap::{BootstrapInfo, BootstrapState, TransportState, TransportStateCell};
use crate::config::I2pConfig;
use crate::error::TransportError;
use crate::service::{ServerSocket, ServerSocketResult, TransportService};
use async_trait::async_trait;
use sam::SamConnection;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::time;
use tracing::{debug, info, warn};

/// A live SAM session. Dropping it closes the control connection, which
/// destroys the session router-side.
#[derive(Debug)]
struct SamSession {
    _control: SamConnection,
    id: String,
    destination: String,
}

/// I2P transport backed by a SAM bridge.
pub struct I2pTransportService {
    config: I2pConfig,
    state: TransportStateCell,
    bootstrap: BootstrapInfo,
    initialized: OnceCell<()>,
    /// Shared session for outbound streams, created on first dial.
    outbound: Mutex<Option<SamSession>>,
    /// Listening sessions by node, kept alive until shutdown.
    server_sessions: Mutex<HashMap<String, SamSession>>,
}

impl I2pTransportService {
    /// Build an uninitialized instance.
    pub fn new(config: I2pConfig) -> Self {
        Self {
            config,
            state: TransportStateCell::new(TransportType::I2p),
            bootstrap: BootstrapInfo::new(TransportType::I2p),
            initialized: OnceCell::new(),
            outbound: Mutex::new(None),
            server_sessions: Mutex::new(HashMap::new()),
        }
    }

    fn require_ready(&self) -> Result<(), TransportError> {
        let state = self.state.get();
        if state == TransportState::Ready {
            Ok(())
        } else {
            Err(TransportError::NotReady(format!("i2p transport is {state}")))
        }
    }

    /// Open a session and learn its destination. Session ids are global to
    /// the router, so callers pass distinct ids per purpose.
    async fn create_session(&self, session_id: &str) -> Result<SamSession, TransportError> {
        let mut control = SamConnection::open(&self.config.sam_host, self.config.sam_port).await?;
        let reply = control
            .exchange(&format!(
                "SESSION CREATE STYLE=STREAM ID={session_id} DESTINATION=TRANSIENT"
            ))
            .await?;
        if !reply.result_ok() {
            return Err(TransportError::Protocol(format!(
                "sam session create rejected: {}",
                reply.message()
            )));
        }
        let reply = control.exchange("NAMING LOOKUP NAME=ME").await?;
        let destination = reply
            .get("VALUE")
            .ok_or_else(|| TransportError::Protocol("lookup of own destination failed".into()))?
            .to_string();
        info!(session_id, "sam session created");
        Ok(SamSession { _control: control, id: session_id.to_string(), destination })
    }

    async fn dial(&self, address: &Address) -> Result<TcpStream, TransportError> {
        let socket_timeout = Duration::from_millis(self.config.socket_timeout_ms);
        time::timeout(socket_timeout, self.dial_inner(address))
            .await
            .map_err(|_| TransportError::Timeout(format!("sam connect to {address}")))?
    }

    async fn dial_inner(&self, address: &Address) -> Result<TcpStream, TransportError> {
        self.require_ready()?;
        let session_id = self.ensure_outbound_session().await?;

        let mut connection =
            SamConnection::open(&self.config.sam_host, self.config.sam_port).await?;
        let destination = if is_base64_destination(address.host()) {
            address.host().to_string()
        } else {
            // `.i2p` names resolve through the router's address book.
            let reply = connection
                .exchange(&format!("NAMING LOOKUP NAME={}", address.host()))
                .await?;
            reply
                .get("VALUE")
                .ok_or_else(|| {
                    TransportError::Protocol(format!("no destination for {}", address.host()))
                })?
                .to_string()
        };
        let reply = connection
            .exchange(&format!(
                "STREAM CONNECT ID={session_id} DESTINATION={destination} SILENT=false"
            ))
            .await?;
        if !reply.result_ok() {
            return Err(TransportError::Protocol(format!(
                "sam stream connect rejected: {}",
                reply.message()
            )));
        }
        Ok(connection.into_stream())
    }

    async fn ensure_outbound_session(&self) -> Result<String, TransportError> {
        let mut guard = self.outbound.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.id.clone());
        }
        let session_id = format!("burrow-client-{}", std::process::id());
        let session = self.create_session(&session_id).await?;
        *guard = Some(session);
        Ok(session_id)
    }
}

#[async_trait]
impl TransportService for I2pTransportService {
    fn transport_type(&self) -> TransportType {
        TransportType::I2p
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    fn state_changes(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    fn bootstrap_info(&self) -> &BootstrapInfo {
        &self.bootstrap
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        self.initialized
            .get_or_try_init(|| async {
                self.state.set(TransportState::Initializing);
                if self.config.embedded_router {
                    warn!("embedded router mode not supported; using external SAM bridge");
                }
                self.bootstrap.update(
                    BootstrapState::BootstrapToNetwork,
                    0.1,
                    "Connecting to i2p router",
                );
                // Probe the bridge so a missing router fails bring-up
                // instead of every later call.
                SamConnection::open(&self.config.sam_host, self.config.sam_port)
                    .await
                    .map_err(TransportError::into_fatal)?;
                self.bootstrap.update(
                    BootstrapState::BootstrapToNetwork,
                    0.25,
                    "I2p router reachable",
                );
                self.state.set(TransportState::Ready);
                Ok(())
            })
            .await
            .copied()
    }

    async fn get_server_socket(
        &self,
        port: u16,
        node_id: &str,
    ) -> Result<ServerSocketResult, TransportError> {
        self.require_ready()?;
        self.bootstrap.update(
            BootstrapState::StartPublishService,
            0.0,
            "Creating i2p session",
        );
        let session = self.create_session(node_id).await?;
        let address = Address::new(session.destination.clone(), port);
        let acceptor = SamAcceptor::new(
            self.config.sam_host.clone(),
            self.config.sam_port,
            node_id.to_string(),
        );
        self.server_sessions
            .lock()
            .await
            .insert(node_id.to_string(), session);
        self.bootstrap.update(
            BootstrapState::ServicePublished,
            0.0,
            format!("Destination ready for {node_id}"),
        );
        info!(transport = %TransportType::I2p, node_id, "i2p destination published");
        Ok(ServerSocketResult {
            node_id: node_id.to_string(),
            server_socket: ServerSocket::Sam(acceptor),
            address,
        })
    }

    async fn get_socket(&self, address: &Address) -> Result<TcpStream, TransportError> {
        self.require_ready()?;
        let stream = self.dial(address).await?;
        debug!(transport = %TransportType::I2p, peer = %address, "outbound stream connected");
        self.bootstrap.on_peer_connected(format!("Connected to {address}"));
        Ok(stream)
    }

    async fn is_peer_online(&self, address: &Address) -> bool {
        // Attempt-and-close; SAM offers no cheaper probe.
        self.dial(address).await.is_ok()
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.state.set(TransportState::ShuttingDown);
        // Dropping sessions closes their control connections, destroying
        // the sessions router-side.
        self.outbound.lock().await.take();
        self.server_sessions.lock().await.clear();
        self.state.set(TransportState::Shutdown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operations_before_initialize_fail_locally() {
        let service = I2pTransportService::new(I2pConfig::default());
        let result = service.get_server_socket(0, "default").await;
        assert!(matches!(result, Err(TransportError::NotReady(_))));

        let address = Address::new("peer.i2p", 0);
        let result = service.get_socket(&address).await;
        assert!(matches!(result, Err(TransportError::NotReady(_))));
        assert!(!service.is_peer_online(&address).await);
    }

    #[tokio::test]
    async fn test_shutdown_without_sessions_is_clean() {
        let service = I2pTransportService::new(I2pConfig::default());
        service.shutdown().await.expect("clean shutdown");
        assert_eq!(service.state(), TransportState::Shutdown);
    }
}
