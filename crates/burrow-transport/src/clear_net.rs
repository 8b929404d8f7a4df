//! Direct TCP transport.

use crate::address::{Address, TransportType};
use crate::bootstrap::{BootstrapInfo, BootstrapState, TransportState, TransportStateCell};
use crate::config::ClearNetConfig;
use crate::error::TransportError;
use crate::service::{ServerSocket, ServerSocketResult, TransportService};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OnceCell};
use tokio::time;
use tracing::{debug, info};

/// Clearnet transport: plain OS sockets, instant bring-up.
pub struct ClearNetTransportService {
    config: ClearNetConfig,
    state: TransportStateCell,
    bootstrap: BootstrapInfo,
    initialized: OnceCell<()>,
}

impl ClearNetTransportService {
    /// Build an uninitialized instance.
    pub fn new(config: ClearNetConfig) -> Self {
        Self {
            config,
            state: TransportStateCell::new(TransportType::Clear),
            bootstrap: BootstrapInfo::new(TransportType::Clear),
            initialized: OnceCell::new(),
        }
    }

    fn require_ready(&self) -> Result<(), TransportError> {
        let state = self.state.get();
        if state == TransportState::Ready {
            Ok(())
        } else {
            Err(TransportError::NotReady(format!("clearnet transport is {state}")))
        }
    }

    async fn dial(&self, address: &Address) -> Result<TcpStream, TransportError> {
        let target = format!("{}:{}", address.host(), address.port());
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = time::timeout(connect_timeout, TcpStream::connect(target.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(format!("connecting to {target}")))??;
        Ok(stream)
    }
}

#[async_trait]
impl TransportService for ClearNetTransportService {
    fn transport_type(&self) -> TransportType {
        TransportType::Clear
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
                self.bootstrap
                    .update(BootstrapState::BootstrapToNetwork, 0.25, "Clearnet ready");
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
            format!("Binding port {port}"),
        );
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let port = listener.local_addr()?.port();
        self.bootstrap.update(
            BootstrapState::ServicePublished,
            0.0,
            format!("Listening on port {port}"),
        );
        info!(transport = %TransportType::Clear, node_id, port, "server socket bound");
        Ok(ServerSocketResult {
            node_id: node_id.to_string(),
            server_socket: ServerSocket::Tcp(listener),
            address: Address::new(self.config.my_host.clone(), port),
        })
    }

    async fn get_socket(&self, address: &Address) -> Result<TcpStream, TransportError> {
        self.require_ready()?;
        let stream = self.dial(address).await?;
        debug!(transport = %TransportType::Clear, peer = %address, "outbound socket connected");
        self.bootstrap.on_peer_connected(format!("Connected to {address}"));
        Ok(stream)
    }

    async fn is_peer_online(&self, address: &Address) -> bool {
        self.dial(address).await.is_ok()
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.state.set(TransportState::ShuttingDown);
        self.state.set(TransportState::Shutdown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operations_require_initialization() {
        let service = ClearNetTransportService::new(ClearNetConfig::default());
        assert_eq!(service.state(), TransportState::Uninitialized);

        let result = service.get_server_socket(0, "default").await;
        assert!(matches!(result, Err(TransportError::NotReady(_))));

        let result = service.get_socket(&Address::new("127.0.0.1", 1)).await;
        assert!(matches!(result, Err(TransportError::NotReady(_))));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let service = ClearNetTransportService::new(ClearNetConfig::default());
        service.initialize().await.expect("first init");
        assert_eq!(service.state(), TransportState::Ready);
        service.initialize().await.expect("second init is a no-op");
        assert_eq!(service.state(), TransportState::Ready);
        assert_eq!(service.bootstrap_info().progress(), 0.25);
    }

    #[tokio::test]
    async fn test_dial_failure_is_local_not_fatal() {
        let service = ClearNetTransportService::new(ClearNetConfig {
            connect_timeout_ms: 200,
            ..ClearNetConfig::default()
        });
        service.initialize().await.expect("init");

        // Bind then drop a listener so the port is very likely closed.
        let probe = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
        let port = probe.local_addr().expect("addr").port();
        drop(probe);

        let err = service
            .get_socket(&Address::new("127.0.0.1", port))
            .await
            .expect_err("closed port");
        assert!(!err.is_fatal());
        assert_eq!(service.state(), TransportState::Ready);
    }
}
