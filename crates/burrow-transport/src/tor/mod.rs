//! Tor transport: drives an external daemon over its control port and dials
//! through its SOCKS proxy. Onion services are created ephemerally with
//! `ADD_ONION` per node and removed again on shutdown.

mod control;
mod socks;

use crate::address::{Address, TransportType};
use crate::bootstrap::{BootstrapInfo, BootstrapState, TransportState, TransportStateCell};
use crate::config::TorConfig;
use crate::error::TransportError;
use crate::service::{ServerSocket, ServerSocketResult, TransportService};
use async_trait::async_trait;
use control::ControlConnection;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::time;
use tracing::{debug, info, warn};

/// Tor transport over an already-running daemon.
pub struct TorTransportService {
    config: TorConfig,
    state: TransportStateCell,
    bootstrap: BootstrapInfo,
    initialized: OnceCell<()>,
    /// Control connection, present once initialized. Commands serialize on
    /// this lock.
    control: Mutex<Option<ControlConnection>>,
    /// SOCKS endpoint learned (or configured) during bring-up.
    socks_address: OnceCell<String>,
    /// Published onion service ids by node, removed on shutdown.
    published: parking_lot::Mutex<HashMap<String, String>>,
}

impl TorTransportService {
    /// Build an uninitialized instance.
    pub fn new(config: TorConfig) -> Self {
        Self {
            config,
            state: TransportStateCell::new(TransportType::Tor),
            bootstrap: BootstrapInfo::new(TransportType::Tor),
            initialized: OnceCell::new(),
            control: Mutex::new(None),
            socks_address: OnceCell::new(),
            published: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn require_ready(&self) -> Result<(), TransportError> {
        let state = self.state.get();
        if state == TransportState::Ready {
            Ok(())
        } else {
            Err(TransportError::NotReady(format!("tor transport is {state}")))
        }
    }

    async fn bring_up(&self) -> Result<(), TransportError> {
        self.bootstrap.update(
            BootstrapState::BootstrapToNetwork,
            0.0,
            "Connecting to control port",
        );
        let mut control =
            ControlConnection::open(&self.config.control_host, self.config.control_port).await?;
        self.authenticate(&mut control).await?;
        self.apply_overrides(&mut control).await?;

        let socks = match &self.config.socks_address {
            Some(explicit) => explicit.clone(),
            None => query_socks_listener(&mut control).await?,
        };
        self.await_daemon_bootstrap(&mut control).await?;

        let _ = self.socks_address.set(socks);
        *self.control.lock().await = Some(control);
        info!(transport = %TransportType::Tor, "tor daemon ready");
        Ok(())
    }

    async fn authenticate(&self, control: &mut ControlConnection) -> Result<(), TransportError> {
        let command = if let Some(password) = &self.config.control_password {
            format!("AUTHENTICATE \"{password}\"")
        } else if let Some(path) = &self.config.cookie_path {
            let cookie = tokio::fs::read(path).await?;
            format!("AUTHENTICATE {}", hex::encode(cookie))
        } else {
            "AUTHENTICATE".to_string()
        };
        let reply = control.command(&command).await?;
        if !reply.is_ok() {
            return Err(TransportError::Protocol(format!(
                "tor authentication rejected: status {}",
                reply.status
            )));
        }
        Ok(())
    }

    async fn apply_overrides(&self, control: &mut ControlConnection) -> Result<(), TransportError> {
        for (key, value) in &self.config.torrc_overrides {
            let reply = control.command(&format!("SETCONF {key}={value}")).await?;
            if !reply.is_ok() {
                return Err(TransportError::Protocol(format!(
                    "SETCONF {key} rejected: status {}",
                    reply.status
                )));
            }
        }
        if !self.config.directory_authorities.is_empty() {
            let values = self
                .config
                .directory_authorities
                .iter()
                .map(|authority| format!("DirAuthority=\"{authority}\""))
                .collect::<Vec<_>>()
                .join(" ");
            let reply = control.command(&format!("SETCONF {values}")).await?;
            if !reply.is_ok() {
                return Err(TransportError::Protocol(format!(
                    "SETCONF DirAuthority rejected: status {}",
                    reply.status
                )));
            }
        }
        Ok(())
    }

    async fn await_daemon_bootstrap(
        &self,
        control: &mut ControlConnection,
    ) -> Result<(), TransportError> {
        let deadline =
            time::Instant::now() + Duration::from_millis(self.config.bootstrap_timeout_ms);
        loop {
            let reply = control.command("GETINFO status/bootstrap-phase").await?;
            let value = reply.value("status/bootstrap-phase").unwrap_or("");
            if let Some((percent, summary)) = control::parse_bootstrap_phase(value) {
                self.bootstrap.update(
                    BootstrapState::BootstrapToNetwork,
                    f64::from(percent) / 100.0 * 0.25,
                    summary,
                );
                if percent >= 100 {
                    return Ok(());
                }
            }
            if time::Instant::now() >= deadline {
                return Err(TransportError::Timeout("tor daemon bootstrap".into()));
            }
            time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn dial(&self, address: &Address) -> Result<TcpStream, TransportError> {
        let proxy = self
            .socks_address
            .get()
            .ok_or_else(|| TransportError::NotReady("tor socks endpoint unknown".into()))?;
        let socket_timeout = Duration::from_millis(self.config.socket_timeout_ms);
        let stream = time::timeout(socket_timeout, socks::connect_via_proxy(proxy, address))
            .await
            .map_err(|_| TransportError::Timeout(format!("socks connect to {address}")))??;
        Ok(stream)
    }
}

async fn query_socks_listener(control: &mut ControlConnection) -> Result<String, TransportError> {
    let reply = control.command("GETINFO net/listeners/socks").await?;
    let raw = reply
        .value("net/listeners/socks")
        .ok_or_else(|| TransportError::Protocol("daemon reported no socks listener".into()))?;
    raw.split_whitespace()
        .next()
        .map(|token| token.trim_matches('"').to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| TransportError::Protocol("empty socks listener".into()))
}

#[async_trait]
impl TransportService for TorTransportService {
    fn transport_type(&self) -> TransportType {
        TransportType::Tor
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
                self.bring_up().await.map_err(TransportError::into_fatal)?;
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
            "Publishing onion service",
        );

        // The onion service forwards to a local ephemeral listener.
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let forward = listener.local_addr()?;

        let mut guard = self.control.lock().await;
        let control = guard
            .as_mut()
            .ok_or_else(|| TransportError::NotReady("tor control connection missing".into()))?;

        let reply = control.command("SETEVENTS HS_DESC").await?;
        if !reply.is_ok() {
            return Err(TransportError::Protocol(format!(
                "SETEVENTS rejected: status {}",
                reply.status
            )));
        }
        let reply = control
            .command(&format!("ADD_ONION NEW:ED25519-V3 Flags=DiscardPK Port={port},{forward}"))
            .await?;
        if !reply.is_ok() {
            return Err(TransportError::Protocol(format!(
                "ADD_ONION rejected: status {}",
                reply.status
            )));
        }
        let service_id = reply
            .value("ServiceID")
            .ok_or_else(|| TransportError::Protocol("ADD_ONION reply missing ServiceID".into()))?
            .to_string();

        // Wait until some directory accepted the descriptor; before that the
        // address is not reachable.
        let deadline = time::Instant::now() + Duration::from_millis(self.config.publish_timeout_ms);
        loop {
            let now = time::Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout("onion service publication".into()));
            }
            let event = control.next_event(deadline - now).await?;
            if control::is_upload_event(&event, &service_id) {
                break;
            }
            debug!(event, "hidden service event");
        }
        let reply = control.command("SETEVENTS").await?;
        if !reply.is_ok() {
            warn!(status = reply.status, "clearing event registration failed");
        }
        drop(guard);

        self.published
            .lock()
            .insert(node_id.to_string(), service_id.clone());
        let address = Address::new(format!("{service_id}.onion"), port);
        self.bootstrap.update(
            BootstrapState::ServicePublished,
            0.0,
            format!("Onion service published for {node_id}"),
        );
        info!(transport = %TransportType::Tor, node_id, address = %address, "onion service published");
        Ok(ServerSocketResult {
            node_id: node_id.to_string(),
            server_socket: ServerSocket::Onion(listener),
            address,
        })
    }

    async fn get_socket(&self, address: &Address) -> Result<TcpStream, TransportError> {
        self.require_ready()?;
        let stream = self.dial(address).await?;
        debug!(transport = %TransportType::Tor, peer = %address, "outbound socket connected");
        self.bootstrap.on_peer_connected(format!("Connected to {address}"));
        Ok(stream)
    }

    async fn is_peer_online(&self, address: &Address) -> bool {
        self.dial(address).await.is_ok()
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.state.set(TransportState::ShuttingDown);
        let published: Vec<(String, String)> = self.published.lock().drain().collect();
        let mut guard = self.control.lock().await;
        if let Some(control) = guard.as_mut() {
            for (node_id, service_id) in published {
                match control.command(&format!("DEL_ONION {service_id}")).await {
                    Ok(reply) if reply.is_ok() => {
                        debug!(node_id, service_id, "onion service removed");
                    }
                    Ok(reply) => {
                        warn!(node_id, service_id, status = reply.status, "DEL_ONION rejected");
                    }
                    Err(err) => {
                        warn!(node_id, service_id, error = %err, "DEL_ONION failed");
                    }
                }
            }
        }
        *guard = None;
        drop(guard);
        self.state.set(TransportState::Shutdown);
        Ok(())
    }
}
