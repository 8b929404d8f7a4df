//! The uniform transport interface.

use crate::address::{Address, TransportType};
use crate::bootstrap::{BootstrapInfo, TransportState};
use crate::error::TransportError;
use crate::i2p::SamAcceptor;
use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// A bound listening endpoint in transport-specific form, accepted
/// uniformly.
#[derive(Debug)]
pub enum ServerSocket {
    /// Direct OS listener on clearnet.
    Tcp(TcpListener),
    /// Local forward target of an onion service. Inbound streams arrive
    /// from the daemon, so the remote peer stays anonymous.
    Onion(TcpListener),
    /// SAM stream acceptor for an I2P session.
    Sam(SamAcceptor),
}

impl ServerSocket {
    /// Wait for the next inbound stream. The peer address is the remote
    /// socket address on clearnet, the sender's destination for I2P, and
    /// absent for Tor.
    pub async fn accept(&mut self) -> Result<(TcpStream, Option<Address>), TransportError> {
        match self {
            ServerSocket::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok((stream, Some(Address::new(peer.ip().to_string(), peer.port()))))
            }
            ServerSocket::Onion(listener) => {
                let (stream, _local_forward) = listener.accept().await?;
                Ok((stream, None))
            }
            ServerSocket::Sam(acceptor) => acceptor.accept().await,
        }
    }
}

/// What [`TransportService::get_server_socket`] yields: the node the
/// endpoint belongs to, the listening socket, and the address peers can
/// reach it under. All three transports return this same shape so callers
/// never branch on network flavor.
#[derive(Debug)]
pub struct ServerSocketResult {
    /// Node the endpoint was published for.
    pub node_id: String,
    /// The listening socket.
    pub server_socket: ServerSocket,
    /// Externally reachable address of the endpoint.
    pub address: Address,
}

/// One of the three peer transports behind a uniform async interface.
///
/// Bring-up failures are fatal to the instance and surface as
/// [`TransportError::Connection`]; per-socket failures are local to the call
/// and leave the transport state untouched.
#[async_trait]
pub trait TransportService: Send + Sync {
    /// Which network this instance serves.
    fn transport_type(&self) -> TransportType;

    /// Current lifecycle state.
    fn state(&self) -> TransportState;

    /// Watch lifecycle state changes.
    fn state_changes(&self) -> watch::Receiver<TransportState>;

    /// Observable bring-up progress.
    fn bootstrap_info(&self) -> &BootstrapInfo;

    /// Bring the transport up. Idempotent: repeated calls after success
    /// return immediately and concurrent callers await the same bring-up.
    /// Tor and I2P bring-up can take minutes; progress is readable through
    /// [`TransportService::bootstrap_info`] the whole time.
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Bind and publish a listening endpoint for `node_id`. For clearnet
    /// this is a plain bind; for Tor it creates an onion service and waits
    /// (bounded) until its descriptor is published; for I2P it opens a
    /// session and derives a destination.
    async fn get_server_socket(
        &self,
        port: u16,
        node_id: &str,
    ) -> Result<ServerSocketResult, TransportError>;

    /// Open an outbound stream to `address`.
    async fn get_socket(&self, address: &Address) -> Result<TcpStream, TransportError>;

    /// Best-effort reachability probe: attempt a connection, then close it.
    async fn is_peer_online(&self, address: &Address) -> bool;

    /// Tear the transport down, releasing published endpoints.
    async fn shutdown(&self) -> Result<(), TransportError>;
}
