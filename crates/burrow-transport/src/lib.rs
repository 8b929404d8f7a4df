//! # Burrow Transport - Uniform Peer Transports
//!
//! **Purpose**: Give the networking layer one async interface over three
//! peer transports: plain TCP, Tor onion services, and I2P destinations.
//! Callers bind, dial, probe and shut down the same way on every network;
//! the flavor differences (daemon control ports, SOCKS proxies, SAM
//! sessions) live behind [`TransportService`].
//!
//! ## Core Concepts
//!
//! - **Transport service**: one instance per network flavor. Bring-up is
//!   explicit and idempotent through [`TransportService::initialize`];
//!   failures there are fatal to the instance while per-socket failures are
//!   local to the call.
//! - **Lifecycle state**: a forward-only machine (`uninitialized` through
//!   `shutdown`) observable through watch channels.
//! - **Bootstrap progress**: [`BootstrapInfo`] publishes milestone and
//!   fractional progress for UIs while Tor or I2P spend minutes coming up.
//! - **Addresses**: host/port pairs whose transport flavor is derived from
//!   the host shape (`.onion`, `.i2p`, base64 destination, anything else).
//!
//! ## What's NOT in this crate
//!
//! - Wire framing and message envelopes (callers own the byte streams)
//! - Peer/connection management and gossip dispatch
//! - HTTP requests over these networks (see `burrow-http`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Addresses and transport flavor derivation.
pub mod address;

/// Lifecycle states and observable bring-up progress.
pub mod bootstrap;

/// Plain TCP transport.
pub mod clear_net;

/// Per-transport daemon configuration.
pub mod config;

/// Error types for transport bring-up and sockets.
pub mod error;

/// I2P transport over a SAM bridge.
pub mod i2p;

/// The uniform transport interface.
pub mod service;

/// Tor transport over a control port and SOCKS proxy.
pub mod tor;

pub use address::{is_base64_destination, Address, TransportType};
pub use bootstrap::{BootstrapInfo, BootstrapState, TransportState, TransportStateCell};
pub use clear_net::ClearNetTransportService;
pub use config::{ClearNetConfig, I2pConfig, TorConfig, TransportConfig};
pub use error::TransportError;
pub use i2p::{I2pTransportService, SamAcceptor};
pub use service::{ServerSocket, ServerSocketResult, TransportService};
pub use tor::TorTransportService;
