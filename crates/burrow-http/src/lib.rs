//! # Burrow Http - Resilient External Requests
//!
//! **Purpose**: Execute auxiliary HTTP lookups (reference time, exchange
//! rates) against interchangeable external providers, transparently failing
//! over between them and honoring each provider's transport: clearnet
//! directly, `.onion` through a SOCKS proxy, `.i2p` through an HTTP proxy.
//!
//! ## Core Concepts
//!
//! - **Providers**: `{url, operator}` pairs whose required transport is
//!   derived from the URL host. Pools are filtered at construction to the
//!   transports locally available.
//! - **Failover**: transient failures (5xx, 408, 429, no response) rotate
//!   to a randomly selected next candidate, bounded by the total provider
//!   count. Client-side failures surface immediately.
//! - **The fetch seam**: the engine drives [`HttpFetch`], not a concrete
//!   client, so tests inject scripted fakes and never open sockets.
//!
//! ## What's NOT in this crate
//!
//! - Gossip traffic and peer connections (see `burrow-transport`)
//! - Response interpretation beyond text/JSON decoding (callers own it)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Provider lists and proxy endpoints.
pub mod config;

/// The failover engine.
pub mod engine;

/// Request error taxonomy.
pub mod error;

/// The HTTP seam and its reqwest implementation.
pub mod fetch;

/// External providers and their required transports.
pub mod provider;

pub use burrow_transport::TransportType;
pub use config::{HttpConfig, ProviderEntry};
pub use engine::RequestService;
pub use error::RequestError;
pub use fetch::{FetchResponse, HttpFetch, ReqwestFetcher};
pub use provider::Provider;
