//! Transport-opaque peer addressing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which network a peer endpoint or external provider lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Direct TCP over the open internet.
    Clear,
    /// Onion services through a Tor daemon.
    Tor,
    /// Streams through an I2P router's SAM bridge.
    I2p,
}

impl TransportType {
    /// Derive the transport a host requires from its suffix: `.onion` hosts
    /// need Tor, `.i2p` hosts and raw base64 destinations need an I2P
    /// router, anything else is dialed directly.
    pub fn from_host(host: &str) -> Self {
        if host.ends_with(".onion") {
            TransportType::Tor
        } else if host.ends_with(".i2p") || is_base64_destination(host) {
            TransportType::I2p
        } else {
            TransportType::Clear
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportType::Clear => "clear",
            TransportType::Tor => "tor",
            TransportType::I2p => "i2p",
        };
        write!(f, "{name}")
    }
}

/// An I2P destination handed around in base64 form rather than as a `.i2p`
/// name. The trailing certificate bytes of the standard destination encoding
/// give the distinctive suffix.
pub fn is_base64_destination(host: &str) -> bool {
    host.ends_with("AAA==")
}

/// Host and port of a peer endpoint. The host's meaning depends on the
/// transport: an IP or DNS name on clearnet, a `.onion` name for Tor, a
/// destination for I2P. Created when a transport publishes or learns an
/// endpoint and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    /// Build an address from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Host component.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port component. Inbound I2P peers carry port 0; their destination
    /// alone identifies them.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Transport this address is reachable over.
    pub fn transport_type(&self) -> TransportType {
        TransportType::from_host(&self.host)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_derivation_from_host_suffix() {
        assert_eq!(
            TransportType::from_host("runbtcpn7tor.onion"),
            TransportType::Tor
        );
        assert_eq!(TransportType::from_host("tracker.i2p"), TransportType::I2p);
        assert_eq!(
            TransportType::from_host("shortb64characters-AAA=="),
            TransportType::I2p
        );
        assert_eq!(TransportType::from_host("example.com"), TransportType::Clear);
        assert_eq!(TransportType::from_host("192.168.1.17"), TransportType::Clear);
    }

    #[test]
    fn test_address_carries_transport() {
        let address = Address::new("xyz.onion", 8000);
        assert_eq!(address.transport_type(), TransportType::Tor);
        assert_eq!(address.host(), "xyz.onion");
        assert_eq!(address.port(), 8000);
        assert_eq!(address.to_string(), "xyz.onion:8000");
    }
}
