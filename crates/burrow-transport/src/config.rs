//! Per-transport configuration, loadable from TOML.

use crate::error::TransportError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Settings for the direct TCP transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClearNetConfig {
    /// Host advertised for the local listening endpoint.
    pub my_host: String,
    /// Bound on one dial plus protocol handshake, in milliseconds.
    pub socket_timeout_ms: u64,
    /// Bound on the TCP connect itself, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ClearNetConfig {
    fn default() -> Self {
        Self {
            my_host: "127.0.0.1".to_string(),
            socket_timeout_ms: 120_000,
            connect_timeout_ms: 5_000,
        }
    }
}

/// Settings for the Tor transport, which drives an external daemon over its
/// control port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TorConfig {
    /// Control port endpoint of the daemon.
    pub control_host: String,
    /// Control port of the daemon.
    pub control_port: u16,
    /// Password for `AUTHENTICATE`. Takes precedence over the cookie.
    pub control_password: Option<String>,
    /// Cookie file to authenticate with when no password is configured.
    pub cookie_path: Option<PathBuf>,
    /// SOCKS endpoint override; queried from the daemon when unset.
    pub socks_address: Option<String>,
    /// Bound on one dial through the SOCKS proxy, in milliseconds. Onion
    /// dials routinely take 5-15 seconds.
    pub socket_timeout_ms: u64,
    /// Bound on onion-service publication, in milliseconds.
    pub publish_timeout_ms: u64,
    /// Bound on daemon bootstrap during initialize, in milliseconds.
    pub bootstrap_timeout_ms: u64,
    /// Extra `SETCONF` pairs applied after authentication.
    pub torrc_overrides: BTreeMap<String, String>,
    /// Alternative directory authorities, applied as `DirAuthority` values.
    pub directory_authorities: Vec<String>,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            control_host: "127.0.0.1".to_string(),
            control_port: 9051,
            control_password: None,
            cookie_path: None,
            socks_address: None,
            socket_timeout_ms: 120_000,
            publish_timeout_ms: 120_000,
            bootstrap_timeout_ms: 240_000,
            torrc_overrides: BTreeMap::new(),
            directory_authorities: Vec::new(),
        }
    }
}

/// Settings for the I2P transport, which speaks SAMv3 to an external router.
///
/// The bandwidth and router fields do not affect the SAM path; they are the
/// configuration surface of the router integration and are carried so one
/// document configures both sides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct I2pConfig {
    /// SAM bridge host.
    pub sam_host: String,
    /// SAM bridge port.
    pub sam_port: u16,
    /// Bound on one stream dial, in milliseconds.
    pub socket_timeout_ms: u64,
    /// Router inbound bandwidth budget.
    pub inbound_kbytes_per_second: u32,
    /// Router outbound bandwidth budget.
    pub outbound_kbytes_per_second: u32,
    /// Share of bandwidth donated to routing for others.
    pub bandwidth_share_percentage: u32,
    /// Run a router in-process instead of an external one. Not supported;
    /// the transport logs a warning and uses the external bridge.
    pub embedded_router: bool,
}

impl Default for I2pConfig {
    fn default() -> Self {
        Self {
            sam_host: "127.0.0.1".to_string(),
            sam_port: 7656,
            socket_timeout_ms: 180_000,
            inbound_kbytes_per_second: 1024,
            outbound_kbytes_per_second: 512,
            bandwidth_share_percentage: 50,
            embedded_router: false,
        }
    }
}

/// All transport settings under one TOML document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Clearnet section.
    pub clear_net: ClearNetConfig,
    /// Tor section.
    pub tor: TorConfig,
    /// I2P section.
    pub i2p: I2pConfig,
}

impl TransportConfig {
    /// Parse a TOML document; absent keys fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, TransportError> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_local_daemons() {
        let config = TransportConfig::default();
        assert_eq!(config.tor.control_port, 9051);
        assert_eq!(config.i2p.sam_port, 7656);
        assert_eq!(config.clear_net.my_host, "127.0.0.1");
        assert_eq!(config.tor.publish_timeout_ms, 120_000);
        assert!(!config.i2p.embedded_router);
    }

    #[test]
    fn test_partial_toml_overrides_keep_other_defaults() {
        let raw = r#"
            [tor]
            control_port = 19051
            control_password = "hunter2"

            [tor.torrc_overrides]
            MaxCircuitDirtiness = "600"

            [i2p]
            inbound_kbytes_per_second = 2048
        "#;
        let config = TransportConfig::from_toml_str(raw).expect("valid toml");
        assert_eq!(config.tor.control_port, 19051);
        assert_eq!(config.tor.control_password.as_deref(), Some("hunter2"));
        assert_eq!(
            config.tor.torrc_overrides.get("MaxCircuitDirtiness"),
            Some(&"600".to_string())
        );
        assert_eq!(config.i2p.inbound_kbytes_per_second, 2048);
        assert_eq!(config.i2p.sam_port, 7656);
        assert_eq!(config.clear_net.connect_timeout_ms, 5_000);
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        let result = TransportConfig::from_toml_str("tor = \"not a table\"");
        assert!(matches!(result, Err(TransportError::Config(_))));
    }
}
