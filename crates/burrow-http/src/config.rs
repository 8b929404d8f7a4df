//! Provider and proxy configuration, loadable from TOML.

use crate::error::RequestError;
use serde::Deserialize;

/// One provider entry as configured: its URL and operator. The required
/// transport is derived from the URL, never configured.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderEntry {
    /// Base URL of the endpoint.
    pub url: String,
    /// Operator name, for logs and failure reports.
    pub operator: String,
}

/// Settings for the provider failover engine and its per-transport proxies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Preferred providers. When non-empty, selection starts here.
    pub providers: Vec<ProviderEntry>,
    /// Built-in fallbacks used when no provider is configured or every
    /// configured one has failed.
    pub fallback_providers: Vec<ProviderEntry>,
    /// SOCKS proxy requests to `.onion` providers go through. The `socks5h`
    /// scheme makes the proxy resolve hostnames, so onion names never hit
    /// DNS.
    pub socks5_proxy: String,
    /// HTTP proxy requests to `.i2p` providers go through.
    pub i2p_proxy: String,
    /// Hard bound on one attempt against one provider, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            fallback_providers: Vec::new(),
            socks5_proxy: "socks5h://127.0.0.1:9050".to_string(),
            i2p_proxy: "http://127.0.0.1:4444".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl HttpConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, RequestError> {
        Ok(toml::from_str(raw)?)
    }
}
