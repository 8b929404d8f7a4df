//! External HTTP providers and the transports they require.

use crate::error::RequestError;
use burrow_transport::TransportType;
use std::fmt;

/// One external HTTP endpoint: where it lives, who runs it, and which
/// transport reaching it requires. The transport is derived from the URL
/// host (`.onion` needs Tor, `.i2p` needs I2P, anything else is clearnet),
/// so configuration only carries `{url, operator}` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Provider {
    base_url: String,
    operator: String,
    transport_type: TransportType,
}

impl Provider {
    /// Build a provider from its base URL and operator name, deriving the
    /// required transport from the URL host.
    pub fn from_parts(
        base_url: impl Into<String>,
        operator: impl Into<String>,
    ) -> Result<Self, RequestError> {
        let base_url = base_url.into();
        let parsed = reqwest::Url::parse(&base_url)
            .map_err(|err| RequestError::InvalidUrl(format!("{base_url}: {err}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| RequestError::InvalidUrl(format!("{base_url}: no host")))?;
        Ok(Self {
            transport_type: TransportType::from_host(host),
            base_url,
            operator: operator.into(),
        })
    }

    /// Base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Who operates the endpoint, for logs and failure reports.
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Transport required to reach the endpoint.
    pub fn transport_type(&self) -> TransportType {
        self.transport_type
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.base_url, self.operator)
    }
}
