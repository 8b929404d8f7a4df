//! Request error taxonomy.

use thiserror::Error;

/// Failures raised by the provider failover engine.
///
/// Retryable failures (5xx, 408, 429, transport-level errors) are consumed
/// internally by provider rotation and only surface wrapped in `Exhausted`
/// once every candidate has been tried. Everything else fails the request
/// immediately.
#[derive(Debug, Error)]
pub enum RequestError {
    /// No configured or fallback provider matches a supported transport;
    /// the engine is permanently disabled.
    #[error("no http provider available for the supported transports")]
    Disabled,

    /// Shutdown has begun; no new requests are attempted.
    #[error("request service is shutting down")]
    ShuttingDown,

    /// The provider answered with a non-success HTTP status.
    #[error("http status {status} from {operator}")]
    Status {
        /// HTTP status code of the response.
        status: u16,
        /// Operator of the provider that answered.
        operator: String,
    },

    /// The request never produced an HTTP response.
    #[error("request failed: {0}")]
    Fetch(String),

    /// The request exceeded the hard per-attempt timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Every candidate provider has been tried and failed.
    #[error("exhausted all {attempts} providers; last failure: {last}")]
    Exhausted {
        /// How many attempts were made.
        attempts: usize,
        /// The failure of the final attempt.
        last: Box<RequestError>,
    },

    /// A provider URL could not be parsed.
    #[error("invalid provider url: {0}")]
    InvalidUrl(String),

    /// The response body did not decode as the expected shape.
    #[error("malformed response body: {0}")]
    Body(String),

    /// Malformed configuration.
    #[error("http config: {0}")]
    Config(#[from] toml::de::Error),
}

impl RequestError {
    /// Whether rotating to another provider could plausibly help.
    ///
    /// Server-side trouble (5xx), timeouts (408), throttling (429) and
    /// transport-level failures are transient per provider. Other HTTP
    /// statuses indicate a request the next provider would reject the same
    /// way.
    pub fn is_retryable(&self) -> bool {
        match self {
            RequestError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            RequestError::Fetch(_) | RequestError::Timeout(_) => true,
            _ => false,
        }
    }
}
