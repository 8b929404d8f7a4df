//! Transport error taxonomy.

use thiserror::Error;

/// Failures raised by transport bring-up and socket operations.
///
/// `Connection` marks bring-up failures that are fatal to the whole
/// transport instance. Everything else is local to one call and leaves the
/// transport usable.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Bring-up failed; the transport instance is unusable.
    #[error("transport bring-up: {0}")]
    Connection(#[source] Box<TransportError>),

    /// Socket-level I/O failure.
    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side broke its control protocol (SOCKS handshake, Tor
    /// control port, SAM bridge).
    #[error("protocol: {0}")]
    Protocol(String),

    /// A bounded wait elapsed.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Operation needs a state the transport is not in.
    #[error("transport not ready: {0}")]
    NotReady(String),

    /// Malformed configuration.
    #[error("transport config: {0}")]
    Config(#[from] toml::de::Error),
}

impl TransportError {
    /// Escalate a failure to a fatal bring-up error, keeping the cause in
    /// the source chain.
    pub fn into_fatal(self) -> Self {
        match self {
            fatal @ TransportError::Connection(_) => fatal,
            other => TransportError::Connection(Box::new(other)),
        }
    }

    /// Whether the failure killed the transport instance rather than one
    /// call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Connection(_))
    }
}
