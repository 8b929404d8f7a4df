//! Error types for the storage layer.
//!
//! Validation verdicts are *not* errors; they are [`StoreResult`] values
//! returned to the caller so it can decide whether to relay. `StorageError`
//! covers the genuinely exceptional paths: I/O, snapshot codecs, and
//! configuration.
//!
//! [`StoreResult`]: crate::result::StoreResult

use thiserror::Error;

/// Failures raised by persistence, snapshot codecs, and configuration.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing a persisted snapshot failed.
    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted snapshot could not be encoded or decoded.
    #[error("snapshot codec: {0}")]
    Codec(#[from] bincode::Error),

    /// The storage configuration could not be parsed.
    #[error("storage config: {0}")]
    Config(#[from] toml::de::Error),
}
