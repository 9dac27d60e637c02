//! Error types for the metrics simulator

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the metrics simulator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Registry Errors (fatal at startup)
    // =========================================================================
    /// An instrument with the same name is already registered
    #[error("Instrument already registered: {name}")]
    DuplicateInstrument { name: String },

    /// Registration or collection rejected by the prometheus library
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Lookup of an instrument that was never registered
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Text exposition could not be produced
    #[error("Failed to encode metrics: {0}")]
    Encode(String),

    /// Uniform range with no values in it
    #[error("Empty value range [{low}, {high})")]
    InvalidRange { low: u64, high: u64 },

    // =========================================================================
    // Listener Errors (fatal)
    // =========================================================================
    /// Listen address could not be parsed
    #[error("Invalid listen address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// Listener failed to bind
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Listener failed while accepting connections
    #[error("Accept error: {0}")]
    Accept(#[source] std::io::Error),

    // =========================================================================
    // Simulation Errors (recoverable, skip one update)
    // =========================================================================
    /// A host fact was unavailable for this tick
    #[error("Fact unavailable: {0}")]
    Fact(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
