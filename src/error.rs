//! Error types shared by every stage of the likelihood engine.

use thiserror::Error;

/// Unified error type for tree input, discretisation and DP failures.
#[derive(Debug, Error)]
pub enum DlrsError {
    /// I/O error while reading trees, maps or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed Newick string or leaf map line.
    #[error("parse error: {0}")]
    Parse(String),

    /// Bad arguments or inconsistent inputs.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The host tree discretisation cannot accommodate the guest tree.
    /// This is the only fatal condition of the DP itself.
    #[error("insufficient discretisation: {0}. Try a denser discretisation for 1) the stem arc, 2) the remaining arcs")]
    InsufficientDiscretisation(String),

    /// Failure building a relaxed-clock rate distribution.
    #[error("rate distribution error: {0}")]
    Distribution(String),

    /// Configuration file could not be decoded.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Tab-separated input/output failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DlrsError>;
