//! Error types for the pool sniper

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pool sniper
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Chain data errors (transient - candidate stays pending and is rescored)
    #[error("Chain data unavailable: {0}")]
    ChainData(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("Liquidity lookup failed: {0}")]
    LiquidityLookup(String),

    // Detection stream errors
    #[error("Stream connection failed: {0}")]
    StreamConnection(String),

    #[error("Stream disconnected")]
    StreamDisconnected,

    #[error("Stream decode error: {0}")]
    StreamDecode(String),

    // Execution errors (buy placed after a successful allocation failed;
    // the reservation must be reversed via a compensating settle)
    #[error("Buy execution failed for {mint}: {reason}")]
    BuyExecution { mint: String, reason: String },

    #[error("Exit recommendation failed: {0}")]
    ExitRecommendation(String),

    // Pool / ledger errors
    #[error("Ledger write failed: {0}")]
    LedgerWrite(String),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    // Input validation
    #[error("Invalid mint address: {0}")]
    InvalidMint(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is transient (external data temporarily
    /// unavailable). Transient failures leave a candidate `pending` for the
    /// background rescorer instead of rejecting it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ChainData(_)
                | Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::LiquidityLookup(_)
                | Error::StreamDisconnected
        )
    }

    /// Check if this error must halt the process (supervisor decides).
    /// Everything else is represented as a status value at the component
    /// boundary, never an exception.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::LedgerWrite(_) | Error::Config(_))
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::LiquidityLookup(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::ChainData("pair not indexed yet".into()).is_transient());
        assert!(Error::RpcTimeout(3000).is_transient());
        assert!(!Error::LedgerWrite("disk full".into()).is_transient());
        assert!(!Error::InvalidMint("abc".into()).is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::LedgerWrite("disk full".into()).is_fatal());
        assert!(!Error::Rpc("503".into()).is_fatal());
    }
}
