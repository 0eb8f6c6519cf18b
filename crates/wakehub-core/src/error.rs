//! Error types for the wakehub core
//!
//! [`Error`] covers failures reported by capability implementations
//! (network, HTTP, store, provider). Each service additionally exposes a flat
//! failure taxonomy with stable machine codes; see `PowerError`, `BridgeError`
//! and `OtaError`.

use thiserror::Error;

/// Result type alias for wakehub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for capability implementations
#[derive(Error, Debug)]
pub enum Error {
    /// Address resolution errors
    #[error("Address lookup error: {0}")]
    AddressLookup(String),

    /// Config store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// A bounded call ran out of time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Pub/sub broker errors
    #[error("Pub/sub error: {0}")]
    PubSub(String),

    /// Firmware download or flash errors
    #[error("Firmware error: {0}")]
    Firmware(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create an address lookup error
    pub fn address_lookup(msg: impl Into<String>) -> Self {
        Self::AddressLookup(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a pub/sub error
    pub fn pubsub(msg: impl Into<String>) -> Self {
        Self::PubSub(msg.into())
    }

    /// Create a firmware error
    pub fn firmware(msg: impl Into<String>) -> Self {
        Self::Firmware(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
