//! Error types for the discovery engine.

use std::fmt;

/// Error type for discovery operations.
///
/// Represents the failure modes of the SSDP engine: socket and HTTP
/// failures, malformed device descriptions, engine misuse and rejected
/// event subscriptions.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Network-related errors (socket creation, HTTP requests, etc.)
    NetworkError(String),
    /// Parsing errors (XML, SSDP message, URLs, etc.)
    ParseError(String),
    /// The engine was used before `initialize()` or after `terminate()`
    NotReady,
    /// A GENA SUBSCRIBE/UNSUBSCRIBE was rejected or malformed
    SubscriptionError(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DiscoveryError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DiscoveryError::NotReady => write!(f, "Discovery engine is not initialized"),
            DiscoveryError::SubscriptionError(msg) => write!(f, "Subscription error: {}", msg),
        }
    }
}

impl std::error::Error for DiscoveryError {}

/// Convenience Result type alias for discovery operations.
///
/// Equivalent to `std::result::Result<T, DiscoveryError>`.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
