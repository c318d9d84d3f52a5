use avcp_discovery::DiscoveryError;
use thiserror::Error;

/// Errors that can occur while coordinating discovery
#[derive(Error, Debug)]
pub enum ControlPointError {
    /// Operation requires an initialized control point
    #[error("Control point is not initialized")]
    NotInitialized,

    /// The discovery engine reported a failure
    #[error("Discovery engine error: {0}")]
    Engine(#[from] DiscoveryError),

    /// The lifecycle worker thread is gone
    #[error("Lifecycle worker has shut down")]
    WorkerDisconnected,

    /// Failed to start the search runtime or worker thread
    #[error("Failed to start background runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// Invalid configuration values
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Result type for control point operations
pub type Result<T> = std::result::Result<T, ControlPointError>;
