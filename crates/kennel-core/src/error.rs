//! Error types for kennel-core.

use thiserror::Error;

/// Result type alias for kennel-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while provisioning or releasing a sandbox.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error from kennel-domain
    #[error("domain error: {0}")]
    Domain(#[from] kennel_domain::DomainError),

    /// Invalid sandbox configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Both a static `<ip>` block and a generated address were requested
    #[error("network definition already declares an <ip> block")]
    AddressConflict,

    /// Every candidate subnet is taken by an existing network
    #[error("no free IPv4 subnet left for a new network")]
    NoFreeAddress,

    /// Address discovery kept colliding with other networks
    #[error("too many attempts ({0}) to get a valid IP address")]
    TooManyAttempts(u32),

    /// The hypervisor rejected the network definition
    #[error("unable to create new network: {0}")]
    NetworkCreation(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
