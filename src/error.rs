//! Error types for the intake bot.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

/// Text-generation oracle errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Failures of a single intake turn.
///
/// `Lookup` and `Persistence` are caught at the transition boundary and shown
/// to the user as an apology. `Parse` becomes an explicit "didn't understand"
/// reply.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Address lookup failed: {0}")]
    Lookup(#[source] DatabaseError),

    #[error("Persistence failed: {0}")]
    Persistence(#[source] DatabaseError),

    #[error("Unrecognized reply: {0}")]
    Parse(String),
}

impl IntakeError {
    /// Whether the error came from the store rather than from user input.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Lookup(_) | Self::Persistence(_))
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
