//! Error types for ferrywatch.
//!
//! All errors are strongly typed using thiserror, one enum per concern,
//! gathered under [`MonitorError`]. None of them is fatal to a running
//! session: fetch failures end a single poll, configuration errors refuse a
//! single action.

use thiserror::Error;

use crate::config::ChannelKind;

/// Failures while fetching the trip list for one poll.
#[allow(missing_docs)]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Trip fetch failed: {message}")]
    Transport {
        message: String,
    },

    #[error("Trip source returned HTTP {code}: {body}")]
    Status {
        code: u16,
        body: String,
    },

    #[error("Failed to decode trip listing: {message}")]
    Decode {
        message: String,
    },
}

impl FetchError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns true if the next poll has a reasonable chance of succeeding.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { code, .. } => *code >= 500,
            Self::Decode { .. } => false,
        }
    }
}

/// Configuration problems surfaced at the offending action.
#[allow(missing_docs)]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Select at least one departure to monitor")]
    EmptyWatchList,

    #[error("{channel} alerts are enabled but no {field} is set", field = .channel.destination_field())]
    MissingDestination {
        channel: ChannelKind,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },

    #[error("Time window starts at {from} but ends at {to}")]
    InvalidTimeWindow {
        from: String,
        to: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Preference store failures.
#[derive(Debug, Error)]
pub enum PreferencesError {
    /// Reading or writing the file failed.
    #[error("Preferences I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The saved snapshot is not valid JSON.
    #[error("Preferences serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures talking to a session runtime worker.
#[allow(missing_docs)]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Monitor worker disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Monitor control queue is full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Failed to spawn monitor thread '{name}': {message}")]
    Spawn {
        name: String,
        message: String,
    },
}

/// Top-level error type for ferrywatch.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A poll or refresh could not fetch the listing.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// An action was refused because of its inputs.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The preference store failed.
    #[error("Preferences error: {0}")]
    Preferences(#[from] PreferencesError),

    /// The runtime worker could not be reached.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl MonitorError {
    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a fetch error.
    #[must_use]
    pub const fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }

    /// Returns true if retrying the same action later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_retryable(),
            Self::Config(_) | Self::Preferences(_) => false,
            Self::Runtime(e) => matches!(e, RuntimeError::QueueFull { .. }),
        }
    }
}

/// Result type alias for ferrywatch operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
