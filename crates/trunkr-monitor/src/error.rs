//! Error types for the live monitor

use std::{error::Error as StdError, fmt};

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur while monitoring the event store
#[derive(Debug)]
pub enum MonitorError {
    /// Event store query or connectivity error
    Store(trunkr_core::Error),

    /// I/O error
    Io(std::io::Error),

    /// Configuration error
    Configuration {
        /// Error message
        message: String,
    },

    /// Observer reported a failure
    Observer {
        /// Error message
        message: String,
    },

    /// Service already running
    ServiceAlreadyRunning,
}

impl MonitorError {
    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new observer error
    #[must_use]
    pub fn observer<S: Into<String>>(message: S) -> Self {
        Self::Observer {
            message: message.into(),
        }
    }
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(err) => write!(f, "Event store error: {err}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Configuration { message } => write!(f, "Configuration error: {message}"),
            Self::Observer { message } => write!(f, "Observer error: {message}"),
            Self::ServiceAlreadyRunning => write!(f, "Monitor service is already running"),
        }
    }
}

impl StdError for MonitorError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

// From implementations for automatic conversions
impl From<trunkr_core::Error> for MonitorError {
    fn from(err: trunkr_core::Error) -> Self {
        match err {
            trunkr_core::Error::Configuration { message } => Self::Configuration { message },
            trunkr_core::Error::Validation { field, message } => Self::Configuration {
                message: format!("{field}: {message}"),
            },
            other => Self::Store(other),
        }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<config::ConfigError> for MonitorError {
    fn from(err: config::ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}
