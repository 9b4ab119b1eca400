//! Error types for privacy mechanisms and calibration.

/// Errors that can occur while configuring or calibrating private training.
#[derive(Debug, thiserror::Error)]
pub enum PrivacyError {
    /// Invalid shape parameters, surfaced at construction time.
    #[error("configuration error: {msg}")]
    Configuration {
        /// Human-readable error description.
        msg: String,
    },

    /// The requested privacy budget cannot be met.
    #[error("calibration error: {msg}")]
    Calibration {
        /// Human-readable error description.
        msg: String,
    },
}

/// Result type for privacy operations.
pub type Result<T> = std::result::Result<T, PrivacyError>;

impl PrivacyError {
    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration { msg: msg.into() }
    }

    /// Create a calibration error.
    pub fn calibration<S: Into<String>>(msg: S) -> Self {
        Self::Calibration { msg: msg.into() }
    }

    /// Whether this error was raised by the noise calibration search.
    pub fn is_calibration(&self) -> bool {
        matches!(self, Self::Calibration { .. })
    }
}
