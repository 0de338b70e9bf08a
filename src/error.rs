use std::time::Duration;

use thiserror::Error;

/// [Result] alias for return types of the crate API
pub type Result<T> = std::result::Result<T, Error>;

/// Error enum type
#[derive(Debug, Error)]
pub enum Error {
    /// The link to the Crazyflie could not be opened or negotiated.
    #[error("Cannot connect to {uri}: {reason}")]
    ConnectionError {
        /// Address of the Crazyflie
        uri: String,
        /// Reason reported by the link
        reason: String,
    },
    /// The required deck did not report itself present in time.
    ///
    /// The connection is released before this error is returned.
    #[error("[#{id}] No {capability} detected within {timeout:?}")]
    HardwareNotReady {
        /// Identifier of the session
        id: u8,
        /// Name of the deck presence parameter that was checked
        capability: String,
        /// How long the session waited
        timeout: Duration,
    },
    /// Log sink or configuration file I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// Parameter subsystem error. The String contains the reason.
    #[error("Param error: {0}")]
    ParamError(String),
    /// Log subsystem error. The String contains the reason.
    #[error("Log error: {0}")]
    LogError(String),
    /// [Value](crate::Value) conversion error. The String contains the reason.
    #[error("Conversion error: {0}")]
    ConversionError(String),
    /// A motion command would take the Crazyflie outside of its safety boundary.
    #[error("Target ({x:.2}, {y:.2}) is {distance:.2} m from take-off, beyond the {limit:.2} m boundary")]
    OutOfBounds {
        /// Target x, relative to the take-off point
        x: f32,
        /// Target y, relative to the take-off point
        y: f32,
        /// Horizontal distance of the target from the take-off point
        distance: f32,
        /// Configured safety boundary
        limit: f32,
    },
    /// Error reported by the flight-control library. The String contains the reason.
    #[error("Link error: {0}")]
    LinkError(String),
    /// The Crazyflie link is currently disconnected.
    #[error("The Crazyflie is disconnected")]
    Disconnected,
    /// Invalid configuration. The String contains the reason.
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// The task running a session of a fleet panicked.
    #[error("Session #{0} panicked")]
    SessionPanicked(u8),
    /// Error raised by user action code.
    #[error("{0}")]
    ActionError(String),
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::ConfigError(error.to_string())
    }
}

#[cfg(feature = "radio")]
impl From<crazyflie_lib::Error> for Error {
    fn from(error: crazyflie_lib::Error) -> Self {
        match error {
            crazyflie_lib::Error::Disconnected => Self::Disconnected,
            crazyflie_lib::Error::ParamError(reason) => Self::ParamError(reason),
            crazyflie_lib::Error::LogError(reason) => Self::LogError(reason),
            crazyflie_lib::Error::ConversionError(reason) => Self::ConversionError(reason),
            error => Self::LinkError(format!("{:?}", error)),
        }
    }
}

impl Error {
    /// True if this error means the session was never able to fly safely
    pub fn is_hardware_not_ready(&self) -> bool {
        matches!(self, Error::HardwareNotReady { .. })
    }
}
