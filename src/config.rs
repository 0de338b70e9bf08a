//! # Fleet configuration
//!
//! JSON description of a fleet flight. Every field is optional:
//!
//! ```
//! # use crazyflie_fleet::config::FleetConfig;
//! let config = FleetConfig::from_json_str(r#"{
//!     "uris": ["radio://0/80/2M/E7E7E7E701", "radio://0/80/2M/E7E7E7E702"],
//!     "log_dir": "logs",
//!     "backend": "sim",
//!     "session": { "default_height": 0.4, "params": { "stabilizer.estimator": "2" } },
//!     "maneuver": { "kind": "circle", "radius": 0.5 }
//! }"#).unwrap();
//!
//! assert_eq!(config.uris.len(), 2);
//! assert!(config.check_capability);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::link::Connector;
use crate::maneuvers::ManeuverKind;
use crate::session::{ExecuteOptions, SessionConfig};
use crate::sim::SimConnector;
use crate::{Error, Result};

/// Environment variable holding the URI of a single Crazyflie
pub const URI_ENV: &str = "CFURI";

/// Where the Crazyflies are
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// In-process simulated Crazyflies
    #[default]
    Sim,
    /// Real Crazyflies over a Crazyradio, needs the `radio` feature
    Radio,
}

impl Backend {
    /// Connector reaching the Crazyflies of this backend
    pub fn connector(&self) -> Result<Arc<dyn Connector>> {
        match self {
            Backend::Sim => Ok(Arc::new(SimConnector::new())),
            Backend::Radio => radio_connector(),
        }
    }
}

#[cfg(feature = "radio")]
fn radio_connector() -> Result<Arc<dyn Connector>> {
    Ok(Arc::new(crate::radio::RadioConnector::new()))
}

#[cfg(not(feature = "radio"))]
fn radio_connector() -> Result<Arc<dyn Connector>> {
    Err(Error::ConfigError(
        "The radio backend needs the \"radio\" feature".to_owned(),
    ))
}

/// Configuration of a fleet flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Crazyflie addresses, the position in the list is the session identifier
    pub uris: Vec<String>,
    /// Directory receiving one log file per session
    pub log_dir: PathBuf,
    /// Simulated or real Crazyflies
    pub backend: Backend,
    /// Flight settings shared by all the sessions
    pub session: SessionConfig,
    /// Wait for the deck before flying
    pub check_capability: bool,
    /// Stream telemetry to the log files
    pub enable_telemetry: bool,
    /// Maneuver flown by every Crazyflie
    pub maneuver: ManeuverKind,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            uris: (1..=3)
                .map(|i| format!("radio://0/80/2M/E7E7E7E70{}", i))
                .collect(),
            log_dir: PathBuf::from("logs"),
            backend: Backend::default(),
            session: SessionConfig::default(),
            check_capability: true,
            enable_telemetry: true,
            maneuver: ManeuverKind::default(),
        }
    }
}

impl FleetConfig {
    /// Read and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a configuration
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: FleetConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration can be flown
    pub fn validate(&self) -> Result<()> {
        if self.uris.is_empty() {
            return Err(Error::ConfigError("No Crazyflie address given".to_owned()));
        }
        if self.uris.len() > 256 {
            return Err(Error::ConfigError(format!(
                "{} addresses given, a fleet holds at most 256 Crazyflies",
                self.uris.len()
            )));
        }
        self.session.validate()
    }

    /// Options of each session flight
    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            check_capability: self.check_capability,
            enable_telemetry: self.enable_telemetry,
            timeout: self.session.capability_timeout(),
        }
    }
}

/// URI of a single Crazyflie, from the `CFURI` environment variable
///
/// Returns `default` if the variable is not set or not valid unicode.
pub fn uri_from_env(default: &str) -> String {
    std::env::var(URI_ENV).unwrap_or_else(|_| default.to_owned())
}
