//! # Telemetry subscription
//!
//! A telemetry subscription is a named log block of Crazyflie variables sampled
//! at a fixed period. Samples are forwarded to the [LogSink] of the session
//! owning the subscription.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::link::FlightLink;
use crate::sink::LogSink;
use crate::{Error, Result, Value};

/// Log block definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Name of the block, reported with every sample
    pub name: String,
    /// Sampling period in milliseconds
    pub period_ms: u64,
    /// Log variables, formatted as "group.name"
    pub variables: Vec<String>,
}

impl Default for TelemetryConfig {
    /// Position estimate and attitude at 100Hz
    fn default() -> Self {
        Self {
            name: "Stabilizer".to_owned(),
            period_ms: 10,
            variables: [
                "stateEstimate.x",
                "stateEstimate.y",
                "stateEstimate.z",
                "stabilizer.roll",
                "stabilizer.pitch",
                "stabilizer.yaw",
            ]
            .iter()
            .map(|v| v.to_string())
            .collect(),
        }
    }
}

impl TelemetryConfig {
    /// Sampling period
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Check the block is usable: at least one variable and a non-zero period
    pub fn validate(&self) -> Result<()> {
        if self.variables.is_empty() {
            return Err(Error::LogError(format!("Log block {} has no variable", self.name)));
        }
        if self.period_ms == 0 {
            return Err(Error::LogError(format!("Log block {} has a zero period", self.name)));
        }
        Ok(())
    }
}

/// One sample of a log block
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    /// Crazyflie timestamp in milliseconds
    pub timestamp: u32,
    /// Name of the log block
    pub block: String,
    /// Value of each variable of the block
    pub data: BTreeMap<String, Value>,
}

impl fmt::Display for TelemetrySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]: {{", self.timestamp, self.block)?;
        for (i, (name, value)) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{}': {}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// A started log block whose samples are written to a sink
///
/// Must be stopped with [TelemetrySubscription::stop()] before the link it was
/// started on is disconnected.
#[derive(Debug)]
pub struct TelemetrySubscription {
    name: String,
    forwarder: JoinHandle<()>,
}

impl TelemetrySubscription {
    /// Start the log block and forward every sample to `sink`
    ///
    /// Errors reported by the stream are logged and do not end the subscription.
    pub async fn start(
        link: &Arc<dyn FlightLink>,
        config: &TelemetryConfig,
        sink: Arc<LogSink>,
    ) -> Result<Self> {
        config.validate()?;
        let mut samples = link.start_log(config).await?;

        let name = config.name.clone();
        let block = name.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(sample) = samples.next().await {
                match sample {
                    Ok(sample) => sink.telemetry(&sample),
                    Err(e) => {
                        log::warn!("[#{}] telemetry error in block {}: {}", sink.id(), block, e);
                        sink.line(&format!("telemetry error: {}", e));
                    }
                }
            }
        });

        log::debug!("Log block {} started on {}", name, link.uri());

        Ok(Self { name, forwarder })
    }

    /// Name of the log block
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the log block and wait for the last samples to be written
    pub async fn stop(self, link: &Arc<dyn FlightLink>) {
        if let Err(e) = link.stop_log(&self.name).await {
            log::warn!("Cannot stop log block {} on {}: {}", self.name, link.uri(), e);
            self.forwarder.abort();
        }

        // Cancelled forwarder is expected when the stop request failed
        let _ = self.forwarder.await;

        log::debug!("Log block {} stopped on {}", self.name, link.uri());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_block_logs_position_and_attitude() {
        let config = TelemetryConfig::default();
        assert_eq!(config.name, "Stabilizer");
        assert_eq!(config.period(), Duration::from_millis(10));
        assert_eq!(config.variables.len(), 6);
        assert!(config.variables.contains(&"stateEstimate.z".to_owned()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_block_is_rejected() {
        let config = TelemetryConfig {
            variables: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::LogError(_))));
    }

    #[test]
    fn sample_display_lists_variables() {
        let mut data = BTreeMap::new();
        data.insert("stabilizer.roll".to_owned(), Value::F32(0.5));
        data.insert("stabilizer.pitch".to_owned(), Value::F32(-1.0));
        let sample = TelemetrySample {
            timestamp: 1234,
            block: "Stabilizer".to_owned(),
            data,
        };

        assert_eq!(
            sample.to_string(),
            "[1234][Stabilizer]: {'stabilizer.pitch': -1, 'stabilizer.roll': 0.5}"
        );
    }
}
