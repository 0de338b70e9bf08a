//! # Radio backend
//!
//! [Connector] and [FlightLink] implemented over the Crazyflie library, to fly
//! real Crazyflies through a Crazyradio. Only built with the `radio` feature.
//!
//! ``` no_run
//! # use std::sync::Arc;
//! # use crazyflie_fleet::{Session, ExecuteOptions, radio::RadioConnector, maneuvers::TakeOff};
//! # async fn example() -> crazyflie_fleet::Result<()> {
//! let mut session = Session::new(Arc::new(RadioConnector::new()), "radio://0/80/2M/E7E7E7E7E7", 0, None)?;
//! session.fly(&ExecuteOptions::default(), &TakeOff::default()).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use crazyflie_lib::subsystems::log::{LogPeriod, LogStream};
use crazyflie_lib::{Crazyflie, NoTocCache};
use crazyflie_link::LinkContext;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::link::{Connector, FlightLink};
use crate::telemetry::{TelemetryConfig, TelemetrySample};
use crate::{Error, Result, Value, ValueType};

// Firmware default, the setpoints are not kept valid after a notify stop
const NOTIFY_SETPOINT_STOP_VALIDITY_MS: u32 = 0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn value_from_lib(value: crazyflie_lib::Value) -> Value {
    use crazyflie_lib::Value as Lib;

    match value {
        Lib::U8(v) => Value::U8(v),
        Lib::U16(v) => Value::U16(v),
        Lib::U32(v) => Value::U32(v),
        Lib::U64(v) => Value::U64(v),
        Lib::I8(v) => Value::I8(v),
        Lib::I16(v) => Value::I16(v),
        Lib::I32(v) => Value::I32(v),
        Lib::I64(v) => Value::I64(v),
        Lib::F16(v) => Value::F16(half::f16::from_f32(v.to_f32())),
        Lib::F32(v) => Value::F32(v),
        Lib::F64(v) => Value::F64(v),
    }
}

fn type_from_lib(value_type: crazyflie_lib::ValueType) -> ValueType {
    use crazyflie_lib::ValueType as Lib;

    match value_type {
        Lib::U8 => ValueType::U8,
        Lib::U16 => ValueType::U16,
        Lib::U32 => ValueType::U32,
        Lib::U64 => ValueType::U64,
        Lib::I8 => ValueType::I8,
        Lib::I16 => ValueType::I16,
        Lib::I32 => ValueType::I32,
        Lib::I64 => ValueType::I64,
        Lib::F16 => ValueType::F16,
        Lib::F32 => ValueType::F32,
        Lib::F64 => ValueType::F64,
    }
}

/// Opens radio links with a shared link context
pub struct RadioConnector {
    context: LinkContext,
}

impl Default for RadioConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioConnector {
    /// Create a connector and its link context
    pub fn new() -> Self {
        Self {
            context: LinkContext::new(),
        }
    }
}

#[async_trait]
impl Connector for RadioConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn FlightLink>> {
        let cf = Crazyflie::connect_from_uri(&self.context, uri, NoTocCache)
            .await
            .map_err(|e| Error::ConnectionError {
                uri: uri.to_owned(),
                reason: format!("{:?}", e),
            })?;
        log::info!("Connected to {}", uri);

        Ok(Arc::new(RadioCrazyflie {
            uri: uri.to_owned(),
            cf,
            log_blocks: Mutex::new(HashMap::new()),
        }))
    }
}

// Shared between the sample stream and stop_log(), taken when stopping
type SharedLogStream = Arc<futures::lock::Mutex<Option<LogStream>>>;

/// One Crazyflie connected over radio
pub struct RadioCrazyflie {
    uri: String,
    cf: Crazyflie,
    log_blocks: Mutex<HashMap<String, SharedLogStream>>,
}

#[async_trait]
impl FlightLink for RadioCrazyflie {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn param_names(&self) -> Vec<String> {
        self.cf.param.names()
    }

    async fn param_get(&self, name: &str) -> Result<Value> {
        let value: crazyflie_lib::Value = self.cf.param.get(name).await?;
        Ok(value_from_lib(value))
    }

    async fn param_set(&self, name: &str, value: Value) -> Result<()> {
        let param_type = type_from_lib(self.cf.param.get_type(name)?);
        if param_type != ValueType::from(value) {
            return Err(Error::ParamError(format!(
                "Parameter {} is type {:?}, cannot set with value {:?}",
                name, param_type, value
            )));
        }

        // Same type, the conversion is exact
        self.cf.param.set_lossy(name, value.to_f64_lossy()).await?;
        Ok(())
    }

    async fn watch_param_change(&self) -> BoxStream<'static, (String, Value)> {
        self.cf
            .param
            .watch_change()
            .await
            .map(|(name, value)| (name, value_from_lib(value)))
            .boxed()
    }

    async fn start_log(
        &self,
        config: &TelemetryConfig,
    ) -> Result<BoxStream<'static, Result<TelemetrySample>>> {
        if lock(&self.log_blocks).contains_key(&config.name) {
            return Err(Error::LogError(format!("Log block {} already started", config.name)));
        }

        let mut block = self.cf.log.create_block().await?;
        for variable in &config.variables {
            block.add_variable(variable).await?;
        }
        let period = LogPeriod::from_millis(config.period_ms)?;
        let stream: SharedLogStream = Arc::new(futures::lock::Mutex::new(Some(block.start(period).await?)));

        lock(&self.log_blocks).insert(config.name.clone(), stream.clone());

        let name = config.name.clone();
        let samples = async_stream::stream! {
            loop {
                let data = {
                    let running = stream.lock().await;
                    match running.as_ref() {
                        Some(running) => running.next().await,
                        None => break,
                    }
                };

                match data {
                    Ok(data) => yield Ok(TelemetrySample {
                        timestamp: data.timestamp,
                        block: name.clone(),
                        data: data
                            .data
                            .into_iter()
                            .map(|(variable, value)| (variable, value_from_lib(value)))
                            .collect(),
                    }),
                    Err(e) => {
                        yield Err(Error::from(e));
                        break;
                    }
                }
            }
        };

        Ok(samples.boxed())
    }

    async fn stop_log(&self, name: &str) -> Result<()> {
        let stream = lock(&self.log_blocks)
            .remove(name)
            .ok_or_else(|| Error::LogError(format!("Log block {} not started", name)))?;

        let running = stream.lock().await.take();
        if let Some(running) = running {
            running.stop().await?;
        }
        Ok(())
    }

    async fn arm(&self, armed: bool) -> Result<()> {
        self.cf.supervisor.send_arming_request(armed).await?;
        Ok(())
    }

    async fn take_off(&self, height: f32, duration: f32) -> Result<()> {
        self.cf
            .high_level_commander
            .take_off(height, None, duration, None)
            .await?;
        Ok(())
    }

    async fn land(&self, height: f32, duration: f32) -> Result<()> {
        self.cf
            .high_level_commander
            .land(height, None, duration, None)
            .await?;
        Ok(())
    }

    async fn go_to(
        &self,
        x: f32,
        y: f32,
        z: f32,
        yaw: f32,
        duration: f32,
        relative: bool,
    ) -> Result<()> {
        self.cf
            .high_level_commander
            .go_to(x, y, z, yaw, duration, relative, false, None)
            .await?;
        Ok(())
    }

    async fn spiral(
        &self,
        angle: f32,
        initial_radius: f32,
        final_radius: f32,
        altitude_gain: f32,
        duration: f32,
        clockwise: bool,
    ) -> Result<()> {
        self.cf
            .high_level_commander
            .spiral(angle, initial_radius, final_radius, altitude_gain, duration, false, clockwise, None)
            .await?;
        Ok(())
    }

    async fn setpoint_hover(&self, vx: f32, vy: f32, yawrate: f32, zdistance: f32) -> Result<()> {
        self.cf.commander.setpoint_hover(vx, vy, yawrate, zdistance).await?;
        Ok(())
    }

    async fn notify_setpoint_stop(&self) -> Result<()> {
        self.cf
            .commander
            .notify_setpoint_stop(NOTIFY_SETPOINT_STOP_VALIDITY_MS)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) {
        self.cf.disconnect().await;
        log::info!("Disconnected from {}", self.uri);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_values_keep_their_type() {
        assert_eq!(value_from_lib(crazyflie_lib::Value::U8(1)), Value::U8(1));
        assert_eq!(value_from_lib(crazyflie_lib::Value::I16(-3)), Value::I16(-3));
        assert_eq!(value_from_lib(crazyflie_lib::Value::F32(0.5)), Value::F32(0.5));
        assert_eq!(type_from_lib(crazyflie_lib::ValueType::F16), ValueType::F16);
    }

    #[test]
    fn library_errors_keep_their_subsystem() {
        assert!(matches!(
            Error::from(crazyflie_lib::Error::Disconnected),
            Error::Disconnected
        ));
        assert!(matches!(
            Error::from(crazyflie_lib::Error::ParamError("read only".to_owned())),
            Error::ParamError(_)
        ));
    }
}
