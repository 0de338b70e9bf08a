//! # Flight-control collaborator
//!
//! The session controller does not talk radio. It drives a Crazyflie through
//! the two traits of this module, which follow the shape of the Crazyflie
//! subsystems: parameters, log blocks, platform, high-level commander and
//! low-level setpoints.
//!
//! [Connector] opens links by URI and [FlightLink] is one open link. The
//! [sim](crate::sim) module provides an in-process implementation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::telemetry::{TelemetryConfig, TelemetrySample};
use crate::{Result, Value};

/// Opens links to Crazyflies
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the Crazyflie at `uri`
    ///
    /// Returns [Error::ConnectionError](crate::Error::ConnectionError) if the
    /// Crazyflie is unreachable or if the link negotiation fails.
    async fn connect(&self, uri: &str) -> Result<Arc<dyn FlightLink>>;
}

/// One connected Crazyflie
///
/// All methods take `&self` so that the link can be shared between the
/// session, its telemetry forwarder and its parameter watchers.
#[async_trait]
pub trait FlightLink: Send + Sync {
    /// URI this link is connected to
    fn uri(&self) -> &str;

    /// Names of all the parameters, formatted as "group.name"
    fn param_names(&self) -> Vec<String>;

    /// Read a parameter value
    async fn param_get(&self, name: &str) -> Result<Value>;

    /// Set a parameter value
    ///
    /// The value type must match the parameter type. Once the Crazyflie
    /// confirms the write, a change notification is sent to all watchers.
    async fn param_set(&self, name: &str, value: Value) -> Result<()>;

    /// Stream of `(name, value)` notifications for every parameter change
    async fn watch_param_change(&self) -> BoxStream<'static, (String, Value)>;

    /// Create and start a log block
    ///
    /// The returned stream yields one sample per period until the block is
    /// stopped with [FlightLink::stop_log()] or the link is disconnected.
    async fn start_log(
        &self,
        config: &TelemetryConfig,
    ) -> Result<BoxStream<'static, Result<TelemetrySample>>>;

    /// Stop the log block named `name`
    async fn stop_log(&self, name: &str) -> Result<()>;

    /// Send an arming (or disarming) request to the platform
    async fn arm(&self, armed: bool) -> Result<()>;

    /// High-level take off to `height` meters in `duration` seconds
    async fn take_off(&self, height: f32, duration: f32) -> Result<()>;

    /// High-level landing to `height` meters in `duration` seconds
    async fn land(&self, height: f32, duration: f32) -> Result<()>;

    /// High-level go-to, yaw in radians
    ///
    /// With `relative` set, the position and yaw are offsets from the current
    /// setpoint, expressed in the world frame.
    async fn go_to(
        &self,
        x: f32,
        y: f32,
        z: f32,
        yaw: f32,
        duration: f32,
        relative: bool,
    ) -> Result<()>;

    /// High-level spiral starting at the current position, `angle` in radians
    #[allow(clippy::too_many_arguments)]
    async fn spiral(
        &self,
        angle: f32,
        initial_radius: f32,
        final_radius: f32,
        altitude_gain: f32,
        duration: f32,
        clockwise: bool,
    ) -> Result<()>;

    /// Low-level hover setpoint: body velocities, yaw rate in degrees per second
    /// and absolute height
    async fn setpoint_hover(&self, vx: f32, vy: f32, yawrate: f32, zdistance: f32) -> Result<()>;

    /// Hand control back from the low-level setpoints to the high-level commander
    async fn notify_setpoint_stop(&self) -> Result<()>;

    /// Close the link
    async fn disconnect(&self);
}
