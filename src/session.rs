//! # Session controller
//!
//! A [Session] owns the address of one Crazyflie and runs caller supplied
//! [Action]s inside a connection scope:
//!
//! 1. connect,
//! 2. optionally wait for the required deck to report itself present,
//! 3. optionally start streaming telemetry to the session [LogSink],
//! 4. run the action once,
//! 5. cancel the parameter watchers, stop the telemetry and disconnect.
//!
//! Step 5 always runs, whether the action succeeded, failed or panicked. If
//! the future returned by [Session::execute()] is dropped before completion,
//! the teardown is spawned on the current tokio runtime.
//!
//! ``` no_run
//! # use std::sync::Arc;
//! # use crazyflie_fleet::{Session, ExecuteOptions, sim::SimConnector, maneuvers::Square};
//! # async fn example() -> crazyflie_fleet::Result<()> {
//! let connector = Arc::new(SimConnector::new());
//! let mut session = Session::new(connector, "radio://0/80/2M/E7E7E7E7E7", 0, None)?;
//!
//! session.fly(&ExecuteOptions::default(), &Square::default()).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::event::CapabilityEvent;
use crate::link::{Connector, FlightLink};
use crate::maneuvers::Maneuver;
use crate::motion::MotionCommander;
use crate::sink::LogSink;
use crate::telemetry::{TelemetryConfig, TelemetrySample, TelemetrySubscription};
use crate::{Error, Result, Value, ValueType};

const ESTIMATOR_PARAM: (&str, &str) = ("stabilizer", "estimator");
const FIRST_SAMPLE_TIMEOUT: Duration = Duration::from_secs(2);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Per-session flight settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Take-off height in meters
    pub default_height: f32,
    /// Radius in meters of the horizontal disc, centered on the take-off
    /// point, the Crazyflie is allowed to fly in
    pub safety_boundary: f32,
    /// Linear velocity of the distance primitives, m/s
    pub velocity: f32,
    /// Rate of the turn primitives, degrees per second
    pub yaw_rate: f32,
    /// Deck presence parameter, formatted as "group.name"
    pub capability_param: String,
    /// Default capability wait, in milliseconds
    pub capability_timeout_ms: u64,
    /// Delay given to a parameter watcher to settle before writing, in milliseconds
    pub settle_delay_ms: u64,
    /// Log block streamed while the session is connected
    pub telemetry: TelemetryConfig,
    /// Parameters written after connecting, "group.name" to textual value
    pub params: BTreeMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_height: 0.5,
            safety_boundary: 2.0,
            velocity: 0.2,
            yaw_rate: 72.0,
            capability_param: crate::sim::DEFAULT_DECK_PARAM.to_owned(),
            capability_timeout_ms: 5000,
            settle_delay_ms: 1000,
            telemetry: TelemetryConfig::default(),
            params: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    /// Default capability wait
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_millis(self.capability_timeout_ms)
    }

    /// Parameter settle delay
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Check that the flight settings are usable
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("default_height", self.default_height),
            ("safety_boundary", self.safety_boundary),
            ("velocity", self.velocity),
            ("yaw_rate", self.yaw_rate),
        ];
        for (name, value) in positive.iter() {
            if !(*value > 0.0) {
                return Err(Error::ConfigError(format!("{} must be positive, got {}", name, value)));
            }
        }
        split_param(&self.capability_param)?;
        for name in self.params.keys() {
            split_param(name)?;
        }
        self.telemetry.validate()
    }
}

/// Options of one [Session::execute()] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Wait for the deck presence parameter before running the action
    pub check_capability: bool,
    /// Stream telemetry to the session sink while the action runs
    pub enable_telemetry: bool,
    /// Maximum wait for the deck to report itself present
    pub timeout: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            check_capability: true,
            enable_telemetry: true,
            timeout: Duration::from_secs(5),
        }
    }
}

impl ExecuteOptions {
    /// Enable or disable the capability check
    pub fn with_capability_check(mut self, check_capability: bool) -> Self {
        self.check_capability = check_capability;
        self
    }

    /// Enable or disable telemetry streaming
    pub fn with_telemetry(mut self, enable_telemetry: bool) -> Self {
        self.enable_telemetry = enable_telemetry;
        self
    }

    /// Set the capability wait
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Connection state of a [Session]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection, initial and terminal state
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Waiting for the deck to report itself present
    CapabilityPending,
    /// Connected, action running
    Streaming,
    /// Teardown in progress
    Disconnecting,
}

/// State estimator of the stabilizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Estimator {
    /// Firmware choice
    Any = 0,
    /// Complementary filter
    Complementary = 1,
    /// Extended Kalman filter
    Kalman = 2,
}

/// Callback called with `(name, value)` for each observed value of a parameter
pub type ParamCallback = Arc<dyn Fn(&str, Value) -> Result<()> + Send + Sync>;

/// Code run by a [Session] while connected
#[async_trait]
pub trait Action: Send + Sync {
    /// Run the action, once
    async fn run(&self, cf: &Connected) -> Result<()>;
}

fn split_param(full_name: &str) -> Result<(&str, &str)> {
    full_name
        .split_once('.')
        .ok_or_else(|| Error::ConfigError(format!("Parameter name {} is not \"group.name\"", full_name)))
}

fn set_state(state: &Mutex<SessionState>, new_state: SessionState) {
    *lock(state) = new_state;
}

fn report(id: u8, sink: &LogSink, name: &str, value: Value, callback: &ParamCallback) {
    if let Err(e) = callback(name, value) {
        log::warn!("[#{}] param callback error for {}: {}", id, name, e);
        sink.line(&format!("param callback error for {}: {}", name, e));
    }
}

async fn teardown(
    id: u8,
    link: Arc<dyn FlightLink>,
    watchers: Vec<JoinHandle<()>>,
    telemetry: Vec<TelemetrySubscription>,
    state: Arc<Mutex<SessionState>>,
) {
    set_state(&state, SessionState::Disconnecting);

    for watcher in watchers {
        watcher.abort();
    }
    for subscription in telemetry {
        subscription.stop(&link).await;
    }
    link.disconnect().await;

    set_state(&state, SessionState::Disconnected);
    log::debug!("[#{}] disconnected from {}", id, link.uri());
}

/// # Connected session
///
/// Handle given to an [Action] while its session is connected. Everything
/// started through it is cancelled or stopped before the link is closed.
pub struct Connected {
    id: u8,
    link: Arc<dyn FlightLink>,
    sink: Arc<LogSink>,
    config: SessionConfig,
    state: Arc<Mutex<SessionState>>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
    telemetry: Mutex<Vec<TelemetrySubscription>>,
    released: AtomicBool,
}

impl std::fmt::Debug for Connected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connected")
            .field("id", &self.id)
            .field("uri", &self.link.uri())
            .field("released", &self.released)
            .finish()
    }
}

impl Connected {
    fn new(
        id: u8,
        link: Arc<dyn FlightLink>,
        sink: Arc<LogSink>,
        config: SessionConfig,
        state: Arc<Mutex<SessionState>>,
    ) -> Self {
        Self {
            id,
            link,
            sink,
            config,
            state,
            watchers: Mutex::new(Vec::new()),
            telemetry: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        }
    }

    /// Session identifier
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Address of the Crazyflie
    pub fn uri(&self) -> &str {
        self.link.uri()
    }

    /// Link to the Crazyflie
    pub fn link(&self) -> &Arc<dyn FlightLink> {
        &self.link
    }

    /// Session log sink
    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    /// Session flight settings
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Watch a parameter and optionally write it
    ///
    /// `on_change` is called with the current value of `group.name`, then with
    /// every value notified until the session disconnects. By default the
    /// value is written to the session sink. After the settle delay, `value`
    /// is written to the Crazyflie if given.
    ///
    /// Errors returned by `on_change` are logged and otherwise ignored.
    pub async fn set_parameter_async(
        &self,
        group: &str,
        name: &str,
        value: Option<Value>,
        on_change: Option<ParamCallback>,
    ) -> Result<()> {
        let full_name = format!("{}.{}", group, name);
        let callback: ParamCallback = match on_change {
            Some(callback) => callback,
            None => {
                let sink = self.sink.clone();
                Arc::new(move |name: &str, value: Value| {
                    sink.param(name, &value);
                    Ok(())
                })
            }
        };

        let mut changes = self.link.watch_param_change().await;
        let watched = full_name.clone();
        let watcher_callback = callback.clone();
        let sink = self.sink.clone();
        let id = self.id;
        let watcher = tokio::spawn(async move {
            while let Some((name, value)) = changes.next().await {
                if name == watched {
                    report(id, &sink, &name, value, &watcher_callback);
                }
            }
        });
        lock(&self.watchers).push(watcher);

        let current = self.link.param_get(&full_name).await?;
        report(self.id, &self.sink, &full_name, current, &callback);

        tokio::time::sleep(self.config.settle_delay()).await;

        if let Some(value) = value {
            self.link.param_set(&full_name, value).await?;
            log::debug!("[#{}] {} set to {}", self.id, full_name, value);
        }

        Ok(())
    }

    /// Write parameters given as text
    ///
    /// Each value is parsed to the type of its parameter, read from the
    /// Crazyflie, before being written. Stops at the first failure.
    pub async fn write_params(&self, params: &BTreeMap<String, String>) -> Result<()> {
        for (full_name, text) in params {
            let current = self.link.param_get(full_name).await?;
            let value = Value::parse(ValueType::from(current), text)?;

            self.link.param_set(full_name, value).await?;
            self.sink.param(full_name, &value);
        }
        Ok(())
    }

    /// Wait for the deck presence parameter to report a non-zero value
    ///
    /// `event` is set by the parameter callback. If it is already set, returns
    /// immediately. Otherwise waits for at most `timeout` after registering the
    /// callback and returns [Error::HardwareNotReady] if the deck never
    /// reported itself present.
    pub async fn check_capability(&self, event: &Arc<CapabilityEvent>, timeout: Duration) -> Result<()> {
        if event.is_set() {
            return Ok(());
        }

        let (group, name) = split_param(&self.config.capability_param)?;
        let sink = self.sink.clone();
        let detected = event.clone();
        let callback: ParamCallback = Arc::new(move |name: &str, value: Value| {
            sink.param(name, &value);
            if value.is_truthy() {
                if detected.set() {
                    sink.line("Deck is attached!");
                }
            } else {
                sink.line("Deck is NOT attached!");
            }
            Ok(())
        });

        if let Err(e) = self.set_parameter_async(group, name, None, Some(callback)).await {
            log::warn!("[#{}] cannot read {}: {}", self.id, self.config.capability_param, e);
            self.sink.line(&format!("cannot read {}: {}", self.config.capability_param, e));
        }

        if event.wait(timeout).await {
            Ok(())
        } else {
            Err(Error::HardwareNotReady {
                id: self.id,
                capability: self.config.capability_param.clone(),
                timeout,
            })
        }
    }

    /// Start streaming a log block to the session sink until disconnection
    pub async fn start_telemetry(&self, config: &TelemetryConfig) -> Result<()> {
        let subscription = TelemetrySubscription::start(&self.link, config, self.sink.clone()).await?;
        lock(&self.telemetry).push(subscription);
        Ok(())
    }

    /// Stop all the log blocks started with [Connected::start_telemetry()]
    pub async fn stop_telemetry(&self) {
        let subscriptions: Vec<_> = lock(&self.telemetry).drain(..).collect();
        for subscription in subscriptions {
            subscription.stop(&self.link).await;
        }
    }

    /// Read one sample of a log block, without streaming it
    pub async fn first_sample(&self, config: &TelemetryConfig) -> Result<TelemetrySample> {
        config.validate()?;
        let mut samples = self.link.start_log(config).await?;
        let first = tokio::time::timeout(FIRST_SAMPLE_TIMEOUT, samples.next()).await;
        self.link.stop_log(&config.name).await?;

        match first {
            Ok(Some(sample)) => sample,
            Ok(None) => Err(Error::LogError(format!("Log block {} ended without a sample", config.name))),
            Err(_) => Err(Error::LogError(format!(
                "No sample from log block {} within {:?}",
                config.name, FIRST_SAMPLE_TIMEOUT
            ))),
        }
    }

    /// Switch the state estimator, returns the previous one
    pub async fn set_estimator(&self, estimator: Estimator) -> Result<Estimator> {
        let (group, name) = ESTIMATOR_PARAM;
        let raw: u8 = self
            .link
            .param_get(&format!("{}.{}", group, name))
            .await?
            .try_into()?;
        let previous = Estimator::try_from(raw)
            .map_err(|e| Error::ConversionError(format!("Unknown estimator: {}", e)))?;

        self.set_parameter_async(group, name, Some(Value::U8(estimator.into())), None)
            .await?;

        Ok(previous)
    }

    /// Take off into a motion context at the session default height
    pub async fn motion_commander(&self) -> Result<MotionCommander> {
        MotionCommander::take_off(self.link.clone(), self.sink.clone(), &self.config).await
    }

    async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        let watchers: Vec<_> = lock(&self.watchers).drain(..).collect();
        let telemetry: Vec<_> = lock(&self.telemetry).drain(..).collect();
        teardown(self.id, self.link.clone(), watchers, telemetry, self.state.clone()).await;
    }
}

impl Drop for Connected {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        log::warn!("[#{}] session dropped while connected, disconnecting", self.id);

        let watchers: Vec<_> = lock(&self.watchers).drain(..).collect();
        let telemetry: Vec<_> = lock(&self.telemetry).drain(..).collect();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(teardown(
                    self.id,
                    self.link.clone(),
                    watchers,
                    telemetry,
                    self.state.clone(),
                ));
            }
            Err(_) => {
                for watcher in watchers {
                    watcher.abort();
                }
                set_state(&self.state, SessionState::Disconnected);
            }
        }
    }
}

struct Flight<'a, M: ?Sized> {
    maneuver: &'a M,
}

#[async_trait]
impl<'a, M: Maneuver + ?Sized> Action for Flight<'a, M> {
    async fn run(&self, cf: &Connected) -> Result<()> {
        let mut mc = cf.motion_commander().await?;
        cf.sink().line(&format!("flying {}", self.maneuver.name()));

        let flown = AssertUnwindSafe(self.maneuver.fly(&mut mc)).catch_unwind().await;
        let landed = mc.land().await;

        let flown = match flown {
            Ok(flown) => flown,
            Err(panic) => {
                if let Err(e) = landed {
                    log::error!("[#{}] landing after panic failed: {}", cf.id(), e);
                }
                std::panic::resume_unwind(panic)
            }
        };

        match (flown, landed) {
            (Err(e), Err(land_error)) => {
                log::error!("[#{}] landing after failure also failed: {}", cf.id(), land_error);
                Err(e)
            }
            (flown, landed) => flown.and(landed),
        }
    }
}

#[derive(Default)]
struct ReadSample {
    sample: Mutex<Option<TelemetrySample>>,
}

#[async_trait]
impl Action for ReadSample {
    async fn run(&self, cf: &Connected) -> Result<()> {
        let sample = cf.first_sample(&cf.config().telemetry).await?;
        cf.sink().telemetry(&sample);
        *lock(&self.sample) = Some(sample);
        Ok(())
    }
}

struct Listen {
    duration: Duration,
}

#[async_trait]
impl Action for Listen {
    async fn run(&self, _cf: &Connected) -> Result<()> {
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

/// # Session of one Crazyflie
///
/// Created disconnected. Connections are only held while [Session::execute()]
/// runs, which takes `&mut self`: a session runs one action at a time, and may
/// run any number of them sequentially.
pub struct Session {
    uri: String,
    id: u8,
    sink: Arc<LogSink>,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    capability: Arc<CapabilityEvent>,
    state: Arc<Mutex<SessionState>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("uri", &self.uri)
            .field("id", &self.id)
            .field("sink", &self.sink)
            .field("state", &self.state())
            .field("capability_verified", &self.capability_verified())
            .finish()
    }
}

impl Session {
    /// Create a disconnected session
    ///
    /// With a `log_path`, the file is created (or truncated) now and receives
    /// all the session lines. Without, lines go to the console.
    pub fn new(
        connector: Arc<dyn Connector>,
        uri: impl Into<String>,
        id: u8,
        log_path: Option<&Path>,
    ) -> Result<Self> {
        let sink = match log_path {
            Some(path) => LogSink::file(id, path)?,
            None => LogSink::console(id),
        };

        Ok(Self {
            uri: uri.into(),
            id,
            sink: Arc::new(sink),
            config: SessionConfig::default(),
            connector,
            capability: Arc::new(CapabilityEvent::new()),
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
        })
    }

    /// Replace the flight settings
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the log sink
    pub fn with_sink(mut self, sink: Arc<LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Address of the Crazyflie
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Session identifier
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Session log sink
    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    /// Flight settings
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current connection state
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// True once the deck has reported itself present
    pub fn capability_verified(&self) -> bool {
        self.capability.is_set()
    }

    /// Connect, run `action` once and disconnect
    ///
    /// The connection is closed exactly once on every path. Telemetry started
    /// for the action is stopped before that. If the action panics, the panic
    /// is resumed after the teardown.
    pub async fn execute<A: Action + ?Sized>(&mut self, opts: &ExecuteOptions, action: &A) -> Result<()> {
        set_state(&self.state, SessionState::Connecting);
        log::debug!("[#{}] connecting to {}", self.id, self.uri);

        let link = match self.connector.connect(&self.uri).await {
            Ok(link) => link,
            Err(e) => {
                set_state(&self.state, SessionState::Disconnected);
                log::error!("[#{}] {}", self.id, e);
                self.sink.line(&format!("connection failed: {}", e));
                return Err(e);
            }
        };

        let cf = Connected::new(
            self.id,
            link,
            self.sink.clone(),
            self.config.clone(),
            self.state.clone(),
        );

        let outcome = AssertUnwindSafe(self.run_connected(&cf, opts, action))
            .catch_unwind()
            .await;
        cf.release().await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                log::error!("[#{}] {}", self.id, e);
                self.sink.line(&format!("session failed: {}", e));
                Err(e)
            }
            Err(panic) => {
                log::error!("[#{}] action panicked", self.id);
                self.sink.line("action panicked");
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn run_connected<A: Action + ?Sized>(
        &self,
        cf: &Connected,
        opts: &ExecuteOptions,
        action: &A,
    ) -> Result<()> {
        if opts.check_capability {
            set_state(&self.state, SessionState::CapabilityPending);
            cf.check_capability(&self.capability, opts.timeout).await?;
        }

        cf.write_params(&self.config.params).await?;

        if opts.enable_telemetry {
            cf.start_telemetry(&self.config.telemetry).await?;
        }

        set_state(&self.state, SessionState::Streaming);
        action.run(cf).await
    }

    /// Take off, fly `maneuver` and land
    ///
    /// Landing is attempted even if the maneuver fails or panics, before the
    /// link is closed.
    pub async fn fly<M: Maneuver + ?Sized>(&mut self, opts: &ExecuteOptions, maneuver: &M) -> Result<()> {
        self.execute(opts, &Flight { maneuver }).await
    }

    /// Connect, read and log one telemetry sample, and disconnect
    pub async fn log_once(&mut self) -> Result<TelemetrySample> {
        let action = ReadSample::default();
        let opts = ExecuteOptions::default()
            .with_capability_check(false)
            .with_telemetry(false);
        self.execute(&opts, &action).await?;

        let sample = lock(&action.sample).take();
        sample.ok_or_else(|| Error::LogError("No sample recorded".to_owned()))
    }

    /// Connect and stream telemetry to the sink for `duration`, without flying
    pub async fn log_for(&mut self, duration: Duration) -> Result<()> {
        let opts = ExecuteOptions::default().with_capability_check(false);
        self.execute(&opts, &Listen { duration }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_the_scripted_flights() {
        let config = SessionConfig::default();
        assert_eq!(config.default_height, 0.5);
        assert_eq!(config.capability_param, "deck.bcFlow2");
        assert_eq!(config.capability_timeout(), Duration::from_secs(5));
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SessionConfig {
            velocity: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

        let config = SessionConfig {
            capability_param: "bcFlow2".to_owned(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn config_fields_default_when_missing() {
        let config: SessionConfig = serde_json::from_str(r#"{"default_height": 0.8}"#).unwrap();
        assert_eq!(config.default_height, 0.8);
        assert_eq!(config.safety_boundary, 2.0);
        assert_eq!(config.telemetry, TelemetryConfig::default());
    }

    #[test]
    fn execute_options_builders() {
        let opts = ExecuteOptions::default();
        assert!(opts.check_capability);
        assert!(opts.enable_telemetry);
        assert_eq!(opts.timeout, Duration::from_secs(5));

        let opts = opts
            .with_capability_check(false)
            .with_telemetry(false)
            .with_timeout(Duration::from_millis(200));
        assert!(!opts.check_capability);
        assert!(!opts.enable_telemetry);
        assert_eq!(opts.timeout, Duration::from_millis(200));
    }

    #[test]
    fn estimator_from_param_value() {
        assert_eq!(Estimator::try_from(2u8).unwrap(), Estimator::Kalman);
        assert_eq!(u8::from(Estimator::Complementary), 1);
        assert!(Estimator::try_from(7u8).is_err());
    }

    #[test]
    fn configured_parameter_names_are_checked() {
        let mut config = SessionConfig::default();
        config.params.insert("ring.effect".to_owned(), "3".to_owned());
        assert!(config.validate().is_ok());

        config.params.insert("effect".to_owned(), "3".to_owned());
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn parameter_names_are_split_on_the_group() {
        assert_eq!(split_param("deck.bcFlow2").unwrap(), ("deck", "bcFlow2"));
        assert!(split_param("deck").is_err());
    }
}
