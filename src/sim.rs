//! # Simulated Crazyflie
//!
//! In-process implementation of [Connector] and [FlightLink]. It is used as a
//! dry-run backend by the demos and as the flight-control collaborator in
//! tests.
//!
//! Each simulated Crazyflie has a parameter table, a log TOC and a tiny
//! "firmware" task consuming the commands sent on its uplink queue to
//! integrate a pose. Deck presence, reachability and initial parameter values
//! are configured per URI with a [SimProfile].
//!
//! Every call made on a simulated link is recorded in a shared [Journal] so
//! that tests can check what a session did, and in which order.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use flume as channel;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::time::Instant;

use crate::link::{Connector, FlightLink};
use crate::telemetry::{TelemetryConfig, TelemetrySample};
use crate::{Error, Result, Value, ValueType};

/// Deck presence parameter checked by default
pub const DEFAULT_DECK_PARAM: &str = "deck.bcFlow2";

// Period at which the low-level hover setpoints are expected
const SETPOINT_PERIOD: f32 = 0.1;

const LOG_TOC: [&str; 8] = [
    "stateEstimate.x",
    "stateEstimate.y",
    "stateEstimate.z",
    "stabilizer.roll",
    "stabilizer.pitch",
    "stabilizer.yaw",
    "stabilizer.thrust",
    "pm.vbat",
];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// How the simulated deck presence parameter answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckResponse {
    /// The deck parameter reads 1
    Attached,
    /// The deck parameter reads 0
    Detached,
    /// The deck parameter does not exist, it never answers
    Silent,
}

/// Command the simulated firmware refuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// High-level take-off
    TakeOff,
    /// Low-level hover setpoints
    Hover,
}

/// Behaviour of one simulated Crazyflie
#[derive(Debug, Clone)]
pub struct SimProfile {
    /// If false, connecting fails with a connection error
    pub reachable: bool,
    /// Answer of the deck presence parameter
    pub deck: DeckResponse,
    /// Name of the deck presence parameter
    pub deck_param: String,
    /// Initial parameter table, deck parameter excluded
    pub params: BTreeMap<String, Value>,
    /// Commands answered with a link error
    pub faults: Vec<SimFault>,
}

impl Default for SimProfile {
    fn default() -> Self {
        let params = [
            ("stabilizer.estimator", Value::U8(2)),
            ("stabilizer.controller", Value::U8(1)),
            ("commander.enHighLevel", Value::U8(1)),
            ("kalman.resetEstimation", Value::U8(0)),
            ("ring.effect", Value::U8(6)),
            ("pid_attitude.yaw_kd", Value::F32(0.35)),
        ]
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect();

        Self {
            reachable: true,
            deck: DeckResponse::Attached,
            deck_param: DEFAULT_DECK_PARAM.to_owned(),
            params,
            faults: Vec::new(),
        }
    }
}

impl SimProfile {
    /// Profile of a Crazyflie that never answers
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Default::default()
        }
    }

    /// Same profile with a different deck response
    pub fn with_deck(mut self, deck: DeckResponse) -> Self {
        self.deck = deck;
        self
    }

    /// Same profile, refusing `fault` commands
    pub fn with_fault(mut self, fault: SimFault) -> Self {
        self.faults.push(fault);
        self
    }

    fn param_table(&self) -> BTreeMap<String, Value> {
        let mut table = self.params.clone();
        match self.deck {
            DeckResponse::Attached => {
                table.insert(self.deck_param.clone(), Value::U8(1));
            }
            DeckResponse::Detached => {
                table.insert(self.deck_param.clone(), Value::U8(0));
            }
            DeckResponse::Silent => (),
        }
        table
    }
}

/// Call recorded on a simulated link
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected,
    ParamSet { name: String, value: Value },
    LogStarted(String),
    LogStopped(String),
    Armed(bool),
    TakeOff { height: f32, duration: f32 },
    Land { height: f32, duration: f32 },
    GoTo { x: f32, y: f32, z: f32, yaw: f32, duration: f32, relative: bool },
    Spiral { angle: f32, initial_radius: f32, final_radius: f32, altitude_gain: f32, duration: f32, clockwise: bool },
    Hover { vx: f32, vy: f32, yawrate: f32, zdistance: f32 },
    NotifySetpointStop,
    Disconnected,
}

/// Shared, ordered record of `(uri, event)`
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<(String, LinkEvent)>>>,
}

impl Journal {
    fn record(&self, uri: &str, event: LinkEvent) {
        lock(&self.events).push((uri.to_owned(), event));
    }

    /// All recorded events, in order
    pub fn events(&self) -> Vec<(String, LinkEvent)> {
        lock(&self.events).clone()
    }

    /// Events recorded for one URI, in order
    pub fn events_for(&self, uri: &str) -> Vec<LinkEvent> {
        lock(&self.events)
            .iter()
            .filter(|(u, _)| u == uri)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Number of events of one URI matching `predicate`
    pub fn count(&self, uri: &str, predicate: impl Fn(&LinkEvent) -> bool) -> usize {
        lock(&self.events)
            .iter()
            .filter(|(u, e)| u == uri && predicate(e))
            .count()
    }
}

/// Connector creating simulated Crazyflies
#[derive(Debug, Default)]
pub struct SimConnector {
    default_profile: SimProfile,
    profiles: Mutex<HashMap<String, SimProfile>>,
    journal: Journal,
}

impl SimConnector {
    /// Connector where every URI is a reachable Crazyflie with its deck attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Profile used for URIs without a specific profile
    pub fn with_default_profile(mut self, profile: SimProfile) -> Self {
        self.default_profile = profile;
        self
    }

    /// Set the profile of one URI
    pub fn set_profile(&self, uri: &str, profile: SimProfile) {
        lock(&self.profiles).insert(uri.to_owned(), profile);
    }

    /// Journal shared by all the links created by this connector
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

#[async_trait]
impl Connector for SimConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn FlightLink>> {
        let profile = lock(&self.profiles)
            .get(uri)
            .cloned()
            .unwrap_or_else(|| self.default_profile.clone());

        if !profile.reachable {
            return Err(Error::ConnectionError {
                uri: uri.to_owned(),
                reason: "no answer from the Crazyflie".to_owned(),
            });
        }

        let cf = SimCrazyflie::new(uri, &profile, self.journal.clone());
        self.journal.record(uri, LinkEvent::Connected);

        Ok(Arc::new(cf))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SimState {
    x: f32,
    y: f32,
    z: f32,
    // Degrees, like the stabilizer log variables
    yaw: f32,
    roll: f32,
    pitch: f32,
}

enum SimCommand {
    TakeOff { height: f32 },
    Land { height: f32 },
    GoTo { x: f32, y: f32, z: f32, yaw: f32, relative: bool },
    Spiral { angle: f32, initial_radius: f32, final_radius: f32, altitude_gain: f32, clockwise: bool },
    Hover { vx: f32, vy: f32, yawrate: f32, zdistance: f32 },
    Shutdown,
}

impl SimState {
    fn apply(&mut self, command: SimCommand) {
        match command {
            SimCommand::TakeOff { height } => self.z = height,
            SimCommand::Land { height } => {
                self.z = height;
                self.roll = 0.0;
                self.pitch = 0.0;
            }
            SimCommand::GoTo { x, y, z, yaw, relative } => {
                if relative {
                    self.x += x;
                    self.y += y;
                    self.z += z;
                    self.yaw += yaw.to_degrees();
                } else {
                    self.x = x;
                    self.y = y;
                    self.z = z;
                    self.yaw = yaw.to_degrees();
                }
            }
            SimCommand::Spiral { angle, initial_radius, final_radius, altitude_gain, clockwise } => {
                let heading = self.yaw.to_radians();
                let (left_x, left_y) = (-heading.sin(), heading.cos());
                let side = if clockwise { -1.0 } else { 1.0 };

                let center_x = self.x + side * initial_radius * left_x;
                let center_y = self.y + side * initial_radius * left_y;
                let start = (self.y - center_y).atan2(self.x - center_x);
                let end = start + side * angle;

                self.x = center_x + final_radius * end.cos();
                self.y = center_y + final_radius * end.sin();
                self.z += altitude_gain;
                self.yaw += (side * angle).to_degrees();
            }
            SimCommand::Hover { vx, vy, yawrate, zdistance } => {
                let heading = self.yaw.to_radians();
                self.x += (vx * heading.cos() - vy * heading.sin()) * SETPOINT_PERIOD;
                self.y += (vx * heading.sin() + vy * heading.cos()) * SETPOINT_PERIOD;
                self.yaw += yawrate * SETPOINT_PERIOD;
                self.z = zdistance;
                self.pitch = -vx * 10.0;
                self.roll = vy * 10.0;
            }
            SimCommand::Shutdown => (),
        }
    }

    fn read(&self, variable: &str) -> Value {
        match variable {
            "stateEstimate.x" => Value::F32(self.x),
            "stateEstimate.y" => Value::F32(self.y),
            "stateEstimate.z" => Value::F32(self.z),
            "stabilizer.roll" => Value::F32(self.roll),
            "stabilizer.pitch" => Value::F32(self.pitch),
            "stabilizer.yaw" => Value::F32(self.yaw),
            "stabilizer.thrust" => Value::F32(if self.z > 0.0 { 38000.0 } else { 0.0 }),
            _ => Value::F32(4.1),
        }
    }
}

type ParamChangeWatchers =
    Arc<futures::lock::Mutex<Vec<futures::channel::mpsc::UnboundedSender<(String, Value)>>>>;

async fn notify_watchers(watchers: &ParamChangeWatchers, name: String, value: Value) {
    let mut to_remove = Vec::new();
    let mut watchers = watchers.lock().await;

    for (i, watcher) in watchers.iter().enumerate() {
        if watcher.unbounded_send((name.clone(), value)).is_err() {
            to_remove.push(i);
        }
    }

    // Remove watchers that have dropped
    for i in to_remove.into_iter().rev() {
        watchers.remove(i);
    }
}

fn not_found(name: &str) -> Error {
    Error::ParamError(format!("Parameter {} not found", name))
}

/// One simulated Crazyflie, created by [SimConnector]
pub struct SimCrazyflie {
    uri: String,
    journal: Journal,
    toc: BTreeMap<String, ValueType>,
    values: Mutex<BTreeMap<String, Value>>,
    watchers: ParamChangeWatchers,
    state: Arc<Mutex<SimState>>,
    log_blocks: Mutex<HashMap<String, Arc<AtomicBool>>>,
    uplink: channel::Sender<SimCommand>,
    faults: Vec<SimFault>,
    connected: AtomicBool,
    boot: Instant,
}

impl SimCrazyflie {
    fn new(uri: &str, profile: &SimProfile, journal: Journal) -> Self {
        let values = profile.param_table();
        let toc = values
            .iter()
            .map(|(name, value)| (name.clone(), ValueType::from(*value)))
            .collect();

        let state: Arc<Mutex<SimState>> = Default::default();

        // Firmware loop: apply the commands in the order they were sent
        let (uplink, rx) = channel::unbounded::<SimCommand>();
        let firmware_state = state.clone();
        tokio::spawn(async move {
            while let Ok(command) = rx.recv_async().await {
                if let SimCommand::Shutdown = command {
                    break;
                }
                lock(&firmware_state).apply(command);
            }
        });

        Self {
            uri: uri.to_owned(),
            journal,
            toc,
            values: Mutex::new(values),
            watchers: Arc::default(),
            state,
            log_blocks: Mutex::new(HashMap::new()),
            uplink,
            faults: profile.faults.clone(),
            connected: AtomicBool::new(true),
            boot: Instant::now(),
        }
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected.load(Relaxed) {
            Ok(())
        } else {
            Err(Error::Disconnected)
        }
    }

    fn check_fault(&self, fault: SimFault) -> Result<()> {
        if self.faults.contains(&fault) {
            Err(Error::LinkError(format!("{:?} refused by {}", fault, self.uri)))
        } else {
            Ok(())
        }
    }

    async fn send(&self, event: LinkEvent, command: SimCommand) -> Result<()> {
        self.check_connected()?;
        self.journal.record(&self.uri, event);
        self.uplink
            .send_async(command)
            .await
            .map_err(|_| Error::Disconnected)
    }
}

#[async_trait]
impl FlightLink for SimCrazyflie {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn param_names(&self) -> Vec<String> {
        self.toc.keys().cloned().collect()
    }

    async fn param_get(&self, name: &str) -> Result<Value> {
        self.check_connected()?;
        lock(&self.values)
            .get(name)
            .copied()
            .ok_or_else(|| not_found(name))
    }

    async fn param_set(&self, name: &str, value: Value) -> Result<()> {
        self.check_connected()?;
        let param_type = *self.toc.get(name).ok_or_else(|| not_found(name))?;

        if param_type != ValueType::from(value) {
            return Err(Error::ParamError(format!(
                "Parameter {} is type {:?}, cannot set with value {:?}",
                name, param_type, value
            )));
        }

        lock(&self.values).insert(name.to_owned(), value);
        self.journal.record(
            &self.uri,
            LinkEvent::ParamSet {
                name: name.to_owned(),
                value,
            },
        );
        notify_watchers(&self.watchers, name.to_owned(), value).await;

        Ok(())
    }

    async fn watch_param_change(&self) -> BoxStream<'static, (String, Value)> {
        let (tx, rx) = futures::channel::mpsc::unbounded();

        let mut watchers = self.watchers.lock().await;
        watchers.push(tx);

        rx.boxed()
    }

    async fn start_log(
        &self,
        config: &TelemetryConfig,
    ) -> Result<BoxStream<'static, Result<TelemetrySample>>> {
        self.check_connected()?;

        if let Some(variable) = config.variables.iter().find(|v| !LOG_TOC.contains(&v.as_str())) {
            return Err(Error::LogError(format!("Log variable {} not found", variable)));
        }

        let running = Arc::new(AtomicBool::new(true));
        {
            let mut blocks = lock(&self.log_blocks);
            if blocks.contains_key(&config.name) {
                return Err(Error::LogError(format!("Log block {} already started", config.name)));
            }
            blocks.insert(config.name.clone(), running.clone());
        }
        self.journal.record(&self.uri, LinkEvent::LogStarted(config.name.clone()));

        let state = self.state.clone();
        let block = config.name.clone();
        let variables = config.variables.clone();
        let period = config.period();
        let boot = self.boot;

        let samples = async_stream::stream! {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if !running.load(Relaxed) {
                    break;
                }

                let snapshot = *lock(&state);
                let data = variables
                    .iter()
                    .map(|v| (v.clone(), snapshot.read(v)))
                    .collect();

                yield Ok(TelemetrySample {
                    timestamp: boot.elapsed().as_millis() as u32,
                    block: block.clone(),
                    data,
                });
            }
        };

        Ok(samples.boxed())
    }

    async fn stop_log(&self, name: &str) -> Result<()> {
        let running = lock(&self.log_blocks)
            .remove(name)
            .ok_or_else(|| Error::LogError(format!("Log block {} not started", name)))?;
        running.store(false, Relaxed);
        self.journal.record(&self.uri, LinkEvent::LogStopped(name.to_owned()));

        Ok(())
    }

    async fn arm(&self, armed: bool) -> Result<()> {
        self.check_connected()?;
        self.journal.record(&self.uri, LinkEvent::Armed(armed));
        Ok(())
    }

    async fn take_off(&self, height: f32, duration: f32) -> Result<()> {
        self.check_fault(SimFault::TakeOff)?;
        self.send(LinkEvent::TakeOff { height, duration }, SimCommand::TakeOff { height })
            .await
    }

    async fn land(&self, height: f32, duration: f32) -> Result<()> {
        self.send(LinkEvent::Land { height, duration }, SimCommand::Land { height })
            .await
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
        self.send(
            LinkEvent::GoTo { x, y, z, yaw, duration, relative },
            SimCommand::GoTo { x, y, z, yaw, relative },
        )
        .await
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
        self.send(
            LinkEvent::Spiral { angle, initial_radius, final_radius, altitude_gain, duration, clockwise },
            SimCommand::Spiral { angle, initial_radius, final_radius, altitude_gain, clockwise },
        )
        .await
    }

    async fn setpoint_hover(&self, vx: f32, vy: f32, yawrate: f32, zdistance: f32) -> Result<()> {
        self.check_fault(SimFault::Hover)?;
        self.send(
            LinkEvent::Hover { vx, vy, yawrate, zdistance },
            SimCommand::Hover { vx, vy, yawrate, zdistance },
        )
        .await
    }

    async fn notify_setpoint_stop(&self) -> Result<()> {
        self.check_connected()?;
        self.journal.record(&self.uri, LinkEvent::NotifySetpointStop);
        Ok(())
    }

    async fn disconnect(&self) {
        self.journal.record(&self.uri, LinkEvent::Disconnected);

        if self.connected.swap(false, Relaxed) {
            let blocks: Vec<_> = lock(&self.log_blocks).drain().collect();
            for (_, running) in blocks {
                running.store(false, Relaxed);
            }
            self.watchers.lock().await.clear();
            let _ = self.uplink.send_async(SimCommand::Shutdown).await;
        }
    }
}
