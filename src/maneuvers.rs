//! # Scripted maneuvers
//!
//! Choreographies flown by [Session::fly()](crate::Session::fly). Every
//! maneuver starts after take-off at the session default height and must leave
//! the Crazyflie hovering, landing is handled by the session.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

use crate::motion::{MotionCommander, FULL_TURN};
use crate::Result;

/// A flight choreography
#[async_trait]
pub trait Maneuver: Send + Sync {
    /// Human readable name, written to the session sink
    fn name(&self) -> &str;

    /// Fly the maneuver
    async fn fly(&self, mc: &mut MotionCommander) -> Result<()>;
}

/// Pause between two moves, lets the Crazyflie settle
const PAUSE: Duration = Duration::from_secs(3);

/// Hover for a while, then land
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeOff {
    /// Hover time in seconds
    pub hover: f32,
}

impl Default for TakeOff {
    fn default() -> Self {
        Self { hover: 3.0 }
    }
}

#[async_trait]
impl Maneuver for TakeOff {
    fn name(&self) -> &str {
        "take-off"
    }

    async fn fly(&self, mc: &mut MotionCommander) -> Result<()> {
        sleep(Duration::from_secs_f32(self.hover.max(0.0))).await;
        mc.stop().await
    }
}

/// Go forward, turn around and come back
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearOutAndBack {
    /// Length of one leg in meters
    pub distance: f32,
}

impl Default for LinearOutAndBack {
    fn default() -> Self {
        Self { distance: 0.5 }
    }
}

#[async_trait]
impl Maneuver for LinearOutAndBack {
    fn name(&self) -> &str {
        "linear out and back"
    }

    async fn fly(&self, mc: &mut MotionCommander) -> Result<()> {
        sleep(PAUSE).await;
        mc.forward(self.distance).await?;
        sleep(PAUSE).await;
        mc.turn_left(180.0).await?;
        sleep(PAUSE).await;
        mc.forward(self.distance).await?;
        sleep(PAUSE).await;
        mc.stop().await
    }
}

/// Horizontal square, turning left at each corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Square {
    /// Side in meters
    pub side: f32,
}

impl Default for Square {
    fn default() -> Self {
        Self { side: 0.75 }
    }
}

#[async_trait]
impl Maneuver for Square {
    fn name(&self) -> &str {
        "square"
    }

    async fn fly(&self, mc: &mut MotionCommander) -> Result<()> {
        sleep(PAUSE).await;

        for _ in 0..4 {
            mc.forward(self.side).await?;
            sleep(PAUSE).await;
            mc.turn_left(90.0).await?;
            sleep(PAUSE).await;
        }

        sleep(Duration::from_secs(1)).await;
        mc.stop().await
    }
}

/// Square whose sides alternately climb and descend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cube {
    /// Horizontal side in meters
    pub side: f32,
    /// Height gained or lost after each side, in meters
    pub rise: f32,
}

impl Default for Cube {
    fn default() -> Self {
        Self {
            side: 0.75,
            rise: 0.35,
        }
    }
}

#[async_trait]
impl Maneuver for Cube {
    fn name(&self) -> &str {
        "cube"
    }

    async fn fly(&self, mc: &mut MotionCommander) -> Result<()> {
        sleep(PAUSE).await;

        for i in 0..4 {
            mc.forward(self.side).await?;
            sleep(PAUSE).await;
            if i % 2 == 0 {
                mc.up(self.rise).await?;
            } else {
                mc.down(self.rise).await?;
            }
            sleep(PAUSE).await;
            mc.turn_left(90.0).await?;
            sleep(PAUSE).await;
        }

        sleep(Duration::from_secs(2)).await;
        mc.stop().await
    }
}

/// Full circle to the left, climb, full circle to the right, descend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Circle {
    /// Radius in meters
    pub radius: f32,
    /// Climb between the two circles, in meters
    pub climb: f32,
}

impl Default for Circle {
    fn default() -> Self {
        Self {
            radius: 0.75,
            climb: 0.5,
        }
    }
}

#[async_trait]
impl Maneuver for Circle {
    fn name(&self) -> &str {
        "circle"
    }

    async fn fly(&self, mc: &mut MotionCommander) -> Result<()> {
        let pause = Duration::from_secs(2);

        sleep(PAUSE).await;
        mc.circle_left(self.radius, FULL_TURN).await?;
        sleep(pause).await;
        mc.up(self.climb).await?;
        sleep(pause).await;
        mc.circle_right(self.radius, FULL_TURN).await?;
        sleep(pause).await;
        mc.down(self.climb).await?;
        sleep(PAUSE).await;
        mc.stop().await
    }
}

/// Sinusoidal back and forth motion along the heading
///
/// The position follows `amplitude * sin(2 * pi * t / period)`. A positive
/// `phase` delays the start by `phase / omega` seconds of hovering. The
/// motion then runs for `duration` seconds and stops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Oscillate {
    /// Amplitude in meters
    pub amplitude: f32,
    /// Period in seconds
    pub period: f32,
    /// Phase in radians, turned into an initial hover
    pub phase: f32,
    /// Total duration in seconds
    pub duration: f32,
}

impl Default for Oscillate {
    fn default() -> Self {
        Self {
            amplitude: 0.3,
            period: 4.0,
            phase: 0.0,
            duration: 12.0,
        }
    }
}

impl Oscillate {
    fn omega(&self) -> f32 {
        2.0 * PI / self.period
    }

    /// Hover time before the motion starts
    pub fn initial_wait(&self) -> Duration {
        let wait = self.phase / self.omega();
        if wait > 0.0 {
            Duration::from_secs_f32(wait)
        } else {
            Duration::ZERO
        }
    }

    /// Velocity `t` seconds after the motion started, derivative of the position
    pub fn velocity_at(&self, t: f32) -> f32 {
        let omega = self.omega();
        self.amplitude * omega * (omega * t).cos()
    }
}

#[async_trait]
impl Maneuver for Oscillate {
    fn name(&self) -> &str {
        "oscillation"
    }

    async fn fly(&self, mc: &mut MotionCommander) -> Result<()> {
        if self.period <= 0.0 {
            return Err(crate::Error::ConfigError(format!(
                "Oscillation period must be positive, got {}",
                self.period
            )));
        }

        sleep(self.initial_wait()).await;

        let start = Instant::now();
        let end = start + Duration::from_secs_f32(self.duration.max(0.0));
        let mut ticker = tokio::time::interval(Duration::from_millis(100));

        while Instant::now() < end {
            ticker.tick().await;
            let velocity = self.velocity_at(start.elapsed().as_secs_f32());
            if velocity >= 0.0 {
                mc.start_forward(velocity).await?;
            } else {
                mc.start_back(-velocity).await?;
            }
        }

        mc.stop().await
    }
}

/// Maneuver selection, as found in configuration files
///
/// ```
/// # use crazyflie_fleet::maneuvers::ManeuverKind;
/// let kind: ManeuverKind = serde_json::from_str(r#"{"kind": "square", "side": 0.5}"#).unwrap();
/// assert_eq!(kind.build().name(), "square");
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManeuverKind {
    TakeOff(TakeOff),
    LinearOutAndBack(LinearOutAndBack),
    Square(Square),
    Cube(Cube),
    Circle(Circle),
    Oscillate(Oscillate),
}

impl Default for ManeuverKind {
    fn default() -> Self {
        ManeuverKind::Square(Square::default())
    }
}

impl ManeuverKind {
    /// Maneuver to fly
    pub fn build(&self) -> Arc<dyn Maneuver> {
        match *self {
            ManeuverKind::TakeOff(m) => Arc::new(m),
            ManeuverKind::LinearOutAndBack(m) => Arc::new(m),
            ManeuverKind::Square(m) => Arc::new(m),
            ManeuverKind::Cube(m) => Arc::new(m),
            ManeuverKind::Circle(m) => Arc::new(m),
            ManeuverKind::Oscillate(m) => Arc::new(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Connector;
    use crate::session::SessionConfig;
    use crate::sim::{LinkEvent, SimConnector};
    use crate::sink::LogSink;

    const URI: &str = "radio://0/80/2M/E7E7E7E7E7";

    async fn fly(maneuver: &dyn Maneuver) -> (Vec<LinkEvent>, crate::motion::Estimate) {
        let connector = SimConnector::new();
        let link = connector.connect(URI).await.unwrap();
        let sink = Arc::new(LogSink::console(1));

        let mut mc = MotionCommander::take_off(link, sink, &SessionConfig::default())
            .await
            .unwrap();
        maneuver.fly(&mut mc).await.unwrap();
        let estimate = mc.estimate();
        mc.land().await.unwrap();

        (connector.journal().events_for(URI), estimate)
    }

    #[test]
    fn oscillation_velocity_follows_the_cosine() {
        let oscillate = Oscillate {
            amplitude: 0.5,
            period: 2.0,
            phase: 0.0,
            duration: 1.0,
        };
        assert!((oscillate.velocity_at(0.0) - 0.5 * PI).abs() < 1e-5);
        assert!(oscillate.velocity_at(0.5).abs() < 1e-5);
        assert!(oscillate.velocity_at(1.0) < 0.0);
        assert_eq!(oscillate.initial_wait(), Duration::ZERO);
    }

    #[test]
    fn oscillation_phase_is_an_initial_wait() {
        let oscillate = Oscillate {
            period: 4.0,
            phase: PI,
            ..Default::default()
        };
        assert!((oscillate.initial_wait().as_secs_f32() - 2.0).abs() < 1e-4);
        assert!((oscillate.velocity_at(0.0) - oscillate.amplitude * PI / 2.0).abs() < 1e-5);

        let backwards = Oscillate {
            phase: -1.0,
            ..Default::default()
        };
        assert_eq!(backwards.initial_wait(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn phased_oscillation_hovers_before_moving() {
        let connector = SimConnector::new();
        let link = connector.connect(URI).await.unwrap();
        let mut mc = MotionCommander::take_off(link, Arc::new(LogSink::console(1)), &SessionConfig::default())
            .await
            .unwrap();
        let journal = connector.journal();

        let oscillate = Oscillate {
            period: 4.0,
            phase: PI,
            duration: 1.0,
            ..Default::default()
        };
        let flight = tokio::spawn(async move {
            oscillate.fly(&mut mc).await.unwrap();
            mc.land().await.unwrap();
        });

        sleep(Duration::from_millis(1900)).await;
        assert_eq!(journal.count(URI, |e| matches!(e, LinkEvent::Hover { .. })), 0);

        flight.await.unwrap();
        assert!(journal.count(URI, |e| matches!(e, LinkEvent::Hover { .. })) > 0);
    }

    #[test]
    fn maneuver_kinds_deserialize_with_defaults() {
        let kind: ManeuverKind = serde_json::from_str(r#"{"kind": "cube", "side": 0.5, "rise": 0.2}"#).unwrap();
        assert_eq!(kind, ManeuverKind::Cube(Cube { side: 0.5, rise: 0.2 }));

        let kind: ManeuverKind = serde_json::from_str(r#"{"kind": "circle", "radius": 0.4, "climb": 0.3}"#).unwrap();
        assert_eq!(kind.build().name(), "circle");

        let kind: ManeuverKind = serde_json::from_str(r#"{"kind": "take_off"}"#).unwrap();
        assert_eq!(kind, ManeuverKind::TakeOff(TakeOff::default()));

        assert!(serde_json::from_str::<ManeuverKind>(r#"{"kind": "loop"}"#).is_err());
        assert_eq!(ManeuverKind::default().build().name(), "square");
    }

    #[tokio::test(start_paused = true)]
    async fn square_is_four_sides_and_four_turns() {
        let (events, estimate) = fly(&Square::default()).await;

        let sides = events
            .iter()
            .filter(|e| matches!(e, LinkEvent::GoTo { .. }))
            .count();
        assert_eq!(sides, 8);
        assert!(estimate.x.hypot(estimate.y) < 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn cube_ends_at_take_off_height() {
        let (events, estimate) = fly(&Cube::default()).await;

        let climbs = events
            .iter()
            .filter(|e| matches!(e, LinkEvent::GoTo { z, .. } if *z > 0.0))
            .count();
        assert_eq!(climbs, 2);
        assert!((estimate.z - 0.5).abs() < 1e-4);
    }

    #[tokio::test(start_paused = true)]
    async fn circle_flies_two_opposite_spirals() {
        let (events, _) = fly(&Circle::default()).await;

        let spirals: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                LinkEvent::Spiral { clockwise, .. } => Some(*clockwise),
                _ => None,
            })
            .collect();
        assert_eq!(spirals, vec![false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn oscillation_is_bounded_and_stops() {
        let oscillate = Oscillate {
            duration: 2.0,
            ..Default::default()
        };
        let start = Instant::now();
        let (events, estimate) = fly(&oscillate).await;

        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(events.iter().any(|e| matches!(e, LinkEvent::Hover { .. })));
        assert!(events.contains(&LinkEvent::NotifySetpointStop));
        assert!(estimate.x.abs() <= 0.3 + 0.15);
    }
}
