//! # Motion commander
//!
//! Scoped motion context bound to a default flight height. It is created by
//! taking off and should be ended by landing; dropping a commander that has not
//! landed schedules a landing on the current runtime.
//!
//! Distance primitives go through the high-level commander and wait for the
//! move to complete. Velocity primitives stream low-level hover setpoints from
//! a background task until [MotionCommander::stop()] is called.
//!
//! All motion is confined to a horizontal disc of radius
//! [SessionConfig::safety_boundary] around the take-off point. The position is
//! dead-reckoned from the issued commands.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};

use crate::link::FlightLink;
use crate::session::SessionConfig;
use crate::sink::LogSink;
use crate::{Error, Result};

const ARMING_DELAY: Duration = Duration::from_millis(300);
const SETPOINT_PERIOD: Duration = Duration::from_millis(100);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn secs(seconds: f32) -> Duration {
    Duration::from_secs_f32(seconds.max(0.0))
}

// High-level commands return either once sent or once flown
async fn complete(started: Instant, seconds: f32) {
    sleep_until(started + secs(seconds)).await;
}

/// Dead-reckoned position, relative to the take-off point
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Estimate {
    /// Meters, world frame
    pub x: f32,
    /// Meters, world frame
    pub y: f32,
    /// Height in meters
    pub z: f32,
    /// Heading in degrees, counter-clockwise
    pub yaw: f32,
}

impl Estimate {
    fn distance(&self) -> f32 {
        self.x.hypot(self.y)
    }

    // Body frame (x forward, y left) to world frame
    fn to_world(&self, dx: f32, dy: f32) -> (f32, f32) {
        let (sin, cos) = self.yaw.to_radians().sin_cos();
        (dx * cos - dy * sin, dx * sin + dy * cos)
    }

    fn arc_center(&self, radius: f32, clockwise: bool) -> (f32, f32) {
        let side = if clockwise { -1.0 } else { 1.0 };
        let (lx, ly) = self.to_world(0.0, side * radius);
        (self.x + lx, self.y + ly)
    }

    fn after_arc(&self, radius: f32, angle: f32, clockwise: bool) -> Estimate {
        let (cx, cy) = self.arc_center(radius, clockwise);
        let side = if clockwise { -1.0 } else { 1.0 };
        let end = (self.y - cy).atan2(self.x - cx) + side * angle;

        Estimate {
            x: cx + radius * end.cos(),
            y: cy + radius * end.sin(),
            z: self.z,
            yaw: self.yaw + (side * angle).to_degrees(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Velocity {
    vx: f32,
    vy: f32,
    yaw_rate: f32,
}

/// # Motion context of one flight
///
/// Obtained with [MotionCommander::take_off()], usually through
/// [Session::fly()](crate::Session::fly).
pub struct MotionCommander {
    link: Arc<dyn FlightLink>,
    sink: Arc<LogSink>,
    height: f32,
    velocity: f32,
    yaw_rate: f32,
    boundary: f32,
    estimate: Arc<Mutex<Estimate>>,
    setpoint: Arc<Mutex<Velocity>>,
    streamer: Option<JoinHandle<()>>,
    landed: bool,
}

impl std::fmt::Debug for MotionCommander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionCommander")
            .field("uri", &self.link.uri())
            .field("height", &self.height)
            .field("estimate", &self.estimate())
            .field("landed", &self.landed)
            .finish()
    }
}

impl MotionCommander {
    /// Arm and take off to the configured default height
    ///
    /// Returns once the take-off duration has elapsed. If the take-off is
    /// refused, the Crazyflie is disarmed before the error is returned.
    pub async fn take_off(
        link: Arc<dyn FlightLink>,
        sink: Arc<LogSink>,
        config: &SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let height = config.default_height;

        link.arm(true).await?;
        sleep(ARMING_DELAY).await;

        let duration = height / config.velocity;
        let started = Instant::now();
        if let Err(e) = link.take_off(height, duration).await {
            if let Err(disarm_error) = link.arm(false).await {
                log::error!("[#{}] cannot disarm after failed take-off: {}", sink.id(), disarm_error);
            }
            return Err(e);
        }

        let commander = Self {
            link,
            sink,
            height,
            velocity: config.velocity,
            yaw_rate: config.yaw_rate,
            boundary: config.safety_boundary,
            estimate: Arc::new(Mutex::new(Estimate {
                z: height,
                ..Default::default()
            })),
            setpoint: Arc::default(),
            streamer: None,
            landed: false,
        };

        complete(started, duration).await;
        commander.sink.line(&format!("took off to {:.2} m", height));

        Ok(commander)
    }

    /// Default flight height
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Current dead-reckoned position
    pub fn estimate(&self) -> Estimate {
        *lock(&self.estimate)
    }

    /// True once the commander has landed
    pub fn is_landed(&self) -> bool {
        self.landed
    }

    fn check_target(&self, x: f32, y: f32) -> Result<()> {
        let distance = x.hypot(y);
        if distance > self.boundary + 1e-4 {
            return Err(Error::OutOfBounds {
                x,
                y,
                distance,
                limit: self.boundary,
            });
        }
        Ok(())
    }

    /// Move in a straight line, body frame (x forward, y left, z up)
    ///
    /// Refused with [Error::OutOfBounds] if the target is outside of the
    /// safety boundary.
    pub async fn move_distance(&mut self, dx: f32, dy: f32, dz: f32) -> Result<()> {
        self.stop().await?;

        let distance = (dx * dx + dy * dy + dz * dz).sqrt();
        if distance == 0.0 {
            return Ok(());
        }

        let current = self.estimate();
        let (wx, wy) = current.to_world(dx, dy);
        self.check_target(current.x + wx, current.y + wy)?;

        let duration = distance / self.velocity;
        let started = Instant::now();
        self.link.go_to(wx, wy, dz, 0.0, duration, true).await?;
        complete(started, duration).await;

        let mut estimate = lock(&self.estimate);
        estimate.x += wx;
        estimate.y += wy;
        estimate.z += dz;

        Ok(())
    }

    /// Move forward `distance` meters
    pub async fn forward(&mut self, distance: f32) -> Result<()> {
        self.move_distance(distance, 0.0, 0.0).await
    }

    /// Move back `distance` meters
    pub async fn back(&mut self, distance: f32) -> Result<()> {
        self.move_distance(-distance, 0.0, 0.0).await
    }

    /// Move left `distance` meters
    pub async fn left(&mut self, distance: f32) -> Result<()> {
        self.move_distance(0.0, distance, 0.0).await
    }

    /// Move right `distance` meters
    pub async fn right(&mut self, distance: f32) -> Result<()> {
        self.move_distance(0.0, -distance, 0.0).await
    }

    /// Go up `distance` meters
    pub async fn up(&mut self, distance: f32) -> Result<()> {
        self.move_distance(0.0, 0.0, distance).await
    }

    /// Go down `distance` meters
    pub async fn down(&mut self, distance: f32) -> Result<()> {
        self.move_distance(0.0, 0.0, -distance).await
    }

    async fn turn(&mut self, angle_degrees: f32) -> Result<()> {
        self.stop().await?;

        let duration = angle_degrees.abs() / self.yaw_rate;
        let started = Instant::now();
        self.link
            .go_to(0.0, 0.0, 0.0, angle_degrees.to_radians(), duration, true)
            .await?;
        complete(started, duration).await;

        lock(&self.estimate).yaw += angle_degrees;

        Ok(())
    }

    /// Turn left (counter-clockwise) by `angle_degrees`
    pub async fn turn_left(&mut self, angle_degrees: f32) -> Result<()> {
        self.turn(angle_degrees).await
    }

    /// Turn right (clockwise) by `angle_degrees`
    pub async fn turn_right(&mut self, angle_degrees: f32) -> Result<()> {
        self.turn(-angle_degrees).await
    }

    async fn circle(&mut self, radius: f32, angle_degrees: f32, clockwise: bool) -> Result<()> {
        self.stop().await?;

        let current = self.estimate();
        let (cx, cy) = current.arc_center(radius, clockwise);

        // Farthest point of the circle from the take-off point
        let center_distance = cx.hypot(cy);
        let (ux, uy) = if center_distance > 0.0 {
            (cx / center_distance, cy / center_distance)
        } else {
            (1.0, 0.0)
        };
        self.check_target(cx + radius * ux, cy + radius * uy)?;

        let angle = angle_degrees.to_radians();
        let duration = radius * angle.abs() / self.velocity;
        let started = Instant::now();
        self.link
            .spiral(angle, radius, radius, 0.0, duration, clockwise)
            .await?;
        complete(started, duration).await;

        let mut estimate = lock(&self.estimate);
        *estimate = estimate.after_arc(radius, angle, clockwise);

        Ok(())
    }

    /// Fly a circle of `radius` meters, centered on the left
    pub async fn circle_left(&mut self, radius: f32, angle_degrees: f32) -> Result<()> {
        self.circle(radius, angle_degrees, false).await
    }

    /// Fly a circle of `radius` meters, centered on the right
    pub async fn circle_right(&mut self, radius: f32, angle_degrees: f32) -> Result<()> {
        self.circle(radius, angle_degrees, true).await
    }

    /// Start moving at constant velocity, body frame, until [MotionCommander::stop()]
    ///
    /// Velocities in m/s, yaw rate in degrees per second. Calling it again
    /// while moving only changes the velocity. The Crazyflie holds its position
    /// as soon as the next setpoint would cross the safety boundary.
    pub async fn start_linear_motion(&mut self, vx: f32, vy: f32, yaw_rate: f32) -> Result<()> {
        *lock(&self.setpoint) = Velocity { vx, vy, yaw_rate };

        if self.streamer.is_some() {
            return Ok(());
        }

        let link = self.link.clone();
        let sink = self.sink.clone();
        let estimate = self.estimate.clone();
        let setpoint = self.setpoint.clone();
        let boundary = self.boundary;

        self.streamer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SETPOINT_PERIOD);
            let dt = SETPOINT_PERIOD.as_secs_f32();
            let mut holding = false;

            loop {
                ticker.tick().await;

                let (command, z) = {
                    let wanted = *lock(&setpoint);
                    let mut estimate = lock(&estimate);
                    let (wx, wy) = estimate.to_world(wanted.vx * dt, wanted.vy * dt);
                    let next = (estimate.x + wx).hypot(estimate.y + wy);

                    let command = if next > boundary && next > estimate.distance() {
                        Velocity::default()
                    } else {
                        estimate.x += wx;
                        estimate.y += wy;
                        estimate.yaw += wanted.yaw_rate * dt;
                        wanted
                    };
                    (command, estimate.z)
                };

                let at_boundary = command.vx == 0.0 && command.vy == 0.0 && command.yaw_rate == 0.0;
                if at_boundary && !holding {
                    let wanted = *lock(&setpoint);
                    if wanted.vx != 0.0 || wanted.vy != 0.0 {
                        sink.line("holding position at the safety boundary");
                    }
                }
                holding = at_boundary;

                if let Err(e) = link
                    .setpoint_hover(command.vx, command.vy, command.yaw_rate, z)
                    .await
                {
                    log::warn!("[#{}] setpoint streaming stopped: {}", sink.id(), e);
                    break;
                }
            }
        }));

        Ok(())
    }

    /// Start moving forward at `velocity` m/s
    pub async fn start_forward(&mut self, velocity: f32) -> Result<()> {
        self.start_linear_motion(velocity, 0.0, 0.0).await
    }

    /// Start moving back at `velocity` m/s
    pub async fn start_back(&mut self, velocity: f32) -> Result<()> {
        self.start_linear_motion(-velocity, 0.0, 0.0).await
    }

    /// Start moving left at `velocity` m/s
    pub async fn start_left(&mut self, velocity: f32) -> Result<()> {
        self.start_linear_motion(0.0, velocity, 0.0).await
    }

    /// Start moving right at `velocity` m/s
    pub async fn start_right(&mut self, velocity: f32) -> Result<()> {
        self.start_linear_motion(0.0, -velocity, 0.0).await
    }

    /// Stop any velocity motion and hold the current position
    ///
    /// Does nothing if no velocity motion is running.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(streamer) = self.streamer.take() {
            streamer.abort();
            let _ = streamer.await;

            *lock(&self.setpoint) = Velocity::default();
            let z = self.estimate().z;
            let held = self.link.setpoint_hover(0.0, 0.0, 0.0, z).await;
            let released = self.link.notify_setpoint_stop().await;
            return held.and(released);
        }
        Ok(())
    }

    /// Land and disarm
    ///
    /// Landing an already landed commander does nothing. The landing is sent
    /// even if stopping the velocity motion failed, that error is then
    /// returned once landed.
    pub async fn land(&mut self) -> Result<()> {
        if self.landed {
            return Ok(());
        }

        let stopped = self.stop().await;
        if let Err(e) = &stopped {
            log::warn!("[#{}] stopping before landing failed: {}", self.sink.id(), e);
        }

        let duration = self.estimate().z.max(0.0) / self.velocity;
        let started = Instant::now();
        self.link.land(0.0, duration).await?;
        complete(started, duration).await;
        self.link.arm(false).await?;

        lock(&self.estimate).z = 0.0;
        self.landed = true;
        self.sink.line("landed");

        stopped
    }
}

impl Drop for MotionCommander {
    fn drop(&mut self) {
        if let Some(streamer) = self.streamer.take() {
            streamer.abort();
        }

        if self.landed {
            return;
        }

        log::warn!("[#{}] motion context dropped in flight, landing", self.sink.id());

        let link = self.link.clone();
        let duration = self.estimate().z.max(0.0) / self.velocity;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = link.notify_setpoint_stop().await;
                if let Err(e) = link.land(0.0, duration).await {
                    log::error!("Emergency landing of {} failed: {}", link.uri(), e);
                }
            });
        }
    }
}

/// Length of a full turn, in degrees
pub const FULL_TURN: f32 = 360.0;
