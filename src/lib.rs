//! # Crazyflie fleet
//!
//! This crate runs scripted flights with one or several Crazyflies. It takes
//! care of the lifecycle around the flight: connect, check that the required
//! deck is attached, stream telemetry to a console or a log file, fly, land,
//! and disconnect whatever happens during the flight.
//!
//! ## Architecture
//!
//! | Module | Content |
//! |--------|---------|
//! | [session] | [Session] controller: connection scope, capability check, parameters |
//! | [fleet] | [FleetRunner]: one session per address, all flown concurrently |
//! | [motion] | [MotionCommander]: distance and velocity primitives inside a safety boundary |
//! | [maneuvers] | Scripted choreographies (square, cube, circle, ...) |
//! | [link] | Traits the flight-control library is driven through |
//! | [sim] | In-process simulated Crazyflies |
//! | `radio` | Real Crazyflies through the Crazyflie library (`radio` feature) |
//! | [config] | JSON fleet configuration |
//! | [pose] | Motion capture pose consumer |
//!
//! ## Usage
//!
//! The basic procedure to use the lib is:
//!  - Get a [Connector](link::Connector) able to open links to the Crazyflies
//!  - Create a [Session] per Crazyflie, or a [FleetRunner] for all of them
//!  - Fly a [Maneuver](maneuvers::Maneuver) or run any [Action](session::Action)
//!
//! All the session lines are tagged with the session identifier. Diagnostics
//! go through the [log] facade, the binaries initialize `env_logger`.
//!
//! For example, flying a square with three simulated Crazyflies:
//! ``` no_run
//! # use std::sync::Arc;
//! # use crazyflie_fleet::{FleetRunner, maneuvers::Square, sim::SimConnector};
//! # async fn example() -> crazyflie_fleet::Result<()> {
//! let uris: Vec<String> = (1..=3).map(|i| format!("radio://0/80/2M/E7E7E7E70{}", i)).collect();
//!
//! let runner = FleetRunner::new(Arc::new(SimConnector::new()), "logs");
//! let report = runner.run(&uris, Arc::new(Square::default())).await?;
//!
//! print!("{}", report);
//! std::process::exit(report.exit_code());
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
mod error;
mod event;
pub mod fleet;
pub mod link;
pub mod maneuvers;
pub mod motion;
pub mod pose;
#[cfg(feature = "radio")]
pub mod radio;
pub mod session;
pub mod sim;
mod sink;
pub mod telemetry;
mod value;

pub use crate::error::{Error, Result};
pub use crate::event::CapabilityEvent;
pub use crate::fleet::{FleetReport, FleetRunner, SessionOutcome};
pub use crate::motion::MotionCommander;
pub use crate::session::{Action, Connected, ExecuteOptions, Session, SessionConfig, SessionState};
pub use crate::sink::{LogSink, COLORS};
pub use crate::value::{Value, ValueType};
