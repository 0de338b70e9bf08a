// Fly one maneuver with a single Crazyflie, logging to the console
//
// Usage: fly [config.json]
//
// The Crazyflie URI is read from the CFURI environment variable. Only the
// backend, the session settings and the maneuver of the configuration file
// are used. Without configuration the Crazyflie is simulated.

use crazyflie_fleet::config::{uri_from_env, FleetConfig};
use crazyflie_fleet::Session;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => FleetConfig::load(path)?,
        None => FleetConfig::default(),
    };
    let uri = uri_from_env("radio://0/80/2M/E7E7E7E703");

    let mut session = Session::new(config.backend.connector()?, uri, 0, None)?
        .with_config(config.session.clone());

    let maneuver = config.maneuver.build();
    session.fly(&config.execute_options(), maneuver.as_ref()).await?;

    Ok(())
}
