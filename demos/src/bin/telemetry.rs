// Read telemetry from a Crazyflie without flying
//
// Usage: telemetry [sim|radio]
//
// Reads one sample, then streams the Stabilizer log block for 5 seconds.

use std::time::Duration;

use crazyflie_fleet::config::{uri_from_env, Backend};
use crazyflie_fleet::Session;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let backend = match std::env::args().nth(1).as_deref() {
        Some("radio") => Backend::Radio,
        _ => Backend::Sim,
    };
    let uri = uri_from_env("radio://0/80/2M/E7E7E7E7E7");
    let mut session = Session::new(backend.connector()?, uri, 1, None)?;

    let sample = session.log_once().await?;
    log::info!("First sample at {} ms", sample.timestamp);

    session.log_for(Duration::from_secs(5)).await?;

    Ok(())
}
