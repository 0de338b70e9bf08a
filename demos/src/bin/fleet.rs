// Fly the same maneuver with several Crazyflies
//
// Usage: fleet [config.json]
//
// Without configuration file, three simulated Crazyflies fly a square and log
// to `logs/log_{id}.txt`. Set "backend": "radio" to fly real ones. The process
// exit code is 1 if any session failed.

use crazyflie_fleet::config::FleetConfig;
use crazyflie_fleet::FleetRunner;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => FleetConfig::load(path)?,
        None => FleetConfig::default(),
    };

    let maneuver = config.maneuver.build();
    println!(
        "Flying {} with {} Crazyflies, logs in {}",
        maneuver.name(),
        config.uris.len(),
        config.log_dir.display()
    );

    let runner = FleetRunner::new(config.backend.connector()?, &config.log_dir)
        .with_config(config.session.clone())
        .with_options(config.execute_options());
    let report = runner.run(&config.uris, maneuver).await?;

    print!("{}", report);
    std::process::exit(report.exit_code());
}
