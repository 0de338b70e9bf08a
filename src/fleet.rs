//! # Fleet runner
//!
//! Flies the same maneuver with several Crazyflies at once. Each address gets
//! its own [Session], with the address position as identifier and its own log
//! file in the log directory, and runs in its own tokio task.
//!
//! The runner always waits for all the sessions: a failing session does not
//! cancel the others, its error is reported in the [FleetReport].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;

use crate::link::Connector;
use crate::maneuvers::Maneuver;
use crate::session::{ExecuteOptions, Session, SessionConfig};
use crate::{Error, Result};

/// Outcome of one session of a fleet run
#[derive(Debug)]
pub struct SessionOutcome {
    /// Session identifier, position of the address in the list
    pub id: u8,
    /// Address of the Crazyflie
    pub uri: String,
    /// Result of the flight
    pub result: Result<()>,
}

/// Outcomes of all the sessions of a fleet run, ordered by identifier
#[derive(Debug, Default)]
pub struct FleetReport {
    /// One outcome per address
    pub outcomes: Vec<SessionOutcome>,
}

impl FleetReport {
    /// True if every session flew successfully
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Outcomes of the failed sessions
    pub fn failures(&self) -> impl Iterator<Item = &SessionOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Process exit code: 0 if all sessions succeeded, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for FleetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(()) => writeln!(f, "[#{}] {}: ok", outcome.id, outcome.uri)?,
                Err(e) => writeln!(f, "[#{}] {}: {}", outcome.id, outcome.uri, e)?,
            }
        }
        Ok(())
    }
}

/// Runs one session per address, concurrently
pub struct FleetRunner {
    connector: Arc<dyn Connector>,
    log_dir: PathBuf,
    config: SessionConfig,
    options: ExecuteOptions,
}

impl fmt::Debug for FleetRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FleetRunner")
            .field("log_dir", &self.log_dir)
            .field("config", &self.config)
            .field("options", &self.options)
            .finish()
    }
}

impl FleetRunner {
    /// Runner writing the session logs to `log_dir/log_{id}.txt`
    pub fn new(connector: Arc<dyn Connector>, log_dir: impl AsRef<Path>) -> Self {
        Self {
            connector,
            log_dir: log_dir.as_ref().to_path_buf(),
            config: SessionConfig::default(),
            options: ExecuteOptions::default(),
        }
    }

    /// Flight settings of every session
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Execution options of every session
    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    /// Log file of the session `id`
    pub fn log_path(&self, id: u8) -> PathBuf {
        self.log_dir.join(format!("log_{}.txt", id))
    }

    /// Fly `maneuver` with every address and wait for all the sessions
    ///
    /// Only fails if the run cannot start: too many addresses or a log
    /// directory that cannot be created. Session failures, including
    /// sessions that could not be constructed, are in the report.
    pub async fn run(&self, addresses: &[String], maneuver: Arc<dyn Maneuver>) -> Result<FleetReport> {
        if addresses.len() > usize::from(u8::MAX) + 1 {
            return Err(Error::ConfigError(format!(
                "{} addresses given, a fleet holds at most 256 Crazyflies",
                addresses.len()
            )));
        }

        std::fs::create_dir_all(&self.log_dir)?;

        let mut outcomes = Vec::with_capacity(addresses.len());
        let mut tasks = Vec::with_capacity(addresses.len());

        for (id, uri) in (0..=u8::MAX).zip(addresses.iter()) {
            let path = self.log_path(id);
            let session = match Session::new(self.connector.clone(), uri.as_str(), id, Some(&path)) {
                Ok(session) => session.with_config(self.config.clone()),
                Err(e) => {
                    log::error!("[#{}] cannot create session for {}: {}", id, uri, e);
                    outcomes.push(SessionOutcome {
                        id,
                        uri: uri.clone(),
                        result: Err(e),
                    });
                    continue;
                }
            };

            let options = self.options;
            let maneuver = maneuver.clone();
            let handle = tokio::spawn(async move {
                let mut session = session;
                session.fly(&options, maneuver.as_ref()).await
            });
            tasks.push((id, uri.clone(), handle));

            log::debug!("[#{}] session started for {}", id, uri);
        }

        let (ids, handles): (Vec<_>, Vec<_>) = tasks
            .into_iter()
            .map(|(id, uri, handle)| ((id, uri), handle))
            .unzip();

        for ((id, uri), joined) in ids.into_iter().zip(join_all(handles).await) {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    log::error!("[#{}] session task failed: {}", id, e);
                    Err(Error::SessionPanicked(id))
                }
            };
            if let Err(e) = &result {
                log::error!("[#{}] {} failed: {}", id, uri, e);
            }
            outcomes.push(SessionOutcome { id, uri, result });
        }

        outcomes.sort_by_key(|o| o.id);

        Ok(FleetReport { outcomes })
    }
}
