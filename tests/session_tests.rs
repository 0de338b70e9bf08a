// Session lifecycle scenarios against simulated Crazyflies

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;

use crazyflie_fleet::maneuvers::{Maneuver, TakeOff};
use crazyflie_fleet::session::{Estimator, SessionConfig};
use crazyflie_fleet::sim::{DeckResponse, Journal, LinkEvent, SimConnector, SimProfile};
use crazyflie_fleet::{
    Action, Connected, Error, ExecuteOptions, MotionCommander, Result, Session, SessionState, Value,
};

const URI: &str = "radio://0/80/2M/E7E7E7E7E7";

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn log_file(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("crazyflie-fleet-session-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{}.txt", name))
}

fn count(journal: &Journal, event: LinkEvent) -> usize {
    journal.count(URI, |e| *e == event)
}

fn position(events: &[LinkEvent], predicate: impl Fn(&LinkEvent) -> bool) -> usize {
    events.iter().position(predicate).unwrap()
}

fn quick() -> ExecuteOptions {
    ExecuteOptions::default().with_capability_check(false).with_telemetry(false)
}

struct NoOp;

#[async_trait]
impl Action for NoOp {
    async fn run(&self, _cf: &Connected) -> Result<()> {
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl Action for Failing {
    async fn run(&self, _cf: &Connected) -> Result<()> {
        Err(Error::ActionError("scripted failure".to_owned()))
    }
}

struct Panicking;

#[async_trait]
impl Action for Panicking {
    async fn run(&self, _cf: &Connected) -> Result<()> {
        panic!("scripted panic");
    }
}

struct Hover(Duration);

#[async_trait]
impl Action for Hover {
    async fn run(&self, _cf: &Connected) -> Result<()> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

enum Stumble {
    Fails,
    Panics,
}

#[async_trait]
impl Maneuver for Stumble {
    fn name(&self) -> &str {
        "stumble"
    }

    async fn fly(&self, mc: &mut MotionCommander) -> Result<()> {
        mc.forward(0.2).await?;
        match self {
            Stumble::Fails => Err(Error::ActionError("scripted failure in flight".to_owned())),
            Stumble::Panics => panic!("scripted panic in flight"),
        }
    }
}

fn assert_landed_before_disconnecting(journal: &Journal) {
    let events = journal.events_for(URI);
    let moved = position(&events, |e| matches!(e, LinkEvent::GoTo { .. }));
    let land = position(&events, |e| matches!(e, LinkEvent::Land { .. }));
    let disarmed = position(&events, |e| *e == LinkEvent::Armed(false));
    let disconnected = position(&events, |e| *e == LinkEvent::Disconnected);

    assert!(moved < land);
    assert!(land < disarmed);
    assert!(disarmed < disconnected);
    assert_eq!(disconnected, events.len() - 1);
}

#[tokio::test(start_paused = true)]
async fn noop_without_capability_check_connects_and_disconnects_once() {
    init_logger();
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();

    let mut session = Session::new(connector, URI, 2, None).unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);

    let opts = ExecuteOptions::default().with_capability_check(false);
    session.execute(&opts, &NoOp).await.unwrap();

    assert_eq!(count(&journal, LinkEvent::Connected), 1);
    assert_eq!(count(&journal, LinkEvent::Disconnected), 1);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.capability_verified());
}

#[tokio::test(start_paused = true)]
async fn failing_action_still_disconnects_once() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();
    let path = log_file("failing");

    let mut session = Session::new(connector, URI, 0, Some(&path)).unwrap();
    let opts = ExecuteOptions::default().with_capability_check(false);
    let result = session.execute(&opts, &Failing).await;

    assert!(matches!(result, Err(Error::ActionError(_))));
    assert_eq!(count(&journal, LinkEvent::Disconnected), 1);

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("[#0] session failed: scripted failure"));
}

#[tokio::test(start_paused = true)]
async fn panicking_action_disconnects_before_the_panic_resumes() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();

    let mut session = Session::new(connector, URI, 0, None).unwrap();
    let opts = ExecuteOptions::default().with_capability_check(false);
    let outcome = AssertUnwindSafe(session.execute(&opts, &Panicking))
        .catch_unwind()
        .await;

    assert!(outcome.is_err());
    assert_eq!(count(&journal, LinkEvent::Disconnected), 1);
    assert_eq!(count(&journal, LinkEvent::LogStopped("Stabilizer".to_owned())), 1);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn failing_maneuver_lands_before_disconnecting() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();

    let mut session = Session::new(connector, URI, 0, None).unwrap();
    let result = session.fly(&quick(), &Stumble::Fails).await;

    assert!(matches!(result, Err(Error::ActionError(_))));
    assert_landed_before_disconnecting(&journal);
    assert_eq!(count(&journal, LinkEvent::Disconnected), 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_maneuver_lands_before_disconnecting() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();

    let mut session = Session::new(connector, URI, 0, None).unwrap();
    let outcome = AssertUnwindSafe(session.fly(&quick(), &Stumble::Panics))
        .catch_unwind()
        .await;
    assert!(outcome.is_err());

    // A landing spawned late would show up after the disconnection
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_landed_before_disconnecting(&journal);
    assert_eq!(journal.count(URI, |e| matches!(e, LinkEvent::Land { .. })), 1);
    assert_eq!(count(&journal, LinkEvent::Disconnected), 1);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn configured_parameters_are_written_with_their_type() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();
    let path = log_file("configured-params");

    let mut config = SessionConfig::default();
    config.params.insert("ring.effect".to_owned(), "3".to_owned());
    config.params.insert("pid_attitude.yaw_kd".to_owned(), "0.5".to_owned());

    let mut session = Session::new(connector, URI, 0, Some(&path)).unwrap().with_config(config);
    session.execute(&quick(), &NoOp).await.unwrap();

    assert_eq!(
        count(&journal, LinkEvent::ParamSet { name: "ring.effect".to_owned(), value: Value::U8(3) }),
        1
    );
    assert_eq!(
        count(
            &journal,
            LinkEvent::ParamSet { name: "pid_attitude.yaw_kd".to_owned(), value: Value::F32(0.5) }
        ),
        1
    );

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("[#0] param ring.effect = 3\n"));
}

#[tokio::test(start_paused = true)]
async fn unparsable_configured_parameter_fails_before_the_action() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();

    let mut config = SessionConfig::default();
    config.params.insert("ring.effect".to_owned(), "bright".to_owned());

    let mut session = Session::new(connector, URI, 0, None).unwrap().with_config(config);
    let result = session.execute(&quick(), &Panicking).await;

    assert!(matches!(result, Err(Error::ConversionError(_))));
    assert_eq!(journal.count(URI, |e| matches!(e, LinkEvent::ParamSet { .. })), 0);
    assert_eq!(count(&journal, LinkEvent::Disconnected), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_deck_times_out_and_releases_the_link() {
    let connector = Arc::new(SimConnector::new());
    connector.set_profile(URI, SimProfile::default().with_deck(DeckResponse::Silent));
    let journal = connector.journal();

    let mut session = Session::new(connector, URI, 4, None).unwrap();
    let start = tokio::time::Instant::now();
    let result = session.fly(&ExecuteOptions::default(), &TakeOff::default()).await;

    match result {
        Err(Error::HardwareNotReady { id, capability, timeout }) => {
            assert_eq!(id, 4);
            assert_eq!(capability, "deck.bcFlow2");
            assert_eq!(timeout, Duration::from_secs(5));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(start.elapsed() >= Duration::from_secs(5));

    assert_eq!(count(&journal, LinkEvent::Disconnected), 1);
    assert_eq!(journal.count(URI, |e| matches!(e, LinkEvent::TakeOff { .. })), 0);
    assert_eq!(journal.count(URI, |e| matches!(e, LinkEvent::Armed(true))), 0);
    assert!(!session.capability_verified());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn detached_deck_is_reported_and_not_flown() {
    let connector = Arc::new(SimConnector::new());
    connector.set_profile(URI, SimProfile::default().with_deck(DeckResponse::Detached));
    let path = log_file("detached");

    let mut session = Session::new(connector, URI, 1, Some(&path)).unwrap();
    let opts = ExecuteOptions::default().with_timeout(Duration::from_secs(2));
    let result = session.fly(&opts, &TakeOff::default()).await;

    assert!(result.map_err(|e| e.is_hardware_not_ready()).unwrap_err());

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("[#1] param deck.bcFlow2 = 0\n"));
    assert!(content.contains("[#1] Deck is NOT attached!\n"));
}

#[tokio::test(start_paused = true)]
async fn telemetry_is_stopped_before_disconnecting() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();
    let path = log_file("telemetry");

    let mut session = Session::new(connector, URI, 0, Some(&path)).unwrap();
    session.fly(&ExecuteOptions::default(), &TakeOff::default()).await.unwrap();

    let events = journal.events_for(URI);
    let started = position(&events, |e| *e == LinkEvent::LogStarted("Stabilizer".to_owned()));
    let take_off = position(&events, |e| matches!(e, LinkEvent::TakeOff { .. }));
    let land = position(&events, |e| matches!(e, LinkEvent::Land { .. }));
    let stopped = position(&events, |e| *e == LinkEvent::LogStopped("Stabilizer".to_owned()));
    let disconnected = position(&events, |e| *e == LinkEvent::Disconnected);

    assert!(started < take_off);
    assert!(take_off < land);
    assert!(land < stopped);
    assert!(stopped < disconnected);
    assert_eq!(disconnected, events.len() - 1);

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("][Stabilizer]: {'stabilizer.pitch': "));
    assert!(content.lines().all(|line| line.starts_with("[#0] ")));
}

#[tokio::test(start_paused = true)]
async fn verified_capability_persists_across_executions() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();
    let path = log_file("reentry");

    let mut session = Session::new(connector, URI, 0, Some(&path)).unwrap();
    session.fly(&ExecuteOptions::default(), &TakeOff::default()).await.unwrap();
    assert!(session.capability_verified());

    session.execute(&ExecuteOptions::default(), &NoOp).await.unwrap();

    assert_eq!(count(&journal, LinkEvent::Connected), 2);
    assert_eq!(count(&journal, LinkEvent::Disconnected), 2);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.matches("Deck is attached!").count(), 1);
}

struct SetEstimator;

#[async_trait]
impl Action for SetEstimator {
    async fn run(&self, cf: &Connected) -> Result<()> {
        let path = cf.sink().path().unwrap().to_path_buf();

        cf.set_parameter_async("stabilizer", "estimator", Some(Value::U8(1)), None)
            .await?;

        // The current value is reported before returning
        let content = std::fs::read_to_string(&path)?;
        assert!(content.contains("[#3] param stabilizer.estimator = 2\n"));

        let previous = cf.set_estimator(Estimator::Kalman).await?;
        assert_eq!(previous, Estimator::Complementary);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn set_parameter_async_reports_then_writes() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();
    let path = log_file("estimator");

    let mut session = Session::new(connector, URI, 3, Some(&path)).unwrap();
    session.execute(&quick(), &SetEstimator).await.unwrap();

    let sets: Vec<_> = journal
        .events_for(URI)
        .into_iter()
        .filter(|e| matches!(e, LinkEvent::ParamSet { .. }))
        .collect();
    assert_eq!(
        sets,
        vec![
            LinkEvent::ParamSet {
                name: "stabilizer.estimator".to_owned(),
                value: Value::U8(1)
            },
            LinkEvent::ParamSet {
                name: "stabilizer.estimator".to_owned(),
                value: Value::U8(2)
            },
        ]
    );

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("[#3] param stabilizer.estimator = 1\n"));
}

struct RejectingCallback;

#[async_trait]
impl Action for RejectingCallback {
    async fn run(&self, cf: &Connected) -> Result<()> {
        let callback: crazyflie_fleet::session::ParamCallback =
            Arc::new(|name: &str, _value: Value| -> Result<()> {
                Err(Error::ParamError(format!("{} rejected", name)))
            });
        cf.set_parameter_async("ring", "effect", None, Some(callback)).await
    }
}

#[tokio::test(start_paused = true)]
async fn callback_errors_are_logged_and_swallowed() {
    let connector = Arc::new(SimConnector::new());
    let path = log_file("callback");

    let mut session = Session::new(connector, URI, 0, Some(&path)).unwrap();
    session.execute(&quick(), &RejectingCallback).await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("param callback error for ring.effect"));
}

#[tokio::test(start_paused = true)]
async fn unreachable_crazyflie_is_a_connection_error() {
    let connector = Arc::new(SimConnector::new());
    connector.set_profile(URI, SimProfile::unreachable());
    let journal = connector.journal();
    let path = log_file("unreachable");

    let mut session = Session::new(connector, URI, 0, Some(&path)).unwrap();
    let result = session.execute(&quick(), &NoOp).await;

    assert!(matches!(result, Err(Error::ConnectionError { .. })));
    assert!(journal.events().is_empty());
    assert_eq!(session.state(), SessionState::Disconnected);

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("[#0] connection failed: "));
}

#[tokio::test(start_paused = true)]
async fn dropped_execution_still_tears_down() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();

    let mut session = Session::new(connector, URI, 0, None).unwrap();
    let opts = ExecuteOptions::default().with_capability_check(false);

    let interrupted = tokio::time::timeout(
        Duration::from_secs(1),
        session.execute(&opts, &Hover(Duration::from_secs(10))),
    )
    .await;
    assert!(interrupted.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = journal.events_for(URI);
    let stopped = position(&events, |e| *e == LinkEvent::LogStopped("Stabilizer".to_owned()));
    let disconnected = position(&events, |e| *e == LinkEvent::Disconnected);
    assert!(stopped < disconnected);
    assert_eq!(count(&journal, LinkEvent::Disconnected), 1);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn log_once_reads_a_single_sample() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();
    let path = log_file("log-once");

    let mut session = Session::new(connector, URI, 0, Some(&path)).unwrap();
    let sample = session.log_once().await.unwrap();

    assert_eq!(sample.block, "Stabilizer");
    assert_eq!(sample.data.len(), 6);
    assert_eq!(count(&journal, LinkEvent::LogStarted("Stabilizer".to_owned())), 1);
    assert_eq!(count(&journal, LinkEvent::LogStopped("Stabilizer".to_owned())), 1);
    assert_eq!(count(&journal, LinkEvent::Disconnected), 1);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 1);
}

#[tokio::test(start_paused = true)]
async fn log_for_streams_without_flying() {
    let connector = Arc::new(SimConnector::new());
    let journal = connector.journal();
    let path = log_file("log-for");

    let mut session = Session::new(connector, URI, 0, Some(&path)).unwrap();
    session.log_for(Duration::from_millis(200)).await.unwrap();

    assert_eq!(journal.count(URI, |e| matches!(e, LinkEvent::TakeOff { .. })), 0);
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.lines().filter(|l| l.contains("[Stabilizer]")).count() >= 10);
}

#[test]
fn unwritable_log_path_fails_construction() {
    let connector = Arc::new(SimConnector::new());
    let path = log_file("missing").with_extension("d").join("nested").join("log.txt");

    let result = Session::new(connector, URI, 0, Some(&path));
    assert!(matches!(result, Err(Error::IoError(_))));
}
