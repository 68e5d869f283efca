//! Device command interpreter and auto-shutoff timing

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agrosmart::device::actuator::Actuator;
use agrosmart::device::interpreter::CommandInterpreter;
use agrosmart::device::state::ValveState;
use agrosmart::errors::StationError;
use tokio::time::{sleep, Instant};
use tokio_test::assert_err;

type Events = Arc<Mutex<Vec<(&'static str, Instant)>>>;

#[derive(Clone, Default)]
struct RecordingActuator {
    events: Events,
}

impl Actuator for RecordingActuator {
    fn open(&mut self) -> Result<(), StationError> {
        self.events.lock().unwrap().push(("open", Instant::now()));
        Ok(())
    }

    fn close(&mut self) -> Result<(), StationError> {
        self.events.lock().unwrap().push(("close", Instant::now()));
        Ok(())
    }
}

fn start(max_duration_secs: u32) -> (Arc<CommandInterpreter>, Events) {
    let actuator = RecordingActuator::default();
    let events = actuator.events.clone();
    let (interpreter, shutoff) = CommandInterpreter::new("esp32-01", max_duration_secs, Box::new(actuator));
    tokio::spawn(shutoff.run(Box::pin(std::future::pending::<()>())));
    (Arc::new(interpreter), events)
}

fn command(device_id: Option<&str>, action: &str, duration: i64) -> Vec<u8> {
    let mut json = serde_json::json!({ "action": action, "duration": duration, "origin": "manual" });
    if let Some(id) = device_id {
        json["device_id"] = id.into();
    }
    serde_json::to_vec(&json).unwrap()
}

fn closes(events: &Events) -> Vec<Instant> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|(kind, _)| *kind == "close")
        .map(|(_, at)| *at)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_auto_shutoff_after_exact_duration() {
    let (interpreter, events) = start(900);
    let t0 = Instant::now();

    let state = interpreter.handle_payload(&command(Some("esp32-01"), "on", 300)).unwrap();
    assert!(state.is_open());

    sleep(Duration::from_secs(299)).await;
    assert!(interpreter.state().is_open());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(interpreter.state(), ValveState::Closed);
    assert_eq!(closes(&events), vec![t0 + Duration::from_secs(300)]);
}

#[tokio::test(start_paused = true)]
async fn test_second_command_resets_deadline() {
    let (interpreter, events) = start(900);
    let t0 = Instant::now();

    interpreter.handle_payload(&command(Some("esp32-01"), "on", 300)).unwrap();
    sleep(Duration::from_secs(100)).await;
    interpreter.handle_payload(&command(Some("esp32-01"), "on", 600)).unwrap();

    // Past the original 300 s mark
    sleep(Duration::from_secs(250)).await;
    assert!(interpreter.state().is_open());

    sleep(Duration::from_secs(349)).await;
    assert!(interpreter.state().is_open());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(interpreter.state(), ValveState::Closed);
    assert_eq!(closes(&events), vec![t0 + Duration::from_secs(700)]);

    // The relay was energized once for the whole window
    let opens = events.lock().unwrap().iter().filter(|(k, _)| *k == "open").count();
    assert_eq!(opens, 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_duration_closes_from_either_state() {
    let (interpreter, events) = start(900);

    let state = interpreter.handle_payload(&command(None, "on", 0)).unwrap();
    assert_eq!(state, ValveState::Closed);

    interpreter.handle_payload(&command(Some("esp32-01"), "on", 300)).unwrap();
    sleep(Duration::from_secs(10)).await;
    let state = interpreter.handle_payload(&command(Some("esp32-01"), "on", 0)).unwrap();
    assert_eq!(state, ValveState::Closed);

    // The disarmed timer must not fire again at the old deadline
    let before = closes(&events).len();
    sleep(Duration::from_secs(600)).await;
    assert_eq!(closes(&events).len(), before);
}

#[tokio::test(start_paused = true)]
async fn test_foreign_and_unknown_commands_ignored() {
    let (interpreter, events) = start(900);

    let result = interpreter.handle_payload(&command(Some("esp32-02"), "on", 300));
    assert!(matches!(result, Err(StationError::AddressMismatch { .. })));
    assert_err!(interpreter.handle_payload(&command(Some(""), "on", 300)));

    let result = interpreter.handle_payload(&command(Some("esp32-01"), "off", 300));
    assert!(matches!(result, Err(StationError::UnrecognizedAction(_))));

    assert!(interpreter.handle_payload(b"{not json").is_err());

    assert_eq!(interpreter.state(), ValveState::Closed);
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_opens_and_hard_cap_clamps() {
    let (interpreter, events) = start(900);
    let t0 = Instant::now();

    interpreter.handle_payload(&command(None, "on", 5_000)).unwrap();
    match interpreter.state() {
        ValveState::Open { deadline } => assert_eq!(deadline, t0 + Duration::from_secs(900)),
        ValveState::Closed => panic!("broadcast command should open the valve"),
    }

    sleep(Duration::from_secs(901)).await;
    assert_eq!(closes(&events), vec![t0 + Duration::from_secs(900)]);
}

#[tokio::test(start_paused = true)]
async fn test_negative_duration_treated_as_stop() {
    let (interpreter, _events) = start(900);
    interpreter.handle_payload(&command(Some("esp32-01"), "on", 120)).unwrap();

    let state = interpreter.handle_payload(&command(Some("esp32-01"), "on", -5)).unwrap();
    assert_eq!(state, ValveState::Closed);
}
