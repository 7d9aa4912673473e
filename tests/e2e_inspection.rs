//! E2E tests for inspection penalties
//!
//! Drives the inspection countdown with a manual clock and checks what
//! ends up recorded in the session.

use cubetimer::stats::history::{NullSink, ScrambleQueue, SolutionRecorder};
use cubetimer::timer::clock::{Clock, ManualClock};
use cubetimer::timer::keyboard::KeyboardTimer;
use cubetimer::{Penalty, Session, SolveTime, TimerEvent, TimerManager};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn setup() -> (Arc<ManualClock>, TimerManager, SolutionRecorder, Arc<Mutex<Vec<TimerEvent>>>) {
    let clock = Arc::new(ManualClock::default());
    let manager = TimerManager::with_clock(clock.clone());
    let (recorder, _messages) = SolutionRecorder::new(
        Session::new("3x3x3"),
        Box::new(NullSink),
        Box::new(ScrambleQueue::default()),
    );
    recorder.attach(&manager);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    manager.add_listener(move |e| sink.lock().unwrap().push(e.clone()));
    (clock, manager, recorder, events)
}

fn wait_until(events: &Arc<Mutex<Vec<TimerEvent>>>, pred: impl Fn(&TimerEvent) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if events.lock().unwrap().iter().any(&pred) {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("timed out: {:?}", events.lock().unwrap());
}

#[test]
fn test_inspection_timeout_records_dnf() {
    let (clock, manager, recorder, events) = setup();

    manager.start_inspection();
    wait_until(&events, |e| matches!(e, TimerEvent::InspectionRunning { .. }));
    clock.advance(17_001);
    wait_until(&events, |e| matches!(e, TimerEvent::SolutionFinished { .. }));
    std::thread::sleep(Duration::from_millis(50));

    let session = recorder.session();
    assert_eq!(session.len(), 1);
    let solution = session.latest().unwrap();
    assert_eq!(solution.penalty, Penalty::Dnf);
    assert_eq!(solution.timing.elapsed_ms(), 0);
    assert_eq!(solution.real_time(), SolveTime::Dnf);

    let finished = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| **e == TimerEvent::InspectionFinished)
        .count();
    assert_eq!(finished, 1);
}

#[test]
fn test_late_start_gets_plus_two() {
    let (clock, manager, recorder, events) = setup();
    manager.set_inspection_enabled(true);
    let keyboard = KeyboardTimer::space();
    manager.set_timer(Box::new(keyboard.clone())).unwrap();

    // Release starts inspection
    keyboard.key_pressed();
    keyboard.key_released();
    assert!(manager.is_inspecting());

    clock.advance(16_000);
    wait_until(&events, |e| {
        matches!(e, TimerEvent::InspectionRunning { remaining_ms } if *remaining_ms < 0)
    });
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(manager.pending_penalty(), Penalty::PlusTwo);

    keyboard.key_pressed();
    keyboard.key_released();
    clock.advance(10_000);
    keyboard.key_pressed();
    keyboard.key_released();
    manager.shutdown();

    let solution = recorder.session().latest().cloned().unwrap();
    assert_eq!(solution.penalty, Penalty::PlusTwo);
    assert_eq!(solution.timing.elapsed_ms(), 10_000);
    assert_eq!(solution.real_time(), SolveTime::Finished(12_000));
}

#[test]
fn test_start_in_time_has_no_penalty() {
    let (clock, manager, recorder, _events) = setup();

    manager.start_inspection();
    clock.advance(8_000);
    manager.start_solution();
    let start = clock.now();
    clock.advance(9_870);
    manager.finish_solution(cubetimer::Timing::new(start, clock.now()));

    let solution = recorder.session().latest().cloned().unwrap();
    assert_eq!(solution.penalty, Penalty::None);
    assert_eq!(solution.real_time(), SolveTime::Finished(9_870));
}
