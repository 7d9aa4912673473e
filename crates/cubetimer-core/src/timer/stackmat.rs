//! Stackmat hardware timer source
//!
//! Turns the stream of decoded packets into coordinator calls. The device
//! does its own timing: the elapsed time on every packet is trusted and the
//! solve start is placed at `now - elapsed`.

use super::event::{Hand, TimerEvent};
use super::manager::{ListenerId, TimerManager};
use super::task::PeriodicTask;
use super::{TimerError, TimerId, TimerSource};
use crate::audio::engine::{AudioEngine, AudioEngineError};
use crate::audio::packet::{Packet, Status};
use crate::audio::reader::{ReaderHandle, StackmatReader};
use crate::model::Timing;
use chrono::{DateTime, Duration, Utc};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};

/// Interval of the running-time updates while a solve is in progress
pub const RUNNING_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(5);

/// Hardware timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for the display to be zeroed
    NotReady,
    /// Zeroed, the next pad touch starts inspection
    ResetForInspection,
    /// Zeroed, waiting for both hands or for the timer to run
    Reset,
    /// Both hands on the pads
    Ready,
    Running,
}

/// Coordinator call triggered by a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ResetTimer,
    StartInspection,
    StartSolution,
    FinishSolution,
}

/// State transition for one packet
///
/// # Returns
/// The coordinator call to make, if any, and the next state
pub fn transition(
    state: State,
    status: Status,
    elapsed_ms: i64,
    inspection_enabled: bool,
) -> (Option<Action>, State) {
    match state {
        State::NotReady if elapsed_ms == 0 => {
            let next = if inspection_enabled {
                State::ResetForInspection
            } else {
                State::Reset
            };
            (Some(Action::ResetTimer), next)
        }
        State::ResetForInspection
            if matches!(status, Status::LeftHand | Status::RightHand | Status::Center) =>
        {
            (Some(Action::StartInspection), State::Reset)
        }
        State::Reset | State::Ready if elapsed_ms > 0 => {
            (Some(Action::StartSolution), State::Running)
        }
        State::Reset if status == Status::BothHands => (None, State::Ready),
        State::Running if matches!(status, Status::Center | Status::Stopped) => {
            (Some(Action::FinishSolution), State::NotReady)
        }
        // Timer reset during the solve
        State::Running if elapsed_ms == 0 => (None, State::NotReady),
        _ => (None, state),
    }
}

#[derive(Debug)]
struct Shared {
    state: State,
    inspection_enabled: bool,
    /// Solve start derived from the latest packet
    start: Option<DateTime<Utc>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Stackmat timer source
pub struct StackmatTimer {
    shared: Arc<Mutex<Shared>>,
    reader: Option<StackmatReader>,
    reader_handle: Option<ReaderHandle>,
    poll: Option<PeriodicTask>,
    listener: Option<(TimerManager, ListenerId)>,
}

impl StackmatTimer {
    /// Create a timer reading from `reader`
    pub fn new(reader: StackmatReader) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: State::NotReady,
                inspection_enabled: false,
                start: None,
            })),
            reader: Some(reader),
            reader_handle: None,
            poll: None,
            listener: None,
        }
    }

    /// Open the engine's capture line and build a timer on it
    pub fn open(engine: &AudioEngine) -> Result<Self, AudioEngineError> {
        let line = engine.open_line()?;
        let reader = StackmatReader::new(line.sample_rate(), Box::new(line));
        Ok(Self::new(reader))
    }

    pub fn state(&self) -> State {
        lock(&self.shared).state
    }

    /// Whether the reader thread is still decoding
    pub fn is_reading(&self) -> bool {
        self.reader_handle
            .as_ref()
            .map(|h| h.is_alive())
            .unwrap_or(false)
    }
}

/// Apply one decoded packet
fn handle_packet(shared: &Mutex<Shared>, manager: &TimerManager, packet: Packet) {
    if packet.status.left_hand_pressed() {
        manager.press_hand(Hand::Left);
    } else {
        manager.release_hand(Hand::Left);
    }
    if packet.status.right_hand_pressed() {
        manager.press_hand(Hand::Right);
    } else {
        manager.release_hand(Hand::Right);
    }

    let elapsed = packet.elapsed_ms();
    let end = manager.now();
    let start = end - Duration::milliseconds(elapsed);
    let timing = Timing::new(start, end);

    let (action, prior, next) = {
        let mut shared = lock(shared);
        shared.start = Some(start);
        let (action, next) =
            transition(shared.state, packet.status, elapsed, shared.inspection_enabled);
        (action, shared.state, next)
    };

    if prior != next {
        tracing::debug!(?prior, ?next, %packet, "stackmat_transition");
    }

    match action {
        Some(Action::ResetTimer) => manager.reset_timer(),
        Some(Action::StartInspection) => manager.start_inspection(),
        Some(Action::StartSolution) => manager.start_solution(),
        Some(Action::FinishSolution) => {
            manager.update_solution_timing(timing);
            manager.finish_solution(timing);
        }
        None => {}
    }

    // Applied after the coordinator calls. A state changed meanwhile (the
    // inspection timeout) is kept, except that a solution start that ends
    // inspection must still land in Running.
    if prior != next {
        let mut shared = lock(shared);
        if shared.state == prior || action == Some(Action::StartSolution) {
            shared.state = next;
        }
    }
}

impl TimerSource for StackmatTimer {
    fn id(&self) -> TimerId {
        TimerId::Stackmat
    }

    fn start(&mut self, manager: &TimerManager) -> Result<(), TimerError> {
        if self.reader_handle.is_some() {
            return Err(TimerError::AlreadyStarted);
        }
        let reader = self.reader.take().ok_or(TimerError::LineClosed)?;

        let listener_shared = Arc::clone(&self.shared);
        let listener_id = manager.add_listener(move |event| {
            if *event == TimerEvent::InspectionFinished {
                lock(&listener_shared).state = State::NotReady;
            }
        });
        self.listener = Some((manager.clone(), listener_id));

        let poll_shared = Arc::clone(&self.shared);
        let poll_manager = manager.clone();
        let poll = PeriodicTask::spawn("stackmat-poll", RUNNING_POLL_INTERVAL, move || {
            let start = {
                let shared = lock(&poll_shared);
                match (shared.state, shared.start) {
                    (State::Running, Some(start)) => Some(start),
                    _ => None,
                }
            };
            if let Some(start) = start {
                poll_manager.update_solution_timing(Timing::new(start, poll_manager.now()));
            }
            ControlFlow::Continue(())
        });
        let poll = match poll {
            Ok(poll) => poll,
            Err(e) => {
                self.stop();
                return Err(e.into());
            }
        };
        self.poll = Some(poll);

        let packet_shared = Arc::clone(&self.shared);
        let packet_manager = manager.clone();
        match reader.start(move |packet| handle_packet(&packet_shared, &packet_manager, packet)) {
            Ok(handle) => self.reader_handle = Some(handle),
            Err(e) => {
                self.stop();
                return Err(e.into());
            }
        }

        tracing::info!("Stackmat timer started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut handle) = self.reader_handle.take() {
            handle.stop();
            tracing::info!(
                packets = handle.packets_decoded(),
                "Stackmat timer stopped"
            );
        }
        if let Some(mut poll) = self.poll.take() {
            poll.cancel();
        }
        if let Some((manager, id)) = self.listener.take() {
            manager.remove_listener(id);
        }
    }

    fn set_inspection_enabled(&mut self, enabled: bool) {
        let mut shared = lock(&self.shared);
        shared.inspection_enabled = enabled;
        shared.state = match shared.state {
            State::ResetForInspection if !enabled => State::Reset,
            State::Reset if enabled => State::ResetForInspection,
            other => other,
        };
    }
}

impl Drop for StackmatTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::signal::{SignalSource, StackmatSignal};
    use crate::timer::clock::ManualClock;
    use std::time::{Duration as StdDuration, Instant};

    #[test]
    fn test_not_ready_waits_for_zero() {
        assert_eq!(
            transition(State::NotReady, Status::Stopped, 1500, false),
            (None, State::NotReady)
        );
        assert_eq!(
            transition(State::NotReady, Status::Idle, 0, false),
            (Some(Action::ResetTimer), State::Reset)
        );
        assert_eq!(
            transition(State::NotReady, Status::Idle, 0, true),
            (Some(Action::ResetTimer), State::ResetForInspection)
        );
    }

    #[test]
    fn test_single_pad_starts_inspection() {
        for status in [Status::LeftHand, Status::RightHand, Status::Center] {
            assert_eq!(
                transition(State::ResetForInspection, status, 0, true),
                (Some(Action::StartInspection), State::Reset)
            );
        }
        assert_eq!(
            transition(State::ResetForInspection, Status::BothHands, 0, true),
            (None, State::ResetForInspection)
        );
    }

    #[test]
    fn test_reset_to_ready_and_running() {
        assert_eq!(
            transition(State::Reset, Status::BothHands, 0, false),
            (None, State::Ready)
        );
        assert_eq!(
            transition(State::Reset, Status::Idle, 10, false),
            (Some(Action::StartSolution), State::Running)
        );
        // Running time wins over both hands
        assert_eq!(
            transition(State::Reset, Status::BothHands, 10, false),
            (Some(Action::StartSolution), State::Running)
        );
        assert_eq!(
            transition(State::Ready, Status::Idle, 20, false),
            (Some(Action::StartSolution), State::Running)
        );
        assert_eq!(
            transition(State::Ready, Status::BothHands, 0, false),
            (None, State::Ready)
        );
    }

    #[test]
    fn test_running_stops_or_aborts() {
        assert_eq!(
            transition(State::Running, Status::Stopped, 9870, false),
            (Some(Action::FinishSolution), State::NotReady)
        );
        assert_eq!(
            transition(State::Running, Status::Center, 9870, false),
            (Some(Action::FinishSolution), State::NotReady)
        );
        assert_eq!(
            transition(State::Running, Status::Idle, 0, false),
            (None, State::NotReady)
        );
        assert_eq!(
            transition(State::Running, Status::Idle, 5000, false),
            (None, State::Running)
        );
    }

    #[test]
    fn test_inspection_toggle() {
        let mut timer = idle_timer();
        assert_eq!(timer.state(), State::NotReady);

        timer.set_inspection_enabled(true);
        assert_eq!(timer.state(), State::NotReady);

        lock(&timer.shared).state = State::Reset;
        timer.set_inspection_enabled(true);
        assert_eq!(timer.state(), State::ResetForInspection);
        timer.set_inspection_enabled(false);
        assert_eq!(timer.state(), State::Reset);
    }

    fn recorder(manager: &TimerManager) -> Arc<Mutex<Vec<TimerEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        manager.add_listener(move |e: &TimerEvent| sink.lock().unwrap().push(e.clone()));
        events
    }

    fn count(events: &Arc<Mutex<Vec<TimerEvent>>>, pred: impl Fn(&TimerEvent) -> bool) -> usize {
        events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn running_elapsed(events: &Arc<Mutex<Vec<TimerEvent>>>) -> Vec<i64> {
        events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                TimerEvent::SolutionRunning(timing) => Some(timing.elapsed_ms()),
                _ => None,
            })
            .collect()
    }

    fn idle_timer() -> StackmatTimer {
        StackmatTimer::new(StackmatReader::new(
            8000,
            Box::new(SignalSource::new(Vec::new())),
        ))
    }

    #[test]
    fn test_handle_packet_start_solution() {
        let manager = TimerManager::new();
        let events = recorder(&manager);

        let shared = Mutex::new(Shared {
            state: State::Reset,
            inspection_enabled: false,
            start: None,
        });
        handle_packet(&shared, &manager, Packet::new(Status::Idle, 30));
        handle_packet(&shared, &manager, Packet::new(Status::Idle, 60));

        assert_eq!(count(&events, |e| *e == TimerEvent::SolutionStarted), 1);
        assert_eq!(lock(&shared).state, State::Running);
    }

    #[test]
    fn test_inspection_timeout_returns_to_not_ready() {
        let clock = Arc::new(ManualClock::default());
        let manager = TimerManager::with_clock(clock.clone());
        let events = recorder(&manager);

        let mut timer = idle_timer();
        timer.start(&manager).unwrap();
        lock(&timer.shared).state = State::Reset;

        manager.start_inspection();
        clock.advance(17_001);
        let deadline = Instant::now() + StdDuration::from_secs(5);
        while count(&events, |e| matches!(e, TimerEvent::SolutionFinished { .. })) == 0 {
            assert!(Instant::now() < deadline, "inspection did not time out");
            std::thread::sleep(StdDuration::from_millis(5));
        }
        assert_eq!(timer.state(), State::NotReady);

        let resets = count(&events, |e| *e == TimerEvent::TimerReset);
        handle_packet(&timer.shared, &manager, Packet::new(Status::Idle, 0));
        assert_eq!(count(&events, |e| *e == TimerEvent::TimerReset), resets + 1);
        assert_eq!(timer.state(), State::Reset);

        timer.stop();
    }

    #[test]
    fn test_running_updates_until_stopped() {
        let manager = TimerManager::new();
        let events = recorder(&manager);

        let mut timer = idle_timer();
        timer.start(&manager).unwrap();
        {
            let mut shared = lock(&timer.shared);
            shared.state = State::Running;
            shared.start = Some(manager.now() - Duration::milliseconds(1000));
        }
        std::thread::sleep(StdDuration::from_millis(60));

        let elapsed = running_elapsed(&events);
        assert!(elapsed.len() >= 2, "updates: {:?}", elapsed);
        assert!(elapsed[0] >= 1000);
        assert!(elapsed.windows(2).all(|w| w[0] <= w[1]));
        assert!(elapsed[elapsed.len() - 1] > elapsed[0]);

        timer.stop();
        let after_stop = running_elapsed(&events).len();
        std::thread::sleep(StdDuration::from_millis(30));
        assert_eq!(running_elapsed(&events).len(), after_stop);
    }

    #[test]
    fn test_state_changed_during_notify_is_kept() {
        let manager = TimerManager::new();
        let shared = Arc::new(Mutex::new(Shared {
            state: State::ResetForInspection,
            inspection_enabled: true,
            start: None,
        }));
        let listener_shared = Arc::clone(&shared);
        manager.add_listener(move |e: &TimerEvent| {
            if *e == TimerEvent::InspectionStarted {
                lock(&listener_shared).state = State::NotReady;
            }
        });

        handle_packet(&shared, &manager, Packet::new(Status::LeftHand, 0));
        assert_eq!(lock(&shared).state, State::NotReady);

        manager.shutdown();
    }

    #[test]
    fn test_stopped_timer_cannot_restart() {
        let signal = StackmatSignal::new(8000);
        let samples = signal.stream(&[Packet::new(Status::Idle, 0); 3]);
        let reader = StackmatReader::new(8000, Box::new(SignalSource::new(samples)));
        let mut timer = StackmatTimer::new(reader);
        let manager = TimerManager::new();

        timer.start(&manager).unwrap();
        assert!(matches!(
            timer.start(&manager),
            Err(TimerError::AlreadyStarted)
        ));

        timer.stop();
        timer.stop();
        assert!(!timer.is_reading());
        assert!(matches!(timer.start(&manager), Err(TimerError::LineClosed)));
    }
}
