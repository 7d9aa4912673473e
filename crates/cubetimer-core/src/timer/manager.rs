//! Timer coordinator
//!
//! [`TimerManager`] owns the solve lifecycle: the active timer source, the
//! inspection countdown and the pending penalty. Every lifecycle step is
//! broadcast as a [`TimerEvent`] to the registered listeners.
//!
//! Listeners are called in registration order with no lock held, so a
//! listener may call back into the manager; nested events are delivered
//! depth-first.

use super::clock::{Clock, SystemClock};
use super::event::{Hand, TimerEvent};
use super::task::PeriodicTask;
use super::{TimerError, TimerId, TimerSource};
use crate::model::{Penalty, Timing};
use crate::{INSPECTION_LIMIT_MS, INSPECTION_TIME_MS};
use chrono::{DateTime, Utc};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

/// Default countdown tick interval
pub const COUNTDOWN_INTERVAL: Duration = Duration::from_millis(10);

/// Registered listener callback
pub type Listener = Arc<dyn Fn(&TimerEvent) + Send + Sync>;

/// Handle for removing a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct State {
    inspection_enabled: bool,
    inspection_start: Option<DateTime<Utc>>,
    penalty: Penalty,
    countdown: Option<PeriodicTask>,
    /// Bumped whenever an inspection starts or ends; stale ticks compare
    /// against it and bail out
    generation: u64,
    current: Option<TimerId>,
}

struct Inner {
    state: Mutex<State>,
    source: Mutex<Option<Box<dyn TimerSource>>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    clock: Arc<dyn Clock>,
    countdown_interval: Duration,
}

/// Solve lifecycle coordinator (cheap to clone)
#[derive(Clone)]
pub struct TimerManager {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl TimerManager {
    /// Create a manager using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_clock_and_interval(clock, COUNTDOWN_INTERVAL)
    }

    pub fn with_clock_and_interval(clock: Arc<dyn Clock>, countdown_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                source: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                clock,
                countdown_interval,
            }),
        }
    }

    /// Current instant according to the manager's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    // Listeners

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TimerEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    fn notify(&self, event: TimerEvent) {
        if event.is_tick() {
            tracing::trace!(?event, "timer_event");
        } else {
            tracing::debug!(?event, "timer_event");
        }

        let snapshot: Vec<Listener> = lock(&self.inner.listeners)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(&event);
        }
    }

    // Timer source

    /// Install a new timer source
    ///
    /// Cancels a running inspection and stops the previous source. If the
    /// new source fails to start it is dropped and no source is active.
    pub fn set_timer(&self, mut source: Box<dyn TimerSource>) -> Result<(), TimerError> {
        self.cancel_inspection();

        let previous = lock(&self.inner.source).take();
        if let Some(mut previous) = previous {
            tracing::info!(timer = %previous.id(), "Stopping timer source");
            previous.stop();
        }
        lock(&self.inner.state).current = None;

        let id = source.id();
        let inspection_enabled = self.is_inspection_enabled();
        source.set_inspection_enabled(inspection_enabled);
        source.start(self)?;

        *lock(&self.inner.source) = Some(source);
        lock(&self.inner.state).current = Some(id);
        tracing::info!(timer = %id, inspection_enabled, "Timer source started");

        self.notify(TimerEvent::TimerChanged(id));
        Ok(())
    }

    /// Id of the active source
    pub fn current_timer(&self) -> Option<TimerId> {
        lock(&self.inner.state).current
    }

    pub fn reset_timer(&self) {
        self.notify(TimerEvent::TimerReset);
    }

    /// Cancel inspection and stop the active source
    pub fn shutdown(&self) {
        self.cancel_inspection();
        let source = lock(&self.inner.source).take();
        if let Some(mut source) = source {
            source.stop();
        }
        lock(&self.inner.state).current = None;
        tracing::info!("Timer manager shut down");
    }

    // Hands

    pub fn press_hand(&self, hand: Hand) {
        self.notify(TimerEvent::HandPressed(hand));
    }

    pub fn release_hand(&self, hand: Hand) {
        self.notify(TimerEvent::HandReleased(hand));
    }

    // Inspection

    pub fn is_inspection_enabled(&self) -> bool {
        lock(&self.inner.state).inspection_enabled
    }

    pub fn set_inspection_enabled(&self, enabled: bool) {
        lock(&self.inner.state).inspection_enabled = enabled;
        if let Some(source) = lock(&self.inner.source).as_mut() {
            source.set_inspection_enabled(enabled);
        }
        self.notify(TimerEvent::InspectionEnabledSet(enabled));
    }

    pub fn is_inspecting(&self) -> bool {
        lock(&self.inner.state).inspection_start.is_some()
    }

    /// Penalty that the next finished solution will carry
    pub fn pending_penalty(&self) -> Penalty {
        lock(&self.inner.state).penalty
    }

    /// Start the 15 second inspection countdown
    ///
    /// The countdown ticks `InspectionRunning` every interval. Past 15
    /// seconds the pending penalty becomes +2; past 17 seconds inspection
    /// ends on its own and a zero-length DNF solution is finished.
    pub fn start_inspection(&self) {
        self.notify(TimerEvent::InspectionStarted);

        let (generation, previous) = {
            let mut state = lock(&self.inner.state);
            state.generation += 1;
            state.inspection_start = Some(self.now());
            state.penalty = Penalty::None;
            (state.generation, state.countdown.take())
        };
        drop(previous);

        let weak = Arc::downgrade(&self.inner);
        let task = PeriodicTask::spawn("inspection", self.inner.countdown_interval, move || {
            inspection_tick(&weak, generation)
        });

        match task {
            Ok(task) => {
                let stale = {
                    let mut state = lock(&self.inner.state);
                    if state.generation == generation {
                        state.countdown = Some(task);
                        None
                    } else {
                        Some(task)
                    }
                };
                drop(stale);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to start inspection countdown");
            }
        }
    }

    /// End a running inspection without notifying
    fn cancel_inspection(&self) {
        let task = {
            let mut state = lock(&self.inner.state);
            if state.inspection_start.is_none() {
                return;
            }
            state.inspection_start = None;
            state.penalty = Penalty::None;
            state.generation += 1;
            state.countdown.take()
        };
        drop(task);
    }

    // Solution

    pub fn start_solution(&self) {
        let (inspecting, countdown) = {
            let mut state = lock(&self.inner.state);
            let inspecting = state.inspection_start.take().is_some();
            if inspecting {
                state.generation += 1;
            }
            (inspecting, state.countdown.take())
        };

        // Join the countdown first so no tick follows InspectionFinished
        drop(countdown);
        if inspecting {
            self.notify(TimerEvent::InspectionFinished);
        }

        self.notify(TimerEvent::SolutionStarted);
    }

    pub fn update_solution_timing(&self, timing: Timing) {
        self.notify(TimerEvent::SolutionRunning(timing));
    }

    /// Finish the solution with the pending penalty, then clear it
    pub fn finish_solution(&self, timing: Timing) {
        let penalty = self.pending_penalty();
        self.notify(TimerEvent::SolutionFinished { timing, penalty });
        lock(&self.inner.state).penalty = Penalty::None;
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TimerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("TimerManager")
            .field("current", &state.current)
            .field("inspection_enabled", &state.inspection_enabled)
            .field("inspecting", &state.inspection_start.is_some())
            .field("penalty", &state.penalty)
            .finish()
    }
}

/// One countdown step of the inspection started as `generation`
fn inspection_tick(weak: &Weak<Inner>, generation: u64) -> ControlFlow<()> {
    let Some(inner) = weak.upgrade() else {
        return ControlFlow::Break(());
    };
    let manager = TimerManager { inner };

    let (start, now) = {
        let state = lock(&manager.inner.state);
        match state.inspection_start {
            Some(start) if state.generation == generation => (start, manager.now()),
            _ => return ControlFlow::Break(()),
        }
    };
    let elapsed = (now - start).num_milliseconds();

    manager.notify(TimerEvent::InspectionRunning {
        remaining_ms: INSPECTION_TIME_MS - elapsed,
    });

    let mut state = lock(&manager.inner.state);
    if state.generation != generation {
        return ControlFlow::Break(());
    }

    if elapsed > INSPECTION_LIMIT_MS {
        state.inspection_start = None;
        state.generation += 1;
        state.penalty = Penalty::Dnf;
        // Our own task: dropping it here only signals the stop
        let own_task = state.countdown.take();
        drop(state);
        drop(own_task);

        tracing::info!(elapsed, "Inspection overtime, solution is DNF");
        manager.notify(TimerEvent::InspectionFinished);
        manager.finish_solution(Timing::instant(now));
        return ControlFlow::Break(());
    }

    if elapsed > INSPECTION_TIME_MS && state.penalty != Penalty::PlusTwo {
        tracing::debug!(elapsed, "Inspection over 15 seconds, +2 pending");
        state.penalty = Penalty::PlusTwo;
    }

    ControlFlow::Continue(())
}
