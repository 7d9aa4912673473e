//! Keyboard timer source
//!
//! A single trigger key (space bar, or both control keys) acts as the two
//! hand pads: pressing puts both hands down, releasing lifts them. The
//! front end feeds key edges through [`KeyboardTimer::key_pressed`] and
//! [`KeyboardTimer::key_released`]; the handle is cheap to clone so one
//! copy can be installed in the manager and another kept for input.

use super::event::{Hand, TimerEvent};
use super::manager::{ListenerId, TimerManager};
use super::stackmat::RUNNING_POLL_INTERVAL;
use super::task::PeriodicTask;
use super::{TimerError, TimerId, TimerSource};
use crate::model::Timing;
use chrono::{DateTime, Utc};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};

/// Keyboard timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Idle,
    /// Key held, inspection starts on release
    InspectionPending,
    Inspecting,
    /// Key held, the solve starts on release
    Ready,
    Running,
    /// Solve finished, key still held
    Stopped,
}

#[derive(Debug)]
struct Shared {
    state: KeyState,
    inspection_enabled: bool,
    key_down: bool,
    start: Option<DateTime<Utc>>,
}

struct Attached {
    manager: TimerManager,
    listener: ListenerId,
    poll: PeriodicTask,
}

struct Inner {
    id: TimerId,
    shared: Mutex<Shared>,
    attached: Mutex<Option<Attached>>,
}

/// Keyboard-driven timer source
#[derive(Clone)]
pub struct KeyboardTimer {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl KeyboardTimer {
    /// Space bar trigger
    pub fn space() -> Self {
        Self::new(TimerId::KeyboardSpace)
    }

    /// Control keys trigger
    pub fn control() -> Self {
        Self::new(TimerId::KeyboardControl)
    }

    fn new(id: TimerId) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                shared: Mutex::new(Shared {
                    state: KeyState::Idle,
                    inspection_enabled: false,
                    key_down: false,
                    start: None,
                }),
                attached: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> KeyState {
        lock(&self.inner.shared).state
    }

    fn manager(&self) -> Option<TimerManager> {
        lock(&self.inner.attached)
            .as_ref()
            .map(|a| a.manager.clone())
    }

    /// Trigger key went down. Auto-repeat presses are ignored.
    pub fn key_pressed(&self) {
        let Some(manager) = self.manager() else {
            tracing::debug!(timer = %self.inner.id, "Key press ignored, timer not started");
            return;
        };

        let now = manager.now();
        let (prior, next, start) = {
            let mut shared = lock(&self.inner.shared);
            if shared.key_down {
                return;
            }
            shared.key_down = true;
            let next = match shared.state {
                KeyState::Idle if shared.inspection_enabled => KeyState::InspectionPending,
                KeyState::Idle => KeyState::Ready,
                KeyState::Inspecting => KeyState::Ready,
                KeyState::Running => KeyState::Stopped,
                other => other,
            };
            (shared.state, next, shared.start)
        };

        manager.press_hand(Hand::Left);
        manager.press_hand(Hand::Right);

        if prior == KeyState::Running {
            let timing = Timing::new(start.unwrap_or(now), now);
            manager.update_solution_timing(timing);
            manager.finish_solution(timing);
        }

        self.apply(prior, next);
    }

    /// Trigger key went up
    pub fn key_released(&self) {
        let Some(manager) = self.manager() else {
            return;
        };

        let (prior, next) = {
            let mut shared = lock(&self.inner.shared);
            if !shared.key_down {
                return;
            }
            shared.key_down = false;
            let next = match shared.state {
                KeyState::InspectionPending => KeyState::Inspecting,
                KeyState::Ready => KeyState::Running,
                KeyState::Stopped => KeyState::Idle,
                other => other,
            };
            if next == KeyState::Running {
                shared.start = Some(manager.now());
            }
            (shared.state, next)
        };

        manager.release_hand(Hand::Left);
        manager.release_hand(Hand::Right);

        match (prior, next) {
            (KeyState::InspectionPending, KeyState::Inspecting) => manager.start_inspection(),
            (KeyState::Ready, KeyState::Running) => manager.start_solution(),
            (KeyState::Stopped, KeyState::Idle) => manager.reset_timer(),
            _ => {}
        }

        self.apply(prior, next);
    }

    /// Set the next state after the coordinator calls have been made
    ///
    /// A state changed by a listener in the meantime (the inspection
    /// timeout) wins, except over the start of a solve.
    fn apply(&self, prior: KeyState, next: KeyState) {
        if prior == next {
            return;
        }
        let mut shared = lock(&self.inner.shared);
        if shared.state == prior || next == KeyState::Running {
            tracing::debug!(?prior, ?next, "keyboard_transition");
            shared.state = next;
        } else {
            tracing::debug!(?prior, ?next, current = ?shared.state, "keyboard_transition_dropped");
        }
    }
}

impl TimerSource for KeyboardTimer {
    fn id(&self) -> TimerId {
        self.inner.id
    }

    fn start(&mut self, manager: &TimerManager) -> Result<(), TimerError> {
        if lock(&self.inner.attached).is_some() {
            return Err(TimerError::AlreadyStarted);
        }

        let weak = Arc::downgrade(&self.inner);
        let listener = manager.add_listener(move |event| {
            if *event != TimerEvent::InspectionFinished {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                let mut shared = lock(&inner.shared);
                if matches!(
                    shared.state,
                    KeyState::InspectionPending | KeyState::Inspecting | KeyState::Ready
                ) {
                    shared.state = KeyState::Idle;
                }
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let poll_manager = manager.clone();
        let poll = PeriodicTask::spawn("keyboard-poll", RUNNING_POLL_INTERVAL, move || {
            let Some(inner) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            let start = {
                let shared = lock(&inner.shared);
                match (shared.state, shared.start) {
                    (KeyState::Running, Some(start)) => Some(start),
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
                manager.remove_listener(listener);
                return Err(e.into());
            }
        };

        {
            let mut shared = lock(&self.inner.shared);
            shared.state = KeyState::Idle;
            shared.key_down = false;
            shared.start = None;
        }
        *lock(&self.inner.attached) = Some(Attached {
            manager: manager.clone(),
            listener,
            poll,
        });

        tracing::info!(timer = %self.inner.id, "Keyboard timer started");
        Ok(())
    }

    fn stop(&mut self) {
        let attached = lock(&self.inner.attached).take();
        if let Some(mut attached) = attached {
            attached.poll.cancel();
            attached.manager.remove_listener(attached.listener);
            tracing::info!(timer = %self.inner.id, "Keyboard timer stopped");
        }
    }

    fn set_inspection_enabled(&mut self, enabled: bool) {
        lock(&self.inner.shared).inspection_enabled = enabled;
    }
}
