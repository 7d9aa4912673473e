//! Turning finished solves into recorded solutions
//!
//! [`SolutionRecorder`] listens to the coordinator, stores every finished
//! solve in the [`Session`] and forwards changes to a [`SolutionSink`].
//! Sink failures never lose the solve: it stays in the session, the error
//! is logged and a [`UserMessage`] is queued for the front end.

use super::session::{Session, SummaryRow};
use crate::model::{Penalty, Solution, Timing};
use crate::timer::event::TimerEvent;
use crate::timer::manager::{ListenerId, TimerManager};
use anyhow::Context;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Persistence of solution changes
pub trait SolutionSink: Send {
    fn solution_added(&mut self, solution: &Solution) -> anyhow::Result<()>;
    fn solution_updated(&mut self, solution: &Solution) -> anyhow::Result<()>;
    fn solution_removed(&mut self, id: Uuid) -> anyhow::Result<()>;
}

/// Sink that keeps nothing
#[derive(Debug, Default)]
pub struct NullSink;

impl SolutionSink for NullSink {
    fn solution_added(&mut self, _solution: &Solution) -> anyhow::Result<()> {
        Ok(())
    }

    fn solution_updated(&mut self, _solution: &Solution) -> anyhow::Result<()> {
        Ok(())
    }

    fn solution_removed(&mut self, _id: Uuid) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Provider of the scramble shown for the next solve
pub trait ScrambleProvider: Send {
    fn current(&self) -> String;

    /// Move on to the next scramble
    fn advance(&mut self);
}

/// Scrambles taken from a prepared list, cycling at the end
#[derive(Debug, Clone, Default)]
pub struct ScrambleQueue {
    scrambles: Vec<String>,
    position: usize,
}

impl ScrambleQueue {
    pub fn new(scrambles: Vec<String>) -> Self {
        Self {
            scrambles,
            position: 0,
        }
    }
}

impl ScrambleProvider for ScrambleQueue {
    fn current(&self) -> String {
        self.scrambles
            .get(self.position)
            .cloned()
            .unwrap_or_default()
    }

    fn advance(&mut self) {
        if !self.scrambles.is_empty() {
            self.position = (self.position + 1) % self.scrambles.len();
        }
    }
}

/// Kind of change in the solutions log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Added,
    Updated,
    Removed,
}

/// One line of the solutions log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub change: Change,
    pub at: DateTime<Utc>,
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
}

/// Append-only JSON lines log of solution changes
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &LogRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Replay a log into the solutions it describes
    ///
    /// A missing file yields no solutions. Malformed lines are skipped with
    /// a warning.
    pub fn load(path: &Path) -> anyhow::Result<Vec<Solution>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;

        let mut solutions: Vec<Solution> = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: LogRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(line = number + 1, error = %e, "Skipping malformed solutions record");
                    continue;
                }
            };

            solutions.retain(|s| s.id != record.id);
            if record.change != Change::Removed {
                if let Some(solution) = record.solution {
                    solutions.push(solution);
                }
            }
        }
        Ok(solutions)
    }
}

impl SolutionSink for JsonLinesSink {
    fn solution_added(&mut self, solution: &Solution) -> anyhow::Result<()> {
        self.append(&LogRecord {
            change: Change::Added,
            at: Utc::now(),
            id: solution.id,
            solution: Some(solution.clone()),
        })
    }

    fn solution_updated(&mut self, solution: &Solution) -> anyhow::Result<()> {
        self.append(&LogRecord {
            change: Change::Updated,
            at: Utc::now(),
            id: solution.id,
            solution: Some(solution.clone()),
        })
    }

    fn solution_removed(&mut self, id: Uuid) -> anyhow::Result<()> {
        self.append(&LogRecord {
            change: Change::Removed,
            at: Utc::now(),
            id,
            solution: None,
        })
    }
}

/// Message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMessage {
    Info(String),
    Error(String),
}

struct Inner {
    session: Mutex<Session>,
    sink: Mutex<Box<dyn SolutionSink>>,
    scrambles: Mutex<Box<dyn ScrambleProvider>>,
    messages: Sender<UserMessage>,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Records finished solves into the session (cheap to clone)
#[derive(Clone)]
pub struct SolutionRecorder {
    inner: Arc<Inner>,
}

impl SolutionRecorder {
    /// Create a recorder and the receiving end of its message channel
    pub fn new(
        session: Session,
        sink: Box<dyn SolutionSink>,
        scrambles: Box<dyn ScrambleProvider>,
    ) -> (Self, Receiver<UserMessage>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let recorder = Self {
            inner: Arc::new(Inner {
                session: Mutex::new(session),
                sink: Mutex::new(sink),
                scrambles: Mutex::new(scrambles),
                messages: tx,
            }),
        };
        (recorder, rx)
    }

    /// Record every `SolutionFinished` of `manager`
    pub fn attach(&self, manager: &TimerManager) -> ListenerId {
        let recorder = self.clone();
        manager.add_listener(move |event| {
            if let TimerEvent::SolutionFinished { timing, penalty } = event {
                recorder.record(*timing, *penalty);
            }
        })
    }

    /// Scramble for the next solve
    pub fn current_scramble(&self) -> String {
        lock(&self.inner.scrambles).current()
    }

    /// Store a finished solve
    pub fn record(&self, timing: Timing, penalty: Penalty) -> Solution {
        let scramble = {
            let mut scrambles = lock(&self.inner.scrambles);
            let scramble = scrambles.current();
            scrambles.advance();
            scramble
        };

        let (solution, records) = {
            let mut session = lock(&self.inner.session);
            let solution = Solution::new(session.category_id(), scramble, timing, penalty);
            session.add(solution.clone());
            let records: Vec<SummaryRow> = session
                .summary()
                .into_iter()
                .filter(SummaryRow::is_record)
                .collect();
            (solution, records)
        };

        tracing::info!(
            id = %solution.id,
            time = %solution.real_time(),
            penalty = %solution.penalty,
            "Solution recorded"
        );

        let result = lock(&self.inner.sink).solution_added(&solution);
        self.report(result, "save");

        // A single solve is trivially a record; announce from the second on
        if lock(&self.inner.session).len() > 1 {
            for row in records {
                if let Some(value) = row.value {
                    self.send(UserMessage::Info(format!(
                        "New record: {} {}",
                        row.description(),
                        value.value
                    )));
                }
            }
        }

        solution
    }

    /// Change the penalty of a recorded solution
    pub fn set_penalty(&self, id: Uuid, penalty: Penalty) -> Option<Solution> {
        let updated = lock(&self.inner.session).set_penalty(id, penalty).cloned()?;
        let result = lock(&self.inner.sink).solution_updated(&updated);
        self.report(result, "update");
        Some(updated)
    }

    pub fn remove(&self, id: Uuid) -> Option<Solution> {
        let removed = lock(&self.inner.session).remove(id)?;
        let result = lock(&self.inner.sink).solution_removed(id);
        self.report(result, "remove");
        Some(removed)
    }

    /// Snapshot of the session
    pub fn session(&self) -> Session {
        lock(&self.inner.session).clone()
    }

    pub fn summary(&self) -> Vec<SummaryRow> {
        lock(&self.inner.session).summary()
    }

    fn report(&self, result: anyhow::Result<()>, action: &str) {
        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to {} solution", action);
            self.send(UserMessage::Error(format!(
                "ERROR: Couldn't {} solution: {}",
                action, e
            )));
        }
    }

    fn send(&self, message: UserMessage) {
        // The front end may have dropped its receiver
        let _ = self.inner.messages.send(message);
    }
}
