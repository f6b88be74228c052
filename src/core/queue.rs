//! Single-flight FIFO task queue.
//!
//! At most one operation runs at a time on a worker thread; later
//! submissions wait in `pending` and start strictly in submission order.
//! Each task reports back through its own completion channel.
//!
//! `stop_all` is cooperative: it terminates the in-flight external command,
//! cancels the running task's token so the task bails at its next
//! checkpoint, discards pending tasks and forces the queue back to Idle.
//! Until the interrupted task actually returns the queue is draining: new
//! submissions wait in `pending` so two tasks never overlap. A generation
//! counter keeps the late completion from touching the new state beyond
//! ending the drain.

use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorCode, Result};
use crate::reporter::{Reporter, Status};
use crate::runner::CommandRunner;

const SLEEP_SLICE: Duration = Duration::from_millis(50);

// === Cancellation ===

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(queue.stopped)` once cancelled; call between task steps.
    pub fn checkpoint(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::queue_stopped(operation))
        } else {
            Ok(())
        }
    }

    /// Sleep for `total` in short slices, bailing out once cancelled.
    pub fn sleep(&self, total: Duration, operation: &str) -> Result<()> {
        let started = Instant::now();
        while started.elapsed() < total {
            self.checkpoint(operation)?;
            thread::sleep(SLEEP_SLICE.min(total.saturating_sub(started.elapsed())));
        }
        self.checkpoint(operation)
    }
}

// === Tasks ===

/// Handed to every running task.
pub struct TaskContext {
    pub operation: String,
    pub cancel: CancelToken,
    pub reporter: Arc<dyn Reporter>,
}

impl TaskContext {
    pub fn checkpoint(&self) -> Result<()> {
        self.cancel.checkpoint(&self.operation)
    }
}

pub type Task = Box<dyn FnOnce(&TaskContext) -> Result<Value> + Send + 'static>;

pub struct QueuedOperation {
    pub name: String,
    task: Task,
    done: Sender<TaskOutcome>,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub operation: String,
    pub result: Result<Value>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Receives the outcome of one submitted task.
pub struct TaskHandle {
    pub operation: String,
    rx: Receiver<TaskOutcome>,
}

impl TaskHandle {
    /// Block until the task completes or is discarded by `stop_all`.
    pub fn wait(self) -> TaskOutcome {
        let operation = self.operation;
        self.rx.recv().unwrap_or_else(|_| TaskOutcome {
            result: Err(Error::internal_unexpected(format!(
                "Task '{}' ended without a result",
                operation
            ))),
            operation,
        })
    }
}

// === Queue ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Idle,
    Busy,
}

struct State {
    phase: QueueState,
    pending: VecDeque<QueuedOperation>,
    active: Option<String>,
    cancel: CancelToken,
    generation: u64,
    /// An interrupted task is still unwinding.
    draining: bool,
}

struct Inner {
    state: Mutex<State>,
    idle: Condvar,
    reporter: Arc<dyn Reporter>,
    runner: Arc<dyn CommandRunner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<String>,
    pub discarded: Vec<String>,
    pub process_killed: bool,
}

#[derive(Clone)]
pub struct CommandQueue {
    inner: Arc<Inner>,
}

impl CommandQueue {
    pub fn new(reporter: Arc<dyn Reporter>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    phase: QueueState::Idle,
                    pending: VecDeque::new(),
                    active: None,
                    cancel: CancelToken::new(),
                    generation: 0,
                    draining: false,
                }),
                idle: Condvar::new(),
                reporter,
                runner,
            }),
        }
    }

    /// Append a task; it starts immediately only when the queue is Idle.
    pub fn submit<F>(&self, name: impl Into<String>, task: F) -> TaskHandle
    where
        F: FnOnce(&TaskContext) -> Result<Value> + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::channel();
        let op = QueuedOperation {
            name: name.clone(),
            task: Box::new(task),
            done: tx,
        };

        let mut state = self.inner.lock();
        state.pending.push_back(op);
        if state.phase == QueueState::Busy || state.draining {
            log_status!("queue", "Queued {} ({} pending)", name, state.pending.len());
        } else {
            Inner::start_next(&self.inner, &mut state);
        }

        TaskHandle {
            operation: name,
            rx,
        }
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().phase
    }

    pub fn is_busy(&self) -> bool {
        self.state() == QueueState::Busy
    }

    pub fn active(&self) -> Option<String> {
        self.inner.lock().active.clone()
    }

    pub fn pending(&self) -> Vec<String> {
        self.inner.lock().pending.iter().map(|op| op.name.clone()).collect()
    }

    /// Terminate the in-flight command, drop pending tasks, return to Idle.
    pub fn stop_all(&self) -> StopReport {
        let (interrupted, discarded, process_killed) = {
            let mut state = self.inner.lock();
            state.generation += 1;
            state.cancel.cancel();
            let interrupted = state.active.take();
            if interrupted.is_some() {
                state.draining = true;
            }
            let discarded: Vec<QueuedOperation> = state.pending.drain(..).collect();
            state.phase = QueueState::Idle;
            // Under the lock, so no task can rearm the runner in between.
            let process_killed = self.inner.runner.stop();
            (interrupted, discarded, process_killed)
        };

        let names: Vec<String> = discarded.iter().map(|op| op.name.clone()).collect();
        for op in discarded {
            let _ = op.done.send(TaskOutcome {
                result: Err(Error::queue_stopped(&op.name)),
                operation: op.name,
            });
        }

        self.inner.reporter.warning("🛑 Commands stopped");
        self.inner.reporter.status(Status::Stopped);
        self.inner.idle.notify_all();

        StopReport {
            interrupted,
            discarded: names,
            process_killed,
        }
    }

    /// Block until Idle, drained, with nothing pending.
    pub fn wait_idle(&self) {
        let mut state = self.inner.lock();
        while state.settling() {
            state = match self.inner.idle.wait(state) {
                Ok(s) => s,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Like [`wait_idle`](Self::wait_idle) but gives up after `timeout`.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        while state.settling() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.inner.idle.wait_timeout(state, deadline - now) {
                Ok((s, _)) => s,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

impl State {
    fn settling(&self) -> bool {
        self.phase == QueueState::Busy || self.draining || !self.pending.is_empty()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Idle -> Busy. Caller holds the lock.
    fn start_next(inner: &Arc<Inner>, state: &mut State) {
        let Some(op) = state.pending.pop_front() else {
            return;
        };

        let cancel = CancelToken::new();
        state.phase = QueueState::Busy;
        state.active = Some(op.name.clone());
        state.cancel = cancel.clone();
        let generation = state.generation;

        inner.runner.rearm();
        inner.reporter.status(Status::Working);

        let worker = Arc::clone(inner);
        thread::spawn(move || {
            let ctx = TaskContext {
                operation: op.name.clone(),
                cancel,
                reporter: Arc::clone(&worker.reporter),
            };
            let result = run_guarded(op.task, &ctx);
            report_outcome(worker.reporter.as_ref(), &op.name, &result);
            let _ = op.done.send(TaskOutcome {
                operation: op.name,
                result,
            });
            Inner::complete(&worker, generation);
        });
    }

    /// Busy -> Idle, or straight into the next pending task.
    fn complete(inner: &Arc<Inner>, generation: u64) {
        let mut state = inner.lock();
        if state.generation != generation {
            // The interrupted task has returned; whatever queued meanwhile may start.
            state.draining = false;
            if state.phase == QueueState::Idle && !state.pending.is_empty() {
                Inner::start_next(inner, &mut state);
            } else {
                inner.idle.notify_all();
            }
            return;
        }
        state.active = None;
        if state.pending.is_empty() {
            state.phase = QueueState::Idle;
            inner.reporter.status(Status::Idle);
            inner.idle.notify_all();
        } else {
            Inner::start_next(inner, &mut state);
        }
    }
}

/// Errors and panics stop here; nothing unwinds past a task boundary.
fn run_guarded(task: Task, ctx: &TaskContext) -> Result<Value> {
    match panic::catch_unwind(AssertUnwindSafe(|| task(ctx))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".to_string());
            Err(Error::internal_unexpected(format!(
                "{} panicked: {}",
                ctx.operation, message
            )))
        }
    }
}

fn report_outcome(reporter: &dyn Reporter, operation: &str, result: &Result<Value>) {
    match result {
        Ok(_) => log_status!("queue", "{} finished", operation),
        Err(e) if e.code == ErrorCode::QueueStopped => {
            reporter.warning(&format!("🛑 {} stopped", operation));
        }
        Err(e) => reporter.error(&format!("❌ {}: {}", operation, e.log_text())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::MemoryReporter;
    use crate::runner::fake::FakeRunner;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn queue() -> (CommandQueue, MemoryReporter) {
        let reporter = MemoryReporter::new();
        let q = CommandQueue::new(Arc::new(reporter.clone()), Arc::new(FakeRunner::new()));
        (q, reporter)
    }

    fn record(log: &Arc<Mutex<Vec<String>>>, entry: &str) {
        log.lock().unwrap().push(entry.to_string());
    }

    #[test]
    fn runs_in_submission_order_one_at_a_time() {
        let (q, _) = queue();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (release_a, gate) = mpsc::channel::<()>();

        let l = Arc::clone(&log);
        let a = q.submit("A", move |_| {
            record(&l, "A start");
            gate.recv().ok();
            record(&l, "A end");
            Ok(json!("a"))
        });
        let l = Arc::clone(&log);
        let b = q.submit("B", move |_| {
            record(&l, "B");
            Ok(json!("b"))
        });
        let l = Arc::clone(&log);
        let c = q.submit("C", move |_| {
            record(&l, "C");
            Ok(json!("c"))
        });

        thread::sleep(Duration::from_millis(100));
        assert!(q.is_busy());
        assert_eq!(q.pending(), vec!["B", "C"]);
        assert_eq!(*log.lock().unwrap(), vec!["A start"]);

        release_a.send(()).unwrap();
        assert!(a.wait().is_success());
        assert!(b.wait().is_success());
        assert!(c.wait().is_success());
        q.wait_idle();

        assert_eq!(*log.lock().unwrap(), vec!["A start", "A end", "B", "C"]);
        assert_eq!(q.state(), QueueState::Idle);
    }

    #[test]
    fn stop_all_discards_pending_and_returns_to_idle() {
        let (q, reporter) = queue();
        let ran = Arc::new(Mutex::new(Vec::new()));

        let a = q.submit("A", |ctx| loop {
            ctx.checkpoint()?;
            thread::sleep(Duration::from_millis(10));
        });
        let r = Arc::clone(&ran);
        let b = q.submit("B", move |_| {
            record(&r, "B");
            Ok(Value::Null)
        });
        let r = Arc::clone(&ran);
        let c = q.submit("C", move |_| {
            record(&r, "C");
            Ok(Value::Null)
        });

        thread::sleep(Duration::from_millis(50));
        let report = q.stop_all();
        assert_eq!(report.interrupted.as_deref(), Some("A"));
        assert_eq!(report.discarded, vec!["B", "C"]);
        assert_eq!(q.state(), QueueState::Idle);
        assert!(q.pending().is_empty());

        let a = a.wait();
        assert_eq!(a.result.unwrap_err().code, ErrorCode::QueueStopped);
        assert_eq!(b.wait().result.unwrap_err().code, ErrorCode::QueueStopped);
        assert_eq!(c.wait().result.unwrap_err().code, ErrorCode::QueueStopped);

        thread::sleep(Duration::from_millis(50));
        assert!(ran.lock().unwrap().is_empty());
        assert_eq!(q.state(), QueueState::Idle);
        assert!(reporter.statuses().contains(&Status::Stopped));
    }

    fn enter(running: &AtomicUsize, peak: &AtomicUsize) {
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
    }

    #[test]
    fn interrupted_task_finishes_before_the_next_starts() {
        let (q, _) = queue();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (release, gate) = mpsc::channel::<()>();

        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let a = q.submit("A", move |_| {
            enter(&r, &p);
            // Ignores cancellation until released.
            gate.recv().ok();
            r.fetch_sub(1, Ordering::SeqCst);
            Ok(json!("a"))
        });
        thread::sleep(Duration::from_millis(50));

        let report = q.stop_all();
        assert_eq!(report.interrupted.as_deref(), Some("A"));
        assert_eq!(q.state(), QueueState::Idle);

        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let b = q.submit("B", move |_| {
            enter(&r, &p);
            thread::sleep(Duration::from_millis(10));
            r.fetch_sub(1, Ordering::SeqCst);
            Ok(json!("b"))
        });
        thread::sleep(Duration::from_millis(50));
        assert_eq!(q.pending(), vec!["B"]);
        assert!(!q.wait_idle_timeout(Duration::from_millis(20)));

        release.send(()).unwrap();
        assert_eq!(a.wait().result.unwrap(), json!("a"));
        assert_eq!(b.wait().result.unwrap(), json!("b"));
        assert!(q.wait_idle_timeout(Duration::from_secs(2)));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_sleep_returns_early() {
        let token = CancelToken::new();
        let t = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            t.cancel();
        });
        let started = Instant::now();
        let err = token.sleep(Duration::from_secs(5), "clean").unwrap_err();
        assert_eq!(err.code, ErrorCode::QueueStopped);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn fresh_submission_runs_after_stop() {
        let (q, _) = queue();
        q.stop_all();
        let handle = q.submit("again", |_| Ok(json!(1)));
        assert_eq!(handle.wait().result.unwrap(), json!(1));
        assert!(q.wait_idle_timeout(Duration::from_secs(2)));
    }

    #[test]
    fn errors_and_panics_become_failed_outcomes() {
        let (q, reporter) = queue();
        let failing = q.submit("failing", |_| Err(Error::build_failed(vec!["build".into()])));
        let panicking = q.submit("panicking", |_| panic!("kaboom"));
        let after = q.submit("after", |_| Ok(Value::Null));

        assert_eq!(failing.wait().result.unwrap_err().code, ErrorCode::BuildFailed);
        let err = panicking.wait().result.unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalUnexpected);
        assert!(err.message.contains("kaboom"));
        assert!(after.wait().is_success());
        assert!(reporter.contains("failing"));
    }

    #[test]
    fn status_follows_busy_and_idle() {
        let (q, reporter) = queue();
        q.submit("one", |_| Ok(Value::Null)).wait();
        q.wait_idle();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(reporter.statuses().first(), Some(&Status::Working));
        assert_eq!(reporter.last_status(), Some(Status::Idle));
    }
}
