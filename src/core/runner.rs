//! External command execution.
//!
//! Every invocation yields an [`ExecutionResult`]; output lines are streamed
//! to the reporter while the process runs and captured in full for the
//! result. [`SystemRunner`] keeps the in-flight child reachable so a stop
//! request can terminate it from another thread.

use serde::Serialize;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::reporter::{Reporter, Severity};
use crate::utils::shell;

const WAIT_POLL: Duration = Duration::from_millis(50);
/// How long to keep reading output after the child exits.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            timeout: None,
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Shell-quoted rendering for logs.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            return self.program.clone();
        }
        format!("{} {}", self.program, shell::quote_args(&self.args))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stopped: bool,
}

impl ExecutionResult {
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            exit_code: -1,
            timed_out: false,
            stopped: false,
        }
    }

    /// Last `n` non-empty lines of output, for error details.
    pub fn tail(&self, n: usize) -> String {
        let lines: Vec<&str> = self
            .output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }
}

pub trait CommandRunner: Send + Sync {
    /// Run to completion, streaming output lines to `reporter`.
    fn run(&self, spec: &CommandSpec, reporter: &dyn Reporter) -> ExecutionResult;

    /// Terminate the in-flight command, if any. Returns whether one was running.
    /// The stop stays in effect for later `run` calls until [`rearm`](Self::rearm).
    fn stop(&self) -> bool;

    /// Clear a previous stop. The queue calls this before each task starts.
    fn rearm(&self) {}
}

/// Routes the result of a command to the log sink; nothing is dropped.
pub fn run_logged(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    reporter: &dyn Reporter,
) -> ExecutionResult {
    reporter.info(&format!("▶️ {}", spec.display()));
    let result = runner.run(spec, reporter);

    // Full capture at Error severity: quiet sinks drop streamed Output lines.
    if !result.success && !result.stopped && !result.output.trim().is_empty() {
        reporter.log(Severity::Error, result.output.trim_end());
    }

    if result.success {
        reporter.success("✅ Success");
    } else if result.stopped {
        reporter.warning("🛑 Command stopped");
    } else if result.timed_out {
        reporter.error(&format!("❌ Timed out: {}", spec.display()));
    } else {
        reporter.error(&format!("❌ Failed: {}", result.exit_code));
    }

    result
}

/// Tools that ship as `.cmd` shims on Windows.
const CMD_SHIMS: &[&str] = &["npm", "npx", "yarn", "pnpm"];

/// Executable to spawn for `program`. Everything is spawned directly; on
/// Windows the package-manager shims resolve to their `.cmd` file, whose
/// arguments the standard library escapes for `cmd.exe`.
pub fn resolve_program(program: &str, windows: bool) -> String {
    if windows && CMD_SHIMS.contains(&program.to_ascii_lowercase().as_str()) {
        format!("{}.cmd", program)
    } else {
        program.to_string()
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
pub struct SystemRunner {
    active: Mutex<Option<Child>>,
    stop_requested: AtomicBool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(resolve_program(&spec.program, cfg!(windows)));
        cmd.args(&spec.args);

        // Own process group, so a kill also reaches the tools npm spawns.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn kill_active(&self) -> bool {
        match self.active.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(child) => {
                    kill_tree(child);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// `Some(code)` once the child is reaped; `code` is `None` when it died
    /// without an exit status.
    fn try_exit(&self) -> Option<Option<i32>> {
        let Ok(mut guard) = self.active.lock() else {
            return Some(None);
        };
        let Some(child) = guard.as_mut() else {
            return Some(None);
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                *guard = None;
                Some(status.code())
            }
            Ok(None) => None,
            Err(_) => {
                kill_tree(child);
                let _ = child.wait();
                *guard = None;
                Some(None)
            }
        }
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    // The child leads its own process group (pgid == pid).
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(windows)]
fn kill_tree(child: &mut Child) {
    let _ = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &child.id().to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    let _ = child.kill();
}

#[cfg(not(any(unix, windows)))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Forward lines from a child pipe. Detached: a descendant that outlives the
/// child may hold the pipe open, and nobody joins this thread.
fn spawn_reader<R>(stream: Option<R>, kind: Stream, tx: Sender<(Stream, String)>)
where
    R: Read + Send + 'static,
{
    let Some(stream) = stream else {
        return;
    };
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            if tx.send((kind, line)).is_err() {
                break;
            }
        }
    });
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec, reporter: &dyn Reporter) -> ExecutionResult {
        if self.stop_requested.load(Ordering::SeqCst) {
            return ExecutionResult {
                stopped: true,
                ..ExecutionResult::failed("Command not started: stop requested")
            };
        }

        let mut child = match Self::command(spec).spawn() {
            Ok(child) => child,
            Err(e) => return ExecutionResult::failed(format!("Command error: {}", e)),
        };

        let (tx, rx) = mpsc::channel();
        spawn_reader(child.stdout.take(), Stream::Stdout, tx.clone());
        spawn_reader(child.stderr.take(), Stream::Stderr, tx);

        match self.active.lock() {
            Ok(mut guard) => *guard = Some(child),
            Err(_) => {
                kill_tree(&mut child);
                return ExecutionResult::failed("Command error: runner state poisoned");
            }
        }

        let started = Instant::now();
        let mut stdout_text = String::new();
        let mut stderr_text = String::new();
        let mut streams_open = true;
        let mut exit: Option<Option<i32>> = None;
        let mut exited_at: Option<Instant> = None;
        let mut killed = false;
        let mut timed_out = false;

        loop {
            if streams_open {
                match rx.recv_timeout(WAIT_POLL) {
                    Ok((stream, line)) => {
                        reporter.log(Severity::Output, &line);
                        let buf = match stream {
                            Stream::Stdout => &mut stdout_text,
                            Stream::Stderr => &mut stderr_text,
                        };
                        buf.push_str(&line);
                        buf.push('\n');
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => streams_open = false,
                }
            } else if exit.is_none() {
                thread::sleep(WAIT_POLL);
            }

            if exit.is_none() {
                exit = self.try_exit();
                if exit.is_some() {
                    exited_at = Some(Instant::now());
                }
            }

            if exit.is_none() && !killed {
                let stop = self.stop_requested.load(Ordering::SeqCst);
                let expired = spec.timeout.is_some_and(|t| started.elapsed() >= t);
                if stop || expired {
                    timed_out = expired && !stop;
                    killed = true;
                    self.kill_active();
                }
            }

            if let Some(at) = exited_at {
                if !streams_open || at.elapsed() >= DRAIN_GRACE {
                    break;
                }
            }
        }

        let stopped = self.stop_requested.load(Ordering::SeqCst);
        let code = exit.flatten();

        ExecutionResult {
            success: code == Some(0) && !stopped && !timed_out,
            output: stdout_text + &stderr_text,
            exit_code: code.unwrap_or(-1),
            timed_out,
            stopped,
        }
    }

    fn stop(&self) -> bool {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.kill_active()
    }

    fn rearm(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;

    /// Runner that answers from a table keyed by `CommandSpec::display()`.
    #[derive(Default)]
    pub struct FakeRunner {
        responses: Mutex<HashMap<String, ExecutionResult>>,
        prefix_responses: Mutex<Vec<(String, ExecutionResult)>>,
        pub calls: Mutex<Vec<CommandSpec>>,
        on_run: Mutex<Vec<(String, bool, Box<dyn Fn(&CommandSpec) + Send>)>>,
    }

    fn scripted(success: bool, output: &str) -> ExecutionResult {
        ExecutionResult {
            success,
            output: output.to_string(),
            exit_code: if success { 0 } else { 1 },
            ..Default::default()
        }
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, display: &str, success: bool, output: &str) {
            self.responses
                .lock()
                .unwrap()
                .insert(display.to_string(), scripted(success, output));
        }

        /// For commands whose tail is not known up front (temp file paths).
        pub fn respond_prefix(&self, prefix: &str, success: bool, output: &str) {
            self.prefix_responses
                .lock()
                .unwrap()
                .push((prefix.to_string(), scripted(success, output)));
        }

        /// Side effect executed when the command runs (e.g. create artifacts).
        pub fn on_run(&self, display: &str, effect: impl Fn() + Send + 'static) {
            self.on_run
                .lock()
                .unwrap()
                .push((display.to_string(), false, Box::new(move |_: &CommandSpec| effect())));
        }

        pub fn on_run_prefix(&self, prefix: &str, effect: impl Fn(&CommandSpec) + Send + 'static) {
            self.on_run
                .lock()
                .unwrap()
                .push((prefix.to_string(), true, Box::new(effect)));
        }

        pub fn displays(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|c| c.display()).collect()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, spec: &CommandSpec, _reporter: &dyn Reporter) -> ExecutionResult {
            let display = spec.display();
            self.calls.lock().unwrap().push(spec.clone());
            for (key, prefix, effect) in self.on_run.lock().unwrap().iter() {
                if *key == display || (*prefix && display.starts_with(key.as_str())) {
                    effect(spec);
                }
            }
            if let Some(result) = self.responses.lock().unwrap().get(&display) {
                return result.clone();
            }
            self.prefix_responses
                .lock()
                .unwrap()
                .iter()
                .find(|(prefix, _)| display.starts_with(prefix.as_str()))
                .map(|(_, result)| result.clone())
                .unwrap_or_else(|| scripted(true, ""))
        }

        fn stop(&self) -> bool {
            false
        }
    }
}
