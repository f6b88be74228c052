//! Best-effort termination of stale application processes.
//!
//! Matching is a case-insensitive substring test of the process name against
//! each target. Per-process failures (already exited, access denied) are
//! counted and skipped; the scan always visits every process.

use serde::Serialize;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::queue::CancelToken;
use crate::reporter::Reporter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

pub trait ProcessTable: Send + Sync {
    fn snapshot(&self) -> Vec<ProcessEntry>;
    fn kill(&self, pid: u32) -> bool;
}

/// Live OS process table backed by `sysinfo`.
pub struct SystemProcessTable {
    system: Mutex<System>,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        let Ok(mut system) = self.system.lock() else {
            return Vec::new();
        };
        system.refresh_processes(ProcessesToUpdate::All, true);
        system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
            })
            .collect()
    }

    fn kill(&self, pid: u32) -> bool {
        let Ok(system) = self.system.lock() else {
            return false;
        };
        system
            .process(Pid::from_u32(pid))
            .map(|process| process.kill())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReapReport {
    pub killed: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    /// False when matching processes were still alive after the settle bound.
    pub settled: bool,
}

fn is_zero(v: &usize) -> bool {
    *v == 0
}

pub struct ProcessReaper<'a> {
    table: &'a dyn ProcessTable,
    targets: Vec<String>,
    settle: Duration,
    poll: Duration,
    cancel: Option<&'a CancelToken>,
}

impl<'a> ProcessReaper<'a> {
    pub fn new(table: &'a dyn ProcessTable, targets: &[String]) -> Self {
        Self {
            table,
            targets: targets.iter().map(|t| t.to_lowercase()).collect(),
            settle: Duration::ZERO,
            poll: Duration::from_millis(250),
            cancel: None,
        }
    }

    pub fn with_settle(mut self, settle: Duration, poll: Duration) -> Self {
        self.settle = settle;
        self.poll = poll.max(Duration::from_millis(1));
        self
    }

    /// Give up the settle wait early once `cancel` fires.
    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.targets.iter().any(|t| !t.is_empty() && name.contains(t.as_str()))
    }

    fn matching(&self) -> Vec<ProcessEntry> {
        let own_pid = std::process::id();
        self.table
            .snapshot()
            .into_iter()
            .filter(|p| p.pid != own_pid && self.matches(&p.name))
            .collect()
    }

    /// Kill every matching process; returns counts without waiting.
    pub fn reap(&self, reporter: &dyn Reporter) -> ReapReport {
        let mut report = ReapReport::default();

        for process in self.matching() {
            if self.table.kill(process.pid) {
                report.killed += 1;
                reporter.warning(&format!("✅ Killed: {}", process.name));
                report.names.push(process.name);
            } else {
                report.failed += 1;
            }
        }

        report
    }

    /// Kill matching processes, then poll until none remain or the settle
    /// bound elapses.
    pub fn terminate(&self, reporter: &dyn Reporter) -> ReapReport {
        reporter.warning("🔫 Killing Electron processes...");
        let mut report = self.reap(reporter);
        report.settled = self.wait_until_gone();
        reporter.success(&format!("✅ Killed {} processes", report.killed));
        if !report.settled {
            reporter.warning("⚠️ Some processes are still running");
        }
        report
    }

    fn wait_until_gone(&self) -> bool {
        let started = Instant::now();
        loop {
            if self.matching().is_empty() {
                return true;
            }
            if started.elapsed() >= self.settle {
                return false;
            }
            match self.cancel {
                Some(cancel) => {
                    if cancel.sleep(self.poll, "kill").is_err() {
                        return false;
                    }
                }
                None => thread::sleep(self.poll),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeProcessTable;
    use super::*;
    use crate::reporter::MemoryReporter;

    fn targets() -> Vec<String> {
        vec![
            "electron.exe".to_string(),
            "MakeYourLifeEasier.exe".to_string(),
            "node.exe".to_string(),
        ]
    }

    #[test]
    fn no_matches_kills_nothing() {
        let table = FakeProcessTable::with(&[(10, "bash"), (11, "code")]);
        let reporter = MemoryReporter::new();
        let report = ProcessReaper::new(&table, &targets()).terminate(&reporter);
        assert_eq!(report.killed, 0);
        assert!(report.settled);
        assert_eq!(table.alive().len(), 2);
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let table = FakeProcessTable::with(&[
            (10, "Electron.EXE"),
            (11, "makeyourlifeeasier.exe"),
            (12, "explorer.exe"),
        ]);
        let reporter = MemoryReporter::new();
        let report = ProcessReaper::new(&table, &targets()).reap(&reporter);
        assert_eq!(report.killed, 2);
        assert_eq!(table.alive(), vec!["explorer.exe".to_string()]);
    }

    #[test]
    fn one_failure_does_not_stop_the_scan() {
        let mut table = FakeProcessTable::with(&[(1, "node.exe"), (2, "node.exe"), (3, "electron.exe")]);
        table.stubborn = vec![1];
        let reporter = MemoryReporter::new();
        let report = ProcessReaper::new(&table, &targets()).reap(&reporter);
        assert_eq!(report.killed, 2);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn stubborn_process_bounds_the_settle_wait() {
        let mut table = FakeProcessTable::with(&[(1, "electron.exe")]);
        table.stubborn = vec![1];
        let reporter = MemoryReporter::new();
        let started = Instant::now();
        let report = ProcessReaper::new(&table, &targets())
            .with_settle(Duration::from_millis(100), Duration::from_millis(10))
            .terminate(&reporter);
        assert!(!report.settled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn cancel_cuts_the_settle_wait_short() {
        let mut table = FakeProcessTable::with(&[(1, "electron.exe")]);
        table.stubborn = vec![1];
        let reporter = MemoryReporter::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let started = Instant::now();
        let report = ProcessReaper::new(&table, &targets())
            .with_settle(Duration::from_secs(10), Duration::from_millis(200))
            .with_cancel(&cancel)
            .terminate(&reporter);
        assert!(!report.settled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn empty_target_never_matches() {
        let table = FakeProcessTable::with(&[(1, "bash")]);
        let reaper = ProcessReaper::new(&table, &["".to_string()]);
        assert!(!reaper.matches("bash"));
    }

    #[test]
    fn system_table_scan_without_targets_is_harmless() {
        let table = SystemProcessTable::new();
        let reporter = MemoryReporter::new();
        let report = ProcessReaper::new(&table, &["relman-no-such-process-xyz".to_string()]).reap(&reporter);
        assert_eq!(report.killed, 0);
    }
}
