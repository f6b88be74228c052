//! Output directory removal with bounded retries.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::queue::CancelToken;
use crate::reaper::ProcessReaper;
use crate::reporter::Reporter;

pub trait DirRemover: Send + Sync {
    fn remove(&self, dir: &Path) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct FsRemover;

impl DirRemover for FsRemover {
    fn remove(&self, dir: &Path) -> io::Result<()> {
        fs::remove_dir_all(dir)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanOutcome {
    pub path: String,
    /// False when the directory did not exist and nothing was attempted.
    pub removed: bool,
    pub attempts: u32,
}

pub struct DirectoryCleaner<'a> {
    remover: &'a dyn DirRemover,
    reaper: &'a ProcessReaper<'a>,
    max_retries: u32,
    backoff: Duration,
    cancel: Option<&'a CancelToken>,
}

impl<'a> DirectoryCleaner<'a> {
    pub fn new(remover: &'a dyn DirRemover, reaper: &'a ProcessReaper<'a>) -> Self {
        Self {
            remover,
            reaper,
            max_retries: 3,
            backoff: Duration::from_secs(3),
            cancel: None,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.backoff = backoff;
        self
    }

    /// Stop between attempts and during backoff once `cancel` fires.
    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn checkpoint(&self) -> Result<()> {
        match self.cancel {
            Some(cancel) => cancel.checkpoint("clean"),
            None => Ok(()),
        }
    }

    fn back_off(&self) -> Result<()> {
        match self.cancel {
            Some(cancel) => cancel.sleep(self.backoff, "clean"),
            None => {
                thread::sleep(self.backoff);
                Ok(())
            }
        }
    }

    /// Delete `dir` recursively. A missing directory is immediate success.
    ///
    /// Each attempt is preceded by a process reap. Success is only reported
    /// once the directory is gone (or left empty).
    pub fn clean(&self, dir: &Path, reporter: &dyn Reporter) -> Result<CleanOutcome> {
        let path = dir.display().to_string();

        if !dir.exists() {
            return Ok(CleanOutcome {
                path,
                removed: false,
                attempts: 0,
            });
        }

        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            self.checkpoint()?;
            self.reaper.terminate(reporter);

            let outcome = self.remover.remove(dir).and_then(|_| {
                if is_gone_or_empty(dir) {
                    Ok(())
                } else {
                    Err(io::Error::other("directory still has entries"))
                }
            });

            match outcome {
                Ok(()) => {
                    reporter.success(&format!("🧹 Removed {}", path));
                    return Ok(CleanOutcome {
                        path,
                        removed: true,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    last_error = e.to_string();
                    reporter.warning(&format!(
                        "⚠️ Delete failed ({}/{}): {}",
                        attempt, self.max_retries, last_error
                    ));
                    if attempt < self.max_retries {
                        self.back_off()?;
                    }
                }
            }
        }

        Err(Error::cleanup_failed(path, self.max_retries, last_error))
    }
}

fn is_gone_or_empty(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(e) => e.kind() == io::ErrorKind::NotFound,
    }
}
