use std::path::PathBuf;
use std::sync::Arc;

use relman::{defaults, paths};
use relman::reporter::TerminalReporter;
use relman::{Operation, Session};

pub type CmdResult<T> = relman::Result<(T, i32)>;

/// Flags shared by every subcommand.
pub(crate) struct GlobalArgs {
    pub project: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub quiet: bool,
}

impl GlobalArgs {
    /// Session for the selected project (current directory by default).
    pub fn session(&self) -> relman::Result<Arc<Session>> {
        let config_path = self.config.as_deref().map(|p| paths::expand(&p.to_string_lossy()));
        let config = defaults::load_config(config_path.as_deref())?;
        let project = match &self.project {
            Some(p) => Some(paths::expand(&p.to_string_lossy())),
            None => std::env::current_dir().ok(),
        };
        let reporter = Arc::new(TerminalReporter::new(self.quiet));
        Ok(Arc::new(Session::new(config, reporter).with_project(project)))
    }
}

/// Submit one operation to a fresh queue and wait for its outcome.
pub(crate) fn run_operation(global: &GlobalArgs, op: Operation) -> CmdResult<serde_json::Value> {
    let session = global.session()?;
    let queue = session.queue();
    let outcome = session.submit(&queue, op).wait();
    outcome.result.map(|data| (data, 0))
}

pub mod auto;
pub mod config;
pub mod queue;
pub mod release;
pub mod version;

fn operation(global: &GlobalArgs, op: Operation) -> (relman::Result<serde_json::Value>, i32) {
    crate::output::map_cmd_result_to_json(run_operation(global, op))
}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args))
    };
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (relman::Result<serde_json::Value>, i32) {
    crate::tty::status("relman is working...");

    match command {
        // Commands without a session
        crate::Commands::Version(args) => dispatch!(args, version),
        crate::Commands::Config(args) => dispatch!(args, global, config),

        // Commands routed through the queue
        crate::Commands::Status => operation(global, Operation::Status),
        crate::Commands::Kill => operation(global, Operation::Kill),
        crate::Commands::Clean => operation(global, Operation::Clean),
        crate::Commands::Build => operation(global, Operation::Build),
        crate::Commands::Auto(args) => dispatch!(args, global, auto),
        crate::Commands::Release(args) => dispatch!(args, global, release),
        crate::Commands::Queue(args) => dispatch!(args, global, queue),
    }
}
