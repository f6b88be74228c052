use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{auto, config, queue, release, version};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "relman")]
#[command(version = VERSION)]
#[command(about = "Build and release orchestration for Electron-style projects")]
struct Cli {
    /// Project directory (default: current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Config file (default: ~/.config/relman/relman.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Suppress progress lines on stderr
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show project, git and artifact status
    Status,
    /// Terminate stray build and packaged-app processes
    Kill,
    /// Remove the build output directory
    Clean,
    /// Kill, clean, then try build commands until one produces artifacts
    Build,
    /// Build and publish a release in one step
    Auto(auto::AutoArgs),
    /// Create, update, delete or inspect releases
    Release(release::ReleaseArgs),
    /// Run several operations through one queue
    Queue(queue::QueueArgs),
    /// Version arithmetic
    Version(version::VersionArgs),
    /// Inspect or initialize relman configuration
    Config(config::ConfigArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let global = GlobalArgs {
        project: cli.project,
        config: cli.config,
        quiet: cli.quiet,
    };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);

    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("{}", err.log_text());
        return std::process::ExitCode::from(exit_code_to_u8(1));
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
