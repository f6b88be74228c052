use clap::{Args, Subcommand};

use relman::version::{self, BumpOutput};

use super::release::KindArg;
use super::CmdResult;

#[derive(Args)]
pub struct VersionArgs {
    #[command(subcommand)]
    command: VersionCommand,
}

#[derive(Subcommand)]
enum VersionCommand {
    /// Compute the next version without touching any project
    Bump {
        /// Current version (e.g., 1.2.3); malformed input yields 1.0.0
        current: String,

        /// Component to increment
        #[arg(value_enum)]
        kind: KindArg,
    },
}

pub fn run(args: VersionArgs) -> CmdResult<BumpOutput> {
    match args.command {
        VersionCommand::Bump { current, kind } => Ok((version::bump(&current, kind.into()), 0)),
    }
}
