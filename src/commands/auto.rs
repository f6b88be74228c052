use clap::Args;

use relman::Operation;

use super::release::KindArg;
use super::{run_operation, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct AutoArgs {
    /// Release classification
    #[arg(value_enum, default_value = "patch")]
    pub kind: KindArg,

    /// Release title (default: "v<new> - <Kind>")
    #[arg(long)]
    pub title: Option<String>,

    /// Release notes (default: "<Kind> release")
    #[arg(long)]
    pub notes: Option<String>,
}

/// Kill, clean, build, verify artifacts, then create the release.
pub fn run(args: AutoArgs, global: &GlobalArgs) -> CmdResult<serde_json::Value> {
    run_operation(
        global,
        Operation::Auto {
            kind: args.kind.into(),
            title: args.title,
            notes: args.notes,
        },
    )
}
