use clap::{Args, Subcommand, ValueEnum};

use relman::version::{tag_for, ReleaseKind};
use relman::Operation;

use super::{run_operation, CmdResult, GlobalArgs};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Patch,
    Minor,
    Major,
}

impl From<KindArg> for ReleaseKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Patch => ReleaseKind::Patch,
            KindArg::Minor => ReleaseKind::Minor,
            KindArg::Major => ReleaseKind::Major,
        }
    }
}

#[derive(Args)]
pub struct ReleaseArgs {
    #[command(subcommand)]
    command: ReleaseCommand,
}

#[derive(Subcommand)]
enum ReleaseCommand {
    /// Publish the current artifacts as the next version
    Create {
        /// Release classification
        #[arg(value_enum, default_value = "patch")]
        kind: KindArg,

        /// Release title (default: "v<new> - <Kind>")
        #[arg(long)]
        title: Option<String>,

        /// Release notes (default: "<Kind> release")
        #[arg(long)]
        notes: Option<String>,
    },
    /// Edit title/notes of an existing release and re-upload artifacts
    Update {
        /// Version or tag to update (default: current version)
        #[arg(long)]
        version: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a release, its local tag and its remote tag
    Delete {
        /// Version or tag to delete (default: current version)
        #[arg(long)]
        version: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// List published releases
    List,
    /// Show the latest published release
    Latest,
}

pub fn run(args: ReleaseArgs, global: &GlobalArgs) -> CmdResult<serde_json::Value> {
    let op = match args.command {
        ReleaseCommand::Create { kind, title, notes } => Operation::Create {
            kind: kind.into(),
            title,
            notes,
        },
        ReleaseCommand::Update { version, title, notes } => Operation::Update { version, title, notes },
        ReleaseCommand::Delete { version, yes } => {
            confirm_delete(version.as_deref(), yes)?;
            Operation::Delete { version }
        }
        ReleaseCommand::List => Operation::List,
        ReleaseCommand::Latest => Operation::Latest,
    };

    run_operation(global, op)
}

/// Deletion is destructive; it needs `--yes` or an interactive confirmation
/// before anything is queued.
fn confirm_delete(version: Option<&str>, yes: bool) -> relman::Result<()> {
    if yes {
        return Ok(());
    }

    let target = version.map(tag_for).unwrap_or_else(|| "the current release".to_string());

    if !crate::tty::is_stdin_tty() {
        return Err(relman::Error::validation_missing_argument(vec!["yes".to_string()])
            .with_hint(format!("Pass --yes to delete {} without a prompt", target)));
    }

    if crate::tty::confirm(&format!("Delete {} (release, local tag and remote tag)?", target))? {
        Ok(())
    } else {
        Err(relman::Error::validation_invalid_argument(
            "yes",
            "Delete cancelled",
            None,
            None,
        ))
    }
}
