use clap::{Args, Subcommand};
use serde::Serialize;

use relman::defaults::{self, Defaults, RelmanConfig};
use relman::paths;

use super::CmdResult;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Display the effective configuration (file merged over defaults)
    Show {
        /// Show only built-in defaults (ignore relman.json)
        #[arg(long)]
        builtin: bool,
    },
    /// Show the path to relman.json
    Path,
    /// Write built-in defaults to relman.json
    Init {
        /// Overwrite an existing relman.json
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    defaults: Option<Defaults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exists: Option<bool>,
}

pub fn run(args: ConfigArgs, global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    match args.command {
        ConfigCommand::Show { builtin } => show(builtin, global),
        ConfigCommand::Path => path(global),
        ConfigCommand::Init { force } => init(force),
    }
}

fn show(builtin: bool, global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    let config = if builtin {
        RelmanConfig::default()
    } else {
        defaults::load_config(global.config.as_deref())?
    };

    Ok((
        ConfigOutput {
            command: "config.show".to_string(),
            defaults: Some(config.defaults),
            path: None,
            exists: None,
        },
        0,
    ))
}

fn path(global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    let path = match &global.config {
        Some(p) => paths::expand(&p.to_string_lossy()),
        None => paths::relman_json()?,
    };

    Ok((
        ConfigOutput {
            command: "config.path".to_string(),
            defaults: None,
            exists: Some(path.exists()),
            path: Some(path.display().to_string()),
        },
        0,
    ))
}

fn init(force: bool) -> CmdResult<ConfigOutput> {
    let existing = paths::relman_json()?;
    if existing.exists() && !force {
        return Err(relman::Error::validation_invalid_argument(
            "force",
            "relman.json already exists",
            Some(existing.display().to_string()),
            Some(vec!["Pass --force to overwrite it".to_string()]),
        ));
    }

    let config = RelmanConfig::default();
    let path = defaults::save_config(&config)?;

    Ok((
        ConfigOutput {
            command: "config.init".to_string(),
            defaults: Some(config.defaults),
            path: Some(path),
            exists: Some(true),
        },
        0,
    ))
}
