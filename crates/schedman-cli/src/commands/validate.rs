use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command};
use schedman::TemplateIndex;

use crate::commands::{self, CommandResult};
use crate::error::CliError;

pub fn command() -> Command {
    Command::new("validate")
        .about("Load and schema-check every template under a directory")
        .arg(
            Arg::new("root")
                .value_name("DIR")
                .required(true)
                .help("Directory tree containing template YAML files"),
        )
}

pub fn run(matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let root = matches
        .get_one::<String>("root")
        .map(PathBuf::from)
        .unwrap_or_default();

    let catalog = commands::default_catalog()?;
    let index = TemplateIndex::load(&root, &catalog)?;
    tracing::info!(root = %root.display(), templates = index.len(), "validated template tree");

    Ok(CommandResult::Validated {
        root: root.display().to_string(),
        templates: index.records().map(commands::summarize).collect(),
    })
}
