use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command};
use schedman::{SnapshotStore, TemplateIndex, compute_change_set};

use crate::commands::{self, CommandResult};
use crate::error::CliError;

pub fn command() -> Command {
    Command::new("plan")
        .about("Show which templates would deploy, relative to the last snapshot")
        .arg(
            Arg::new("root")
                .value_name("DIR")
                .required(true)
                .help("Directory tree containing template YAML files"),
        )
        .arg(
            Arg::new("work-dir")
                .long("work-dir")
                .value_name("PATH")
                .help("Snapshot directory. Defaults to <DIR>/.schedman."),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .action(ArgAction::SetTrue)
                .help("Ignore the snapshot and select every template."),
        )
}

pub fn run(matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let root = matches
        .get_one::<String>("root")
        .map(PathBuf::from)
        .unwrap_or_default();
    let force = matches.get_flag("force");
    let work_dir = commands::work_dir(&root, matches.get_one::<String>("work-dir"));

    let catalog = commands::default_catalog()?;
    let index = TemplateIndex::load(&root, &catalog)?;
    let store = SnapshotStore::new(work_dir);
    let previous = store.load()?;
    let first_run = previous.is_none();

    let changed: Vec<_> = if force {
        index.records().collect()
    } else {
        compute_change_set(&index, previous.as_ref())
    };
    tracing::info!(
        total = index.len(),
        changed = changed.len(),
        force,
        "computed deployment plan"
    );

    Ok(CommandResult::Plan {
        total: index.len(),
        changed: changed.iter().map(|record| commands::summarize(record)).collect(),
        first_run,
        force,
    })
}
