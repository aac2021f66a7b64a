use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command};
use schedman::{SnapshotStore, TemplateIndex};

use crate::commands::{self, CommandResult};
use crate::error::CliError;

pub fn command() -> Command {
    Command::new("snapshot")
        .about("Inspect or rewrite the deployed-template snapshot")
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
            Arg::new("write")
                .long("write")
                .action(ArgAction::SetTrue)
                .help("Rewrite the snapshot from the current template tree, marking everything deployed."),
        )
}

pub fn run(matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let root = matches
        .get_one::<String>("root")
        .map(PathBuf::from)
        .unwrap_or_default();
    let write = matches.get_flag("write");
    let work_dir = commands::work_dir(&root, matches.get_one::<String>("work-dir"));
    let store = SnapshotStore::new(work_dir);

    if write {
        let catalog = commands::default_catalog()?;
        let index = TemplateIndex::load(&root, &catalog)?;
        let records: Vec<_> = index.records().cloned().collect();
        store.save(&records)?;
        tracing::info!(path = %store.path().display(), records = records.len(), "snapshot rewritten");
        return Ok(CommandResult::Snapshot {
            path: store.path().display().to_string(),
            records: Some(records.iter().map(commands::summarize).collect()),
            written: true,
        });
    }

    let records = store
        .load()?
        .map(|snapshot| snapshot.records.iter().map(commands::summarize).collect());
    Ok(CommandResult::Snapshot {
        path: store.path().display().to_string(),
        records,
        written: false,
    })
}
