use std::process::ExitCode;

use serde_json::json;

use crate::commands::{CommandResult, TemplateSummary};
use crate::error::CliError;

pub enum OutputFormat {
    Text,
    Json,
}

/// Renders a `CommandResult` as either human-readable text or
/// newline-delimited JSON, converting the outcome into a deterministic exit
/// code.
pub fn emit_result(result: CommandResult, format: OutputFormat) -> Result<ExitCode, CliError> {
    match format {
        OutputFormat::Text => print_text(&result),
        OutputFormat::Json => print_json(&result),
    };
    Ok(ExitCode::from(result.exit_status().code()))
}

fn print_text(result: &CommandResult) {
    match result {
        CommandResult::Validated { root, templates } => {
            println!("Validated {} template(s) under {}", templates.len(), root);
            print_summaries(templates);
        }
        CommandResult::Plan {
            total,
            changed,
            first_run,
            force,
        } => {
            if *force {
                println!("Plan (forced): {} of {} template(s) selected", changed.len(), total);
            } else if *first_run {
                println!(
                    "Plan (first run, no snapshot): {} of {} template(s) selected",
                    changed.len(),
                    total
                );
            } else {
                println!("Plan: {} of {} template(s) changed", changed.len(), total);
            }
            if changed.is_empty() {
                println!("  nothing to deploy");
            } else {
                print_summaries(changed);
            }
        }
        CommandResult::Snapshot {
            path,
            records,
            written,
        } => {
            if *written {
                let count = records.as_ref().map(Vec::len).unwrap_or_default();
                println!("Snapshot written: {path} ({count} record(s))");
            } else {
                match records {
                    Some(records) => {
                        println!("Snapshot: {path} ({} record(s))", records.len());
                        print_summaries(records);
                    }
                    None => println!("Snapshot: {path} (absent, first run pending)"),
                }
            }
        }
    }
}

fn print_summaries(templates: &[TemplateSummary]) {
    for template in templates {
        println!(
            "  - {} (kind: {}, category: {}, source: {})",
            template.name, template.kind, template.category, template.source
        );
    }
}

fn print_json(result: &CommandResult) {
    let payload = json!(result);
    println!("{payload}");
}
