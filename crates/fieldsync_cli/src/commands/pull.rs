//! Pull command implementation.

use super::{CommandResult, Workspace};
use fieldsync_engine::{PullCycleReport, PullOptions, PullReport};

/// Runs the pull command.
pub async fn run(workspace: &Workspace, full: bool) -> CommandResult {
    let options = if full {
        PullOptions::full()
    } else {
        PullOptions::default()
    };
    let report = workspace.orchestrator().sync_pull_with(options).await?;
    print_report(&report);
    Ok(())
}

/// Prints one line per pulled kind and any failures.
pub fn print_report(report: &PullCycleReport) {
    println!("Pull");
    println!("====");
    for handler in &report.handlers {
        print_handler(handler, 1);
    }
    println!(
        "Applied {} records, {} bytes in {} ms",
        report.applied(),
        report.bytes_downloaded(),
        report.duration.as_millis()
    );
    if let Some(summary) = report.error_summary() {
        println!("Errors: {summary}");
    }
}

fn print_handler(report: &PullReport, depth: usize) {
    println!(
        "{:indent$}{:<24} {:?}: {} applied, {} unchanged, {} deferred, {} out of scope, {} failed",
        "",
        report.kind.collection_name(),
        report.mode,
        report.applied,
        report.unchanged,
        report.deferred,
        report.out_of_scope,
        report.failed,
        indent = depth * 2
    );
    for child in &report.children {
        print_handler(child, depth + 1);
    }
}
