//! Push command implementation.

use super::{CommandResult, Workspace};
use fieldsync_engine::{PushCycleReport, PushReport};

/// Runs the push command.
pub async fn run(workspace: &Workspace) -> CommandResult {
    let report = workspace.orchestrator().sync_push().await?;
    print_report(&report);
    Ok(())
}

/// Prints queue delivery counts and one line per pushed kind.
pub fn print_report(report: &PushCycleReport) {
    let queue = &report.queue;
    println!("Push");
    println!("====");
    println!(
        "  queue: {} processed, {} completed, {} retried, {} exhausted, {} blocked",
        queue.processed, queue.completed, queue.retried, queue.exhausted, queue.blocked
    );
    for handler in &report.handlers {
        print_handler(handler, 1);
    }
    println!(
        "Pushed {} records in {} ms",
        report.pushed(),
        report.duration.as_millis()
    );
    for (kind, error) in &report.errors {
        println!("Error: {kind}: {error}");
    }
}

fn print_handler(report: &PushReport, depth: usize) {
    if report.selected == 0 && report.children.is_empty() {
        return;
    }
    println!(
        "{:indent$}{:<24} {} selected, {} pushed, {} failed",
        "",
        report.kind.collection_name(),
        report.selected,
        report.pushed,
        report.failed,
        indent = depth * 2
    );
    for child in &report.children {
        print_handler(child, depth + 1);
    }
}
