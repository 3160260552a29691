//! Sync command implementation.

use super::{pull, push, CommandResult, Workspace};

/// Runs a push-then-pull cycle, optionally with retries.
pub async fn run(workspace: &Workspace, retry: bool) -> CommandResult {
    let orchestrator = workspace.orchestrator();
    let result = if retry {
        orchestrator.sync_with_retry().await?
    } else {
        orchestrator.sync_all().await?
    };

    push::print_report(&result.push);
    println!();
    pull::print_report(&result.pull);
    println!();
    println!(
        "Cycle {}: {} pushed, {} pulled in {} ms",
        if result.success { "succeeded" } else { "partial" },
        result.pushed,
        result.pulled,
        result.duration.as_millis()
    );
    Ok(())
}
