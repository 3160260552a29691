//! Status command implementation.

use super::{CommandResult, Workspace};
use fieldsync_core::{QueueHealth, SyncMetadata};
use serde::Serialize;

/// Sync health of the local snapshot.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// One row per tracked scope, ordered by scope key.
    pub metadata: Vec<SyncMetadata>,
    /// Queued mutations by status.
    pub queue: QueueHealth,
    /// Whether a background cycle is due.
    pub background_sync_due: bool,
}

/// Runs the status command.
pub fn run(workspace: &Workspace, format: &str) -> CommandResult {
    let mut metadata = workspace.metadata().rows();
    metadata.sort_by(|a, b| a.entity_type.cmp(&b.entity_type));

    let orchestrator = workspace.orchestrator();
    let result = StatusResult {
        metadata,
        queue: orchestrator.queue_health()?,
        background_sync_due: orchestrator.should_run_background_sync()?,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &StatusResult) {
    println!("fieldsync Status");
    println!("================");
    println!();
    println!("Watermarks:");
    if result.metadata.is_empty() {
        println!("  (never synced)");
    }
    for row in &result.metadata {
        println!(
            "  {:<32} {:>15} ms  {} records, {} down, {} up",
            row.entity_type,
            row.last_sync_timestamp.as_millis(),
            row.last_sync_count,
            format_size(row.bytes_downloaded),
            format_size(row.bytes_uploaded)
        );
        if let Some(error) = &row.last_error {
            println!("    last error: {error}");
        }
    }
    println!();
    println!("Queue:");
    println!("  Pending:    {}", result.queue.pending);
    println!("  Processing: {}", result.queue.processing);
    println!("  Completed:  {}", result.queue.completed);
    println!("  Failed:     {}", result.queue.failed);
    println!();
    println!(
        "Background sync: {}",
        if result.background_sync_due { "due" } else { "not due" }
    );
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
