//! Queue command implementation.

use super::{CommandResult, Workspace};
use fieldsync_core::MutationQueue;

/// Lists queued mutations, purging completed ones first if asked.
pub fn run(workspace: &Workspace, purge: bool) -> CommandResult {
    if purge {
        let removed = workspace.orchestrator().purge_completed_mutations()?;
        println!("Purged {removed} completed mutations");
    }

    let mutations = workspace.queue().list()?;
    if mutations.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }
    for mutation in &mutations {
        println!(
            "{:<8} {:<8} {:<18} #{:<8} {:?} retries {}/{}",
            mutation.id.to_string(),
            format!("{:?}", mutation.operation),
            mutation.entity_type.collection_name(),
            mutation.entity_id,
            mutation.status,
            mutation.retry_count,
            mutation.max_retries
        );
        if let Some(error) = &mutation.last_error {
            println!("         {error}");
        }
    }
    Ok(())
}
