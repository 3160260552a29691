//! Reset command implementation.

use super::{CommandResult, Workspace};
use fieldsync_core::EntityKind;

/// Clears the watermarks of one kind so the next pull is complete.
pub fn run(workspace: &Workspace, kind: &str) -> CommandResult {
    let kind: EntityKind = kind.parse()?;
    workspace.orchestrator().reset_sync_metadata(kind)?;
    println!("Reset sync metadata for {}", kind.collection_name());
    Ok(())
}
