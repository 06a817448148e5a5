//! Delete a session and its index entry.

use std::path::PathBuf;
use std::time::Duration;

use retrace_index::IndexManager;
use retrace_orchestrator::SessionOrchestrator;
use retrace_session_model::SessionId;

pub async fn run(root: PathBuf, id: String) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    let orch = SessionOrchestrator::new(store, IndexManager::new(), Duration::from_secs(5));
    orch.load_catalog().await?;

    let meta = orch.delete_session(&SessionId(id)).await?;
    println!(
        "Deleted session {} ({}, {} chunks).",
        meta.id,
        meta.title,
        meta.chunks.len()
    );
    Ok(())
}
