//! Rebuild the search index from the full store snapshot.
//!
//! Recovery entry point after a version upgrade or detected index
//! corruption.

use std::path::PathBuf;
use std::time::Instant;

use retrace_index::IndexManager;

pub async fn run(root: PathBuf) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    let sessions = store.load_all_metadata().await?;

    let index = IndexManager::new();
    let started = Instant::now();
    index.rebuild(&sessions);
    let elapsed = started.elapsed();

    println!(
        "Rebuilt index for {} session(s) in {:.1}ms.",
        sessions.len(),
        elapsed.as_secs_f64() * 1000.0
    );
    Ok(())
}
