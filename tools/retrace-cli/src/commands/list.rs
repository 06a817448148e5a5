//! List stored sessions.

use std::path::PathBuf;

pub async fn run(root: PathBuf) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    let sessions = store.load_all_metadata().await?;

    if sessions.is_empty() {
        println!("No sessions stored.");
        return Ok(());
    }

    println!("{} session(s):", sessions.len());
    for meta in sessions {
        let duration = meta
            .duration_secs()
            .map(|d| format!("{d:.0}s"))
            .unwrap_or_else(|| "live".to_string());
        println!(
            "  {}  [{}]  {}  ({} chunks, {})",
            meta.id,
            meta.status,
            meta.title,
            meta.chunks.len(),
            duration
        );
    }
    Ok(())
}
