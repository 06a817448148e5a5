//! Show one session in detail.

use std::path::PathBuf;

use retrace_session_model::SessionId;

pub async fn run(root: PathBuf, id: String) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    let stored = store.load_session(&SessionId(id)).await?;
    let meta = &stored.meta;

    println!("Session:    {}", meta.id);
    println!("Title:      {}", meta.title);
    println!("Status:     {}", meta.status);
    println!("Started:    {}", meta.started_at.to_rfc3339());
    if let Some(ended) = meta.ended_at {
        println!("Ended:      {}", ended.to_rfc3339());
    }
    if !meta.tags.is_empty() {
        println!("Tags:       {}", meta.tags.join(", "));
    }
    if !meta.category.is_empty() {
        println!("Category:   {}/{}", meta.category, meta.subcategory);
    }
    if !meta.degraded_streams.is_empty() {
        let names: Vec<String> = meta.degraded_streams.iter().map(|k| k.to_string()).collect();
        println!("Degraded:   {}", names.join(", "));
    }
    if !meta.force_terminated.is_empty() {
        let names: Vec<String> = meta.force_terminated.iter().map(|k| k.to_string()).collect();
        println!("Force-terminated: {}", names.join(", "));
    }

    let total_bytes: u64 = meta.chunks.iter().map(|c| c.size_bytes).sum();
    println!("Chunks:     {} ({} bytes)", meta.chunks.len(), total_bytes);
    for chunk in &meta.chunks {
        println!(
            "  {:>14}  #{:04}  {:>10} bytes  {}",
            chunk.kind.to_string(),
            chunk.seq,
            chunk.size_bytes,
            chunk.rel_path
        );
    }

    if let Some(summary) = &stored.summary {
        println!("Summary ({}):", summary.model);
        println!("  {}", summary.text);
        for highlight in &summary.highlights {
            println!("  - {highlight}");
        }
    }
    Ok(())
}
