//! Search the catalog.
//!
//! Builds the index from the store snapshot, then evaluates the
//! conjunctive filter set against it.

use std::path::PathBuf;

use chrono::DateTime;

use retrace_index::IndexManager;
use retrace_session_model::{SearchQuery, SessionStatus};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    root: PathBuf,
    text: Option<String>,
    tags: Vec<String>,
    category: Option<String>,
    subcategory: Option<String>,
    status: Option<String>,
    after: Option<String>,
    before: Option<String>,
) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    let sessions = store.load_all_metadata().await?;

    let index = IndexManager::new();
    index.rebuild(&sessions);

    let query = SearchQuery {
        text,
        tags,
        category,
        subcategory,
        status: status.as_deref().map(parse_status).transpose()?,
        started_after: after.as_deref().map(parse_instant).transpose()?,
        started_before: before.as_deref().map(parse_instant).transpose()?,
    };

    let ids = index.search(&query);
    if ids.is_empty() {
        println!("No matching sessions.");
        return Ok(());
    }

    println!("{} match(es):", ids.len());
    for id in &ids {
        if let Some(meta) = sessions.iter().find(|m| &m.id == id) {
            println!("  {}  [{}]  {}", meta.id, meta.status, meta.title);
        } else {
            println!("  {id}");
        }
    }
    Ok(())
}

fn parse_status(s: &str) -> anyhow::Result<SessionStatus> {
    match s {
        "recording" => Ok(SessionStatus::Recording),
        "paused" => Ok(SessionStatus::Paused),
        "completed" => Ok(SessionStatus::Completed),
        "failed" => Ok(SessionStatus::Failed),
        other => anyhow::bail!("unknown status: {other}"),
    }
}

fn parse_instant(s: &str) -> anyhow::Result<chrono::DateTime<chrono::Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&chrono::Utc))
}
