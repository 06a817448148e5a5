//! Search queries and the index projection of session metadata.
//!
//! A query is a conjunctive filter set: every populated field must match
//! (AND semantics only). `IndexEntry` is the denormalized, queryable
//! projection of one session; `IndexEntry::matches` is the single source
//! of truth for filter semantics, shared by the indexed path and the
//! linear-scan fallback.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{SessionId, SessionMeta, SessionStatus};

/// Conjunctive search filters. Empty/`None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Free-text tokens; every token must be present.
    pub text: Option<String>,

    /// Required tags; every tag must be present.
    pub tags: Vec<String>,

    /// Required category.
    pub category: Option<String>,

    /// Required sub-category.
    pub subcategory: Option<String>,

    /// Required status.
    pub status: Option<SessionStatus>,

    /// Sessions that started at or after this instant.
    pub started_after: Option<DateTime<Utc>>,

    /// Sessions that started at or before this instant.
    pub started_before: Option<DateTime<Utc>>,
}

impl SearchQuery {
    /// Whether no filter is populated (matches every session).
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, str::is_empty)
            && self.tags.is_empty()
            && self.category.is_none()
            && self.subcategory.is_none()
            && self.status.is_none()
            && self.started_after.is_none()
            && self.started_before.is_none()
    }

    /// Tokenized form of the free-text filter.
    pub fn text_tokens(&self) -> BTreeSet<String> {
        self.text.as_deref().map(tokenize).unwrap_or_default()
    }
}

/// Denormalized, queryable projection of one session's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: SessionId,

    /// Free-text tokens from title, notes, tags, and summary text.
    pub tokens: BTreeSet<String>,

    pub tags: BTreeSet<String>,
    pub category: String,
    pub subcategory: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl IndexEntry {
    /// Project session metadata (plus optional summary text) into an entry.
    pub fn project(meta: &SessionMeta, summary_text: Option<&str>) -> Self {
        let mut tokens = tokenize(&meta.title);
        tokens.extend(tokenize(&meta.notes));
        if let Some(text) = summary_text {
            tokens.extend(tokenize(text));
        }
        let tags: BTreeSet<String> = meta.tags.iter().map(|t| t.to_lowercase()).collect();
        for tag in &tags {
            tokens.extend(tokenize(tag));
        }

        Self {
            id: meta.id.clone(),
            tokens,
            tags,
            category: meta.category.to_lowercase(),
            subcategory: meta.subcategory.to_lowercase(),
            status: meta.status,
            started_at: meta.started_at,
            ended_at: meta.ended_at,
        }
    }

    /// Evaluate the full conjunctive filter set against this entry.
    pub fn matches(&self, query: &SearchQuery) -> bool {
        let text_tokens = query.text_tokens();
        if !text_tokens.iter().all(|t| self.tokens.contains(t)) {
            return false;
        }
        if !query
            .tags
            .iter()
            .all(|t| self.tags.contains(&t.to_lowercase()))
        {
            return false;
        }
        if let Some(category) = &query.category {
            if !self.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(subcategory) = &query.subcategory {
            if !self.subcategory.eq_ignore_ascii_case(subcategory) {
                return false;
            }
        }
        if let Some(status) = query.status {
            if self.status != status {
                return false;
            }
        }
        if let Some(after) = query.started_after {
            if self.started_at < after {
                return false;
            }
        }
        if let Some(before) = query.started_before {
            if self.started_at > before {
                return false;
            }
        }
        true
    }
}

/// Tokenize free text: lowercase, split on non-alphanumeric boundaries,
/// drop single-character fragments.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}
