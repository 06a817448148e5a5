//! Inverted-index projection of session metadata.
//!
//! All state lives behind one `RwLock`; operations are self-contained
//! critical sections, so callers never hold a lock themselves.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use retrace_common::{RetraceError, RetraceResult};
use retrace_session_model::{IndexEntry, SearchQuery, SessionId, SessionMeta, SessionStatus};

/// Query-optimized projection of the session catalog.
pub struct SessionIndex {
    inner: RwLock<IndexInner>,
}

#[derive(Default)]
struct IndexInner {
    entries: HashMap<SessionId, IndexEntry>,
    by_token: HashMap<String, HashSet<SessionId>>,
    by_tag: HashMap<String, HashSet<SessionId>>,
    by_category: HashMap<String, HashSet<SessionId>>,
    by_subcategory: HashMap<String, HashSet<SessionId>>,
    by_status: HashMap<SessionStatus, HashSet<SessionId>>,
    by_start: BTreeMap<(DateTime<Utc>, SessionId), ()>,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexInner::default()),
        }
    }

    /// Upsert the entry for one session. Idempotent: identical input
    /// yields an identical index state.
    pub fn update_session(&self, meta: &SessionMeta, summary_text: Option<&str>) {
        let entry = IndexEntry::project(meta, summary_text);
        let mut inner = self.write();
        inner.remove_entry(&entry.id);
        inner.insert_entry(entry);
    }

    /// Hard-delete one session's entry, making the id unsearchable.
    /// Returns whether an entry existed.
    pub fn remove_session(&self, id: &SessionId) -> bool {
        self.write().remove_entry(id)
    }

    /// Bulk rebuild from a full metadata snapshot. Produces the same
    /// state as calling [`update_session`](Self::update_session) once per
    /// item, but in a single pass over pre-sized maps.
    pub fn build_indexes(&self, metas: &[SessionMeta]) {
        let mut fresh = IndexInner::default();
        fresh.entries.reserve(metas.len());
        fresh.by_token.reserve(metas.len() * 8);
        fresh.by_tag.reserve(metas.len() * 2);

        for meta in metas {
            let entry = IndexEntry::project(meta, None);
            // last write wins on duplicate ids, matching the upsert path
            fresh.remove_entry(&entry.id);
            fresh.insert_entry(entry);
        }

        let count = fresh.entries.len();
        *self.write() = fresh;
        tracing::info!(sessions = count, "index rebuilt from snapshot");
    }

    /// Evaluate a conjunctive query against the posting lists.
    ///
    /// Never hard-fails: if the posting lists are internally inconsistent
    /// the search falls back to a linear scan over the entries and the
    /// degradation is logged.
    pub fn search(&self, query: &SearchQuery) -> Vec<SessionId> {
        let inner = self.read();
        match search_indexed(&inner, query) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "index lookup failed, serving linear scan (degraded)");
                search_scan(&inner, query)
            }
        }
    }

    /// Number of indexed sessions.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry for one session, if indexed.
    pub fn entry(&self, id: &SessionId) -> Option<IndexEntry> {
        self.read().entries.get(id).cloned()
    }

    /// All entries, sorted by id. Diagnostic snapshot used by rebuild
    /// tooling and equivalence tests.
    pub fn snapshot(&self) -> Vec<IndexEntry> {
        let inner = self.read();
        let mut entries: Vec<_> = inner.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexInner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexInner {
    fn insert_entry(&mut self, entry: IndexEntry) {
        let id = entry.id.clone();
        for token in &entry.tokens {
            self.by_token.entry(token.clone()).or_default().insert(id.clone());
        }
        for tag in &entry.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(id.clone());
        }
        if !entry.category.is_empty() {
            self.by_category
                .entry(entry.category.clone())
                .or_default()
                .insert(id.clone());
        }
        if !entry.subcategory.is_empty() {
            self.by_subcategory
                .entry(entry.subcategory.clone())
                .or_default()
                .insert(id.clone());
        }
        self.by_status.entry(entry.status).or_default().insert(id.clone());
        self.by_start.insert((entry.started_at, id.clone()), ());
        self.entries.insert(id, entry);
    }

    fn remove_entry(&mut self, id: &SessionId) -> bool {
        let Some(entry) = self.entries.remove(id) else {
            return false;
        };
        for token in &entry.tokens {
            prune(&mut self.by_token, token, id);
        }
        for tag in &entry.tags {
            prune(&mut self.by_tag, tag, id);
        }
        if !entry.category.is_empty() {
            prune(&mut self.by_category, &entry.category, id);
        }
        if !entry.subcategory.is_empty() {
            prune(&mut self.by_subcategory, &entry.subcategory, id);
        }
        if let Some(set) = self.by_status.get_mut(&entry.status) {
            set.remove(id);
            if set.is_empty() {
                self.by_status.remove(&entry.status);
            }
        }
        self.by_start.remove(&(entry.started_at, id.clone()));
        true
    }
}

fn prune(map: &mut HashMap<String, HashSet<SessionId>>, key: &str, id: &SessionId) {
    if let Some(set) = map.get_mut(key) {
        set.remove(id);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

/// Posting-list evaluation. Sub-linear in the catalog size: only the
/// candidate sets for populated filters are touched, intersected
/// smallest-first.
fn search_indexed(inner: &IndexInner, query: &SearchQuery) -> RetraceResult<Vec<SessionId>> {
    let mut candidates: Vec<HashSet<SessionId>> = Vec::new();

    for token in query.text_tokens() {
        match inner.by_token.get(&token) {
            Some(set) => candidates.push(set.clone()),
            None => return Ok(Vec::new()),
        }
    }
    for tag in &query.tags {
        match inner.by_tag.get(&tag.to_lowercase()) {
            Some(set) => candidates.push(set.clone()),
            None => return Ok(Vec::new()),
        }
    }
    if let Some(category) = &query.category {
        match inner.by_category.get(&category.to_lowercase()) {
            Some(set) => candidates.push(set.clone()),
            None => return Ok(Vec::new()),
        }
    }
    if let Some(subcategory) = &query.subcategory {
        match inner.by_subcategory.get(&subcategory.to_lowercase()) {
            Some(set) => candidates.push(set.clone()),
            None => return Ok(Vec::new()),
        }
    }
    if let Some(status) = query.status {
        match inner.by_status.get(&status) {
            Some(set) => candidates.push(set.clone()),
            None => return Ok(Vec::new()),
        }
    }
    if query.started_after.is_some() || query.started_before.is_some() {
        let lower = query.started_after.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut set = HashSet::new();
        let range = inner
            .by_start
            .range((Bound::Included((lower, SessionId::default())), Bound::Unbounded));
        for ((started_at, id), _) in range {
            if let Some(before) = query.started_before {
                if *started_at > before {
                    break;
                }
            }
            set.insert(id.clone());
        }
        candidates.push(set);
    }

    let mut ids: Vec<SessionId> = match candidates.len() {
        // no filters: the whole catalog matches
        0 => inner.entries.keys().cloned().collect(),
        _ => {
            candidates.sort_by_key(HashSet::len);
            let (smallest, rest) = candidates.split_first().expect("len checked above");
            smallest
                .iter()
                .filter(|id| rest.iter().all(|set| set.contains(*id)))
                .cloned()
                .collect()
        }
    };

    for id in &ids {
        if !inner.entries.contains_key(id) {
            return Err(RetraceError::index_inconsistency(format!(
                "posting lists reference unknown session {id}"
            )));
        }
    }

    ids.sort();
    Ok(ids)
}

/// Linear-scan fallback sharing filter semantics with the indexed path
/// through [`IndexEntry::matches`].
fn search_scan(inner: &IndexInner, query: &SearchQuery) -> Vec<SessionId> {
    let mut ids: Vec<SessionId> = inner
        .entries
        .values()
        .filter(|entry| entry.matches(query))
        .map(|entry| entry.id.clone())
        .collect();
    ids.sort();
    ids
}
