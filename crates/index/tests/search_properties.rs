//! Property tests for index maintenance: bulk rebuild equivalence,
//! idempotent updates, and agreement between the posting-list path and a
//! brute-force evaluation of the filter semantics.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use retrace_index::SessionIndex;
use retrace_session_model::{
    CaptureConfig, IndexEntry, SearchQuery, SessionId, SessionMeta, SessionStatus,
};

const TAG_POOL: &[&str] = &["work", "personal", "health", "meeting", "focus"];
const CATEGORY_POOL: &[&str] = &["", "dev", "life", "ops"];
const WORD_POOL: &[&str] = &["review", "sprint", "gym", "reading", "debug", "planning"];

fn epoch(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap()
}

fn arb_status() -> impl Strategy<Value = SessionStatus> {
    prop_oneof![
        Just(SessionStatus::Recording),
        Just(SessionStatus::Paused),
        Just(SessionStatus::Completed),
        Just(SessionStatus::Failed),
    ]
}

fn arb_meta(id_hint: usize) -> impl Strategy<Value = SessionMeta> {
    (
        proptest::sample::subsequence(WORD_POOL.to_vec(), 1..=3),
        proptest::sample::subsequence(TAG_POOL.to_vec(), 0..=2),
        proptest::sample::select(CATEGORY_POOL.to_vec()),
        arb_status(),
        0i64..100_000,
    )
        .prop_map(move |(words, tags, category, status, offset)| {
            let mut meta = SessionMeta::new(words.join(" "), CaptureConfig::default());
            meta.id = SessionId(format!("session-{id_hint:04}"));
            meta.tags = tags.into_iter().map(str::to_string).collect();
            meta.category = category.to_string();
            meta.status = status;
            meta.started_at = epoch(offset);
            meta
        })
}

fn arb_catalog(max: usize) -> impl Strategy<Value = Vec<SessionMeta>> {
    (0..=max).prop_flat_map(|n| (0..n).map(arb_meta).collect::<Vec<_>>())
}

fn arb_query() -> impl Strategy<Value = SearchQuery> {
    (
        proptest::option::of(proptest::sample::select(WORD_POOL.to_vec())),
        proptest::sample::subsequence(TAG_POOL.to_vec(), 0..=2),
        proptest::option::of(proptest::sample::select(vec!["dev", "life", "ops"])),
        proptest::option::of(arb_status()),
        proptest::option::of(0i64..100_000),
        proptest::option::of(0i64..100_000),
    )
        .prop_map(|(text, tags, category, status, after, before)| SearchQuery {
            text: text.map(str::to_string),
            tags: tags.into_iter().map(str::to_string).collect(),
            category: category.map(str::to_string),
            subcategory: None,
            status,
            started_after: after.map(epoch),
            started_before: before.map(epoch),
        })
}

/// Reference evaluation: project every session and apply the shared
/// filter semantics directly.
fn brute_force(metas: &[SessionMeta], query: &SearchQuery) -> Vec<SessionId> {
    let mut ids: Vec<SessionId> = metas
        .iter()
        .filter(|m| IndexEntry::project(m, None).matches(query))
        .map(|m| m.id.clone())
        .collect();
    ids.sort();
    ids
}

proptest! {
    #[test]
    fn bulk_rebuild_equals_per_item_updates(
        metas in arb_catalog(16),
        query in arb_query(),
    ) {
        let incremental = SessionIndex::new();
        for meta in &metas {
            incremental.update_session(meta, None);
        }

        let bulk = SessionIndex::new();
        bulk.build_indexes(&metas);

        prop_assert_eq!(incremental.snapshot(), bulk.snapshot());
        prop_assert_eq!(incremental.search(&query), bulk.search(&query));
    }

    #[test]
    fn repeated_updates_are_idempotent(metas in arb_catalog(12)) {
        let once = SessionIndex::new();
        let twice = SessionIndex::new();

        for meta in &metas {
            once.update_session(meta, None);
            twice.update_session(meta, None);
            twice.update_session(meta, None);
        }

        prop_assert_eq!(once.snapshot(), twice.snapshot());
    }

    #[test]
    fn indexed_search_agrees_with_brute_force(
        metas in arb_catalog(16),
        query in arb_query(),
    ) {
        let index = SessionIndex::new();
        index.build_indexes(&metas);

        prop_assert_eq!(index.search(&query), brute_force(&metas, &query));
    }

    #[test]
    fn removal_makes_ids_unsearchable(metas in arb_catalog(10)) {
        let index = SessionIndex::new();
        index.build_indexes(&metas);

        for meta in &metas {
            index.remove_session(&meta.id);
        }

        prop_assert!(index.is_empty());
        prop_assert!(index.search(&SearchQuery::default()).is_empty());
    }
}
