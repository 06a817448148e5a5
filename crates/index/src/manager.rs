//! Asynchronous index maintenance.
//!
//! Store mutations never block on the index: the manager spawns the
//! projection update immediately (bounded staleness, nothing batched) and
//! returns a completion handle so callers and tests can await
//! convergence instead of racing it.

use std::sync::Arc;

use tokio::sync::oneshot;

use retrace_session_model::{SearchQuery, SessionId, SessionMeta};

use crate::index::SessionIndex;

/// Completion signal for one scheduled index mutation.
pub struct IndexUpdateHandle {
    rx: oneshot::Receiver<()>,
}

impl IndexUpdateHandle {
    /// Resolve once the mutation has been applied to the index.
    pub async fn applied(self) {
        // a dropped sender means the runtime shut down mid-update; there
        // is nothing left to wait for
        let _ = self.rx.await;
    }
}

/// Async facade over [`SessionIndex`] scheduling non-blocking updates.
#[derive(Clone)]
pub struct IndexManager {
    index: Arc<SessionIndex>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self {
            index: Arc::new(SessionIndex::new()),
        }
    }

    pub fn with_index(index: Arc<SessionIndex>) -> Self {
        Self { index }
    }

    /// The underlying index.
    pub fn index(&self) -> &Arc<SessionIndex> {
        &self.index
    }

    /// Schedule an upsert for one session. The task is spawned before
    /// this returns; the handle resolves when the entry is visible.
    pub fn schedule_update(
        &self,
        meta: SessionMeta,
        summary_text: Option<String>,
    ) -> IndexUpdateHandle {
        let (tx, rx) = oneshot::channel();
        let index = self.index.clone();
        tokio::spawn(async move {
            index.update_session(&meta, summary_text.as_deref());
            let _ = tx.send(());
        });
        IndexUpdateHandle { rx }
    }

    /// Schedule the removal of one session's entry.
    pub fn schedule_remove(&self, id: SessionId) -> IndexUpdateHandle {
        let (tx, rx) = oneshot::channel();
        let index = self.index.clone();
        tokio::spawn(async move {
            if !index.remove_session(&id) {
                tracing::debug!(session = %id, "remove scheduled for unindexed session");
            }
            let _ = tx.send(());
        });
        IndexUpdateHandle { rx }
    }

    /// Rebuild the whole index from a metadata snapshot (startup and
    /// recovery path). Synchronous: recovery callers want the index
    /// ready when this returns.
    pub fn rebuild(&self, metas: &[SessionMeta]) {
        self.index.build_indexes(metas);
    }

    /// Query the index. Degrades to a linear scan internally rather than
    /// failing the caller.
    pub fn search(&self, query: &SearchQuery) -> Vec<SessionId> {
        self.index.search(query)
    }
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_session_model::CaptureConfig;

    #[tokio::test]
    async fn test_scheduled_update_is_awaitable() {
        let manager = IndexManager::new();
        let meta = SessionMeta::new("Scheduled", CaptureConfig::default());

        manager
            .schedule_update(meta.clone(), Some("summary text".to_string()))
            .applied()
            .await;

        assert_eq!(manager.index().len(), 1);
        let entry = manager.index().entry(&meta.id).unwrap();
        assert!(entry.tokens.contains("summary"));
    }

    #[tokio::test]
    async fn test_scheduled_remove_converges() {
        let manager = IndexManager::new();
        let meta = SessionMeta::new("Removable", CaptureConfig::default());

        manager.schedule_update(meta.clone(), None).applied().await;
        manager.schedule_remove(meta.id.clone()).applied().await;

        assert!(manager.index().is_empty());
        assert!(manager.search(&SearchQuery::default()).is_empty());
    }

    #[tokio::test]
    async fn test_update_then_remove_in_schedule_order() {
        let manager = IndexManager::new();
        let meta = SessionMeta::new("Ordered", CaptureConfig::default());

        let update = manager.schedule_update(meta.clone(), None);
        update.applied().await;
        let remove = manager.schedule_remove(meta.id.clone());
        remove.applied().await;

        assert!(manager.index().entry(&meta.id).is_none());
    }
}
