//! Chunked, crash-safe session persistence.
//!
//! A session lives in its own directory under the storage root:
//!
//! ```text
//! <root>/<session-id>/meta.json        metadata chunk (authoritative)
//! <root>/<session-id>/summary.json     summary chunk
//! <root>/<session-id>/shots/<seq>.jpg  screenshot chunks
//! <root>/<session-id>/audio/<seq>.pcm  audio segment chunks
//! <root>/<session-id>/video/<seq>.bin  video chunks
//! ```
//!
//! Every mutation goes through the [`SpaceGuard`] before the first byte is
//! written, and every file lands via write-to-temp-then-rename. Mutations
//! of the same session are serialized behind a per-session lock; different
//! sessions proceed concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use retrace_common::{RetraceError, RetraceResult};
use retrace_session_model::{
    AudioSegmentChunk, ChunkKind, ChunkRef, ScreenshotChunk, SessionId, SessionMeta,
    SessionSummary, VideoChunk, CHUNK_FILE_OVERHEAD_BYTES,
};

use crate::space::SpaceGuard;

const META_FILE: &str = "meta.json";
const SUMMARY_FILE: &str = "summary.json";

/// A loaded session: metadata plus its summary, if one was committed.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub meta: SessionMeta,
    pub summary: Option<SessionSummary>,
}

/// Durable chunk store rooted at a storage directory.
///
/// The store is the sole writer of session chunks. It never calls the
/// index directly; deletes return the removed metadata so the caller can
/// pair the index removal within the same logical operation.
pub struct ChunkStore {
    root: PathBuf,
    guard: Arc<dyn SpaceGuard>,
    session_locks: StdMutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl ChunkStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, guard: Arc<dyn SpaceGuard>) -> RetraceResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| RetraceError::filesystem(&root, e))?;
        Ok(Self {
            root,
            guard,
            session_locks: StdMutex::new(HashMap::new()),
        })
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The disk space guard admitting writes for this store.
    pub fn guard(&self) -> &Arc<dyn SpaceGuard> {
        &self.guard
    }

    /// Create a new session on disk. Fails if the session already exists.
    pub async fn create_session(&self, meta: &SessionMeta) -> RetraceResult<()> {
        let _lock = self.session_lock(&meta.id);
        let _held = _lock.lock().await;

        if self.meta_path(&meta.id).exists() {
            return Err(RetraceError::validation(format!(
                "session {} already exists",
                meta.id
            )));
        }
        self.save_metadata_locked(meta).await
    }

    /// Persist the metadata chunk (create or update), guard-checked and
    /// atomic.
    pub async fn save_metadata(&self, meta: &SessionMeta) -> RetraceResult<()> {
        let lock = self.session_lock(&meta.id);
        let _held = lock.lock().await;
        self.save_metadata_locked(meta).await
    }

    /// Read-modify-write the metadata chunk under the session lock, so
    /// concurrent appends cannot be lost between the read and the write.
    /// Returns the metadata as persisted.
    pub async fn update_metadata<F>(&self, id: &SessionId, mutate: F) -> RetraceResult<SessionMeta>
    where
        F: FnOnce(&mut SessionMeta),
    {
        let lock = self.session_lock(id);
        let _held = lock.lock().await;

        let mut meta = self.read_meta(id).await?;
        mutate(&mut meta);
        self.save_metadata_locked(&meta).await?;
        Ok(meta)
    }

    /// Persist the summary chunk for an existing session.
    pub async fn save_summary(
        &self,
        id: &SessionId,
        summary: &SessionSummary,
    ) -> RetraceResult<()> {
        if &summary.session_id != id {
            return Err(RetraceError::validation(format!(
                "summary session id {} does not match {}",
                summary.session_id, id
            )));
        }
        let lock = self.session_lock(id);
        let _held = lock.lock().await;

        // the metadata chunk must exist before any dependent chunk lands
        self.read_meta(id).await?;

        let bytes = serde_json::to_vec_pretty(summary)?;
        self.guard.check(&self.root, estimate_write_size(&bytes))?;
        self.write_atomic(&self.summary_path(id), &bytes).await
    }

    /// Append a screenshot chunk. Failures here are non-fatal to the
    /// session: callers log, mark the stream degraded, and keep recording.
    pub async fn append_screenshot(
        &self,
        id: &SessionId,
        chunk: ScreenshotChunk,
    ) -> RetraceResult<ChunkRef> {
        let ext = chunk.format.extension();
        self.append_chunk(
            id,
            ChunkKind::Screenshot,
            chunk.recorded_at,
            ext,
            chunk.data,
        )
        .await
    }

    /// Append an audio segment chunk. Non-fatal on failure, like
    /// [`append_screenshot`](Self::append_screenshot).
    pub async fn append_audio_segment(
        &self,
        id: &SessionId,
        chunk: AudioSegmentChunk,
    ) -> RetraceResult<ChunkRef> {
        self.append_chunk(
            id,
            ChunkKind::AudioSegment,
            chunk.recorded_at,
            "pcm",
            chunk.data,
        )
        .await
    }

    /// Append a video chunk. Non-fatal on failure, like
    /// [`append_screenshot`](Self::append_screenshot).
    pub async fn append_video_chunk(
        &self,
        id: &SessionId,
        chunk: VideoChunk,
    ) -> RetraceResult<ChunkRef> {
        self.append_chunk(id, ChunkKind::Video, chunk.recorded_at, "bin", chunk.data)
            .await
    }

    /// Load one session (metadata plus summary). Read-only, no guard
    /// check. Orphan data files not referenced by the metadata chunk are
    /// reported and ignored.
    pub async fn load_session(&self, id: &SessionId) -> RetraceResult<StoredSession> {
        let meta = self.read_meta(id).await?;

        let summary_path = self.summary_path(id);
        let summary = if summary_path.exists() {
            let bytes = tokio::fs::read(&summary_path)
                .await
                .map_err(|e| RetraceError::filesystem(&summary_path, e))?;
            Some(serde_json::from_slice(&bytes)?)
        } else {
            None
        };

        let orphans = self.detect_orphans(&meta).await;
        if orphans > 0 {
            tracing::warn!(
                session = %id,
                orphans,
                "found data files not referenced by the metadata chunk"
            );
        }

        Ok(StoredSession { meta, summary })
    }

    /// Load every session's metadata chunk. Unreadable session
    /// directories are skipped with a warning, never aborting the scan.
    pub async fn load_all_metadata(&self) -> RetraceResult<Vec<SessionMeta>> {
        let mut sessions = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| RetraceError::filesystem(&self.root, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RetraceError::filesystem(&self.root, e))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let id = SessionId(entry.file_name().to_string_lossy().into_owned());
            match self.read_meta(&id).await {
                Ok(meta) => sessions.push(meta),
                Err(e) => {
                    tracing::warn!(
                        session = %id,
                        error = %e,
                        "skipping unreadable session directory"
                    );
                }
            }
        }

        sessions.sort_by_key(|m| m.started_at);
        Ok(sessions)
    }

    /// Read one committed chunk's payload bytes.
    pub async fn load_chunk_payload(
        &self,
        id: &SessionId,
        chunk_ref: &ChunkRef,
    ) -> RetraceResult<Vec<u8>> {
        let path = self.session_dir(id).join(&chunk_ref.rel_path);
        tokio::fs::read(&path)
            .await
            .map_err(|e| RetraceError::filesystem(&path, e))
    }

    /// Remove a session and all of its chunks. Returns the removed
    /// metadata so the caller can trigger the paired index removal within
    /// the same logical operation.
    pub async fn delete_session(&self, id: &SessionId) -> RetraceResult<SessionMeta> {
        let lock = self.session_lock(id);
        let _held = lock.lock().await;

        let meta = self.read_meta(id).await?;
        let dir = self.session_dir(id);
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| RetraceError::filesystem(&dir, e))?;

        tracing::info!(session = %id, chunks = meta.chunks.len(), "session deleted");
        Ok(meta)
    }

    // Internal helpers

    pub(crate) fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub(crate) fn meta_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(META_FILE)
    }

    pub(crate) fn summary_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(SUMMARY_FILE)
    }

    pub(crate) fn session_lock(&self, id: &SessionId) -> Arc<Mutex<()>> {
        let mut locks = self
            .session_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(id.clone()).or_default().clone()
    }

    pub(crate) async fn read_meta(&self, id: &SessionId) -> RetraceResult<SessionMeta> {
        let path = self.meta_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RetraceError::session_not_found(id.as_str()));
            }
            Err(e) => return Err(RetraceError::filesystem(&path, e)),
        };
        let meta: SessionMeta = serde_json::from_slice(&bytes)?;
        if &meta.id != id {
            return Err(RetraceError::validation(format!(
                "metadata chunk for {} claims id {}",
                id, meta.id
            )));
        }
        Ok(meta)
    }

    async fn save_metadata_locked(&self, meta: &SessionMeta) -> RetraceResult<()> {
        let bytes = serde_json::to_vec_pretty(meta)?;
        self.guard.check(&self.root, estimate_write_size(&bytes))?;
        self.write_atomic(&self.meta_path(&meta.id), &bytes).await
    }

    async fn append_chunk(
        &self,
        id: &SessionId,
        kind: ChunkKind,
        recorded_at: chrono::DateTime<chrono::Utc>,
        ext: &str,
        data: Vec<u8>,
    ) -> RetraceResult<ChunkRef> {
        if data.is_empty() {
            return Err(RetraceError::validation(format!("empty {kind} payload")));
        }

        let lock = self.session_lock(id);
        let _held = lock.lock().await;

        let mut meta = self.read_meta(id).await?;
        let seq = meta.next_seq(kind);
        let rel_path = chunk_rel_path(kind, seq, ext)?;

        let chunk_ref = ChunkRef {
            kind,
            seq,
            rel_path: rel_path.clone(),
            size_bytes: data.len() as u64,
            recorded_at,
        };
        meta.push_chunk(chunk_ref.clone());
        let meta_bytes = serde_json::to_vec_pretty(&meta)?;

        // one admission check covers the data file and the metadata update
        let required = estimate_write_size(&data).saturating_add(estimate_write_size(&meta_bytes));
        self.guard.check(&self.root, required)?;

        // data first, metadata last: committed refs never point at
        // missing files
        self.write_atomic(&self.session_dir(id).join(&rel_path), &data)
            .await?;
        self.write_atomic(&self.meta_path(id), &meta_bytes).await?;

        tracing::debug!(session = %id, %kind, seq, bytes = chunk_ref.size_bytes, "chunk appended");
        Ok(chunk_ref)
    }

    /// Write `bytes` to `path` via a staged temp file, retrying once on an
    /// I/O fault before surfacing it.
    pub(crate) async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> RetraceResult<()> {
        match self.stage_and_rename(path, bytes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "write failed, retrying once");
                self.stage_and_rename(path, bytes).await
            }
        }
    }

    async fn stage_and_rename(&self, path: &Path, bytes: &[u8]) -> RetraceResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| RetraceError::validation(format!("path has no parent: {path:?}")))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RetraceError::filesystem(parent, e))?;

        let staged = staging_path(path);
        if let Err(e) = tokio::fs::write(&staged, bytes).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(RetraceError::filesystem(&staged, e));
        }
        if let Err(e) = tokio::fs::rename(&staged, path).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(RetraceError::filesystem(path, e));
        }
        Ok(())
    }

    async fn detect_orphans(&self, meta: &SessionMeta) -> usize {
        let dir = self.session_dir(&meta.id);
        let mut orphans = 0;

        for subdir in ["shots", "audio", "video"] {
            let sub = dir.join(subdir);
            let Ok(mut entries) = tokio::fs::read_dir(&sub).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let rel = format!("{subdir}/{}", entry.file_name().to_string_lossy());
                let referenced = meta.chunks.iter().any(|c| c.rel_path == rel);
                if !referenced && !rel.ends_with(".tmp") {
                    orphans += 1;
                }
            }
        }
        orphans
    }
}

/// Relative path for a data chunk within its session directory.
pub(crate) fn chunk_rel_path(kind: ChunkKind, seq: u64, ext: &str) -> RetraceResult<String> {
    let subdir = match kind {
        ChunkKind::Screenshot => "shots",
        ChunkKind::AudioSegment => "audio",
        ChunkKind::Video => "video",
        ChunkKind::Metadata | ChunkKind::Summary => {
            return Err(RetraceError::validation(format!(
                "{kind} chunks are not sequence-addressed"
            )));
        }
    };
    Ok(format!("{subdir}/{seq:08}.{ext}"))
}

/// Conservative size estimate for one staged file.
pub(crate) fn estimate_write_size(bytes: &[u8]) -> u64 {
    bytes.len() as u64 + CHUNK_FILE_OVERHEAD_BYTES
}

/// Staged sibling path used for atomic writes (`<name>.tmp`).
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::FixedSpaceGuard;
    use chrono::Utc;
    use retrace_session_model::{CaptureConfig, ImageFormat, SessionStatus};

    fn roomy_guard() -> Arc<dyn SpaceGuard> {
        Arc::new(FixedSpaceGuard::new(u64::MAX, u64::MAX))
    }

    fn full_disk_guard() -> Arc<dyn SpaceGuard> {
        Arc::new(FixedSpaceGuard::new(u64::MAX, 0))
    }

    fn temp_store(name: &str, guard: Arc<dyn SpaceGuard>) -> ChunkStore {
        let dir = std::env::temp_dir().join(format!("retrace_store_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        ChunkStore::open(dir, guard).unwrap()
    }

    fn shot(bytes: usize) -> ScreenshotChunk {
        ScreenshotChunk {
            recorded_at: Utc::now(),
            format: ImageFormat::Jpeg,
            data: vec![0xAB; bytes],
        }
    }

    #[tokio::test]
    async fn test_create_and_load_roundtrip() {
        let store = temp_store("roundtrip", roomy_guard());
        let meta = SessionMeta::new("Roundtrip", CaptureConfig::default());

        store.create_session(&meta).await.unwrap();
        let loaded = store.load_session(&meta.id).await.unwrap();
        assert_eq!(loaded.meta.id, meta.id);
        assert_eq!(loaded.meta.title, "Roundtrip");
        assert!(loaded.summary.is_none());

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_create_rejects_existing_session() {
        let store = temp_store("create_twice", roomy_guard());
        let meta = SessionMeta::new("Once", CaptureConfig::default());

        store.create_session(&meta).await.unwrap();
        let err = store.create_session(&meta).await.unwrap_err();
        assert!(matches!(err, RetraceError::Validation { .. }));

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_append_commits_data_and_updates_metadata() {
        let store = temp_store("append", roomy_guard());
        let meta = SessionMeta::new("Append", CaptureConfig::default());
        store.create_session(&meta).await.unwrap();

        let r0 = store.append_screenshot(&meta.id, shot(64)).await.unwrap();
        let r1 = store.append_screenshot(&meta.id, shot(64)).await.unwrap();
        assert_eq!(r0.seq, 0);
        assert_eq!(r1.seq, 1);

        let loaded = store.load_session(&meta.id).await.unwrap();
        assert_eq!(loaded.meta.chunks.len(), 2);
        assert!(loaded.meta.has_chunk(ChunkKind::Screenshot, 1));

        let payload = store.load_chunk_payload(&meta.id, &r0).await.unwrap();
        assert_eq!(payload.len(), 64);

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_is_validation_fatal() {
        let store = temp_store("append_unknown", roomy_guard());
        let err = store
            .append_screenshot(&SessionId::from("nope"), shot(10))
            .await
            .unwrap_err();
        assert!(matches!(err, RetraceError::SessionNotFound { .. }));

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_append_rejects_empty_payload() {
        let store = temp_store("append_empty", roomy_guard());
        let meta = SessionMeta::new("Empty", CaptureConfig::default());
        store.create_session(&meta).await.unwrap();

        let err = store
            .append_screenshot(&meta.id, shot(0))
            .await
            .unwrap_err();
        assert!(matches!(err, RetraceError::Validation { .. }));

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_full_disk_blocks_append_and_writes_nothing() {
        let store = temp_store("full_disk", roomy_guard());
        let meta = SessionMeta::new("Full", CaptureConfig::default());
        store.create_session(&meta).await.unwrap();

        // swap in a full disk by rebuilding the store over the same root
        let full = ChunkStore::open(store.root(), full_disk_guard()).unwrap();
        let err = full
            .append_screenshot(&meta.id, shot(128))
            .await
            .unwrap_err();
        assert!(matches!(err, RetraceError::InsufficientSpace { .. }));

        // neither the data file nor the metadata update landed
        let loaded = store.load_session(&meta.id).await.unwrap();
        assert!(loaded.meta.chunks.is_empty());
        assert!(!store.session_dir(&meta.id).join("shots").join("00000000.jpg").exists());

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_save_summary_requires_matching_session() {
        let store = temp_store("summary", roomy_guard());
        let meta = SessionMeta::new("Summarized", CaptureConfig::default());
        store.create_session(&meta).await.unwrap();

        let mismatched = SessionSummary::new(SessionId::from("other"), "text");
        let err = store
            .save_summary(&meta.id, &mismatched)
            .await
            .unwrap_err();
        assert!(matches!(err, RetraceError::Validation { .. }));

        let summary = SessionSummary::new(meta.id.clone(), "Reviewed the quarterly numbers.");
        store.save_summary(&meta.id, &summary).await.unwrap();

        let loaded = store.load_session(&meta.id).await.unwrap();
        assert_eq!(
            loaded.summary.unwrap().text,
            "Reviewed the quarterly numbers."
        );

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_staging_residue() {
        let store = temp_store("staging", roomy_guard());
        let mut meta = SessionMeta::new("Staged", CaptureConfig::default());
        store.create_session(&meta).await.unwrap();
        meta.status = SessionStatus::Paused;
        store.save_metadata(&meta).await.unwrap();

        let dir = store.session_dir(&meta.id);
        let residue: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(residue.is_empty());

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_delete_returns_metadata_and_removes_directory() {
        let store = temp_store("delete", roomy_guard());
        let meta = SessionMeta::new("Doomed", CaptureConfig::default());
        store.create_session(&meta).await.unwrap();
        store.append_screenshot(&meta.id, shot(32)).await.unwrap();

        let removed = store.delete_session(&meta.id).await.unwrap();
        assert_eq!(removed.id, meta.id);
        assert_eq!(removed.chunks.len(), 1);
        assert!(!store.session_dir(&meta.id).exists());

        let err = store.load_session(&meta.id).await.unwrap_err();
        assert!(matches!(err, RetraceError::SessionNotFound { .. }));

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_load_all_skips_corrupt_session_directories() {
        let store = temp_store("corrupt", roomy_guard());
        let good = SessionMeta::new("Good", CaptureConfig::default());
        store.create_session(&good).await.unwrap();

        let bad_dir = store.root().join("not-a-session");
        std::fs::create_dir_all(&bad_dir).unwrap();
        std::fs::write(bad_dir.join(META_FILE), b"{ not json").unwrap();

        let all = store.load_all_metadata().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, good.id);

        std::fs::remove_dir_all(store.root()).ok();
    }
}
