//! All-or-nothing batched writes.
//!
//! A transaction accumulates heterogeneous chunk writes (an end-of-session
//! batch typically carries the summary plus the final metadata), sums
//! their estimated sizes, and performs a single disk admission check for
//! the total. On insufficient space, zero writes occur and the error says
//! so explicitly.

use retrace_common::{RetraceError, RetraceResult};
use retrace_session_model::{
    AudioSegmentChunk, ChunkKind, ChunkRef, ScreenshotChunk, SessionId, SessionMeta,
    SessionSummary, VideoChunk,
};

use crate::store::{chunk_rel_path, estimate_write_size, ChunkStore};

/// One pending write in a transaction.
#[derive(Debug, Clone)]
pub enum StoreOp {
    SaveMetadata(SessionMeta),
    SaveSummary(SessionSummary),
    AppendScreenshot(ScreenshotChunk),
    AppendAudioSegment(AudioSegmentChunk),
    AppendVideoChunk(VideoChunk),
}

impl StoreOp {
    fn label(&self) -> &'static str {
        match self {
            StoreOp::SaveMetadata(_) => "save_metadata",
            StoreOp::SaveSummary(_) => "save_summary",
            StoreOp::AppendScreenshot(_) => "append_screenshot",
            StoreOp::AppendAudioSegment(_) => "append_audio_segment",
            StoreOp::AppendVideoChunk(_) => "append_video_chunk",
        }
    }
}

/// An ordered batch of pending chunk writes for one session.
#[derive(Debug)]
pub struct Transaction {
    session_id: SessionId,
    ops: Vec<StoreOp>,
}

impl Transaction {
    pub(crate) fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            ops: Vec::new(),
        }
    }

    /// Queue one operation. Nothing touches disk until commit.
    pub fn push(&mut self, op: StoreOp) {
        self.ops.push(op);
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl ChunkStore {
    /// Begin accumulating a batch of writes for `id`.
    pub fn begin_transaction(&self, id: &SessionId) -> Transaction {
        Transaction::new(id.clone())
    }

    /// Commit a transaction: one admission check for the batch total,
    /// then every operation applies in order, or none do.
    ///
    /// Commits against the same session are serialized; different
    /// sessions commit concurrently.
    pub async fn commit(&self, tx: Transaction) -> RetraceResult<()> {
        if tx.is_empty() {
            return Ok(());
        }

        let lock = self.session_lock(&tx.session_id);
        let _held = lock.lock().await;

        let id = tx.session_id.clone();
        let op_count = tx.ops.len();

        // current metadata, if the session already exists on disk
        let mut meta = match self.read_meta(&id).await {
            Ok(meta) => Some(meta),
            Err(RetraceError::SessionNotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        // stage every write in memory first; the metadata chunk is staged
        // last so committed refs never precede their data files
        let mut staged: Vec<(std::path::PathBuf, Vec<u8>)> = Vec::with_capacity(op_count + 1);
        let mut meta_dirty = false;
        let mut appended = false;

        for op in tx.ops {
            let label = op.label();
            match op {
                StoreOp::SaveMetadata(m) => {
                    if m.id != id {
                        return Err(RetraceError::validation(format!(
                            "{label} for {} inside a transaction on {}",
                            m.id, id
                        )));
                    }
                    if appended {
                        // a replacement here would drop refs staged above
                        return Err(RetraceError::validation(
                            "save_metadata must precede append operations in a transaction",
                        ));
                    }
                    meta = Some(m);
                    meta_dirty = true;
                }
                StoreOp::SaveSummary(s) => {
                    if s.session_id != id {
                        return Err(RetraceError::validation(format!(
                            "{label} for {} inside a transaction on {}",
                            s.session_id, id
                        )));
                    }
                    staged.push((self.summary_path(&id), serde_json::to_vec_pretty(&s)?));
                }
                StoreOp::AppendScreenshot(c) => {
                    let ext = c.format.extension();
                    stage_append(
                        &mut staged,
                        &mut meta,
                        self,
                        &id,
                        ChunkKind::Screenshot,
                        c.recorded_at,
                        ext,
                        c.data,
                    )?;
                    meta_dirty = true;
                    appended = true;
                }
                StoreOp::AppendAudioSegment(c) => {
                    stage_append(
                        &mut staged,
                        &mut meta,
                        self,
                        &id,
                        ChunkKind::AudioSegment,
                        c.recorded_at,
                        "pcm",
                        c.data,
                    )?;
                    meta_dirty = true;
                    appended = true;
                }
                StoreOp::AppendVideoChunk(c) => {
                    stage_append(
                        &mut staged,
                        &mut meta,
                        self,
                        &id,
                        ChunkKind::Video,
                        c.recorded_at,
                        "bin",
                        c.data,
                    )?;
                    meta_dirty = true;
                    appended = true;
                }
            }
        }

        if meta_dirty {
            let meta = meta
                .as_ref()
                .ok_or_else(|| RetraceError::session_not_found(id.as_str()))?;
            staged.push((self.meta_path(&id), serde_json::to_vec_pretty(meta)?));
        }

        let required: u64 = staged
            .iter()
            .fold(0u64, |acc, (_, bytes)| {
                acc.saturating_add(estimate_write_size(bytes))
            });

        if let Err(e) = self.guard().check(self.root(), required) {
            tracing::error!(
                session = %id,
                ops = op_count,
                required_bytes = required,
                error = %e,
                "transaction rejected by disk space guard; no data was written"
            );
            return Err(RetraceError::TransactionAborted {
                source: Box::new(e),
            });
        }

        let total_bytes: u64 = staged.iter().map(|(_, b)| b.len() as u64).sum();
        for (path, bytes) in &staged {
            self.write_atomic(path, bytes).await?;
        }

        tracing::info!(
            session = %id,
            ops = op_count,
            bytes = total_bytes,
            "transaction committed"
        );
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn stage_append(
    staged: &mut Vec<(std::path::PathBuf, Vec<u8>)>,
    meta: &mut Option<SessionMeta>,
    store: &ChunkStore,
    id: &SessionId,
    kind: ChunkKind,
    recorded_at: chrono::DateTime<chrono::Utc>,
    ext: &str,
    data: Vec<u8>,
) -> RetraceResult<()> {
    if data.is_empty() {
        return Err(RetraceError::validation(format!("empty {kind} payload")));
    }
    let meta = meta
        .as_mut()
        .ok_or_else(|| RetraceError::session_not_found(id.as_str()))?;

    let seq = meta.next_seq(kind);
    let rel_path = chunk_rel_path(kind, seq, ext)?;
    meta.push_chunk(ChunkRef {
        kind,
        seq,
        rel_path: rel_path.clone(),
        size_bytes: data.len() as u64,
        recorded_at,
    });
    staged.push((store.session_dir(id).join(rel_path), data));
    Ok(())
}
