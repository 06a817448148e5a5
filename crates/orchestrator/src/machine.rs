//! Session lifecycle state machine.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use retrace_common::{RetraceError, RetraceResult, SessionClock};
use retrace_index::IndexManager;
use retrace_session_model::{
    CapabilityKind, SessionId, SessionMeta, SessionStatus, SessionSummary,
};
use retrace_store::{ChunkStore, StoreOp};

use crate::capability::{CaptureCapability, CaptureEvent};
use crate::summarize::SummaryBackend;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle phase of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachinePhase {
    Idle,
    Starting,
    Recording,
    Paused,
    Stopping,
    Error,
}

/// Why the machine entered the error phase, and from where.
pub struct ErrorContext {
    /// The phase the failed transition was driving.
    pub failed_from: MachinePhase,

    /// The failing capability, when one caused the error.
    pub capability: Option<CapabilityKind>,

    /// Rendered cause.
    pub message: String,

    pub(crate) meta: Option<SessionMeta>,
    pub(crate) summary: Option<SessionSummary>,
}

impl std::fmt::Debug for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorContext")
            .field("failed_from", &self.failed_from)
            .field("capability", &self.capability)
            .field("message", &self.message)
            .finish()
    }
}

/// Result of a completed session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: SessionId,

    /// Wall-clock duration of the session.
    pub duration_secs: f64,

    /// Streams that suffered non-fatal failures and kept degraded.
    pub degraded: Vec<CapabilityKind>,

    /// Streams that missed the stop deadline and were force-terminated.
    pub force_terminated: Vec<CapabilityKind>,
}

struct ActiveSession {
    meta: SessionMeta,
    capabilities: Vec<Box<dyn CaptureCapability>>,
    events_tx: mpsc::Sender<CaptureEvent>,
    pump: JoinHandle<()>,
    degraded: Arc<StdMutex<HashSet<CapabilityKind>>>,
    clock: SessionClock,
}

/// The single source of truth for what should currently be running.
///
/// Owns the active session context explicitly; there is no ambient
/// singleton. Store and index calls all flow through this machine.
pub struct SessionOrchestrator {
    store: Arc<ChunkStore>,
    index: IndexManager,
    stop_timeout: Duration,
    summarizer: Option<Box<dyn SummaryBackend>>,
    phase: MachinePhase,
    active: Option<ActiveSession>,
    error: Option<ErrorContext>,
}

impl SessionOrchestrator {
    pub fn new(store: Arc<ChunkStore>, index: IndexManager, stop_timeout: Duration) -> Self {
        Self {
            store,
            index,
            stop_timeout,
            summarizer: None,
            phase: MachinePhase::Idle,
            active: None,
            error: None,
        }
    }

    /// Attach a summary backend used when stop is not handed a summary.
    pub fn with_summarizer(mut self, backend: Box<dyn SummaryBackend>) -> Self {
        self.summarizer = Some(backend);
        self
    }

    pub fn phase(&self) -> MachinePhase {
        self.phase
    }

    pub fn error_context(&self) -> Option<&ErrorContext> {
        self.error.as_ref()
    }

    /// Metadata of the session currently owned by the machine.
    pub fn current_session(&self) -> Option<&SessionMeta> {
        self.active.as_ref().map(|a| &a.meta)
    }

    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    /// Load the full catalog from the store and rebuild the index from
    /// it. Startup / recovery entry point.
    pub async fn load_catalog(&self) -> RetraceResult<Vec<SessionMeta>> {
        let metas = self.store.load_all_metadata().await?;
        self.index.rebuild(&metas);
        Ok(metas)
    }

    /// Start a new session: persist the initial metadata chunk, then fan
    /// out start commands to every enabled capability in parallel.
    pub async fn start(
        &mut self,
        meta: SessionMeta,
        capabilities: Vec<Box<dyn CaptureCapability>>,
    ) -> RetraceResult<()> {
        if self.phase != MachinePhase::Idle {
            return Err(RetraceError::validation(format!(
                "cannot start a session from the {:?} phase",
                self.phase
            )));
        }
        self.phase = MachinePhase::Starting;
        tracing::info!(session = %meta.id, title = %meta.title, "starting session");

        if let Err(e) = self.store.create_session(&meta).await {
            return Err(self
                .enter_error(MachinePhase::Starting, None, e, Some(meta), None)
                .await);
        }
        self.index.schedule_update(meta.clone(), None).applied().await;

        self.launch_capabilities(meta, capabilities).await
    }

    /// Pause: suspend every capability without discarding session state.
    /// Capability pause failures degrade the stream, never the session.
    pub async fn pause(&mut self) -> RetraceResult<()> {
        if self.phase != MachinePhase::Recording {
            return Err(RetraceError::validation(format!(
                "cannot pause from the {:?} phase",
                self.phase
            )));
        }

        let (id, degraded) = {
            let active = self
                .active
                .as_mut()
                .ok_or_else(|| RetraceError::validation("recording without an active session"))?;

            let results = join_all(
                active
                    .capabilities
                    .iter_mut()
                    .map(|cap| async move { (cap.kind(), cap.pause().await) }),
            )
            .await;
            for (kind, result) in results {
                if let Err(e) = result {
                    tracing::warn!(capability = %kind, error = %e, "pause failed; stream degraded");
                    lock_set(&active.degraded).insert(kind);
                }
            }

            (active.meta.id.clone(), sorted_kinds(&active.degraded))
        };

        let fresh = match self
            .store
            .update_metadata(&id, |m| {
                m.status = SessionStatus::Paused;
                for kind in &degraded {
                    m.mark_degraded(*kind);
                }
            })
            .await
        {
            Ok(fresh) => fresh,
            Err(e) => {
                let snapshot = self.active.as_ref().map(|a| a.meta.clone());
                return Err(self
                    .enter_error(MachinePhase::Recording, None, e, snapshot, None)
                    .await);
            }
        };
        if let Some(active) = self.active.as_mut() {
            active.meta = fresh.clone();
        }
        self.index.schedule_update(fresh, None).applied().await;
        self.phase = MachinePhase::Paused;
        tracing::info!("session paused");
        Ok(())
    }

    /// Resume: re-invoke the capability fan-out. Failures are classified
    /// per capability so only the failing stream is disabled.
    pub async fn resume(&mut self) -> RetraceResult<()> {
        if self.phase != MachinePhase::Paused {
            return Err(RetraceError::validation(format!(
                "cannot resume from the {:?} phase",
                self.phase
            )));
        }

        let (id, degraded) = {
            let active = self
                .active
                .as_mut()
                .ok_or_else(|| RetraceError::validation("paused without an active session"))?;

            let results = join_all(
                active
                    .capabilities
                    .iter_mut()
                    .map(|cap| async move { (cap.kind(), cap.resume().await) }),
            )
            .await;
            for (kind, result) in results {
                if let Err(e) = result {
                    tracing::warn!(
                        capability = %kind,
                        error = %e,
                        "resume failed; stream disabled, others continue"
                    );
                    lock_set(&active.degraded).insert(kind);
                }
            }

            (active.meta.id.clone(), sorted_kinds(&active.degraded))
        };

        let fresh = match self
            .store
            .update_metadata(&id, |m| {
                m.status = SessionStatus::Recording;
                for kind in &degraded {
                    m.mark_degraded(*kind);
                }
            })
            .await
        {
            Ok(fresh) => fresh,
            Err(e) => {
                let snapshot = self.active.as_ref().map(|a| a.meta.clone());
                return Err(self
                    .enter_error(MachinePhase::Paused, None, e, snapshot, None)
                    .await);
            }
        };
        if let Some(active) = self.active.as_mut() {
            active.meta = fresh.clone();
        }
        self.index.schedule_update(fresh, None).applied().await;
        self.phase = MachinePhase::Recording;
        tracing::info!("session resumed");
        Ok(())
    }

    /// Stop: signal every capability to finish, bounded by the stop
    /// timeout, then commit the final transaction (summary + metadata).
    ///
    /// Capabilities that miss the deadline are force-terminated and the
    /// outcome records them; the stop itself proceeds.
    pub async fn stop(&mut self, summary: Option<SessionSummary>) -> RetraceResult<SessionOutcome> {
        if self.phase != MachinePhase::Recording && self.phase != MachinePhase::Paused {
            return Err(RetraceError::validation(format!(
                "cannot stop from the {:?} phase",
                self.phase
            )));
        }
        let mut active = self
            .active
            .take()
            .ok_or_else(|| RetraceError::validation("stopping without an active session"))?;
        self.phase = MachinePhase::Stopping;
        let id = active.meta.id.clone();
        tracing::info!(session = %id, "stopping session");

        let stop_timeout = self.stop_timeout;
        let results = join_all(active.capabilities.iter_mut().map(|cap| async move {
            let kind = cap.kind();
            match tokio::time::timeout(stop_timeout, cap.stop()).await {
                Ok(result) => (kind, Some(result)),
                Err(_elapsed) => (kind, None),
            }
        }))
        .await;

        let mut force_terminated = Vec::new();
        for (kind, result) in results {
            match result {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    tracing::warn!(capability = %kind, error = %e, "stop failed; stream degraded");
                    lock_set(&active.degraded).insert(kind);
                }
                None => {
                    let e = RetraceError::capability_timeout(kind, stop_timeout.as_millis() as u64);
                    tracing::warn!(capability = %kind, error = %e, "force-terminating capability");
                    force_terminated.push(kind);
                }
            }
        }

        // dropping the handles force-terminates stragglers and closes the
        // event channel; the pump drains what already arrived
        drop(active.capabilities);
        drop(active.events_tx);
        if let Err(e) = active.pump.await {
            tracing::warn!(error = %e, "event pump join failed");
        }

        // reload: the pump appended chunk refs to the persisted metadata
        let mut meta = match self.store.load_session(&id).await {
            Ok(stored) => stored.meta,
            Err(e) => {
                return Err(self
                    .enter_error(MachinePhase::Stopping, None, e, None, summary)
                    .await)
            }
        };
        meta.status = SessionStatus::Completed;
        meta.ended_at = Some(Utc::now());
        for kind in lock_set(&active.degraded).iter() {
            meta.mark_degraded(*kind);
        }
        meta.force_terminated = force_terminated.clone();
        let degraded = meta.degraded_streams.clone();

        let summary = summary.or_else(|| {
            self.summarizer
                .as_ref()
                .map(|backend| backend.summarize(&meta))
        });

        self.commit_final(meta, summary).await?;

        let outcome = SessionOutcome {
            session_id: id,
            duration_secs: active.clock.elapsed_secs(),
            degraded,
            force_terminated,
        };
        tracing::info!(
            session = %outcome.session_id,
            duration_secs = outcome.duration_secs,
            degraded = outcome.degraded.len(),
            force_terminated = outcome.force_terminated.len(),
            "session stopped"
        );
        Ok(outcome)
    }

    /// Re-run the failed transition with fresh capability handles (the
    /// old ones were cleared on error entry). A failed final commit is
    /// retried without capabilities.
    pub async fn retry(
        &mut self,
        capabilities: Vec<Box<dyn CaptureCapability>>,
    ) -> RetraceResult<()> {
        if self.phase != MachinePhase::Error {
            return Err(RetraceError::validation(format!(
                "cannot retry from the {:?} phase",
                self.phase
            )));
        }
        let ctx = self
            .error
            .take()
            .ok_or_else(|| RetraceError::validation("error phase without context"))?;
        tracing::info!(failed_from = ?ctx.failed_from, "retrying failed transition");

        match ctx.failed_from {
            MachinePhase::Stopping => {
                let meta = ctx.meta.ok_or_else(|| {
                    RetraceError::validation("no session context to retry the final commit")
                })?;
                self.phase = MachinePhase::Stopping;
                self.commit_final(meta, ctx.summary).await
            }
            MachinePhase::Starting | MachinePhase::Recording | MachinePhase::Paused => {
                let meta = ctx
                    .meta
                    .ok_or_else(|| RetraceError::validation("no session context to retry"))?;
                self.phase = MachinePhase::Starting;

                // pick up whatever landed on disk before the failure; the
                // session may not exist at all if creation itself failed
                let fresh = match self
                    .store
                    .update_metadata(&meta.id, |m| m.status = SessionStatus::Recording)
                    .await
                {
                    Ok(fresh) => fresh,
                    Err(RetraceError::SessionNotFound { .. }) => {
                        let mut created = meta.clone();
                        created.status = SessionStatus::Recording;
                        if let Err(e) = self.store.create_session(&created).await {
                            return Err(self
                                .enter_error(ctx.failed_from, None, e, Some(meta), None)
                                .await);
                        }
                        created
                    }
                    Err(e) => {
                        return Err(self
                            .enter_error(ctx.failed_from, None, e, Some(meta), None)
                            .await);
                    }
                };
                self.index
                    .schedule_update(fresh.clone(), None)
                    .applied()
                    .await;
                self.launch_capabilities(fresh, capabilities).await?;

                if ctx.failed_from == MachinePhase::Paused {
                    self.pause().await?;
                }
                Ok(())
            }
            other => Err(RetraceError::validation(format!(
                "nothing to retry for the {other:?} phase"
            ))),
        }
    }

    /// Leave the error phase without retrying. The session on disk keeps
    /// its failed status.
    pub fn dismiss(&mut self) -> RetraceResult<()> {
        if self.phase != MachinePhase::Error {
            return Err(RetraceError::validation(format!(
                "cannot dismiss from the {:?} phase",
                self.phase
            )));
        }
        self.error = None;
        self.phase = MachinePhase::Idle;
        tracing::info!("error dismissed");
        Ok(())
    }

    /// Delete a session from the store and remove its index entry within
    /// the same logical operation.
    pub async fn delete_session(&self, id: &SessionId) -> RetraceResult<SessionMeta> {
        if self.active.as_ref().map(|a| &a.meta.id) == Some(id) {
            return Err(RetraceError::validation(format!(
                "session {id} is currently active"
            )));
        }
        let meta = self.store.delete_session(id).await?;
        self.index.schedule_remove(id.clone()).applied().await;
        Ok(meta)
    }

    // Internal helpers

    /// Fan out `start` to every enabled capability and transition to
    /// recording. Any start failure is fatal and names the capability.
    async fn launch_capabilities(
        &mut self,
        meta: SessionMeta,
        mut capabilities: Vec<Box<dyn CaptureCapability>>,
    ) -> RetraceResult<()> {
        capabilities.retain(|cap| {
            let enabled = meta.capture.is_enabled(cap.kind());
            if !enabled {
                tracing::debug!(capability = %cap.kind(), "capability disabled by capture config");
            }
            enabled
        });

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let results = join_all(capabilities.iter_mut().map(|cap| {
            let tx = events_tx.clone();
            let config = meta.capture.clone();
            async move { (cap.kind(), cap.start(&config, tx).await) }
        }))
        .await;

        let mut failed = None;
        for (kind, result) in results {
            if let Err(e) = result {
                tracing::error!(capability = %kind, error = %e, "capability failed to start");
                failed.get_or_insert(kind);
            }
        }
        if let Some(kind) = failed {
            // wind down whatever did start before surfacing the error,
            // bounded so a hung stream cannot wedge error entry
            let stop_timeout = self.stop_timeout;
            join_all(
                capabilities
                    .iter_mut()
                    .map(|cap| tokio::time::timeout(stop_timeout, cap.stop())),
            )
            .await;
            let err = RetraceError::capability_start(kind);
            return Err(self
                .enter_error(MachinePhase::Starting, Some(kind), err, Some(meta), None)
                .await);
        }

        let degraded = Arc::new(StdMutex::new(HashSet::new()));
        let pump = tokio::spawn(run_event_pump(
            self.store.clone(),
            meta.id.clone(),
            events_rx,
            degraded.clone(),
        ));
        self.active = Some(ActiveSession {
            meta,
            capabilities,
            events_tx,
            pump,
            degraded,
            clock: SessionClock::start(),
        });
        self.phase = MachinePhase::Recording;
        tracing::info!("session recording");
        Ok(())
    }

    /// Commit the end-of-session batch and publish the index update.
    async fn commit_final(
        &mut self,
        meta: SessionMeta,
        summary: Option<SessionSummary>,
    ) -> RetraceResult<()> {
        let summary_text = summary.as_ref().map(|s| s.text.clone());

        let mut tx = self.store.begin_transaction(&meta.id);
        tx.push(StoreOp::SaveMetadata(meta.clone()));
        if let Some(s) = summary.clone() {
            tx.push(StoreOp::SaveSummary(s));
        }
        if let Err(e) = self.store.commit(tx).await {
            return Err(self
                .enter_error(MachinePhase::Stopping, None, e, Some(meta), summary)
                .await);
        }

        self.index
            .schedule_update(meta, summary_text)
            .applied()
            .await;
        self.phase = MachinePhase::Idle;
        Ok(())
    }

    /// Enter the error phase: clear the capability handles so stale
    /// handles never survive recovery, record the session as failed on
    /// disk (best effort), and keep enough context to retry.
    async fn enter_error(
        &mut self,
        failed_from: MachinePhase,
        capability: Option<CapabilityKind>,
        error: RetraceError,
        meta: Option<SessionMeta>,
        summary: Option<SessionSummary>,
    ) -> RetraceError {
        if let Some(active) = self.active.take() {
            drop(active.capabilities);
            drop(active.events_tx);
            if let Err(e) = active.pump.await {
                tracing::warn!(error = %e, "event pump join failed during error entry");
            }
        }

        // a validation failure means the session on disk was never ours
        // to write; do not clobber it with a failed status
        let record_failed = !matches!(error, RetraceError::Validation { .. });
        if let (Some(meta), true) = (&meta, record_failed) {
            match self
                .store
                .update_metadata(&meta.id, |m| m.status = SessionStatus::Failed)
                .await
            {
                Ok(failed_meta) => {
                    self.index
                        .schedule_update(failed_meta, None)
                        .applied()
                        .await;
                }
                Err(e) => {
                    tracing::warn!(session = %meta.id, error = %e, "could not record failed status");
                }
            }
        }

        tracing::error!(?failed_from, error = %error, "entering error phase");
        self.error = Some(ErrorContext {
            failed_from,
            capability,
            message: error.to_string(),
            meta,
            summary,
        });
        self.phase = MachinePhase::Error;
        error
    }
}

/// Drain the capture event channel into the store. Append failures are
/// non-fatal: the stream is marked degraded and the session continues.
async fn run_event_pump(
    store: Arc<ChunkStore>,
    id: SessionId,
    mut events: mpsc::Receiver<CaptureEvent>,
    degraded: Arc<StdMutex<HashSet<CapabilityKind>>>,
) {
    while let Some(event) = events.recv().await {
        let kind = event.kind();
        let result = match event {
            CaptureEvent::Screenshot(chunk) => {
                store.append_screenshot(&id, chunk).await.map(|_| ())
            }
            CaptureEvent::Audio(chunk) => {
                store.append_audio_segment(&id, chunk).await.map(|_| ())
            }
            CaptureEvent::Video(chunk) => store.append_video_chunk(&id, chunk).await.map(|_| ()),
        };
        if let Err(e) = result {
            let newly_degraded = lock_set(&degraded).insert(kind);
            if newly_degraded {
                tracing::warn!(
                    session = %id,
                    capability = %kind,
                    error = %e,
                    "chunk append failed; stream degraded, session continues"
                );
            } else {
                tracing::debug!(
                    session = %id,
                    capability = %kind,
                    error = %e,
                    "append failed on already-degraded stream"
                );
            }
        }
    }
}

fn lock_set(
    set: &Arc<StdMutex<HashSet<CapabilityKind>>>,
) -> std::sync::MutexGuard<'_, HashSet<CapabilityKind>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn sorted_kinds(set: &Arc<StdMutex<HashSet<CapabilityKind>>>) -> Vec<CapabilityKind> {
    let mut kinds: Vec<_> = lock_set(set).iter().copied().collect();
    kinds.sort_by_key(|k| *k as u8);
    kinds
}
