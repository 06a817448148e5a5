//! Capture capability interface and event channel types.
//!
//! Each capture stream (screenshot, audio, video) is an independently
//! owned capability handle. Capabilities emit their data on an event
//! channel; the orchestrator is the only consumer and forwards chunks
//! into the store.

use tokio::sync::mpsc;

use retrace_common::RetraceResult;
use retrace_session_model::{
    AudioSegmentChunk, CapabilityKind, CaptureConfig, ScreenshotChunk, VideoChunk,
};

/// Data emitted by a capture capability.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Screenshot(ScreenshotChunk),
    Audio(AudioSegmentChunk),
    Video(VideoChunk),
}

impl CaptureEvent {
    /// The stream this event belongs to.
    pub fn kind(&self) -> CapabilityKind {
        match self {
            CaptureEvent::Screenshot(_) => CapabilityKind::Screenshot,
            CaptureEvent::Audio(_) => CapabilityKind::Audio,
            CaptureEvent::Video(_) => CapabilityKind::Video,
        }
    }
}

/// Abstract interface for one capture stream.
///
/// Implementations wrap the platform capture backends. The orchestrator
/// fans commands out to every enabled capability in parallel and joins
/// on their completion before advancing state.
#[async_trait::async_trait]
pub trait CaptureCapability: Send {
    /// Which stream this capability captures.
    fn kind(&self) -> CapabilityKind;

    /// Begin capturing, emitting data on `events`.
    async fn start(
        &mut self,
        config: &CaptureConfig,
        events: mpsc::Sender<CaptureEvent>,
    ) -> RetraceResult<()>;

    /// Suspend capture without discarding stream state.
    async fn pause(&mut self) -> RetraceResult<()>;

    /// Resume a paused stream.
    async fn resume(&mut self) -> RetraceResult<()>;

    /// Finish capturing and flush. The orchestrator bounds the wait; a
    /// capability that does not return in time is force-terminated by
    /// dropping its handle. Must tolerate being called on a stream that
    /// never started (wind-down of a partially started fan-out).
    async fn stop(&mut self) -> RetraceResult<()>;
}
