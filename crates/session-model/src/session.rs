//! Session metadata and capture configuration types.
//!
//! A session is the top-level container for one recording: which streams
//! were enabled, when it ran, and which chunks were committed for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkKind, ChunkRef};

/// Unique session identifier (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid_v4())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Actively recording.
    Recording,
    /// Paused, resumable.
    Paused,
    /// Finished cleanly.
    Completed,
    /// Ended in an unrecovered error.
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Recording => "recording",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// An independent capture stream managed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Screenshot,
    Audio,
    Video,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CapabilityKind::Screenshot => "screenshot",
            CapabilityKind::Audio => "audio",
            CapabilityKind::Video => "video",
        };
        f.write_str(s)
    }
}

/// Quality profile for capture streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityProfile {
    Low,
    #[default]
    Standard,
    High,
}

impl QualityProfile {
    /// Default seconds between screenshots for this profile.
    pub fn screenshot_interval_secs(&self) -> u32 {
        match self {
            QualityProfile::Low => 30,
            QualityProfile::Standard => 10,
            QualityProfile::High => 3,
        }
    }

    /// JPEG quality for screenshot encoding.
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            QualityProfile::Low => 50,
            QualityProfile::Standard => 75,
            QualityProfile::High => 92,
        }
    }

    /// Audio sample rate.
    pub fn audio_sample_rate(&self) -> u32 {
        match self {
            QualityProfile::Low => 16_000,
            QualityProfile::Standard => 44_100,
            QualityProfile::High => 48_000,
        }
    }
}

/// Which streams a session captures, and at what quality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture periodic screenshots.
    pub screenshots: bool,

    /// Capture audio segments.
    pub audio: bool,

    /// Capture video chunks.
    pub video: bool,

    /// Quality profile.
    pub quality: QualityProfile,

    /// Seconds between screenshots.
    pub screenshot_interval_secs: u32,

    /// Audio sample rate.
    pub audio_sample_rate: u32,
}

impl CaptureConfig {
    /// Build a config for a quality profile with its default cadence.
    pub fn for_quality(quality: QualityProfile) -> Self {
        Self {
            screenshots: true,
            audio: true,
            video: false,
            quality,
            screenshot_interval_secs: quality.screenshot_interval_secs(),
            audio_sample_rate: quality.audio_sample_rate(),
        }
    }

    /// The capability kinds enabled by this configuration, in fan-out order.
    pub fn enabled_capabilities(&self) -> Vec<CapabilityKind> {
        let mut kinds = Vec::new();
        if self.screenshots {
            kinds.push(CapabilityKind::Screenshot);
        }
        if self.audio {
            kinds.push(CapabilityKind::Audio);
        }
        if self.video {
            kinds.push(CapabilityKind::Video);
        }
        kinds
    }

    /// Whether a capability kind is enabled.
    pub fn is_enabled(&self, kind: CapabilityKind) -> bool {
        match kind {
            CapabilityKind::Screenshot => self.screenshots,
            CapabilityKind::Audio => self.audio,
            CapabilityKind::Video => self.video,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::for_quality(QualityProfile::Standard)
    }
}

/// Session metadata, the payload of the metadata chunk (`meta.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Schema version.
    pub schema_version: String,

    /// Unique session identifier.
    pub id: SessionId,

    /// Human-readable title.
    pub title: String,

    /// Free-form notes.
    #[serde(default)]
    pub notes: String,

    /// Lifecycle status.
    pub status: SessionStatus,

    /// Capture configuration used for this session.
    pub capture: CaptureConfig,

    /// When recording started.
    pub started_at: DateTime<Utc>,

    /// When recording ended (`None` while live).
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,

    /// Ordered committed chunk references.
    #[serde(default)]
    pub chunks: Vec<ChunkRef>,

    /// Searchable tags.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Category classification.
    #[serde(default)]
    pub category: String,

    /// Sub-category classification.
    #[serde(default)]
    pub subcategory: String,

    /// Streams that suffered non-fatal failures during the session.
    #[serde(default)]
    pub degraded_streams: Vec<CapabilityKind>,

    /// Streams that missed the stop deadline and were force-terminated.
    #[serde(default)]
    pub force_terminated: Vec<CapabilityKind>,
}

impl SessionMeta {
    /// Create metadata for a new session starting now.
    pub fn new(title: impl Into<String>, capture: CaptureConfig) -> Self {
        Self {
            schema_version: "1.0".to_string(),
            id: SessionId::generate(),
            title: title.into(),
            notes: String::new(),
            status: SessionStatus::Recording,
            capture,
            started_at: Utc::now(),
            ended_at: None,
            chunks: Vec::new(),
            tags: Vec::new(),
            category: String::new(),
            subcategory: String::new(),
            degraded_streams: Vec::new(),
            force_terminated: Vec::new(),
        }
    }

    /// Next sequence number for a chunk kind (committed chunks only).
    pub fn next_seq(&self, kind: ChunkKind) -> u64 {
        self.chunks
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.seq + 1)
            .max()
            .unwrap_or(0)
    }

    /// Whether a chunk of this kind and sequence is already committed.
    pub fn has_chunk(&self, kind: ChunkKind, seq: u64) -> bool {
        self.chunks.iter().any(|c| c.kind == kind && c.seq == seq)
    }

    /// Record a committed chunk reference.
    pub fn push_chunk(&mut self, chunk_ref: ChunkRef) {
        self.chunks.push(chunk_ref);
    }

    /// Record a stream as degraded. Each stream is recorded once.
    pub fn mark_degraded(&mut self, kind: CapabilityKind) {
        if !self.degraded_streams.contains(&kind) {
            self.degraded_streams.push(kind);
        }
    }

    /// Session duration in seconds, if it has ended.
    pub fn duration_secs(&self) -> Option<f64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// Generate a simple UUID v4 without external dependency.
fn uuid_v4() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let hi = (seed >> 64) as u64 ^ 0x9e37_79b9_7f4a_7c15;
    let lo = seed as u64;
    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        (lo & 0xFFFF_FFFF) as u32,
        ((lo >> 32) & 0xFFFF) as u16,
        ((lo >> 48) & 0x0FFF) as u16,
        (0x8000 | (hi & 0x3FFF)) as u16,
        hi >> 16,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_recording() {
        let meta = SessionMeta::new("Standup notes", CaptureConfig::default());
        assert_eq!(meta.status, SessionStatus::Recording);
        assert!(meta.ended_at.is_none());
        assert!(meta.chunks.is_empty());
        assert!(!meta.id.as_str().is_empty());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::generate();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = SessionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_next_seq_per_kind() {
        let mut meta = SessionMeta::new("Seq test", CaptureConfig::default());
        assert_eq!(meta.next_seq(ChunkKind::Screenshot), 0);

        meta.push_chunk(ChunkRef {
            kind: ChunkKind::Screenshot,
            seq: 0,
            rel_path: "shots/00000000.jpg".to_string(),
            size_bytes: 100,
            recorded_at: Utc::now(),
        });
        meta.push_chunk(ChunkRef {
            kind: ChunkKind::Screenshot,
            seq: 1,
            rel_path: "shots/00000001.jpg".to_string(),
            size_bytes: 100,
            recorded_at: Utc::now(),
        });

        assert_eq!(meta.next_seq(ChunkKind::Screenshot), 2);
        assert_eq!(meta.next_seq(ChunkKind::AudioSegment), 0);
        assert!(meta.has_chunk(ChunkKind::Screenshot, 1));
        assert!(!meta.has_chunk(ChunkKind::AudioSegment, 0));
    }

    #[test]
    fn test_enabled_capabilities_follow_config() {
        let mut config = CaptureConfig::default();
        config.video = true;
        config.audio = false;
        assert_eq!(
            config.enabled_capabilities(),
            vec![CapabilityKind::Screenshot, CapabilityKind::Video]
        );
        assert!(!config.is_enabled(CapabilityKind::Audio));
    }

    #[test]
    fn test_mark_degraded_is_idempotent() {
        let mut meta = SessionMeta::new("Degrade", CaptureConfig::default());
        meta.mark_degraded(CapabilityKind::Screenshot);
        meta.mark_degraded(CapabilityKind::Screenshot);
        assert_eq!(meta.degraded_streams, vec![CapabilityKind::Screenshot]);
    }

    #[test]
    fn test_metadata_serialization_roundtrip() {
        let meta = SessionMeta::new("Roundtrip", CaptureConfig::for_quality(QualityProfile::High));
        let json = serde_json::to_string_pretty(&meta).unwrap();
        let parsed: SessionMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, meta.id);
        assert_eq!(parsed.capture.quality, QualityProfile::High);
        assert_eq!(parsed.schema_version, "1.0");
    }

    #[test]
    fn test_deserialization_defaults_optional_fields_for_legacy_files() {
        let mut value = serde_json::to_value(SessionMeta::new(
            "Legacy",
            CaptureConfig::default(),
        ))
        .unwrap();

        let obj = value.as_object_mut().expect("meta should be object");
        for key in [
            "notes",
            "ended_at",
            "chunks",
            "tags",
            "category",
            "subcategory",
            "degraded_streams",
            "force_terminated",
        ] {
            obj.remove(key);
        }

        let parsed: SessionMeta = serde_json::from_value(value).unwrap();
        assert!(parsed.chunks.is_empty());
        assert!(parsed.degraded_streams.is_empty());
        assert_eq!(parsed.category, "");
        assert!(parsed.ended_at.is_none());
    }
}
