//! Chunk types: independently persisted units of session data.
//!
//! Metadata and summary chunks are authoritative JSON documents; screenshot,
//! audio, and video chunks are opaque payload bytes with a small envelope.
//! Size estimates are deterministic and deliberately overestimate so that
//! disk admission checks keep a conservative margin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Fixed per-file allowance added to every size estimate, covering
/// filesystem metadata and envelope bytes.
pub const CHUNK_FILE_OVERHEAD_BYTES: u64 = 4096;

/// Kind of a persisted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Metadata,
    Summary,
    Screenshot,
    AudioSegment,
    Video,
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChunkKind::Metadata => "metadata",
            ChunkKind::Summary => "summary",
            ChunkKind::Screenshot => "screenshot",
            ChunkKind::AudioSegment => "audio_segment",
            ChunkKind::Video => "video",
        };
        f.write_str(s)
    }
}

/// Reference to a committed chunk, recorded in the metadata chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Chunk kind.
    pub kind: ChunkKind,

    /// Per-kind sequence number.
    pub seq: u64,

    /// Path relative to the session directory.
    pub rel_path: String,

    /// Committed payload size in bytes.
    pub size_bytes: u64,

    /// When the chunk was captured.
    pub recorded_at: DateTime<Utc>,
}

/// Screenshot image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl ImageFormat {
    /// File extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

/// A captured screenshot frame.
#[derive(Debug, Clone)]
pub struct ScreenshotChunk {
    /// Capture timestamp.
    pub recorded_at: DateTime<Utc>,

    /// Image encoding of the payload.
    pub format: ImageFormat,

    /// Encoded image bytes.
    pub data: Vec<u8>,
}

impl ScreenshotChunk {
    /// Conservative size estimate for disk admission checks.
    pub fn estimated_size(&self) -> u64 {
        self.data.len() as u64 + CHUNK_FILE_OVERHEAD_BYTES
    }
}

/// A captured audio segment.
#[derive(Debug, Clone)]
pub struct AudioSegmentChunk {
    /// Capture timestamp (segment start).
    pub recorded_at: DateTime<Utc>,

    /// Segment duration in milliseconds.
    pub duration_ms: u64,

    /// Sample rate of the payload.
    pub sample_rate: u32,

    /// Encoded audio bytes.
    pub data: Vec<u8>,
}

impl AudioSegmentChunk {
    /// Conservative size estimate for disk admission checks.
    pub fn estimated_size(&self) -> u64 {
        self.data.len() as u64 + CHUNK_FILE_OVERHEAD_BYTES
    }
}

/// A captured video chunk.
#[derive(Debug, Clone)]
pub struct VideoChunk {
    /// Capture timestamp (chunk start).
    pub recorded_at: DateTime<Utc>,

    /// Chunk duration in milliseconds.
    pub duration_ms: u64,

    /// Encoded video bytes.
    pub data: Vec<u8>,
}

impl VideoChunk {
    /// Conservative size estimate for disk admission checks.
    pub fn estimated_size(&self) -> u64 {
        self.data.len() as u64 + CHUNK_FILE_OVERHEAD_BYTES
    }
}

/// Derived session summary, the payload of the summary chunk
/// (`summary.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Owning session.
    pub session_id: SessionId,

    /// When the summary was generated.
    pub generated_at: DateTime<Utc>,

    /// Summary text.
    pub text: String,

    /// Notable moments pulled out of the session.
    #[serde(default)]
    pub highlights: Vec<String>,

    /// Name of the backend that produced the summary.
    #[serde(default)]
    pub model: String,
}

impl SessionSummary {
    pub fn new(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            generated_at: Utc::now(),
            text: text.into(),
            highlights: Vec::new(),
            model: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimates_overestimate_payload() {
        let shot = ScreenshotChunk {
            recorded_at: Utc::now(),
            format: ImageFormat::Jpeg,
            data: vec![0u8; 1500],
        };
        assert!(shot.estimated_size() > 1500);
        assert_eq!(shot.estimated_size(), 1500 + CHUNK_FILE_OVERHEAD_BYTES);

        let audio = AudioSegmentChunk {
            recorded_at: Utc::now(),
            duration_ms: 5000,
            sample_rate: 48000,
            data: vec![0u8; 96000],
        };
        assert_eq!(audio.estimated_size(), 96000 + CHUNK_FILE_OVERHEAD_BYTES);
    }

    #[test]
    fn test_image_format_extensions() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Png.extension(), "png");
    }

    #[test]
    fn test_summary_serialization_roundtrip() {
        let summary = SessionSummary::new(SessionId::from("abc"), "Worked on the parser.");
        let json = serde_json::to_string(&summary).unwrap();
        let parsed: SessionSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.session_id, SessionId::from("abc"));
        assert_eq!(parsed.text, "Worked on the parser.");
    }

    #[test]
    fn test_chunk_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&ChunkKind::AudioSegment).unwrap(),
            "\"audio_segment\""
        );
        assert_eq!(ChunkKind::Screenshot.to_string(), "screenshot");
    }
}
