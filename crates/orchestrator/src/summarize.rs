//! Pluggable summary generation.
//!
//! Stop commits a summary chunk even when the caller does not supply
//! one. The backend is a polymorphic interface with named variants
//! selected by configuration at construction time; only the
//! deterministic extractive variant ships here, richer enrichment
//! backends plug in at the same seam.

use retrace_session_model::{tokenize, SessionMeta, SessionSummary};

/// Named summary backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryBackendKind {
    /// Deterministic keyword extraction over the session notes.
    Extractive,
}

impl SummaryBackendKind {
    /// Parse a configured backend name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "extractive" => Some(Self::Extractive),
            _ => None,
        }
    }
}

/// Construct the configured backend.
pub fn backend_for(kind: SummaryBackendKind) -> Box<dyn SummaryBackend> {
    match kind {
        SummaryBackendKind::Extractive => Box::new(ExtractiveSummarizer::default()),
    }
}

/// Produces the summary chunk for a finished session.
pub trait SummaryBackend: Send + Sync {
    /// Backend name recorded on the summary.
    fn name(&self) -> &'static str;

    /// Summarize a finished session from its metadata.
    fn summarize(&self, meta: &SessionMeta) -> SessionSummary;
}

/// Deterministic extractive summarizer: scores sentences in the session
/// notes by keyword frequency and keeps the strongest ones as
/// highlights.
pub struct ExtractiveSummarizer {
    max_highlights: usize,
}

impl ExtractiveSummarizer {
    pub fn new(max_highlights: usize) -> Self {
        Self { max_highlights }
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(3)
    }
}

impl SummaryBackend for ExtractiveSummarizer {
    fn name(&self) -> &'static str {
        "extractive"
    }

    fn summarize(&self, meta: &SessionMeta) -> SessionSummary {
        let sentences: Vec<&str> = meta
            .notes
            .split(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let mut freq = std::collections::HashMap::new();
        for sentence in &sentences {
            for token in tokenize(sentence) {
                *freq.entry(token).or_insert(0u32) += 1;
            }
        }

        let mut scored: Vec<(u32, usize, &str)> = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let score = tokenize(s).iter().map(|t| freq.get(t).copied().unwrap_or(0)).sum();
                (score, i, *s)
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut highlights: Vec<(usize, String)> = scored
            .into_iter()
            .take(self.max_highlights)
            .map(|(_, i, s)| (i, s.to_string()))
            .collect();
        // present highlights in session order, not score order
        highlights.sort_by_key(|(i, _)| *i);

        let text = match sentences.first() {
            Some(first) => format!("{}: {}.", meta.title, first),
            None => meta.title.clone(),
        };

        let mut summary = SessionSummary::new(meta.id.clone(), text);
        summary.highlights = highlights.into_iter().map(|(_, s)| s).collect();
        summary.model = self.name().to_string();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_session_model::CaptureConfig;

    fn meta_with_notes(notes: &str) -> SessionMeta {
        let mut meta = SessionMeta::new("Work log", CaptureConfig::default());
        meta.notes = notes.to_string();
        meta
    }

    #[test]
    fn test_summarize_is_deterministic() {
        let meta = meta_with_notes(
            "Fixed the importer bug. Importer tests now pass. Lunch with the team.",
        );
        let backend = ExtractiveSummarizer::default();
        let a = backend.summarize(&meta);
        let b = backend.summarize(&meta);
        assert_eq!(a.text, b.text);
        assert_eq!(a.highlights, b.highlights);
        assert_eq!(a.model, "extractive");
    }

    #[test]
    fn test_highlights_are_bounded_and_ordered() {
        let meta = meta_with_notes(
            "First thing happened. Second thing happened. Third thing happened. Fourth thing happened.",
        );
        let backend = ExtractiveSummarizer::new(2);
        let summary = backend.summarize(&meta);
        assert_eq!(summary.highlights.len(), 2);
        // session order preserved among the selected sentences
        let first_pos = meta.notes.find(&summary.highlights[0]).unwrap();
        let second_pos = meta.notes.find(&summary.highlights[1]).unwrap();
        assert!(first_pos < second_pos);
    }

    #[test]
    fn test_empty_notes_fall_back_to_title() {
        let meta = meta_with_notes("");
        let summary = ExtractiveSummarizer::default().summarize(&meta);
        assert_eq!(summary.text, "Work log");
        assert!(summary.highlights.is_empty());
    }

    #[test]
    fn test_backend_kind_parses_configured_name() {
        assert_eq!(
            SummaryBackendKind::from_name("extractive"),
            Some(SummaryBackendKind::Extractive)
        );
        assert!(SummaryBackendKind::from_name("cloud-llm").is_none());
        let backend = backend_for(SummaryBackendKind::Extractive);
        assert_eq!(backend.name(), "extractive");
    }
}
