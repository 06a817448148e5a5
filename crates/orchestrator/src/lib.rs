//! Retrace Session Orchestrator
//!
//! Drives a capture session through its lifecycle and channels capability
//! output into the chunk store. Centralizing start/pause/resume/stop in
//! one state machine keeps a single source of truth for what should
//! currently be running.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │               SessionOrchestrator                │
//! │  ┌────────────┐ ┌────────────┐ ┌──────────────┐  │
//! │  │ Screenshot │ │   Audio    │ │    Video     │  │
//! │  │ capability │ │ capability │ │  capability  │  │
//! │  └──────┬─────┘ └──────┬─────┘ └──────┬───────┘  │
//! │         └──────────────┼──────────────┘          │
//! │                 CaptureEvent channel             │
//! │                        ▼                         │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │   ChunkStore (guarded, atomic writes)      │  │
//! │  └────────────────────┬───────────────────────┘  │
//! │                       ▼                          │
//! │           IndexManager (scheduled)               │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! States: `Idle → Starting → Recording ⇄ Paused → Stopping → Idle`,
//! with `Error` reachable from every transition and exits via retry or
//! dismiss. Entering the error state always drops the capability
//! handles, so stale handles never survive recovery.

pub mod capability;
pub mod machine;
pub mod summarize;

pub use capability::*;
pub use machine::*;
pub use summarize::*;
