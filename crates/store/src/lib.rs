//! Retrace Chunked Session Store
//!
//! Durable, crash-safe persistence of sessions as independently
//! addressable chunks, gated by disk-space admission control.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                  ChunkStore                    │
//! │  ┌────────────┐  ┌───────────────────────────┐ │
//! │  │ SpaceGuard │  │ per-session commit locks  │ │
//! │  └─────┬──────┘  └─────────────┬─────────────┘ │
//! │        │ admit                 │ serialize     │
//! │        ▼                       ▼               │
//! │  ┌──────────────────────────────────────────┐  │
//! │  │        Session Bundle (Disk)             │  │
//! │  │  meta.json  summary.json  shots/  audio/ │  │
//! │  └──────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! Every write is staged (write-to-temp-then-rename) so a crash mid-write
//! never yields a half-written file, and every write is preceded by a
//! [`SpaceGuard`] check. Transactions batch heterogeneous writes behind a
//! single admission check for the total.

pub mod space;
pub mod store;
pub mod transaction;

pub use space::*;
pub use store::*;
pub use transaction::*;
