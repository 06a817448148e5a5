//! Retrace Session Model
//!
//! Defines the core data contracts for Retrace sessions:
//! - **Session:** Metadata, capture configuration, lifecycle status, and
//!   the ordered set of committed chunk references
//! - **Chunks:** Independently persisted units of session data
//!   (metadata, summary, screenshot, audio segment, video)
//! - **Queries:** Conjunctive search filters and the index projection of
//!   one session's metadata
//!
//! The metadata chunk is the authority on a session's committed chunk
//! set: a data file not referenced by it is an orphan.

pub mod chunk;
pub mod query;
pub mod session;

pub use chunk::*;
pub use query::*;
pub use session::*;
