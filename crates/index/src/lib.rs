//! Retrace Index Manager
//!
//! Keeps a query-optimized projection of session metadata in lockstep
//! with the chunk store, without linear scans:
//! - **SessionIndex:** inverted posting lists over tokens, tags,
//!   categories, and status, plus an ordered start-time index
//! - **IndexManager:** schedules non-blocking index updates immediately
//!   after store mutations and hands back an awaitable completion signal
//!
//! Searches intersect posting lists (AND semantics); if the index is ever
//! internally inconsistent the search degrades to a linear scan over the
//! entries rather than failing the caller.

pub mod index;
pub mod manager;

pub use index::*;
pub use manager::*;
