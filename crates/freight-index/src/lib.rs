//! The stage index: which stages exist and how they depend on each other.
//!
//! The [`Index`] maps stage manifest paths (relative to the workspace root)
//! to entries. Stages form a DAG through ownership edges: a dependency of
//! stage S is owned by stage T when T declares an output at the same
//! working-dir-joined path. Status, commit and checkout all walk that DAG
//! depth-first with cycle detection, memoizing over shared dependencies so
//! a diamond visits each stage once.
//!
//! # Invariants
//!
//! - No two indexed stages own the same absolute output path; violations
//!   are rejected at add-time.
//! - The index is persisted as a JSON map written via temp file + rename.

pub mod error;

mod entry;
mod index;

pub use entry::IndexEntry;
pub use error::{IndexError, IndexResult};
pub use index::{Index, IndexStatus};
