// ABOUTME: Core library for snapvault, containing the payload model, hasher, and delta engine.
// ABOUTME: This crate is pure and performs no I/O; persistence lives in snapvault-store.

pub mod delta;
pub mod hash;
pub mod payload;
pub mod version;

pub use delta::{Change, Diff, DiffSummary, KindChange, SchemaChanges, VersionComparison, apply, diff};
pub use hash::content_hash;
pub use payload::{Payload, PayloadError, Scalar};
pub use version::{Branch, Version, VersionNumber, VersionType};
