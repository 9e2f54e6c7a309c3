//! Storage layer: checksummed framing and atomic file replacement.
//!
//! The index lives in memory; durability comes from whole-file snapshots written
//! to a temp sibling and renamed into place.

/// Frame/unframe helpers and atomic writes.
pub mod persistence;

pub use persistence::{discard, frame, read_optional, unframe, write_tmp};
