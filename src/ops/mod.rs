//! Snapshot transformation engines.
//!
//! Each engine is a pure function from loaded collections to new
//! collections. Loading inputs and committing the result is the job of
//! [`crate::commands`].

pub mod copy;
pub mod filter;
pub mod merge;

pub use copy::{copy_snapshot, unknown_class_names, CopyOptions, CopyOutput, UnknownTypesStrategy};
pub use filter::{filter_snapshot, FilterOptions, FilterOutput};
pub use merge::{merge_snapshots, MergeOutput, MergeSource, MergeStrategy};
