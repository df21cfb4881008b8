//! Newtype IDs for type-safe identification of snapshot elements.
//!
//! Using newtypes prevents accidentally mixing up different kinds of IDs
//! (e.g., passing a task ID where an asset ID is expected).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Content hash of an asset: lowercase hex SHA-256 of its bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Wraps an already-computed hash string.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Hashes raw bytes. Identical bytes always produce the same id.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Returns the hash string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id looks like a SHA-256 hex digest.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 64 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(id: &str) -> Self {
        AssetId::new(id)
    }
}

/// A class id in the shared label space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub i32);

impl ClassId {
    /// Creates a new ClassId.
    #[inline]
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the underlying value.
    #[inline]
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ClassId {
    fn from(id: i32) -> Self {
        ClassId::new(id)
    }
}

/// Identifier of the task that produced a snapshot.
///
/// Task ids double as the suffix of commit tags (`branch@task_id`), so they
/// are restricted to the same character set as branch names.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps a task id string without validation.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh task id from the current time and process id.
    pub fn generate() -> Self {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let now = chrono::Utc::now();
        let seed = format!(
            "{}-{}-{}",
            now.timestamp_nanos_opt().unwrap_or_default(),
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let digest = hex::encode(Sha256::digest(seed.as_bytes()));
        Self(format!("t{}{}", now.format("%Y%m%d%H%M%S"), &digest[..8]))
    }

    /// Returns the id string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        TaskId::new(id)
    }
}

/// Returns true if `name` is usable as a branch name or task id.
///
/// Allowed: ASCII letters, digits, `_`, `-` and `.`, not starting with `.`
/// or `-`. The `@` separator and path separators are never allowed.
pub fn is_valid_ref_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_is_content_hash() {
        let a = AssetId::from_bytes(b"same bytes");
        let b = AssetId::from_bytes(b"same bytes");
        let c = AssetId::from_bytes(b"other bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.is_well_formed());
    }

    #[test]
    fn test_id_ordering() {
        assert!(ClassId(1) < ClassId(2));
        assert!(AssetId::new("a") < AssetId::new("b"));
    }

    #[test]
    fn test_generated_task_ids_are_valid_refs() {
        let id = TaskId::generate();
        assert!(is_valid_ref_name(id.as_str()));
    }

    #[test]
    fn test_ref_name_rules() {
        assert!(is_valid_ref_name("master"));
        assert!(is_valid_ref_name("a_b-c.1"));
        assert!(!is_valid_ref_name(""));
        assert!(!is_valid_ref_name("-x"));
        assert!(!is_valid_ref_name("a@b"));
        assert!(!is_valid_ref_name("a/b"));
    }
}
