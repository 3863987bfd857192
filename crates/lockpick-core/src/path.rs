//! Lock path handling

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Separator between path segments
pub const SEPARATOR: char = '/';

/// A normalized absolute path naming the resource being locked.
///
/// Trailing separators are stripped on construction, so `/jobs/nightly/` and
/// `/jobs/nightly` name the same lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LockPath(String);

impl LockPath {
    /// Parse and normalize a lock path
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` when the path is not absolute, is the root, or
    /// contains empty, `.` or `..` segments.
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        let trimmed = raw.trim_end_matches(SEPARATOR);

        if !raw.starts_with(SEPARATOR) {
            return Err(Error::invalid_path(raw, "must start with '/'"));
        }
        if trimmed.is_empty() {
            return Err(Error::invalid_path(raw, "the root cannot be locked"));
        }
        if trimmed.contains('\0') {
            return Err(Error::invalid_path(raw, "contains a null character"));
        }

        let bad_segment = trimmed
            .split(SEPARATOR)
            .skip(1)
            .find(|segment| segment.is_empty() || *segment == "." || *segment == "..");
        if let Some(segment) = bad_segment {
            let reason = if segment.is_empty() {
                "contains an empty segment".to_string()
            } else {
                format!("contains a relative segment '{segment}'")
            };
            return Err(Error::invalid_path(raw, reason));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Get the path as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full path of a child node under this lock
    #[must_use]
    pub fn child(&self, name: &str) -> String {
        format!("{}{SEPARATOR}{name}", self.0)
    }

    /// Split a node path into its lock path and node name
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` when the node path has no parent below the root.
    pub fn split_node(node_path: &str) -> Result<(Self, String)> {
        let normalized = Self::new(node_path)?;
        match normalized.0.rsplit_once(SEPARATOR) {
            Some((parent, name)) if !parent.is_empty() => {
                Ok((Self(parent.to_string()), name.to_string()))
            }
            _ => Err(Error::invalid_path(node_path, "a lock node needs a parent")),
        }
    }
}

impl std::fmt::Display for LockPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LockPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for LockPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<LockPath> for String {
    fn from(path: LockPath) -> Self {
        path.0
    }
}

/// Normalize a chroot prefix: trailing separators are stripped, `/` means none.
///
/// # Errors
///
/// Returns `InvalidPath` when a non-empty chroot is not absolute.
pub fn normalize_chroot(raw: &str) -> Result<Option<String>> {
    let trimmed = raw.trim_end_matches(SEPARATOR);
    if trimmed.is_empty() {
        return Ok(None);
    }
    LockPath::new(trimmed).map(|p| Some(p.0))
}
