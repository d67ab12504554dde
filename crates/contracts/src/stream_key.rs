//! StreamKey - Cheap-to-clone stream identifier
//!
//! Uses Arc<str> internally for O(1) clone operations.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Identifier of one independent, ordered sample stream.
///
/// Keys are created once per stream (usually `mission-stage`) and cloned into
/// every queue, lane and sink record, so cloning only bumps a reference count.
///
/// # Examples
/// ```
/// use contracts::StreamKey;
///
/// let key = StreamKey::composite("spacex crs-16", "1");
/// assert_eq!(key.as_str(), "spacex crs-16-stage-1");
/// let copy = key.clone();
/// assert_eq!(key, copy);
/// ```
#[derive(Clone, Default)]
pub struct StreamKey(Arc<str>);

impl StreamKey {
    /// Create a new StreamKey from a string slice.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Build the `{mission_id}-stage-{stage}` key used by launch archives.
    pub fn composite(mission_id: &str, stage: impl fmt::Display) -> Self {
        Self::from(format!("{mission_id}-stage-{stage}"))
    }

    /// Get the underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for StreamKey {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for StreamKey {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for StreamKey {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamKey {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for StreamKey {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamKey({:?})", self.0)
    }
}

impl PartialEq for StreamKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        // Fast path: same Arc pointer
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for StreamKey {}

impl PartialEq<str> for StreamKey {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for StreamKey {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl PartialOrd for StreamKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StreamKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// Hash - same as str hash so HashMap<StreamKey, _> can be queried with &str
impl Hash for StreamKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for StreamKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StreamKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}
