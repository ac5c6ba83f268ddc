//! Hierarchical cache keys and key matchers.
//!
//! A [`QueryKey`] is an ordered tuple of segments such as
//! `["calendar-tasks", 7, "Personal Tasks"]`. Keys sharing a prefix are
//! related; a [`QueryFilter`] selects keys by exact match or prefix and may
//! further narrow the selection with a [`KeyMatcher`] predicate.

use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One element of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    /// Numeric identifier (user id, project id, task id).
    Int(i64),
    /// Label or partition name.
    Text(String),
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for KeySegment {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl KeySegment {
    /// Text content, if this is a text segment.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Int(_) => None,
        }
    }
}

impl Display for KeySegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(text) => write!(f, "{text:?}"),
        }
    }
}

/// Hierarchical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    /// Single-segment key.
    pub fn new(root: impl Into<KeySegment>) -> Self {
        Self(vec![root.into()])
    }

    /// Key from an explicit segment list.
    #[must_use]
    pub fn from_segments(segments: Vec<KeySegment>) -> Self {
        Self(segments)
    }

    /// Append a segment.
    #[must_use]
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// All segments in order.
    #[must_use]
    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// Final segment.
    #[must_use]
    pub fn last(&self) -> Option<&KeySegment> {
        self.0.last()
    }

    /// Whether `prefix` is a leading sub-tuple of this key (a key is a
    /// prefix of itself).
    #[must_use]
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{segment}")?;
        }
        f.write_str("]")
    }
}

/// Build a [`QueryKey`] from a list of segment expressions.
///
/// ```
/// use tasksync::query_key;
/// let key = query_key!["calendar-tasks", 7_i64, "Personal Tasks"];
/// assert_eq!(key.segments().len(), 3);
/// ```
#[macro_export]
macro_rules! query_key {
    ($($segment:expr),+ $(,)?) => {
        $crate::cache::key::QueryKey::from_segments(vec![
            $($crate::cache::key::KeySegment::from($segment)),+
        ])
    };
}

/// Predicate over a full key tuple.
#[derive(Clone)]
pub struct KeyMatcher(Arc<dyn Fn(&QueryKey) -> bool + Send + Sync>);

impl KeyMatcher {
    /// Matcher from an arbitrary predicate.
    pub fn new(predicate: impl Fn(&QueryKey) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// Matches keys whose final segment is the text `label`.
    pub fn trailing_label(label: impl Into<String>) -> Self {
        let label = label.into();
        Self::new(move |key| key.last().and_then(KeySegment::as_text) == Some(label.as_str()))
    }

    /// Matches keys whose segment at `index` equals `segment`.
    pub fn segment_eq(index: usize, segment: impl Into<KeySegment>) -> Self {
        let segment = segment.into();
        Self::new(move |key| key.segments().get(index) == Some(&segment))
    }

    /// Evaluate the predicate.
    #[must_use]
    pub fn matches(&self, key: &QueryKey) -> bool {
        (self.0)(key)
    }
}

impl Debug for KeyMatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMatcher(..)")
    }
}

/// How a filter's key is compared against cached keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    /// Only the identical key.
    Exact,
    /// The key itself and every key extending it.
    Prefix,
}

/// Selects cache entries.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    key: QueryKey,
    mode: KeyMatch,
    predicate: Option<KeyMatcher>,
}

impl QueryFilter {
    /// Match `key` and every key it prefixes.
    #[must_use]
    pub fn prefix(key: QueryKey) -> Self {
        Self {
            key,
            mode: KeyMatch::Prefix,
            predicate: None,
        }
    }

    /// Match `key` only.
    #[must_use]
    pub fn exact(key: QueryKey) -> Self {
        Self {
            key,
            mode: KeyMatch::Exact,
            predicate: None,
        }
    }

    /// Additionally require `predicate` to hold.
    #[must_use]
    pub fn with_predicate(mut self, predicate: KeyMatcher) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Filter key.
    #[must_use]
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Whether `candidate` is selected.
    #[must_use]
    pub fn matches(&self, candidate: &QueryKey) -> bool {
        let key_matches = match self.mode {
            KeyMatch::Exact => candidate == &self.key,
            KeyMatch::Prefix => candidate.starts_with(&self.key),
        };
        key_matches && self.predicate.as_ref().is_none_or(|p| p.matches(candidate))
    }
}
