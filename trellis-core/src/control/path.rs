//! Path syntax for addressing controls inside a subtree.
//!
//! Segments are separated by dots. A segment may be followed by bracketed
//! indices, so `lines[0].text` and `lines.0.text` address the same control.

use std::borrow::Cow;

use smallvec::SmallVec;

/// One step of a control path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    /// The segment as a group key.
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            PathSegment::Key(key) => Cow::Borrowed(key),
            PathSegment::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// The segment as an array index, if it is numeric.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Key(key) => key.parse().ok(),
            PathSegment::Index(index) => Some(*index),
        }
    }
}

/// Split a path into segments.
///
/// Returns `None` for an empty path, an empty segment, or a malformed
/// bracket.
pub fn parse_path(path: &str) -> Option<SmallVec<[PathSegment; 4]>> {
    if path.is_empty() {
        return None;
    }

    let mut segments = SmallVec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(open) => part.split_at(open),
            None => (part, ""),
        };
        if key.is_empty() && rest.is_empty() {
            return None;
        }
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        }

        while !rest.is_empty() {
            let close = rest.find(']')?;
            let index = rest.get(1..close)?.parse().ok()?;
            segments.push(PathSegment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return None;
            }
        }
    }
    Some(segments)
}
