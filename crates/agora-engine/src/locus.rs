//! Locus addresses and the per-dialogue locus arena.
//!
//! A locus is a dot-separated tree address (`0`, `0.1`, `0.1.2`) naming a
//! point in a dialogue. The root is always `0`. Addresses are value types;
//! the tree itself lives in a [`LocusArena`] that stores parent/child links
//! as indices, so derived tree views carry no live references and cannot
//! form cycles.
//!
//! Address order is segment-wise: numeric segments compare numerically,
//! mixed segments put numbers before text, text compares lexicographically.
//! All traversals in the engine visit children in address order.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Segment separator in a locus path.
const SEPARATOR: char = '.';

/// The root address of every dialogue.
pub const ROOT_PATH: &str = "0";

// ---------------------------------------------------------------------------
// LocusParseError
// ---------------------------------------------------------------------------

/// Rejection reasons for malformed locus strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocusParseError {
    /// The input was empty.
    Empty,
    /// A segment between separators was empty (e.g. `0..1`).
    EmptySegment { index: usize },
    /// The first segment was not the root segment `0`.
    BadRoot { found: String },
    /// A segment contained whitespace or a separator character.
    IllegalSegment { segment: String },
}

impl fmt::Display for LocusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty locus path"),
            Self::EmptySegment { index } => write!(f, "empty segment at position {index}"),
            Self::BadRoot { found } => write!(f, "locus path must start at root 0, found {found}"),
            Self::IllegalSegment { segment } => write!(f, "illegal segment: {segment:?}"),
        }
    }
}

impl std::error::Error for LocusParseError {}

// ---------------------------------------------------------------------------
// LocusPath
// ---------------------------------------------------------------------------

/// A validated dot-path address.
///
/// Stored in canonical string form; ordering is segment-wise address order,
/// not raw string order (`0.2` sorts before `0.10`). Deserialization
/// re-validates, so persisted data cannot smuggle in malformed paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocusPath(String);

impl TryFrom<String> for LocusPath {
    type Error = LocusParseError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<LocusPath> for String {
    fn from(path: LocusPath) -> Self {
        path.0
    }
}

impl LocusPath {
    /// The root address `0`.
    pub fn root() -> Self {
        Self(ROOT_PATH.to_string())
    }

    /// Parse and validate a dot-path string.
    pub fn parse(raw: &str) -> Result<Self, LocusParseError> {
        if raw.is_empty() {
            return Err(LocusParseError::Empty);
        }
        let segments: Vec<&str> = raw.split(SEPARATOR).collect();
        for (index, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(LocusParseError::EmptySegment { index });
            }
            if segment.chars().any(|c| c.is_whitespace()) {
                return Err(LocusParseError::IllegalSegment {
                    segment: (*segment).to_string(),
                });
            }
        }
        if segments[0] != ROOT_PATH {
            return Err(LocusParseError::BadRoot {
                found: segments[0].to_string(),
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the root address.
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_PATH
    }

    /// Path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Number of segments; the root has depth 1.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The parent address, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let cut = self.0.rfind(SEPARATOR)?;
        Some(Self(self.0[..cut].to_string()))
    }

    /// The child address extending this path by `suffix`.
    pub fn child(&self, suffix: &str) -> Result<Self, LocusParseError> {
        if suffix.is_empty() {
            return Err(LocusParseError::EmptySegment {
                index: self.depth(),
            });
        }
        if suffix.contains(SEPARATOR) || suffix.chars().any(|c| c.is_whitespace()) {
            return Err(LocusParseError::IllegalSegment {
                segment: suffix.to_string(),
            });
        }
        Ok(Self(format!("{}{SEPARATOR}{suffix}", self.0)))
    }

    /// Whether `self` is an ancestor of `other` (or equal to it).
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        if self.0 == other.0 {
            return true;
        }
        other.0.starts_with(&self.0)
            && other.0.as_bytes().get(self.0.len()) == Some(&(SEPARATOR as u8))
    }

    /// All ancestors from the root down to and including `self`.
    pub fn ancestry(&self) -> Vec<Self> {
        let mut out = Vec::with_capacity(self.depth());
        let mut end = 0usize;
        let bytes = self.0.as_bytes();
        while end < bytes.len() {
            match self.0[end..].find(SEPARATOR) {
                Some(offset) => {
                    end += offset;
                    out.push(Self(self.0[..end].to_string()));
                    end += 1;
                }
                None => {
                    out.push(self.clone());
                    break;
                }
            }
        }
        out
    }
}

impl fmt::Display for LocusPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Segment comparison key: numbers before text, numbers numeric. The raw
/// segment is the final tie-break so the order stays consistent with
/// equality (`1` vs `01`).
fn segment_key(segment: &str) -> (u8, u64, &str) {
    match segment.parse::<u64>() {
        Ok(n) => (0, n, segment),
        Err(_) => (1, 0, segment),
    }
}

impl Ord for LocusPath {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut a = self.segments();
        let mut b = other.segments();
        loop {
            match (a.next(), b.next()) {
                (Some(x), Some(y)) => {
                    let ord = segment_key(x).cmp(&segment_key(y));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                (Some(_), None) => return Ordering::Greater,
                (None, Some(_)) => return Ordering::Less,
                (None, None) => return Ordering::Equal,
            }
        }
    }
}

impl PartialOrd for LocusPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// LocusArena
// ---------------------------------------------------------------------------

/// Index of a node inside a [`LocusArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocusIndex(pub usize);

/// One node of the arena: its address plus index-based links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocusNode {
    pub path: LocusPath,
    pub parent: Option<LocusIndex>,
    /// Child indices, kept in address order.
    pub children: Vec<LocusIndex>,
}

/// Arena of locus nodes shared by both designs of a dialogue.
///
/// Interning a path creates every missing ancestor, so the parent of any
/// non-root node always exists. Lookup is by path through a sorted index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocusArena {
    nodes: Vec<LocusNode>,
    index: std::collections::BTreeMap<LocusPath, LocusIndex>,
}

impl LocusArena {
    /// An arena holding only the root.
    pub fn new() -> Self {
        let mut arena = Self::default();
        arena.intern(&LocusPath::root());
        arena
    }

    /// Whether `path` has been interned.
    pub fn contains(&self, path: &LocusPath) -> bool {
        self.index.contains_key(path)
    }

    /// Look up a node index by path.
    pub fn lookup(&self, path: &LocusPath) -> Option<LocusIndex> {
        self.index.get(path).copied()
    }

    /// The node at `index`.
    pub fn node(&self, index: LocusIndex) -> &LocusNode {
        &self.nodes[index.0]
    }

    /// Number of interned loci.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty (never true after `new`).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Intern `path`, creating missing ancestors, and return its index.
    pub fn intern(&mut self, path: &LocusPath) -> LocusIndex {
        if let Some(existing) = self.index.get(path) {
            return *existing;
        }
        let parent_index = path.parent().map(|parent| self.intern(&parent));
        let index = LocusIndex(self.nodes.len());
        self.nodes.push(LocusNode {
            path: path.clone(),
            parent: parent_index,
            children: Vec::new(),
        });
        self.index.insert(path.clone(), index);
        if let Some(parent_index) = parent_index {
            let position = self.nodes[parent_index.0]
                .children
                .binary_search_by(|child| self.nodes[child.0].path.cmp(path))
                .unwrap_or_else(|p| p);
            self.nodes[parent_index.0].children.insert(position, index);
        }
        index
    }

    /// Children of `path` in address order; empty when unknown or leaf.
    pub fn children_of(&self, path: &LocusPath) -> Vec<LocusPath> {
        match self.lookup(path) {
            Some(index) => self.nodes[index.0]
                .children
                .iter()
                .map(|child| self.nodes[child.0].path.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// All interned paths in address order.
    pub fn paths(&self) -> impl Iterator<Item = &LocusPath> {
        self.index.keys()
    }
}
