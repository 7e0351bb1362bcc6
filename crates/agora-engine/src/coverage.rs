//! Approval coverage and mutual-exclusion structure over arguments.
//!
//! Built fresh per selection request from a snapshot of the deliberation:
//! which voters approve which arguments, and which argument pairs are
//! logically incompatible. Both structures are pure values; identical
//! snapshots build identical structures.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an argument within one deliberation scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentId(pub String);

impl ArgumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ArgumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a voter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(pub String);

impl VoterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// CoverageIndex
// ---------------------------------------------------------------------------

/// Per-argument approving-voter sets plus the voter universe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageIndex {
    approvers: BTreeMap<ArgumentId, BTreeSet<VoterId>>,
    voters: BTreeSet<VoterId>,
}

impl CoverageIndex {
    /// Build the index from `(voter, approved argument)` pairs.
    ///
    /// Approvals of arguments outside `arguments` are dropped; every voter
    /// in `approvals` joins the universe even with no surviving approval.
    pub fn build(
        arguments: &[ArgumentId],
        approvals: &[(VoterId, ArgumentId)],
    ) -> Self {
        let known: BTreeSet<&ArgumentId> = arguments.iter().collect();
        let mut approvers: BTreeMap<ArgumentId, BTreeSet<VoterId>> = arguments
            .iter()
            .map(|argument| (argument.clone(), BTreeSet::new()))
            .collect();
        let mut voters = BTreeSet::new();
        for (voter, argument) in approvals {
            voters.insert(voter.clone());
            if known.contains(argument) {
                approvers
                    .entry(argument.clone())
                    .or_default()
                    .insert(voter.clone());
            }
        }
        Self { approvers, voters }
    }

    /// Voters approving `argument`.
    pub fn approvers(&self, argument: &ArgumentId) -> Option<&BTreeSet<VoterId>> {
        self.approvers.get(argument)
    }

    /// Approval count for `argument`.
    pub fn support(&self, argument: &ArgumentId) -> usize {
        self.approvers.get(argument).map_or(0, BTreeSet::len)
    }

    /// The full voter universe in id order.
    pub fn voters(&self) -> impl Iterator<Item = &VoterId> {
        self.voters.iter()
    }

    /// Number of voters.
    pub fn voter_count(&self) -> usize {
        self.voters.len()
    }

    /// The arguments `voter` approves, in id order.
    pub fn approvals_of(&self, voter: &VoterId) -> BTreeSet<ArgumentId> {
        self.approvers
            .iter()
            .filter(|(_, approvers)| approvers.contains(voter))
            .map(|(argument, _)| argument.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ConflictGraph
// ---------------------------------------------------------------------------

/// Symmetric mutual-exclusion relation over argument pairs.
///
/// Pairs are normalized to `(min, max)` id order, so lookups are
/// order-insensitive by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictGraph {
    edges: BTreeSet<(ArgumentId, ArgumentId)>,
}

impl ConflictGraph {
    /// Build the graph from unordered conflicting pairs.
    ///
    /// Self-conflicts are dropped.
    pub fn build(conflicts: &[(ArgumentId, ArgumentId)]) -> Self {
        let mut edges = BTreeSet::new();
        for (a, b) in conflicts {
            if a == b {
                continue;
            }
            edges.insert(normalize(a.clone(), b.clone()));
        }
        Self { edges }
    }

    /// Whether `a` and `b` exclude each other.
    pub fn in_conflict(&self, a: &ArgumentId, b: &ArgumentId) -> bool {
        if a == b {
            return false;
        }
        let key = if a < b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        self.edges.contains(&key)
    }

    /// Whether `candidate` can join `members` without breaking consistency.
    pub fn compatible_with(
        &self,
        candidate: &ArgumentId,
        members: &BTreeSet<ArgumentId>,
    ) -> bool {
        members.iter().all(|member| !self.in_conflict(candidate, member))
    }

    /// Whether the whole set is internally consistent.
    pub fn conflict_free(&self, set: &BTreeSet<ArgumentId>) -> bool {
        let members: Vec<&ArgumentId> = set.iter().collect();
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                if self.in_conflict(a, b) {
                    return false;
                }
            }
        }
        true
    }

    /// All normalized edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = &(ArgumentId, ArgumentId)> {
        self.edges.iter()
    }

    /// Number of conflicting pairs.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the relation is empty.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

fn normalize(a: ArgumentId, b: ArgumentId) -> (ArgumentId, ArgumentId) {
    if a <= b { (a, b) } else { (b, a) }
}
