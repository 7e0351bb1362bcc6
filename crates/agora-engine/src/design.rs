//! Designs: per-participant append-only act sequences.
//!
//! A design belongs to exactly one participant role and holds the ordered
//! acts that participant has committed to. Designs are append-only; a
//! recompilation replaces the whole design rather than editing it in place.
//!
//! Structural invariants enforced at append time:
//! - the parent locus of a non-root act must already be interned in the
//!   dialogue's shared [`LocusArena`];
//! - at most one proper act of a given polarity per locus per design;
//! - at most one daimon per locus per design (a daimon after a proper act
//!   at the same locus is legal and closes that line).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::locus::{LocusArena, LocusPath};

// ---------------------------------------------------------------------------
// Roles and polarities
// ---------------------------------------------------------------------------

/// The two opposed participants of a dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// Proponent of the thesis under discussion.
    Advocate,
    /// Opponent challenging it.
    Challenger,
}

impl ParticipantRole {
    /// The opposing role.
    pub fn opponent(self) -> Self {
        match self {
            Self::Advocate => Self::Challenger,
            Self::Challenger => Self::Advocate,
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Advocate => "advocate",
            Self::Challenger => "challenger",
        };
        f.write_str(s)
    }
}

/// Act polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    /// The dual polarity.
    pub fn flip(self) -> Self {
        match self {
            Self::Positive => Self::Negative,
            Self::Negative => Self::Positive,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        };
        f.write_str(s)
    }
}

/// Proper act or terminating daimon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActKind {
    Proper,
    Daimon,
}

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Identifier of an act, unique within one [`DesignStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActId(pub u64);

impl fmt::Display for ActId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "act:{}", self.0)
    }
}

/// Identifier of a design, unique within one [`DesignStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesignId(pub u64);

impl fmt::Display for DesignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "design:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Act
// ---------------------------------------------------------------------------

/// A single move placed at a locus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Act {
    pub id: ActId,
    pub kind: ActKind,
    pub polarity: Polarity,
    pub locus: LocusPath,
    /// Proposition text; may be empty for purely structural acts.
    pub expression: String,
    /// Child suffixes this act opens for continuation.
    pub ramification: Vec<String>,
    /// Whether the act's children form an exclusive-choice branch point.
    pub is_additive: bool,
    /// For additive acts, the committed branch suffix once resolved.
    pub chosen_branch: Option<String>,
}

impl Act {
    /// Whether this act is a terminating daimon.
    pub fn is_daimon(&self) -> bool {
        self.kind == ActKind::Daimon
    }
}

// ---------------------------------------------------------------------------
// AppendError
// ---------------------------------------------------------------------------

/// Structural violations rejected synchronously at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppendError {
    /// The polarity slot at the locus is already occupied in this design.
    LocusConflict {
        locus: LocusPath,
        polarity: Polarity,
    },
    /// The parent path has never been interned for this dialogue.
    OrphanLocus {
        locus: LocusPath,
        missing_parent: LocusPath,
    },
    /// The design id is not present in the store.
    UnknownDesign { design: DesignId },
}

impl fmt::Display for AppendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocusConflict { locus, polarity } => {
                write!(f, "{polarity} slot already occupied at {locus}")
            }
            Self::OrphanLocus {
                locus,
                missing_parent,
            } => write!(f, "orphan locus {locus}: parent {missing_parent} does not exist"),
            Self::UnknownDesign { design } => write!(f, "unknown design {design}"),
        }
    }
}

impl std::error::Error for AppendError {}

// ---------------------------------------------------------------------------
// Design
// ---------------------------------------------------------------------------

/// One participant's ordered act sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Design {
    pub id: DesignId,
    pub role: ParticipantRole,
    pub acts: Vec<Act>,
}

impl Design {
    /// Acts placed at `locus`, in append order.
    pub fn acts_at<'a, 'b>(&'a self, locus: &'b LocusPath) -> impl Iterator<Item = &'a Act> + 'b
    where
        'a: 'b,
    {
        self.acts.iter().filter(move |act| &act.locus == locus)
    }

    /// The proper act of `polarity` at `locus`, if any.
    pub fn proper_at(&self, locus: &LocusPath, polarity: Polarity) -> Option<&Act> {
        self.acts_at(locus)
            .find(|act| act.kind == ActKind::Proper && act.polarity == polarity)
    }

    /// The daimon at `locus`, if any.
    pub fn daimon_at(&self, locus: &LocusPath) -> Option<&Act> {
        self.acts_at(locus).find(|act| act.is_daimon())
    }

    /// Whether any act occupies `locus`.
    pub fn occupies(&self, locus: &LocusPath) -> bool {
        self.acts_at(locus).next().is_some()
    }

    /// Look up an act by id.
    pub fn act(&self, id: ActId) -> Option<&Act> {
        self.acts.iter().find(|act| act.id == id)
    }

    /// Read-only tree view over this design's loci.
    pub fn as_tree(&self, arena: &LocusArena) -> DesignTree {
        let mut loci: BTreeMap<LocusPath, DesignTreeNode> = BTreeMap::new();
        for act in &self.acts {
            loci.entry(act.locus.clone())
                .or_insert_with(|| DesignTreeNode {
                    path: act.locus.clone(),
                    act_ids: Vec::new(),
                    children: Vec::new(),
                })
                .act_ids
                .push(act.id);
        }
        let occupied: Vec<LocusPath> = loci.keys().cloned().collect();
        for path in occupied {
            let children: Vec<LocusPath> = arena
                .children_of(&path)
                .into_iter()
                .filter(|child| loci.contains_key(child))
                .collect();
            if let Some(node) = loci.get_mut(&path) {
                node.children = children;
            }
        }
        DesignTree {
            design: self.id,
            role: self.role,
            loci,
        }
    }
}

/// One node of a [`DesignTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignTreeNode {
    pub path: LocusPath,
    pub act_ids: Vec<ActId>,
    /// Occupied child loci in address order.
    pub children: Vec<LocusPath>,
}

/// Read-only locus tree derived from a design's flat act list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignTree {
    pub design: DesignId,
    pub role: ParticipantRole,
    pub loci: BTreeMap<LocusPath, DesignTreeNode>,
}

// ---------------------------------------------------------------------------
// DesignStore
// ---------------------------------------------------------------------------

/// Owner of the designs of one dialogue; allocates all ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignStore {
    designs: BTreeMap<DesignId, Design>,
    next_design: u64,
    next_act: u64,
}

impl DesignStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty design owned by `role`.
    pub fn create_design(&mut self, role: ParticipantRole) -> DesignId {
        let id = DesignId(self.next_design);
        self.next_design += 1;
        self.designs.insert(
            id,
            Design {
                id,
                role,
                acts: Vec::new(),
            },
        );
        id
    }

    /// Look up a design.
    pub fn design(&self, id: DesignId) -> Option<&Design> {
        self.designs.get(&id)
    }

    /// All designs in id order.
    pub fn designs(&self) -> impl Iterator<Item = &Design> {
        self.designs.values()
    }

    /// Remove a design entirely (recompilation supersedes, never edits).
    pub fn remove_design(&mut self, id: DesignId) -> Option<Design> {
        self.designs.remove(&id)
    }

    /// Append a proper act, enforcing the structural invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn append_act(
        &mut self,
        arena: &mut LocusArena,
        design: DesignId,
        locus: LocusPath,
        polarity: Polarity,
        expression: impl Into<String>,
        ramification: Vec<String>,
        is_additive: bool,
    ) -> Result<ActId, AppendError> {
        self.check_parent(arena, &locus)?;
        let target = self
            .designs
            .get(&design)
            .ok_or(AppendError::UnknownDesign { design })?;
        if target.proper_at(&locus, polarity).is_some() {
            return Err(AppendError::LocusConflict { locus, polarity });
        }
        arena.intern(&locus);
        for suffix in &ramification {
            if let Ok(child) = locus.child(suffix) {
                arena.intern(&child);
            }
        }
        let id = self.allocate_act();
        let act = Act {
            id,
            kind: ActKind::Proper,
            polarity,
            locus,
            expression: expression.into(),
            ramification,
            is_additive,
            chosen_branch: None,
        };
        self.designs
            .get_mut(&design)
            .ok_or(AppendError::UnknownDesign { design })?
            .acts
            .push(act);
        Ok(id)
    }

    /// Append a terminating daimon.
    pub fn append_daimon(
        &mut self,
        arena: &mut LocusArena,
        design: DesignId,
        locus: LocusPath,
        expression: impl Into<String>,
    ) -> Result<ActId, AppendError> {
        self.check_parent(arena, &locus)?;
        let target = self
            .designs
            .get(&design)
            .ok_or(AppendError::UnknownDesign { design })?;
        let polarity = match target.role {
            ParticipantRole::Advocate => Polarity::Positive,
            ParticipantRole::Challenger => Polarity::Negative,
        };
        if target.daimon_at(&locus).is_some() {
            return Err(AppendError::LocusConflict { locus, polarity });
        }
        arena.intern(&locus);
        let id = self.allocate_act();
        let act = Act {
            id,
            kind: ActKind::Daimon,
            polarity,
            locus,
            expression: expression.into(),
            ramification: Vec::new(),
            is_additive: false,
            chosen_branch: None,
        };
        self.designs
            .get_mut(&design)
            .ok_or(AppendError::UnknownDesign { design })?
            .acts
            .push(act);
        Ok(id)
    }

    /// Replay a recorded additive choice onto the owning act.
    pub fn commit_branch(&mut self, design: DesignId, parent: &LocusPath, suffix: &str) {
        if let Some(target) = self.designs.get_mut(&design) {
            for act in &mut target.acts {
                if act.is_additive && &act.locus == parent {
                    act.chosen_branch = Some(suffix.to_string());
                }
            }
        }
    }

    /// Find the act with `id` across all designs.
    pub fn act(&self, id: ActId) -> Option<(&Design, &Act)> {
        self.designs
            .values()
            .find_map(|design| design.act(id).map(|act| (design, act)))
    }

    fn allocate_act(&mut self) -> ActId {
        let id = ActId(self.next_act);
        self.next_act += 1;
        id
    }

    fn check_parent(&self, arena: &LocusArena, locus: &LocusPath) -> Result<(), AppendError> {
        if let Some(parent) = locus.parent() {
            if !arena.contains(&parent) {
                return Err(AppendError::OrphanLocus {
                    locus: locus.clone(),
                    missing_parent: parent,
                });
            }
        }
        Ok(())
    }
}
