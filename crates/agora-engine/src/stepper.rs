//! Interaction stepper: pairs dual acts from two designs into a trace.
//!
//! The stepper walks the shared locus tree depth-first from the root,
//! pairing one Positive proper act (from the positive design) with one
//! Negative proper act (from the negative design) at each visited locus.
//! Each act is consumed by at most one pair. After a pair the walk advances
//! into the children opened by the positive act's ramification plus any
//! child loci carrying content, in address order.
//!
//! Terminal outcomes:
//! - `Convergent`: a daimon was reached; the daimon player endorses the
//!   opposing act at that locus.
//! - `Divergent`: a visited locus holds a proper act on one side with no
//!   dual response and no daimon.
//! - `Ongoing`: the walk paused at an unresolved additive branch point.
//!
//! The stepper is a pure function of its inputs. Identical designs and
//! additive choices produce byte-identical traces; `content_hash` exposes
//! that as a stable digest.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::additive::AdditiveLedger;
use crate::defense;
use crate::design::{Act, ActId, Design, ParticipantRole, Polarity};
use crate::locus::LocusPath;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Traversal guards for the stepper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepperConfig {
    /// Maximum visited loci per walk; defends against malformed inputs.
    pub max_pairs: usize,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self { max_pairs: 4096 }
    }
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Malformed-input failures. Argumentative stalemate is never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepError {
    /// Both designs belong to the same participant role.
    MismatchedRoles { role: ParticipantRole },
    /// The visited-locus budget was exhausted.
    PairBudgetExhausted { max_pairs: usize },
    /// An act carries data the walk cannot interpret.
    MalformedDesign { detail: String },
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MismatchedRoles { role } => {
                write!(f, "both designs are owned by {role}")
            }
            Self::PairBudgetExhausted { max_pairs } => {
                write!(f, "pair budget exhausted at {max_pairs} visited loci")
            }
            Self::MalformedDesign { detail } => write!(f, "malformed design: {detail}"),
        }
    }
}

impl std::error::Error for StepError {}

// ---------------------------------------------------------------------------
// Trace model
// ---------------------------------------------------------------------------

/// Terminal or paused state of an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Ongoing,
    Convergent,
    Divergent,
}

/// One pairing step. Half-pairs occur when a daimon closes a locus the
/// opposing side never occupied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracePair {
    pub index: usize,
    pub pos_act_id: Option<ActId>,
    pub neg_act_id: Option<ActId>,
    pub locus: LocusPath,
}

/// The acceptance that sealed a convergent interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    pub locus: LocusPath,
    /// The opposing act accepted by the daimon player.
    pub act: ActId,
    pub by: ParticipantRole,
}

/// Result of stepping two designs against each other.
///
/// Rebuilt from scratch on every request; never mutated incrementally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionTrace {
    pub pairs: Vec<TracePair>,
    pub status: TraceStatus,
    pub ended_at_daimon_for: Option<ParticipantRole>,
    pub endorsement: Option<Endorsement>,
    /// Pair indices causally necessary for convergence, ascending.
    pub decisive_indices: Vec<usize>,
    /// Additive choices consumed during this walk.
    pub used_additive: BTreeMap<LocusPath, String>,
    /// The unresolved additive locus the walk paused at, when `Ongoing`.
    pub pending_additive: Option<LocusPath>,
}

impl InteractionTrace {
    /// Stable digest of the canonical JSON form.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        let mut out = String::with_capacity(64);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Stepping
// ---------------------------------------------------------------------------

/// Step `pos` (the Advocate-oriented design) against `neg` to a terminal
/// or paused trace.
pub fn step(
    pos: &Design,
    neg: &Design,
    choices: &AdditiveLedger,
    cfg: &StepperConfig,
) -> Result<InteractionTrace, StepError> {
    if pos.role == neg.role {
        return Err(StepError::MismatchedRoles { role: pos.role });
    }

    let child_map = build_child_map(pos, neg);
    let mut stack: Vec<LocusPath> = vec![LocusPath::root()];
    let mut visited: BTreeSet<LocusPath> = BTreeSet::new();
    let mut consumed: BTreeSet<ActId> = BTreeSet::new();
    let mut pairs: Vec<TracePair> = Vec::new();
    let mut used_additive: BTreeMap<LocusPath, String> = BTreeMap::new();

    let mut status = TraceStatus::Divergent;
    let mut ended_at_daimon_for = None;
    let mut endorsement = None;
    let mut pending_additive = None;

    while let Some(locus) = stack.pop() {
        if !visited.insert(locus.clone()) {
            continue;
        }
        if visited.len() > cfg.max_pairs {
            return Err(StepError::PairBudgetExhausted {
                max_pairs: cfg.max_pairs,
            });
        }

        let pos_proper = unconsumed(pos.proper_at(&locus, Polarity::Positive), &consumed);
        let neg_proper = unconsumed(neg.proper_at(&locus, Polarity::Negative), &consumed);
        let pos_daimon = unconsumed(pos.daimon_at(&locus), &consumed);
        let neg_daimon = unconsumed(neg.daimon_at(&locus), &consumed);

        // A daimon supersedes a proper response from the same side.
        if let Some(daimon) = neg_daimon {
            let accepted = pos_proper;
            push_pair(
                &mut pairs,
                accepted.map(|a| a.id),
                Some(daimon.id),
                &locus,
                &mut consumed,
            );
            status = TraceStatus::Convergent;
            ended_at_daimon_for = Some(neg.role);
            endorsement = accepted.map(|accepted| Endorsement {
                locus: locus.clone(),
                act: accepted.id,
                by: neg.role,
            });
            break;
        }
        if let Some(daimon) = pos_daimon {
            let accepted = neg_proper;
            push_pair(
                &mut pairs,
                Some(daimon.id),
                accepted.map(|a| a.id),
                &locus,
                &mut consumed,
            );
            status = TraceStatus::Convergent;
            ended_at_daimon_for = Some(pos.role);
            endorsement = accepted.map(|accepted| Endorsement {
                locus: locus.clone(),
                act: accepted.id,
                by: pos.role,
            });
            break;
        }

        match (pos_proper, neg_proper) {
            (Some(pos_act), Some(neg_act)) => {
                push_pair(
                    &mut pairs,
                    Some(pos_act.id),
                    Some(neg_act.id),
                    &locus,
                    &mut consumed,
                );
                match advance(pos_act, &locus, &child_map, choices)? {
                    Advance::Children(children) => {
                        for child in children.into_iter().rev() {
                            stack.push(child);
                        }
                    }
                    Advance::ChosenBranch { child, suffix } => {
                        used_additive.insert(locus.clone(), suffix);
                        stack.push(child);
                    }
                    Advance::AwaitingChoice => {
                        status = TraceStatus::Ongoing;
                        pending_additive = Some(locus.clone());
                    }
                }
                if pending_additive.is_some() {
                    break;
                }
            }
            (None, None) => {
                // Nothing played here; descend toward content.
                if let Some(children) = child_map.get(&locus) {
                    for child in children.iter().rev() {
                        stack.push(child.clone());
                    }
                }
            }
            _ => {
                // Required dual response is absent and no daimon applies.
                status = TraceStatus::Divergent;
                break;
            }
        }
    }

    let decisive_indices = if status == TraceStatus::Convergent {
        defense::decisive_indices(&pairs)
    } else {
        Vec::new()
    };

    Ok(InteractionTrace {
        pairs,
        status,
        ended_at_daimon_for,
        endorsement,
        decisive_indices,
        used_additive,
        pending_additive,
    })
}

enum Advance {
    Children(Vec<LocusPath>),
    ChosenBranch { child: LocusPath, suffix: String },
    AwaitingChoice,
}

/// Children implied by a paired positive act's continuation.
fn advance(
    pos_act: &Act,
    locus: &LocusPath,
    child_map: &BTreeMap<LocusPath, BTreeSet<LocusPath>>,
    choices: &AdditiveLedger,
) -> Result<Advance, StepError> {
    if pos_act.is_additive {
        return match choices.chosen(locus) {
            Some(suffix) => {
                let child = locus.child(suffix).map_err(|e| StepError::MalformedDesign {
                    detail: format!("additive choice {suffix:?} at {locus}: {e}"),
                })?;
                Ok(Advance::ChosenBranch {
                    child,
                    suffix: suffix.to_string(),
                })
            }
            None => Ok(Advance::AwaitingChoice),
        };
    }

    let mut children: BTreeSet<LocusPath> = BTreeSet::new();
    for suffix in &pos_act.ramification {
        let child = locus.child(suffix).map_err(|e| StepError::MalformedDesign {
            detail: format!("ramification {suffix:?} at {locus}: {e}"),
        })?;
        children.insert(child);
    }
    if let Some(extra) = child_map.get(locus) {
        children.extend(extra.iter().cloned());
    }
    Ok(Advance::Children(children.into_iter().collect()))
}

/// Parent-to-children map over every locus either design occupies,
/// including empty intermediate ancestors.
fn build_child_map(pos: &Design, neg: &Design) -> BTreeMap<LocusPath, BTreeSet<LocusPath>> {
    let mut map: BTreeMap<LocusPath, BTreeSet<LocusPath>> = BTreeMap::new();
    for act in pos.acts.iter().chain(neg.acts.iter()) {
        let chain = act.locus.ancestry();
        for window in chain.windows(2) {
            map.entry(window[0].clone())
                .or_default()
                .insert(window[1].clone());
        }
    }
    map
}

fn unconsumed<'a>(act: Option<&'a Act>, consumed: &BTreeSet<ActId>) -> Option<&'a Act> {
    act.filter(|a| !consumed.contains(&a.id))
}

fn push_pair(
    pairs: &mut Vec<TracePair>,
    pos_act_id: Option<ActId>,
    neg_act_id: Option<ActId>,
    locus: &LocusPath,
    consumed: &mut BTreeSet<ActId>,
) {
    if let Some(id) = pos_act_id {
        consumed.insert(id);
    }
    if let Some(id) = neg_act_id {
        consumed.insert(id);
    }
    let index = pairs.len();
    pairs.push(TracePair {
        index,
        pos_act_id,
        neg_act_id,
        locus: locus.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::DesignStore;
    use crate::locus::LocusArena;

    fn path(s: &str) -> LocusPath {
        LocusPath::parse(s).unwrap()
    }

    struct Fixture {
        store: DesignStore,
        arena: LocusArena,
        pos: crate::design::DesignId,
        neg: crate::design::DesignId,
    }

    fn fixture() -> Fixture {
        let mut store = DesignStore::new();
        let arena = LocusArena::new();
        let pos = store.create_design(ParticipantRole::Advocate);
        let neg = store.create_design(ParticipantRole::Challenger);
        Fixture {
            store,
            arena,
            pos,
            neg,
        }
    }

    impl Fixture {
        fn step(&self, choices: &AdditiveLedger) -> InteractionTrace {
            step(
                self.store.design(self.pos).unwrap(),
                self.store.design(self.neg).unwrap(),
                choices,
                &StepperConfig::default(),
            )
            .unwrap()
        }
    }

    // -- Convergence --

    #[test]
    fn daimon_against_root_assertion_converges() {
        let mut fx = fixture();
        let asserted = fx
            .store
            .append_act(
                &mut fx.arena,
                fx.pos,
                LocusPath::root(),
                Polarity::Positive,
                "P",
                vec!["1".to_string()],
                false,
            )
            .unwrap();
        fx.store
            .append_daimon(&mut fx.arena, fx.neg, LocusPath::root(), "END")
            .unwrap();

        let trace = fx.step(&AdditiveLedger::new());
        assert_eq!(trace.status, TraceStatus::Convergent);
        assert_eq!(
            trace.ended_at_daimon_for,
            Some(ParticipantRole::Challenger)
        );
        assert_eq!(trace.decisive_indices, vec![0]);
        let endorsement = trace.endorsement.expect("endorsement");
        assert_eq!(endorsement.act, asserted);
        assert_eq!(endorsement.locus, LocusPath::root());
    }

    #[test]
    fn advocate_daimon_attributes_to_advocate() {
        let mut fx = fixture();
        fx.store
            .append_act(
                &mut fx.arena,
                fx.neg,
                LocusPath::root(),
                Polarity::Negative,
                "why",
                vec![],
                false,
            )
            .unwrap();
        fx.store
            .append_daimon(&mut fx.arena, fx.pos, LocusPath::root(), "RETRACT")
            .unwrap();

        let trace = fx.step(&AdditiveLedger::new());
        assert_eq!(trace.status, TraceStatus::Convergent);
        assert_eq!(trace.ended_at_daimon_for, Some(ParticipantRole::Advocate));
    }

    #[test]
    fn daimon_supersedes_same_side_proper_response() {
        let mut fx = fixture();
        fx.store
            .append_act(
                &mut fx.arena,
                fx.pos,
                LocusPath::root(),
                Polarity::Positive,
                "P",
                vec![],
                false,
            )
            .unwrap();
        fx.store
            .append_act(
                &mut fx.arena,
                fx.neg,
                LocusPath::root(),
                Polarity::Negative,
                "why",
                vec![],
                false,
            )
            .unwrap();
        fx.store
            .append_daimon(&mut fx.arena, fx.neg, LocusPath::root(), "CONCEDE")
            .unwrap();

        let trace = fx.step(&AdditiveLedger::new());
        assert_eq!(trace.status, TraceStatus::Convergent);
        assert_eq!(trace.pairs.len(), 1);
    }

    // -- Divergence --

    #[test]
    fn unanswered_assertion_diverges() {
        let mut fx = fixture();
        fx.store
            .append_act(
                &mut fx.arena,
                fx.pos,
                path("0.1"),
                Polarity::Positive,
                "claim",
                vec!["1".to_string()],
                false,
            )
            .unwrap();

        let trace = fx.step(&AdditiveLedger::new());
        assert_eq!(trace.status, TraceStatus::Divergent);
        assert!(trace.pairs.is_empty());
        assert!(trace.decisive_indices.is_empty());
    }

    #[test]
    fn empty_designs_diverge_without_pairs() {
        let fx = fixture();
        let trace = fx.step(&AdditiveLedger::new());
        assert_eq!(trace.status, TraceStatus::Divergent);
        assert!(trace.pairs.is_empty());
    }

    // -- Additive pause and resume --

    fn additive_fixture() -> Fixture {
        let mut fx = fixture();
        fx.store
            .append_act(
                &mut fx.arena,
                fx.pos,
                path("0.1"),
                Polarity::Positive,
                "either way",
                vec!["a".to_string(), "b".to_string()],
                true,
            )
            .unwrap();
        fx.store
            .append_act(
                &mut fx.arena,
                fx.neg,
                path("0.1"),
                Polarity::Negative,
                "which?",
                vec![],
                false,
            )
            .unwrap();
        fx.store
            .append_act(
                &mut fx.arena,
                fx.pos,
                path("0.1.b"),
                Polarity::Positive,
                "branch b",
                vec![],
                false,
            )
            .unwrap();
        fx.store
            .append_daimon(&mut fx.arena, fx.neg, path("0.1.b"), "END")
            .unwrap();
        fx
    }

    #[test]
    fn unresolved_additive_pauses_ongoing() {
        let fx = additive_fixture();
        let trace = fx.step(&AdditiveLedger::new());
        assert_eq!(trace.status, TraceStatus::Ongoing);
        assert_eq!(trace.pending_additive, Some(path("0.1")));
        assert!(trace.used_additive.is_empty());
    }

    #[test]
    fn resolved_additive_explores_only_chosen_branch() {
        let fx = additive_fixture();
        let mut choices = AdditiveLedger::new();
        choices.pick(path("0.1"), "b").unwrap();
        let trace = fx.step(&choices);
        assert_eq!(trace.status, TraceStatus::Convergent);
        assert_eq!(trace.used_additive.get(&path("0.1")), Some(&"b".to_string()));
        assert!(trace.pairs.iter().all(|p| p.locus != path("0.1.a")));
    }

    // -- Determinism --

    #[test]
    fn identical_inputs_step_to_identical_traces() {
        let fx = additive_fixture();
        let mut choices = AdditiveLedger::new();
        choices.pick(path("0.1"), "b").unwrap();
        let first = fx.step(&choices);
        let second = fx.step(&choices);
        assert_eq!(first, second);
        assert_eq!(first.content_hash(), second.content_hash());
    }

    // -- Guards --

    #[test]
    fn same_role_designs_are_rejected() {
        let mut store = DesignStore::new();
        let a = store.create_design(ParticipantRole::Advocate);
        let b = store.create_design(ParticipantRole::Advocate);
        let err = step(
            store.design(a).unwrap(),
            store.design(b).unwrap(),
            &AdditiveLedger::new(),
            &StepperConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            StepError::MismatchedRoles {
                role: ParticipantRole::Advocate
            }
        );
    }

    #[test]
    fn visited_locus_budget_is_enforced() {
        let mut fx = fixture();
        let mut locus = LocusPath::root();
        for _ in 0..5 {
            fx.store
                .append_act(
                    &mut fx.arena,
                    fx.pos,
                    locus.clone(),
                    Polarity::Positive,
                    "chain",
                    vec!["1".to_string()],
                    false,
                )
                .unwrap();
            fx.store
                .append_act(
                    &mut fx.arena,
                    fx.neg,
                    locus.clone(),
                    Polarity::Negative,
                    "why",
                    vec![],
                    false,
                )
                .unwrap();
            locus = locus.child("1").unwrap();
        }
        let err = step(
            fx.store.design(fx.pos).unwrap(),
            fx.store.design(fx.neg).unwrap(),
            &AdditiveLedger::new(),
            &StepperConfig { max_pairs: 2 },
        )
        .unwrap_err();
        assert_eq!(err, StepError::PairBudgetExhausted { max_pairs: 2 });
    }
}
