//! Move compiler: dialogue moves into per-role act sequences.
//!
//! External participant actions arrive as a chronologically ordered move
//! log. Compilation replays that log into the acts each role's design
//! should hold, tracking per-target anchors and per-parent child counters
//! so follow-up challenges and grounds land where the pairing walk will
//! meet them:
//!
//! - `Assert` opens a fresh top-level locus (or an explicit one);
//! - `Why` places the challenge at the anchor locus itself, where it pairs
//!   with the assertion;
//! - `Grounds` answers at a fresh child of the anchor and re-anchors there;
//! - `Retract` abandons the line with an Advocate daimon;
//! - `Concede` and `Close` terminate with a Challenger daimon.
//!
//! Compilation is pure: no store mutation, no clock. Identical move logs
//! compile to identical act lists.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::design::{ActKind, ParticipantRole, Polarity};
use crate::locus::{LocusParseError, LocusPath};

// ---------------------------------------------------------------------------
// Move model
// ---------------------------------------------------------------------------

/// The closed set of dialogue move kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    Assert,
    Why,
    Grounds,
    Retract,
    Concede,
    Close,
}

impl MoveKind {
    /// The role that plays this kind when the move does not say.
    pub fn default_actor(self) -> ParticipantRole {
        match self {
            Self::Assert | Self::Grounds | Self::Retract => ParticipantRole::Advocate,
            Self::Why | Self::Concede | Self::Close => ParticipantRole::Challenger,
        }
    }
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Assert => "assert",
            Self::Why => "why",
            Self::Grounds => "grounds",
            Self::Retract => "retract",
            Self::Concede => "concede",
            Self::Close => "close",
        };
        f.write_str(s)
    }
}

/// One entry of the external move log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueMove {
    pub kind: MoveKind,
    /// Acting participant; defaults per kind.
    #[serde(default)]
    pub actor: Option<ParticipantRole>,
    /// Anchor key (the claim or argument this move targets).
    #[serde(default)]
    pub target: Option<String>,
    /// Explicit placement overriding anchor inference.
    #[serde(default)]
    pub locus: Option<LocusPath>,
    /// Explicit child suffix for `Grounds`.
    #[serde(default)]
    pub child_suffix: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    /// Marks the opened locus as an exclusive-choice branch point.
    #[serde(default)]
    pub is_additive: bool,
    /// Child suffixes the assertion opens; defaults to `["1"]`.
    #[serde(default)]
    pub ramification: Option<Vec<String>>,
    /// Append a closing daimon right after this move.
    #[serde(default)]
    pub ends_with_daimon: bool,
}

impl DialogueMove {
    /// A bare move of `kind` with everything else defaulted.
    pub fn of(kind: MoveKind) -> Self {
        Self {
            kind,
            actor: None,
            target: None,
            locus: None,
            child_suffix: None,
            expression: None,
            is_additive: false,
            ramification: None,
            ends_with_daimon: false,
        }
    }
}

/// One act the compiler wants appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledAct {
    pub role: ParticipantRole,
    pub kind: ActKind,
    pub polarity: Polarity,
    pub locus: LocusPath,
    pub expression: String,
    pub ramification: Vec<String>,
    pub is_additive: bool,
}

/// Compilation failure: a move produced an unrepresentable locus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    pub move_index: usize,
    pub cause: LocusParseError,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "move {} compiles to bad locus: {}", self.move_index, self.cause)
    }
}

impl std::error::Error for CompileError {}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Replay `moves` into the act lists the two designs should hold.
pub fn compile_moves(moves: &[DialogueMove]) -> Result<Vec<CompiledAct>, CompileError> {
    let mut out = Vec::new();
    let mut next_top = 0u32;
    let mut last_assert: Option<LocusPath> = None;
    let mut anchors: BTreeMap<String, LocusPath> = BTreeMap::new();
    let mut child_counters: BTreeMap<LocusPath, u32> = BTreeMap::new();

    for (move_index, mv) in moves.iter().enumerate() {
        let actor = mv.actor.unwrap_or_else(|| mv.kind.default_actor());
        let bad = |cause: LocusParseError| CompileError { move_index, cause };

        match mv.kind {
            MoveKind::Assert => {
                let locus = match &mv.locus {
                    Some(locus) => locus.clone(),
                    None => {
                        next_top += 1;
                        LocusPath::root()
                            .child(&next_top.to_string())
                            .map_err(bad)?
                    }
                };
                let expression = mv.expression.clone().unwrap_or_default();
                out.push(CompiledAct {
                    role: actor,
                    kind: ActKind::Proper,
                    polarity: Polarity::Positive,
                    locus: locus.clone(),
                    expression,
                    ramification: mv
                        .ramification
                        .clone()
                        .unwrap_or_else(|| vec!["1".to_string()]),
                    is_additive: mv.is_additive,
                });
                if let Some(target) = &mv.target {
                    anchors.insert(target.clone(), locus.clone());
                }
                last_assert = Some(locus.clone());
                if mv.ends_with_daimon {
                    out.push(daimon(actor, locus, "END"));
                    last_assert = None;
                }
            }
            MoveKind::Why => {
                let anchor = resolve_anchor(mv, &anchors, &last_assert);
                out.push(CompiledAct {
                    role: actor,
                    kind: ActKind::Proper,
                    polarity: Polarity::Negative,
                    locus: anchor.clone(),
                    expression: mv.expression.clone().unwrap_or_default(),
                    ramification: mv.ramification.clone().unwrap_or_default(),
                    is_additive: false,
                });
                if let Some(target) = &mv.target {
                    anchors.insert(target.clone(), anchor);
                }
            }
            MoveKind::Grounds => {
                let parent = resolve_anchor(mv, &anchors, &last_assert);
                let suffix = match &mv.child_suffix {
                    Some(suffix) => suffix.clone(),
                    None => {
                        let counter = child_counters.entry(parent.clone()).or_insert(0);
                        *counter += 1;
                        counter.to_string()
                    }
                };
                let child = parent.child(&suffix).map_err(bad)?;
                out.push(CompiledAct {
                    role: actor,
                    kind: ActKind::Proper,
                    polarity: Polarity::Positive,
                    locus: child.clone(),
                    expression: mv.expression.clone().unwrap_or_default(),
                    ramification: mv
                        .ramification
                        .clone()
                        .unwrap_or_else(|| vec!["1".to_string()]),
                    is_additive: mv.is_additive,
                });
                if let Some(target) = &mv.target {
                    anchors.insert(target.clone(), child.clone());
                }
                if mv.ends_with_daimon {
                    out.push(daimon(actor, child, "END"));
                }
            }
            MoveKind::Retract => {
                let anchor = resolve_anchor(mv, &anchors, &last_assert);
                out.push(daimon(
                    actor,
                    anchor,
                    mv.expression.as_deref().unwrap_or("RETRACT"),
                ));
                last_assert = None;
            }
            MoveKind::Concede => {
                let anchor = resolve_anchor(mv, &anchors, &last_assert);
                out.push(daimon(
                    actor,
                    anchor,
                    mv.expression.as_deref().unwrap_or("CONCEDE"),
                ));
            }
            MoveKind::Close => {
                let anchor = resolve_anchor(mv, &anchors, &last_assert);
                out.push(daimon(
                    actor,
                    anchor,
                    mv.expression.as_deref().unwrap_or("END"),
                ));
            }
        }
    }
    Ok(out)
}

fn resolve_anchor(
    mv: &DialogueMove,
    anchors: &BTreeMap<String, LocusPath>,
    last_assert: &Option<LocusPath>,
) -> LocusPath {
    if let Some(locus) = &mv.locus {
        return locus.clone();
    }
    if let Some(target) = &mv.target {
        if let Some(anchor) = anchors.get(target) {
            return anchor.clone();
        }
    }
    last_assert.clone().unwrap_or_else(LocusPath::root)
}

fn daimon(role: ParticipantRole, locus: LocusPath, expression: &str) -> CompiledAct {
    CompiledAct {
        role,
        kind: ActKind::Daimon,
        polarity: match role {
            ParticipantRole::Advocate => Polarity::Positive,
            ParticipantRole::Challenger => Polarity::Negative,
        },
        locus,
        expression: expression.to_string(),
        ramification: Vec::new(),
        is_additive: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_move(target: &str, text: &str) -> DialogueMove {
        DialogueMove {
            target: Some(target.to_string()),
            expression: Some(text.to_string()),
            ..DialogueMove::of(MoveKind::Assert)
        }
    }

    fn why(target: &str) -> DialogueMove {
        DialogueMove {
            target: Some(target.to_string()),
            ..DialogueMove::of(MoveKind::Why)
        }
    }

    fn grounds(target: &str, text: &str) -> DialogueMove {
        DialogueMove {
            target: Some(target.to_string()),
            expression: Some(text.to_string()),
            ..DialogueMove::of(MoveKind::Grounds)
        }
    }

    // -- Placement --

    #[test]
    fn asserts_take_fresh_top_level_loci() {
        let acts =
            compile_moves(&[assert_move("c1", "first"), assert_move("c2", "second")]).unwrap();
        assert_eq!(acts[0].locus.as_str(), "0.1");
        assert_eq!(acts[1].locus.as_str(), "0.2");
    }

    #[test]
    fn why_lands_at_the_assertion_locus() {
        let acts = compile_moves(&[assert_move("c1", "claim"), why("c1")]).unwrap();
        assert_eq!(acts[1].locus, acts[0].locus);
        assert_eq!(acts[1].polarity, Polarity::Negative);
        assert_eq!(acts[1].role, ParticipantRole::Challenger);
    }

    #[test]
    fn grounds_answer_at_a_fresh_child_and_reanchor() {
        let acts = compile_moves(&[
            assert_move("c1", "claim"),
            why("c1"),
            grounds("c1", "evidence"),
            why("c1"),
        ])
        .unwrap();
        assert_eq!(acts[2].locus.as_str(), "0.1.1");
        // The follow-up challenge targets the grounds, not the assertion.
        assert_eq!(acts[3].locus.as_str(), "0.1.1");
    }

    #[test]
    fn sibling_grounds_get_distinct_children() {
        let acts = compile_moves(&[
            assert_move("c1", "claim"),
            DialogueMove {
                locus: Some(LocusPath::parse("0.1").unwrap()),
                expression: Some("one".to_string()),
                ..DialogueMove::of(MoveKind::Grounds)
            },
            DialogueMove {
                locus: Some(LocusPath::parse("0.1").unwrap()),
                expression: Some("two".to_string()),
                ..DialogueMove::of(MoveKind::Grounds)
            },
        ])
        .unwrap();
        assert_eq!(acts[1].locus.as_str(), "0.1.1");
        assert_eq!(acts[2].locus.as_str(), "0.1.2");
    }

    #[test]
    fn explicit_locus_overrides_inference() {
        let acts = compile_moves(&[DialogueMove {
            locus: Some(LocusPath::parse("0.7").unwrap()),
            ..DialogueMove::of(MoveKind::Assert)
        }])
        .unwrap();
        assert_eq!(acts[0].locus.as_str(), "0.7");
    }

    // -- Terminators --

    #[test]
    fn retract_compiles_to_advocate_daimon() {
        let acts = compile_moves(&[
            assert_move("c1", "claim"),
            DialogueMove {
                target: Some("c1".to_string()),
                ..DialogueMove::of(MoveKind::Retract)
            },
        ])
        .unwrap();
        assert_eq!(acts[1].kind, ActKind::Daimon);
        assert_eq!(acts[1].role, ParticipantRole::Advocate);
        assert_eq!(acts[1].expression, "RETRACT");
    }

    #[test]
    fn concede_compiles_to_challenger_daimon_at_anchor() {
        let acts = compile_moves(&[
            assert_move("c1", "claim"),
            DialogueMove {
                target: Some("c1".to_string()),
                ..DialogueMove::of(MoveKind::Concede)
            },
        ])
        .unwrap();
        assert_eq!(acts[1].kind, ActKind::Daimon);
        assert_eq!(acts[1].role, ParticipantRole::Challenger);
        assert_eq!(acts[1].locus, acts[0].locus);
    }

    #[test]
    fn assertion_with_trailing_daimon_emits_both() {
        let acts = compile_moves(&[DialogueMove {
            ends_with_daimon: true,
            ..assert_move("c1", "claim")
        }])
        .unwrap();
        assert_eq!(acts.len(), 2);
        assert_eq!(acts[1].kind, ActKind::Daimon);
        assert_eq!(acts[1].locus, acts[0].locus);
    }

    // -- Determinism --

    #[test]
    fn identical_logs_compile_identically() {
        let log = vec![
            assert_move("c1", "claim"),
            why("c1"),
            grounds("c1", "evidence"),
            DialogueMove {
                target: Some("c1".to_string()),
                ..DialogueMove::of(MoveKind::Concede)
            },
        ];
        assert_eq!(compile_moves(&log).unwrap(), compile_moves(&log).unwrap());
    }
}
