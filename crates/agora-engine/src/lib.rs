//! Deterministic dialogue interaction engine and representative viewpoint
//! selector for deliberation platforms.
//!
//! Two independent subsystems share this crate:
//!
//! - the **interaction engine**: a two-party game-semantics interpreter
//!   that pairs dual acts at matching tree addresses, decides convergence,
//!   resolves exclusive-choice branch points, and reconstructs the minimal
//!   subsequence explaining an acceptance;
//! - the **viewpoint selector**: a constrained greedy optimizer choosing
//!   `k` internally consistent argument subsets representing a voter
//!   population, with an optional proportional-representation guarantee.
//!
//! Both are synchronous, allocation-light, and deterministic: identical
//! inputs produce byte-identical outputs. The [`engine::DialogueEngine`]
//! facade adds per-dialogue locking, recompute notifications, and clock
//! stamping on top of the pure modules.

#![forbid(unsafe_code)]

pub mod additive;
pub mod compile;
pub mod coverage;
pub mod defense;
pub mod design;
pub mod engine;
pub mod error_code;
pub mod judge;
pub mod locus;
pub mod orthogonality;
pub mod selector;
pub mod stepper;

use thiserror::Error;

pub use crate::additive::{AdditiveLedger, ChoiceAlreadyConsumed};
pub use crate::compile::{CompileError, DialogueMove, MoveKind};
pub use crate::coverage::{ArgumentId, ConflictGraph, CoverageIndex, VoterId};
pub use crate::design::{
    Act, ActId, ActKind, AppendError, Design, DesignId, DesignStore, DesignTree,
    ParticipantRole, Polarity,
};
pub use crate::engine::{
    AdditiveOffer, Clock, CompileOutcome, CompilePhase, DialogueEngine, DialogueId, Recomputed,
    StampedTrace,
};
pub use crate::judge::JudgeError;
pub use crate::locus::{LocusArena, LocusParseError, LocusPath};
pub use crate::orthogonality::{OrthogonalityError, OrthogonalityReport};
pub use crate::selector::{Selection, SelectionRule, SelectorConfig, SelectorError, View};
pub use crate::stepper::{
    Endorsement, InteractionTrace, StepError, StepperConfig, TracePair, TraceStatus,
};

/// Crate-level error returned by the [`engine::DialogueEngine`] facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{0}")]
    Append(#[from] AppendError),
    #[error("{0}")]
    Additive(#[from] ChoiceAlreadyConsumed),
    #[error("{0}")]
    Judge(#[from] JudgeError),
    #[error("{0}")]
    Step(#[from] StepError),
    #[error("{0}")]
    Orthogonality(#[from] OrthogonalityError),
    #[error("{0}")]
    Compile(#[from] CompileError),
    #[error("{0}")]
    Locus(#[from] LocusParseError),
    #[error("{0}")]
    Selector(#[from] SelectorError),
    #[error("unknown dialogue {dialogue}")]
    NotFound { dialogue: DialogueId },
}
