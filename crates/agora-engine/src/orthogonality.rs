//! Orthogonality checker: do two designs interact to convergence?
//!
//! Runs the stepper to a terminal verdict without mutating any state. The
//! pair is oriented by role, never by argument order: the Advocate-owned
//! design always takes the positive side. Symmetry of the verdict is
//! therefore structural.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::additive::AdditiveLedger;
use crate::design::{Design, ParticipantRole};
use crate::stepper::{self, InteractionTrace, StepError, StepperConfig, TraceStatus};

/// Verdict plus the trace that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrthogonalityReport {
    pub orthogonal: bool,
    pub trace: InteractionTrace,
}

/// Failures of the orthogonality check itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrthogonalityError {
    /// Both designs are owned by the same role; no orientation exists.
    SameRole { role: ParticipantRole },
    /// The underlying walk failed on malformed input.
    Step(StepError),
}

impl fmt::Display for OrthogonalityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SameRole { role } => {
                write!(f, "cannot orient two {role} designs")
            }
            Self::Step(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for OrthogonalityError {}

impl From<StepError> for OrthogonalityError {
    fn from(err: StepError) -> Self {
        Self::Step(err)
    }
}

/// Check whether `a` and `b` interact to convergence.
///
/// Unresolved additive loci block (the verdict is `false` with an
/// `Ongoing` trace), they do not fail.
pub fn check_orthogonal(
    a: &Design,
    b: &Design,
    choices: &AdditiveLedger,
    cfg: &StepperConfig,
) -> Result<OrthogonalityReport, OrthogonalityError> {
    if a.role == b.role {
        return Err(OrthogonalityError::SameRole { role: a.role });
    }
    let (pos, neg) = match a.role {
        ParticipantRole::Advocate => (a, b),
        ParticipantRole::Challenger => (b, a),
    };
    let trace = stepper::step(pos, neg, choices, cfg)?;
    Ok(OrthogonalityReport {
        orthogonal: trace.status == TraceStatus::Convergent,
        trace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{DesignStore, Polarity};
    use crate::locus::{LocusArena, LocusPath};

    fn convergent_pair() -> (DesignStore, crate::design::DesignId, crate::design::DesignId) {
        let mut store = DesignStore::new();
        let mut arena = LocusArena::new();
        let pos = store.create_design(ParticipantRole::Advocate);
        let neg = store.create_design(ParticipantRole::Challenger);
        store
            .append_act(
                &mut arena,
                pos,
                LocusPath::root(),
                Polarity::Positive,
                "P",
                vec![],
                false,
            )
            .unwrap();
        store
            .append_daimon(&mut arena, neg, LocusPath::root(), "END")
            .unwrap();
        (store, pos, neg)
    }

    #[test]
    fn convergent_designs_are_orthogonal() {
        let (store, pos, neg) = convergent_pair();
        let report = check_orthogonal(
            store.design(pos).unwrap(),
            store.design(neg).unwrap(),
            &AdditiveLedger::new(),
            &StepperConfig::default(),
        )
        .unwrap();
        assert!(report.orthogonal);
    }

    #[test]
    fn verdict_is_symmetric_in_argument_order() {
        let (store, pos, neg) = convergent_pair();
        let ledger = AdditiveLedger::new();
        let cfg = StepperConfig::default();
        let ab = check_orthogonal(
            store.design(pos).unwrap(),
            store.design(neg).unwrap(),
            &ledger,
            &cfg,
        )
        .unwrap();
        let ba = check_orthogonal(
            store.design(neg).unwrap(),
            store.design(pos).unwrap(),
            &ledger,
            &cfg,
        )
        .unwrap();
        assert_eq!(ab.orthogonal, ba.orthogonal);
        assert_eq!(ab.trace, ba.trace);
    }

    #[test]
    fn same_role_pair_is_rejected() {
        let mut store = DesignStore::new();
        let a = store.create_design(ParticipantRole::Challenger);
        let b = store.create_design(ParticipantRole::Challenger);
        let err = check_orthogonal(
            store.design(a).unwrap(),
            store.design(b).unwrap(),
            &AdditiveLedger::new(),
            &StepperConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            OrthogonalityError::SameRole {
                role: ParticipantRole::Challenger
            }
        );
    }

    #[test]
    fn divergent_designs_are_not_orthogonal() {
        let mut store = DesignStore::new();
        let mut arena = LocusArena::new();
        let pos = store.create_design(ParticipantRole::Advocate);
        let neg = store.create_design(ParticipantRole::Challenger);
        store
            .append_act(
                &mut arena,
                pos,
                LocusPath::root(),
                Polarity::Positive,
                "unanswered",
                vec![],
                false,
            )
            .unwrap();
        let report = check_orthogonal(
            store.design(pos).unwrap(),
            store.design(neg).unwrap(),
            &AdditiveLedger::new(),
            &StepperConfig::default(),
        )
        .unwrap();
        assert!(!report.orthogonal);
    }
}
