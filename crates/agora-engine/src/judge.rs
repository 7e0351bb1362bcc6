//! Judge interventions: administrative moves outside normal turn-taking.
//!
//! A judge can settle a stalled sub-dialogue by injecting synthetic acts:
//! - `force_concession` materializes an acknowledged concession as a
//!   Positive proper act at the contested locus in the challenged
//!   (Advocate) design;
//! - `close_branch` terminates a stalled branch with a daimon in the
//!   Challenger design;
//! - `assign_burden` annotates which participant owes the next move and
//!   appends nothing.
//!
//! Re-intervening on a locus that already carries a daimon in the targeted
//! design fails with `LocusAlreadyClosed`; interventions never silently
//! duplicate state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::design::{ActId, AppendError, DesignId, DesignStore, ParticipantRole, Polarity};
use crate::locus::{LocusArena, LocusPath};

// ---------------------------------------------------------------------------
// JudgeError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JudgeError {
    /// The targeted locus already carries a daimon in the targeted design.
    LocusAlreadyClosed { locus: LocusPath },
    /// The underlying append was rejected.
    Append(AppendError),
}

impl fmt::Display for JudgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocusAlreadyClosed { locus } => {
                write!(f, "locus {locus} is already closed")
            }
            Self::Append(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for JudgeError {}

impl From<AppendError> for JudgeError {
    fn from(err: AppendError) -> Self {
        Self::Append(err)
    }
}

// ---------------------------------------------------------------------------
// Burden ledger
// ---------------------------------------------------------------------------

/// Pure annotation of who owes the next move, per locus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurdenLedger {
    assignments: BTreeMap<LocusPath, ParticipantRole>,
}

impl BurdenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The participant currently owing a move at `locus`.
    pub fn owed_by(&self, locus: &LocusPath) -> Option<ParticipantRole> {
        self.assignments.get(locus).copied()
    }

    /// All assignments in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&LocusPath, ParticipantRole)> {
        self.assignments.iter().map(|(k, v)| (k, *v))
    }

    fn assign(&mut self, locus: LocusPath, role: ParticipantRole) {
        self.assignments.insert(locus, role);
    }
}

// ---------------------------------------------------------------------------
// Interventions
// ---------------------------------------------------------------------------

/// Append an acknowledged concession at `locus` into `challenged`.
pub fn force_concession(
    store: &mut DesignStore,
    arena: &mut LocusArena,
    challenged: DesignId,
    locus: LocusPath,
    text: impl Into<String>,
) -> Result<ActId, JudgeError> {
    ensure_open(store, challenged, &locus)?;
    let id = store.append_act(
        arena,
        challenged,
        locus,
        Polarity::Positive,
        text,
        Vec::new(),
        false,
    )?;
    Ok(id)
}

/// Terminate the branch at `locus` with a daimon in `target`.
pub fn close_branch(
    store: &mut DesignStore,
    arena: &mut LocusArena,
    target: DesignId,
    locus: LocusPath,
) -> Result<ActId, JudgeError> {
    ensure_open(store, target, &locus)?;
    let id = store.append_daimon(arena, target, locus, "CLOSED")?;
    Ok(id)
}

/// Record that `role` owes the next move at `locus`. Appends nothing.
///
/// Assigning burden at a closed locus is rejected: there is no next move.
pub fn assign_burden(
    store: &DesignStore,
    burdens: &mut BurdenLedger,
    locus: LocusPath,
    role: ParticipantRole,
) -> Result<(), JudgeError> {
    for design in store.designs() {
        if design.daimon_at(&locus).is_some() {
            return Err(JudgeError::LocusAlreadyClosed { locus });
        }
    }
    burdens.assign(locus, role);
    Ok(())
}

fn ensure_open(
    store: &DesignStore,
    design: DesignId,
    locus: &LocusPath,
) -> Result<(), JudgeError> {
    if store.design(design).is_none() {
        return Err(JudgeError::Append(AppendError::UnknownDesign { design }));
    }
    // A daimon in either design closes the branch for both.
    for design in store.designs() {
        if design.daimon_at(locus).is_some() {
            return Err(JudgeError::LocusAlreadyClosed {
                locus: locus.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> LocusPath {
        LocusPath::parse(s).unwrap()
    }

    fn fixture() -> (DesignStore, LocusArena, DesignId, DesignId) {
        let mut store = DesignStore::new();
        let mut arena = LocusArena::new();
        let advocate = store.create_design(ParticipantRole::Advocate);
        let challenger = store.create_design(ParticipantRole::Challenger);
        store
            .append_act(
                &mut arena,
                advocate,
                LocusPath::root(),
                Polarity::Positive,
                "thesis",
                vec!["1".to_string()],
                false,
            )
            .unwrap();
        (store, arena, advocate, challenger)
    }

    // -- Force concession --

    #[test]
    fn forced_concession_appends_positive_act() {
        let (mut store, mut arena, advocate, _) = fixture();
        let id =
            force_concession(&mut store, &mut arena, advocate, path("0.1"), "granted").unwrap();
        let (_, act) = store.act(id).unwrap();
        assert_eq!(act.polarity, Polarity::Positive);
        assert_eq!(act.locus, path("0.1"));
    }

    #[test]
    fn forced_concession_on_closed_locus_fails() {
        let (mut store, mut arena, advocate, _) = fixture();
        store
            .append_daimon(&mut arena, advocate, path("0.1"), "END")
            .unwrap();
        let err = force_concession(&mut store, &mut arena, advocate, path("0.1"), "granted")
            .unwrap_err();
        assert_eq!(
            err,
            JudgeError::LocusAlreadyClosed {
                locus: path("0.1")
            }
        );
    }

    // -- Close branch --

    #[test]
    fn close_branch_appends_daimon_once() {
        let (mut store, mut arena, _, challenger) = fixture();
        close_branch(&mut store, &mut arena, challenger, path("0.1")).unwrap();
        let err = close_branch(&mut store, &mut arena, challenger, path("0.1")).unwrap_err();
        assert_eq!(
            err,
            JudgeError::LocusAlreadyClosed {
                locus: path("0.1")
            }
        );
    }

    #[test]
    fn closure_in_one_design_blocks_interventions_in_the_other() {
        let (mut store, mut arena, advocate, challenger) = fixture();
        close_branch(&mut store, &mut arena, challenger, path("0.1")).unwrap();
        let err = force_concession(&mut store, &mut arena, advocate, path("0.1"), "granted")
            .unwrap_err();
        assert_eq!(
            err,
            JudgeError::LocusAlreadyClosed {
                locus: path("0.1")
            }
        );
    }

    // -- Burden --

    #[test]
    fn burden_is_annotation_only() {
        let (store, _, _, _) = fixture();
        let mut burdens = BurdenLedger::new();
        assign_burden(
            &store,
            &mut burdens,
            path("0.1"),
            ParticipantRole::Challenger,
        )
        .unwrap();
        assert_eq!(
            burdens.owed_by(&path("0.1")),
            Some(ParticipantRole::Challenger)
        );
        let total_acts: usize = store.designs().map(|d| d.acts.len()).sum();
        assert_eq!(total_acts, 1);
    }

    #[test]
    fn burden_on_closed_locus_fails() {
        let (mut store, mut arena, _, challenger) = fixture();
        close_branch(&mut store, &mut arena, challenger, path("0.1")).unwrap();
        let mut burdens = BurdenLedger::new();
        let err = assign_burden(
            &store,
            &mut burdens,
            path("0.1"),
            ParticipantRole::Advocate,
        )
        .unwrap_err();
        assert_eq!(
            err,
            JudgeError::LocusAlreadyClosed {
                locus: path("0.1")
            }
        );
    }
}
