//! Dialogue engine facade: state registry, locking, and notifications.
//!
//! Owns the per-dialogue state (two designs, the shared locus arena, the
//! additive ledger, burden annotations, the external move log) behind a
//! per-dialogue mutex. Mutations serialize through that mutex, so two
//! concurrent appends to the same locus and polarity can never both
//! succeed. Reads clone a snapshot under the lock and compute outside it.
//!
//! Every mutating operation re-steps the trace and emits one `Recomputed`
//! notification to subscribers; selection requests emit a scope-keyed
//! notification. Timestamps come from an injected clock so the engine
//! stays deterministic under test.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::additive::AdditiveLedger;
use crate::compile::{self, CompiledAct, DialogueMove};
use crate::coverage::{ArgumentId, ConflictGraph, CoverageIndex, VoterId};
use crate::design::{
    ActId, ActKind, DesignId, DesignStore, DesignTree, ParticipantRole, Polarity,
};
use crate::judge::{self, BurdenLedger};
use crate::locus::{LocusArena, LocusPath};
use crate::orthogonality::{self, OrthogonalityReport};
use crate::selector::{self, Selection, SelectionRule, SelectorConfig};
use crate::stepper::{self, InteractionTrace, StepperConfig, TraceStatus};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Identifiers and clock
// ---------------------------------------------------------------------------

/// Identifier of a dialogue within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialogueId(pub u64);

impl fmt::Display for DialogueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dialogue:{}", self.0)
    }
}

/// Time source injected at construction; fixed in tests.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(at) => *at,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Recompute notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recomputed {
    Dialogue {
        dialogue_id: DialogueId,
        at: DateTime<Utc>,
    },
    Selection {
        scope: String,
        at: DateTime<Utc>,
    },
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A freshly computed trace plus its computation timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedTrace {
    pub trace: InteractionTrace,
    pub computed_at: DateTime<Utc>,
}

/// Which side's unresolved additive loci are offered first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilePhase {
    Neutral,
    FocusAdvocate,
    FocusChallenger,
}

/// An unresolved additive branch point awaiting a pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditiveOffer {
    pub locus: LocusPath,
    pub owner: ParticipantRole,
}

/// Result of recompiling a dialogue from its move log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutcome {
    pub trace: InteractionTrace,
    /// Unresolved additive loci, focus side first, address order within.
    pub offers: Vec<AdditiveOffer>,
    /// Acts the tolerant replay dropped (slot or orphan violations).
    pub skipped: usize,
    pub computed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Per-dialogue state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct DialogueState {
    advocate: DesignId,
    challenger: DesignId,
    store: DesignStore,
    arena: LocusArena,
    choices: AdditiveLedger,
    burdens: BurdenLedger,
    moves: Vec<DialogueMove>,
}

impl DialogueState {
    fn new() -> Self {
        let mut store = DesignStore::new();
        let advocate = store.create_design(ParticipantRole::Advocate);
        let challenger = store.create_design(ParticipantRole::Challenger);
        Self {
            advocate,
            challenger,
            store,
            arena: LocusArena::new(),
            choices: AdditiveLedger::new(),
            burdens: BurdenLedger::new(),
            moves: Vec::new(),
        }
    }

    fn design_for(&self, role: ParticipantRole) -> DesignId {
        match role {
            ParticipantRole::Advocate => self.advocate,
            ParticipantRole::Challenger => self.challenger,
        }
    }

    fn step(&self, cfg: &StepperConfig) -> Result<InteractionTrace, EngineError> {
        let pos = self
            .store
            .design(self.advocate)
            .expect("advocate design exists");
        let neg = self
            .store
            .design(self.challenger)
            .expect("challenger design exists");
        Ok(stepper::step(pos, neg, &self.choices, cfg)?)
    }

    /// Unresolved additive loci of both designs.
    fn offers(&self, phase: CompilePhase) -> Vec<AdditiveOffer> {
        let collect = |role: ParticipantRole| -> Vec<AdditiveOffer> {
            let design = self
                .store
                .design(self.design_for(role))
                .expect("design exists");
            design
                .acts
                .iter()
                .filter(|act| act.is_additive && self.choices.chosen(&act.locus).is_none())
                .map(|act| AdditiveOffer {
                    locus: act.locus.clone(),
                    owner: role,
                })
                .collect()
        };
        let (first, second) = match phase {
            CompilePhase::FocusChallenger => {
                (ParticipantRole::Challenger, ParticipantRole::Advocate)
            }
            CompilePhase::Neutral | CompilePhase::FocusAdvocate => {
                (ParticipantRole::Advocate, ParticipantRole::Challenger)
            }
        };
        let mut offers = collect(first);
        offers.extend(collect(second));
        offers
    }
}

// ---------------------------------------------------------------------------
// DialogueEngine
// ---------------------------------------------------------------------------

/// Facade over the pure interaction and selection modules.
pub struct DialogueEngine {
    dialogues: RwLock<BTreeMap<DialogueId, Arc<Mutex<DialogueState>>>>,
    next_dialogue: Mutex<u64>,
    subscribers: Mutex<Vec<Sender<Recomputed>>>,
    clock: Clock,
    stepper_cfg: StepperConfig,
    selector_cfg: SelectorConfig,
}

impl DialogueEngine {
    pub fn new(clock: Clock, stepper_cfg: StepperConfig, selector_cfg: SelectorConfig) -> Self {
        Self {
            dialogues: RwLock::new(BTreeMap::new()),
            next_dialogue: Mutex::new(0),
            subscribers: Mutex::new(Vec::new()),
            clock,
            stepper_cfg,
            selector_cfg,
        }
    }

    /// Subscribe to recompute notifications.
    pub fn subscribe(&self) -> Receiver<Recomputed> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().expect("subscriber lock").push(tx);
        rx
    }

    /// Create an empty dialogue with one design per role.
    pub fn create_dialogue(&self) -> DialogueId {
        let mut next = self.next_dialogue.lock().expect("id lock");
        let id = DialogueId(*next);
        *next += 1;
        self.dialogues
            .write()
            .expect("dialogue registry lock")
            .insert(id, Arc::new(Mutex::new(DialogueState::new())));
        debug!(dialogue = %id, "dialogue created");
        id
    }

    /// Append a proper act to one side's design, then re-step.
    #[allow(clippy::too_many_arguments)]
    pub fn append_act(
        &self,
        dialogue: DialogueId,
        role: ParticipantRole,
        locus: LocusPath,
        polarity: Polarity,
        expression: impl Into<String>,
        ramification: Vec<String>,
        is_additive: bool,
    ) -> Result<(ActId, StampedTrace), EngineError> {
        let state = self.state(dialogue)?;
        let mut guard = state.lock().expect("dialogue lock");
        let state = &mut *guard;
        let design = state.design_for(role);
        let act = state.store.append_act(
            &mut state.arena,
            design,
            locus,
            polarity,
            expression,
            ramification,
            is_additive,
        )?;
        let stamped = self.refresh(dialogue, state)?;
        Ok((act, stamped))
    }

    /// Append a daimon to one side's design, then re-step.
    pub fn append_daimon(
        &self,
        dialogue: DialogueId,
        role: ParticipantRole,
        locus: LocusPath,
        expression: impl Into<String>,
    ) -> Result<(ActId, StampedTrace), EngineError> {
        let state = self.state(dialogue)?;
        let mut guard = state.lock().expect("dialogue lock");
        let state = &mut *guard;
        let design = state.design_for(role);
        let act = state
            .store
            .append_daimon(&mut state.arena, design, locus, expression)?;
        let stamped = self.refresh(dialogue, state)?;
        Ok((act, stamped))
    }

    /// Recompute the trace from the current designs.
    pub fn step(&self, dialogue: DialogueId) -> Result<StampedTrace, EngineError> {
        let state = self.state(dialogue)?;
        let snapshot = state.lock().expect("dialogue lock").clone();
        let trace = snapshot.step(&self.stepper_cfg)?;
        Ok(StampedTrace {
            trace,
            computed_at: self.clock.now(),
        })
    }

    /// Record an external move without recompiling.
    pub fn record_move(
        &self,
        dialogue: DialogueId,
        mv: DialogueMove,
    ) -> Result<(), EngineError> {
        let state = self.state(dialogue)?;
        state.lock().expect("dialogue lock").moves.push(mv);
        Ok(())
    }

    /// Rebuild both designs from the move log, then re-step.
    ///
    /// The replay is tolerant: acts that violate slot or additive
    /// invariants are skipped and counted, never silently merged.
    pub fn compile(
        &self,
        dialogue: DialogueId,
        phase: CompilePhase,
    ) -> Result<CompileOutcome, EngineError> {
        let state = self.state(dialogue)?;
        let mut guard = state.lock().expect("dialogue lock");
        let state = &mut *guard;
        let compiled = compile::compile_moves(&state.moves)?;

        state.store.remove_design(state.advocate);
        state.store.remove_design(state.challenger);
        state.advocate = state.store.create_design(ParticipantRole::Advocate);
        state.challenger = state.store.create_design(ParticipantRole::Challenger);
        state.arena = LocusArena::new();

        let mut skipped = 0usize;
        for act in &compiled {
            if let Err(err) = apply_compiled(state, act) {
                warn!(dialogue = %dialogue, %err, "compiled act skipped");
                skipped += 1;
            }
        }
        for (parent, suffix) in collect_choices(&state.choices) {
            state.store.commit_branch(state.advocate, &parent, &suffix);
        }

        let stamped = self.refresh(dialogue, state)?;
        Ok(CompileOutcome {
            offers: state.offers(phase),
            trace: stamped.trace,
            skipped,
            computed_at: stamped.computed_at,
        })
    }

    /// Record an additive choice, then re-step.
    pub fn pick_additive(
        &self,
        dialogue: DialogueId,
        parent: LocusPath,
        child_suffix: impl Into<String>,
    ) -> Result<StampedTrace, EngineError> {
        let state = self.state(dialogue)?;
        let mut guard = state.lock().expect("dialogue lock");
        let state = &mut *guard;
        let suffix = child_suffix.into();
        state.choices.pick(parent.clone(), suffix.clone())?;
        state.store.commit_branch(state.advocate, &parent, &suffix);
        self.refresh(dialogue, state)
    }

    /// Run the orthogonality check on the dialogue's two designs.
    pub fn orthogonal(
        &self,
        dialogue: DialogueId,
    ) -> Result<OrthogonalityReport, EngineError> {
        let state = self.state(dialogue)?;
        let snapshot = state.lock().expect("dialogue lock").clone();
        let a = snapshot
            .store
            .design(snapshot.advocate)
            .expect("advocate design exists");
        let b = snapshot
            .store
            .design(snapshot.challenger)
            .expect("challenger design exists");
        Ok(orthogonality::check_orthogonal(
            a,
            b,
            &snapshot.choices,
            &self.stepper_cfg,
        )?)
    }

    /// Judge: force an acknowledged concession into the challenged design.
    pub fn force_concession(
        &self,
        dialogue: DialogueId,
        locus: LocusPath,
        text: impl Into<String>,
    ) -> Result<StampedTrace, EngineError> {
        let state = self.state(dialogue)?;
        let mut guard = state.lock().expect("dialogue lock");
        let state = &mut *guard;
        judge::force_concession(&mut state.store, &mut state.arena, state.advocate, locus, text)?;
        self.refresh(dialogue, state)
    }

    /// Judge: close a stalled branch with a challenger daimon.
    pub fn close_branch(
        &self,
        dialogue: DialogueId,
        locus: LocusPath,
    ) -> Result<StampedTrace, EngineError> {
        let state = self.state(dialogue)?;
        let mut guard = state.lock().expect("dialogue lock");
        let state = &mut *guard;
        judge::close_branch(&mut state.store, &mut state.arena, state.challenger, locus)?;
        self.refresh(dialogue, state)
    }

    /// Judge: annotate who owes the next move, then re-step.
    pub fn assign_burden(
        &self,
        dialogue: DialogueId,
        locus: LocusPath,
        role: ParticipantRole,
    ) -> Result<StampedTrace, EngineError> {
        let state = self.state(dialogue)?;
        let mut guard = state.lock().expect("dialogue lock");
        let state = &mut *guard;
        judge::assign_burden(&state.store, &mut state.burdens, locus, role)?;
        self.refresh(dialogue, state)
    }

    /// Read-only tree view of one side's design.
    pub fn design_tree(
        &self,
        dialogue: DialogueId,
        role: ParticipantRole,
    ) -> Result<DesignTree, EngineError> {
        let state = self.state(dialogue)?;
        let snapshot = state.lock().expect("dialogue lock").clone();
        let design = snapshot
            .store
            .design(snapshot.design_for(role))
            .expect("design exists");
        Ok(design.as_tree(&snapshot.arena))
    }

    /// The participant owing the next move at `locus`, if assigned.
    pub fn burden_at(
        &self,
        dialogue: DialogueId,
        locus: &LocusPath,
    ) -> Result<Option<ParticipantRole>, EngineError> {
        let state = self.state(dialogue)?;
        let state = state.lock().expect("dialogue lock");
        Ok(state.burdens.owed_by(locus))
    }

    /// Run the viewpoint selector over a deliberation snapshot.
    pub fn select(
        &self,
        scope: impl Into<String>,
        arguments: &[ArgumentId],
        approvals: &[(VoterId, ArgumentId)],
        conflicts: &[(ArgumentId, ArgumentId)],
        rule: SelectionRule,
        k: usize,
    ) -> Result<Selection, EngineError> {
        let scope = scope.into();
        let coverage = CoverageIndex::build(arguments, approvals);
        let graph = ConflictGraph::build(conflicts);
        let selection = selector::select(arguments, &coverage, &graph, rule, k, &self.selector_cfg)?;
        self.notify(Recomputed::Selection {
            scope,
            at: self.clock.now(),
        });
        Ok(selection)
    }

    // -- internals --

    fn state(&self, dialogue: DialogueId) -> Result<Arc<Mutex<DialogueState>>, EngineError> {
        self.dialogues
            .read()
            .expect("dialogue registry lock")
            .get(&dialogue)
            .cloned()
            .ok_or(EngineError::NotFound { dialogue })
    }

    /// Re-step under the caller's lock and broadcast one notification.
    fn refresh(
        &self,
        dialogue: DialogueId,
        state: &DialogueState,
    ) -> Result<StampedTrace, EngineError> {
        let trace = state.step(&self.stepper_cfg)?;
        if trace.status == TraceStatus::Convergent {
            info!(dialogue = %dialogue, hash = %trace.content_hash(), "interaction convergent");
        }
        let at = self.clock.now();
        self.notify(Recomputed::Dialogue {
            dialogue_id: dialogue,
            at,
        });
        Ok(StampedTrace {
            trace,
            computed_at: at,
        })
    }

    fn notify(&self, event: Recomputed) {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock");
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for DialogueEngine {
    fn default() -> Self {
        Self::new(
            Clock::System,
            StepperConfig::default(),
            SelectorConfig::default(),
        )
    }
}

fn apply_compiled(state: &mut DialogueState, act: &CompiledAct) -> Result<ActId, EngineError> {
    let design = state.design_for(act.role);
    let outcome = match act.kind {
        ActKind::Proper => state.store.append_act(
            &mut state.arena,
            design,
            act.locus.clone(),
            act.polarity,
            act.expression.clone(),
            act.ramification.clone(),
            act.is_additive,
        ),
        ActKind::Daimon => state.store.append_daimon(
            &mut state.arena,
            design,
            act.locus.clone(),
            act.expression.clone(),
        ),
    };
    Ok(outcome?)
}

fn collect_choices(choices: &AdditiveLedger) -> Vec<(LocusPath, String)> {
    choices
        .iter()
        .map(|(parent, suffix)| (parent.clone(), suffix.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::additive::ChoiceAlreadyConsumed;
    use crate::compile::MoveKind;
    use crate::design::AppendError;

    fn engine() -> DialogueEngine {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        DialogueEngine::new(
            Clock::Fixed(at),
            StepperConfig::default(),
            SelectorConfig::default(),
        )
    }

    fn path(s: &str) -> LocusPath {
        LocusPath::parse(s).unwrap()
    }

    // -- Lookup --

    #[test]
    fn unknown_dialogue_is_not_found() {
        let engine = engine();
        let err = engine.step(DialogueId(42)).unwrap_err();
        assert_eq!(
            err,
            EngineError::NotFound {
                dialogue: DialogueId(42)
            }
        );
    }

    // -- Mutation and notification --

    #[test]
    fn each_mutation_emits_exactly_one_notification() {
        let engine = engine();
        let rx = engine.subscribe();
        let dialogue = engine.create_dialogue();
        engine
            .append_act(
                dialogue,
                ParticipantRole::Advocate,
                LocusPath::root(),
                Polarity::Positive,
                "P",
                vec!["1".to_string()],
                false,
            )
            .unwrap();
        engine
            .append_daimon(dialogue, ParticipantRole::Challenger, LocusPath::root(), "END")
            .unwrap();
        let events: Vec<Recomputed> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|event| matches!(event, Recomputed::Dialogue { dialogue_id, .. } if *dialogue_id == dialogue)));
    }

    #[test]
    fn append_then_step_converges() {
        let engine = engine();
        let dialogue = engine.create_dialogue();
        engine
            .append_act(
                dialogue,
                ParticipantRole::Advocate,
                LocusPath::root(),
                Polarity::Positive,
                "P",
                vec!["1".to_string()],
                false,
            )
            .unwrap();
        let (_, stamped) = engine
            .append_daimon(dialogue, ParticipantRole::Challenger, LocusPath::root(), "END")
            .unwrap();
        assert_eq!(stamped.trace.status, TraceStatus::Convergent);
        assert_eq!(
            stamped.trace.ended_at_daimon_for,
            Some(ParticipantRole::Challenger)
        );
        // The stand-alone step API reproduces the same trace.
        let again = engine.step(dialogue).unwrap();
        assert_eq!(again.trace, stamped.trace);
    }

    // -- Additive picks --

    #[test]
    fn conflicting_pick_is_rejected() {
        let engine = engine();
        let dialogue = engine.create_dialogue();
        engine
            .append_act(
                dialogue,
                ParticipantRole::Advocate,
                path("0.1"),
                Polarity::Positive,
                "either",
                vec!["a".to_string(), "b".to_string()],
                true,
            )
            .unwrap();
        engine.pick_additive(dialogue, path("0.1"), "b").unwrap();
        let err = engine.pick_additive(dialogue, path("0.1"), "a").unwrap_err();
        assert_eq!(
            err,
            EngineError::Additive(ChoiceAlreadyConsumed {
                parent: path("0.1"),
                committed: "b".to_string(),
                rejected: "a".to_string(),
            })
        );
    }

    // -- Concurrency --

    #[test]
    fn concurrent_slot_appends_cannot_both_succeed() {
        let engine = std::sync::Arc::new(engine());
        let dialogue = engine.create_dialogue();
        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            handles.push(std::thread::spawn(move || {
                engine.append_act(
                    dialogue,
                    ParticipantRole::Advocate,
                    LocusPath::root(),
                    Polarity::Positive,
                    "racer",
                    vec![],
                    false,
                )
            }));
        }
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(EngineError::Append(AppendError::LocusConflict { .. }))
        )));
    }

    // -- Compile --

    #[test]
    fn compile_rebuilds_designs_from_the_move_log() {
        let engine = engine();
        let dialogue = engine.create_dialogue();
        engine
            .record_move(
                dialogue,
                DialogueMove {
                    target: Some("c1".to_string()),
                    expression: Some("claim".to_string()),
                    ..DialogueMove::of(MoveKind::Assert)
                },
            )
            .unwrap();
        engine
            .record_move(
                dialogue,
                DialogueMove {
                    target: Some("c1".to_string()),
                    ..DialogueMove::of(MoveKind::Concede)
                },
            )
            .unwrap();
        let outcome = engine.compile(dialogue, CompilePhase::Neutral).unwrap();
        assert_eq!(outcome.trace.status, TraceStatus::Convergent);
        assert_eq!(outcome.skipped, 0);
        assert!(outcome.offers.is_empty());
        // Recompiling from the same log is idempotent.
        let again = engine.compile(dialogue, CompilePhase::Neutral).unwrap();
        assert_eq!(again.trace, outcome.trace);
    }

    #[test]
    fn compile_surfaces_unresolved_additive_offers() {
        let engine = engine();
        let dialogue = engine.create_dialogue();
        engine
            .record_move(
                dialogue,
                DialogueMove {
                    target: Some("c1".to_string()),
                    expression: Some("fork".to_string()),
                    is_additive: true,
                    ramification: Some(vec!["a".to_string(), "b".to_string()]),
                    ..DialogueMove::of(MoveKind::Assert)
                },
            )
            .unwrap();
        engine
            .record_move(
                dialogue,
                DialogueMove {
                    target: Some("c1".to_string()),
                    ..DialogueMove::of(MoveKind::Why)
                },
            )
            .unwrap();
        let outcome = engine.compile(dialogue, CompilePhase::FocusAdvocate).unwrap();
        assert_eq!(outcome.trace.status, TraceStatus::Ongoing);
        assert_eq!(outcome.offers.len(), 1);
        assert_eq!(outcome.offers[0].owner, ParticipantRole::Advocate);
    }

    // -- Selection --

    #[test]
    fn selection_emits_a_scope_notification() {
        let engine = engine();
        let rx = engine.subscribe();
        let selection = engine
            .select(
                "room-1",
                &[ArgumentId::new("a")],
                &[(VoterId::new("v1"), ArgumentId::new("a"))],
                &[],
                SelectionRule::Utilitarian,
                1,
            )
            .unwrap();
        assert_eq!(selection.coverage_avg_millionths, 1_000_000);
        let events: Vec<Recomputed> = rx.try_iter().collect();
        assert!(matches!(
            events.as_slice(),
            [Recomputed::Selection { scope, .. }] if scope == "room-1"
        ));
    }
}

