//! Stable numeric error codes for the engine's failure taxonomy.
//!
//! Collaborators persist and compare these codes across releases, so the
//! registry is append-only: assigned codes are permanent, never reused,
//! and may only be marked deprecated. Codes are partitioned into
//! per-subsystem numeric ranges.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::design::AppendError;
use crate::judge::JudgeError;
use crate::orthogonality::OrthogonalityError;
use crate::stepper::StepError;
use crate::EngineError;

pub const ERROR_CODE_REGISTRY_VERSION: u32 = 1;
pub const ERROR_CODE_COMPATIBILITY_POLICY: &str =
    "append-only: assigned codes are permanent, never reused, and may only be marked deprecated";

// ---------------------------------------------------------------------------
// Subsystem ranges
// ---------------------------------------------------------------------------

/// Numeric range owner for a group of related failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSubsystem {
    /// Structural append violations.
    Structural,
    /// Irrevocable-state lifecycle violations.
    Lifecycle,
    /// Input validation and lookup failures.
    Validation,
    /// Interaction-walk failures.
    Stepper,
}

impl ErrorSubsystem {
    pub const fn range(self) -> (u16, u16) {
        match self {
            Self::Structural => (1000, 1999),
            Self::Lifecycle => (2000, 2999),
            Self::Validation => (3000, 3999),
            Self::Stepper => (4000, 4999),
        }
    }

    pub const fn includes(self, numeric: u16) -> bool {
        let (start, end) = self.range();
        numeric >= start && numeric <= end
    }
}

// ---------------------------------------------------------------------------
// EngineErrorCode
// ---------------------------------------------------------------------------

/// Stable code for every failure the engine can report.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineErrorCode {
    LocusConflict = 1000,
    OrphanLocus = 1001,

    ChoiceAlreadyConsumed = 2000,
    LocusAlreadyClosed = 2001,

    LocusValidation = 3000,
    CompileValidation = 3001,
    SelectorValidation = 3002,
    DialogueNotFound = 3100,
    DesignNotFound = 3101,

    MismatchedRoles = 4000,
    PairBudgetExhausted = 4001,
    MalformedDesign = 4002,
    OrientationUndefined = 4003,
}

impl EngineErrorCode {
    /// All assigned codes, in numeric order.
    pub const ALL: [EngineErrorCode; 13] = [
        Self::LocusConflict,
        Self::OrphanLocus,
        Self::ChoiceAlreadyConsumed,
        Self::LocusAlreadyClosed,
        Self::LocusValidation,
        Self::CompileValidation,
        Self::SelectorValidation,
        Self::DialogueNotFound,
        Self::DesignNotFound,
        Self::MismatchedRoles,
        Self::PairBudgetExhausted,
        Self::MalformedDesign,
        Self::OrientationUndefined,
    ];

    pub const fn numeric(self) -> u16 {
        self as u16
    }

    pub const fn subsystem(self) -> ErrorSubsystem {
        match self {
            Self::LocusConflict | Self::OrphanLocus => ErrorSubsystem::Structural,
            Self::ChoiceAlreadyConsumed | Self::LocusAlreadyClosed => ErrorSubsystem::Lifecycle,
            Self::LocusValidation
            | Self::CompileValidation
            | Self::SelectorValidation
            | Self::DialogueNotFound
            | Self::DesignNotFound => ErrorSubsystem::Validation,
            Self::MismatchedRoles
            | Self::PairBudgetExhausted
            | Self::MalformedDesign
            | Self::OrientationUndefined => ErrorSubsystem::Stepper,
        }
    }

    /// Reverse lookup from a persisted numeric code.
    pub fn from_numeric(numeric: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.numeric() == numeric)
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.numeric())
    }
}

/// The stable code for a reported error.
pub fn code_for(error: &EngineError) -> EngineErrorCode {
    match error {
        EngineError::Append(err) => code_for_append(err),
        EngineError::Additive(_) => EngineErrorCode::ChoiceAlreadyConsumed,
        EngineError::Judge(JudgeError::LocusAlreadyClosed { .. }) => {
            EngineErrorCode::LocusAlreadyClosed
        }
        EngineError::Judge(JudgeError::Append(err)) => code_for_append(err),
        EngineError::Step(err) => code_for_step(err),
        EngineError::Orthogonality(OrthogonalityError::SameRole { .. }) => {
            EngineErrorCode::OrientationUndefined
        }
        EngineError::Orthogonality(OrthogonalityError::Step(err)) => code_for_step(err),
        EngineError::Compile(_) => EngineErrorCode::CompileValidation,
        EngineError::Locus(_) => EngineErrorCode::LocusValidation,
        EngineError::Selector(_) => EngineErrorCode::SelectorValidation,
        EngineError::NotFound { .. } => EngineErrorCode::DialogueNotFound,
    }
}

fn code_for_append(err: &AppendError) -> EngineErrorCode {
    match err {
        AppendError::LocusConflict { .. } => EngineErrorCode::LocusConflict,
        AppendError::OrphanLocus { .. } => EngineErrorCode::OrphanLocus,
        AppendError::UnknownDesign { .. } => EngineErrorCode::DesignNotFound,
    }
}

fn code_for_step(err: &StepError) -> EngineErrorCode {
    match err {
        StepError::MismatchedRoles { .. } => EngineErrorCode::MismatchedRoles,
        StepError::PairBudgetExhausted { .. } => EngineErrorCode::PairBudgetExhausted,
        StepError::MalformedDesign { .. } => EngineErrorCode::MalformedDesign,
    }
}
