//! Additive-choice ledger: exclusive-or branch resolution.
//!
//! A locus whose opening act is marked additive is an exclusive-choice
//! branch point. Exactly one child subtree may be explored per dialogue;
//! the first recorded pick is irrevocable. Re-recording the same pick is
//! accepted (idempotent), a differing pick is rejected.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::locus::LocusPath;

/// Rejection raised when a second, different child is picked at a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceAlreadyConsumed {
    pub parent: LocusPath,
    pub committed: String,
    pub rejected: String,
}

impl fmt::Display for ChoiceAlreadyConsumed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "additive choice at {} already consumed by {:?}, rejecting {:?}",
            self.parent, self.committed, self.rejected
        )
    }
}

impl std::error::Error for ChoiceAlreadyConsumed {}

/// Irrevocable per-dialogue record of resolved additive branch points.
///
/// Survives recompilation: choices are keyed by locus path, not act id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditiveLedger {
    choices: BTreeMap<LocusPath, String>,
}

impl AdditiveLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the choice of `child_suffix` at `parent`.
    pub fn pick(
        &mut self,
        parent: LocusPath,
        child_suffix: impl Into<String>,
    ) -> Result<(), ChoiceAlreadyConsumed> {
        let child_suffix = child_suffix.into();
        match self.choices.get(&parent) {
            Some(committed) if committed == &child_suffix => Ok(()),
            Some(committed) => Err(ChoiceAlreadyConsumed {
                parent,
                committed: committed.clone(),
                rejected: child_suffix,
            }),
            None => {
                self.choices.insert(parent, child_suffix);
                Ok(())
            }
        }
    }

    /// The committed child suffix at `parent`, if resolved.
    pub fn chosen(&self, parent: &LocusPath) -> Option<&str> {
        self.choices.get(parent).map(String::as_str)
    }

    /// All recorded choices in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&LocusPath, &str)> {
        self.choices.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Number of resolved branch points.
    pub fn len(&self) -> usize {
        self.choices.len()
    }

    /// Whether no branch point has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}
