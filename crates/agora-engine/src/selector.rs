//! Representative viewpoint selector.
//!
//! Chooses `k` internally consistent argument subsets ("views") that best
//! represent the voter population, under one of three rules:
//!
//! - `utilitarian`: greedy maximum coverage of mean voter satisfaction;
//! - `harmonic`: the same search with each voter's marginal contribution
//!   weighted by `1/rank`, ranks ordered least-served first, so extending
//!   coverage to under-served voters outweighs serving the already-served;
//! - `maxcov`: dedicates views to large unanimous cohorts first (the
//!   Justified Representation guarantee), then fills remaining capacity
//!   with the utilitarian greedy.
//!
//! A voter's coverage is the best fraction of their approvals present in a
//! single chosen view. All coverage arithmetic is fixed-point millionths
//! (1_000_000 = 1.0) for deterministic cross-platform results; collections
//! are BTree-ordered so identical snapshots select identically.
//!
//! The greedy search runs under an explicit iteration budget; exhaustion
//! returns the best selection found so far flagged `optimal: false`, never
//! an error.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coverage::{ArgumentId, ConflictGraph, CoverageIndex, VoterId};

/// Fixed-point scale: 1_000_000 millionths = 1.0.
const MILLION: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// Rule and configuration
// ---------------------------------------------------------------------------

/// Selection objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    Utilitarian,
    Harmonic,
    MaxCov,
}

impl fmt::Display for SelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Utilitarian => "utilitarian",
            Self::Harmonic => "harmonic",
            Self::MaxCov => "maxcov",
        };
        f.write_str(s)
    }
}

/// Search bounds for the greedy selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Maximum greedy placements before the search is cut off.
    pub iteration_budget: usize,
    /// How many conflicting pairs to surface as the ceiling explanation.
    pub top_pair_limit: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            iteration_budget: 10_000,
            top_pair_limit: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Selection output
// ---------------------------------------------------------------------------

/// One selected conflict-free argument subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub index: usize,
    pub arguments: Vec<ArgumentId>,
    /// Manual premise-set override, when a moderator has pinned one.
    pub gamma_override: Option<Vec<ArgumentId>>,
    /// Manual conclusion-set override.
    pub delta_override: Option<Vec<ArgumentId>>,
}

/// A conflict edge with its combined approving-voter support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPair {
    pub first: ArgumentId,
    pub second: ArgumentId,
    pub support: usize,
}

/// Immutable result of one selection request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub rule: SelectionRule,
    pub k: usize,
    pub views: Vec<View>,
    pub coverage_avg_millionths: i64,
    pub coverage_min_millionths: i64,
    pub jr_satisfied: bool,
    /// Coverage ceiling under conflict constraints; heuristic upper bound.
    pub best_possible_avg_millionths: i64,
    /// Conflict edges with the highest combined support, descending.
    pub conflicts_top_pairs: Vec<ConflictPair>,
    /// False when the iteration budget cut the search short.
    pub optimal: bool,
}

/// Rejections raised before any search work begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorError {
    /// `k` is zero or exceeds the number of arguments.
    InvalidK { k: usize, arguments: usize },
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidK { k, arguments } => {
                write!(f, "k = {k} is invalid for {arguments} arguments")
            }
        }
    }
}

impl std::error::Error for SelectorError {}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Select `k` views under `rule`.
pub fn select(
    arguments: &[ArgumentId],
    coverage: &CoverageIndex,
    conflicts: &ConflictGraph,
    rule: SelectionRule,
    k: usize,
    cfg: &SelectorConfig,
) -> Result<Selection, SelectorError> {
    let universe: BTreeSet<ArgumentId> = arguments.iter().cloned().collect();
    if universe.is_empty() {
        return Ok(empty_selection(rule, k, cfg, conflicts, coverage));
    }
    if k == 0 || k > universe.len() {
        return Err(SelectorError::InvalidK {
            k,
            arguments: universe.len(),
        });
    }

    let voters = voter_approvals(coverage);
    let mut search = Search {
        universe: &universe,
        conflicts,
        voters: &voters,
        views: vec![BTreeSet::new(); k],
        placements: 0,
        optimal: true,
        budget: cfg.iteration_budget,
    };

    let qualifying = match rule {
        SelectionRule::MaxCov => {
            let cohorts = qualifying_cohorts(&voters, conflicts, coverage.voter_count(), k);
            search.dedicate(&cohorts);
            cohorts
        }
        _ => Vec::new(),
    };

    let weighted = rule == SelectionRule::Harmonic;
    search.run_greedy(weighted);

    let views = &search.views;
    let realized: BTreeMap<VoterId, i64> = voters
        .iter()
        .map(|(voter, approvals)| (voter.clone(), voter_coverage(approvals, views)))
        .collect();

    let coverage_avg = average(realized.values().copied());
    let coverage_min = realized.values().copied().min().unwrap_or(MILLION);
    let best_possible =
        best_possible_avg(&voters, conflicts, &realized).max(coverage_avg);

    let jr_satisfied = !qualifying.is_empty()
        && qualifying
            .iter()
            .all(|cohort| views.iter().any(|view| cohort.set.is_subset(view)));

    debug!(
        rule = %rule,
        k,
        coverage_avg,
        coverage_min,
        jr_satisfied,
        optimal = search.optimal,
        "selection computed"
    );

    Ok(Selection {
        rule,
        k,
        views: search
            .views
            .iter()
            .enumerate()
            .map(|(index, members)| View {
                index,
                arguments: members.iter().cloned().collect(),
                gamma_override: None,
                delta_override: None,
            })
            .collect(),
        coverage_avg_millionths: coverage_avg,
        coverage_min_millionths: coverage_min,
        jr_satisfied,
        best_possible_avg_millionths: best_possible,
        conflicts_top_pairs: top_pairs(conflicts, coverage, cfg.top_pair_limit),
        optimal: search.optimal,
    })
}

fn empty_selection(
    rule: SelectionRule,
    k: usize,
    cfg: &SelectorConfig,
    conflicts: &ConflictGraph,
    coverage: &CoverageIndex,
) -> Selection {
    Selection {
        rule,
        k,
        views: Vec::new(),
        coverage_avg_millionths: 0,
        coverage_min_millionths: 0,
        jr_satisfied: false,
        best_possible_avg_millionths: 0,
        conflicts_top_pairs: top_pairs(conflicts, coverage, cfg.top_pair_limit),
        optimal: true,
    }
}

// ---------------------------------------------------------------------------
// Search state
// ---------------------------------------------------------------------------

struct Search<'a> {
    universe: &'a BTreeSet<ArgumentId>,
    conflicts: &'a ConflictGraph,
    voters: &'a [(VoterId, BTreeSet<ArgumentId>)],
    views: Vec<BTreeSet<ArgumentId>>,
    placements: usize,
    optimal: bool,
    budget: usize,
}

impl Search<'_> {
    /// Seed views with qualifying cohort sets, largest first.
    fn dedicate(&mut self, cohorts: &[Cohort]) {
        for cohort in cohorts {
            if self.views.iter().any(|view| cohort.set.is_subset(view)) {
                continue;
            }
            if let Some(slot) = self.views.iter_mut().find(|view| view.is_empty()) {
                *slot = cohort.set.clone();
            }
        }
    }

    /// Greedy placement loop; stops at quiescence or budget exhaustion.
    fn run_greedy(&mut self, weighted: bool) {
        loop {
            let weights = weighted.then(|| harmonic_weights(self.voters, &self.views));
            let Some((gain, view_index, argument)) = self.best_candidate(weights.as_ref())
            else {
                break;
            };
            if gain <= 0 {
                break;
            }
            if self.placements >= self.budget {
                self.optimal = false;
                break;
            }
            self.views[view_index].insert(argument);
            self.placements += 1;
        }
    }

    fn best_candidate(
        &self,
        weights: Option<&BTreeMap<VoterId, i64>>,
    ) -> Option<(i128, usize, ArgumentId)> {
        let current = self.objective(&self.views, weights);
        let mut best: Option<(i128, usize, ArgumentId)> = None;
        for (view_index, view) in self.views.iter().enumerate() {
            for argument in self.universe {
                if view.contains(argument) || !self.conflicts.compatible_with(argument, view) {
                    continue;
                }
                let mut extended = self.views.clone();
                extended[view_index].insert(argument.clone());
                let gain = self.objective(&extended, weights) - current;
                // Strict improvement keeps ties on the earliest candidate.
                if best.as_ref().map_or(true, |(g, _, _)| gain > *g) {
                    best = Some((gain, view_index, argument.clone()));
                }
            }
        }
        best
    }

    fn objective(
        &self,
        views: &[BTreeSet<ArgumentId>],
        weights: Option<&BTreeMap<VoterId, i64>>,
    ) -> i128 {
        self.voters
            .iter()
            .map(|(voter, approvals)| {
                let cov = voter_coverage(approvals, views) as i128;
                match weights {
                    Some(weights) => {
                        let w = weights.get(voter).copied().unwrap_or(MILLION) as i128;
                        cov * w / MILLION as i128
                    }
                    None => cov,
                }
            })
            .sum()
    }
}

/// Best single-view coverage fraction for one voter, in millionths.
fn voter_coverage(approvals: &BTreeSet<ArgumentId>, views: &[BTreeSet<ArgumentId>]) -> i64 {
    if approvals.is_empty() {
        return MILLION;
    }
    let best_hit = views
        .iter()
        .map(|view| approvals.intersection(view).count())
        .max()
        .unwrap_or(0);
    (best_hit as i64) * MILLION / (approvals.len() as i64)
}

/// `1/rank` weights, rank 1 = least-served voter.
///
/// Ordering is by already-covered approval count ascending, then voter id.
fn harmonic_weights(
    voters: &[(VoterId, BTreeSet<ArgumentId>)],
    views: &[BTreeSet<ArgumentId>],
) -> BTreeMap<VoterId, i64> {
    let mut order: Vec<(usize, &VoterId)> = voters
        .iter()
        .map(|(voter, approvals)| {
            let covered = views
                .iter()
                .map(|view| approvals.intersection(view).count())
                .max()
                .unwrap_or(0);
            (covered, voter)
        })
        .collect();
    order.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    order
        .into_iter()
        .enumerate()
        .map(|(position, (_, voter))| (voter.clone(), MILLION / (position as i64 + 1)))
        .collect()
}

// ---------------------------------------------------------------------------
// Justified Representation cohorts
// ---------------------------------------------------------------------------

struct Cohort {
    set: BTreeSet<ArgumentId>,
    supporters: usize,
}

/// Candidate unanimous cohorts of size at least `ceil(n / k)`.
///
/// Candidate sets are the distinct voter approval sets plus pairwise
/// intersections; a documented approximation of the full (exponential)
/// cohort space.
fn qualifying_cohorts(
    voters: &[(VoterId, BTreeSet<ArgumentId>)],
    conflicts: &ConflictGraph,
    voter_count: usize,
    k: usize,
) -> Vec<Cohort> {
    if voter_count == 0 {
        return Vec::new();
    }
    let threshold = voter_count.div_ceil(k);
    let mut candidates: BTreeSet<BTreeSet<ArgumentId>> = BTreeSet::new();
    for (_, approvals) in voters {
        if !approvals.is_empty() {
            candidates.insert(approvals.clone());
        }
    }
    let sets: Vec<&BTreeSet<ArgumentId>> = candidates.iter().collect();
    let mut intersections: BTreeSet<BTreeSet<ArgumentId>> = BTreeSet::new();
    for (i, a) in sets.iter().enumerate() {
        for b in &sets[i + 1..] {
            let common: BTreeSet<ArgumentId> = a.intersection(b).cloned().collect();
            if !common.is_empty() {
                intersections.insert(common);
            }
        }
    }
    candidates.extend(intersections);

    let mut cohorts: Vec<Cohort> = candidates
        .into_iter()
        .filter(|set| conflicts.conflict_free(set))
        .filter_map(|set| {
            let supporters = voters
                .iter()
                .filter(|(_, approvals)| set.is_subset(approvals))
                .count();
            (supporters >= threshold).then_some(Cohort { set, supporters })
        })
        .collect();
    cohorts.sort_by(|a, b| {
        b.supporters
            .cmp(&a.supporters)
            .then_with(|| b.set.len().cmp(&a.set.len()))
            .then_with(|| a.set.cmp(&b.set))
    });
    cohorts
}

// ---------------------------------------------------------------------------
// Ceiling and explanation
// ---------------------------------------------------------------------------

/// Heuristic coverage ceiling: per voter, the fraction reachable by a
/// greedy conflict-free subset of their own approvals, never below what
/// the realized selection achieved.
fn best_possible_avg(
    voters: &[(VoterId, BTreeSet<ArgumentId>)],
    conflicts: &ConflictGraph,
    realized: &BTreeMap<VoterId, i64>,
) -> i64 {
    let per_voter = voters.iter().map(|(voter, approvals)| {
        if approvals.is_empty() {
            return MILLION;
        }
        let mut chosen: BTreeSet<ArgumentId> = BTreeSet::new();
        for argument in approvals {
            if conflicts.compatible_with(argument, &chosen) {
                chosen.insert(argument.clone());
            }
        }
        let ceiling = (chosen.len() as i64) * MILLION / (approvals.len() as i64);
        ceiling.max(realized.get(voter).copied().unwrap_or(0))
    });
    average(per_voter)
}

fn top_pairs(
    conflicts: &ConflictGraph,
    coverage: &CoverageIndex,
    limit: usize,
) -> Vec<ConflictPair> {
    let mut pairs: Vec<ConflictPair> = conflicts
        .edges()
        .map(|(first, second)| ConflictPair {
            first: first.clone(),
            second: second.clone(),
            support: coverage.support(first) + coverage.support(second),
        })
        .collect();
    pairs.sort_by(|a, b| {
        b.support
            .cmp(&a.support)
            .then_with(|| (&a.first, &a.second).cmp(&(&b.first, &b.second)))
    });
    pairs.truncate(limit);
    pairs
}

fn voter_approvals(coverage: &CoverageIndex) -> Vec<(VoterId, BTreeSet<ArgumentId>)> {
    coverage
        .voters()
        .map(|voter| (voter.clone(), coverage.approvals_of(voter)))
        .collect()
}

fn average(values: impl Iterator<Item = i64>) -> i64 {
    let mut total: i128 = 0;
    let mut count: i128 = 0;
    for value in values {
        total += value as i128;
        count += 1;
    }
    if count == 0 {
        MILLION
    } else {
        (total / count) as i64
    }
}
