//! Defense-chain builder: the minimal decisive subsequence of a trace.
//!
//! For a convergent trace, the decisive pairs are the causal backbone of
//! acceptance: the final (daimon/endorsement) pair plus every earlier pair
//! that introduced a locus on the parent chain from the endorsement locus
//! back to the root. Removing any decisive pair breaks that chain, so no
//! smaller subsequence reconstructs the same endorsement at the same locus.

use std::collections::BTreeSet;

use crate::stepper::TracePair;

/// Indices of the causally necessary pairs, ascending.
///
/// Empty for an empty pair list; the final pair is always included.
pub fn decisive_indices(pairs: &[TracePair]) -> Vec<usize> {
    let Some(last) = pairs.last() else {
        return Vec::new();
    };
    let backbone: BTreeSet<_> = last.locus.ancestry().into_iter().collect();
    let mut seen_loci = BTreeSet::new();
    let mut out = Vec::new();
    for pair in pairs {
        // One decisive pair per backbone locus; the first introduction wins.
        if backbone.contains(&pair.locus) && seen_loci.insert(pair.locus.clone()) {
            out.push(pair.index);
        }
    }
    if out.last() != Some(&last.index) {
        out.push(last.index);
    }
    out
}
