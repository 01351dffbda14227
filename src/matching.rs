//! Old/new correspondence resolution (§4.7): after any candidate
//! labeling, decide which current labels should inherit which old
//! cluster identities via minimum-weight bipartite matching. Grounded on
//! `kerndynmeans_impl.hpp::updateOldNewCorrespondence` /
//! `getMinWtMatching` (there solved with Gurobi's LP solver; here with
//! `pathfinding`'s Kuhn-Munkres assignment algorithm, the external LP-
//! equivalent collaborator §6 calls out).

use std::collections::HashMap;

use pathfinding::prelude::{kuhn_munkres_min, Matrix};

use crate::ddp::ClusterSnapshot;
use crate::model::{Data, Parameter};

/// `pathfinding::kuhn_munkres` requires integer weights; the edge
/// weights of §4.7 are real-valued similarities and age costs, so they
/// are scaled into this many fixed-point units before solving and
/// scaled back only for diagnostics (the matching itself only needs
/// relative order, which fixed-point scaling preserves).
const FIXED_POINT_SCALE: f64 = 1.0e6;

/// One distinct current label and the observations assigned to it,
/// going into the correspondence solver.
pub struct CurrentLabel<'a, D: Data> {
    pub label: u64,
    pub members: &'a HashMap<u64, D>,
}

/// Resolves old/new correspondence for a candidate labeling (§4.7).
/// Returns a map from each input `label` to the cluster ID it should be
/// rewritten to: either one of `old_clusters`' IDs, or its own original
/// `label` (meaning it keeps a freshly-allocated identity).
pub fn resolve_correspondence<D, P>(
    currents: &[CurrentLabel<D>],
    old_clusters: &[ClusterSnapshot<P>],
    lambda: f64,
) -> HashMap<u64, u64>
where
    D: Data,
    P: Parameter<D>,
{
    let a = currents.len();
    let b = old_clusters.len();
    if a == 0 {
        return HashMap::new();
    }

    // Columns: b old clusters, then a interchangeable null-sink columns
    // (each costs lambda to every row, so dedicating one per row is
    // unnecessary -- any left node landing on any null column pays the
    // same price).
    let cols = b + a;
    let size = std::cmp::max(a, cols);

    let weights = Matrix::from_fn(size, size, |(i, j)| {
        if i >= a {
            // Padding row: a dummy left node that costs nothing
            // regardless of which column absorbs it, so it never
            // distorts the real assignment (standard rectangular ->
            // square padding for Kuhn-Munkres).
            return 0i64;
        }
        if j < b {
            let n_a = currents[i].members.len() as f64;
            let old = &old_clusters[j];
            let gamma = old.gamma;
            let denom = gamma + n_a;
            let self_sim = old.prm_old.self_sim(false);
            let cross: f64 = currents[i]
                .members
                .values()
                .map(|d| old.prm_old.sim_to_datum(d, false))
                .sum();
            let w = old.age_cost + gamma * n_a / denom * self_sim - 2.0 * gamma / denom * cross;
            (w * FIXED_POINT_SCALE).round() as i64
        } else {
            (lambda * FIXED_POINT_SCALE).round() as i64
        }
    });

    let (_, assignment) = kuhn_munkres_min(&weights);

    let mut result = HashMap::with_capacity(a);
    for (i, current) in currents.iter().enumerate() {
        let col = assignment[i];
        if col < b {
            result.insert(current.label, old_clusters[col].id);
        } else {
            result.insert(current.label, current.label);
        }
    }
    result
}
