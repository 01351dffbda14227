//! The point batch solver (§4.3): a Lloyd-like greedy local search,
//! restarted `R` times, keeping the lowest-objective assignment.
//! Grounded in shape on the teacher's `Dpmm::scan`/`step` restart-and-
//! reassign loop (`examples/jwschroeder3-nested_sampling`), generalized
//! from a Gibbs-sampled CRP reassignment to a deterministic greedy
//! minimum-cost assignment with a new-cluster option priced at λ.

use std::collections::HashMap;

use ordered_float::OrderedFloat;
use rand::Rng;

use crate::cost::{batch_objective, LabelState};
use crate::ddp::ClusterSnapshot;
use crate::error::{DynMeansError, DynMeansResult};
use crate::model::{Data, Parameter};

/// One candidate cluster a point solver restart is tracking: either an
/// old cluster carried over from a previous batch (not yet instantiated
/// this batch, or instantiated partway through this restart) or a
/// cluster born fresh during this restart.
struct WorkingCluster<D: Data, P: Parameter<D>> {
    id: u64,
    is_new: bool,
    /// Sticky: once an old cluster receives its first member this
    /// restart it is "current" for the remainder of the restart, even if
    /// a later pass empties it back out (§4.3: "every old cluster not
    /// already instantiated this batch" permanently drops out of that
    /// list the moment it is touched).
    instantiated: bool,
    gamma: f64,
    age_cost: f64,
    prm: P,
    members: HashMap<u64, D>,
}

pub struct SolveOutcome<D: Data> {
    pub labeling: HashMap<u64, (u64, D)>,
    pub objective: f64,
    pub iterations: u64,
}

/// Runs `n_restarts` independent restarts of the greedy local search and
/// keeps the lowest-objective labeling (Testable Property 6: "restart
/// dominance"). A restart whose inner loop cannot make progress is still
/// a valid (if poor) result -- restart *failure* in this solver only
/// happens if the observation set collapses the candidate set to
/// nothing, which cannot occur as long as the new-cluster option is
/// always available; so every restart here succeeds, and `AllRestartsFailed`
/// is unreachable for the point variant in practice (kept in the error
/// taxonomy for the common `DynMeansError` surface §7 describes).
pub fn solve<D, P>(
    observations: &HashMap<u64, D>,
    old_clusters: &[ClusterSnapshot<P>],
    lambda: f64,
    n_restarts: u32,
    iteration_cap: usize,
    rng: &mut impl Rng,
) -> DynMeansResult<SolveOutcome<D>>
where
    D: Data,
    P: Parameter<D>,
{
    if observations.is_empty() {
        return Ok(SolveOutcome {
            labeling: HashMap::new(),
            objective: 0.0,
            iterations: 0,
        });
    }

    let next_id_seed = old_clusters
        .iter()
        .map(|c| c.id)
        .max()
        .map(|m| m + 1)
        .unwrap_or(0);

    let mut best: Option<SolveOutcome<D>> = None;
    for _ in 0..n_restarts {
        let outcome = run_restart(observations, old_clusters, lambda, iteration_cap, next_id_seed, rng);
        if best.as_ref().map_or(true, |b| outcome.objective < b.objective) {
            best = Some(outcome);
        }
    }
    best.ok_or(DynMeansError::AllRestartsFailed(n_restarts as u64))
}

fn run_restart<D, P>(
    observations: &HashMap<u64, D>,
    old_clusters: &[ClusterSnapshot<P>],
    lambda: f64,
    iteration_cap: usize,
    next_id_seed: u64,
    rng: &mut impl Rng,
) -> SolveOutcome<D>
where
    D: Data,
    P: Parameter<D>,
{
    let mut ids: Vec<u64> = observations.keys().copied().collect();
    ids.sort_unstable();

    let mut next_id = next_id_seed;
    let mut clusters: HashMap<u64, WorkingCluster<D, P>> = old_clusters
        .iter()
        .map(|c| {
            (
                c.id,
                WorkingCluster {
                    id: c.id,
                    is_new: false,
                    instantiated: false,
                    gamma: c.gamma,
                    age_cost: c.age_cost,
                    prm: c.prm_old.clone(),
                    members: HashMap::new(),
                },
            )
        })
        .collect();

    // §4.3 warm start: uniform random assignment into at most
    // max(1, floor(N/2)) buckets, initial parameters = first member.
    let k_init = std::cmp::max(1, ids.len() / 2);
    let mut bucket_members: HashMap<usize, Vec<u64>> = HashMap::new();
    for &id in &ids {
        let bucket = rng.gen_range(0..k_init);
        bucket_members.entry(bucket).or_default().push(id);
    }
    for members in bucket_members.values() {
        if members.is_empty() {
            continue;
        }
        let seed_id = members[0];
        let id = next_id;
        next_id += 1;
        let mut member_map = HashMap::new();
        for &m in members {
            member_map.insert(m, observations[&m].clone());
        }
        clusters.insert(
            id,
            WorkingCluster {
                id,
                is_new: true,
                instantiated: true,
                gamma: 0.0,
                age_cost: 0.0,
                prm: P::from_singleton(&observations[&seed_id]),
                members: member_map,
            },
        );
    }

    let mut prev_assignment: Option<HashMap<u64, u64>> = None;
    let mut iterations: u64 = 0;

    for _ in 0..iteration_cap {
        iterations += 1;
        for c in clusters.values_mut() {
            c.members.clear();
        }

        let mut assignment: HashMap<u64, u64> = HashMap::with_capacity(ids.len());
        for &obs_id in &ids {
            let datum = &observations[&obs_id];

            // The new-cluster option is tier 1 so that, on an exact tie
            // with an existing cluster's cost, the existing cluster wins
            // (§4.3 step 2: "... then new" is the last-resort tie-break).
            let mut best_cost = lambda;
            let mut best_key = (1u8, OrderedFloat(0.0), 0u64);
            let mut best_id: Option<u64> = None;

            for c in clusters.values() {
                let cost = if c.instantiated {
                    c.prm.dist_to(datum, true)
                } else {
                    c.prm.dist_to(datum, false)
                };
                let key = (0u8, OrderedFloat(c.age_cost), c.id);
                if OrderedFloat(cost) < OrderedFloat(best_cost)
                    || (cost == best_cost && key < best_key)
                {
                    best_cost = cost;
                    best_key = key;
                    best_id = Some(c.id);
                }
            }

            let winner = match best_id {
                Some(id) => id,
                None => {
                    let id = next_id;
                    next_id += 1;
                    clusters.insert(
                        id,
                        WorkingCluster {
                            id,
                            is_new: true,
                            instantiated: true,
                            gamma: 0.0,
                            age_cost: 0.0,
                            prm: P::from_singleton(datum),
                            members: HashMap::new(),
                        },
                    );
                    id
                }
            };

            let cluster = clusters.get_mut(&winner).unwrap();
            cluster.instantiated = true;
            cluster.members.insert(obs_id, datum.clone());
            assignment.insert(obs_id, winner);
        }

        for c in clusters.values_mut() {
            if !c.members.is_empty() {
                c.prm.update(&c.members, c.gamma);
            }
        }

        let converged = prev_assignment.as_ref() == Some(&assignment);
        prev_assignment = Some(assignment);
        if converged {
            break;
        }
    }

    let assignment = prev_assignment.unwrap_or_default();
    let label_states: Vec<LabelState<D, P>> = clusters
        .values()
        .map(|c| LabelState {
            is_new: c.is_new,
            age_cost: c.age_cost,
            gamma: c.gamma,
            members: &c.members,
            prm: &c.prm,
        })
        .collect();
    let objective = batch_objective(lambda, &label_states);

    let mut labeling = HashMap::with_capacity(assignment.len());
    for (obs_id, label) in assignment {
        labeling.insert(obs_id, (label, observations[&obs_id].clone()));
    }

    SolveOutcome {
        labeling,
        objective,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point_model::{PointData, PointParameter};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn obs(points: &[[f64; 2]]) -> HashMap<u64, PointData> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| (i as u64, PointData::new(p.to_vec())))
            .collect()
    }

    #[test]
    fn single_tight_cluster_from_empty_state() {
        let data = obs(&[[0.0, 0.0], [0.05, 0.0], [0.0, 0.05], [-0.05, 0.0], [0.0, -0.05]]);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let out: SolveOutcome<PointData> =
            solve::<PointData, PointParameter>(&data, &[], 10.0, 5, 500, &mut rng).unwrap();
        let labels: std::collections::HashSet<u64> =
            out.labeling.values().map(|(l, _)| *l).collect();
        assert_eq!(labels.len(), 1);
        assert!(out.objective < 10.0);
    }

    #[test]
    fn deterministic_given_fixed_seed() {
        let data = obs(&[[0.0, 0.0], [10.0, 10.0], [10.1, 10.0], [0.1, 0.0], [5.0, 5.0]]);
        let run = |seed: u64| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            solve::<PointData, PointParameter>(&data, &[], 2.0, 4, 200, &mut rng).unwrap()
        };
        let a = run(7);
        let b = run(7);
        assert_eq!(a.objective, b.objective);
        let mut a_labels: Vec<_> = a.labeling.into_iter().collect();
        let mut b_labels: Vec<_> = b.labeling.into_iter().collect();
        a_labels.sort_by_key(|(id, _)| *id);
        b_labels.sort_by_key(|(id, _)| *id);
        for ((ida, (la, _)), (idb, (lb, _))) in a_labels.iter().zip(b_labels.iter()) {
            assert_eq!(ida, idb);
            assert_eq!(la, lb);
        }
    }

    #[test]
    fn empty_batch_yields_empty_labeling() {
        let data: HashMap<u64, PointData> = HashMap::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = solve::<PointData, PointParameter>(&data, &[], 1.0, 3, 100, &mut rng).unwrap();
        assert!(out.labeling.is_empty());
        assert_eq!(out.objective, 0.0);
    }
}
