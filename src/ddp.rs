//! The DDP state manager (§4.1). Grounded on
//! `cluster_impl.hpp::finalize`/`kerndynmeans_impl.hpp::updateState`: owns
//! the authoritative cluster map and ID counter, exposes a read-only
//! pre-batch snapshot to the solvers, and is the sole writer via `commit`.

use std::collections::HashMap;

use crate::cluster::Cluster;
use crate::error::{DynMeansError, DynMeansResult};
use crate::model::{Data, Parameter};

/// A read-only view of one live cluster, handed to the batch solvers at
/// the start of a batch (§4.1's `prepare_for_batch` contract: `(id, γ,
/// age_cost, prm_old, w_old)`).
#[derive(Debug, Clone)]
pub struct ClusterSnapshot<P> {
    pub id: u64,
    pub gamma: f64,
    pub age_cost: f64,
    pub prm_old: P,
    pub w_old: f64,
}

/// Owns every live `Cluster` and the process-wide-per-instance ID
/// counter (§9's "Global ID counter" redesign note: a counter owned by
/// the state instance rather than a process-wide static).
pub struct DdpState<D: Data, P: Parameter<D>> {
    clusters: HashMap<u64, Cluster<D, P>>,
    next_id: u64,
    lambda: f64,
    q: f64,
    tau: f64,
    last_committed_batch: Option<u64>,
}

impl<D: Data, P: Parameter<D>> DdpState<D, P> {
    pub fn new(lambda: f64, q: f64, tau: f64) -> Self {
        DdpState {
            clusters: HashMap::new(),
            next_id: 0,
            lambda,
            q,
            tau,
            last_committed_batch: None,
        }
    }

    pub fn reset(&mut self) {
        self.clusters.clear();
        self.next_id = 0;
        self.last_committed_batch = None;
    }

    /// The next fresh ID a solver may draw for a brand-new cluster. A
    /// solver may draw several in sequence within one restart; none of
    /// them are reserved until `commit` actually uses them (a losing
    /// restart's draws are simply discarded).
    pub fn peek_next_id(&self) -> u64 {
        self.next_id
    }

    pub fn prepare_for_batch(&self) -> Vec<ClusterSnapshot<P>> {
        self.clusters
            .values()
            .map(|c| ClusterSnapshot {
                id: c.id(),
                gamma: c.gamma(),
                age_cost: c.age_cost(),
                prm_old: c.prm().clone(),
                w_old: c.w(),
            })
            .collect()
    }

    pub fn live_cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn get(&self, id: u64) -> Option<&Cluster<D, P>> {
        self.clusters.get(&id)
    }

    /// Applies a winning restart's labeling to the DDP state (§4.1).
    /// `labeling` maps each observation ID to `(label, datum)`, where
    /// `label` is either an existing cluster's ID or a fresh ID drawn
    /// from `peek_next_id` during solving. Returns the IDs of any
    /// clusters retired this commit (`age_cost > lambda`).
    ///
    /// Rejects a second commit under the same `batch_id` (Testable
    /// Properties §8: "Committing twice with the same (batch, labels) is
    /// illegal").
    pub fn commit(
        &mut self,
        batch_id: u64,
        labeling: HashMap<u64, (u64, D)>,
    ) -> DynMeansResult<Vec<u64>> {
        if let Some(last) = self.last_committed_batch {
            if batch_id <= last {
                return Err(DynMeansError::AlreadyCommitted(batch_id));
            }
        }

        let mut by_label: HashMap<u64, HashMap<u64, D>> = HashMap::new();
        for (data_id, (label, datum)) in labeling {
            let group = by_label.entry(label).or_default();
            if group.insert(data_id, datum).is_some() {
                return Err(DynMeansError::DuplicateDataId {
                    cluster_id: label,
                    data_id,
                });
            }
        }

        for (label, members) in by_label {
            if !self.clusters.contains_key(&label) {
                let seed = members
                    .values()
                    .next()
                    .expect("a label is only grouped when it has at least one member");
                let cluster = Cluster::new_born(label, seed);
                self.clusters.insert(label, cluster);
                if label >= self.next_id {
                    self.next_id = label + 1;
                }
            }
            let cluster = self.clusters.get_mut(&label).unwrap();
            for (data_id, datum) in members {
                cluster.assign_data(data_id, datum)?;
            }
        }

        let mut retired = Vec::new();
        for (id, cluster) in self.clusters.iter_mut() {
            cluster.finalize(self.tau, self.q);
            if cluster.age_cost() > self.lambda {
                retired.push(*id);
            }
        }
        for id in &retired {
            self.clusters.remove(id);
        }

        self.last_committed_batch = Some(batch_id);
        Ok(retired)
    }
}
