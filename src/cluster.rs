//! The cluster record of spec.md §3. Grounded directly on
//! `dmeans/core/cluster_impl.hpp`: a single `Cluster<D, P>` owns one
//! `Parameter` value (which itself tracks both the "current" and
//! "frozen-prior" representations via `Parameter::update`/`update_old`),
//! plus the bookkeeping fields the DDP state manager mutates at commit.

use std::collections::HashMap;

use crate::error::{DynMeansError, DynMeansResult};
use crate::model::{Data, Parameter};

/// A DDP cluster record (§3).
#[derive(Debug, Clone)]
pub struct Cluster<D: Data, P: Parameter<D>> {
    id: u64,
    age: u64,
    w: f64,
    gamma: f64,
    age_cost: f64,
    prm: P,
    members: HashMap<u64, D>,
}

impl<D: Data, P: Parameter<D>> Cluster<D, P> {
    /// A cluster born this batch: age/w/gamma/age_cost all start at their
    /// zero-valued defaults, matching `cluster_impl.hpp`'s default
    /// constructor. `seed` only supplies an initial `Parameter` value for
    /// `update_old` to blend against with gamma = 0 at the first
    /// `finalize` call, so its exact content never surfaces.
    pub fn new_born(id: u64, seed: &D) -> Self {
        Cluster {
            id,
            age: 0,
            w: 0.0,
            gamma: 0.0,
            age_cost: 0.0,
            prm: P::from_singleton(seed),
            members: HashMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn w(&self) -> f64 {
        self.w
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn age_cost(&self) -> f64 {
        self.age_cost
    }

    pub fn prm(&self) -> &P {
        &self.prm
    }

    pub fn members(&self) -> &HashMap<u64, D> {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// `age == 0` iff this cluster has never been through a `finalize`
    /// call, i.e. it was born this batch and has not yet been committed.
    pub fn is_new(&self) -> bool {
        self.age == 0
    }

    pub fn assign_data(&mut self, id: u64, datum: D) -> DynMeansResult<()> {
        if self.members.contains_key(&id) {
            return Err(DynMeansError::DuplicateDataId {
                cluster_id: self.id,
                data_id: id,
            });
        }
        self.members.insert(id, datum);
        Ok(())
    }

    pub fn deassign_data(&mut self, id: u64) -> DynMeansResult<D> {
        self.members
            .remove(&id)
            .ok_or(DynMeansError::DataNotInCluster {
                cluster_id: self.id,
                data_id: id,
            })
    }

    pub fn clear_data(&mut self) {
        self.members.clear();
    }

    /// Distance to the *current* (instantiated) parameter. Fatal to the
    /// batch if this cluster has no members yet this batch.
    pub fn dist_to(&self, datum: &D) -> DynMeansResult<f64> {
        if self.is_empty() {
            return Err(DynMeansError::EmptyClusterDistance(self.id));
        }
        Ok(self.prm.dist_to(datum, true))
    }

    /// Distance to the frozen prior `prm_old`. Always valid, even for a
    /// cluster with no members this batch -- this is how the point/kernel
    /// solvers evaluate "old cluster not yet instantiated" candidates.
    pub fn dist_to_old(&self, datum: &D) -> f64 {
        self.prm.dist_to(datum, false)
    }

    /// The batch cost contribution of this cluster (§4.2): 0 if empty,
    /// else the birth term (λ if new, `Q·age` if reused) plus the
    /// model-specific `reassoc_k`.
    pub fn cost(&self, lambda: f64, q: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let birth = if self.is_new() { lambda } else { q * self.age as f64 };
        birth + self.prm.cost(&self.members, self.gamma)
    }

    /// Commit-time state transition (§4.1 / `cluster_impl.hpp::finalize`):
    /// empty clusters only age; instantiated ones freeze a new
    /// `prm_old` via the γ blend, set `w ← γ + N`, and reset to `age = 1`.
    /// Either way, `gamma`/`age_cost` are recomputed from the resulting
    /// `w`/`age`, and this batch's members are released.
    pub fn finalize(&mut self, tau: f64, q: f64) {
        if self.is_empty() {
            self.age += 1;
        } else {
            self.prm.update_old(&self.members, self.gamma);
            self.w = self.gamma + self.members.len() as f64;
            self.age = 1;
        }
        self.gamma = 1.0 / (1.0 / self.w + tau * self.age as f64);
        self.age_cost = q * self.age as f64;
        self.members.clear();
    }
}
