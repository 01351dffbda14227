//! The reference kernel-model plug-in: observations exist only through an
//! RBF similarity, cluster parameters are sparse convex combinations of
//! support vectors. Grounded on the similarity/coarse-node usage visible
//! throughout `kerndynmeans_impl.hpp` (the "Kern" prefix there is this
//! variant).

use std::collections::HashMap;

use ndarray::Array1;

use crate::model::{Coarse, Data, Parameter};

/// A kernel observation: a raw feature vector consumed only through
/// `sim`/`self_sim` (never through direct coordinates).
#[derive(Debug, Clone)]
pub struct RbfKernelData {
    pub v: Array1<f64>,
    omega: f64,
}

impl RbfKernelData {
    pub fn new(v: Vec<f64>, omega: f64) -> Self {
        RbfKernelData { v: Array1::from_vec(v), omega }
    }
}

impl Data for RbfKernelData {
    fn get_n(&self) -> f64 {
        1.0
    }

    fn sim(&self, other: &Self) -> f64 {
        let sq = (&self.v - &other.v).mapv(|x| x * x).sum();
        (-sq / (2.0 * self.omega * self.omega)).exp()
    }

    fn self_sim(&self) -> f64 {
        1.0
    }
}

/// A sparse convex combination `sum_i coeffs[i] * phi(vs[i])` in kernel
/// feature space; shared representation for both the cluster parameter
/// and the multilevel coarse node, since both are "weighted bags of
/// support points" under this model.
#[derive(Debug, Clone, Default)]
pub struct SparseCombo {
    pub vs: Vec<RbfKernelData>,
    pub coeffs: Vec<f64>,
}

impl SparseCombo {
    fn singleton(datum: &RbfKernelData) -> Self {
        SparseCombo { vs: vec![datum.clone()], coeffs: vec![1.0] }
    }

    fn sim_to_datum(&self, datum: &RbfKernelData) -> f64 {
        self.vs.iter().zip(&self.coeffs).map(|(v, c)| c * v.sim(datum)).sum()
    }

    fn self_sim(&self) -> f64 {
        let mut s = 0.0;
        for i in 0..self.vs.len() {
            for j in 0..self.vs.len() {
                s += self.coeffs[i] * self.coeffs[j] * self.vs[i].sim(&self.vs[j]);
            }
        }
        s
    }

    /// The unsparsified γ-blend of §4.1's kernel-variant parameter
    /// update: `γ/(γ+N)` on the old combination, `1/(γ+N)` uniformly on
    /// each new datum.
    fn blend(old: &SparseCombo, members: &HashMap<u64, RbfKernelData>, gamma: f64) -> SparseCombo {
        let n = members.len() as f64;
        let denom = gamma + n;
        let mut vs = Vec::with_capacity(old.vs.len() + members.len());
        let mut coeffs = Vec::with_capacity(old.vs.len() + members.len());
        for (v, c) in old.vs.iter().zip(&old.coeffs) {
            vs.push(v.clone());
            coeffs.push(c * gamma / denom);
        }
        for d in members.values() {
            vs.push(d.clone());
            coeffs.push(1.0 / denom);
        }
        SparseCombo { vs, coeffs }
    }
}

/// A kernel cluster parameter: current support combination and the one
/// frozen at the end of the previous instantiating batch.
#[derive(Debug, Clone, Default)]
pub struct RbfParameter {
    pub combo: SparseCombo,
    pub combo_old: SparseCombo,
}

impl Parameter<RbfKernelData> for RbfParameter {
    fn from_singleton(datum: &RbfKernelData) -> Self {
        let combo = SparseCombo::singleton(datum);
        RbfParameter { combo: combo.clone(), combo_old: combo }
    }

    fn update(&mut self, members: &HashMap<u64, RbfKernelData>, gamma: f64) {
        if members.is_empty() {
            return;
        }
        self.combo = SparseCombo::blend(&self.combo_old, members, gamma);
    }

    fn update_old(&mut self, members: &HashMap<u64, RbfKernelData>, gamma: f64) {
        if members.is_empty() {
            return;
        }
        self.combo_old = SparseCombo::blend(&self.combo_old, members, gamma);
    }

    fn dist_to(&self, datum: &RbfKernelData, active: bool) -> f64 {
        let combo = if active { &self.combo } else { &self.combo_old };
        datum.self_sim() - 2.0 * combo.sim_to_datum(datum) + combo.self_sim()
    }

    fn cost(&self, members: &HashMap<u64, RbfKernelData>, gamma: f64) -> f64 {
        let n = members.len() as f64;
        if n == 0.0 {
            return 0.0;
        }
        let self_sum: f64 = members.values().map(|d| d.self_sim()).sum();
        let items: Vec<&RbfKernelData> = members.values().collect();
        let mut pair_sum = 0.0;
        for a in &items {
            for b in &items {
                pair_sum += a.sim(b);
            }
        }
        let mut c = self_sum - pair_sum / n;
        if gamma > 0.0 {
            let old_self = self.self_sim(false);
            let old_cross: f64 = members.values().map(|d| self.sim_to_datum(d, false)).sum();
            c += gamma * n / (gamma + n) * old_self - 2.0 * gamma / (gamma + n) * old_cross;
        }
        c
    }

    fn sim_to_datum(&self, datum: &RbfKernelData, active: bool) -> f64 {
        if active {
            self.combo.sim_to_datum(datum)
        } else {
            self.combo_old.sim_to_datum(datum)
        }
    }

    fn self_sim(&self, active: bool) -> f64 {
        if active {
            self.combo.self_sim()
        } else {
            self.combo_old.self_sim()
        }
    }

    /// Collapse `combo` to at most `sp_k` support vectors via the greedy
    /// matching-pursuit approximator of §4.6.
    fn compress(&mut self, sp_k: usize, sp_eps: f64) {
        self.combo = crate::sparse_approx::sparsify(&self.combo, sp_k, sp_eps);
    }
}

/// A multilevel coarse graph node: the flat bag of leaf observations it
/// has absorbed so far. `sim`/`get_n` aggregate over that bag, the
/// "aggregate sim and N" contract of §4.4's coarsening step.
#[derive(Debug, Clone)]
pub struct RbfCoarseNode {
    leaves: Vec<RbfKernelData>,
}

impl Coarse<RbfKernelData> for RbfCoarseNode {
    fn promote(datum: &RbfKernelData) -> Self {
        RbfCoarseNode { leaves: vec![datum.clone()] }
    }

    fn merge(a: &Self, b: &Self) -> Self {
        let mut leaves = Vec::with_capacity(a.leaves.len() + b.leaves.len());
        leaves.extend(a.leaves.iter().cloned());
        leaves.extend(b.leaves.iter().cloned());
        RbfCoarseNode { leaves }
    }

    fn sim(&self, other: &Self) -> f64 {
        let mut s = 0.0;
        for a in &self.leaves {
            for b in &other.leaves {
                s += a.sim(b);
            }
        }
        s
    }

    fn get_n(&self) -> f64 {
        self.leaves.iter().map(|l| l.get_n()).sum()
    }

    fn sim_to_param<P: Parameter<RbfKernelData>>(&self, param: &P, active: bool) -> f64 {
        self.leaves.iter().map(|l| param.sim_to_datum(l, active)).sum()
    }
}

impl RbfCoarseNode {
    /// The original leaf observations a coarse node represents, needed
    /// by the refinement descent (§4.4) to broadcast a coarse label back
    /// down to its children.
    pub fn leaves(&self) -> &[RbfKernelData] {
        &self.leaves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rbf_self_sim_is_one() {
        let d = RbfKernelData::new(vec![1.0, 2.0], 1.0);
        assert_relative_eq!(d.self_sim(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn identical_points_have_unit_similarity() {
        let a = RbfKernelData::new(vec![0.0, 0.0], 0.5);
        let b = RbfKernelData::new(vec![0.0, 0.0], 0.5);
        assert_relative_eq!(a.sim(&b), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn far_points_have_near_zero_similarity() {
        let a = RbfKernelData::new(vec![0.0], 0.1);
        let b = RbfKernelData::new(vec![100.0], 0.1);
        assert!(a.sim(&b) < 1e-6);
    }

    #[test]
    fn coarse_merge_aggregates_mass() {
        let a = RbfKernelData::new(vec![0.0], 1.0);
        let b = RbfKernelData::new(vec![1.0], 1.0);
        let ca = RbfCoarseNode::promote(&a);
        let cb = RbfCoarseNode::promote(&b);
        let merged = RbfCoarseNode::merge(&ca, &cb);
        assert_relative_eq!(merged.get_n(), 2.0, epsilon = 1e-12);
    }
}
