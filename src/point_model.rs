//! The reference point-model plug-in: observations are vectors in a
//! metric space, cluster parameters are prototypes updated by weighted
//! means. Grounded on `dmeans/model/expkernel_model.hpp`, which despite
//! its name is the point model (a single `Eigen::VectorXd` per datum and
//! per parameter, squared-Euclidean distance, linear γ-blended update).

use std::collections::HashMap;

use ndarray::Array1;

use crate::model::{Data, Parameter};

/// A point observation: a vector in ℝ^d.
#[derive(Debug, Clone, PartialEq)]
pub struct PointData {
    pub v: Array1<f64>,
}

impl PointData {
    pub fn new(v: Vec<f64>) -> Self {
        PointData { v: Array1::from_vec(v) }
    }
}

impl Data for PointData {
    fn get_n(&self) -> f64 {
        1.0
    }

    // The point variant never calls sim/self_sim; squared-Euclidean
    // distance is computed directly by `PointParameter::dist_to`.
    fn sim(&self, other: &Self) -> f64 {
        -((&self.v - &other.v).mapv(|x| x * x).sum())
    }

    fn self_sim(&self) -> f64 {
        0.0
    }
}

/// A point cluster parameter: current prototype `v` and the prototype
/// frozen at the end of the previous instantiating batch, `v_old`.
#[derive(Debug, Clone)]
pub struct PointParameter {
    pub v: Array1<f64>,
    pub v_old: Array1<f64>,
}

impl Parameter<PointData> for PointParameter {
    fn from_singleton(datum: &PointData) -> Self {
        PointParameter { v: datum.v.clone(), v_old: datum.v.clone() }
    }

    fn update(&mut self, members: &HashMap<u64, PointData>, gamma: f64) {
        if members.is_empty() {
            // Open-Question resolution: an empty cluster's parameter is
            // left untouched; only its age advances (handled by the DDP
            // state manager).
            return;
        }
        let mut acc = &self.v_old * gamma;
        let mut wt = gamma;
        for d in members.values() {
            acc = acc + &d.v;
            wt += 1.0;
        }
        self.v = acc / wt;
    }

    fn update_old(&mut self, members: &HashMap<u64, PointData>, gamma: f64) {
        if members.is_empty() {
            return;
        }
        let mut acc = &self.v_old * gamma;
        let mut wt = gamma;
        for d in members.values() {
            acc = acc + &d.v;
            wt += 1.0;
        }
        self.v_old = acc / wt;
    }

    fn dist_to(&self, datum: &PointData, active: bool) -> f64 {
        let target = if active { &self.v } else { &self.v_old };
        (&datum.v - target).mapv(|x| x * x).sum()
    }

    fn cost(&self, members: &HashMap<u64, PointData>, gamma: f64) -> f64 {
        let mut c = gamma * (&self.v - &self.v_old).mapv(|x| x * x).sum();
        for d in members.values() {
            c += (&self.v - &d.v).mapv(|x| x * x).sum();
        }
        c
    }

    // Kernel-only operations; the point variant's solver never invokes
    // them, so they degrade to the Euclidean analogue for completeness
    // rather than panicking.
    fn sim_to_datum(&self, datum: &PointData, active: bool) -> f64 {
        -self.dist_to(datum, active)
    }

    fn self_sim(&self, _active: bool) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn update_blends_prior_and_members() {
        let mut p = PointParameter { v: Array1::zeros(2), v_old: Array1::from_vec(vec![1.0, 1.0]) };
        let mut members = HashMap::new();
        members.insert(0u64, PointData::new(vec![3.0, 3.0]));
        members.insert(1u64, PointData::new(vec![5.0, 5.0]));
        // gamma = 2, members sum = (8,8), total weight = 4
        // expected v = (2*1 + 8)/4 = 2.5
        p.update(&members, 2.0);
        assert_relative_eq!(p.v[0], 2.5, epsilon = 1e-12);
        assert_relative_eq!(p.v[1], 2.5, epsilon = 1e-12);
    }

    #[test]
    fn empty_update_is_noop() {
        let mut p = PointParameter { v: Array1::from_vec(vec![9.0]), v_old: Array1::from_vec(vec![9.0]) };
        let members: HashMap<u64, PointData> = HashMap::new();
        p.update(&members, 5.0);
        assert_relative_eq!(p.v[0], 9.0, epsilon = 1e-12);
    }

    #[test]
    fn dist_to_uses_active_flag() {
        let p = PointParameter { v: Array1::from_vec(vec![0.0]), v_old: Array1::from_vec(vec![10.0]) };
        let d = PointData::new(vec![0.0]);
        assert_relative_eq!(p.dist_to(&d, true), 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.dist_to(&d, false), 100.0, epsilon = 1e-12);
    }
}
