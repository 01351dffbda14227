//! The sparse kernel approximator (§4.6): greedy matching pursuit that
//! collapses a (possibly large) kernel-feature-space combination down to
//! at most `spK` support vectors. Grounded on the support-vector
//! reduction `kerndynmeans_impl.hpp` performs on cluster parameters
//! after every γ-blend update.

use nalgebra::DMatrix;

use crate::kernel_model::SparseCombo;
use crate::model::Data;

/// Greedily selects up to `sp_k` of `combo`'s support vectors and
/// recomputes ordinary-least-squares coefficients on the selected subset
/// so that the kernel-norm residual against the original combination is
/// at most `sp_eps` (§4.6). Returns `combo` unchanged (cloned) if it
/// already has `sp_k` or fewer support vectors.
pub fn sparsify(combo: &SparseCombo, sp_k: usize, sp_eps: f64) -> SparseCombo {
    let m = combo.vs.len();
    if m <= sp_k {
        return combo.clone();
    }

    let mut gram = DMatrix::<f64>::zeros(m, m);
    for i in 0..m {
        for j in 0..m {
            gram[(i, j)] = combo.vs[i].sim(&combo.vs[j]);
        }
    }
    let c = nalgebra_vector(&combo.coeffs);

    let mut selected: Vec<usize> = Vec::with_capacity(sp_k);
    let mut r = c.clone();
    let mut alpha_extended = nalgebra::DVector::<f64>::zeros(m);

    while selected.len() < sp_k {
        let mut best_idx: Option<usize> = None;
        let mut best_score = -1.0f64;
        for j in 0..m {
            if selected.contains(&j) {
                continue;
            }
            let kjj = gram[(j, j)];
            if kjj <= 0.0 {
                continue;
            }
            let mut dot = 0.0;
            for k in 0..m {
                dot += r[k] * gram[(j, k)];
            }
            let score = dot.abs() / kjj.sqrt();
            if score > best_score {
                best_score = score;
                best_idx = Some(j);
            }
        }
        let Some(j) = best_idx else { break };
        selected.push(j);

        let s = selected.len();
        let mut k_ss = DMatrix::<f64>::zeros(s, s);
        let mut b_s = nalgebra::DVector::<f64>::zeros(s);
        for (a, &ia) in selected.iter().enumerate() {
            for (b, &ib) in selected.iter().enumerate() {
                k_ss[(a, b)] = gram[(ia, ib)];
            }
            let mut dot = 0.0;
            for k in 0..m {
                dot += gram[(ia, k)] * c[k];
            }
            b_s[a] = dot;
        }

        let alpha = k_ss
            .clone()
            .lu()
            .solve(&b_s)
            .unwrap_or_else(|| nalgebra::DVector::zeros(s));

        alpha_extended = nalgebra::DVector::zeros(m);
        for (a, &ia) in selected.iter().enumerate() {
            alpha_extended[ia] = alpha[a];
        }
        r = &c - &alpha_extended;

        let residual_norm_sq = quadratic_form(&r, &gram);
        if residual_norm_sq.max(0.0).sqrt() <= sp_eps {
            break;
        }
    }

    let vs = selected.iter().map(|&i| combo.vs[i].clone()).collect();
    let coeffs = selected.iter().map(|&i| alpha_extended[i]).collect();
    SparseCombo { vs, coeffs }
}

fn nalgebra_vector(v: &[f64]) -> nalgebra::DVector<f64> {
    nalgebra::DVector::from_row_slice(v)
}

fn quadratic_form(v: &nalgebra::DVector<f64>, k: &DMatrix<f64>) -> f64 {
    (v.transpose() * k * v)[(0, 0)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_model::RbfKernelData;

    #[test]
    fn leaves_small_combos_untouched() {
        let combo = SparseCombo {
            vs: vec![RbfKernelData::new(vec![0.0], 1.0), RbfKernelData::new(vec![1.0], 1.0)],
            coeffs: vec![0.5, 0.5],
        };
        let out = sparsify(&combo, 4, 1e-4);
        assert_eq!(out.vs.len(), 2);
    }

    #[test]
    fn reduces_clustered_duplicates_to_sp_k() {
        // Five near-identical points; a single support vector should
        // already approximate the combination well.
        let vs: Vec<RbfKernelData> = (0..5)
            .map(|i| RbfKernelData::new(vec![i as f64 * 1e-4], 1.0))
            .collect();
        let combo = SparseCombo {
            vs,
            coeffs: vec![0.2; 5],
        };
        let out = sparsify(&combo, 1, 1e-2);
        assert_eq!(out.vs.len(), 1);
    }
}
