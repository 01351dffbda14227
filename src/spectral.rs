//! The spectral base clusterer of §4.5: normalized-cuts embedding plus
//! Yu-Shi discretization, run at the coarsest level of the kernel
//! solver's multilevel stack (and, when no multilevel coarsening has
//! occurred yet, directly on the leaves). Grounded on
//! `kerndynmeans_impl.hpp::baseCluster`'s augmented-kernel-matrix
//! construction and its `discretisation` routine (itself a port of the
//! Yu & Shi 2003 "Multiclass Spectral Clustering" reference MATLAB).

use nalgebra::DMatrix;
use rand::Rng;

use crate::ddp::ClusterSnapshot;
use crate::eigen::top_eigenpairs;
use crate::config::EigenSolverKind;
use crate::error::DynMeansResult;
use crate::model::{Coarse, Data, Parameter};

/// The result of one restart of the base clusterer: a cluster index per
/// row of the augmented matrix (coarse nodes first, then one row per
/// `old_clusters` entry in order) and the normalized-cuts objective the
/// restart achieved, used to pick the best of `n_restarts`.
///
/// `row_labels[nodes.len()..]` -- the discretization groups the
/// old-cluster anchor rows fall into -- are reported but intentionally
/// not read by `kernel_solver::assign_identities`. §4.5 ("rows
/// corresponding to old cluster slots receive their old-cluster label")
/// describes discretization itself handing out final identities; this
/// crate instead always resolves final identity through §4.7's bipartite
/// matcher (`matching::resolve_correspondence`), the same call the
/// multilevel refinement descent already makes after every relabeling
/// pass. Positionally reading an anchor row's group would only rename a
/// group to an old ID when the spectral embedding happens to place that
/// anchor in the "right" group; the matcher instead scores every
/// (current group, old cluster) pair by the §4.7 edge weight and finds
/// the globally optimal one-to-one assignment, which is a strictly more
/// robust way to reach the same final correspondence.
pub struct BaseClustering {
    pub row_labels: Vec<usize>,
    pub k: usize,
    pub objective: f64,
}

/// Runs the spectral base clusterer `n_restarts` times and keeps the
/// lowest-objective discretization (§4.5's own restart-and-keep-best
/// contract, mirroring §4.3's Testable Property 6 at the base-clustering
/// level).
pub fn base_cluster<D, C, P>(
    nodes: &[C],
    old_clusters: &[ClusterSnapshot<P>],
    eigenvalue_threshold: f64,
    eigen_solver: EigenSolverKind,
    n_restarts: u32,
    rng: &mut impl Rng,
) -> DynMeansResult<BaseClustering>
where
    D: Data,
    C: Coarse<D>,
    P: Parameter<D>,
{
    let affinity = build_augmented_matrix(nodes, old_clusters);
    let n = affinity.nrows();

    let degrees: Vec<f64> = (0..n).map(|i| affinity.row(i).sum()).collect();
    let mut normalized = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        let di = degrees[i].max(1e-12).sqrt();
        for j in 0..n {
            let dj = degrees[j].max(1e-12).sqrt();
            normalized[(i, j)] = affinity[(i, j)] / (di * dj);
        }
    }

    let eigen = top_eigenpairs(&normalized, n, eigenvalue_threshold, eigen_solver, rng)?;
    let k = eigen.values.len().max(1);
    let x = row_normalize(&eigen.vectors, k);

    let mut best: Option<(Vec<usize>, f64)> = None;
    for _ in 0..n_restarts.max(1) {
        let (z, objective) = discretize(&x, rng);
        if best.as_ref().map_or(true, |(_, b)| objective < *b) {
            best = Some((labels_from_indicator(&z), objective));
        }
    }
    let (row_labels, objective) = best.expect("n_restarts.max(1) guarantees at least one attempt");

    Ok(BaseClustering { row_labels, k, objective })
}

/// §4.5's augmented matrix: coarse-node-to-coarse-node similarity in the
/// top-left block, coarse-node-to-old-cluster "anchor" weights in the
/// off-diagonal blocks (scaled by `γ/(γ+1)` so that a more confident old
/// cluster pulls harder), and a confidence-scaled self-term on the
/// diagonal for each old-cluster row/column. Old clusters never interact
/// with each other directly (a label can inherit at most one).
fn build_augmented_matrix<D, C, P>(nodes: &[C], old_clusters: &[ClusterSnapshot<P>]) -> DMatrix<f64>
where
    D: Data,
    C: Coarse<D>,
    P: Parameter<D>,
{
    let n_nodes = nodes.len();
    let n_old = old_clusters.len();
    let n = n_nodes + n_old;
    let mut m = DMatrix::<f64>::zeros(n, n);

    for i in 0..n_nodes {
        for j in 0..n_nodes {
            m[(i, j)] = nodes[i].sim(&nodes[j]);
        }
    }

    for (j, old) in old_clusters.iter().enumerate() {
        let confidence = old.gamma / (old.gamma + 1.0);
        let col = n_nodes + j;
        for i in 0..n_nodes {
            let w = confidence * nodes[i].sim_to_param(&old.prm_old, false);
            m[(i, col)] = w;
            m[(col, i)] = w;
        }
        m[(col, col)] = confidence * old.prm_old.self_sim(false);
    }

    m
}

fn row_normalize(x: &DMatrix<f64>, k: usize) -> DMatrix<f64> {
    let n = x.nrows();
    let mut out = DMatrix::<f64>::zeros(n, k);
    for i in 0..n {
        let norm = x.row(i).norm().max(1e-12);
        for j in 0..k {
            out[(i, j)] = x[(i, j)] / norm;
        }
    }
    out
}

const MAX_DISCRETIZE_ITERS: usize = 200;

/// The Yu-Shi alternating-projection discretization: initialize a
/// rotation `R` from the `k` mutually-most-orthogonal rows of `x`, then
/// alternate a hard one-hot assignment (`Z`) against the current
/// rotation and a re-fit of `R` via the SVD of `Z^T X` until
/// `‖X - Z R‖²` stops improving.
fn discretize(x: &DMatrix<f64>, rng: &mut impl Rng) -> (DMatrix<f64>, f64) {
    let (n, k) = x.shape();
    let mut r = DMatrix::<f64>::zeros(k, k);
    let mut chosen = vec![false; n];

    let first = rng.gen_range(0..n);
    r.set_column(0, &x.row(first).transpose());
    chosen[first] = true;

    let mut accum = vec![0.0f64; n];
    for col in 1..k {
        let r_col = r.column(col - 1).clone_owned();
        for i in 0..n {
            if chosen[i] {
                continue;
            }
            accum[i] += (x.row(i) * &r_col)[(0, 0)].abs();
        }
        let mut best_i = 0;
        let mut best_val = f64::INFINITY;
        for i in 0..n {
            if chosen[i] {
                continue;
            }
            if accum[i] < best_val {
                best_val = accum[i];
                best_i = i;
            }
        }
        r.set_column(col, &x.row(best_i).transpose());
        chosen[best_i] = true;
    }

    let mut z = DMatrix::<f64>::zeros(n, k);
    let mut prev_obj = f64::INFINITY;

    for _ in 0..MAX_DISCRETIZE_ITERS {
        let xr = x * &r;
        z.fill(0.0);
        for i in 0..n {
            let mut best_j = 0;
            let mut best_v = f64::NEG_INFINITY;
            for j in 0..k {
                if xr[(i, j)] > best_v {
                    best_v = xr[(i, j)];
                    best_j = j;
                }
            }
            z[(i, best_j)] = 1.0;
        }

        let m = z.transpose() * x;
        let svd = m.svd(true, true);
        let u = svd.u.expect("compute_u requested");
        let v_t = svd.v_t.expect("compute_v requested");
        let new_r = v_t.transpose() * u.transpose();

        let residual = x - &z * &new_r;
        let obj = residual.norm_squared();
        r = new_r;

        let rel_change = (prev_obj - obj).abs() / prev_obj.max(1e-12);
        prev_obj = obj;
        if rel_change < 1e-6 {
            break;
        }
    }

    (z, prev_obj)
}

fn labels_from_indicator(z: &DMatrix<f64>) -> Vec<usize> {
    (0..z.nrows())
        .map(|i| {
            (0..z.ncols())
                .max_by(|&a, &b| z[(i, a)].partial_cmp(&z[(i, b)]).unwrap())
                .unwrap_or(0)
        })
        .collect()
}
