//! A Dirichlet-Dependent-Process ("Dynamic Means") streaming clusterer:
//! feed it batches of observations over time and it maintains a live set
//! of clusters, retiring ones that go too long unused and spawning new
//! ones as fresh structure appears, without ever re-seeing past data.
//!
//! Two concrete entry points are provided, one per supported
//! observation model (§6's plug-in interface): [`PointDynMeans`] for
//! vector observations under squared-Euclidean distance, and
//! [`KernelDynMeans`] for observations seen only through an RBF kernel.
//! Both share the same DDP state machine ([`ddp::DdpState`]) and batch
//! cost function ([`cost::batch_objective`]); they differ only in how a
//! batch is solved ([`point_solver`] vs. [`kernel_solver`]).

pub mod cluster;
pub mod config;
pub mod cost;
pub mod ddp;
pub mod eigen;
pub mod error;
pub mod kernel_model;
pub mod kernel_solver;
pub mod matching;
pub mod model;
pub mod point_model;
pub mod point_solver;
pub mod results;
pub mod sparse_approx;
pub mod spectral;

use std::collections::HashMap;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub use config::{Config, EigenSolverKind};
pub use error::{DynMeansError, DynMeansResult};
pub use results::Results;

use ddp::DdpState;
use kernel_model::{RbfKernelData, RbfParameter};
use kernel_solver::KernelSolverConfig;
use point_model::{PointData, PointParameter};

fn seed_rng(seed: i64) -> ChaCha8Rng {
    if seed >= 0 {
        ChaCha8Rng::seed_from_u64(seed as u64)
    } else {
        ChaCha8Rng::from_entropy()
    }
}

/// Streaming Dynamic Means over vector observations (§4.3's point batch
/// solver).
pub struct PointDynMeans {
    config: Config,
    state: DdpState<PointData, PointParameter>,
    rng: ChaCha8Rng,
    next_batch_id: u64,
}

impl PointDynMeans {
    /// Validates `config` (§7's usage-error checks that apply to every
    /// variant; the kernel-only checks of `validate_kernel` don't apply
    /// here, per §6's configuration table) and seeds the internal RNG
    /// from `config.seed`.
    pub fn new(config: Config) -> DynMeansResult<Self> {
        config.validate_common()?;
        let rng = seed_rng(config.seed);
        Ok(PointDynMeans {
            state: DdpState::new(config.lambda, config.q, config.tau),
            config,
            rng,
            next_batch_id: 0,
        })
    }

    /// Drops every live cluster and restarts batch numbering, without
    /// re-validating `config`.
    pub fn reset(&mut self) {
        self.state.reset();
        self.next_batch_id = 0;
    }

    pub fn live_cluster_count(&self) -> usize {
        self.state.live_cluster_count()
    }

    /// Solves one batch of observations (restarting `n_restarts` times
    /// and keeping the lowest-objective assignment, §4.3) and commits the
    /// winner to the DDP state.
    pub fn cluster(
        &mut self,
        observations: &HashMap<u64, Vec<f64>>,
        n_restarts: u32,
    ) -> DynMeansResult<Results> {
        if n_restarts == 0 {
            return Err(DynMeansError::InvalidRestartCount(0));
        }
        let start = Instant::now();
        let data: HashMap<u64, PointData> = observations
            .iter()
            .map(|(&id, v)| (id, PointData::new(v.clone())))
            .collect();

        if self.config.verbose {
            log::info!(
                "point batch {}: {} observations, {} live clusters",
                self.next_batch_id,
                data.len(),
                self.state.live_cluster_count(),
            );
        }

        let snapshots = self.state.prepare_for_batch();
        let outcome = point_solver::solve(
            &data,
            &snapshots,
            self.config.lambda,
            n_restarts,
            self.config.iteration_cap,
            &mut self.rng,
        )?;

        let labels: HashMap<u64, u64> =
            outcome.labeling.iter().map(|(&id, &(label, _))| (id, label)).collect();

        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;
        let retired = self.state.commit(batch_id, outcome.labeling)?;
        if self.config.verbose && !retired.is_empty() {
            log::info!("point batch {}: retired clusters {:?}", batch_id, retired);
        }

        Ok(Results {
            labels,
            objective: outcome.objective,
            elapsed_seconds: start.elapsed().as_secs_f64(),
            iteration_count: outcome.iterations,
        })
    }
}

/// Streaming Dynamic Means over RBF-kernel observations (§4.4's
/// multilevel kernel batch solver).
pub struct KernelDynMeans {
    config: Config,
    state: DdpState<RbfKernelData, RbfParameter>,
    rng: ChaCha8Rng,
    next_batch_id: u64,
}

impl KernelDynMeans {
    pub fn new(config: Config) -> DynMeansResult<Self> {
        config.validate()?;
        let rng = seed_rng(config.seed);
        Ok(KernelDynMeans {
            state: DdpState::new(config.lambda, config.q, config.tau),
            config,
            rng,
            next_batch_id: 0,
        })
    }

    pub fn reset(&mut self) {
        self.state.reset();
        self.next_batch_id = 0;
    }

    pub fn live_cluster_count(&self) -> usize {
        self.state.live_cluster_count()
    }

    pub fn cluster(
        &mut self,
        observations: &HashMap<u64, Vec<f64>>,
        n_restarts: u32,
    ) -> DynMeansResult<Results> {
        if n_restarts == 0 {
            return Err(DynMeansError::InvalidRestartCount(0));
        }
        let start = Instant::now();
        let data: HashMap<u64, RbfKernelData> = observations
            .iter()
            .map(|(&id, v)| (id, RbfKernelData::new(v.clone(), self.config.kernel_width)))
            .collect();

        if self.config.verbose {
            log::info!(
                "kernel batch {}: {} observations, {} live clusters",
                self.next_batch_id,
                data.len(),
                self.state.live_cluster_count(),
            );
        }

        let snapshots = self.state.prepare_for_batch();
        let solver_cfg = KernelSolverConfig {
            n_coarsest: self.config.n_coarsest,
            sp_k: self.config.sparse_approximation_size,
            sp_eps: self.config.sparse_approximation_error_threshold,
            eigenvalue_threshold: self.config.eigenvalue_threshold,
            eigen_solver: self.config.eigen_solver,
        };
        let outcome = kernel_solver::solve(
            &data,
            &snapshots,
            self.config.lambda,
            &solver_cfg,
            n_restarts,
            self.config.iteration_cap,
            &mut self.rng,
        )?;

        let labels: HashMap<u64, u64> =
            outcome.labeling.iter().map(|(&id, &(label, _))| (id, label)).collect();

        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;
        let retired = self.state.commit(batch_id, outcome.labeling)?;
        if self.config.verbose && !retired.is_empty() {
            log::info!("kernel batch {}: retired clusters {:?}", batch_id, retired);
        }

        Ok(Results {
            labels,
            objective: outcome.objective,
            elapsed_seconds: start.elapsed().as_secs_f64(),
            iteration_count: outcome.iterations,
        })
    }
}
