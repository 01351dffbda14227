use thiserror::Error;

/// Crate-wide result alias.
pub type DynMeansResult<T> = Result<T, DynMeansError>;

/// The three-tier error taxonomy of the core: usage errors (checked
/// synchronously, no state change), invariant violations (fatal to the
/// in-progress batch only), and solver failures (a restart is abandoned,
/// or the whole batch if every restart fails).
#[derive(Debug, Error)]
pub enum DynMeansError {
    #[error("lambda must be non-negative, got {0}")]
    InvalidLambda(f64),

    #[error("Q must be non-negative, got {0}")]
    InvalidQ(f64),

    #[error("tau must be non-negative, got {0}")]
    InvalidTau(f64),

    #[error("nRestarts must be positive, got {0}")]
    InvalidRestartCount(i64),

    #[error("unknown eigensolver variant: {0}")]
    UnknownEigenSolver(String),

    #[error("kernel width must be positive, got {0}")]
    InvalidKernelWidth(f64),

    #[error("sparse approximation size must be positive, got {0}")]
    InvalidSparseApproximationSize(i64),

    #[error("observation id {data_id} is already assigned to cluster {cluster_id}")]
    DuplicateDataId { cluster_id: u64, data_id: u64 },

    #[error("observation id {data_id} is not assigned to cluster {cluster_id}")]
    DataNotInCluster { cluster_id: u64, data_id: u64 },

    #[error("cannot compute a distance against empty cluster {0}")]
    EmptyClusterDistance(u64),

    #[error("bipartite matcher reported an infeasible assignment")]
    MatcherInfeasible,

    #[error("eigensolver failed to converge")]
    EigenNonConvergence,

    #[error("all {0} restarts failed; batch aborted with no commit")]
    AllRestartsFailed(u64),

    #[error("batch {0} was already committed")]
    AlreadyCommitted(u64),
}
