use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The return value of `DynMeans::cluster` (§6): the winning restart's
/// labeling, its objective, and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Results {
    /// Observation ID -> cluster ID. Not positional: `cluster_impl.hpp`'s
    /// `getAssignedIds` returns IDs, not indices, and members can be
    /// released in any order at commit.
    pub labels: HashMap<u64, u64>,
    /// The batch objective `J` of the winning restart (§4.2).
    pub objective: f64,
    /// Wall-clock time spent inside `cluster()`.
    pub elapsed_seconds: f64,
    /// Total inner-loop passes summed across the winning restart's
    /// convergence, exposed for diagnostics.
    pub iteration_count: u64,
}
