//! The model plug-in interface of spec.md §6. The core is generic over a
//! model exposing a `Data` type (opaque observations), a `Parameter` type
//! (the per-cluster state the solvers mutate), and — kernel variant only —
//! a `Coarse` type representing an aggregated graph node produced by the
//! multilevel coarsening of §4.4.
//!
//! Distance/update/kernel semantics are entirely the plug-in's concern; the
//! core only ever calls through these trait methods.

use std::collections::HashMap;

/// An observation. Opaque to the core beyond the operations below.
pub trait Data: Clone {
    /// Mass contributed by this observation (`getN`); 1.0 for ordinary
    /// singleton observations, used verbatim by coarse nodes that
    /// aggregate several of them.
    fn get_n(&self) -> f64;

    /// Pairwise similarity / kernel value with another observation
    /// (kernel variant only; the point variant never calls this).
    fn sim(&self, other: &Self) -> f64;

    /// `sim(self, self)` — a datum's self-similarity, e.g. `k(x,x)`.
    fn self_sim(&self) -> f64;
}

/// A cluster's parameter. Mutated in place by the batch solvers
/// (`update`), and separately tracked as `prm_old` at commit time
/// (`update_old`), per §4.1's parameter blending.
pub trait Parameter<D: Data>: Clone {
    /// Build the initial parameter for a brand-new, single-observation
    /// cluster (point variant: the parameter equals the datum; kernel
    /// variant: a one-element support combination with coefficient 1).
    fn from_singleton(datum: &D) -> Self;

    /// Recompute `prm` from the cluster's current members against the
    /// stored `prm_old` and prior strength `gamma`, per §4.1's blend. A
    /// no-op when `members` is empty (the Open-Question resolution:
    /// `prm` stays whatever it already was).
    fn update(&mut self, members: &HashMap<u64, D>, gamma: f64);

    /// Recompute `prm_old` the same way, called once at commit after
    /// `update` so that the *next* batch sees a frozen prior. A no-op
    /// when `members` is empty.
    fn update_old(&mut self, members: &HashMap<u64, D>, gamma: f64);

    /// Distance from this parameter to a datum. `active` distinguishes
    /// "currently instantiated this batch" (distance to `prm`) from
    /// "not yet touched this batch" (distance to `prm_old`), matching
    /// `cluster_impl.hpp::distTo`'s `isActive` flag.
    fn dist_to(&self, datum: &D, active: bool) -> f64;

    /// The model-specific `reassoc_k` term of §4.2 for this cluster's
    /// current members, given its current γ.
    fn cost(&self, members: &HashMap<u64, D>, gamma: f64) -> f64;

    /// Kernel-variant only: similarity between this parameter (read as
    /// `prm_old` when `active` is false) and a datum, used by the
    /// correspondence edge-weight formula of §4.7 and the kernel cost of
    /// §4.2. The point variant's implementation is never called.
    fn sim_to_datum(&self, datum: &D, active: bool) -> f64;

    /// Kernel-variant only: `sim(prm_old, prm_old)`, used by the §4.7
    /// edge weight and the spectral matrix's old-cluster-slot diagonal.
    fn self_sim(&self, active: bool) -> f64;

    /// Collapse `prm`'s representation to at most `sp_k` support vectors
    /// (§4.6), called by the kernel solver after every blend. The point
    /// variant has no support-vector representation to collapse, so the
    /// default is a no-op.
    fn compress(&mut self, _sp_k: usize, _sp_eps: f64) {}
}

/// A coarse graph node produced by one level of multilevel coarsening
/// (§4.4, kernel variant only). Constructible by lifting a single `Data`
/// value (`promote`) and by merging two nodes (`merge`); both aggregate
/// `sim` and mass the way the model defines.
pub trait Coarse<D: Data>: Clone {
    /// Lift a single leaf observation into a (singleton) coarse node.
    fn promote(datum: &D) -> Self;

    /// Merge two coarse nodes (or two promoted leaves) into one,
    /// aggregating similarity and mass per the model's definition.
    fn merge(a: &Self, b: &Self) -> Self;

    /// Pairwise similarity between two coarse nodes.
    fn sim(&self, other: &Self) -> f64;

    /// Aggregated mass of this node (sum of the `getN()` of everything
    /// it has absorbed).
    fn get_n(&self) -> f64;

    /// Similarity between this coarse node and a cluster parameter
    /// (`prm` if `active`, else `prm_old`), used to build the spectral
    /// matrix's old-cluster-slot rows/columns (§4.5) at the coarsest
    /// level.
    fn sim_to_param<P: Parameter<D>>(&self, param: &P, active: bool) -> f64;
}
