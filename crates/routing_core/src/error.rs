//! Fatal configuration errors raised while building routing topology.
//! Phase R1, foundational.
//!
//! Every variant here corresponds to one of the "Configuration errors" named
//! in the core's failure-surfacing contract: fan-in overflow and unresolved
//! patch-pointer lookups during inflow inversion. Both are process-fatal —
//! see `driver::hydro_routing` for how a `RoutingError` is turned into a
//! single stderr line and a process exit rather than propagated to callers.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error(
        "patch {patch} exceeds MAX_NEIGHBORS={max} fan-in ({count} incoming edges); \
         raise MAX_NEIGHBORS and recompile or reduce drainage fan-in for this basin"
    )]
    FanInOverflow {
        patch: usize,
        count: usize,
        max: usize,
    },

    #[error(
        "outflow edge from patch {source} references a neighbor patch not present in this basin \
         (layer: {layer})"
    )]
    UnresolvedNeighbor { source: usize, layer: &'static str },
}
