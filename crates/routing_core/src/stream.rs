//! Stream router.
//! Phase R3, Task R3.3.
//!
//! Placeholder for the core: the real stream-network accounting (scavenging
//! lateral inflow targeted at stream-labelled patches, baseflow recession,
//! returning overflow to the donating surface pools) belongs to an external
//! collaborator this crate does not implement. Basins with no stream edges
//! route nothing here, so this is a no-op.
use crate::state::State;
use crate::topology::Topology;

/// No-op stream accounting. Kept as a named call site in the driver's outer
/// loop so a future stream-network collaborator has a single seam to plug
/// into, matching the ordering guarantee `sfc_routing -> stream_routing ->
/// sub_vertical`.
pub fn stream_routing(_topo: &Topology, _state: &mut State, _substep: f64) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basin::Basin;
    use crate::topology::Topology;

    #[test]
    fn no_op_leaves_state_untouched() {
        let basin = Basin::new(Vec::new());
        let topo = Topology::build(&basin, 1.0).unwrap();
        let mut state = State::snapshot(&topo, &basin);
        let before = state.clone();
        stream_routing(&topo, &mut state, 60.0);
        assert_eq!(before.sfc_h2o, state.sfc_h2o);
    }
}
