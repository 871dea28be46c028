//! Driver: the public entry point.
//! Phase R4, Task R4.1.
//!
//! Marshals per-patch state into flat working arrays, runs the outer
//! coupling loop until the external step is exhausted, and writes state
//! back onto the basin's patches.
use serde::{Deserialize, Serialize};

use crate::basin::Basin;
use crate::canopy::can_routing;
use crate::constants::EPSILON;
use crate::state::State;
use crate::stream::stream_routing;
use crate::subsurface::sub_routing;
use crate::surface::sfc_routing;
use crate::topology::Topology;
use crate::vertical::sub_vertical;

/// Driver-level configuration. `verbose_flag` controls diagnostic emission
/// only and has no effect on the numerics; the core itself does not emit
/// structured logs (see the crate root documentation). `std_scale` widens
/// or narrows the transmissivity quadrature via each patch's microtopographic
/// standard deviation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub verbose_flag: bool,
    pub std_scale: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            verbose_flag: false,
            std_scale: 1.0,
        }
    }
}

/// Advance `basin` by `extstep_seconds` of simulated time. Builds topology
/// lazily on first call and caches it on `basin`. Fatal configuration
/// errors (fan-in overflow, an outflow edge with no resolvable destination)
/// are written to stderr and terminate the process; this function never
/// returns a `Result` because the core has nothing recoverable to hand
/// back to a caller once topology is malformed.
pub fn hydro_routing(config: &RoutingConfig, extstep_seconds: f64, basin: &mut Basin) {
    if basin.topology.is_none() {
        match Topology::build(basin, config.std_scale) {
            Ok(topo) => basin.topology = Some(topo),
            Err(err) => {
                eprintln!("hydro_routing: fatal: {err}");
                std::process::exit(1);
            }
        }
    }

    let topo = basin
        .topology
        .as_ref()
        .expect("topology initialized above");

    if basin.is_empty() {
        return;
    }

    let mut state = State::snapshot(topo, basin);

    let mut t = extstep_seconds;
    while t > EPSILON {
        let substep = sub_routing(topo, &mut state, t);
        can_routing(substep, &mut state);
        sfc_routing(topo, &mut state, substep);
        stream_routing(topo, &mut state, substep);
        sub_vertical(topo, &mut state);
        t -= substep;
    }

    state.write_back(basin);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basin::{PatchSpec, PatchState, SoilProfile, SubsurfaceNeighbor};
    use approx::assert_relative_eq;

    fn soil() -> SoilProfile {
        SoilProfile {
            n_soil_intervals: 10,
            interval_size: 0.1,
            soil_depth: 2.0,
            ksat_vertical: 1e-5,
            ksat_0_v: 1e-5,
            mz_v: 0.5,
            porosity_0: 0.4,
            porosity_decay: 0.5,
            psi_air_entry: 0.3,
            field_capacity: 0.3,
            detention_store_size: 0.01,
            transmissivity_profile: vec![1.0; 11],
        }
    }

    fn patch(x: f64, z: f64) -> PatchSpec {
        PatchSpec {
            x,
            y: 0.0,
            area: 100.0,
            std: 0.0,
            slope_max: 0.1,
            mann_n: 0.1,
            z,
            soil: soil(),
            state: PatchState {
                detention_store: 0.02,
                sat_deficit: 0.1,
                sat_deficit_z: 0.5,
                rootzone_s: 0.3,
                ..Default::default()
            },
            surface_neighbors: Vec::new(),
            subsurface_neighbors: Vec::new(),
        }
    }

    #[test]
    fn zero_step_is_a_no_op() {
        let mut a = patch(0.0, 10.0);
        a.subsurface_neighbors.push(SubsurfaceNeighbor { dst: 1 });
        let b = patch(1.0, 0.0);
        let mut basin = Basin::new(vec![a, b]);
        let before = basin.clone();

        let config = RoutingConfig::default();
        hydro_routing(&config, 0.0, &mut basin);

        assert_relative_eq!(
            before.patches[0].state.detention_store,
            basin.patches[0].state.detention_store,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            before.patches[0].state.sat_deficit,
            basin.patches[0].state.sat_deficit,
            epsilon = 1e-12
        );
    }

    #[test]
    fn basin_caches_topology_across_calls() {
        let a = patch(0.0, 10.0);
        let mut basin = Basin::new(vec![a]);
        let config = RoutingConfig::default();

        hydro_routing(&config, 60.0, &mut basin);
        assert!(basin.topology.is_some());
        hydro_routing(&config, 60.0, &mut basin);
        assert!(basin.topology.is_some());
    }

    #[test]
    fn two_patch_run_keeps_state_non_negative() {
        let mut a = patch(0.0, 10.0);
        a.subsurface_neighbors.push(SubsurfaceNeighbor { dst: 1 });
        a.state.detention_store = 0.05;
        let b = patch(1.0, 0.0);
        let mut basin = Basin::new(vec![a, b]);
        let config = RoutingConfig::default();

        hydro_routing(&config, 3600.0, &mut basin);

        for p in &basin.patches {
            assert!(p.state.detention_store >= 0.0);
            assert!(p.state.sat_deficit.is_finite());
        }
    }
}
