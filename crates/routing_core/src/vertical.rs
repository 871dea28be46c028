//! Vertical balancer.
//! Phase R3, Task R3.5.
//!
//! Merges the sub-step's infiltration and lateral inflow into each patch's
//! column, spills any excess above field capacity back to the surface
//! store, and recomputes water-table elevation.
use crate::constants::ZERO;
use crate::par;
use crate::state::State;
use crate::topology::Topology;

/// Invert the exponential porosity profile `deficit(z) = por_d * por_0 *
/// (1 - e^(-z/por_d))` to recover the depth `z` holding a given water
/// deficit, clamped to `[0, soil_depth]`. Falls back to the linear
/// `deficit = por_0 * z` profile when `por_d` effectively disables decay
/// (`por_d >= 999.9`).
pub fn compute_z_final(por_0: f64, por_d: f64, soil_depth: f64, deficit: f64) -> f64 {
    if deficit <= 0.0 {
        return 0.0;
    }
    let z = if por_d < 999.9 {
        let denom = por_d * por_0;
        if denom <= ZERO {
            soil_depth
        } else {
            let ratio = 1.0 - deficit / denom;
            if ratio <= ZERO {
                soil_depth
            } else {
                -por_d * ratio.ln()
            }
        }
    } else if por_0 > ZERO {
        deficit / por_0
    } else {
        soil_depth
    };
    z.clamp(0.0, soil_depth)
}

/// Merge infiltration and lateral deltas into the column, spill excess
/// above field capacity, and recompute water-table elevation.
pub fn sub_vertical(topo: &Topology, state: &mut State) {
    let n = topo.n;

    macro_rules! merge {
        ($tot:ident, $inf:ident, $lat:ident) => {
            for i in 0..n {
                state.$tot[i] += state.$inf[i] + state.$lat[i];
            }
        };
    }
    merge!(tot_h2o, inf_h2o, lat_h2o);
    merge!(tot_no3, inf_no3, lat_no3);
    merge!(tot_nh4, inf_nh4, lat_nh4);
    merge!(tot_don, inf_don, lat_don);
    merge!(tot_doc, inf_doc, lat_doc);

    // Read-only pass: decide each patch's spill fraction (0.0 = no overflow)
    // and water-table elevation. Kept `Fn`-compatible (no write-through) so
    // it can run under `par::map_range`; the actual `state.sfc_*`/`tot_*`
    // writes happen afterward in a plain sequential loop, mirroring the
    // read-then-write split already used in `surface.rs`'s inflow-matrix
    // update.
    struct Spill {
        waterz: f64,
        fac: f64,
    }

    let spill: Vec<Spill> = par::map_range(n, |i| {
        let cap = topo.field_capacity[i];
        if state.tot_h2o[i] > cap {
            let fac = (state.tot_h2o[i] - cap) / state.tot_h2o[i];
            Spill {
                waterz: topo.z[i],
                fac,
            }
        } else {
            let deficit = cap - state.tot_h2o[i];
            let depth = compute_z_final(topo.por_0[i], topo.por_d[i], topo.soil_depth[i], deficit);
            Spill {
                waterz: topo.z[i] - depth,
                fac: 0.0,
            }
        }
    });

    for i in 0..n {
        let fac = spill[i].fac;
        if fac > 0.0 {
            state.sfc_h2o[i] += fac * state.tot_h2o[i];
            state.sfc_no3[i] += fac * state.tot_no3[i];
            state.sfc_nh4[i] += fac * state.tot_nh4[i];
            state.sfc_don[i] += fac * state.tot_don[i];
            state.sfc_doc[i] += fac * state.tot_doc[i];
            state.tot_no3[i] -= fac * state.tot_no3[i];
            state.tot_nh4[i] -= fac * state.tot_nh4[i];
            state.tot_don[i] -= fac * state.tot_don[i];
            state.tot_doc[i] -= fac * state.tot_doc[i];
            state.tot_h2o[i] = topo.field_capacity[i];
        }
    }

    state.waterz = spill.into_iter().map(|s| s.waterz).collect();
}
