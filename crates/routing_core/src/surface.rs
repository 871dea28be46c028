//! Surface router.
//! Phase R3, Task R3.4.
//!
//! Kinematic-wave overland flow on the inflow-matrix graph, with its own
//! inner adaptive timestep, coupled to a Green-Ampt sorptivity infiltration
//! model that moves water (and proportional species) from the surface pool
//! into the column.
use crate::constants::{COUMAX, EPSILON, ZERO};
use crate::par;
use crate::state::State;
use crate::topology::Topology;

struct OutflowRates {
    h2o: Vec<f64>,
    no3: Vec<f64>,
    nh4: Vec<f64>,
    don: Vec<f64>,
    doc: Vec<f64>,
    vel: Vec<f64>,
}

#[derive(Clone, Copy, Default)]
struct PatchOutflow {
    h2o: f64,
    no3: f64,
    nh4: f64,
    don: f64,
    doc: f64,
    vel: f64,
}

fn compute_patch_outflow(i: usize, topo: &Topology, state: &State) -> PatchOutflow {
    let hh = state.sfc_h2o[i] - topo.retdep[i];
    if hh <= 0.0 {
        return PatchOutflow::default();
    }
    let v = topo.sfcknl[i] * hh.powf(crate::constants::TWO_THIRDS);
    let mut out = PatchOutflow {
        vel: v,
        h2o: v * hh,
        ..PatchOutflow::default()
    };

    if state.sfc_h2o[i] <= ZERO {
        return out;
    }
    let frac = v * (hh / state.sfc_h2o[i]);
    out.no3 = frac * state.sfc_no3[i];
    out.nh4 = frac * state.sfc_nh4[i];
    out.don = frac * state.sfc_don[i];
    out.doc = frac * state.sfc_doc[i];
    out
}

fn compute_outflow(topo: &Topology, state: &State) -> OutflowRates {
    let n = topo.n;
    let per_patch: Vec<PatchOutflow> = par::map_range(n, |i| compute_patch_outflow(i, topo, state));

    let mut h2o = Vec::with_capacity(n);
    let mut no3 = Vec::with_capacity(n);
    let mut nh4 = Vec::with_capacity(n);
    let mut don = Vec::with_capacity(n);
    let mut doc = Vec::with_capacity(n);
    let mut vel = Vec::with_capacity(n);
    for p in &per_patch {
        h2o.push(p.h2o);
        no3.push(p.no3);
        nh4.push(p.nh4);
        don.push(p.don);
        doc.push(p.doc);
        vel.push(p.vel);
    }

    OutflowRates {
        h2o,
        no3,
        nh4,
        don,
        doc,
        vel,
    }
}

/// Apply Green-Ampt sorptivity infiltration for the just-completed inner
/// step `dt`, moving water and proportional species from `state.sfc_*` into
/// `state.inf_*` for `sub_vertical` to merge into the column.
fn infiltrate(topo: &Topology, state: &mut State, dt: f64) {
    for i in 0..topo.n {
        if state.rootzone_s[i] >= 1.0 || topo.ksat_0[i] <= ZERO {
            continue;
        }
        if state.sfc_h2o[i] <= ZERO {
            continue;
        }
        let z = state.sat_deficit_z[i];
        if z <= ZERO {
            continue;
        }

        let ksat = if topo.mz_v[i] > 0.0 {
            topo.mz_v[i] * topo.ksat_0[i] * (1.0 - (-z / topo.mz_v[i]).exp()) / z
        } else {
            topo.ksat_0[i]
        };
        let poro = if topo.por_d[i] < 999.9 {
            topo.por_d[i] * topo.por_0[i] * (1.0 - (-z / topo.por_d[i]).exp()) / z
        } else {
            topo.por_0[i]
        };

        let theta = state.rootzone_s[i] * poro;
        let psi_f = 0.76 * topo.psi_air[i];
        let sp = (2.0 * ksat * psi_f).max(0.0).sqrt();

        let intensity = state.sfc_h2o[i] / dt;
        let tp = if intensity > ksat {
            ksat * psi_f * (poro - theta) / (intensity * (intensity - ksat))
        } else {
            dt
        };

        let delta = if dt <= tp {
            topo.ksat_v[i] * state.sfc_h2o[i]
        } else {
            let candidate = sp * (dt - tp).max(0.0).sqrt() + ksat.powf(1.5) / 3.0 + tp * state.sfc_h2o[i];
            topo.ksat_v[i] * candidate.min(state.sfc_h2o[i])
        };

        if delta <= 0.0 {
            continue;
        }
        let afac = delta / state.sfc_h2o[i];

        state.sfc_h2o[i] -= delta;
        state.inf_h2o[i] += delta;

        let d_no3 = afac * state.sfc_no3[i];
        let d_nh4 = afac * state.sfc_nh4[i];
        let d_don = afac * state.sfc_don[i];
        let d_doc = afac * state.sfc_doc[i];
        state.sfc_no3[i] -= d_no3;
        state.sfc_nh4[i] -= d_nh4;
        state.sfc_don[i] -= d_don;
        state.sfc_doc[i] -= d_doc;
        state.inf_no3[i] += d_no3;
        state.inf_nh4[i] += d_nh4;
        state.inf_don[i] += d_don;
        state.inf_doc[i] += d_doc;
    }
}

/// Run overland flow to completion over `substep` seconds, using its own
/// inner adaptive timestep bounded by the same Courant number. Mutates
/// `state.sfc_*` in place and accumulates infiltration into `state.inf_*`.
pub fn sfc_routing(topo: &Topology, state: &mut State, substep: f64) {
    if substep <= EPSILON {
        return;
    }

    state.inf_h2o.iter_mut().for_each(|v| *v = 0.0);
    state.inf_no3.iter_mut().for_each(|v| *v = 0.0);
    state.inf_nh4.iter_mut().for_each(|v| *v = 0.0);
    state.inf_don.iter_mut().for_each(|v| *v = 0.0);
    state.inf_doc.iter_mut().for_each(|v| *v = 0.0);

    let n = topo.n;
    let mut t = 0.0;
    let mut cmax = COUMAX / substep;

    while t < substep - EPSILON {
        let rates = compute_outflow(topo, state);
        cmax = par::reduce_max(cmax, &rates.vel);
        let dt = if cmax > ZERO {
            (COUMAX / cmax).min(substep - t)
        } else {
            substep - t
        };

        macro_rules! inflow_matrix_update {
            ($sfc:ident, $rate:ident, $can:ident) => {
                par::map_range(n, |i| {
                    let mut inflow = 0.0;
                    for entry in &topo.sfc_in[i] {
                        inflow += entry.gam_in * rates.$rate[entry.src];
                    }
                    state.$sfc[i] + dt * (-rates.$rate[i] + inflow + state.$can[i])
                })
            };
        }

        let new_h2o = inflow_matrix_update!(sfc_h2o, h2o, can_h2o);
        let new_no3 = inflow_matrix_update!(sfc_no3, no3, can_no3);
        let new_nh4 = inflow_matrix_update!(sfc_nh4, nh4, can_nh4);
        let new_don = inflow_matrix_update!(sfc_don, don, can_don);
        let new_doc = inflow_matrix_update!(sfc_doc, doc, can_doc);

        state.sfc_h2o = new_h2o;
        state.sfc_no3 = new_no3;
        state.sfc_nh4 = new_nh4;
        state.sfc_don = new_don;
        state.sfc_doc = new_doc;

        infiltrate(topo, state, dt);

        t += dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basin::{Basin, PatchSpec, PatchState, SoilProfile, SurfaceNeighbor};
    use approx::assert_relative_eq;

    fn soil(ksat_0: f64) -> SoilProfile {
        SoilProfile {
            n_soil_intervals: 10,
            interval_size: 0.1,
            soil_depth: 1.0,
            ksat_vertical: ksat_0,
            ksat_0_v: ksat_0,
            mz_v: 0.5,
            porosity_0: 0.4,
            porosity_decay: 0.5,
            psi_air_entry: 0.3,
            field_capacity: 0.3,
            detention_store_size: 0.0,
            transmissivity_profile: vec![1.0; 11],
        }
    }

    fn patch(x: f64, z: f64, sfc_h2o: f64, retdep: f64, ksat_0: f64) -> PatchSpec {
        let mut s = soil(ksat_0);
        s.detention_store_size = retdep;
        PatchSpec {
            x,
            y: 0.0,
            area: 100.0,
            std: 0.0,
            slope_max: 0.2,
            mann_n: 0.1,
            z,
            soil: s,
            state: PatchState {
                detention_store: sfc_h2o,
                sat_deficit_z: 0.5,
                rootzone_s: 0.3,
                ..Default::default()
            },
            surface_neighbors: Vec::new(),
            subsurface_neighbors: Vec::new(),
        }
    }

    #[test]
    fn s3_open_chain_conserves_mass_downhill() {
        let mut a = patch(0.0, 2.0, 0.05, 0.0, 0.0);
        a.surface_neighbors.push(SurfaceNeighbor { dst: 1, gamma: 1.0 });
        let mut b = patch(1.0, 1.0, 0.0, 0.0, 0.0);
        b.surface_neighbors.push(SurfaceNeighbor { dst: 2, gamma: 1.0 });
        let c = patch(2.0, 0.0, 0.0, 0.0, 0.0);
        let basin = Basin::new(vec![a, b, c]);
        let topo = crate::topology::Topology::build(&basin, 1.0).unwrap();
        let mut state = State::snapshot(&topo, &basin);

        let total_before: f64 = state.sfc_h2o.iter().sum();
        sfc_routing(&topo, &mut state, 3600.0);
        let total_after: f64 = state.sfc_h2o.iter().sum();

        assert_relative_eq!(total_before, total_after, epsilon = 1e-9);
        assert!(state.sfc_h2o[2] > 0.0, "water should have migrated to patch C");
    }

    #[test]
    fn s4_ponding_triggers_infiltration() {
        let patch = patch(0.0, 0.0, 0.02, 0.0, 1e-5);
        let basin = Basin::new(vec![patch]);
        let topo = crate::topology::Topology::build(&basin, 1.0).unwrap();
        let mut state = State::snapshot(&topo, &basin);
        let before = state.sfc_h2o[0];

        sfc_routing(&topo, &mut state, 600.0);

        assert!(state.inf_h2o[0] > 0.0);
        assert!(state.sfc_h2o[0] < before);
    }

    #[test]
    fn surface_quiescence_below_retdep() {
        let a = patch(0.0, 5.0, 0.005, 0.01, 0.0);
        let basin = Basin::new(vec![a]);
        let topo = crate::topology::Topology::build(&basin, 1.0).unwrap();
        let mut state = State::snapshot(&topo, &basin);
        let before = state.sfc_h2o[0];

        sfc_routing(&topo, &mut state, 3600.0);

        assert_relative_eq!(state.sfc_h2o[0], before, epsilon = 1e-12);
    }
}
