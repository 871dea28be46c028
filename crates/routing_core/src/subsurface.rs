//! Subsurface lateral router.
//! Phase R3, Task R3.1.
//!
//! Computes per-edge saturated-zone outflow, derives the Courant-stable
//! coupling sub-step, and produces per-patch lateral deltas for water and
//! every transported species via the destination-owned inflow table.
use crate::constants::{CPL_MAX, COUMAX, ZERO};
use crate::par;
use crate::state::State;
use crate::topology::Topology;

/// Nine-point Gauss-Hermite quadrature nodes, rescaled for the standard
/// normal measure (`node = sqrt(2) * hermite_node`).
const NODES: [f64; 9] = [
    -4.512745, -3.205531, -2.076847, -1.023048, 0.0, 1.023048, 2.076847, 3.205531, 4.512745,
];

/// Matching quadrature weights, rescaled so they sum to 1
/// (`weight = hermite_weight / sqrt(pi)`).
const WEIGHTS: [f64; 9] = [
    0.00002234, 0.002789, 0.049916, 0.244097, 0.406349, 0.244097, 0.049916, 0.002789, 0.00002234,
];

/// Sample the transmissivity profile at patch `i`'s current sat deficit via
/// the quadrature nodes, or at the deterministic index when `pscale == 0`.
fn transmissivity_at(topo: &Topology, state: &State, i: usize) -> f64 {
    let dzsoil = topo.dzsoil[i];
    let nsoil = topo.nsoil[i];
    let profile = &topo.transmissivity_profile[i];
    let lookup = |deficit: f64| -> f64 {
        let idx = (deficit / dzsoil).round();
        let idx = idx.clamp(0.0, nsoil as f64) as usize;
        profile[idx.min(profile.len() - 1)]
    };

    if topo.pscale[i] <= ZERO {
        return lookup(state.sat_deficit[i]);
    }

    let mut acc = 0.0;
    for m in 0..9 {
        let deficit = state.sat_deficit[i] + NODES[m] * topo.pscale[i];
        acc += WEIGHTS[m] * lookup(deficit);
    }
    acc
}

struct SourceRates {
    /// Per-edge outflow rate `dH2O/dt(i -> k)`, parallel to `topo.sub_out[i]`.
    edge_rate: Vec<f64>,
    /// Per-edge normalized slope share `gamma(i,k)`, parallel to `edge_rate`.
    edge_gamma: Vec<f64>,
    wsum: f64,
    vel_max: f64,
}

fn compute_source(i: usize, topo: &Topology, state: &State) -> SourceRates {
    let edges = &topo.sub_out[i];
    let t_i = transmissivity_at(topo, state, i);

    let mut slopes = Vec::with_capacity(edges.len());
    let mut edge_rate = Vec::with_capacity(edges.len());
    let mut wsum = 0.0;
    let mut gsum = 0.0;
    let mut vel_max = 0.0;

    for e in edges {
        let slope = (topo.z[i] - topo.z[e.dst]) / e.subdist;
        if slope <= 0.0 {
            slopes.push(0.0);
            edge_rate.push(0.0);
            continue;
        }
        let vel = slope * t_i / topo.psize[i];
        let rate = e.perimf * 0.5 * (topo.z[i] + topo.z[e.dst]) * vel;
        slopes.push(slope);
        edge_rate.push(rate);
        wsum += rate;
        gsum += slope;
        vel_max = f64::max(vel_max, vel);
    }

    let edge_gamma = if gsum > ZERO {
        slopes.iter().map(|s| s / gsum).collect()
    } else {
        vec![0.0; edges.len()]
    };

    SourceRates {
        edge_rate,
        edge_gamma,
        wsum,
        vel_max,
    }
}

/// Advance subsurface lateral flow by at most `tstep` seconds, returning the
/// Courant-stable sub-step actually used and leaving `state.lat_*` populated
/// with per-patch deltas for the caller to merge in `sub_vertical`.
pub fn sub_routing(topo: &Topology, state: &mut State, tstep: f64) -> f64 {
    let tstep_bound = tstep.min(CPL_MAX);
    let n = topo.n;

    let sources: Vec<SourceRates> = par::map_range(n, |i| compute_source(i, topo, state));

    let vel_maxes: Vec<f64> = sources.iter().map(|s| s.vel_max).collect();
    let cmax = par::reduce_max(COUMAX / tstep_bound.max(ZERO), &vel_maxes);

    let dt = if cmax > ZERO {
        (COUMAX / cmax).min(tstep_bound)
    } else {
        tstep_bound
    };

    // Per-patch leaving fraction and per-edge rtefac, still source-owned.
    let outfac: Vec<f64> = par::map_range(n, |i| {
        if state.tot_h2o[i] > ZERO {
            dt * sources[i].wsum / state.tot_h2o[i]
        } else {
            0.0
        }
    });
    let edge_rtefac: Vec<Vec<f64>> = par::map_range(n, |i| {
        if state.tot_h2o[i] <= ZERO {
            return vec![0.0; sources[i].edge_rate.len()];
        }
        sources[i]
            .edge_gamma
            .iter()
            .zip(sources[i].edge_rate.iter())
            .map(|(g, r)| (dt / state.tot_h2o[i]) * g * r)
            .collect()
    });

    // Destination-owned update via the inflow tables: each index `k` is
    // written by exactly one worker.
    let new_lat_h2o: Vec<f64> = par::map_range(n, |k| {
        let mut acc = -sources[k].wsum * dt;
        for entry in &topo.sub_in[k] {
            acc += sources[entry.src].edge_rate[entry.local_edge] * dt;
        }
        acc
    });

    macro_rules! lateral_species {
        ($tot:ident) => {
            par::map_range(n, |k| {
                let mut acc = -outfac[k] * state.$tot[k];
                for entry in &topo.sub_in[k] {
                    acc += edge_rtefac[entry.src][entry.local_edge] * state.$tot[entry.src];
                }
                acc
            })
        };
    }

    state.lat_h2o = new_lat_h2o;
    state.lat_no3 = lateral_species!(tot_no3);
    state.lat_nh4 = lateral_species!(tot_nh4);
    state.lat_don = lateral_species!(tot_don);
    state.lat_doc = lateral_species!(tot_doc);

    dt
}
