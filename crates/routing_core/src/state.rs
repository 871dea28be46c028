//! Flat working-array state snapshotted from a [`Basin`] at the start of a
//! driver call and written back once the outer loop is exhausted.
//! Phase R2, Task R2.2.
use crate::basin::Basin;
use crate::topology::Topology;

/// One SoA snapshot of mutable hydrologic state, plus the per-sub-step
/// scratch arrays threaded between components. Every array has length
/// `n`, one slot per patch, in the same order as [`Topology`].
#[derive(Debug, Clone)]
pub struct State {
    pub n: usize,

    // Surface pool.
    pub sfc_h2o: Vec<f64>,
    pub sfc_no3: Vec<f64>,
    pub sfc_nh4: Vec<f64>,
    pub sfc_don: Vec<f64>,
    pub sfc_doc: Vec<f64>,

    // Column totals.
    pub tot_h2o: Vec<f64>,
    pub tot_no3: Vec<f64>,
    pub tot_nh4: Vec<f64>,
    pub tot_don: Vec<f64>,
    pub tot_doc: Vec<f64>,

    // Water table.
    pub waterz: Vec<f64>,
    pub sat_deficit: Vec<f64>,
    pub sat_deficit_z: Vec<f64>,
    pub rootzone_s: Vec<f64>,

    // Canopy rates, filled by `can_routing`, consumed by `sfc_routing`.
    pub can_h2o: Vec<f64>,
    pub can_no3: Vec<f64>,
    pub can_nh4: Vec<f64>,
    pub can_don: Vec<f64>,
    pub can_doc: Vec<f64>,

    // Subsurface lateral deltas, filled by `sub_routing`, consumed by
    // `sub_vertical`.
    pub lat_h2o: Vec<f64>,
    pub lat_no3: Vec<f64>,
    pub lat_nh4: Vec<f64>,
    pub lat_don: Vec<f64>,
    pub lat_doc: Vec<f64>,

    // Infiltration, filled by `sfc_routing`, consumed by `sub_vertical`.
    pub inf_h2o: Vec<f64>,
    pub inf_no3: Vec<f64>,
    pub inf_nh4: Vec<f64>,
    pub inf_don: Vec<f64>,
    pub inf_doc: Vec<f64>,
}

impl State {
    /// Snapshot a basin's current hydrologic state into flat working
    /// arrays, matching the driver's step 1.
    pub fn snapshot(topo: &Topology, basin: &Basin) -> State {
        let n = topo.n;
        let mut s = State {
            n,
            sfc_h2o: Vec::with_capacity(n),
            sfc_no3: Vec::with_capacity(n),
            sfc_nh4: Vec::with_capacity(n),
            sfc_don: Vec::with_capacity(n),
            sfc_doc: Vec::with_capacity(n),
            tot_h2o: Vec::with_capacity(n),
            tot_no3: Vec::with_capacity(n),
            tot_nh4: Vec::with_capacity(n),
            tot_don: Vec::with_capacity(n),
            tot_doc: Vec::with_capacity(n),
            waterz: Vec::with_capacity(n),
            sat_deficit: Vec::with_capacity(n),
            sat_deficit_z: Vec::with_capacity(n),
            rootzone_s: Vec::with_capacity(n),
            can_h2o: vec![0.0; n],
            can_no3: vec![0.0; n],
            can_nh4: vec![0.0; n],
            can_don: vec![0.0; n],
            can_doc: vec![0.0; n],
            lat_h2o: vec![0.0; n],
            lat_no3: vec![0.0; n],
            lat_nh4: vec![0.0; n],
            lat_don: vec![0.0; n],
            lat_doc: vec![0.0; n],
            inf_h2o: vec![0.0; n],
            inf_no3: vec![0.0; n],
            inf_nh4: vec![0.0; n],
            inf_don: vec![0.0; n],
            inf_doc: vec![0.0; n],
        };

        for p in &basin.patches {
            s.sfc_h2o.push(p.state.detention_store);
            s.sfc_no3.push(p.state.surface_no3);
            s.sfc_nh4.push(p.state.surface_nh4);
            s.sfc_don.push(p.state.surface_don);
            s.sfc_doc.push(p.state.surface_doc);

            s.tot_no3.push(p.state.soil_ns_nitrate);
            s.tot_nh4.push(p.state.soil_ns_sminn);
            s.tot_don.push(p.state.soil_ns_don);
            s.tot_doc.push(p.state.soil_cs_doc);
            s.tot_h2o.push(p.soil.field_capacity - p.state.sat_deficit);

            let sat_deficit_z = p.state.sat_deficit_z.max(0.0);
            s.waterz.push(p.z - sat_deficit_z);
            s.sat_deficit.push(p.state.sat_deficit);
            s.sat_deficit_z.push(sat_deficit_z);
            s.rootzone_s.push(p.state.rootzone_s);
        }

        s
    }

    /// Write mutated state back onto `basin`'s patches, matching the
    /// driver's final step.
    pub fn write_back(&self, basin: &mut Basin) {
        for (i, p) in basin.patches.iter_mut().enumerate() {
            p.state.detention_store = self.sfc_h2o[i];
            p.state.surface_no3 = self.sfc_no3[i];
            p.state.surface_nh4 = self.sfc_nh4[i];
            p.state.surface_don = self.sfc_don[i];
            p.state.surface_doc = self.sfc_doc[i];

            p.state.soil_ns_nitrate = self.tot_no3[i];
            p.state.soil_ns_sminn = self.tot_nh4[i];
            p.state.soil_ns_don = self.tot_don[i];
            p.state.soil_cs_doc = self.tot_doc[i];

            p.state.sat_deficit = p.soil.field_capacity - self.tot_h2o[i];
            p.state.sat_deficit_z = p.z - self.waterz[i];
            p.state.rootzone_s = self.rootzone_s[i];
        }
    }
}
