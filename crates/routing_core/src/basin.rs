//! Patch and basin data model.
//! Phase R1, foundational.
//!
//! `PatchSpec` is the heterogeneous, per-patch input record an external
//! loader (data ingest, out of scope for this crate) hands to
//! [`crate::topology::Topology::build`]. Once topology is built, every
//! routing component works off the dense columnar arrays in
//! [`crate::topology::Topology`] and the per-step working state instead.
use serde::{Deserialize, Serialize};

/// One vertical soil column's transmissivity lookup, indexed by a
/// discretized sat-deficit bucket. Sampled by the subsurface lateral router.
pub type TransmissivityProfile = Vec<f64>;

/// A surface (kinematic-wave) downhill neighbor: destination patch index
/// within the owning `Basin`, plus the raw (un-normalized) exchange weight
/// `gamma(S, R)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SurfaceNeighbor {
    pub dst: usize,
    pub gamma: f64,
}

/// A subsurface downhill neighbor: just the destination patch index. The
/// axis-aligned-vs-diagonal classification that drives the `perimf` formula
/// is derived by the topology builder from patch positions, not stored here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubsurfaceNeighbor {
    pub dst: usize,
}

/// Soil-profile defaults, constant for the life of a run. These are copied
/// verbatim into `Topology` at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoilProfile {
    pub n_soil_intervals: usize,
    pub interval_size: f64,
    pub soil_depth: f64,
    pub ksat_vertical: f64,
    pub ksat_0_v: f64,
    pub mz_v: f64,
    pub porosity_0: f64,
    pub porosity_decay: f64,
    pub psi_air_entry: f64,
    pub field_capacity: f64,
    pub detention_store_size: f64,
    pub transmissivity_profile: TransmissivityProfile,
}

/// Hydrologic state carried on a patch between driver invocations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PatchState {
    pub detention_store: f64,
    pub surface_no3: f64,
    pub surface_nh4: f64,
    pub surface_don: f64,
    pub surface_doc: f64,
    pub sat_deficit: f64,
    pub sat_deficit_z: f64,
    pub rootzone_s: f64,
    pub soil_ns_nitrate: f64,
    pub soil_ns_sminn: f64,
    pub soil_ns_don: f64,
    pub soil_cs_doc: f64,
}

/// The unit cell of the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSpec {
    pub x: f64,
    pub y: f64,
    pub area: f64,
    pub std: f64,
    pub slope_max: f64,
    pub mann_n: f64,
    pub z: f64,
    pub soil: SoilProfile,
    pub state: PatchState,
    pub surface_neighbors: Vec<SurfaceNeighbor>,
    pub subsurface_neighbors: Vec<SubsurfaceNeighbor>,
}

impl PatchSpec {
    pub fn psize(&self) -> f64 {
        self.area.sqrt()
    }
}

/// A collection of patches with their drainage lists. Routing order is
/// irrelevant — the inflow-matrix formulation is order-independent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Basin {
    pub patches: Vec<PatchSpec>,
    #[serde(skip)]
    pub(crate) topology: Option<crate::topology::Topology>,
}

impl Basin {
    pub fn new(patches: Vec<PatchSpec>) -> Self {
        Self {
            patches,
            topology: None,
        }
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}
