//! Compile-time constants shared across every routing component.
//! Phase R1, foundational.

/// Static bound on per-patch fan-in/fan-out. Must stay a multiple of 4 for
/// alignment; raising it is a recompile-time decision, not a runtime one.
pub const MAX_NEIGHBORS: usize = 16;

/// Upper bound on the subsurface-driven coupling sub-step, in seconds.
pub const CPL_MAX: f64 = 1800.0;

/// Maximum Courant number permitted for any emitted sub-step.
pub const COUMAX: f64 = 0.2;

/// Outer-loop round-off tolerance, in seconds.
pub const EPSILON: f64 = 1e-5;

pub const TWO_THIRDS: f64 = 2.0 / 3.0;

pub const DEG2RAD: f64 = std::f64::consts::PI / 180.0;

/// Guard threshold below which a denominator is treated as zero.
pub const ZERO: f64 = 1e-12;

const _: () = assert!(MAX_NEIGHBORS % 4 == 0, "MAX_NEIGHBORS must be a multiple of 4");
