//! Thin shims over `rayon`'s parallel iterators, gated by the `threading`
//! feature. Every routing component goes through these instead of calling
//! `rayon::prelude::*` directly, so the serial fallback built without the
//! feature takes the identical code path.
//! Phase R2, foundational.

#[cfg(feature = "threading")]
pub(crate) fn map_range<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    use rayon::prelude::*;
    (0..n).into_par_iter().map(f).collect()
}

#[cfg(not(feature = "threading"))]
pub(crate) fn map_range<T, F>(n: usize, f: F) -> Vec<T>
where
    F: Fn(usize) -> T,
{
    (0..n).map(f).collect()
}

/// `cmax`-style reduction: fold with `f64::max`, starting from `init`.
#[cfg(feature = "threading")]
pub(crate) fn reduce_max(init: f64, values: &[f64]) -> f64 {
    use rayon::prelude::*;
    values.par_iter().copied().reduce(|| init, f64::max)
}

#[cfg(not(feature = "threading"))]
pub(crate) fn reduce_max(init: f64, values: &[f64]) -> f64 {
    values.iter().copied().fold(init, f64::max)
}

/// `basin_area`-style reduction: fold with `+`.
#[cfg(feature = "threading")]
pub(crate) fn reduce_sum(values: &[f64]) -> f64 {
    use rayon::prelude::*;
    values.par_iter().copied().sum()
}

#[cfg(not(feature = "threading"))]
pub(crate) fn reduce_sum(values: &[f64]) -> f64 {
    values.iter().copied().sum()
}

#[cfg(feature = "threading")]
pub(crate) fn for_each_range<F>(n: usize, f: F)
where
    F: Fn(usize) + Sync,
{
    use rayon::prelude::*;
    (0..n).into_par_iter().for_each(f);
}

#[cfg(not(feature = "threading"))]
pub(crate) fn for_each_range<F>(n: usize, f: F)
where
    F: Fn(usize),
{
    (0..n).for_each(f);
}
