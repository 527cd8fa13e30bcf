//! Small numerical helpers shared across the crate.

use itertools::Itertools;
use ndarray::{ self as nd, s };
use num_complex::Complex64 as C64;
use num_traits::Zero;

/// Generate `n` uniformly spaced samples over `[0, stop]`, also returning the
/// step size.
pub fn linspace_step(stop: f64, n: usize) -> (nd::Array1<f64>, f64) {
    let t: nd::Array1<f64> = nd::Array1::linspace(0.0, stop, n);
    let dt: f64 = if n > 1 { t[1] - t[0] } else { stop };
    (t, dt)
}

/// Differences between successive elements.
pub fn array_diff<A>(a: &nd::Array1<A>) -> nd::Array1<A>
where A: Copy + std::ops::Sub<A, Output = A>
{
    a.iter().tuple_windows().map(|(ak, akp1)| *akp1 - *ak).collect()
}

/// Apply the trapezoidal rule to a complex-valued function sampled at even
/// intervals `dx`.
///
/// *Panics* if `y` has fewer than two elements.
pub fn trapz<S>(y: &nd::ArrayBase<S, nd::Ix1>, dx: f64) -> C64
where S: nd::Data<Elem = C64>
{
    let n: usize = y.len();
    y[0] * (dx / 2.0)
        + y.slice(s![1..n - 1]).sum() * dx
        + y[n - 1] * (dx / 2.0)
}

/// Compute the "progressive" trapezoidal integral of a complex-valued
/// function sampled at even intervals `dx`.
///
/// The progressive integral is defined as
/// ```text
/// I(x) = \int_a^x y(x') dx'
/// ```
/// giving one value per input sample, with `I(a) = 0`.
pub fn trapz_prog<S>(y: &nd::ArrayBase<S, nd::Ix1>, dx: f64) -> nd::Array1<C64>
where S: nd::Data<Elem = C64>
{
    let mut acc: C64 = C64::zero();
    [C64::zero()].into_iter()
        .chain(
            y.iter().tuple_windows()
            .map(|(yk, ykp1)| {
                acc += (*yk + *ykp1) * (dx / 2.0);
                acc
            })
        )
        .collect()
}
