//! Instantaneous biorthogonal eigensystems of 2x2 non-Hermitian matrices and
//! continuity repair of eigenbranches along a time sweep.
//!
//! General (non-Hermitian) eigensolvers make no promise that the branch
//! labeled 0 at one time sample is the same physical branch at the next:
//! order, sign, and phase are all arbitrary per call. [`EigenSystem`] sweeps
//! the decomposition over a full time grid and re-threads the two branches
//! into trajectories that are continuous in both eigenvalue and eigenvector
//! phase, which is what makes the biorthogonal projection of a propagated
//! state meaningful.

use itertools::Itertools;
use ndarray::{ self as nd, s };
use ndarray_linalg::Eig;
use num_complex::Complex64 as C64;
use crate::{ error::EPResult, utils };

/// Jump threshold on eigenvalue branch 0: a difference between consecutive
/// samples larger than this is taken as a solver-side branch swap.
pub const CONTINUITY_EPSILON: f64 = 1e-1;

/// Eigendecomposition of a 2x2 complex matrix, returning eigenvalues together
/// with matching left and right eigenvectors as `(evals, evecs_l, evecs_r)`.
///
/// Columns of the returned matrices are eigenvectors; column `i` of the left
/// set pairs with column `i` of the right set, normalized biorthogonally so
/// that `l_i . r_j = delta_ij` under the plain (unconjugated) dot product.
/// Branch order is whatever the underlying solver produces and carries no
/// physical meaning across nearby input matrices.
///
/// For a 2x2 matrix the left eigenvector of one branch is, up to scale, the
/// bilinear-orthogonal complement of the other branch's right eigenvector, so
/// the left set is constructed from that relation rather than a second solver
/// call. The normalization factor `l_i . r_i` tends to zero as the matrix
/// approaches an exceptional point, where the two right eigenvectors
/// coalesce; left vectors and everything downstream of them are
/// ill-conditioned there.
pub fn eig_biortho(H: &nd::Array2<C64>)
    -> EPResult<(nd::Array1<C64>, nd::Array2<C64>, nd::Array2<C64>)>
{
    let (evals, evecs_r): (nd::Array1<C64>, nd::Array2<C64>) = H.eig()?;
    let mut evecs_l: nd::Array2<C64> = nd::Array2::zeros((2, 2));
    for i in 0..2 {
        let r_other = evecs_r.column(1 - i);
        let l: nd::Array1<C64> = nd::array![r_other[1], -r_other[0]];
        let norm: C64 = l.dot(&evecs_r.column(i));
        evecs_l.column_mut(i).assign(&(l / norm));
    }
    Ok((evals, evecs_l, evecs_r))
}

/// Eigenvalues and matching left/right eigenvectors of a 2x2 matrix function
/// over a full time grid, with branch labels re-threaded for continuity.
///
/// `evals` has shape `(N, 2)` with the last index labeling the branch;
/// `evecs_r` and `evecs_l` have shape `(N, 2, 2)` with the middle index
/// labeling the vector component and the last the branch, so
/// `evecs_r[[n, .., i]]` is the right eigenvector of branch `i` at sample
/// `n`. At every sample, `l_i . r_j = delta_ij` up to solver tolerance.
#[derive(Clone, Debug)]
pub struct EigenSystem {
    pub evals: nd::Array2<C64>,
    pub evecs_l: nd::Array3<C64>,
    pub evecs_r: nd::Array3<C64>,
    /// Sample indices at which a solver-side branch swap was detected and
    /// repaired.
    pub swap_events: Vec<usize>,
}

impl EigenSystem {
    /// Decompose `H(t)` at every sample of `t` and repair branch-label
    /// discontinuities.
    pub fn over_grid<H>(H_of_t: H, t: &nd::Array1<f64>) -> EPResult<Self>
    where H: Fn(f64) -> nd::Array2<C64>
    {
        let n = t.len();
        let mut evals: nd::Array2<C64> = nd::Array2::zeros((n, 2));
        let mut evecs_l: nd::Array3<C64> = nd::Array3::zeros((n, 2, 2));
        let mut evecs_r: nd::Array3<C64> = nd::Array3::zeros((n, 2, 2));
        for (k, &tk) in t.iter().enumerate() {
            let (vals, vl, vr) = eig_biortho(&H_of_t(tk))?;
            evals.slice_mut(s![k, ..]).assign(&vals);
            evecs_l.slice_mut(s![k, .., ..]).assign(&vl);
            evecs_r.slice_mut(s![k, .., ..]).assign(&vr);
        }
        let mut new = Self { evals, evecs_l, evecs_r, swap_events: Vec::new() };
        new.correct_branches();
        Ok(new)
    }

    /// Number of time samples.
    pub fn len(&self) -> usize { self.evals.nrows() }

    pub fn is_empty(&self) -> bool { self.evals.nrows() == 0 }

    /// Right eigenvector of branch `i` at sample `k`.
    pub fn right(&self, k: usize, i: usize) -> nd::ArrayView1<'_, C64> {
        self.evecs_r.slice(s![k, .., i])
    }

    /// Left eigenvector of branch `i` at sample `k`.
    pub fn left(&self, k: usize, i: usize) -> nd::ArrayView1<'_, C64> {
        self.evecs_l.slice(s![k, .., i])
    }

    /// Exchange branch labels 0 and 1 at every sample.
    pub(crate) fn swap_branches(&mut self) {
        self.evals.invert_axis(nd::Axis(1));
        self.evecs_r.invert_axis(nd::Axis(2));
        self.evecs_l.invert_axis(nd::Axis(2));
    }

    /// Detect solver-side branch swaps and re-thread the arrays so each
    /// branch index follows a single physically continuous trajectory.
    ///
    /// Swap events are the indices `k` where branch 0 jumps by more than
    /// [`CONTINUITY_EPSILON`] between samples `k` and `k + 1`, scanned once
    /// on entry and processed in ascending order. At each event the branch-1
    /// eigenvectors are phase-rotated on the two complementary index ranges
    /// (`[0, k]` matching the `v1(k) -> v0(k+1)` seam, `[k+1, N)` matching
    /// `v0(k) -> v1(k+1)`), then the eigenvalue and eigenvector entries past
    /// the event are exchanged between the two branch slots.
    fn correct_branches(&mut self) {
        let n = self.len();
        if n < 2 { return; }
        let diff = utils::array_diff(&self.evals.column(0).to_owned());
        let swaps: Vec<usize>
            = diff.iter()
            .positions(|d| d.norm() > CONTINUITY_EPSILON)
            .collect();
        let mut ph_0_r = [0.0_f64; 2];
        let mut ph_0_l = [0.0_f64; 2];
        let mut ph_1_r = [0.0_f64; 2];
        let mut ph_1_l = [0.0_f64; 2];
        for &k in swaps.iter() {
            // per-component phase mismatch across the seam, for both
            // crossing directions and both vector sets
            for j in 0..2 {
                ph_0_r[j]
                    = self.evecs_r[[k, j, 0]].arg()
                    - self.evecs_r[[k + 1, j, 1]].arg();
                ph_0_l[j]
                    = self.evecs_l[[k, j, 0]].arg()
                    - self.evecs_l[[k + 1, j, 1]].arg();
                ph_1_r[j]
                    = self.evecs_r[[k + 1, j, 0]].arg()
                    - self.evecs_r[[k, j, 1]].arg();
                ph_1_l[j]
                    = self.evecs_l[[k + 1, j, 0]].arg()
                    - self.evecs_l[[k, j, 1]].arg();
            }
            for m in 0..n {
                let (pr, pl)
                    = if m > k { (&ph_0_r, &ph_0_l) }
                    else { (&ph_1_r, &ph_1_l) };
                for j in 0..2 {
                    self.evecs_r[[m, j, 1]] *= C64::from_polar(1.0, pr[j]);
                    self.evecs_l[[m, j, 1]] *= C64::from_polar(1.0, pl[j]);
                }
            }
            // exchange everything past the seam so the continuous branch
            // keeps a single array index
            for m in k + 1..n {
                self.evals.swap([m, 0], [m, 1]);
                for j in 0..2 {
                    self.evecs_r.swap([m, j, 0], [m, j, 1]);
                    self.evecs_l.swap([m, j, 0], [m, j, 1]);
                }
            }
        }
        self.swap_events = swaps;
    }
}
