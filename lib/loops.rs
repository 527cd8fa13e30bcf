//! Closed control-parameter loops and the Hamiltonians defined over them.
//!
//! The simulation pipeline is generic over a [`LoopModel`], which supplies
//! both the loop parametrization and the Hamiltonian. [`EPLoop`] provides the
//! canonical exceptional-point model over two built-in geometries; systems
//! with a different control-plane Hamiltonian implement the trait directly.

use std::f64::consts::TAU;
use ndarray::{ self as nd, array };
use num_complex::Complex64 as C64;
use crate::error::{ EPError, EPResult };

/// A closed curve in the `(x, y)` control plane together with the two-level
/// Hamiltonian defined over that plane.
///
/// The pipeline queries [`Self::hamiltonian`] at arbitrary times chosen by
/// the adaptive integrator, not only on the output grid, so implementations
/// must be defined for all `t` in `[0, T]`.
pub trait LoopModel {
    /// Control-plane coordinates at time `t`.
    fn loop_coordinates(&self, t: f64) -> (f64, f64);

    /// Hamiltonian at explicit control-plane coordinates.
    fn hamiltonian_at(&self, x: f64, y: f64) -> nd::Array2<C64>;

    /// Hamiltonian at the loop position for time `t`.
    fn hamiltonian(&self, t: f64) -> nd::Array2<C64> {
        let (x, y) = self.loop_coordinates(t);
        self.hamiltonian_at(x, y)
    }
}

/// Traversal direction around the loop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopDirection {
    /// Counter-clockwise (tag `'-'`).
    Negative,
    /// Clockwise (tag `'+'`).
    Positive,
}

impl LoopDirection {
    pub fn from_tag(tag: &str) -> EPResult<Self> {
        match tag {
            "-" => Ok(Self::Negative),
            "+" => Ok(Self::Positive),
            _ => Err(EPError::InvalidLoopDirection(tag.into())),
        }
    }

    /// Signed angular frequency for a loop of duration `T`.
    pub fn frequency(self, T: f64) -> f64 {
        match self {
            Self::Negative => TAU / T,
            Self::Positive => -TAU / T,
        }
    }
}

/// Built-in loop geometries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopType {
    /// Circle of radius `x_R0` about the loop center.
    Circle,
    /// Ellipse with semi-axes `x_R0`, `y_R0` about the loop center.
    Ellipse,
}

impl LoopType {
    pub fn from_tag(tag: &str) -> EPResult<Self> {
        if tag.eq_ignore_ascii_case("circle") {
            Ok(Self::Circle)
        } else if tag.eq_ignore_ascii_case("ellipse") {
            Ok(Self::Ellipse)
        } else {
            Err(EPError::InvalidLoopType(tag.into()))
        }
    }
}

/// Geometric parameters fixing a built-in loop in the control plane.
#[derive(Copy, Clone, Debug)]
pub struct LoopParams {
    /// Loop center; the exceptional point of [`EPLoop`] sits at the origin.
    pub x_ep: f64,
    pub y_ep: f64,
    /// Loop extent in each coordinate.
    pub x_R0: f64,
    pub y_R0: f64,
    /// Signed angular frequency (see [`LoopDirection::frequency`]).
    pub w: f64,
    /// Starting offset on the trajectory.
    pub init_phase: f64,
}

impl Default for LoopParams {
    fn default() -> Self {
        Self {
            x_ep: 0.0,
            y_ep: 0.0,
            x_R0: 0.05,
            y_R0: 0.4,
            w: TAU / 100.0,
            init_phase: 0.0,
        }
    }
}

/// Canonical exceptional-point model over the control plane,
/// ```text
/// H(x, y) = [ 0       1 ]
///           [ x + iy  0 ]
/// ```
/// with eigenvalues `±sqrt(x + iy)` and a second-order EP at the origin,
/// where both eigenvalues and eigenvectors coalesce. A loop whose center
/// encloses the origin exchanges the two eigenbranches over one traversal.
#[derive(Copy, Clone, Debug)]
pub struct EPLoop {
    kind: LoopType,
    params: LoopParams,
}

impl EPLoop {
    pub fn new(kind: LoopType, params: LoopParams) -> Self {
        Self { kind, params }
    }

    /// Construct from a `loop_type` tag; unknown tags are a configuration
    /// error.
    pub fn from_tag(tag: &str, params: LoopParams) -> EPResult<Self> {
        Ok(Self::new(LoopType::from_tag(tag)?, params))
    }

    pub fn kind(&self) -> LoopType { self.kind }

    pub fn params(&self) -> &LoopParams { &self.params }
}

impl LoopModel for EPLoop {
    fn loop_coordinates(&self, t: f64) -> (f64, f64) {
        let LoopParams { x_ep, y_ep, x_R0, y_R0, w, init_phase } = self.params;
        let theta = w * t + init_phase;
        match self.kind {
            LoopType::Circle
                => (x_ep + x_R0 * theta.cos(), y_ep + x_R0 * theta.sin()),
            LoopType::Ellipse
                => (x_ep + x_R0 * theta.cos(), y_ep + y_R0 * theta.sin()),
        }
    }

    fn hamiltonian_at(&self, x: f64, y: f64) -> nd::Array2<C64> {
        array![
            [C64::new(0.0, 0.0), C64::new(1.0, 0.0)],
            [C64::new(x, y), C64::new(0.0, 0.0)],
        ]
    }
}
