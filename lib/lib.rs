#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Time evolution of a two-level non-Hermitian system whose control
//! parameters trace a closed loop around an exceptional point (EP).
//!
//! The central object is [`dynamics::EPSimulation`], which couples a
//! [`loops::LoopModel`] -- a closed curve in the control plane together with
//! the Hamiltonian defined over that plane -- to adaptive Runge-Kutta
//! integration of the Schrödinger equation, and expresses the propagated
//! state in the instantaneous biorthogonal eigenbasis of the Hamiltonian.
//! See [`eigen`] for the branch-tracking machinery that makes the eigenbasis
//! continuous in time.

pub mod utils;
pub mod error;
pub mod eigen;
pub mod loops;
pub mod schrodinger;
pub mod dynamics;
