//! Simulation pipeline: eigenbasis tracking, state classification, initial
//! conditions, propagation, and projection of the propagated state onto the
//! instantaneous eigenbasis.
//!
//! The pipeline is a sequence of pure transformations: the loop model is
//! swept into an [`EigenSystem`], the classifier fixes which branch carries
//! index 0, the initial state is assembled from the classified basis at
//! `t = 0`, the Schrödinger equation is integrated over the grid, and the
//! trajectory is decomposed into exact expansion coefficients `phi_a`,
//! `phi_b` through the biorthogonal left eigenvectors. Each run owns all of
//! its arrays; re-running with different parameters builds everything anew.

use std::f64::consts::PI;
use ndarray::{ self as nd, s };
use num_complex::Complex64 as C64;
use crate::{
    eigen::EigenSystem,
    error::{ EPError, EPResult },
    loops::LoopModel,
    schrodinger::{ self, OdeOpts },
    utils,
};

/// Which superposition of the classified eigenbasis at `t = 0` the
/// propagation starts from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitState {
    /// Branch 0 (tag `'a'`).
    A,
    /// Branch 1 (tag `'b'`).
    B,
    /// Normalized sum of both branches (tag `'c'`).
    C,
    /// Normalized difference of both branches (tag `'d'`).
    D,
}

impl InitState {
    pub fn from_tag(tag: &str) -> EPResult<Self> {
        match tag {
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            "c" => Ok(Self::C),
            "d" => Ok(Self::D),
            _ => Err(EPError::InvalidInitState(tag.into())),
        }
    }
}

/// Policy fixing which eigenbranch is stored at index 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SortMethod {
    /// Index 0 is the branch with the larger time-integrated imaginary part
    /// of its eigenvalue over the whole loop (tag `'gain'`).
    Gain,
    /// Index 0 is the branch with the smaller real part of its eigenvalue at
    /// `t = 0` (tag `'energy'`).
    Energy,
}

impl SortMethod {
    pub fn from_tag(tag: &str) -> EPResult<Self> {
        match tag {
            "gain" => Ok(Self::Gain),
            "energy" => Ok(Self::Energy),
            _ => Err(EPError::InvalidSortMethod(tag.into())),
        }
    }
}

/// Full configuration of one simulation run.
#[derive(Clone, Debug)]
pub struct EPParams {
    /// Total duration of the loop in parameter space.
    pub T: f64,
    /// Number of output samples per unit time; the grid holds `tN * T`
    /// samples in total.
    pub tN: usize,
    pub init_state: InitState,
    pub sort_method: SortMethod,
    /// Whether to also compute the adiabatic-theorem prediction.
    pub calc_adiabatic: bool,
    /// Extra diagnostic output on stderr; no effect on results.
    pub verbose: bool,
    pub ode: OdeOpts,
}

impl Default for EPParams {
    fn default() -> Self {
        Self {
            T: 100.0,
            tN: 50,
            init_state: InitState::A,
            sort_method: SortMethod::Gain,
            calc_adiabatic: false,
            verbose: false,
            ode: OdeOpts::default(),
        }
    }
}

impl EPParams {
    fn num_samples(&self) -> usize {
        (self.tN as f64 * self.T).round() as usize
    }

    fn validate(&self) -> EPResult<()> {
        if !self.T.is_finite() || self.T <= 0.0 {
            return Err(EPError::InvalidParams(
                format!("loop duration T must be positive, got {}", self.T)));
        }
        if self.num_samples() < 2 {
            return Err(EPError::InvalidParams(
                format!("time grid needs at least 2 samples, got {}",
                    self.num_samples())));
        }
        if self.ode.atol <= 0.0 || self.ode.rtol <= 0.0 {
            return Err(EPError::InvalidParams(
                "integrator tolerances must be positive".into()));
        }
        Ok(())
    }
}

/// Sort the eigensystem so that index 0 is the (relative) gain branch.
///
/// The integrals `int_0^T E_i(t) dt` are compared by imaginary part; if
/// branch 1 accumulates more, the branches are exchanged index-wise at every
/// sample.
pub fn find_gain_state(es: &mut EigenSystem, dt: f64) {
    let intE0: C64 = utils::trapz(&es.evals.column(0), dt);
    let intE1: C64 = utils::trapz(&es.evals.column(1), dt);
    if intE0.im < intE1.im {
        es.swap_branches();
    }
}

/// Sort the eigensystem so that index 0 is the branch with
/// `Re E_0(0) < Re E_1(0)`.
///
/// Only the samples at `t = 0` are compared; equal real parts leave the
/// order untouched.
pub fn find_lower_energy_state(es: &mut EigenSystem) {
    if es.evals[[0, 0]].re > es.evals[[0, 1]].re {
        es.swap_branches();
    }
}

fn biortho_normalized(v: nd::Array1<C64>) -> nd::Array1<C64> {
    let norm: C64 = v.mapv(|a| a.conj()).dot(&v).sqrt();
    v / norm
}

/// Assemble the initial state vector from the classified eigenbasis at
/// `t = 0`.
///
/// Modes `C` and `D` are normalized by `sqrt(conj(v) . v)`; modes `A` and
/// `B` inherit the solver's unit-norm eigenvectors. Near an exceptional
/// point the two branches are nearly parallel and the `D`-mode norm
/// approaches zero, so the superposition modes degrade in precision there.
pub fn initial_state(es: &EigenSystem, mode: InitState) -> nd::Array1<C64> {
    match mode {
        InitState::A => es.right(0, 0).to_owned(),
        InitState::B => es.right(0, 1).to_owned(),
        InitState::C => {
            let v = es.right(0, 0).to_owned() + es.right(0, 1);
            biortho_normalized(v)
        },
        InitState::D => {
            let phase = C64::from_polar(1.0, PI);
            let v = es.right(0, 0).to_owned()
                + es.right(0, 1).mapv(|a| phase * a);
            biortho_normalized(v)
        },
    }
}

/// Expansion coefficients of the trajectory in the instantaneous eigenbasis,
/// `phi_i(n) = sum_j l_i(n, j) psi(n, j)`.
///
/// This is an exact decomposition, not an approximation: the left and right
/// eigenvectors are biorthonormal by construction, so `phi_a r_0 + phi_b r_1`
/// reconstructs the propagated state.
pub fn project(es: &EigenSystem, psi: &nd::Array2<C64>)
    -> (nd::Array1<C64>, nd::Array1<C64>)
{
    let n = psi.nrows();
    let mut phi_a: nd::Array1<C64> = nd::Array1::zeros(n);
    let mut phi_b: nd::Array1<C64> = nd::Array1::zeros(n);
    for k in 0..n {
        phi_a[k] = es.left(k, 0).dot(&psi.row(k));
        phi_b[k] = es.left(k, 1).dot(&psi.row(k));
    }
    (phi_a, phi_b)
}

/// Adiabatic-theorem prediction per eigenbranch.
#[derive(Clone, Debug)]
pub struct AdiabaticState {
    /// Accumulated phase `theta_i(t) = -int_0^t E_i(t') dt'`, shape `(N, 2)`.
    pub theta: nd::Array2<C64>,
    /// Amplitude prediction `exp(i theta_i(t))`, shape `(N, 2)`.
    pub psi: nd::Array2<C64>,
}

/// Compute the adiabatic prediction by cumulative trapezoidal quadrature of
/// the eigenvalues; independent of the integrated trajectory.
pub fn adiabatic_state(es: &EigenSystem, dt: f64) -> AdiabaticState {
    let n = es.len();
    let mut theta: nd::Array2<C64> = nd::Array2::zeros((n, 2));
    let mut psi: nd::Array2<C64> = nd::Array2::zeros((n, 2));
    for i in 0..2 {
        let th = utils::trapz_prog(&es.evals.column(i), dt).mapv(|z| -z);
        psi.slice_mut(s![.., i])
            .assign(&th.mapv(|z| (C64::i() * z).exp()));
        theta.slice_mut(s![.., i]).assign(&th);
    }
    AdiabaticState { theta, psi }
}

/// All outputs of one run, owned by the run.
#[derive(Clone, Debug)]
pub struct EPRun {
    /// Output time grid.
    pub t: nd::Array1<f64>,
    pub dt: f64,
    /// Continuity-corrected, classified eigensystem along the loop.
    pub eigen: EigenSystem,
    /// Propagated state, shape `(N, 2)`.
    pub psi: nd::Array2<C64>,
    /// Expansion coefficient of the trajectory on branch 0.
    pub phi_a: nd::Array1<C64>,
    /// Expansion coefficient of the trajectory on branch 1.
    pub phi_b: nd::Array1<C64>,
    pub adiabatic: Option<AdiabaticState>,
}

/// One full simulation of a loop traversal.
///
/// Construction validates the parameters eagerly; the only failure modes
/// after that are eigensolver errors and integrator non-convergence, both of
/// which abort [`Self::run`] with no partial result.
pub struct EPSimulation<'a, M>
where M: LoopModel
{
    model: &'a M,
    params: EPParams,
    t: nd::Array1<f64>,
    dt: f64,
}

impl<'a, M> EPSimulation<'a, M>
where M: LoopModel
{
    pub fn new(model: &'a M, params: EPParams) -> EPResult<Self> {
        params.validate()?;
        let (t, dt) = utils::linspace_step(params.T, params.num_samples());
        Ok(Self { model, params, t, dt })
    }

    /// Output time grid.
    pub fn time(&self) -> &nd::Array1<f64> { &self.t }

    pub fn dt(&self) -> f64 { self.dt }

    /// Instantaneous eigensystem along the loop, continuity-corrected and
    /// sorted by the configured policy.
    pub fn eigensystem(&self) -> EPResult<EigenSystem> {
        let mut es = EigenSystem::over_grid(
            |tk| self.model.hamiltonian(tk),
            &self.t,
        )?;
        if self.params.verbose {
            eprintln!(
                "eigensystem: {} samples, {} branch swap(s) repaired",
                es.len(),
                es.swap_events.len(),
            );
        }
        match self.params.sort_method {
            SortMethod::Gain => find_gain_state(&mut es, self.dt),
            SortMethod::Energy => find_lower_energy_state(&mut es),
        }
        Ok(es)
    }

    /// Run the whole pipeline: eigensystem sweep, classification, initial
    /// state, integration, projection, and (optionally) the adiabatic
    /// prediction.
    pub fn run(&self) -> EPResult<EPRun> {
        let eigen = self.eigensystem()?;
        let psi0 = initial_state(&eigen, self.params.init_state);
        let psi = schrodinger::evolve_fn(
            &psi0,
            |tk| self.model.hamiltonian(tk),
            &self.t,
            &self.params.ode,
        )?;
        let (phi_a, phi_b) = project(&eigen, &psi);
        let adiabatic
            = self.params.calc_adiabatic
            .then(|| adiabatic_state(&eigen, self.dt));
        Ok(EPRun {
            t: self.t.clone(),
            dt: self.dt,
            eigen,
            psi,
            phi_a,
            phi_b,
            adiabatic,
        })
    }
}

#[cfg(test)]
mod test {
    use ndarray as nd;
    use num_complex::Complex64 as C64;
    use crate::loops::{ EPLoop, LoopModel, LoopParams, LoopType };
    use super::*;

    // constant decoupled system in the canonical basis: r_i = l_i = e_i
    fn constant_diag_system(n: usize, e0: C64, e1: C64) -> EigenSystem {
        let mut evals: nd::Array2<C64> = nd::Array2::zeros((n, 2));
        let mut evecs_l: nd::Array3<C64> = nd::Array3::zeros((n, 2, 2));
        let mut evecs_r: nd::Array3<C64> = nd::Array3::zeros((n, 2, 2));
        for m in 0..n {
            evals[[m, 0]] = e0;
            evals[[m, 1]] = e1;
            for i in 0..2 {
                evecs_r[[m, i, i]] = C64::new(1.0, 0.0);
                evecs_l[[m, i, i]] = C64::new(1.0, 0.0);
            }
        }
        EigenSystem { evals, evecs_l, evecs_r, swap_events: Vec::new() }
    }

    #[test]
    fn gain_sort_selects_larger_imag_integral() {
        let gain = C64::new(1.0, 0.1);
        let loss = C64::new(1.0, -0.1);
        let mut es = constant_diag_system(50, loss, gain);
        find_gain_state(&mut es, 0.1);
        assert_eq!(es.evals[[0, 0]], gain);
        // already sorted: untouched
        find_gain_state(&mut es, 0.1);
        assert_eq!(es.evals[[0, 0]], gain);
    }

    #[test]
    fn energy_sort_selects_smaller_real_part() {
        let mut es = constant_diag_system(50, C64::from(2.0), C64::from(1.0));
        find_lower_energy_state(&mut es);
        assert_eq!(es.evals[[0, 0]], C64::from(1.0));
    }

    #[test]
    fn energy_sort_leaves_real_part_ties_alone() {
        let e0 = C64::new(1.0, 0.1);
        let e1 = C64::new(1.0, -0.1);
        let mut es = constant_diag_system(50, e0, e1);
        find_lower_energy_state(&mut es);
        assert_eq!(es.evals[[0, 0]], e0);
        assert_eq!(es.evals[[0, 1]], e1);
    }

    #[test]
    fn superposition_modes_are_normalized() {
        let es = constant_diag_system(2, C64::from(1.0), C64::from(-1.0));
        for mode in [InitState::C, InitState::D] {
            let v = initial_state(&es, mode);
            let norm: f64 = v.iter().map(|z| z.norm_sqr()).sum();
            assert!((norm - 1.0).abs() < 1e-12);
        }
        let d = initial_state(&es, InitState::D);
        // branch 1 enters with phase exp(i pi)
        assert!((d[0] / d[1] + C64::new(1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn adiabatic_prediction_for_constant_eigenvalues() {
        let e0 = C64::new(0.7, 0.05);
        let e1 = C64::new(-0.3, -0.05);
        let es = constant_diag_system(101, e0, e1);
        let dt = 0.1;
        let ad = adiabatic_state(&es, dt);
        let t_end = 10.0;
        assert!((ad.theta[[100, 0]] + e0 * t_end).norm() < 1e-10);
        assert!(
            (ad.psi[[100, 1]] - (-C64::i() * e1 * t_end).exp()).norm() < 1e-10
        );
    }

    #[test]
    fn unknown_tags_are_config_errors() {
        assert!(matches!(
            InitState::from_tag("e"),
            Err(EPError::InvalidInitState(_)),
        ));
        assert!(matches!(
            SortMethod::from_tag("loss"),
            Err(EPError::InvalidSortMethod(_)),
        ));
    }

    struct DummyLoop;

    impl LoopModel for DummyLoop {
        fn loop_coordinates(&self, _t: f64) -> (f64, f64) { (0.0, 0.0) }

        fn hamiltonian_at(&self, _x: f64, _y: f64) -> nd::Array2<C64> {
            nd::Array2::eye(2)
        }
    }

    #[test]
    fn params_validated_before_any_work() {
        let params = EPParams { T: -1.0, ..EPParams::default() };
        assert!(matches!(
            EPSimulation::new(&DummyLoop, params),
            Err(EPError::InvalidParams(_)),
        ));
        let params = EPParams { T: 0.01, tN: 50, ..EPParams::default() };
        assert!(matches!(
            EPSimulation::new(&DummyLoop, params),
            Err(EPError::InvalidParams(_)),
        ));
    }

    // H = diag(1 + 0.1i, 1 - 0.1i): branch 0 (gain) is an exact eigenstate
    // and decouples completely from branch 1.
    struct GainLossLoop;

    impl LoopModel for GainLossLoop {
        fn loop_coordinates(&self, _t: f64) -> (f64, f64) { (0.0, 0.0) }

        fn hamiltonian_at(&self, _x: f64, _y: f64) -> nd::Array2<C64> {
            nd::array![
                [C64::new(1.0, 0.1), C64::new(0.0, 0.0)],
                [C64::new(0.0, 0.0), C64::new(1.0, -0.1)],
            ]
        }
    }

    #[test]
    fn decoupled_gain_state_stays_put() {
        let params = EPParams {
            T: 10.0,
            tN: 50,
            init_state: InitState::A,
            sort_method: SortMethod::Gain,
            ..EPParams::default()
        };
        let sim = EPSimulation::new(&GainLossLoop, params).unwrap();
        let run = sim.run().unwrap();
        assert_eq!(run.t.len(), 500);
        let e_gain = C64::new(1.0, 0.1);
        assert!((run.eigen.evals[[0, 0]] - e_gain).norm() < 1e-12);
        for (k, &tk) in run.t.iter().enumerate() {
            let expect = (-C64::i() * e_gain * tk).exp();
            assert!((run.phi_a[k] - expect).norm() < 1e-6,
                "phi_a off at t = {tk}");
            assert!(run.phi_b[k].norm() < 1e-10, "phi_b nonzero at t = {tk}");
        }
    }

    #[test]
    fn projection_reconstructs_trajectory_on_ep_loop() {
        let loop_params = LoopParams {
            w: std::f64::consts::TAU / 10.0,
            ..LoopParams::default()
        };
        let model = EPLoop::new(LoopType::Ellipse, loop_params);
        let params = EPParams {
            T: 10.0,
            tN: 50,
            init_state: InitState::C,
            sort_method: SortMethod::Gain,
            ..EPParams::default()
        };
        let sim = EPSimulation::new(&model, params).unwrap();
        let run = sim.run().unwrap();
        // encircling the EP forces at least one solver-side branch swap
        assert!(!run.eigen.swap_events.is_empty());
        let n = run.t.len();
        for k in 0..n {
            // biorthogonality of the corrected basis
            for i in 0..2 {
                for j in 0..2 {
                    let overlap: C64
                        = run.eigen.left(k, i).dot(&run.eigen.right(k, j));
                    let expected
                        = if i == j { C64::new(1.0, 0.0) }
                        else { C64::new(0.0, 0.0) };
                    assert!((overlap - expected).norm() < 1e-8);
                }
            }
            // exact reconstruction from the expansion coefficients
            let rec = run.eigen.right(k, 0).mapv(|a| run.phi_a[k] * a)
                + run.eigen.right(k, 1).mapv(|a| run.phi_b[k] * a);
            let psi_k = run.psi.row(k);
            for j in 0..2 {
                assert!((rec[j] - psi_k[j]).norm() < 1e-8,
                    "reconstruction off at sample {k}");
            }
        }
        // corrected branch 0 is continuous across the whole traversal
        for k in 0..n - 1 {
            let de = (run.eigen.evals[[k + 1, 0]]
                - run.eigen.evals[[k, 0]]).norm();
            assert!(de < crate::eigen::CONTINUITY_EPSILON);
        }
    }

    // Hermitian rotator with a constant gap: H = x sz + y sx on the unit
    // circle. Slower traversal leaks less into the upper branch.
    struct RotatorLoop {
        w: f64,
    }

    impl LoopModel for RotatorLoop {
        fn loop_coordinates(&self, t: f64) -> (f64, f64) {
            ((self.w * t).cos(), (self.w * t).sin())
        }

        fn hamiltonian_at(&self, x: f64, y: f64) -> nd::Array2<C64> {
            nd::array![
                [C64::from(x), C64::from(y)],
                [C64::from(y), C64::from(-x)],
            ]
        }
    }

    fn rotator_leak(T: f64) -> (f64, f64) {
        let model = RotatorLoop { w: std::f64::consts::TAU / T };
        let params = EPParams {
            T,
            tN: 50,
            init_state: InitState::A,
            sort_method: SortMethod::Energy,
            calc_adiabatic: true,
            ..EPParams::default()
        };
        let sim = EPSimulation::new(&model, params).unwrap();
        let run = sim.run().unwrap();
        let ad = run.adiabatic.as_ref().unwrap();
        let leak = run.phi_b.iter()
            .map(|z| z.norm())
            .fold(0.0_f64, f64::max);
        let ad_err = run.phi_a.iter()
            .zip(ad.psi.column(0))
            .map(|(p, a)| (p.norm() - a.norm()).abs())
            .fold(0.0_f64, f64::max);
        (leak, ad_err)
    }

    #[test]
    fn slower_loops_are_more_adiabatic() {
        let (leak_fast, ad_err_fast) = rotator_leak(8.0);
        let (leak_slow, ad_err_slow) = rotator_leak(32.0);
        assert!(leak_slow < leak_fast);
        assert!(leak_slow < 0.15);
        assert!(ad_err_slow < ad_err_fast);
    }
}
