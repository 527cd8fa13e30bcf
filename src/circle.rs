#![allow(dead_code, non_snake_case)]

//! Drive a circular loop around the exceptional point and dump the results
//! for external plotting.

use std::{ fs::File, path::PathBuf };
use anyhow::Result;
use ndarray as nd;
use ndarray_npy::NpzWriter;
use num_complex::Complex64 as C64;
use ep_sim::{
    dynamics::{ EPParams, EPSimulation, InitState, SortMethod },
    loops::{ EPLoop, LoopDirection, LoopModel, LoopParams },
};

const T: f64 = 100.0;

fn split_parts(z: &nd::Array1<C64>) -> (nd::Array1<f64>, nd::Array1<f64>) {
    (z.mapv(|a| a.re), z.mapv(|a| a.im))
}

fn main() -> Result<()> {
    let direction = LoopDirection::from_tag("-")?;
    let loop_params = LoopParams {
        x_ep: 0.0,
        y_ep: 0.0,
        x_R0: 0.05,
        y_R0: 0.4,
        w: direction.frequency(T),
        init_phase: 0.0,
    };
    let model = EPLoop::from_tag("circle", loop_params)?;
    let params = EPParams {
        T,
        tN: 50,
        init_state: InitState::from_tag("a")?,
        sort_method: SortMethod::from_tag("gain")?,
        calc_adiabatic: true,
        verbose: true,
        ..EPParams::default()
    };
    let sim = EPSimulation::new(&model, params)?;
    let run = sim.run()?;

    let xy: Vec<(f64, f64)>
        = run.t.iter().map(|&tk| model.loop_coordinates(tk)).collect();
    let x: nd::Array1<f64> = xy.iter().map(|p| p.0).collect();
    let y: nd::Array1<f64> = xy.iter().map(|p| p.1).collect();

    let outdir = PathBuf::from("output");
    std::fs::create_dir_all(&outdir)?;
    let mut npz = NpzWriter::new(File::create(outdir.join("circle.npz"))?);
    npz.add_array("t", &run.t)?;
    npz.add_array("x", &x)?;
    npz.add_array("y", &y)?;
    let (re, im) = split_parts(&run.phi_a);
    npz.add_array("phi_a_re", &re)?;
    npz.add_array("phi_a_im", &im)?;
    let (re, im) = split_parts(&run.phi_b);
    npz.add_array("phi_b_re", &re)?;
    npz.add_array("phi_b_im", &im)?;
    npz.add_array("evals_re", &run.eigen.evals.mapv(|z| z.re))?;
    npz.add_array("evals_im", &run.eigen.evals.mapv(|z| z.im))?;
    npz.add_array("psi_re", &run.psi.mapv(|z| z.re))?;
    npz.add_array("psi_im", &run.psi.mapv(|z| z.im))?;
    if let Some(ad) = run.adiabatic.as_ref() {
        npz.add_array("psi_ad_re", &ad.psi.mapv(|z| z.re))?;
        npz.add_array("psi_ad_im", &ad.psi.mapv(|z| z.im))?;
    }
    npz.finish()?;

    let n = run.t.len();
    println!(
        "|phi_a(T)| = {:.6e}; |phi_b(T)| = {:.6e}",
        run.phi_a[n - 1].norm(),
        run.phi_b[n - 1].norm(),
    );
    Ok(())
}
