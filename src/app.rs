//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads data and configuration files
//! - runs the SVD + global fit pipeline
//! - prints reports/plots (fit comparison, kinetic traces, spectra)
//! - writes optional exports

use std::fs::{self, File};
use std::path::Path;

use clap::Parser;
use nalgebra::DMatrix;

use crate::cli::{Command, FitArgs, ReconstructArgs, SimulateArgs, SliceArgs, SvdArgs};
use crate::data::{SimulationConfig, kinetic_trace, simulate, spectrum_at};
use crate::domain::{AnalysisConfig, FitFile, FitOptions, FitParameterSet, TaData};
use crate::error::{AnalysisError, AppError, ConfigurationError};
use crate::reconstruct::{decay_constants_with_overrides, difference, reconstruct_subset};
use crate::report::matrix_stats;

pub mod pipeline;

/// Entry point for the `svdgf` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Svd(args) => handle_svd(args),
        Command::Fit(args) => handle_fit(args),
        Command::Reconstruct(args) => handle_reconstruct(args),
        Command::Slice(args) => handle_slice(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn handle_svd(args: SvdArgs) -> Result<(), AppError> {
    let data = pipeline::load_windowed(&args.data, args.start_time)?;
    let values = crate::math::singular_values(&data.matrix).map_err(AppError::from)?;

    println!("{}", crate::report::format_data_summary(&data, args.start_time));
    println!("{}", crate::report::format_singular_values(&values, args.top));
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(&args);
    let run = pipeline::run_analysis(&config)?;

    println!("{}", crate::report::format_data_summary(&run.data, config.start_time));
    println!("{}", crate::report::format_fit_summary(&run.fit, &run.model));
    println!(
        "{}",
        crate::report::format_das_summary(&run.das, &run.data.wavelengths, run.components())
    );
    print!(
        "{}",
        crate::report::format_difference("Data - SVD-GF reconstruction", &matrix_stats(&run.difference))
    );
    print!(
        "{}",
        crate::report::format_difference("Data - retained SVD", &matrix_stats(&run.svd_difference))
    );

    if config.plot {
        println!();
        print!(
            "{}",
            crate::plot::render_fit_plots(&run.fit, &run.data.time_delays, config.plot_width, config.plot_height)
        );
    }

    if let Some(dir) = &config.export_dir {
        export_run(dir, &run, &config)?;
    }

    Ok(())
}

fn export_run(dir: &Path, run: &pipeline::Analysis, config: &AnalysisConfig) -> Result<(), AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::new(2, format!("Failed to create export dir '{}': {e}", dir.display())))?;

    let data = &run.data;
    let fit_file = run.fit_file(Some(config.data_path.display().to_string()));
    crate::io::write_fit_json(&dir.join("fit.json"), &fit_file)?;
    crate::io::write_das_csv(&dir.join("das.txt"), &run.das, &data.wavelengths, run.components())?;
    crate::io::write_matrix_csv(
        &dir.join("reconstructed.txt"),
        &run.reconstructed,
        &data.time_delays,
        &data.wavelengths,
    )?;
    crate::io::write_matrix_csv(
        &dir.join("difference.txt"),
        &run.difference,
        &data.time_delays,
        &data.wavelengths,
    )?;

    log::info!("exported fit results to '{}'", dir.display());
    Ok(())
}

fn handle_reconstruct(args: ReconstructArgs) -> Result<(), AppError> {
    let (fit, data) = load_fit_and_data(&args.fit, &args.data)?;

    let overrides: Vec<(usize, f64)> = args.taus.iter().map(|o| (o.component, o.tau)).collect();
    let kept_components: Vec<usize> = match &args.keep {
        Some(keep) => keep.as_slice().to_vec(),
        None => fit.components.as_slice().to_vec(),
    };
    let (taus, reconstructed) = reconstruct_from_fit(&fit, &data, &overrides, &kept_components)?;
    let diff = difference(&data.matrix, &reconstructed).map_err(AnalysisError::from)?;

    print!("{}", crate::report::format_decay_constants(&kept_components, &taus));
    print!(
        "{}",
        crate::report::format_difference("Data - reconstruction", &matrix_stats(&diff))
    );

    if let Some(path) = &args.export {
        crate::io::write_matrix_csv(path, &reconstructed, &data.time_delays, &data.wavelengths)?;
    }
    Ok(())
}

/// Read a fit file and the data it was run on, windowed the same way.
fn load_fit_and_data(fit_path: &Path, data_path: &Path) -> Result<(FitFile, TaData), AppError> {
    let fit = crate::io::read_fit_json(fit_path)?;
    let data = pipeline::load_windowed(data_path, Some(fit.start_time))?;

    if data.wavelengths.len() != fit.wavelengths.len() || data.time_delays.len() != fit.time_delays.len() {
        return Err(AppError::new(
            3,
            format!(
                "Data file has {}x{} samples after the start time but the fit used {}x{}.",
                data.wavelengths.len(),
                data.time_delays.len(),
                fit.wavelengths.len(),
                fit.time_delays.len()
            ),
        ));
    }
    Ok((fit, data))
}

/// Reconstruct from a fit file's DAS, keeping `kept_components` and applying
/// decay constant overrides. Returns the decay constants of the kept components.
fn reconstruct_from_fit(
    fit: &FitFile,
    data: &TaData,
    overrides: &[(usize, f64)],
    kept_components: &[usize],
) -> Result<(Vec<f64>, DMatrix<f64>), AppError> {
    let params =
        FitParameterSet::from_named(fit.components.clone(), &fit.parameters).map_err(AnalysisError::from)?;
    let das = pipeline::das_from_fit_file(fit)?;
    let taus = decay_constants_with_overrides(&params, overrides).map_err(AnalysisError::from)?;

    let keep = kept_components
        .iter()
        .map(|&c| {
            fit.components.position(c).ok_or_else(|| {
                ConfigurationError::Invalid(format!(
                    "component {c} is not in the fitted set {}",
                    fit.components
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(AnalysisError::from)?;

    let reconstructed = reconstruct_subset(&das, &taus, &data.time_delays, &keep)?;
    Ok((keep.iter().map(|&k| taus[k]).collect(), reconstructed))
}

fn handle_slice(args: SliceArgs) -> Result<(), AppError> {
    let (data, model) = match &args.fit {
        Some(fit_path) => {
            let (fit, data) = load_fit_and_data(fit_path, &args.data)?;
            let (_, reconstructed) = reconstruct_from_fit(&fit, &data, &[], fit.components.as_slice())?;
            (data, Some(reconstructed))
        }
        None => (pipeline::load_windowed(&args.data, args.start_time)?, None),
    };

    let (shown, overlay, what) = match (&model, args.difference) {
        (Some(recon), true) => {
            let diff = difference(&data.matrix, recon).map_err(AnalysisError::from)?;
            (diff, None, "data - reconstruction")
        }
        (Some(recon), false) => (data.matrix.clone(), Some(recon), "data"),
        (None, _) => (data.matrix.clone(), None, "data"),
    };

    if let Some(wavelength) = args.wavelength {
        let trace = kinetic_trace(&data, &shown, wavelength).map_err(AnalysisError::from)?;
        let model_trace = overlay
            .map(|m| kinetic_trace(&data, m, wavelength))
            .transpose()
            .map_err(AnalysisError::from)?;
        print!(
            "{}",
            crate::plot::render_slice_plot(
                &format!("{what} at {:.2} nm", trace.at),
                ("t", "ps"),
                &trace,
                model_trace.as_ref(),
                args.width,
                args.height,
            )
        );
    }
    if let Some(delay) = args.delay {
        let spectrum = spectrum_at(&data, &shown, delay).map_err(AnalysisError::from)?;
        let model_spectrum = overlay
            .map(|m| spectrum_at(&data, m, delay))
            .transpose()
            .map_err(AnalysisError::from)?;
        print!(
            "{}",
            crate::plot::render_slice_plot(
                &format!("{what} at {:.4} ps", spectrum.at),
                ("wl", "nm"),
                &spectrum,
                model_spectrum.as_ref(),
                args.width,
                args.height,
            )
        );
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let mut config = match &args.config {
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                AppError::new(2, format!("Failed to open simulation config '{}': {e}", path.display()))
            })?;
            serde_json::from_reader::<_, SimulationConfig>(file)
                .map_err(|e| AppError::new(2, format!("Invalid simulation config: {e}")))?
        }
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(noise) = args.probe_noise {
        config.probe_noise = noise;
    }
    if let Some(noise) = args.pump_noise {
        config.pump_noise = noise;
    }

    let data = simulate(&config)?;
    crate::io::write_matrix_csv(&args.out, &data.matrix, &data.time_delays, &data.wavelengths)?;
    println!(
        "Wrote {} wavelengths x {} time delays to {}",
        data.wavelengths.len(),
        data.time_delays.len(),
        args.out.display()
    );
    Ok(())
}

pub fn analysis_config_from_args(args: &FitArgs) -> AnalysisConfig {
    AnalysisConfig {
        data_path: args.data.clone(),
        start_time: args.start_time,
        components: args.components.clone(),
        initial_values: args.initial.clone(),
        target_model: args.model.clone(),
        fit: FitOptions {
            method: args.method,
            solve_amplitudes: args.solve_amplitudes,
            max_evaluations: args.max_evals,
            tolerance: args.tolerance,
        },
        export_dir: args.export_dir.clone(),
        plot: args.plot,
        plot_width: args.width,
        plot_height: args.height,
    }
}
