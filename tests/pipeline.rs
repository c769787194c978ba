use std::collections::BTreeMap;

use nalgebra::DMatrix;

use svdgf::app::pipeline::{analyze, das_from_fit_file, run_analysis};
use svdgf::data::{SimulationConfig, simulate};
use svdgf::domain::{
    AnalysisConfig, ComponentSet, FitMethod, FitOptions, InitialValues, TaData, TargetModelText,
};
use svdgf::error::{AnalysisError, ConfigurationError};
use svdgf::io::{read_fit_json, write_fit_json, write_matrix_csv};
use svdgf::reconstruct::{reconstruct, reconstruct_subset};

fn delays() -> Vec<f64> {
    (0..100).map(|i| i as f64 * 2.0).collect()
}

/// Two wavelengths, τ = [20, 80] ps.
fn two_wavelength_data() -> TaData {
    let t = delays();
    let matrix = DMatrix::from_fn(2, t.len(), |w, k| {
        let (a, b) = if w == 0 { (1.0, 0.5) } else { (0.5, 1.0) };
        a * (-t[k] / 20.0).exp() + b * (-t[k] / 80.0).exp()
    });
    TaData::new(matrix, t, vec![500.0, 600.0]).unwrap()
}

/// 50 wavelengths, two Gaussian bands decaying with τ = [20, 80] ps.
fn band_data() -> TaData {
    let t = delays();
    let wavelengths: Vec<f64> = (0..50).map(|i| 450.0 + 4.0 * i as f64).collect();
    let matrix = DMatrix::from_fn(wavelengths.len(), t.len(), |w, k| {
        let l = wavelengths[w];
        let s0 = (-(l - 500.0).powi(2) / (2.0 * 20.0 * 20.0)).exp();
        let s1 = 0.5 * (-(l - 600.0).powi(2) / (2.0 * 30.0 * 30.0)).exp();
        s0 * (-t[k] / 20.0).exp() + s1 * (-t[k] / 80.0).exp()
    });
    TaData::new(matrix, t, wavelengths).unwrap()
}

fn seed_values() -> InitialValues {
    InitialValues {
        time_constants: vec![12.0, 120.0],
        amplitudes: BTreeMap::from([(0, vec![1.0, 1.0]), (1, vec![1.0, 1.0])]),
    }
}

fn warm_start() -> FitOptions {
    FitOptions {
        solve_amplitudes: true,
        ..FitOptions::default()
    }
}

fn sorted(v: &[f64]) -> Vec<f64> {
    let mut v = v.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    v
}

fn assert_taus_near(taus: &[f64], expected: [f64; 2], rel: f64) {
    let taus = sorted(taus);
    for (got, want) in taus.iter().zip(expected) {
        assert!((got - want).abs() <= rel * want, "taus {taus:?}, expected {expected:?}");
    }
}

#[test]
fn two_wavelength_fit_recovers_decay_constants_and_das_shape() {
    let data = two_wavelength_data();
    let components = ComponentSet::new(vec![0, 1]).unwrap();
    let run = analyze(&data, &components, Some(&seed_values()), None, &warm_start()).unwrap();

    assert_taus_near(run.fit.params.taus(), [20.0, 80.0], 0.01);
    assert_eq!(run.das.shape(), (2, 2));
}

#[test]
fn band_data_fit_is_independent_of_component_order() {
    let data = band_data();
    let forward = analyze(
        &data,
        &ComponentSet::new(vec![0, 1]).unwrap(),
        Some(&seed_values()),
        None,
        &warm_start(),
    )
    .unwrap();
    let reversed = analyze(
        &data,
        &ComponentSet::new(vec![1, 0]).unwrap(),
        Some(&seed_values()),
        None,
        &warm_start(),
    )
    .unwrap();

    assert_taus_near(forward.fit.params.taus(), [20.0, 80.0], 1e-3);
    assert_taus_near(reversed.fit.params.taus(), [20.0, 80.0], 1e-3);
    assert_eq!(forward.das.shape(), (50, 2));

    // Noise-free rank-2 data is explained completely.
    let scale = data.matrix.amax();
    assert!(forward.difference.amax() < 1e-6 * scale);
    assert!(reversed.difference.amax() < 1e-6 * scale);
}

#[test]
fn reconstruction_projects_back_onto_vectors_to_fit() {
    let data = band_data();
    let components = ComponentSet::new(vec![0, 1]).unwrap();
    let run = analyze(&data, &components, Some(&seed_values()), None, &warm_start()).unwrap();

    let selected: Vec<usize> = (0..components.len()).collect();
    let recon = reconstruct(&run.das, run.fit.params.taus(), &data.time_delays, &selected).unwrap();
    let projected = run.retained.left_vectors.transpose() * &recon;

    let scale = run.fit.vectors_to_fit.amax();
    assert!((projected - &run.fit.vectors_to_fit).amax() < 1e-6 * scale);
}

#[test]
fn gauss_newton_agrees_with_levenberg_marquardt() {
    let data = two_wavelength_data();
    let components = ComponentSet::new(vec![0, 1]).unwrap();
    let gn = FitOptions {
        method: FitMethod::GaussNewton,
        ..warm_start()
    };
    let a = analyze(&data, &components, Some(&seed_values()), None, &warm_start()).unwrap();
    let b = analyze(&data, &components, Some(&seed_values()), None, &gn).unwrap();
    for (x, y) in sorted(a.fit.params.taus()).iter().zip(sorted(b.fit.params.taus())) {
        assert!((x - y).abs() < 1e-3 * x);
    }
}

#[test]
fn user_model_with_unknown_identifier_is_rejected() {
    let data = two_wavelength_data();
    let components = ComponentSet::new(vec![0, 1]).unwrap();
    let target = TargetModelText {
        summands: BTreeMap::from([
            (0, "exp(-t/k0)".to_string()),
            (1, "exp(-t/k1) + z".to_string()),
        ]),
    };
    let err = analyze(&data, &components, Some(&seed_values()), Some(&target), &warm_start())
        .unwrap_err();
    match err {
        AnalysisError::Configuration(ConfigurationError::InvalidModelExpression { component, message }) => {
            assert_eq!(component, 1);
            assert!(message.contains('z'), "{message}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn mismatched_reconstruction_arguments_are_rejected() {
    let das = DMatrix::from_element(4, 3, 1.0);
    let err = reconstruct(&das, &[10.0, 20.0], &delays(), &[0, 1, 2]).unwrap_err();
    assert!(matches!(err, AnalysisError::Configuration(_)));
}

#[test]
fn dropping_a_component_removes_its_contribution() {
    let data = band_data();
    let components = ComponentSet::new(vec![0, 1]).unwrap();
    let run = analyze(&data, &components, Some(&seed_values()), None, &warm_start()).unwrap();
    let taus = run.fit.params.taus();

    let first = reconstruct_subset(&run.das, taus, &data.time_delays, &[0]).unwrap();
    let second = reconstruct_subset(&run.das, taus, &data.time_delays, &[1]).unwrap();
    assert!((&first + &second - &run.reconstructed).amax() < 1e-10 * data.matrix.amax());
}

#[test]
fn file_pipeline_round_trips_through_exports() {
    let dir = tempfile::tempdir().unwrap();
    let data = simulate(&SimulationConfig::default()).unwrap();
    let data_path = dir.path().join("sim.txt");
    write_matrix_csv(&data_path, &data.matrix, &data.time_delays, &data.wavelengths).unwrap();

    let init_path = dir.path().join("initial.json");
    std::fs::write(
        &init_path,
        r#"{"time_constants": [12, 120], "amps_rSV0": [1, 1], "amps_rSV1": [1, 1]}"#,
    )
    .unwrap();

    let config = AnalysisConfig {
        data_path: data_path.clone(),
        start_time: Some(0.0),
        components: ComponentSet::new(vec![0, 1]).unwrap(),
        initial_values: Some(init_path),
        target_model: None,
        fit: warm_start(),
        export_dir: None,
        plot: false,
        plot_width: 80,
        plot_height: 20,
    };
    let run = run_analysis(&config).unwrap();
    assert_taus_near(run.fit.params.taus(), [20.0, 80.0], 0.01);

    let fit_path = dir.path().join("fit.json");
    write_fit_json(&fit_path, &run.fit_file(Some("sim.txt".to_string()))).unwrap();
    let loaded = read_fit_json(&fit_path).unwrap();
    assert_eq!(loaded.components, run.fit.params.components().clone());
    assert_eq!(loaded.decay_constants, run.fit.params.taus().to_vec());
    assert_eq!(das_from_fit_file(&loaded).unwrap(), run.das);
}
