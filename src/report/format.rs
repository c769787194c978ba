//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use nalgebra::DMatrix;

use crate::domain::{ComponentSet, FitParameterSet, SeedSource, TaData};
use crate::fit::GlobalFit;
use crate::models::DecayModel;
use crate::report::{MatrixStats, explained_variance};

/// Data set header (shape and axis ranges).
pub fn format_data_summary(data: &TaData, start_time: Option<f64>) -> String {
    let mut out = String::new();
    out.push_str("=== svdgf - SVD + global fit ===\n");
    out.push_str(&format!(
        "Data: {} wavelengths x {} time delays\n",
        data.wavelengths.len(),
        data.time_delays.len()
    ));
    out.push_str(&format!(
        "Wavelengths: [{:.2}, {:.2}] nm\n",
        first(&data.wavelengths),
        last(&data.wavelengths)
    ));
    out.push_str(&format!(
        "Time delays: [{:.4}, {:.4}] ps\n",
        first(&data.time_delays),
        last(&data.time_delays)
    ));
    if let Some(start) = start_time {
        out.push_str(&format!("Start time: {start} ps\n"));
    }
    out
}

/// Table of the leading singular values.
pub fn format_singular_values(values: &[f64], top: usize) -> String {
    let fractions = explained_variance(values);
    let mut out = String::new();
    out.push_str(&format!("{:>5} {:>16} {:>10} {:>10}\n", "index", "singular value", "variance", "cumul."));
    out.push_str(&format!("{:-<5} {:-<16} {:-<10} {:-<10}\n", "", "", "", ""));
    let mut cumulative = 0.0;
    for (i, (s, f)) in values.iter().zip(&fractions).take(top).enumerate() {
        cumulative += f;
        out.push_str(&format!(
            "{i:>5} {s:>16.6e} {:>9.4}% {:>9.4}%\n",
            f * 100.0,
            cumulative * 100.0
        ));
    }
    out
}

/// Fit diagnostics, decay constants, amplitudes and per-vector RMS.
pub fn format_fit_summary(fit: &GlobalFit, model: &DecayModel) -> String {
    let d = &fit.diagnostics;
    let mut out = String::new();

    out.push_str("\nGlobal fit:\n");
    out.push_str(&format!("- model      : {}\n", model.display_name()));
    out.push_str(&format!("- method     : {}\n", d.method));
    out.push_str(&format!(
        "- status     : {} ({})\n",
        if d.success { "converged" } else { "not converged" },
        d.termination
    ));
    out.push_str(&format!("- evaluations: {}\n", d.evaluations));
    out.push_str(&format!("- cost       : {:.6e}\n", d.cost));
    match &fit.seed_source {
        SeedSource::UserValues => out.push_str("- seed       : user initial values\n"),
        SeedSource::Defaults { reason } => out.push_str(&format!("- seed       : defaults ({reason})\n")),
    }

    out.push_str("\nSummands:\n");
    for (slot, component) in fit.params.components().iter().enumerate() {
        out.push_str(&format!(
            "  component {component}: {}\n",
            model.describe_summand(slot, component)
        ));
    }

    out.push('\n');
    out.push_str(&format_parameters(&fit.params));

    out.push_str("\nResidual RMS per fitted vector:\n");
    for (i, rms) in fit.rms_residuals().iter().enumerate() {
        out.push_str(&format!("  rSV{i}: {rms:.6e}\n"));
    }
    out
}

/// Parameter table: one row per component, τ then amplitudes by vector.
pub fn format_parameters(params: &FitParameterSet) -> String {
    let n = params.components().len();
    let mut out = String::new();

    let mut header = format!("{:<10} {:>14}", "component", "tau (ps)");
    for i in 0..n {
        header.push_str(&format!(" {:>14}", format!("amp rSV{i}")));
    }
    out.push_str(header.trim_end());
    out.push('\n');

    for (j, component) in params.components().iter().enumerate() {
        let mut row = format!("{:<10} {:>14.6}", component, params.taus()[j]);
        for i in 0..n {
            row.push_str(&format!(" {:>14.6e}", params.amplitudes()[(i, j)]));
        }
        out.push_str(row.trim_end());
        out.push('\n');
    }
    out
}

/// Per-component DAS extremes.
pub fn format_das_summary(das: &DMatrix<f64>, wavelengths: &[f64], components: &ComponentSet) -> String {
    let mut out = String::new();
    out.push_str("\nDecay-associated spectra:\n");
    for (k, component) in components.iter().enumerate() {
        let column = das.column(k);
        let (argmax, max) = column.argmax();
        let (argmin, min) = column.argmin();
        out.push_str(&format!(
            "  DAS{component}: max {max:.4e} at {:.2} nm, min {min:.4e} at {:.2} nm\n",
            wavelengths.get(argmax).copied().unwrap_or(f64::NAN),
            wavelengths.get(argmin).copied().unwrap_or(f64::NAN),
        ));
    }
    out
}

/// One-line summary of a difference matrix.
pub fn format_difference(label: &str, stats: &MatrixStats) -> String {
    format!(
        "{label}: rms {:.6e}, max |diff| {:.6e}\n",
        stats.rms, stats.max_abs
    )
}

/// Decay constants used in a what-if reconstruction.
pub fn format_decay_constants(components: &[usize], taus: &[f64]) -> String {
    let parts: Vec<String> = components
        .iter()
        .zip(taus)
        .map(|(c, t)| format!("k{c}={t:.6}"))
        .collect();
    format!("Decay constants: {}\n", parts.join(", "))
}

fn first(v: &[f64]) -> f64 {
    v.first().copied().unwrap_or(f64::NAN)
}

fn last(v: &[f64]) -> f64 {
    v.last().copied().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_value_table_lists_top_values() {
        let txt = format_singular_values(&[4.0, 3.0, 0.0], 2);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("64.0000%"), "{}", lines[2]);
        assert!(lines[3].trim_end().ends_with("100.0000%"), "{}", lines[3]);
    }

    #[test]
    fn parameter_table_follows_component_order() {
        let components = ComponentSet::new(vec![3, 1]).unwrap();
        let params = FitParameterSet::from_parts(
            components,
            vec![12.5, 80.0],
            DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]),
        )
        .unwrap();
        let txt = format_parameters(&params);
        let lines: Vec<&str> = txt.lines().collect();
        assert!(lines[0].starts_with("component"));
        assert!(lines[1].starts_with("3 "));
        assert!(lines[1].contains("12.500000"));
        assert!(lines[2].starts_with("1 "));
        assert!(lines[2].contains("4.000000e0"));
    }

    #[test]
    fn decay_constant_line() {
        assert_eq!(
            format_decay_constants(&[0, 2], &[1.5, 20.0]),
            "Decay constants: k0=1.500000, k2=20.000000\n"
        );
    }
}
