//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks of a fit in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - fitted vector samples (or measured data): `o`
//! - model at the fitted parameters (or reconstruction): `-` line

use crate::data::Slice;
use crate::fit::GlobalFit;

/// Plot every fitted vector against its model.
pub fn render_fit_plots(fit: &GlobalFit, time_delays: &[f64], width: usize, height: usize) -> String {
    let mut out = String::new();
    for i in 0..fit.vectors_to_fit.nrows() {
        let observed: Vec<f64> = fit.vectors_to_fit.row(i).iter().copied().collect();
        let model: Vec<f64> = fit.model_vectors.row(i).iter().copied().collect();
        out.push_str(&render_vector_plot(
            &format!("rSV{i}"),
            time_delays,
            &observed,
            &model,
            width,
            height,
        ));
        out.push('\n');
    }
    out
}

/// Plot one vector (`o`) and its model (`-`) over the time axis.
pub fn render_vector_plot(
    label: &str,
    time_delays: &[f64],
    observed: &[f64],
    model: &[f64],
    width: usize,
    height: usize,
) -> String {
    render_series(label, ("t", "ps"), time_delays, observed, model, width, height)
}

/// Plot a kinetic trace or spectrum (`o`), optionally over a model slice (`-`).
///
/// `axis` is the axis name and unit, e.g. `("t", "ps")` or `("wl", "nm")`.
pub fn render_slice_plot(
    label: &str,
    axis: (&str, &str),
    slice: &Slice,
    model: Option<&Slice>,
    width: usize,
    height: usize,
) -> String {
    let model = model.map_or(&[][..], |m| m.values.as_slice());
    render_series(label, axis, &slice.axis, &slice.values, model, width, height)
}

fn render_series(
    label: &str,
    (axis_name, unit): (&str, &str),
    xs: &[f64],
    observed: &[f64],
    model: &[f64],
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (x_min, x_max) = range(xs.iter().copied()).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = range(observed.iter().chain(model).copied()).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Model first so samples overlay it.
    let curve: Vec<(f64, f64)> = xs.iter().copied().zip(model.iter().copied()).collect();
    draw_curve(&mut grid, &curve, x_min, x_max, y_min, y_max);

    for (&xv, &y) in xs.iter().zip(observed) {
        if !(xv.is_finite() && y.is_finite()) {
            continue;
        }
        let x = map_x(xv, x_min, x_max, width);
        let yy = map_y(y, y_min, y_max, height);
        grid[yy][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{label}: {axis_name}=[{x_min:.2}, {x_max:.2}] {unit} | y=[{y_min:.4}, {y_max:.4}]\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (min.is_finite() && max.is_finite() && max > min).then_some((min, max))
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], t_min: f64, t_max: f64, y_min: f64, y_max: f64) {
    let height = grid.len();
    let width = grid.first().map_or(0, Vec::len);

    let mut prev = None;
    for &(t, y) in curve {
        if !(t.is_finite() && y.is_finite()) {
            prev = None;
            continue;
        }
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, '-');
        } else {
            grid[yy][x] = '-';
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_golden_snapshot_small() {
        let t = [0.0, 3.0, 6.0, 9.0];
        let observed = [0.0, f64::NAN, f64::NAN, 10.0];
        let model = [0.0, 0.0, 0.0, 0.0];

        let txt = render_vector_plot("rSV0", &t, &observed, &model, 10, 5);
        let expected = concat!(
            "rSV0: t=[0.00, 9.00] ps | y=[-0.5000, 10.5000]\n",
            "         o\n",
            "          \n",
            "          \n",
            "          \n",
            "o---------\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn spectrum_plot_without_model_marks_samples_only() {
        let slice = Slice {
            at: 5.0,
            index: 2,
            axis: vec![450.0, 500.0, 550.0],
            values: vec![0.0, 1.0, 0.0],
        };
        let txt = render_slice_plot("spectrum at 5 ps", ("wl", "nm"), &slice, None, 11, 5);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines[0], "spectrum at 5 ps: wl=[450.00, 550.00] nm | y=[-0.0500, 1.0500]");
        assert_eq!(lines[1], "     o     ");
        assert_eq!(lines[5], "o         o");
        assert!(lines[1..].iter().all(|l| !l.contains('-')));
    }

    #[test]
    fn flat_data_does_not_panic() {
        let txt = render_vector_plot("rSV1", &[1.0], &[2.0], &[2.0], 12, 6);
        assert_eq!(txt.lines().count(), 7);
    }
}
