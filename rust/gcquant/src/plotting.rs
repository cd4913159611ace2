//! SVG quality-control plots.

use std::path::Path;

use plotters::prelude::*;

use crate::calibration::Regression;
use crate::errors::{
    GcmsError,
    Result,
};

const PLOT_SIZE: (u32, u32) = (1000, 700);
/// Window maximum of the scaled TIC, relative to the fit maximum.
const TIC_SCALE: f64 = 1.2;
/// Headroom above the fit maximum.
const Y_HEADROOM: f64 = 1.5;

const PALETTE: [RGBColor; 6] = [BLUE, RED, GREEN, MAGENTA, CYAN, RGBColor(230, 140, 0)];

type PlotResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn plot_error(path: &Path, e: Box<dyn std::error::Error>) -> GcmsError {
    GcmsError::io(std::io::Error::other(e.to_string()), path)
}

fn x_range(start: f64, stop: f64) -> std::ops::Range<f64> {
    if stop > start {
        start..stop
    } else {
        start..start + 1.0
    }
}

fn positive_or_one(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        1.0
    }
}

fn window_max(times: &[f64], values: &[f64], start: f64, stop: f64) -> f64 {
    times
        .iter()
        .zip(values)
        .filter(|&(&t, _)| t > start && t < stop)
        .map(|(_, &v)| v)
        .fold(0.0, f64::max)
}

/// Fit trace of one compound against the TIC, zoomed on `(start, stop)`.
///
/// The TIC is rescaled so that its largest value in the window sits at
/// 1.2 times the largest fitted value in the window.
pub fn plot_fit_vs_tic(
    path: &Path,
    title: &str,
    times: &[f64],
    fit: &[f64],
    tic: &[f64],
    start: f64,
    stop: f64,
) -> Result<()> {
    let fit_max = positive_or_one(window_max(times, fit, start, stop));
    let tic_max = positive_or_one(window_max(times, tic, start, stop));
    let scale = fit_max * TIC_SCALE / tic_max;

    let draw = || -> PlotResult {
        let root = SVGBackend::new(path, PLOT_SIZE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 25))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(x_range(start, stop), 0.0..fit_max * Y_HEADROOM)?;
        chart
            .configure_mesh()
            .x_desc("Time (min)")
            .y_desc("Fit coefficient")
            .draw()?;

        chart.draw_series(LineSeries::new(
            times.iter().zip(fit).map(|(&t, &v)| (t, v)),
            &BLUE,
        ))?;
        chart.draw_series(LineSeries::new(
            times.iter().zip(tic).map(|(&t, &v)| (t, v * scale)),
            &RGBColor(128, 128, 128),
        ))?;
        root.present()?;
        Ok(())
    };
    draw().map_err(|e| plot_error(path, e))
}

/// One fit trace per calibration standard, zoomed on `(start, stop)`.
pub fn plot_fit_overlay(
    path: &Path,
    title: &str,
    traces: &[(Vec<f64>, Vec<f64>)],
    start: f64,
    stop: f64,
) -> Result<()> {
    let y_max = traces
        .iter()
        .map(|(times, values)| window_max(times, values, start, stop))
        .fold(0.0, f64::max);
    let y_max = positive_or_one(y_max) * Y_HEADROOM;

    let draw = || -> PlotResult {
        let root = SVGBackend::new(path, PLOT_SIZE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 25))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(x_range(start, stop), 0.0..y_max)?;
        chart
            .configure_mesh()
            .x_desc("Time (min)")
            .y_desc("Fit coefficient")
            .draw()?;
        for (i, (times, values)) in traces.iter().enumerate() {
            let color = PALETTE[i % PALETTE.len()];
            chart.draw_series(LineSeries::new(
                times.iter().zip(values).map(|(&t, &v)| (t, v)),
                &color,
            ))?;
        }
        root.present()?;
        Ok(())
    };
    draw().map_err(|e| plot_error(path, e))
}

/// Standards as points with the regression line and its parameters.
pub fn plot_calibration_curve(
    path: &Path,
    title: &str,
    concentrations: &[f64],
    responses: &[f64],
    regression: &Regression,
) -> Result<()> {
    let x_max = positive_or_one(concentrations.iter().copied().fold(0.0, f64::max)) * 1.1;
    let y_top = responses
        .iter()
        .copied()
        .chain([regression.predict(x_max)])
        .fold(0.0, f64::max);
    let y_bottom = responses
        .iter()
        .copied()
        .chain([regression.predict(0.0)])
        .fold(0.0, f64::min);
    let y_top = positive_or_one(y_top) * 1.1;
    let caption = format!(
        "Slope: {:.2}  Intercept: {:.2}  R^2: {:.5}",
        regression.slope,
        regression.intercept,
        regression.r_squared()
    );

    let draw = || -> PlotResult {
        let root = SVGBackend::new(path, PLOT_SIZE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 25))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(0.0..x_max, y_bottom..y_top)?;
        chart
            .configure_mesh()
            .x_desc("Concentration")
            .y_desc("Response")
            .draw()?;

        chart.draw_series(LineSeries::new(
            [0.0, x_max].into_iter().map(|x| (x, regression.predict(x))),
            &BLACK,
        ))?;
        chart.draw_series(
            concentrations
                .iter()
                .zip(responses)
                .map(|(&x, &y)| Circle::new((x, y), 5, BLUE.filled())),
        )?;
        chart.draw_series(std::iter::once(Text::new(
            caption.clone(),
            (x_max * 0.05, y_bottom + (y_top - y_bottom) * 0.9),
            ("sans-serif", 18).into_font(),
        )))?;
        root.present()?;
        Ok(())
    };
    draw().map_err(|e| plot_error(path, e))
}
