use std::path::{
    Path,
    PathBuf,
};

use rayon::prelude::*;
use tracing::{
    info,
    instrument,
    warn,
};

use super::{
    linregress,
    CalibrationError,
    CalibrationRow,
    CalibrationSet,
    CalibrationType,
    Regression,
};
use crate::analysis::{
    AnalysisSettings,
    AnalyzedRun,
};
use crate::errors::{
    GcmsError,
    Result,
};
use crate::library::ReferenceSet;
use crate::plotting::{
    plot_calibration_curve,
    plot_fit_overlay,
};

/// Outcome of calibrating one compound.
#[derive(Debug)]
pub struct CompoundCalibration {
    pub row: CalibrationRow,
    pub regression: Regression,
    pub concentrations: Vec<f64>,
    pub responses: Vec<f64>,
    /// Standards that could not be analyzed, with the reason.
    pub skipped: Vec<(PathBuf, GcmsError)>,
}

struct StandardResult {
    concentration: f64,
    response: f64,
    times: Vec<f64>,
    trace: Vec<f64>,
}

fn analyze_standard(
    file: &Path,
    concentration: f64,
    column: usize,
    set: &CalibrationSet,
    references: &ReferenceSet,
    settings: &AnalysisSettings,
    kind: &CalibrationType,
) -> Result<StandardResult> {
    let mut analyzed = AnalyzedRun::from_path(file, references, settings)?;
    let response = analyzed.response(column, set.start, set.stop, kind)?;
    let trace = analyzed.fit().trace(column).unwrap_or_default();
    Ok(StandardResult {
        concentration,
        response,
        times: analyzed.run().times().to_vec(),
        trace,
    })
}

/// Analyzes every standard of `set`, regresses response on concentration
/// and, when `plot_dir` is given, renders the fit overlay and the curve.
///
/// A standard that fails to load is skipped. Storage failures abort.
#[instrument(level = "info", skip(set, references, settings, kind, plot_dir), fields(compound = %set.compound))]
pub fn calibrate_compound(
    set: &CalibrationSet,
    column: usize,
    references: &ReferenceSet,
    settings: &AnalysisSettings,
    kind: &CalibrationType,
    plot_dir: Option<&Path>,
) -> Result<CompoundCalibration> {
    let reference_column_index = i16::try_from(column).map_err(|_| {
        GcmsError::format(
            format!("library column {} does not fit the calibration table", column),
            None,
        )
    })?;

    let results: Vec<(PathBuf, Result<StandardResult>)> = set
        .points
        .par_iter()
        .map(|point| {
            let res = analyze_standard(
                &point.file,
                point.concentration,
                column,
                set,
                references,
                settings,
                kind,
            );
            (point.file.clone(), res)
        })
        .collect();

    let mut standards = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();
    for (file, res) in results {
        match res {
            Ok(s) => standards.push(s),
            Err(e) if e.is_globally_fatal() => return Err(e),
            Err(e) => {
                warn!("Skipping standard {}: {}", file.display(), e);
                skipped.push((file, e));
            }
        }
    }
    if standards.is_empty() && !set.points.is_empty() {
        return Err(CalibrationError::NoPoints.into());
    }

    let concentrations: Vec<f64> = standards.iter().map(|s| s.concentration).collect();
    let responses: Vec<f64> = standards.iter().map(|s| s.response).collect();
    let regression = linregress(&concentrations, &responses)?;
    info!(
        "{}: slope {:.4}, intercept {:.4}, R^2 {:.5} from {} standards",
        set.compound,
        regression.slope,
        regression.intercept,
        regression.r_squared(),
        standards.len()
    );

    if let Some(dir) = plot_dir {
        let traces: Vec<(Vec<f64>, Vec<f64>)> = standards
            .iter()
            .map(|s| (s.times.clone(), s.trace.clone()))
            .collect();
        let fits_path = dir.join(format!("{}_fits.svg", set.compound));
        if let Err(e) = plot_fit_overlay(&fits_path, &set.compound, &traces, set.start, set.stop) {
            warn!("Could not draw {}: {}", fits_path.display(), e);
        }
        let curve_path = dir.join(format!("{}_cal_curve.svg", set.compound));
        if let Err(e) = plot_calibration_curve(
            &curve_path,
            &set.compound,
            &concentrations,
            &responses,
            &regression,
        ) {
            warn!("Could not draw {}: {}", curve_path.display(), e);
        }
    }

    let row = CalibrationRow {
        compound_name: set.compound.clone(),
        window_start: set.start,
        window_stop: set.stop,
        slope: regression.slope,
        intercept: regression.intercept,
        r: regression.r,
        p: regression.p,
        stderr: regression.stderr,
        reference_column_index,
    };

    Ok(CompoundCalibration {
        row,
        regression,
        concentrations,
        responses,
        skipped,
    })
}
