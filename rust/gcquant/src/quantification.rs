//! Sample quantification against a calibration table.

use std::path::{
    Path,
    PathBuf,
};

use tracing::{
    debug,
    instrument,
    warn,
};

use crate::analysis::{
    AnalysisSettings,
    AnalyzedRun,
};
use crate::calibration::{
    CalibrationRow,
    CalibrationTable,
};
use crate::errors::{
    GcmsError,
    Result,
};
use crate::library::{
    ReferenceLibrary,
    ReferenceSet,
};
use crate::plotting::plot_fit_vs_tic;
use crate::storage::replace_atomically;

const DATA_EXTENSION: &str = "cdf";

/// `*.CDF` files of `folder`, sorted by name.
pub fn list_data_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(folder).map_err(|e| GcmsError::io(e, folder))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| GcmsError::io(e, folder))?.path();
        let is_data = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case(DATA_EXTENSION))
            .unwrap_or(false);
        if is_data && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Library column of a calibrated compound in the current library.
///
/// The stored index is trusted only if it still names the same compound.
pub fn resolve_column(library: &ReferenceLibrary, row: &CalibrationRow) -> Result<usize> {
    let stored = usize::try_from(row.reference_column_index).ok();
    if let Some(idx) = stored {
        if library.names().get(idx) == Some(&row.compound_name) {
            return Ok(idx);
        }
    }
    match library.index_of(&row.compound_name) {
        Some(idx) => {
            debug!(
                "{}: stored column {} remapped to {}",
                row.compound_name, row.reference_column_index, idx
            );
            Ok(idx)
        }
        None => Err(GcmsError::lookup(
            row.compound_name.clone(),
            "calibrated compound is not in the reference library",
        )),
    }
}

/// Areas over one calibration window, reported per calibrated compound.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowIntegration {
    pub compound: String,
    /// One entry per calibrated compound, `None` where it is not in the library.
    pub areas: Vec<Option<f64>>,
    /// Area as a fraction of all fitted area in the window.
    pub fractions: Vec<Option<f64>>,
}

#[derive(Debug)]
pub struct SampleResult {
    pub sample: String,
    /// One entry per calibration row.
    pub concentrations: Vec<Option<f64>>,
    pub integrations: Vec<WindowIntegration>,
    /// Per-compound failures that did not stop the sample.
    pub errors: Vec<GcmsError>,
    pub numerical_warnings: usize,
}

/// Quantifies every calibrated compound in one sample file.
///
/// `plot_dir` receives one `<sample>_<compound>.svg` fit plot per compound.
#[instrument(level = "info", skip(references, settings, table, plot_dir))]
pub fn quantify_file(
    path: &Path,
    references: &ReferenceSet,
    settings: &AnalysisSettings,
    table: &CalibrationTable,
    plot_dir: Option<&Path>,
) -> Result<SampleResult> {
    let mut analyzed = AnalyzedRun::from_path(path, references, settings)?;
    let sample = analyzed.sample_name();
    let kind = &table.attributes().calibration_type;

    let cal_columns: Vec<Option<usize>> = table
        .rows()
        .iter()
        .map(|row| resolve_column(analyzed.library(), row).ok())
        .collect();

    let mut concentrations = Vec::with_capacity(table.rows().len());
    let mut integrations = Vec::with_capacity(table.rows().len());
    let mut errors = Vec::new();

    let divisor = match analyzed.standard_area(kind) {
        Ok(d) => Some(d),
        Err(e) if e.is_globally_fatal() => return Err(e),
        Err(e) => {
            warn!("{}: {}", sample, e);
            errors.push(e);
            None
        }
    };

    for (row, column) in table.rows().iter().zip(cal_columns.iter()) {
        let areas = analyzed.integrate(row.window_start, row.window_stop)?;
        let total: f64 = areas.iter().sum();
        let (cal_areas, fractions): (Vec<Option<f64>>, Vec<Option<f64>>) = cal_columns
            .iter()
            .map(|c| {
                c.map(|i| {
                    let area = areas[i];
                    let fraction = if total > 0.0 { area / total } else { 0.0 };
                    (area, fraction)
                })
                .unzip()
            })
            .unzip();
        integrations.push(WindowIntegration {
            compound: row.compound_name.clone(),
            areas: cal_areas,
            fractions,
        });

        let Some(column) = *column else {
            let e = GcmsError::lookup(
                row.compound_name.clone(),
                "calibrated compound is not in the reference library",
            );
            warn!("{}: {}", sample, e);
            errors.push(e);
            concentrations.push(None);
            continue;
        };
        let concentration = divisor.map(|d| row.concentration(areas[column] / d));
        concentrations.push(concentration);

        if let (Some(dir), Some(conc)) = (plot_dir, concentration) {
            let plot_path = dir.join(format!("{}_{}.svg", sample, row.compound_name));
            let trace = analyzed.fit().trace(column).unwrap_or_default();
            let run = analyzed.run();
            if let Err(e) = plot_fit_vs_tic(
                &plot_path,
                &format!("Concentration = {:.2}", conc),
                run.times(),
                &trace,
                run.tic(),
                row.window_start,
                row.window_stop,
            ) {
                warn!("Could not draw {}: {}", plot_path.display(), e);
            }
        }
    }

    Ok(SampleResult {
        sample,
        concentrations,
        integrations,
        errors,
        numerical_warnings: analyzed.warnings().len(),
    })
}

fn cell(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

/// Writes the concentration table: `fname` then one column per compound.
pub fn write_concentration_table(
    path: &Path,
    compounds: &[&str],
    results: &[SampleResult],
) -> Result<()> {
    replace_atomically(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        let mut header = vec!["fname".to_string()];
        header.extend(compounds.iter().map(|c| c.to_string()));
        writer.write_record(&header)?;
        for res in results {
            let mut record = vec![res.sample.clone()];
            record.extend(res.concentrations.iter().map(|c| cell(*c)));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Writes the raw integration table: one row per sample and window, with
/// `<compound>` area and `<compound>_per` area fraction columns.
pub fn write_integration_table(
    path: &Path,
    compounds: &[&str],
    results: &[SampleResult],
) -> Result<()> {
    replace_atomically(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        let mut header = vec!["fname".to_string(), "cpd_name".to_string()];
        header.extend(compounds.iter().map(|c| c.to_string()));
        header.extend(compounds.iter().map(|c| format!("{}_per", c)));
        writer.write_record(&header)?;
        for res in results {
            for integ in res.integrations.iter() {
                let mut record = vec![res.sample.clone(), integ.compound.clone()];
                record.extend(integ.areas.iter().map(|a| cell(*a)));
                record.extend(integ.fractions.iter().map(|p| cell(*p)));
                writer.write_record(&record)?;
            }
        }
        writer.flush()?;
        Ok(())
    })
}
