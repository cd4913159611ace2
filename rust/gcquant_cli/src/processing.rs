use indicatif::{
    ParallelProgressIterator,
    ProgressBar,
    ProgressIterator,
    ProgressStyle,
};
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{
    info,
    warn,
};

use gcquant::calibration::{
    calibrate_compound,
    CalibrationSet,
    CalibrationTable,
};
use gcquant::quantification::{
    list_data_files,
    quantify_file,
    write_concentration_table,
    write_integration_table,
    SampleResult,
};
use gcquant::{
    GcmsError,
    ReferenceSet,
};

use crate::config::Config;
use crate::error::CliError;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})";

fn progress_style() -> Result<ProgressStyle, CliError> {
    ProgressStyle::with_template(PROGRESS_TEMPLATE).map_err(|e| CliError::Config(e.to_string()))
}

/// Globally fatal errors end the batch, anything else skips the unit.
fn skip_or_abort(unit: &str, err: GcmsError) -> Result<(), CliError> {
    if err.is_globally_fatal() {
        return Err(err.into());
    }
    warn!("Skipping {}: {}", unit, err);
    Ok(())
}

pub fn run_calibration(config: &Config, references: &ReferenceSet) -> Result<(), CliError> {
    let start = Instant::now();
    let attributes = config.calibration_attributes();
    let settings = config.analysis_settings(&attributes);
    let folder = &config.calibration.folder;

    let mut sets = Vec::new();
    for (column, compound) in references.compounds().iter().enumerate() {
        match CalibrationSet::load(folder, &compound.name) {
            Ok(Some(set)) => sets.push((column, set)),
            Ok(None) => {}
            Err(e) => skip_or_abort(&compound.name, e)?,
        }
    }
    info!(
        "Found calibration sets for {} of {} reference compounds",
        sets.len(),
        references.len()
    );

    let mut table = CalibrationTable::new(attributes.clone());
    let mut nskipped_files = 0;
    for (column, set) in sets.iter().progress_with_style(progress_style()?) {
        let plot_dir = config.plots.then(|| folder.join(&set.compound));
        match calibrate_compound(
            set,
            *column,
            references,
            &settings,
            &attributes.calibration_type,
            plot_dir.as_deref(),
        ) {
            Ok(cal) => {
                nskipped_files += cal.skipped.len();
                table.push(cal.row);
            }
            Err(e) => skip_or_abort(&set.compound, e)?,
        }
    }

    table.write(&config.calibration.table_path)?;
    info!(
        "Calibrated {} compounds ({} standards skipped) in {:?}",
        table.rows().len(),
        nskipped_files,
        start.elapsed()
    );
    Ok(())
}

pub fn run_quantification(config: &Config, references: &ReferenceSet) -> Result<(), CliError> {
    let start = Instant::now();
    let table = CalibrationTable::read(&config.calibration.table_path)?;
    let consistency = table.check_consistency(&config.calibration_attributes());
    // Stored settings win over the requested ones.
    let settings = config.analysis_settings(table.attributes());

    let files = list_data_files(&config.data.folder)?;
    info!(
        "Quantifying {} files against {} calibrated compounds",
        files.len(),
        table.rows().len()
    );
    let plot_dir = config.plots.then(|| config.data.folder.clone());

    let pb = ProgressBar::new(files.len() as u64).with_style(progress_style()?);
    let outcomes: Vec<(PathBuf, Result<SampleResult, GcmsError>)> = files
        .par_iter()
        .progress_with(pb)
        .map(|path| {
            let res = quantify_file(path, references, &settings, &table, plot_dir.as_deref());
            (path.clone(), res)
        })
        .collect();

    let mut results = Vec::with_capacity(outcomes.len());
    for (path, res) in outcomes {
        match res {
            Ok(r) => results.push(r),
            Err(e) => skip_or_abort(&path.display().to_string(), e)?,
        }
    }

    let compounds = table.compound_names();
    write_concentration_table(&config.data.concentration_table, &compounds, &results)?;
    write_integration_table(&config.data.integration_table, &compounds, &results)?;

    let nerrors: usize = results.iter().map(|r| r.errors.len()).sum();
    let nnumerical: usize = results.iter().map(|r| r.numerical_warnings).sum();
    info!(
        "Quantified {} of {} files in {:?} ({} compound errors, {} numerical warnings, {} consistency warnings)",
        results.len(),
        files.len(),
        start.elapsed(),
        nerrors,
        nnumerical,
        consistency.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CalibrationConfig,
        DataConfig,
    };

    #[test]
    fn test_empty_folders_produce_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("octane.txt"), "50 100\n").unwrap();
        std::fs::write(root.join("refs.txt"), "octane.txt\n").unwrap();
        std::fs::create_dir_all(root.join("calibration")).unwrap();
        std::fs::create_dir_all(root.join("data")).unwrap();

        let config = Config {
            reference_path: root.join("refs.txt"),
            calibration: CalibrationConfig {
                folder: root.join("calibration"),
                table_path: root.join("out").join("cal.parquet"),
            },
            data: DataConfig {
                folder: root.join("data"),
                concentration_table: root.join("conc_data.csv"),
                integration_table: root.join("int_data.csv"),
            },
            plots: false,
            ..Config::default()
        };
        let references = ReferenceSet::load(&config.reference_path).unwrap();

        run_calibration(&config, &references).unwrap();
        let table = CalibrationTable::read(&config.calibration.table_path).unwrap();
        assert!(table.rows().is_empty());
        assert_eq!(table.attributes(), &config.calibration_attributes());

        run_quantification(&config, &references).unwrap();
        let conc = std::fs::read_to_string(&config.data.concentration_table).unwrap();
        assert_eq!(conc, "fname\n");
        let ints = std::fs::read_to_string(&config.data.integration_table).unwrap();
        assert_eq!(ints, "fname,cpd_name\n");
    }

    #[test]
    fn test_missing_calibration_table_aborts_quantification() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("octane.txt"), "50 100\n").unwrap();
        std::fs::write(dir.path().join("refs.txt"), "octane.txt\n").unwrap();
        let config = Config {
            reference_path: dir.path().join("refs.txt"),
            calibration: CalibrationConfig {
                folder: dir.path().join("calibration"),
                table_path: dir.path().join("missing.parquet"),
            },
            ..Config::default()
        };
        let references = ReferenceSet::load(&config.reference_path).unwrap();
        assert!(matches!(
            run_quantification(&config, &references),
            Err(CliError::Gcms(GcmsError::Storage { .. }))
        ));
    }
}
