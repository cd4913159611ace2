use std::fs;
use std::path::Path;

use gcquant::calibration::{
    calibrate_compound,
    CalibrationAttributes,
    CalibrationSet,
    CalibrationTable,
    CalibrationType,
};
use gcquant::decoder::read_aia_file;
use gcquant::quantification::{
    list_data_files,
    quantify_file,
    write_concentration_table,
    write_integration_table,
};
use gcquant::{
    AnalysisSettings,
    BackgroundNormalization,
    BackgroundSpec,
    DecodedRun,
    DuplicateMassPolicy,
    GcmsError,
    ReferenceSet,
    RtFilter,
};
use netcdf3::{
    DataSet,
    FileWriter,
    Version,
};

/// Writes an AIA file with one `(mass, intensity)` list per scan.
fn write_aia(path: &Path, times_seconds: &[f64], scans: &[Vec<(f64, f32)>], with_intensity: bool) {
    let counts: Vec<i32> = scans.iter().map(|s| s.len() as i32).collect();
    let masses: Vec<f64> = scans.iter().flatten().map(|&(m, _)| m).collect();
    let intensities: Vec<f32> = scans.iter().flatten().map(|&(_, i)| i).collect();

    let mut ds = DataSet::new();
    ds.add_fixed_dim("scan_number", scans.len()).unwrap();
    ds.add_fixed_dim("point_number", masses.len()).unwrap();
    ds.add_var_i32("point_count", &["scan_number"]).unwrap();
    ds.add_var_f64("scan_acquisition_time", &["scan_number"]).unwrap();
    ds.add_var_f64("mass_values", &["point_number"]).unwrap();
    if with_intensity {
        ds.add_var_f32("intensity_values", &["point_number"]).unwrap();
    }

    let mut writer = FileWriter::open(path).unwrap();
    writer.set_def(&ds, Version::Classic, 0).unwrap();
    writer.write_var_i32("point_count", &counts).unwrap();
    writer
        .write_var_f64("scan_acquisition_time", times_seconds)
        .unwrap();
    writer.write_var_f64("mass_values", &masses).unwrap();
    if with_intensity {
        writer.write_var_f32("intensity_values", &intensities).unwrap();
    }
    writer.close().unwrap();
}

const TIMES_SECONDS: [f64; 4] = [60.0, 120.0, 180.0, 240.0];

/// Octane (mass 50) elutes at 2 min, nonane (mass 52) at 3 min, with a
/// constant baseline at mass 51.
fn write_sample(path: &Path, octane: f32, nonane: f32) {
    let scans = vec![
        vec![(50.0, 0.0), (51.0, 1.0), (52.0, 0.0)],
        vec![(50.0, 10.0 * octane), (51.0, 1.0), (52.0, 0.0)],
        vec![(50.0, 0.0), (51.0, 1.0), (52.0, 10.0 * nonane)],
        vec![(50.0, 0.0), (51.0, 1.0), (52.0, 0.0)],
    ];
    write_aia(path, &TIMES_SECONDS, &scans, true);
}

fn write_library(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("library.msl");
    fs::write(
        &path,
        "NAME: octane\nRT: 2.0\nNUM PEAKS: 1\n(50 100)\n\nNAME: nonane\nRT: 3.0\nNUM PEAKS: 1\n(52 100)\n",
    )
    .unwrap();
    path
}

fn settings(rt_filter: Option<RtFilter>) -> AnalysisSettings {
    AnalysisSettings {
        background: Some(BackgroundSpec {
            time: 1.0,
            normalization: BackgroundNormalization::Normalized,
        }),
        rt_filter,
        ..Default::default()
    }
}

#[test]
fn test_aia_file_decodes_to_dense_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.CDF");
    let scans = vec![
        vec![(50.2, 4.0), (50.4, 8.0), (53.0, 1.0)],
        vec![],
        vec![(51.6, 3.0)],
    ];
    write_aia(&path, &[30.0, 60.0, 90.0], &scans, true);

    let raw = read_aia_file(&path).unwrap();
    assert_eq!(raw.num_scans(), 3);
    assert_eq!(raw.num_points(), 4);

    let run = DecodedRun::from_path(&path, DuplicateMassPolicy::Mean).unwrap();
    assert_eq!(run.times(), &[0.5, 1.0, 1.5]);
    let axis = run.mass_axis();
    assert_eq!((axis.min(), axis.max()), (50, 53));
    assert_eq!(run.intensity().get_row(0).unwrap(), &[6.0, 0.0, 0.0, 1.0]);
    assert_eq!(run.intensity().get_row(1).unwrap(), &[0.0, 0.0, 0.0, 0.0]);
    assert_eq!(run.intensity().get_row(2).unwrap(), &[0.0, 0.0, 3.0, 0.0]);

    let summed = DecodedRun::from_path(&path, DuplicateMassPolicy::Sum).unwrap();
    assert_eq!(summed.intensity().get(0, 0), Some(12.0));
}

#[test]
fn test_missing_field_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.CDF");
    write_aia(&path, &[60.0], &[vec![(50.0, 1.0)]], false);
    let res = read_aia_file(&path);
    assert!(matches!(res, Err(GcmsError::Format { .. })), "{:?}", res);
}

#[test]
fn test_not_a_netcdf_file_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("text.CDF");
    fs::write(&path, "definitely not netcdf").unwrap();
    assert!(matches!(
        read_aia_file(&path),
        Err(GcmsError::Format { .. })
    ));
}

fn calibrate_and_quantify(rt_filter: Option<RtFilter>) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let references = ReferenceSet::load(&write_library(root)).unwrap();
    let settings = settings(rt_filter);

    let cal_folder = root.join("calibration");
    fs::create_dir_all(cal_folder.join("octane")).unwrap();
    fs::write(
        cal_folder.join("octane.csv"),
        "Name,octane,Start,1.5,Stop,2.5\nstd1.CDF,1\nstd2.CDF,2\n# bad run removed\nstd3.CDF,3\nmissing.CDF,4\n",
    )
    .unwrap();
    for (i, conc) in [1.0, 2.0, 3.0].iter().enumerate() {
        write_sample(
            &cal_folder.join("octane").join(format!("std{}.CDF", i + 1)),
            *conc,
            0.5,
        );
    }

    assert!(CalibrationSet::load(&cal_folder, "nonane").unwrap().is_none());
    let set = CalibrationSet::load(&cal_folder, "octane").unwrap().unwrap();
    let kind = CalibrationType::Concentration;
    let plot_dir = cal_folder.join("octane");
    let cal = calibrate_compound(&set, 0, &references, &settings, &kind, Some(&plot_dir)).unwrap();

    assert_eq!(cal.skipped.len(), 1, "missing standard is skipped");
    assert!((cal.regression.slope - 10.0).abs() < 1e-6, "{:?}", cal.regression);
    assert!(cal.regression.intercept.abs() < 1e-6, "{:?}", cal.regression);
    assert!(cal.regression.r_squared() > 0.99);
    assert_eq!(cal.row.reference_column_index, 0);
    assert!(plot_dir.join("octane_fits.svg").exists());
    assert!(plot_dir.join("octane_cal_curve.svg").exists());

    let attributes = CalibrationAttributes {
        background_enabled: true,
        background_time: 1.0,
        calibration_type: kind,
    };
    let mut table = CalibrationTable::new(attributes.clone());
    table.push(cal.row);
    let table_path = root.join("cal.parquet");
    table.write(&table_path).unwrap();
    let table = CalibrationTable::read(&table_path).unwrap();
    assert!(table.check_consistency(&attributes).is_empty());

    let data = root.join("data");
    fs::create_dir_all(&data).unwrap();
    write_sample(&data.join("sample.CDF"), 2.5, 1.0);
    fs::write(data.join("notes.txt"), "ignored").unwrap();

    let files = list_data_files(&data).unwrap();
    assert_eq!(files.len(), 1);
    let result = quantify_file(&files[0], &references, &settings, &table, Some(&data)).unwrap();
    assert_eq!(result.sample, "sample");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let conc = result.concentrations[0].unwrap();
    assert!((conc - 2.5).abs() < 1e-6, "concentration {}", conc);
    assert!(data.join("sample_octane.svg").exists());

    let integ = &result.integrations[0];
    assert_eq!(integ.compound, "octane");
    // Octane and the background split the window: 25 and 1.
    let fraction = integ.fractions[0].unwrap();
    assert!((fraction - 25.0 / 26.0).abs() < 1e-9, "fraction {}", fraction);

    let conc_path = root.join("conc_data.csv");
    let int_path = root.join("int_data.csv");
    let results = vec![result];
    write_concentration_table(&conc_path, &table.compound_names(), &results).unwrap();
    write_integration_table(&int_path, &table.compound_names(), &results).unwrap();
    let text = fs::read_to_string(&conc_path).unwrap();
    assert!(text.starts_with("fname,octane\nsample,"), "{}", text);
    let text = fs::read_to_string(&int_path).unwrap();
    assert!(text.starts_with("fname,cpd_name,octane,octane_per\n"), "{}", text);
}

#[test]
fn test_calibrate_then_quantify() {
    calibrate_and_quantify(None);
}

#[test]
fn test_calibrate_then_quantify_with_rt_gate() {
    calibrate_and_quantify(Some(RtFilter {
        window: 0.5,
        adjust: 0.0,
    }));
}

#[test]
fn test_stale_column_index_is_resolved_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    // Library order is reversed relative to the calibration run.
    let lib = root.join("library.msl");
    fs::write(
        &lib,
        "NAME: nonane\nRT: 3.0\nNUM PEAKS: 1\n(52 100)\n\nNAME: octane\nRT: 2.0\nNUM PEAKS: 1\n(50 100)\n",
    )
    .unwrap();
    let references = ReferenceSet::load(&lib).unwrap();

    let mut table = CalibrationTable::new(CalibrationAttributes {
        background_enabled: true,
        background_time: 1.0,
        calibration_type: CalibrationType::Concentration,
    });
    for (name, col) in [("octane", 0), ("hexane", 1)] {
        table.push(gcquant::calibration::CalibrationRow {
            compound_name: name.into(),
            window_start: 1.5,
            window_stop: 2.5,
            slope: 10.0,
            intercept: 0.0,
            reference_column_index: col,
            ..Default::default()
        });
    }

    let sample = root.join("sample.CDF");
    write_sample(&sample, 2.0, 1.0);
    let result = quantify_file(&sample, &references, &settings(None), &table, None).unwrap();
    let conc = result.concentrations[0].unwrap();
    assert!((conc - 2.0).abs() < 1e-6, "concentration {}", conc);
    assert_eq!(result.concentrations[1], None);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(result.errors[0], GcmsError::Lookup { .. }));
}
