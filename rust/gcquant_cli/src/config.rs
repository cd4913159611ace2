use serde::{
    Deserialize,
    Serialize,
};
use std::path::{
    Path,
    PathBuf,
};

use gcquant::calibration::{
    CalibrationAttributes,
    CalibrationType,
};
use gcquant::{
    AnalysisSettings,
    BackgroundNormalization,
    BackgroundSpec,
    DuplicateMassPolicy,
    IntegrationMode,
    RtFilter,
};

use crate::cli::{
    CalTypeArg,
    RunArgs,
};
use crate::error::CliError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub reference_path: PathBuf,
    pub background: BackgroundConfig,
    pub rt_filter: Option<RtFilter>,
    pub integration_mode: IntegrationMode,
    pub duplicate_mass_policy: DuplicateMassPolicy,
    pub background_normalization: BackgroundNormalization,
    pub calibration: CalibrationConfig,
    pub data: DataConfig,
    pub calibration_type: CalibrationType,
    pub workers: Option<usize>,
    pub plots: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BackgroundConfig {
    pub enabled: bool,
    /// Minutes.
    pub time: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CalibrationConfig {
    pub folder: PathBuf,
    pub table_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub folder: PathBuf,
    pub concentration_table: PathBuf,
    pub integration_table: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference_path: PathBuf::from("reference_files.txt"),
            background: BackgroundConfig::default(),
            rt_filter: None,
            integration_mode: IntegrationMode::default(),
            duplicate_mass_policy: DuplicateMassPolicy::default(),
            background_normalization: BackgroundNormalization::default(),
            calibration: CalibrationConfig::default(),
            data: DataConfig::default(),
            calibration_type: CalibrationType::default(),
            workers: None,
            plots: true,
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time: 0.0,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("calibration"),
            table_path: PathBuf::from("cal.parquet"),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("data"),
            concentration_table: PathBuf::from("conc_data.csv"),
            integration_table: PathBuf::from("int_data.csv"),
        }
    }
}

const DEFAULT_STANDARD: &str = "octane";
const DEFAULT_STD_WINDOW: (f64, f64) = (7.0, 7.4);

/// Standard flags only take effect for an internal standard calibration.
fn apply_cal_type_args(current: CalibrationType, args: &RunArgs) -> CalibrationType {
    let base = match (args.cal_type, current) {
        (Some(CalTypeArg::Conc), _) => return CalibrationType::Concentration,
        (None, CalibrationType::Concentration) => return CalibrationType::Concentration,
        (Some(CalTypeArg::Internal), CalibrationType::Concentration) => (
            DEFAULT_STANDARD.to_string(),
            DEFAULT_STD_WINDOW.0,
            DEFAULT_STD_WINDOW.1,
        ),
        (_, CalibrationType::InternalStandard { name, start, stop }) => (name, start, stop),
    };
    let (name, start, stop) = base;
    CalibrationType::InternalStandard {
        name: args.standard.clone().unwrap_or(name),
        start: args.std_start.unwrap_or(start),
        stop: args.std_stop.unwrap_or(stop),
    }
}

impl Config {
    /// Reads `path`, or returns the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| {
                    CliError::Config(format!("cannot read {}: {}", p.display(), e))
                })?;
                Ok(serde_json::from_str(&text)?)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn with_cli_args(mut self, args: &RunArgs) -> Self {
        if let Some(p) = &args.reference_path {
            self.reference_path = p.clone();
        }
        if args.no_background {
            self.background.enabled = false;
        }
        if let Some(t) = args.background_time {
            self.background.time = t;
        }
        if let Some(f) = &args.calibration_folder {
            self.calibration.folder = f.clone();
        }
        if let Some(t) = &args.calibration_table {
            self.calibration.table_path = t.clone();
        }
        if let Some(f) = &args.data_folder {
            self.data.folder = f.clone();
        }
        self.calibration_type = apply_cal_type_args(self.calibration_type, args);
        if args.workers.is_some() {
            self.workers = args.workers;
        }
        if args.no_plots {
            self.plots = false;
        }
        self
    }

    pub fn validate(&self) -> Result<(), CliError> {
        if let Some(filter) = &self.rt_filter {
            if !(filter.window > 0.0) {
                return Err(CliError::Config(format!(
                    "rt_filter.window must be positive, got {}",
                    filter.window
                )));
            }
        }
        if self.workers == Some(0) {
            return Err(CliError::Config("workers must be at least 1".to_string()));
        }
        if let CalibrationType::InternalStandard { start, stop, .. } = &self.calibration_type {
            if start >= stop {
                return Err(CliError::Config(format!(
                    "internal standard window ({}, {}) is empty",
                    start, stop
                )));
            }
        }
        Ok(())
    }

    /// Settings recorded with (or checked against) the calibration table.
    pub fn calibration_attributes(&self) -> CalibrationAttributes {
        CalibrationAttributes {
            background_enabled: self.background.enabled,
            background_time: self.background.time,
            calibration_type: self.calibration_type.clone(),
        }
    }

    /// Pipeline settings, taking background choices from `attributes`.
    pub fn analysis_settings(&self, attributes: &CalibrationAttributes) -> AnalysisSettings {
        AnalysisSettings {
            background: attributes.background_enabled.then_some(BackgroundSpec {
                time: attributes.background_time,
                normalization: self.background_normalization,
            }),
            rt_filter: self.rt_filter,
            integration_mode: self.integration_mode,
            duplicate_mass_policy: self.duplicate_mass_policy,
        }
    }

    /// Fully populated example configuration.
    pub fn template() -> Self {
        Self {
            rt_filter: Some(RtFilter {
                window: 0.25,
                adjust: 0.0,
            }),
            calibration_type: CalibrationType::InternalStandard {
                name: "octane".to_string(),
                start: 7.0,
                stop: 7.4,
            },
            workers: Some(4),
            ..Self::default()
        }
    }
}
