//! Calibration curves: calibration-set files, regression and the
//! persisted calibration table.

mod regression;
mod run;
mod table;

pub use regression::{
    linregress,
    Regression,
};
pub use run::{
    calibrate_compound,
    CompoundCalibration,
};
pub use table::{
    CalibrationAttributes,
    CalibrationRow,
    CalibrationTable,
};

use std::path::{
    Path,
    PathBuf,
};

use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    warn,
};

use crate::errors::{
    GcmsError,
    Result,
};

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Returned when a regression is attempted with no points.
    NoPoints,
    /// Returned when fewer than two points are available.
    InsufficientPoints(usize),
    /// Returned when x and y have different lengths.
    MismatchedLengths { x: usize, y: usize },
    /// Returned when all concentrations are identical.
    ZeroVariance,
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationError::NoPoints => write!(f, "no calibration points"),
            CalibrationError::InsufficientPoints(n) => {
                write!(f, "{} calibration point(s), at least 2 are needed", n)
            }
            CalibrationError::MismatchedLengths { x, y } => {
                write!(f, "{} concentrations for {} areas", x, y)
            }
            CalibrationError::ZeroVariance => write!(f, "all concentrations are identical"),
        }
    }
}

impl std::error::Error for CalibrationError {}

/// How areas are turned into the quantity regressed against concentration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CalibrationType {
    /// Raw compound area.
    #[default]
    Concentration,
    /// Compound area divided by the area of `name` over `(start, stop)`.
    InternalStandard { name: String, start: f64, stop: f64 },
}

impl CalibrationType {
    pub fn label(&self) -> &'static str {
        match self {
            CalibrationType::Concentration => "concentration",
            CalibrationType::InternalStandard { .. } => "internal_standard",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPoint {
    pub file: PathBuf,
    pub concentration: f64,
}

/// Calibration standards of one compound.
///
/// Read from `<folder>/<compound>.csv`. The header line carries the
/// integration window in its 4th and 6th fields, every other line is
/// `file,concentration` with files living in `<folder>/<compound>/`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSet {
    pub compound: String,
    pub start: f64,
    pub stop: f64,
    pub points: Vec<CalibrationPoint>,
}

fn header_field(fields: &[&str], idx: usize, what: &str, path: &Path) -> Result<f64> {
    fields
        .get(idx)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .ok_or_else(|| {
            GcmsError::format(
                format!("header field {} ({}) is missing or not a number", idx + 1, what),
                Some(path.to_path_buf()),
            )
        })
}

impl CalibrationSet {
    pub fn csv_path(folder: &Path, compound: &str) -> PathBuf {
        folder.join(format!("{}.csv", compound))
    }

    /// `Ok(None)` when the compound has no calibration file.
    pub fn load(folder: &Path, compound: &str) -> Result<Option<Self>> {
        let path = Self::csv_path(folder, compound);
        if !path.is_file() {
            debug!("No calibration set for {}", compound);
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| GcmsError::io(e, &path))?;
        Self::parse(&text, compound, &folder.join(compound), &path).map(Some)
    }

    pub fn parse(text: &str, compound: &str, file_dir: &Path, path: &Path) -> Result<Self> {
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| GcmsError::format("empty calibration file", Some(path.to_path_buf())))?;
        let fields: Vec<&str> = header.split(',').collect();
        let start = header_field(&fields, 3, "window start", path)?;
        let stop = header_field(&fields, 5, "window stop", path)?;
        if start >= stop {
            warn!(
                "{}: integration window ({}, {}) is empty",
                compound, start, stop
            );
        }

        let mut points = Vec::new();
        for (line_no, line) in lines.enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut parts = trimmed.split(',');
            let file = parts.next().map(str::trim).filter(|f| !f.is_empty());
            let conc = parts.next().and_then(|c| c.trim().parse::<f64>().ok());
            match (file, conc) {
                (Some(file), Some(concentration)) => points.push(CalibrationPoint {
                    file: file_dir.join(file),
                    concentration,
                }),
                _ => {
                    return Err(GcmsError::format(
                        format!("line {}: expected 'file,concentration', got '{}'", line_no + 2, trimmed),
                        Some(path.to_path_buf()),
                    ));
                }
            }
        }

        Ok(Self {
            compound: compound.to_string(),
            start,
            stop,
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_calibration_set() {
        let text = "Name,octane,Start,7.0,Stop,7.4\n# std curve\nstd1.CDF,1.0\n\nstd2.CDF, 2.5\n";
        let set = CalibrationSet::parse(
            text,
            "octane",
            Path::new("cal/octane"),
            Path::new("cal/octane.csv"),
        )
        .unwrap();
        assert_eq!(set.start, 7.0);
        assert_eq!(set.stop, 7.4);
        assert_eq!(set.points.len(), 2);
        assert_eq!(set.points[0].file, Path::new("cal/octane/std1.CDF"));
        assert_eq!(set.points[1].concentration, 2.5);
    }

    #[test]
    fn test_bad_header_is_format_error() {
        let res = CalibrationSet::parse("Name,octane,Start\n", "octane", Path::new("x"), Path::new("x.csv"));
        assert!(matches!(res, Err(GcmsError::Format { .. })));
    }

    #[test]
    fn test_missing_set_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(CalibrationSet::load(dir.path(), "octane").unwrap(), None);
    }

    #[test]
    fn test_calibration_type_serde() {
        let t: CalibrationType = serde_json::from_str(
            r#"{"type": "internal_standard", "name": "octane", "start": 7.0, "stop": 7.4}"#,
        )
        .unwrap();
        assert_eq!(t.label(), "internal_standard");
        let c: CalibrationType = serde_json::from_str(r#"{"type": "concentration"}"#).unwrap();
        assert_eq!(c, CalibrationType::Concentration);
    }
}
