use std::path::PathBuf;

use crate::calibration::CalibrationError;

#[derive(Debug)]
pub enum GcmsError {
    /// Malformed raw file, malformed reference text or a missing required field.
    Format {
        context: String,
        path: Option<PathBuf>,
    },
    /// A referenced file or compound could not be found.
    Lookup {
        name: String,
        context: String,
    },
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    /// The result store could not be created, read or replaced.
    Storage {
        context: String,
        path: Option<PathBuf>,
    },
    Calibration(CalibrationError),
}

impl GcmsError {
    pub fn format(context: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Format {
            context: context.into(),
            path,
        }
    }

    pub fn lookup(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Lookup {
            name: name.into(),
            context: context.into(),
        }
    }

    pub fn storage(context: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Storage {
            context: context.into(),
            path,
        }
    }

    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }

    /// Attaches a path to errors that were raised without one.
    pub fn with_path(mut self, new_path: impl Into<PathBuf>) -> Self {
        match &mut self {
            GcmsError::Format { path, .. }
            | GcmsError::Io { path, .. }
            | GcmsError::Storage { path, .. } => {
                if path.is_none() {
                    *path = Some(new_path.into());
                }
            }
            GcmsError::Lookup { .. } | GcmsError::Calibration(_) => {}
        }
        self
    }

    /// Whether the error should stop a whole batch instead of a single unit.
    pub fn is_globally_fatal(&self) -> bool {
        matches!(self, GcmsError::Storage { .. })
    }
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" ({})", p.display()),
        None => String::new(),
    }
}

impl std::fmt::Display for GcmsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GcmsError::Format { context, path } => {
                write!(f, "Format error{}: {}", fmt_path(path), context)
            }
            GcmsError::Lookup { name, context } => {
                write!(f, "Lookup error for '{}': {}", name, context)
            }
            GcmsError::Io { source, path } => {
                write!(f, "I/O error{}: {}", fmt_path(path), source)
            }
            GcmsError::Storage { context, path } => {
                write!(f, "Storage error{}: {}", fmt_path(path), context)
            }
            GcmsError::Calibration(e) => write!(f, "Calibration error: {}", e),
        }
    }
}

impl std::error::Error for GcmsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GcmsError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GcmsError>;

impl From<std::io::Error> for GcmsError {
    fn from(x: std::io::Error) -> Self {
        Self::Io {
            source: x,
            path: None,
        }
    }
}

impl From<csv::Error> for GcmsError {
    fn from(x: csv::Error) -> Self {
        Self::Storage {
            context: x.to_string(),
            path: None,
        }
    }
}

impl From<parquet::errors::ParquetError> for GcmsError {
    fn from(x: parquet::errors::ParquetError) -> Self {
        Self::Storage {
            context: x.to_string(),
            path: None,
        }
    }
}

impl From<CalibrationError> for GcmsError {
    fn from(x: CalibrationError) -> Self {
        Self::Calibration(x)
    }
}

/// Non-fatal per-scan condition raised while fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericalWarning {
    pub scan_index: usize,
    pub time: f64,
    pub kind: NumericalWarningKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NumericalWarningKind {
    /// The solver hit its iteration limit.
    NotConverged { residual: f64 },
    /// No reference passed the retention-time gate and there is no Background.
    EmptyActiveSet,
}

impl std::fmt::Display for NumericalWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            NumericalWarningKind::NotConverged { residual } => write!(
                f,
                "scan {} (t = {:.3} min): NNLS did not converge, residual {:.4e}",
                self.scan_index, self.time, residual
            ),
            NumericalWarningKind::EmptyActiveSet => write!(
                f,
                "scan {} (t = {:.3} min): no reference within the RT window, fit left at zero",
                self.scan_index, self.time
            ),
        }
    }
}

/// Mismatch between the settings a calibration table was built with and the
/// settings requested for a later run.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsistencyWarning {
    BackgroundEnabledMismatch { calibration: bool, requested: bool },
    BackgroundTimeMismatch { calibration: f64, requested: f64 },
    CalibrationTypeMismatch { calibration: String, requested: String },
    InternalStandardMismatch { calibration: String, requested: String },
}

impl std::fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyWarning::BackgroundEnabledMismatch { calibration, .. } => {
                if *calibration {
                    write!(
                        f,
                        "calibration data was run with a background; this may affect the analysis values"
                    )
                } else {
                    write!(
                        f,
                        "calibration data was run without a background; this may affect the analysis values"
                    )
                }
            }
            ConsistencyWarning::BackgroundTimeMismatch {
                calibration,
                requested,
            } => write!(
                f,
                "background time does not match the calibration data (calibration = {}, data = {})",
                calibration, requested
            ),
            ConsistencyWarning::CalibrationTypeMismatch {
                calibration,
                requested,
            } => write!(
                f,
                "calibration type does not match (calibration = {}, data = {})",
                calibration, requested
            ),
            ConsistencyWarning::InternalStandardMismatch {
                calibration,
                requested,
            } => write!(
                f,
                "internal standard does not match (calibration = {}, data = {})",
                calibration, requested
            ),
        }
    }
}
