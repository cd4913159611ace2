use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{
    FileReader,
    SerializedFileReader,
};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::{
    Field,
    RecordWriter,
    Row,
};
use parquet_derive::ParquetRecordWriter;
use serde::Serialize;
use tracing::{
    info,
    warn,
};

use super::CalibrationType;
use crate::errors::{
    ConsistencyWarning,
    GcmsError,
    Result,
};
use crate::storage::replace_atomically;

const KEY_BACKGROUND_ENABLED: &str = "background_enabled";
const KEY_BACKGROUND_TIME: &str = "background_time";
const KEY_CALIBRATION_TYPE: &str = "calibration_type";
const KEY_STANDARD_NAME: &str = "standard_name";
const KEY_STANDARD_START: &str = "standard_start";
const KEY_STANDARD_STOP: &str = "standard_stop";

/// One calibrated compound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ParquetRecordWriter)]
pub struct CalibrationRow {
    pub compound_name: String,
    pub window_start: f64,
    pub window_stop: f64,
    pub slope: f64,
    pub intercept: f64,
    pub r: f64,
    pub p: f64,
    pub stderr: f64,
    /// Library column of the compound when the calibration was run.
    pub reference_column_index: i16,
}

impl CalibrationRow {
    /// Concentration for an area, inverting the calibration line.
    pub fn concentration(&self, area: f64) -> f64 {
        (area - self.intercept) / self.slope
    }
}

/// Settings recorded once with the table.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationAttributes {
    pub background_enabled: bool,
    pub background_time: f64,
    pub calibration_type: CalibrationType,
}

impl CalibrationAttributes {
    fn to_key_values(&self) -> Vec<KeyValue> {
        let mut kv = vec![
            KeyValue::new(
                KEY_BACKGROUND_ENABLED.to_string(),
                self.background_enabled.to_string(),
            ),
            KeyValue::new(
                KEY_BACKGROUND_TIME.to_string(),
                self.background_time.to_string(),
            ),
            KeyValue::new(
                KEY_CALIBRATION_TYPE.to_string(),
                self.calibration_type.label().to_string(),
            ),
        ];
        if let CalibrationType::InternalStandard { name, start, stop } = &self.calibration_type {
            kv.push(KeyValue::new(KEY_STANDARD_NAME.to_string(), name.clone()));
            kv.push(KeyValue::new(KEY_STANDARD_START.to_string(), start.to_string()));
            kv.push(KeyValue::new(KEY_STANDARD_STOP.to_string(), stop.to_string()));
        }
        kv
    }

    fn from_key_values(kv: &[KeyValue], path: &Path) -> Result<Self> {
        let map: HashMap<&str, &str> = kv
            .iter()
            .filter_map(|e| e.value.as_deref().map(|v| (e.key.as_str(), v)))
            .collect();
        let missing = |key: &str| {
            GcmsError::format(
                format!("calibration table attribute '{}' is missing or invalid", key),
                Some(path.to_path_buf()),
            )
        };
        let get = |key: &str| map.get(key).copied().ok_or_else(|| missing(key));
        let get_f64 = |key: &str| {
            get(key)?
                .parse::<f64>()
                .map_err(|_| missing(key))
        };

        let background_enabled = get(KEY_BACKGROUND_ENABLED)?
            .parse::<bool>()
            .map_err(|_| missing(KEY_BACKGROUND_ENABLED))?;
        let background_time = get_f64(KEY_BACKGROUND_TIME)?;
        let calibration_type = match get(KEY_CALIBRATION_TYPE)? {
            "concentration" => CalibrationType::Concentration,
            "internal_standard" => CalibrationType::InternalStandard {
                name: get(KEY_STANDARD_NAME)?.to_string(),
                start: get_f64(KEY_STANDARD_START)?,
                stop: get_f64(KEY_STANDARD_STOP)?,
            },
            _ => return Err(missing(KEY_CALIBRATION_TYPE)),
        };
        Ok(Self {
            background_enabled,
            background_time,
            calibration_type,
        })
    }

    /// Differences between these (calibration-time) settings and `requested`.
    pub fn compare(&self, requested: &CalibrationAttributes) -> Vec<ConsistencyWarning> {
        let mut warnings = Vec::new();
        if self.background_enabled != requested.background_enabled {
            warnings.push(ConsistencyWarning::BackgroundEnabledMismatch {
                calibration: self.background_enabled,
                requested: requested.background_enabled,
            });
        } else if self.background_enabled && self.background_time != requested.background_time {
            warnings.push(ConsistencyWarning::BackgroundTimeMismatch {
                calibration: self.background_time,
                requested: requested.background_time,
            });
        }

        match (&self.calibration_type, &requested.calibration_type) {
            (
                CalibrationType::InternalStandard {
                    name: n1,
                    start: s1,
                    stop: e1,
                },
                CalibrationType::InternalStandard {
                    name: n2,
                    start: s2,
                    stop: e2,
                },
            ) => {
                if n1 != n2 || s1 != s2 || e1 != e2 {
                    warnings.push(ConsistencyWarning::InternalStandardMismatch {
                        calibration: format!("{} ({}, {})", n1, s1, e1),
                        requested: format!("{} ({}, {})", n2, s2, e2),
                    });
                }
            }
            (a, b) if a.label() != b.label() => {
                warnings.push(ConsistencyWarning::CalibrationTypeMismatch {
                    calibration: a.label().to_string(),
                    requested: b.label().to_string(),
                });
            }
            _ => {}
        }
        warnings
    }
}

fn column<'a>(columns: &HashMap<&str, &'a Field>, name: &str, path: &Path) -> Result<&'a Field> {
    columns.get(name).copied().ok_or_else(|| {
        GcmsError::format(
            format!("calibration table has no '{}' column", name),
            Some(path.to_path_buf()),
        )
    })
}

fn row_from_record(row: &Row, path: &Path) -> Result<CalibrationRow> {
    let columns: HashMap<&str, &Field> = row
        .get_column_iter()
        .map(|(name, field)| (name.as_str(), field))
        .collect();
    let bad = |name: &str| {
        GcmsError::format(
            format!("unexpected value type in column '{}'", name),
            Some(path.to_path_buf()),
        )
    };
    let double = |name: &str| match column(&columns, name, path)? {
        Field::Double(v) => Ok(*v),
        Field::Float(v) => Ok(*v as f64),
        _ => Err(bad(name)),
    };

    let compound_name = match column(&columns, "compound_name", path)? {
        Field::Str(s) => s.clone(),
        _ => return Err(bad("compound_name")),
    };
    let reference_column_index = match column(&columns, "reference_column_index", path)? {
        Field::Short(v) => *v,
        Field::Int(v) => i16::try_from(*v).map_err(|_| bad("reference_column_index"))?,
        _ => return Err(bad("reference_column_index")),
    };

    Ok(CalibrationRow {
        compound_name,
        window_start: double("window_start")?,
        window_stop: double("window_stop")?,
        slope: double("slope")?,
        intercept: double("intercept")?,
        r: double("r")?,
        p: double("p")?,
        stderr: double("stderr")?,
        reference_column_index,
    })
}

/// Calibration rows plus the settings they were produced with.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    attributes: CalibrationAttributes,
    rows: Vec<CalibrationRow>,
}

impl CalibrationTable {
    pub fn new(attributes: CalibrationAttributes) -> Self {
        Self {
            attributes,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: CalibrationRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[CalibrationRow] {
        &self.rows
    }

    pub fn attributes(&self) -> &CalibrationAttributes {
        &self.attributes
    }

    pub fn compound_names(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.compound_name.as_str()).collect()
    }

    /// Compares the stored settings with `requested`, logging each mismatch.
    ///
    /// The stored settings stay authoritative; callers should run with
    /// [`Self::attributes`] afterwards.
    pub fn check_consistency(&self, requested: &CalibrationAttributes) -> Vec<ConsistencyWarning> {
        let warnings = self.attributes.compare(requested);
        for w in warnings.iter() {
            warn!("{}; using the calibration settings", w);
        }
        warnings
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let props = WriterProperties::builder()
            .set_key_value_metadata(Some(self.attributes.to_key_values()))
            .build();
        let schema = self.rows.as_slice().schema()?;

        replace_atomically(path, |file| {
            let mut writer = SerializedFileWriter::new(file, schema, Arc::new(props))?;
            if !self.rows.is_empty() {
                let mut row_group = writer.next_row_group()?;
                self.rows.as_slice().write_to_row_group(&mut row_group)?;
                row_group.close()?;
            }
            writer.close()?;
            Ok(())
        })?;
        info!(
            "Wrote {} calibration rows to {}",
            self.rows.len(),
            path.display()
        );
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GcmsError::storage("calibration table not found", Some(path.to_path_buf()))
            } else {
                GcmsError::io(e, path)
            }
        })?;
        let reader = SerializedFileReader::new(file).map_err(|e| GcmsError::from(e).with_path(path))?;

        let kv = reader
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .cloned()
            .unwrap_or_default();
        let attributes = CalibrationAttributes::from_key_values(&kv, path)?;

        let mut rows = Vec::new();
        for record in reader.get_row_iter(None)? {
            let record = record.map_err(|e| GcmsError::from(e).with_path(path))?;
            rows.push(row_from_record(&record, path)?);
        }
        Ok(Self { attributes, rows })
    }
}
