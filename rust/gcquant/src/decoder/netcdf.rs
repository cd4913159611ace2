use std::path::Path;

use netcdf3::{
    DataVector,
    FileReader,
};

use super::RawScans;
use crate::errors::{
    GcmsError,
    Result,
};

pub const POINT_COUNT: &str = "point_count";
pub const SCAN_ACQUISITION_TIME: &str = "scan_acquisition_time";
pub const MASS_VALUES: &str = "mass_values";
pub const INTENSITY_VALUES: &str = "intensity_values";

/// Variables an AIA (ANDI-MS) file must expose.
pub const REQUIRED_FIELDS: [&str; 4] = [
    POINT_COUNT,
    SCAN_ACQUISITION_TIME,
    MASS_VALUES,
    INTENSITY_VALUES,
];

fn into_f64(data: DataVector) -> Vec<f64> {
    match data {
        DataVector::I8(v) => v.into_iter().map(f64::from).collect(),
        DataVector::U8(v) => v.into_iter().map(f64::from).collect(),
        DataVector::I16(v) => v.into_iter().map(f64::from).collect(),
        DataVector::I32(v) => v.into_iter().map(f64::from).collect(),
        DataVector::F32(v) => v.into_iter().map(f64::from).collect(),
        DataVector::F64(v) => v,
    }
}

fn read_field(reader: &mut FileReader, name: &'static str, path: &Path) -> Result<Vec<f64>> {
    reader.read_var(name).map(into_f64).map_err(|e| {
        GcmsError::format(
            format!("missing or unreadable field '{}': {:?}", name, e),
            Some(path.to_path_buf()),
        )
    })
}

/// Reads the four scan fields out of an AIA netCDF file.
pub fn read_aia_file(path: &Path) -> Result<RawScans> {
    if !path.exists() {
        return Err(GcmsError::io(
            std::io::Error::new(std::io::ErrorKind::NotFound, "raw file not found"),
            path,
        ));
    }
    let mut reader = FileReader::open(path).map_err(|e| {
        GcmsError::format(
            format!("not a readable netCDF file: {:?}", e),
            Some(path.to_path_buf()),
        )
    })?;

    let point_counts = read_field(&mut reader, POINT_COUNT, path)?
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            if c < 0.0 || c.fract() != 0.0 {
                Err(GcmsError::format(
                    format!("invalid point count {} for scan {}", c, i),
                    Some(path.to_path_buf()),
                ))
            } else {
                Ok(c as usize)
            }
        })
        .collect::<Result<Vec<_>>>()?;
    let times = read_field(&mut reader, SCAN_ACQUISITION_TIME, path)?;
    let masses = read_field(&mut reader, MASS_VALUES, path)?;
    let intensities = read_field(&mut reader, INTENSITY_VALUES, path)?;

    RawScans::new(point_counts, times, masses, intensities).map_err(|e| e.with_path(path))
}
