//! Sparse scan stream to dense `scans x mass bins` intensity matrix.

mod netcdf;

pub use netcdf::{
    read_aia_file,
    REQUIRED_FIELDS,
};

use std::path::Path;

use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    instrument,
};

use crate::errors::{
    GcmsError,
    Result,
};
use crate::models::mass_axis::round_mass;
use crate::models::{
    Array2D,
    MassAxis,
};

const SECONDS_PER_MINUTE: f64 = 60.0;

/// How intensities are combined when a scan holds several raw peaks
/// that round to the same integer mass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateMassPolicy {
    #[default]
    Mean,
    Sum,
}

/// The four fields of an AIA/ANDI-MS file, as flat arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct RawScans {
    point_counts: Vec<usize>,
    scan_times_seconds: Vec<f64>,
    mass_values: Vec<f64>,
    intensity_values: Vec<f64>,
}

impl RawScans {
    pub fn new(
        point_counts: Vec<usize>,
        scan_times_seconds: Vec<f64>,
        mass_values: Vec<f64>,
        intensity_values: Vec<f64>,
    ) -> Result<Self> {
        if point_counts.len() != scan_times_seconds.len() {
            return Err(GcmsError::format(
                format!(
                    "point_count has {} scans but scan_acquisition_time has {}",
                    point_counts.len(),
                    scan_times_seconds.len()
                ),
                None,
            ));
        }
        if mass_values.len() != intensity_values.len() {
            return Err(GcmsError::format(
                format!(
                    "mass_values ({}) and intensity_values ({}) differ in length",
                    mass_values.len(),
                    intensity_values.len()
                ),
                None,
            ));
        }
        let total: usize = point_counts.iter().sum();
        if total != mass_values.len() {
            return Err(GcmsError::format(
                format!(
                    "point counts sum to {} but {} mass/intensity pairs are declared",
                    total,
                    mass_values.len()
                ),
                None,
            ));
        }
        if let Some(bad) = mass_values.iter().position(|m| !m.is_finite()) {
            return Err(GcmsError::format(
                format!("non-finite mass value at position {}", bad),
                None,
            ));
        }

        Ok(Self {
            point_counts,
            scan_times_seconds,
            mass_values,
            intensity_values,
        })
    }

    pub fn num_scans(&self) -> usize {
        self.point_counts.len()
    }

    pub fn num_points(&self) -> usize {
        self.mass_values.len()
    }

    /// Axis spanning the rounded extreme masses of the whole file.
    pub fn mass_axis(&self) -> Result<MassAxis> {
        let (min, max) = self
            .mass_values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &m| {
                (lo.min(m), hi.max(m))
            });
        if !min.is_finite() || !max.is_finite() {
            return Err(GcmsError::format("file contains no mass values", None));
        }
        MassAxis::new(round_mass(min), round_mass(max))
            .ok_or_else(|| GcmsError::format("invalid mass range", None))
    }

    /// Dense intensity matrix of the run.
    ///
    /// Rows follow scan order. Bins with no raw peak stay at zero, a scan
    /// with a zero point count is an all-zero row.
    pub fn densify(&self, policy: DuplicateMassPolicy) -> Result<DecodedRun> {
        let axis = self.mass_axis()?;
        let width = axis.len();
        let mut intensity = Array2D::zeros(self.num_scans(), width);
        let mut counts = vec![0u32; width];
        let mut touched: Vec<usize> = Vec::new();

        let mut offset = 0;
        for (row, (&npoints, out)) in self
            .point_counts
            .iter()
            .zip(intensity.iter_mut_rows())
            .enumerate()
        {
            let masses = &self.mass_values[offset..offset + npoints];
            let intensities = &self.intensity_values[offset..offset + npoints];
            offset += npoints;

            for (&mass, &inten) in masses.iter().zip(intensities.iter()) {
                // Masses come from the same file the axis was built from.
                let idx = axis.index_of(round_mass(mass)).ok_or_else(|| {
                    GcmsError::format(format!("mass {} off axis in scan {}", mass, row), None)
                })?;
                if counts[idx] == 0 {
                    touched.push(idx);
                }
                counts[idx] += 1;
                out[idx] += inten;
            }

            for &idx in touched.iter() {
                if policy == DuplicateMassPolicy::Mean && counts[idx] > 1 {
                    out[idx] /= counts[idx] as f64;
                }
                counts[idx] = 0;
            }
            touched.clear();
        }

        let times = self
            .scan_times_seconds
            .iter()
            .map(|t| t / SECONDS_PER_MINUTE)
            .collect();

        DecodedRun::new(times, axis, intensity)
    }
}

/// A decoded instrument run. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRun {
    times: Vec<f64>,
    mass_axis: MassAxis,
    intensity: Array2D,
    tic: Vec<f64>,
}

impl DecodedRun {
    /// Builds a run from already dense data. `times` are in minutes.
    pub fn new(times: Vec<f64>, mass_axis: MassAxis, intensity: Array2D) -> Result<Self> {
        if intensity.nrows() != times.len() {
            return Err(GcmsError::format(
                format!(
                    "{} scan times for {} intensity rows",
                    times.len(),
                    intensity.nrows()
                ),
                None,
            ));
        }
        if intensity.nrows() > 0 && intensity.ncols() != mass_axis.len() {
            return Err(GcmsError::format(
                format!(
                    "intensity rows have {} columns, mass axis has {} bins",
                    intensity.ncols(),
                    mass_axis.len()
                ),
                None,
            ));
        }
        let tic = intensity.row_sums();
        Ok(Self {
            times,
            mass_axis,
            intensity,
            tic,
        })
    }

    #[instrument(level = "info", skip(policy))]
    pub fn from_path(path: &Path, policy: DuplicateMassPolicy) -> Result<Self> {
        let raw = read_aia_file(path)?;
        debug!(
            "Read {} scans and {} points from {}",
            raw.num_scans(),
            raw.num_points(),
            path.display()
        );
        raw.densify(policy).map_err(|e| e.with_path(path))
    }

    /// Scan times in minutes.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn mass_axis(&self) -> MassAxis {
        self.mass_axis
    }

    pub fn intensity(&self) -> &Array2D {
        &self.intensity
    }

    /// Total ion current, one value per scan.
    pub fn tic(&self) -> &[f64] {
        &self.tic
    }

    pub fn num_scans(&self) -> usize {
        self.times.len()
    }

    /// Index of the scan closest in time, first one wins on ties.
    pub fn nearest_scan(&self, time: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, t) in self.times.iter().enumerate() {
            let d = (t - time).abs();
            match best {
                Some((_, bd)) if d >= bd => {}
                _ => best = Some((i, d)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Scans whose time lies strictly inside `(start, stop)`.
    pub fn window_mask(&self, start: f64, stop: f64) -> Vec<bool> {
        self.times.iter().map(|&t| t > start && t < stop).collect()
    }
}
