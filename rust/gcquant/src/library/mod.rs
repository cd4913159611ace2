//! Reference spectrum library.
//!
//! Reference text is parsed once into a [`ReferenceSet`] and then aligned
//! to the mass axis of each decoded run, producing a [`ReferenceLibrary`]
//! whose spectra are unit-normalized basis vectors for the fit.

mod manifest;
mod records;

use std::collections::HashMap;
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
    info,
    instrument,
    warn,
};

use crate::decoder::DecodedRun;
use crate::errors::{
    GcmsError,
    Result,
};
use crate::models::mass_axis::round_mass;
use crate::models::{
    Array2D,
    MassAxis,
};

pub const BACKGROUND_NAME: &str = "Background";
pub const RETENTION_TIME_KEY: &str = "RT";

/// A compound as read from reference text, before alignment to any axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCompound {
    pub name: String,
    pub metadata: HashMap<String, String>,
    pub peaks: Vec<(f64, f64)>,
}

impl ParsedCompound {
    pub fn retention_time(&self) -> Option<f64> {
        self.metadata
            .get(RETENTION_TIME_KEY)
            .and_then(|rt| rt.trim().parse::<f64>().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceFormat {
    /// A manifest listing one `mass intensity` file per compound.
    Manifest,
    /// A single file of `NAME:` records (NIST text or AMDIS msl).
    Records,
}

impl ReferenceFormat {
    pub fn detect(path: &Path, text: &str) -> Self {
        let is_msl = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("msl"))
            .unwrap_or(false);
        if is_msl || records::looks_like_records(text) {
            ReferenceFormat::Records
        } else {
            ReferenceFormat::Manifest
        }
    }
}

/// Reference compounds in source order, independent of any run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSet {
    source: PathBuf,
    format: ReferenceFormat,
    compounds: Vec<ParsedCompound>,
    skipped: Vec<String>,
}

impl ReferenceSet {
    #[instrument(level = "info")]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GcmsError::lookup(
                    path.display().to_string(),
                    "reference source is not on disk",
                )
            } else {
                GcmsError::io(e, path)
            }
        })?;
        let text = match String::from_utf8(bytes) {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    "Reference file {} is not valid UTF-8, decoding lossily",
                    path.display()
                );
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        let format = ReferenceFormat::detect(path, &text);
        let (compounds, skipped) = match format {
            ReferenceFormat::Manifest => manifest::parse_manifest(&text, path)?,
            ReferenceFormat::Records => (records::parse_records(&text, path)?, Vec::new()),
        };
        let mut set = Self::from_compounds(path, format, compounds)?;
        if !skipped.is_empty() {
            warn!(
                "{} manifest entries could not be resolved and were skipped",
                skipped.len()
            );
        }
        set.skipped = skipped;
        Ok(set)
    }

    pub fn from_compounds(
        source: impl Into<PathBuf>,
        format: ReferenceFormat,
        compounds: Vec<ParsedCompound>,
    ) -> Result<Self> {
        if let Some(c) = compounds.iter().find(|c| c.name == BACKGROUND_NAME) {
            return Err(GcmsError::format(
                format!("'{}' is a reserved compound name", c.name),
                None,
            ));
        }
        let source = source.into();
        info!(
            "Loaded {} reference compounds from {} ({:?})",
            compounds.len(),
            source.display(),
            format
        );
        Ok(Self {
            source,
            format,
            compounds,
            skipped: Vec::new(),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn format(&self) -> ReferenceFormat {
        self.format
    }

    pub fn compounds(&self) -> &[ParsedCompound] {
        &self.compounds
    }

    /// Names of manifest entries dropped because their file is missing.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.compounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compounds.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundNormalization {
    #[default]
    Normalized,
    Raw,
}

/// Where to sample the Background pseudo-reference from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSpec {
    pub time: f64,
    #[serde(default)]
    pub normalization: BackgroundNormalization,
}

/// Scatters peaks onto the axis and scales the tallest bin to 1.0.
///
/// Peaks off the axis are dropped first. A spectrum with no peak on the
/// axis stays all zero.
pub fn align_spectrum(name: &str, peaks: &[(f64, f64)], axis: MassAxis) -> Vec<f64> {
    let mut spectrum = vec![0.0; axis.len()];
    let mut dropped = 0;
    for &(mass, inten) in peaks {
        match axis.index_of(round_mass(mass)) {
            Some(idx) => spectrum[idx] = inten,
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!(
            "{}: {} of {} peaks outside mass axis [{}, {}]",
            name,
            dropped,
            peaks.len(),
            axis.min(),
            axis.max()
        );
    }
    normalize_in_place(&mut spectrum);
    if spectrum.iter().all(|&v| v == 0.0) {
        warn!("{}: no reference peak inside the mass axis", name);
    }
    spectrum
}

fn normalize_in_place(values: &mut [f64]) {
    let max = values.iter().copied().fold(0.0, f64::max);
    if max > 0.0 {
        values.iter_mut().for_each(|v| *v /= max);
    }
}

/// Mass-aligned reference spectra, one row per compound.
///
/// When present, the Background entry is always the last row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLibrary {
    names: Vec<String>,
    metadata: Vec<HashMap<String, String>>,
    spectra: Array2D,
    mass_axis: MassAxis,
    background_scan: Option<usize>,
}

impl ReferenceLibrary {
    /// Loads `source` and aligns it to `run`.
    pub fn build(
        source: &Path,
        run: &DecodedRun,
        background: Option<BackgroundSpec>,
    ) -> Result<Self> {
        let set = ReferenceSet::load(source)?;
        Self::from_set(&set, run, background)
    }

    #[instrument(level = "debug", skip_all)]
    pub fn from_set(
        set: &ReferenceSet,
        run: &DecodedRun,
        background: Option<BackgroundSpec>,
    ) -> Result<Self> {
        let axis = run.mass_axis();
        let mut names = Vec::with_capacity(set.len() + 1);
        let mut metadata = Vec::with_capacity(set.len() + 1);
        let mut spectra = Array2D::zeros(0, axis.len());

        for compound in set.compounds() {
            let spectrum = align_spectrum(&compound.name, &compound.peaks, axis);
            spectra.push_row(&spectrum)?;
            names.push(compound.name.clone());
            metadata.push(compound.metadata.clone());
        }

        let mut background_scan = None;
        if let Some(spec) = background {
            let idx = run.nearest_scan(spec.time).ok_or_else(|| {
                GcmsError::format("cannot sample a background from a run with no scans", None)
            })?;
            let mut row = run
                .intensity()
                .get_row(idx)
                .map(|r| r.to_vec())
                .unwrap_or_else(|| vec![0.0; axis.len()]);
            if spec.normalization == BackgroundNormalization::Normalized {
                normalize_in_place(&mut row);
            }
            debug!(
                "Background sampled from scan {} at {:.3} min",
                idx,
                run.times()[idx]
            );
            spectra.push_row(&row)?;
            names.push(BACKGROUND_NAME.to_string());
            metadata.push(HashMap::new());
            background_scan = Some(idx);
        }

        Ok(Self {
            names,
            metadata,
            spectra,
            mass_axis: axis,
            background_scan,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn spectra(&self) -> &Array2D {
        &self.spectra
    }

    pub fn spectrum(&self, index: usize) -> Option<&[f64]> {
        self.spectra.get_row(index)
    }

    pub fn metadata(&self, index: usize) -> Option<&HashMap<String, String>> {
        self.metadata.get(index)
    }

    pub fn mass_axis(&self) -> MassAxis {
        self.mass_axis
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Retention time from the `RT` metadata field. `None` for the Background.
    pub fn retention_time(&self, index: usize) -> Option<f64> {
        self.metadata
            .get(index)?
            .get(RETENTION_TIME_KEY)
            .and_then(|rt| rt.trim().parse::<f64>().ok())
    }

    pub fn background_index(&self) -> Option<usize> {
        self.background_scan.map(|_| self.names.len() - 1)
    }

    /// Scan the Background entry was sampled from.
    pub fn background_scan(&self) -> Option<usize> {
        self.background_scan
    }
}
