//! Per-compound peak areas over a retention-time window.

use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::decoder::DecodedRun;
use crate::deconvolution::FitResult;
use crate::errors::{
    GcmsError,
    Result,
};
use crate::library::ReferenceLibrary;
use crate::models::Array2D;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMode {
    /// Sum of the raw fit coefficients over the window.
    Coefficients,
    /// Sum of `coefficient x reference spectrum` over masses and scans.
    #[default]
    Reconstructed,
}

/// State of the most recent integration call.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationRecord {
    pub start: f64,
    pub stop: f64,
    /// One entry per scan of the run, true inside `(start, stop)`.
    pub mask: Vec<bool>,
    /// Indices of the selected scans.
    pub scans: Vec<usize>,
    /// `selected scans x references` slice of the fit.
    pub coefficients: Array2D,
    /// Per reference, a `selected scans x masses` reconstruction.
    /// Only filled in [`IntegrationMode::Reconstructed`].
    pub contributions: Option<Vec<Array2D>>,
    pub integral: Vec<f64>,
}

impl IntegrationRecord {
    /// Fit trace of one reference inside the window, one value per selected scan.
    pub fn peak_fit(&self, reference: usize) -> Option<Vec<f64>> {
        self.coefficients.column(reference)
    }

    /// Largest reconstructed per-scan signal of `reference` in the window,
    /// falling back to the largest coefficient when no reconstruction is kept.
    pub fn peak_max(&self, reference: usize) -> Option<f64> {
        match &self.contributions {
            Some(contribs) => contribs
                .get(reference)?
                .row_apply(|row| row.iter().sum::<f64>())
                .reduce(f64::max),
            None => self.peak_fit(reference)?.into_iter().reduce(f64::max),
        }
    }
}

/// Integrates fit results, keeping the last window for inspection.
#[derive(Debug, Clone, Default)]
pub struct WindowIntegrator {
    mode: IntegrationMode,
    last: Option<IntegrationRecord>,
}

impl WindowIntegrator {
    pub fn new(mode: IntegrationMode) -> Self {
        Self { mode, last: None }
    }

    pub fn mode(&self) -> IntegrationMode {
        self.mode
    }

    pub fn last(&self) -> Option<&IntegrationRecord> {
        self.last.as_ref()
    }

    /// One area per library entry, summed over scans strictly inside
    /// `(start, stop)`. An empty window yields all zeros.
    pub fn integrate(
        &mut self,
        fit: &FitResult,
        run: &DecodedRun,
        library: &ReferenceLibrary,
        start: f64,
        stop: f64,
    ) -> Result<Vec<f64>> {
        let nrefs = library.len();
        if fit.num_references() != nrefs && fit.coefficients().nrows() > 0 {
            return Err(GcmsError::format(
                format!(
                    "fit has {} references, library has {}",
                    fit.num_references(),
                    nrefs
                ),
                None,
            ));
        }
        if fit.coefficients().nrows() != run.num_scans() {
            return Err(GcmsError::format(
                format!(
                    "fit has {} scans, run has {}",
                    fit.coefficients().nrows(),
                    run.num_scans()
                ),
                None,
            ));
        }

        let mask = run.window_mask(start, stop);
        let scans: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect();

        let mut coefficients = Array2D::zeros(0, nrefs);
        for &i in scans.iter() {
            if let Some(row) = fit.scan(i) {
                coefficients.push_row(row)?;
            }
        }

        let (integral, contributions) = match self.mode {
            IntegrationMode::Coefficients => {
                let mut integral = vec![0.0; nrefs];
                for row in coefficients.iter_rows() {
                    for (acc, c) in integral.iter_mut().zip(row) {
                        *acc += c;
                    }
                }
                (integral, None)
            }
            IntegrationMode::Reconstructed => {
                let nmass = library.mass_axis().len();
                let mut integral = vec![0.0; nrefs];
                let mut contribs = Vec::with_capacity(nrefs);
                for (r, acc) in integral.iter_mut().enumerate() {
                    let spectrum = library.spectrum(r).unwrap_or(&[]);
                    let mut per_ref = Array2D::zeros(scans.len(), nmass);
                    for (row_out, coefs) in per_ref.iter_mut_rows().zip(coefficients.iter_rows()) {
                        let c = coefs[r];
                        for (out, s) in row_out.iter_mut().zip(spectrum) {
                            *out = c * s;
                        }
                        *acc += row_out.iter().sum::<f64>();
                    }
                    contribs.push(per_ref);
                }
                (integral, Some(contribs))
            }
        };

        debug!(
            "Integrated {} scans in ({}, {}) with {:?}",
            scans.len(),
            start,
            stop,
            self.mode
        );

        self.last = Some(IntegrationRecord {
            start,
            stop,
            mask,
            scans,
            coefficients,
            contributions,
            integral: integral.clone(),
        });
        Ok(integral)
    }
}
