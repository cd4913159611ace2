//! Decode, align, fit and integrate a single run.

use std::path::{
    Path,
    PathBuf,
};

use tracing::{
    info,
    instrument,
};

use crate::calibration::CalibrationType;
use crate::decoder::{
    DecodedRun,
    DuplicateMassPolicy,
};
use crate::deconvolution::{
    fit,
    FitResult,
    RtFilter,
};
use crate::errors::{
    GcmsError,
    NumericalWarning,
    Result,
};
use crate::integration::{
    IntegrationMode,
    IntegrationRecord,
    WindowIntegrator,
};
use crate::library::{
    BackgroundSpec,
    ReferenceLibrary,
    ReferenceSet,
};

/// Everything that changes how a run is processed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisSettings {
    pub background: Option<BackgroundSpec>,
    pub rt_filter: Option<RtFilter>,
    pub integration_mode: IntegrationMode,
    pub duplicate_mass_policy: DuplicateMassPolicy,
}

#[derive(Debug, Clone)]
pub struct AnalyzedRun {
    path: PathBuf,
    run: DecodedRun,
    library: ReferenceLibrary,
    fit: FitResult,
    integrator: WindowIntegrator,
}

impl AnalyzedRun {
    #[instrument(level = "info", skip(references, settings))]
    pub fn from_path(
        path: &Path,
        references: &ReferenceSet,
        settings: &AnalysisSettings,
    ) -> Result<Self> {
        let run = DecodedRun::from_path(path, settings.duplicate_mass_policy)?;
        Self::from_run(path, run, references, settings)
    }

    pub fn from_run(
        path: &Path,
        run: DecodedRun,
        references: &ReferenceSet,
        settings: &AnalysisSettings,
    ) -> Result<Self> {
        let library = ReferenceLibrary::from_set(references, &run, settings.background)?;
        let fit = fit(&run, &library, settings.rt_filter).map_err(|e| e.with_path(path))?;
        if !fit.warnings().is_empty() {
            info!(
                "{}: {} numerical warnings",
                path.display(),
                fit.warnings().len()
            );
        }
        Ok(Self {
            path: path.to_path_buf(),
            run,
            library,
            fit,
            integrator: WindowIntegrator::new(settings.integration_mode),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension.
    pub fn sample_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn run(&self) -> &DecodedRun {
        &self.run
    }

    pub fn library(&self) -> &ReferenceLibrary {
        &self.library
    }

    pub fn fit(&self) -> &FitResult {
        &self.fit
    }

    pub fn warnings(&self) -> &[NumericalWarning] {
        self.fit.warnings()
    }

    pub fn integrate(&mut self, start: f64, stop: f64) -> Result<Vec<f64>> {
        self.integrator
            .integrate(&self.fit, &self.run, &self.library, start, stop)
    }

    pub fn last_integration(&self) -> Option<&IntegrationRecord> {
        self.integrator.last()
    }

    /// Divisor applied to compound areas: 1 for plain concentration curves,
    /// the internal standard's own area otherwise.
    pub fn standard_area(&mut self, kind: &CalibrationType) -> Result<f64> {
        match kind {
            CalibrationType::Concentration => Ok(1.0),
            CalibrationType::InternalStandard { name, start, stop } => {
                let std_col = self.library.index_of(name).ok_or_else(|| {
                    GcmsError::lookup(
                        name.clone(),
                        "internal standard is not in the reference library",
                    )
                })?;
                Ok(self.integrate(*start, *stop)?[std_col])
            }
        }
    }

    /// Area of the compound at `column`, or its ratio to the internal standard.
    pub fn response(
        &mut self,
        column: usize,
        start: f64,
        stop: f64,
        kind: &CalibrationType,
    ) -> Result<f64> {
        let divisor = self.standard_area(kind)?;
        let areas = self.integrate(start, stop)?;
        let area = areas.get(column).copied().ok_or_else(|| {
            GcmsError::lookup(column.to_string(), "column is outside the reference library")
        })?;
        Ok(area / divisor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{
        ParsedCompound,
        ReferenceFormat,
    };
    use crate::models::{
        Array2D,
        MassAxis,
    };
    use std::collections::HashMap;

    fn references() -> ReferenceSet {
        let compounds = [("a", 50.0), ("std", 52.0)]
            .into_iter()
            .map(|(name, mass)| ParsedCompound {
                name: name.into(),
                metadata: HashMap::new(),
                peaks: vec![(mass, 1.0)],
            })
            .collect();
        ReferenceSet::from_compounds("mem", ReferenceFormat::Records, compounds).unwrap()
    }

    fn run() -> DecodedRun {
        DecodedRun::new(
            vec![1.0, 2.0, 3.0],
            MassAxis::new(50, 52).unwrap(),
            Array2D::new(vec![
                vec![0.0, 0.0, 0.0],
                vec![6.0, 0.0, 0.0],
                vec![0.0, 0.0, 2.0],
            ])
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_response_modes() {
        let mut analyzed = AnalyzedRun::from_run(
            Path::new("sample.CDF"),
            run(),
            &references(),
            &AnalysisSettings::default(),
        )
        .unwrap();
        assert_eq!(analyzed.sample_name(), "sample");
        let area = analyzed
            .response(0, 1.5, 2.5, &CalibrationType::Concentration)
            .unwrap();
        assert!((area - 6.0).abs() < 1e-9, "{}", area);

        let kind = CalibrationType::InternalStandard {
            name: "std".into(),
            start: 2.5,
            stop: 3.5,
        };
        let ratio = analyzed.response(0, 1.5, 2.5, &kind).unwrap();
        assert!((ratio - 3.0).abs() < 1e-9, "{}", ratio);
        // Last window is the compound window, not the standard's.
        assert_eq!(analyzed.last_integration().unwrap().start, 1.5);
    }

    #[test]
    fn test_unknown_standard_is_lookup_error() {
        let mut analyzed = AnalyzedRun::from_run(
            Path::new("sample.CDF"),
            run(),
            &references(),
            &AnalysisSettings::default(),
        )
        .unwrap();
        let kind = CalibrationType::InternalStandard {
            name: "ghost".into(),
            start: 2.5,
            stop: 3.5,
        };
        assert!(matches!(
            analyzed.response(0, 1.5, 2.5, &kind),
            Err(GcmsError::Lookup { .. })
        ));
    }
}
