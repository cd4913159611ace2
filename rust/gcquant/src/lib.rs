//! GC-MS deconvolution and quantification.
//!
//! A run is decoded from an AIA/ANDI netCDF file into a dense
//! `scans x integer masses` matrix, every scan is fitted as a non-negative
//! combination of reference spectra, and the fit is integrated over
//! retention-time windows to give per-compound peak areas that feed
//! calibration curves and sample concentrations.

pub mod analysis;
pub mod calibration;
pub mod decoder;
pub mod deconvolution;
pub mod errors;
pub mod integration;
pub mod library;
pub mod models;
pub mod plotting;
pub mod quantification;
pub mod storage;

pub use analysis::{
    AnalysisSettings,
    AnalyzedRun,
};
pub use decoder::{
    DecodedRun,
    DuplicateMassPolicy,
    RawScans,
};
pub use deconvolution::{
    fit,
    fit_with_max_iter,
    FitResult,
    RtFilter,
};
pub use errors::{
    ConsistencyWarning,
    GcmsError,
    NumericalWarning,
};
pub use integration::{
    IntegrationMode,
    WindowIntegrator,
};
pub use library::{
    BackgroundNormalization,
    BackgroundSpec,
    ReferenceLibrary,
    ReferenceSet,
};
pub use models::{
    Array2D,
    MassAxis,
};
