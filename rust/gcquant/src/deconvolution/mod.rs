//! Per-scan NNLS fit of the reference library against the intensity matrix.

pub mod nnls;
mod rt_gate;

pub use nnls::{
    NnlsProblem,
    NnlsSolution,
};
pub use rt_gate::{
    RtFilter,
    RtGate,
};

use std::collections::HashMap;

use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::{
    info,
    instrument,
    warn,
};

use crate::decoder::DecodedRun;
use crate::errors::{
    GcmsError,
    NumericalWarning,
    NumericalWarningKind,
    Result,
};
use crate::library::ReferenceLibrary;
use crate::models::Array2D;

/// Fit coefficients of one run, one row per scan in scan-time order.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    coefficients: Array2D,
    residuals: Vec<f64>,
    warnings: Vec<NumericalWarning>,
}

impl FitResult {
    /// `scans x references`, all entries non-negative.
    pub fn coefficients(&self) -> &Array2D {
        &self.coefficients
    }

    pub fn scan(&self, index: usize) -> Option<&[f64]> {
        self.coefficients.get_row(index)
    }

    /// Fit trace of one reference across all scans.
    pub fn trace(&self, reference: usize) -> Option<Vec<f64>> {
        self.coefficients.column(reference)
    }

    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn warnings(&self) -> &[NumericalWarning] {
        &self.warnings
    }

    pub fn num_references(&self) -> usize {
        self.coefficients.ncols()
    }
}

enum ScanPlan {
    Solve(usize),
    Skip,
}

/// Design matrix with one column per selected library row.
fn design_matrix(library: &ReferenceLibrary, subset: &[usize]) -> DMatrix<f64> {
    let spectra = library.spectra();
    DMatrix::from_fn(library.mass_axis().len(), subset.len(), |r, c| {
        spectra.get(subset[c], r).unwrap_or(0.0)
    })
}

/// Solves every scan of `run` against `library`.
///
/// Without a filter every scan is fitted against the full library. With a
/// filter only the references selected by the [`RtGate`] take part, the
/// other coefficients of that scan stay zero.
pub fn fit(
    run: &DecodedRun,
    library: &ReferenceLibrary,
    rt_filter: Option<RtFilter>,
) -> Result<FitResult> {
    fit_with_max_iter(run, library, rt_filter, None)
}

/// [`fit`] with an explicit cap on the solver iterations per scan.
///
/// Scans that hit the cap keep their last feasible coefficients and raise
/// a [`NumericalWarningKind::NotConverged`] warning.
#[instrument(level = "info", skip_all, fields(nscans = run.num_scans(), nrefs = library.len()))]
pub fn fit_with_max_iter(
    run: &DecodedRun,
    library: &ReferenceLibrary,
    rt_filter: Option<RtFilter>,
    max_iter: Option<usize>,
) -> Result<FitResult> {
    if run.mass_axis() != library.mass_axis() {
        return Err(GcmsError::format(
            format!(
                "library built for mass axis {:?}, run has {:?}",
                library.mass_axis(),
                run.mass_axis()
            ),
            None,
        ));
    }

    let nrefs = library.len();
    let mut subsets: Vec<Vec<usize>> = Vec::new();
    let plans: Vec<ScanPlan> = match rt_filter {
        None => {
            subsets.push((0..nrefs).collect());
            (0..run.num_scans()).map(|_| ScanPlan::Solve(0)).collect()
        }
        Some(filter) => {
            let gate = RtGate::new(library, filter);
            let mut lookup: HashMap<Vec<usize>, usize> = HashMap::new();
            run.times()
                .iter()
                .map(|&t| {
                    let active = gate.active(t);
                    if active.is_empty() {
                        return ScanPlan::Skip;
                    }
                    let id = *lookup.entry(active.clone()).or_insert_with(|| {
                        subsets.push(active);
                        subsets.len() - 1
                    });
                    ScanPlan::Solve(id)
                })
                .collect()
        }
    };

    let problems: Vec<NnlsProblem> = subsets
        .par_iter()
        .map(|subset| {
            let problem = NnlsProblem::new(design_matrix(library, subset));
            match max_iter {
                Some(cap) => problem.with_max_iter(cap),
                None => problem,
            }
        })
        .collect();

    let per_scan: Vec<(Vec<f64>, f64, Option<NumericalWarning>)> = plans
        .par_iter()
        .enumerate()
        .map(|(i, plan)| {
            let row = run.intensity().get_row(i).unwrap_or(&[]);
            let time = run.times()[i];
            let mut full = vec![0.0; nrefs];
            match plan {
                ScanPlan::Skip => {
                    let residual = row.iter().map(|v| v * v).sum::<f64>().sqrt();
                    let warning = NumericalWarning {
                        scan_index: i,
                        time,
                        kind: NumericalWarningKind::EmptyActiveSet,
                    };
                    (full, residual, Some(warning))
                }
                ScanPlan::Solve(id) => {
                    let sol = problems[*id].solve(row);
                    for (&ref_idx, &coef) in subsets[*id].iter().zip(sol.x.iter()) {
                        full[ref_idx] = coef;
                    }
                    let warning = (!sol.converged).then(|| NumericalWarning {
                        scan_index: i,
                        time,
                        kind: NumericalWarningKind::NotConverged {
                            residual: sol.residual,
                        },
                    });
                    (full, sol.residual, warning)
                }
            }
        })
        .collect();

    let mut coefficients = Array2D::zeros(0, nrefs);
    let mut residuals = Vec::with_capacity(per_scan.len());
    let mut warnings = Vec::new();
    for (coefs, residual, warning) in per_scan {
        coefficients.push_row(&coefs)?;
        residuals.push(residual);
        if let Some(w) = warning {
            warnings.push(w);
        }
    }

    if !warnings.is_empty() {
        warn!(
            "{} of {} scans raised numerical warnings",
            warnings.len(),
            run.num_scans()
        );
    }
    info!(
        "Fitted {} scans using {} distinct reference subsets",
        run.num_scans(),
        subsets.len()
    );

    Ok(FitResult {
        coefficients,
        residuals,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{
        BackgroundNormalization,
        BackgroundSpec,
        ParsedCompound,
        ReferenceFormat,
        ReferenceSet,
    };
    use crate::models::MassAxis;

    fn compound(name: &str, rt: &str, peaks: Vec<(f64, f64)>) -> ParsedCompound {
        ParsedCompound {
            name: name.to_string(),
            metadata: HashMap::from([("RT".to_string(), rt.to_string())]),
            peaks,
        }
    }

    fn run(rows: Vec<Vec<f64>>, times: Vec<f64>) -> DecodedRun {
        DecodedRun::new(
            times,
            MassAxis::new(50, 52).unwrap(),
            Array2D::new(rows).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_single_reference_fit() {
        let run = run(
            vec![vec![0.0; 3], vec![4.0, 0.0, 0.0], vec![0.0; 3]],
            vec![1.0, 2.0, 3.0],
        );
        let set = ReferenceSet::from_compounds(
            "mem",
            ReferenceFormat::Records,
            vec![compound("a", "2.0", vec![(50.0, 10.0)])],
        )
        .unwrap();
        let lib = ReferenceLibrary::from_set(&set, &run, None).unwrap();
        let fit = fit(&run, &lib, None).unwrap();
        let trace = fit.trace(0).unwrap();
        for (got, want) in trace.iter().zip([0.0, 4.0, 0.0]) {
            assert!((got - want).abs() < 1e-9, "{:?}", trace);
        }
        assert!(fit.warnings().is_empty());
    }

    #[test]
    fn test_mixture_is_separated() {
        let run = run(vec![vec![2.0, 3.0, 1.5]], vec![1.0]);
        let set = ReferenceSet::from_compounds(
            "mem",
            ReferenceFormat::Records,
            vec![
                compound("a", "1.0", vec![(50.0, 1.0)]),
                compound("b", "1.0", vec![(51.0, 2.0), (52.0, 1.0)]),
            ],
        )
        .unwrap();
        let lib = ReferenceLibrary::from_set(&set, &run, None).unwrap();
        let fit = fit(&run, &lib, None).unwrap();
        let coefs = fit.scan(0).unwrap();
        assert!((coefs[0] - 2.0).abs() < 1e-9, "{:?}", coefs);
        assert!((coefs[1] - 3.0).abs() < 1e-9, "{:?}", coefs);
        assert!(fit.residuals()[0] < 1e-9);
    }

    #[test]
    fn test_iteration_cap_raises_not_converged() {
        let run = run(vec![vec![2.0, 3.0, 1.5]], vec![1.0]);
        let set = ReferenceSet::from_compounds(
            "mem",
            ReferenceFormat::Records,
            vec![
                compound("a", "1.0", vec![(50.0, 1.0)]),
                compound("b", "1.0", vec![(51.0, 2.0), (52.0, 1.0)]),
            ],
        )
        .unwrap();
        let lib = ReferenceLibrary::from_set(&set, &run, None).unwrap();
        let fit = fit_with_max_iter(&run, &lib, None, Some(1)).unwrap();
        assert!(fit.scan(0).unwrap().iter().all(|&v| v >= 0.0));
        assert_eq!(fit.warnings().len(), 1);
        assert_eq!(fit.warnings()[0].scan_index, 0);
        assert!(matches!(
            fit.warnings()[0].kind,
            NumericalWarningKind::NotConverged { .. }
        ));
    }

    #[test]
    fn test_rt_gate_empty_without_background_is_zero() {
        let run = run(vec![vec![4.0, 1.0, 0.0]], vec![9.0]);
        let set = ReferenceSet::from_compounds(
            "mem",
            ReferenceFormat::Records,
            vec![compound("a", "2.0", vec![(50.0, 1.0)])],
        )
        .unwrap();
        let lib = ReferenceLibrary::from_set(&set, &run, None).unwrap();
        let filter = RtFilter {
            window: 0.5,
            adjust: 0.0,
        };
        let fit = fit(&run, &lib, Some(filter)).unwrap();
        assert_eq!(fit.scan(0).unwrap(), &[0.0]);
        assert_eq!(fit.warnings().len(), 1);
        assert_eq!(fit.warnings()[0].kind, NumericalWarningKind::EmptyActiveSet);
    }

    #[test]
    fn test_rt_gate_empty_with_background_uses_background_only() {
        let run = run(
            vec![vec![1.0, 1.0, 0.0], vec![3.0, 3.0, 0.0]],
            vec![0.5, 9.0],
        );
        let set = ReferenceSet::from_compounds(
            "mem",
            ReferenceFormat::Records,
            vec![compound("a", "2.0", vec![(50.0, 1.0)])],
        )
        .unwrap();
        let bg = BackgroundSpec {
            time: 0.5,
            normalization: BackgroundNormalization::Normalized,
        };
        let lib = ReferenceLibrary::from_set(&set, &run, Some(bg)).unwrap();
        let filter = RtFilter {
            window: 0.5,
            adjust: 0.0,
        };
        let fit = fit(&run, &lib, Some(filter)).unwrap();
        for scan in 0..2 {
            let coefs = fit.scan(scan).unwrap();
            let nonzero: Vec<usize> = (0..coefs.len()).filter(|&i| coefs[i] != 0.0).collect();
            assert_eq!(nonzero, vec![1], "{:?}", coefs);
        }
        assert!((fit.scan(1).unwrap()[1] - 3.0).abs() < 1e-9);
        assert!(fit.warnings().is_empty());
    }

    #[test]
    fn test_rt_gate_readmits_background_when_active() {
        // Background is flat over 50 and 51, compound sits on 52.
        let run = run(
            vec![vec![1.0, 1.0, 0.0], vec![1.0, 1.0, 5.0]],
            vec![0.5, 2.0],
        );
        let set = ReferenceSet::from_compounds(
            "mem",
            ReferenceFormat::Records,
            vec![compound("a", "2.0", vec![(52.0, 1.0)])],
        )
        .unwrap();
        let bg = BackgroundSpec {
            time: 0.5,
            normalization: BackgroundNormalization::Normalized,
        };
        let lib = ReferenceLibrary::from_set(&set, &run, Some(bg)).unwrap();
        let filter = RtFilter {
            window: 0.5,
            adjust: 0.0,
        };
        let fit = fit(&run, &lib, Some(filter)).unwrap();
        let coefs = fit.scan(1).unwrap();
        assert!((coefs[0] - 5.0).abs() < 1e-9, "{:?}", coefs);
        assert!((coefs[1] - 1.0).abs() < 1e-9, "{:?}", coefs);
    }

    #[test]
    fn test_axis_mismatch_rejected() {
        let a = run(vec![vec![0.0; 3]], vec![1.0]);
        let b = DecodedRun::new(
            vec![1.0],
            MassAxis::new(40, 42).unwrap(),
            Array2D::zeros(1, 3),
        )
        .unwrap();
        let set = ReferenceSet::from_compounds("mem", ReferenceFormat::Records, vec![]).unwrap();
        let lib = ReferenceLibrary::from_set(&set, &b, None).unwrap();
        assert!(fit(&a, &lib, None).is_err());
    }
}
