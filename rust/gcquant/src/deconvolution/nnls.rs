//! Active-set non-negative least squares (Lawson & Hanson).
//!
//! The design matrix is fixed for many right-hand sides (one per scan),
//! so the Gram matrix `AᵀA` is computed once per problem and every solve
//! works on the `n x n` normal equations of the passive set.

use nalgebra::{
    DMatrix,
    DVector,
};

const SVD_EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct NnlsSolution {
    /// Non-negative coefficients, one per column of the design matrix.
    pub x: Vec<f64>,
    /// `‖Ax − b‖₂`
    pub residual: f64,
    pub converged: bool,
    pub iterations: usize,
}

#[derive(Debug, Clone)]
pub struct NnlsProblem {
    a: DMatrix<f64>,
    gram: DMatrix<f64>,
    max_iter: usize,
}

impl NnlsProblem {
    /// `a` is `m x n`: one row per mass bin, one column per reference.
    pub fn new(a: DMatrix<f64>) -> Self {
        let gram = a.transpose() * &a;
        let max_iter = (3 * a.ncols()).max(10);
        Self { a, gram, max_iter }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn nrows(&self) -> usize {
        self.a.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.a.ncols()
    }

    fn solve_passive(&self, atb: &DVector<f64>, passive: &[bool]) -> DVector<f64> {
        let n = self.ncols();
        let idx: Vec<usize> = (0..n).filter(|&i| passive[i]).collect();
        let k = idx.len();
        let mut out = DVector::zeros(n);
        if k == 0 {
            return out;
        }

        let sub_gram = DMatrix::from_fn(k, k, |r, c| self.gram[(idx[r], idx[c])]);
        let sub_atb = DVector::from_fn(k, |r, _| atb[idx[r]]);

        let solved = match sub_gram.clone().cholesky() {
            Some(chol) => Some(chol.solve(&sub_atb)),
            // Collinear references leave the passive Gram block singular.
            None => sub_gram.svd(true, true).solve(&sub_atb, SVD_EPS).ok(),
        };
        if let Some(s) = solved {
            for (r, &i) in idx.iter().enumerate() {
                out[i] = s[r];
            }
        }
        out
    }

    /// Minimizes `‖Ax − b‖₂` subject to `x ≥ 0`.
    pub fn solve(&self, b: &[f64]) -> NnlsSolution {
        let n = self.ncols();
        let b = DVector::from_column_slice(b);
        debug_assert_eq!(b.len(), self.nrows());

        let atb = self.a.transpose() * &b;
        let scale = atb.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
        let tol = 1e-10 * scale;

        let mut x = DVector::<f64>::zeros(n);
        let mut passive = vec![false; n];
        let mut iterations = 0;
        let mut converged = true;

        let mut w = &atb - &self.gram * &x;
        'outer: loop {
            let candidate = (0..n)
                .filter(|&i| !passive[i])
                .max_by(|&i, &j| w[i].total_cmp(&w[j]));
            let j = match candidate {
                Some(j) if w[j] > tol => j,
                _ => break,
            };
            passive[j] = true;

            loop {
                iterations += 1;
                if iterations > self.max_iter {
                    converged = false;
                    break 'outer;
                }

                let s = self.solve_passive(&atb, &passive);
                let feasible = (0..n).filter(|&i| passive[i]).all(|i| s[i] > 0.0);
                if feasible {
                    x = s;
                    break;
                }

                // Step from x towards s until the first passive coefficient hits zero.
                let alpha = (0..n)
                    .filter(|&i| passive[i] && s[i] <= 0.0)
                    .map(|i| x[i] / (x[i] - s[i]))
                    .fold(f64::INFINITY, f64::min);
                let alpha = if alpha.is_finite() { alpha } else { 0.0 };
                x += (&s - &x) * alpha;

                for i in 0..n {
                    if passive[i] && x[i] <= tol {
                        passive[i] = false;
                        x[i] = 0.0;
                    }
                }
            }

            w = &atb - &self.gram * &x;
        }

        let x: Vec<f64> = x.iter().map(|v| v.max(0.0)).collect();
        let residual = (&self.a * DVector::from_column_slice(&x) - &b).norm();

        NnlsSolution {
            x,
            residual,
            converged,
            iterations,
        }
    }
}
