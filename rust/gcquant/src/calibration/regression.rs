use statrs::distribution::{
    ContinuousCDF,
    StudentsT,
};

use super::CalibrationError;

/// Ordinary least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation coefficient.
    pub r: f64,
    /// Two-sided p-value for a zero slope.
    pub p: f64,
    /// Standard error of the slope.
    pub stderr: f64,
}

impl Regression {
    pub fn r_squared(&self) -> f64 {
        self.r * self.r
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Concentration for a measured area.
    pub fn invert(&self, y: f64) -> f64 {
        (y - self.intercept) / self.slope
    }
}

const TINY: f64 = 1e-20;

pub fn linregress(x: &[f64], y: &[f64]) -> Result<Regression, CalibrationError> {
    if x.len() != y.len() {
        return Err(CalibrationError::MismatchedLengths {
            x: x.len(),
            y: y.len(),
        });
    }
    let n = x.len();
    if n == 0 {
        return Err(CalibrationError::NoPoints);
    }
    if n < 2 {
        return Err(CalibrationError::InsufficientPoints(n));
    }

    let nf = n as f64;
    let xmean = x.iter().sum::<f64>() / nf;
    let ymean = y.iter().sum::<f64>() / nf;

    let (mut ssxm, mut ssym, mut ssxym) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - xmean;
        let dy = yi - ymean;
        ssxm += dx * dx;
        ssym += dy * dy;
        ssxym += dx * dy;
    }
    if ssxm == 0.0 {
        return Err(CalibrationError::ZeroVariance);
    }

    let slope = ssxym / ssxm;
    let intercept = ymean - slope * xmean;

    let r = if ssym == 0.0 {
        0.0
    } else {
        (ssxym / (ssxm * ssym).sqrt()).clamp(-1.0, 1.0)
    };

    let (p, stderr) = if n == 2 {
        // Two points always lie on the line.
        (if r == 0.0 { 1.0 } else { 0.0 }, 0.0)
    } else {
        let df = nf - 2.0;
        let t = r * (df / ((1.0 - r + TINY) * (1.0 + r + TINY))).sqrt();
        let p = match StudentsT::new(0.0, 1.0, df) {
            Ok(dist) => 2.0 * dist.sf(t.abs()),
            Err(_) => f64::NAN,
        };
        let stderr = ((1.0 - r * r) * ssym / ssxm / df).sqrt();
        (p, stderr)
    };

    Ok(Regression {
        slope,
        intercept,
        r,
        p,
        stderr,
    })
}
