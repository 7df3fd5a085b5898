//! Regression error metrics over the held-out rows

use crate::error::{Result, WasteModelError};
use ndarray::{Array1, ArrayView1};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// `actual - predicted` per row.
pub fn residuals(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> Array1<f64> {
    &actual - &predicted
}

pub fn mean_absolute_error(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    residuals(actual, predicted).mapv(f64::abs).mean().unwrap_or(f64::NAN)
}

pub fn mean_squared_error(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    residuals(actual, predicted).mapv(|r| r * r).mean().unwrap_or(f64::NAN)
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// NaN when `actual` is constant (or empty), since the ratio is undefined.
pub fn r2_score(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let Some(mean) = actual.mean() else {
        return f64::NAN;
    };
    let ss_tot: f64 = actual.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return f64::NAN;
    }
    let ss_res: f64 = residuals(actual, predicted).iter().map(|r| r * r).sum();
    1.0 - ss_res / ss_tot
}

/// Residual as a percentage of the actual value, `None` where the actual
/// value is zero.
pub fn percentage_errors(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> Vec<Option<f64>> {
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(&t, &p)| (t != 0.0).then(|| (t - p) / t * 100.0))
        .collect()
}

/// Mean of the absolute percentage errors over rows with a non-zero actual
/// value; NaN if there are none.
pub fn mean_absolute_percentage_error(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let defined: Vec<f64> = percentage_errors(actual, predicted)
        .into_iter()
        .flatten()
        .map(f64::abs)
        .collect();

    let excluded = actual.len() - defined.len();
    if excluded > 0 {
        warn!(excluded, "Rows with zero actual value left out of MAPE");
    }
    if defined.is_empty() {
        return f64::NAN;
    }
    defined.iter().sum::<f64>() / defined.len() as f64
}

/// Summary metrics of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub mae: f64,
    pub mse: f64,
    pub r2: f64,
    pub mape: f64,
}

impl Metrics {
    pub fn compute(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(WasteModelError::Schema(format!(
                "{} actual values but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }

        let metrics = Self {
            mae: mean_absolute_error(actual, predicted),
            mse: mean_squared_error(actual, predicted),
            r2: r2_score(actual, predicted),
            mape: mean_absolute_percentage_error(actual, predicted),
        };
        if metrics.r2.is_nan() {
            warn!(rows = actual.len(), "R2 undefined: test target has zero variance");
        }
        Ok(metrics)
    }

    pub fn rmse(&self) -> f64 {
        self.mse.sqrt()
    }

    /// The bundle keyed by metric name (`MAE`, `MSE`, `R2`, `MAPE`).
    pub fn as_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("MAE", self.mae),
            ("MSE", self.mse),
            ("R2", self.r2),
            ("MAPE", self.mape),
        ])
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R2 {:.4} | MAE {:.2} kg | MSE {:.2} | MAPE {:.2}%",
            self.r2, self.mae, self.mse, self.mape
        )
    }
}
