//! Ordinary least squares with an intercept

use crate::error::{Result, WasteModelError};
use crate::schema::FeatureSchema;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::DataFrame;
use tracing::debug;

/// Relative variance below which a centred column counts as constant.
const CONSTANT_TOLERANCE: f64 = 1e-12;

/// Share of a column's variance that must remain after projecting out the
/// earlier columns for it to stay in the fit.
const COLLINEAR_TOLERANCE: f64 = 1e-9;

/// Solve the centred normal equations `G w = r` with a Cholesky factorisation
/// that skips rank-deficient columns.
///
/// A column is skipped when `skip[j]` is set or when its Schur complement
/// pivot is negligible relative to its own variance. For a positive
/// semi-definite `G` such a column is a linear combination of the columns
/// kept before it, so pinning its weight to zero leaves the fitted values
/// unchanged. Returns the weights and the indices of skipped columns.
fn solve_normal_equations(
    gram: &Array2<f64>,
    rhs: &Array1<f64>,
    skip: &[bool],
) -> (Array1<f64>, Vec<usize>) {
    let n = gram.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    let mut active = vec![false; n];

    for j in 0..n {
        if skip[j] {
            continue;
        }
        let mut sum = 0.0;
        for k in 0..j {
            sum += l[[j, k]] * l[[j, k]];
        }
        let pivot = gram[[j, j]] - sum;
        if pivot <= COLLINEAR_TOLERANCE * gram[[j, j]] {
            continue;
        }

        l[[j, j]] = pivot.sqrt();
        active[j] = true;
        for i in (j + 1)..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = (gram[[i, j]] - sum) / l[[j, j]];
        }
    }

    // Forward substitution: L * z = r
    let mut z = Array1::<f64>::zeros(n);
    for i in (0..n).filter(|&i| active[i]) {
        let mut sum = 0.0;
        for k in 0..i {
            sum += l[[i, k]] * z[k];
        }
        z[i] = (rhs[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * w = z
    let mut w = Array1::<f64>::zeros(n);
    for i in (0..n).rev().filter(|&i| active[i]) {
        let mut sum = 0.0;
        for k in (i + 1)..n {
            sum += l[[k, i]] * w[k];
        }
        w[i] = (z[i] - sum) / l[[i, i]];
    }

    let skipped = (0..n).filter(|&j| !active[j]).collect();
    (w, skipped)
}

/// A fitted linear model: one weight per encoded feature plus an intercept,
/// and the feature schema the weights line up with.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    coefficients: Array1<f64>,
    intercept: f64,
    schema: FeatureSchema,
}

impl LinearRegression {
    /// Fit by minimising the squared residuals over the rows of `x`.
    ///
    /// Features and target are centred first, so the intercept is recovered as
    /// `mean(y) - mean(x) . w`. Constant or collinear columns get a zero weight.
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, schema: FeatureSchema) -> Result<Self> {
        let (n_rows, n_cols) = x.dim();
        if n_rows == 0 {
            return Err(WasteModelError::DegenerateData(
                "cannot fit a model on zero rows".to_string(),
            ));
        }
        if n_rows != y.len() {
            return Err(WasteModelError::Schema(format!(
                "feature matrix has {n_rows} rows but target has {}",
                y.len()
            )));
        }
        if n_cols != schema.n_features() {
            return Err(WasteModelError::Schema(format!(
                "feature matrix has {n_cols} columns, schema expects {}",
                schema.n_features()
            )));
        }

        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| WasteModelError::DegenerateData("empty feature matrix".to_string()))?;
        let y_mean = y
            .mean()
            .ok_or_else(|| WasteModelError::DegenerateData("empty target".to_string()))?;

        let xc = x - &x_mean;
        let yc = y - y_mean;
        let gram = xc.t().dot(&xc);
        let rhs = xc.t().dot(&yc);

        let skip: Vec<bool> = (0..n_cols)
            .map(|j| {
                let raw = x.column(j).iter().map(|v| v * v).sum::<f64>();
                gram[[j, j]] <= CONSTANT_TOLERANCE * raw
            })
            .collect();

        let (coefficients, skipped) = solve_normal_equations(&gram, &rhs, &skip);
        if !skipped.is_empty() {
            let names = schema.feature_names();
            let dropped: Vec<&str> = skipped.iter().map(|&j| names[j].as_str()).collect();
            debug!(columns = ?dropped, "Constant or collinear features given zero weight");
        }

        let intercept = y_mean - x_mean.dot(&coefficients);
        debug!(
            n_rows,
            n_features = n_cols,
            intercept,
            "Fitted linear regression"
        );

        Ok(Self {
            coefficients,
            intercept,
            schema,
        })
    }

    /// Predict from an already encoded matrix laid out per `schema()`.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(WasteModelError::Schema(format!(
                "expected {} feature columns, got {}",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }

    /// Encode raw dataset rows against the pinned schema, then predict.
    pub fn predict_frame(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let x = self.schema.encode(df)?;
        self.predict(&x)
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Weight of a named encoded feature, e.g. `area_South`.
    pub fn coefficient(&self, feature: &str) -> Option<f64> {
        self.schema
            .feature_names()
            .iter()
            .position(|name| name == feature)
            .map(|j| self.coefficients[j])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CategoricalLevels;
    use ndarray::array;

    fn schema_with(numeric: &[&str]) -> FeatureSchema {
        FeatureSchema {
            numeric: numeric.iter().map(|s| s.to_string()).collect(),
            categorical: Vec::<CategoricalLevels>::new(),
        }
    }

    #[test]
    fn test_exact_linear_fit() {
        // y = 3 + 2 a - b
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 5.0], [4.0, 2.0], [5.0, 3.0]];
        let y = array![5.0, 6.0, 4.0, 9.0, 10.0];
        let model = LinearRegression::fit(&x, &y, schema_with(&["a", "b"])).unwrap();

        assert!((model.intercept() - 3.0).abs() < 1e-9);
        assert!((model.coefficient("a").unwrap() - 2.0).abs() < 1e-9);
        assert!((model.coefficient("b").unwrap() + 1.0).abs() < 1e-9);

        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_column_gets_zero_weight() {
        let x = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0], [4.0, 7.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let model = LinearRegression::fit(&x, &y, schema_with(&["a", "c"])).unwrap();

        assert_eq!(model.coefficient("c"), Some(0.0));
        assert!((model.coefficient("a").unwrap() - 2.0).abs() < 1e-9);
        assert!(model.intercept().abs() < 1e-9);
    }

    #[test]
    fn test_collinear_column_keeps_predictions() {
        // third column = first + second
        let x = array![
            [1.0, 0.0, 1.0],
            [0.0, 1.0, 1.0],
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 1.0],
            [0.0, 1.0, 1.0],
            [0.0, 0.0, 0.0]
        ];
        let y = array![3.0, 5.0, 1.0, 3.2, 4.8, 1.0];
        let model = LinearRegression::fit(&x, &y, schema_with(&["a", "b", "a_or_b"])).unwrap();

        assert_eq!(model.coefficient("a_or_b"), Some(0.0));
        let pred = model.predict(&x).unwrap();
        assert!((pred[0] - 3.1).abs() < 1e-9);
        assert!((pred[1] - 4.9).abs() < 1e-9);
        assert!((pred[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_rows_is_degenerate() {
        let x = Array2::<f64>::zeros((0, 1));
        let y = Array1::<f64>::zeros(0);
        assert!(matches!(
            LinearRegression::fit(&x, &y, schema_with(&["a"])),
            Err(WasteModelError::DegenerateData(_))
        ));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        let model = LinearRegression::fit(&x, &y, schema_with(&["a"])).unwrap();
        assert!(matches!(
            model.predict(&array![[1.0, 2.0]]),
            Err(WasteModelError::Schema(_))
        ));
    }
}
