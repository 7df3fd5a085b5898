pub mod config;
pub mod error;
pub mod linear;
pub mod metrics;
pub mod schema;

pub use config::ModelConfig;
pub use error::{Result, WasteModelError};
pub use linear::LinearRegression;
pub use metrics::Metrics;
pub use schema::FeatureSchema;

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Dataset the dashboard reads when no path is given.
pub const DEFAULT_DATA_PATH: &str = "sustainable_waste_management_dataset_2024.csv";

pub fn load_csv_file(file_path: impl AsRef<Path>) -> Result<DataFrame> {
    let file_path = file_path.as_ref();

    // the handle is dropped when the reader finishes, on success or error;
    // dtypes are inferred from every row, not a prefix
    let file = File::open(file_path).map_err(|e| {
        WasteModelError::DataSource(format!("cannot open {}: {e}", file_path.display()))
    })?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(file)
        .finish()
        .map_err(|e| {
            WasteModelError::DataSource(format!("cannot parse {}: {e}", file_path.display()))
        })?;

    info!(
        path = %file_path.display(),
        rows = df.height(),
        columns = df.width(),
        "Loaded dataset"
    );

    Ok(df)
}

/// Encoded features and target of a dataset, plus the column layout the
/// encoding produced.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub schema: FeatureSchema,
    pub features: Array2<f64>,
    pub target: Array1<f64>,
}

pub fn split_features_and_target(df: &DataFrame) -> Result<PreparedData> {
    schema::check_required_columns(df)?;

    let target = Array1::from(schema::numeric_values(df, schema::TARGET_COLUMN)?);

    // indicator columns come from the categories present in this frame
    let feature_schema = FeatureSchema::observe(df)?;
    let features = feature_schema.encode(df)?;

    debug!(
        features = ?feature_schema.feature_names(),
        "Encoded feature matrix"
    );

    Ok(PreparedData {
        schema: feature_schema,
        features,
        target,
    })
}

/// Row indices of the two partitions.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n_rows` with the configured seed and hold out
/// `ceil(test_size * n_rows)` of them for testing.
pub fn train_test_split(n_rows: usize, config: &ModelConfig) -> Result<TrainTestSplit> {
    config.validate()?;
    if n_rows < 2 {
        return Err(WasteModelError::DegenerateData(format!(
            "need at least 2 rows to split into train and test, got {n_rows}"
        )));
    }

    let n_test = config.test_rows(n_rows);
    if n_test >= n_rows {
        return Err(WasteModelError::Config(format!(
            "test_size {} leaves no training rows out of {n_rows}",
            config.test_size
        )));
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    debug!(train = train.len(), test = indices.len(), seed = config.seed, "Split rows");

    Ok(TrainTestSplit {
        train,
        test: indices,
    })
}

/// Everything one fit produces for the dashboard.
#[derive(Debug, Clone)]
pub struct WasteModelRun {
    /// The loaded table, untouched.
    pub dataset: DataFrame,
    /// Encoded feature rows of the test partition.
    pub x_test: DataFrame,
    pub y_test: Array1<f64>,
    pub y_pred: Array1<f64>,
    pub metrics: Metrics,
    pub model: LinearRegression,
    /// Position of each test row in `dataset`.
    pub test_indices: Vec<usize>,
}

impl WasteModelRun {
    pub fn residuals(&self) -> Array1<f64> {
        metrics::residuals(self.y_test.view(), self.y_pred.view())
    }

    pub fn into_parts(self) -> (DataFrame, DataFrame, Array1<f64>, Array1<f64>, Metrics) {
        (self.dataset, self.x_test, self.y_test, self.y_pred, self.metrics)
    }
}

// Pipeline:
// 1. Load the CSV file
// 2. Split into encoded features and target
// 3. Split rows into train and test sets
// 4. Fit least squares on the train rows
// 5. Predict and evaluate the test rows
pub fn train_waste_model(file_path: impl AsRef<Path>) -> Result<WasteModelRun> {
    train_waste_model_with_config(file_path, &ModelConfig::default())
}

pub fn train_waste_model_with_config(
    file_path: impl AsRef<Path>,
    config: &ModelConfig,
) -> Result<WasteModelRun> {
    let df = load_csv_file(file_path)?;
    train_waste_model_from_frame(df, config)
}

pub fn train_waste_model_from_frame(df: DataFrame, config: &ModelConfig) -> Result<WasteModelRun> {
    let PreparedData {
        schema,
        features,
        target,
    } = split_features_and_target(&df)?;

    let split = train_test_split(df.height(), config)?;

    let x_train = features.select(Axis(0), &split.train);
    let y_train = target.select(Axis(0), &split.train);
    let x_test = features.select(Axis(0), &split.test);
    let y_test = target.select(Axis(0), &split.test);

    let model = LinearRegression::fit(&x_train, &y_train, schema)?;
    let y_pred = model.predict(&x_test)?;
    let metrics = Metrics::compute(y_test.view(), y_pred.view())?;

    info!(
        mae = metrics.mae,
        mse = metrics.mse,
        r2 = metrics.r2,
        "Evaluated waste model on test rows"
    );

    Ok(WasteModelRun {
        x_test: model.schema().to_frame(&x_test)?,
        dataset: df,
        y_test,
        y_pred,
        metrics,
        model,
        test_indices: split.test,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_train_test_split_sizes() {
        let split = train_test_split(11, &ModelConfig::default()).unwrap();
        assert_eq!(split.test.len(), 3);
        assert_eq!(split.train.len(), 8);

        let all: HashSet<usize> = split.train.iter().chain(&split.test).copied().collect();
        assert_eq!(all.len(), 11);
    }

    #[test]
    fn test_train_test_split_reproducible() {
        let config = ModelConfig::default();
        assert_eq!(
            train_test_split(50, &config).unwrap(),
            train_test_split(50, &config).unwrap()
        );
        assert_ne!(
            train_test_split(50, &config).unwrap(),
            train_test_split(50, &config.clone().with_seed(7)).unwrap()
        );
    }

    #[test]
    fn test_train_test_split_too_few_rows() {
        for n in [0, 1] {
            assert!(matches!(
                train_test_split(n, &ModelConfig::default()),
                Err(WasteModelError::DegenerateData(_))
            ));
        }
    }

    #[test]
    fn test_train_test_split_empty_train() {
        let config = ModelConfig::default().with_test_size(0.9);
        assert!(matches!(
            train_test_split(2, &config),
            Err(WasteModelError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_data_source_error() {
        assert!(matches!(
            load_csv_file("does/not/exist.csv"),
            Err(WasteModelError::DataSource(_))
        ));
    }
}
