//! Column layout of the waste dataset and the drop-first indicator encoding
//! that turns it into a numeric feature matrix.

use crate::error::{Result, WasteModelError};
use ndarray::Array2;
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap};

pub const TARGET_COLUMN: &str = "waste_kg";

/// Numeric and flag features, in matrix order.
pub const NUMERIC_FEATURES: [&str; 8] = [
    "population",
    "collection_capacity_kg",
    "temp_c",
    "rain_mm",
    "overflow",
    "is_weekend",
    "is_holiday",
    "recycling_campaign",
];

/// Categorical features, expanded into indicator columns after the numeric ones.
pub const CATEGORICAL_FEATURES: [&str; 2] = ["day_name", "area"];

/// Every column the fit reads.
pub fn required_columns() -> impl Iterator<Item = &'static str> {
    std::iter::once(TARGET_COLUMN)
        .chain(NUMERIC_FEATURES)
        .chain(CATEGORICAL_FEATURES)
}

/// Fails with a schema error naming every required column that is absent,
/// or the first one holding nulls.
pub fn check_required_columns(df: &DataFrame) -> Result<()> {
    let present: BTreeSet<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let missing: Vec<&str> = required_columns()
        .filter(|name| !present.contains(*name))
        .collect();
    if !missing.is_empty() {
        return Err(WasteModelError::Schema(format!(
            "missing required column(s): {}",
            missing.join(", ")
        )));
    }

    for name in required_columns() {
        let nulls = column(df, name)?.null_count();
        if nulls > 0 {
            return Err(WasteModelError::Schema(format!(
                "column `{name}` contains {nulls} null value(s)"
            )));
        }
    }
    Ok(())
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|_| WasteModelError::Schema(format!("missing column `{name}`")))
}

/// Reads a column as `f64`. Booleans become 0/1, and so do `true`/`false`
/// strings in any case.
pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = column(df, name)?;

    match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|value| parse_numeric_cell(name, value))
            .collect(),
        _ => {
            let cast = series.strict_cast(&DataType::Float64).map_err(|e| {
                WasteModelError::Schema(format!("column `{name}` is not numeric: {e}"))
            })?;
            cast.f64()?
                .into_iter()
                .map(|value| value.ok_or_else(|| null_cell(name)))
                .collect()
        }
    }
}

fn parse_numeric_cell(name: &str, value: Option<&str>) -> Result<f64> {
    let raw = value.ok_or_else(|| null_cell(name))?.trim();
    match raw.to_ascii_lowercase().as_str() {
        "true" => Ok(1.0),
        "false" => Ok(0.0),
        other => other.parse::<f64>().map_err(|_| {
            WasteModelError::Schema(format!("column `{name}` holds non-numeric value `{raw}`"))
        }),
    }
}

/// Reads a categorical column as labels, casting non-string columns to text.
pub fn category_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = column(df, name)?;
    let text = series.cast(&DataType::String)?;

    text.str()?
        .into_iter()
        .map(|value| value.map(str::to_string).ok_or_else(|| null_cell(name)))
        .collect()
}

/// Distinct values of a column, ordered by the column's own dtype (so a
/// numeric `9` comes before `10`), then rendered as labels.
fn sorted_levels(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let distinct = column(df, name)?
        .unique()?
        .sort(SortOptions::default())?;
    let text = distinct.cast(&DataType::String)?;

    text.str()?
        .into_iter()
        .map(|value| value.map(str::to_string).ok_or_else(|| null_cell(name)))
        .collect()
}

fn null_cell(name: &str) -> WasteModelError {
    WasteModelError::Schema(format!("column `{name}` contains a null value"))
}

/// Observed levels of one categorical column. `levels[0]` is the reference
/// level and gets no indicator column.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalLevels {
    pub column: String,
    pub levels: Vec<String>,
}

impl CategoricalLevels {
    pub fn reference(&self) -> Option<&str> {
        self.levels.first().map(String::as_str)
    }

    pub fn indicator_names(&self) -> impl Iterator<Item = String> + '_ {
        self.levels
            .iter()
            .skip(1)
            .map(move |level| format!("{}_{}", self.column, level))
    }

    fn n_indicators(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }
}

/// Layout of an encoded feature matrix.
///
/// Built from the rows of one dataset, then kept on the fitted model so that
/// later rows are encoded into the same columns instead of columns derived
/// from whatever categories those rows happen to contain.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    pub numeric: Vec<String>,
    pub categorical: Vec<CategoricalLevels>,
}

impl FeatureSchema {
    /// Derives the schema from the categories present in `df`, sorted, so the
    /// smallest one becomes the reference level.
    pub fn observe(df: &DataFrame) -> Result<Self> {
        let categorical = CATEGORICAL_FEATURES
            .iter()
            .map(|&name| -> Result<CategoricalLevels> {
                Ok(CategoricalLevels {
                    column: name.to_string(),
                    levels: sorted_levels(df, name)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            numeric: NUMERIC_FEATURES.iter().map(|s| s.to_string()).collect(),
            categorical,
        })
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.numeric
            .iter()
            .cloned()
            .chain(self.categorical.iter().flat_map(|c| c.indicator_names()))
            .collect()
    }

    pub fn n_features(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(CategoricalLevels::n_indicators)
                .sum::<usize>()
    }

    /// Encodes `df` into an `n_rows x n_features` matrix. A category that is
    /// not one of the schema's levels is a schema error.
    pub fn encode(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let n_rows = df.height();
        let mut matrix = Array2::<f64>::zeros((n_rows, self.n_features()));

        for (j, name) in self.numeric.iter().enumerate() {
            let values = numeric_values(df, name)?;
            for (i, value) in values.into_iter().enumerate() {
                matrix[[i, j]] = value;
            }
        }

        let mut offset = self.numeric.len();
        for cat in &self.categorical {
            let index: HashMap<&str, usize> = cat
                .levels
                .iter()
                .enumerate()
                .map(|(k, level)| (level.as_str(), k))
                .collect();

            for (i, value) in category_values(df, &cat.column)?.iter().enumerate() {
                let k = *index.get(value.as_str()).ok_or_else(|| {
                    WasteModelError::Schema(format!(
                        "category `{value}` of column `{}` was not seen when the model was fit",
                        cat.column
                    ))
                })?;
                if k > 0 {
                    matrix[[i, offset + k - 1]] = 1.0;
                }
            }
            offset += cat.n_indicators();
        }

        Ok(matrix)
    }

    /// Wraps rows of an encoded matrix back into a named frame.
    pub fn to_frame(&self, matrix: &Array2<f64>) -> Result<DataFrame> {
        let names = self.feature_names();
        if names.len() != matrix.ncols() {
            return Err(WasteModelError::Schema(format!(
                "matrix has {} columns, schema has {}",
                matrix.ncols(),
                names.len()
            )));
        }

        let columns: Vec<Column> = names
            .iter()
            .zip(matrix.columns())
            .map(|(name, values)| Column::new(name.as_str().into(), values.to_vec()))
            .collect();

        Ok(DataFrame::new(columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df!(
            "waste_kg" => &[100.0, 120.0, 90.0],
            "population" => &[1000i64, 1200, 900],
            "collection_capacity_kg" => &[500.0, 500.0, 500.0],
            "temp_c" => &[30.1, 29.5, 31.0],
            "rain_mm" => &[0.0, 2.5, 0.0],
            "overflow" => &[0i64, 1, 0],
            "is_weekend" => &[false, false, true],
            "is_holiday" => &["False", "True", "false"],
            "recycling_campaign" => &[true, false, false],
            "day_name" => &["Monday", "Friday", "Saturday"],
            "area" => &["North", "South", "North"]
        )
        .unwrap()
    }

    #[test]
    fn test_required_columns_present() {
        assert!(check_required_columns(&sample()).is_ok());
    }

    #[test]
    fn test_missing_columns_are_all_named() {
        let df = sample().drop("waste_kg").unwrap().drop("area").unwrap();
        let err = check_required_columns(&df).unwrap_err();
        match err {
            WasteModelError::Schema(msg) => {
                assert!(msg.contains("waste_kg"));
                assert!(msg.contains("area"));
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_null_values_rejected() {
        let mut df = sample();
        df.with_column(Series::new("temp_c".into(), &[Some(1.0), None, Some(3.0)]))
            .unwrap();
        assert!(matches!(
            check_required_columns(&df),
            Err(WasteModelError::Schema(_))
        ));
    }

    #[test]
    fn test_flags_coerced_to_numbers() {
        let df = sample();
        assert_eq!(numeric_values(&df, "is_weekend").unwrap(), vec![0.0, 0.0, 1.0]);
        assert_eq!(numeric_values(&df, "is_holiday").unwrap(), vec![0.0, 1.0, 0.0]);
        assert_eq!(numeric_values(&df, "population").unwrap(), vec![1000.0, 1200.0, 900.0]);
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let mut df = sample();
        df.with_column(Series::new("rain_mm".into(), &["0.0", "heavy", "1.0"]))
            .unwrap();
        assert!(matches!(
            numeric_values(&df, "rain_mm"),
            Err(WasteModelError::Schema(_))
        ));
    }

    #[test]
    fn test_drop_first_encoding() {
        let df = sample();
        let schema = FeatureSchema::observe(&df).unwrap();

        assert_eq!(schema.categorical[0].reference(), Some("Friday"));
        assert_eq!(schema.categorical[1].reference(), Some("North"));
        let names = schema.feature_names();
        assert_eq!(names.len(), 8 + 2 + 1);
        assert_eq!(&names[8..], &["day_name_Monday", "day_name_Saturday", "area_South"]);

        let matrix = schema.encode(&df).unwrap();
        assert_eq!(matrix.dim(), (3, 11));
        // Monday, Friday (reference), Saturday
        assert_eq!(matrix.row(0).to_vec()[8..], [1.0, 0.0, 0.0]);
        assert_eq!(matrix.row(1).to_vec()[8..], [0.0, 0.0, 1.0]);
        assert_eq!(matrix.row(2).to_vec()[8..], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_numeric_categories_sorted_by_value() {
        let mut df = sample();
        df.with_column(Series::new("area".into(), &[9i64, 10, 9]))
            .unwrap();
        let schema = FeatureSchema::observe(&df).unwrap();

        assert_eq!(schema.categorical[1].reference(), Some("9"));
        assert_eq!(schema.feature_names().last().unwrap(), "area_10");

        let matrix = schema.encode(&df).unwrap();
        assert_eq!(matrix.column(10).to_vec(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_unseen_category_rejected() {
        let schema = FeatureSchema::observe(&sample()).unwrap();
        let mut other = sample();
        other
            .with_column(Series::new("area".into(), &["North", "East", "South"]))
            .unwrap();
        assert!(matches!(
            schema.encode(&other),
            Err(WasteModelError::Schema(_))
        ));
    }

    #[test]
    fn test_to_frame_names_columns() {
        let df = sample();
        let schema = FeatureSchema::observe(&df).unwrap();
        let frame = schema.to_frame(&schema.encode(&df).unwrap()).unwrap();
        assert_eq!(frame.shape(), (3, 11));
        assert!(frame.column("area_South").is_ok());
    }
}
