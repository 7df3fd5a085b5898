//! Fit configuration

use crate::error::{Result, WasteModelError};

/// Share of rows held out for evaluation.
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

/// Shuffle seed; a fixed value keeps the split identical between calls.
pub const DEFAULT_SEED: u64 = 42;

/// Knobs for the train/test split.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub test_size: f64,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            test_size: DEFAULT_TEST_SIZE,
            seed: DEFAULT_SEED,
        }
    }
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(WasteModelError::Config(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        Ok(())
    }

    /// Number of test rows for a table of `n_rows`: `ceil(test_size * n_rows)`.
    pub fn test_rows(&self, n_rows: usize) -> usize {
        (self.test_size * n_rows as f64).ceil() as usize
    }
}
