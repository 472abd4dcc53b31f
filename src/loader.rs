//! Tabular source loading and seeded train/test partitioning.

use crate::errors::{MlHelperError, MlHelperResult};
use crate::frame::has_column;
use crate::interfaces::{Loader, Split};
use crate::io;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Provenance column when no `index_col` is configured. A source that
/// already has it (e.g. a pandas export) keeps its own values.
pub const ROW_INDEX_COLUMN: &str = "index";

#[derive(Debug, Clone)]
pub struct DataLoader {
    path: PathBuf,
    frac: f64,
    seed: u64,
    index_col: Option<String>,
}

impl DataLoader {
    /// `frac` is the test fraction and must lie strictly between 0 and 1.
    pub fn new(path: impl Into<PathBuf>, frac: f64, seed: u64) -> MlHelperResult<Self> {
        if !(frac > 0.0 && frac < 1.0) {
            return Err(MlHelperError::ConfigurationError(format!(
                "Test fraction must be in (0, 1), got {}",
                frac
            )));
        }
        Ok(Self {
            path: path.into(),
            frac,
            seed,
            index_col: None,
        })
    }

    /// Use an existing column as row provenance instead of a generated one.
    pub fn with_index_col(mut self, index_col: impl Into<String>) -> Self {
        self.index_col = Some(index_col.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the provenance column present in both splits.
    pub fn index_column(&self) -> &str {
        self.index_col.as_deref().unwrap_or(ROW_INDEX_COLUMN)
    }

    fn read(&self) -> MlHelperResult<DataFrame> {
        if !self.path.is_file() {
            return Err(MlHelperError::DataError(format!(
                "Source '{}' does not exist or is not a file",
                self.path.display()
            )));
        }
        let df = io::read_table(&self.path).map_err(|e| {
            MlHelperError::DataError(format!(
                "Failed to read '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        match &self.index_col {
            Some(name) if has_column(&df, name) => Ok(df),
            Some(name) => Err(MlHelperError::DataError(format!(
                "Index column '{}' not found in '{}'",
                name,
                self.path.display()
            ))),
            None if has_column(&df, ROW_INDEX_COLUMN) => {
                debug!("Using the source's '{}' column as row index", ROW_INDEX_COLUMN);
                Ok(df)
            }
            None => Ok(df.with_row_index(ROW_INDEX_COLUMN.into(), None)?),
        }
    }

    /// Partition `df` into train and test.
    ///
    /// The test split holds `round(frac * n)` rows (ties to even) drawn by a
    /// shuffle seeded with `seed`; both splits keep the original row order.
    pub fn split(&self, df: &DataFrame) -> MlHelperResult<Split> {
        let n_rows = df.height();
        let n_test = (self.frac * n_rows as f64).round_ties_even() as usize;

        let mut positions: Vec<usize> = (0..n_rows).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        positions.shuffle(&mut rng);

        let mut is_test = vec![false; n_rows];
        for &position in &positions[..n_test] {
            is_test[position] = true;
        }

        let test_mask: BooleanChunked = is_test.iter().copied().collect();
        let train_mask: BooleanChunked = is_test.iter().map(|t| !t).collect();

        let split = Split {
            train: df.filter(&train_mask)?,
            test: df.filter(&test_mask)?,
        };
        debug!(
            seed = self.seed,
            train_rows = split.train.height(),
            test_rows = split.test.height(),
            "Split dataset"
        );
        Ok(split)
    }
}

impl Loader for DataLoader {
    fn load(&self) -> MlHelperResult<Split> {
        info!("Reading input: {:?}", self.path);
        let df = self.read()?;
        self.split(&df)
    }
}
