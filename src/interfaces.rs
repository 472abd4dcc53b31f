//! Capability contracts shared by every pipeline stage.
//!
//! Each contract comes in two halves. The unfitted half holds configuration
//! and learns from data through `fit` (or `train`), which borrows `&self` and
//! returns a new fitted value. The fitted half only reads that value in
//! `transform` (or `predict`), so a fitted stage can be shared between callers
//! without locking.

use crate::errors::MlHelperResult;
use polars::prelude::*;

/// Disjoint, covering partition of a dataset.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: DataFrame,
    pub test: DataFrame,
}

/// Reads a tabular source and partitions it into train and test.
pub trait Loader {
    fn load(&self) -> MlHelperResult<Split>;
}

/// Whole-row preprocessing step (row filtering, imputation).
pub trait RowPreprocessor {
    type Fitted: FittedRowPreprocessor;

    /// Learn from `df` restricted to `columns`.
    fn fit(&self, df: &DataFrame, columns: &[String]) -> MlHelperResult<Self::Fitted>;

    fn fit_transform(
        &self,
        df: &DataFrame,
        columns: &[String],
    ) -> MlHelperResult<(Self::Fitted, DataFrame)> {
        let fitted = self.fit(df, columns)?;
        let transformed = fitted.transform(df, columns)?;
        Ok((fitted, transformed))
    }
}

pub trait FittedRowPreprocessor {
    /// Return a new frame; `df` is never modified.
    fn transform(&self, df: &DataFrame, columns: &[String]) -> MlHelperResult<DataFrame>;
}

/// Column-level feature engineering step (encoding, scaling).
pub trait FeatureEngineer {
    type Fitted: FittedFeatureEngineer;

    /// `target`, when given, must be aligned row for row with `df`.
    fn fit(&self, df: &DataFrame, target: Option<&Series>) -> MlHelperResult<Self::Fitted>;

    fn fit_transform(
        &self,
        df: &DataFrame,
        target: Option<&Series>,
    ) -> MlHelperResult<(Self::Fitted, DataFrame)> {
        let fitted = self.fit(df, target)?;
        let transformed = fitted.transform(df)?;
        Ok((fitted, transformed))
    }
}

pub trait FittedFeatureEngineer {
    fn transform(&self, df: &DataFrame) -> MlHelperResult<DataFrame>;
}

/// Classification model bound to a feature/target schema.
pub trait Model {
    type Fitted: FittedModel;

    fn train(&self, x: &DataFrame, y: &Series) -> MlHelperResult<Self::Fitted>;
}

pub trait FittedModel {
    /// Probability table with one `class_i` column per class; rows sum to 1.
    fn predict(&self, x: &DataFrame) -> MlHelperResult<DataFrame>;
}
