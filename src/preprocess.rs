//! Row preprocessors: dropping incomplete rows and statistical imputation.

use crate::errors::{MlHelperError, MlHelperResult};
use crate::frame::{missing_count, missing_mask, numeric_values, require_column};
use crate::interfaces::{FittedRowPreprocessor, RowPreprocessor};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

fn require_columns(stage: &str, columns: &[String]) -> MlHelperResult<()> {
    if columns.is_empty() {
        return Err(MlHelperError::ValidationError(format!(
            "{} requires an explicit column set",
            stage
        )));
    }
    Ok(())
}

// ============================================================================
// Drop-Missing
// ============================================================================

/// Removes every row with a missing value in any of the given columns.
///
/// Stateless: fitting returns the same value.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DropMissing;

impl RowPreprocessor for DropMissing {
    type Fitted = DropMissing;

    fn fit(&self, _df: &DataFrame, _columns: &[String]) -> MlHelperResult<DropMissing> {
        Ok(*self)
    }
}

impl FittedRowPreprocessor for DropMissing {
    fn transform(&self, df: &DataFrame, columns: &[String]) -> MlHelperResult<DataFrame> {
        require_columns("drop_missing", columns)?;

        let mut keep = vec![true; df.height()];
        for column in columns {
            for (k, missing) in keep.iter_mut().zip(missing_mask(df, column)?) {
                *k &= !missing;
            }
        }

        let mask: BooleanChunked = keep.into_iter().collect();
        let result = df.filter(&mask)?;
        debug!(
            dropped = df.height() - result.height(),
            "Dropped rows with missing values"
        );
        Ok(result)
    }
}

// ============================================================================
// Imputation
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImputeMethod {
    Mean,
    Median,
    Mode,
}

impl FromStr for ImputeMethod {
    type Err = MlHelperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "mode" => Ok(Self::Mode),
            _ => Err(MlHelperError::ConfigurationError(format!(
                "Imputation method '{}' not recognized",
                s
            ))),
        }
    }
}

/// Fill value learned for one column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FillValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImputeEntry {
    pub column: String,
    pub value: FillValue,
}

/// Fill values learned by [`Imputer::fit`], in fit column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImputeState {
    pub method: ImputeMethod,
    pub entries: Vec<ImputeEntry>,
}

impl ImputeState {
    pub fn fill_value(&self, column: &str) -> Option<&FillValue> {
        self.entries
            .iter()
            .find(|e| e.column == column)
            .map(|e| &e.value)
    }

    /// Copy of this state that leaves `column` untouched.
    pub fn without_column(&self, column: &str) -> ImputeState {
        ImputeState {
            method: self.method,
            entries: self
                .entries
                .iter()
                .filter(|e| e.column != column)
                .cloned()
                .collect(),
        }
    }
}

/// Replaces missing values with a per-column mean, median or mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Imputer {
    method: ImputeMethod,
}

impl Imputer {
    /// Parse the method by name; unknown names are a configuration error.
    pub fn new(method: &str) -> MlHelperResult<Self> {
        Ok(Self::with_method(method.parse()?))
    }

    pub fn with_method(method: ImputeMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> ImputeMethod {
        self.method
    }
}

impl Default for Imputer {
    fn default() -> Self {
        Self::with_method(ImputeMethod::Mean)
    }
}

impl RowPreprocessor for Imputer {
    type Fitted = ImputeState;

    fn fit(&self, df: &DataFrame, columns: &[String]) -> MlHelperResult<ImputeState> {
        require_columns("impute", columns)?;

        let mut entries = Vec::with_capacity(columns.len());
        for column in columns {
            let value = match self.method {
                ImputeMethod::Mean => FillValue::Number(
                    numeric_values(df, column)?
                        .mean()
                        .ok_or_else(|| no_values(column))?,
                ),
                ImputeMethod::Median => FillValue::Number(
                    numeric_values(df, column)?
                        .median()
                        .ok_or_else(|| no_values(column))?,
                ),
                ImputeMethod::Mode => fit_mode(df, column)?,
            };
            debug!(column = %column, value = ?value, method = ?self.method, "Fitted imputation value");
            entries.push(ImputeEntry {
                column: column.clone(),
                value,
            });
        }

        Ok(ImputeState {
            method: self.method,
            entries,
        })
    }
}

impl FittedRowPreprocessor for ImputeState {
    /// Fills the columns recorded at fit time; `columns` is informational.
    fn transform(&self, df: &DataFrame, _columns: &[String]) -> MlHelperResult<DataFrame> {
        let mut result = df.clone();

        for entry in &self.entries {
            if missing_count(&result, &entry.column)? == 0 {
                continue;
            }
            let column = require_column(&result, &entry.column)?;
            let name: PlSmallStr = entry.column.as_str().into();

            let filled = match &entry.value {
                FillValue::Number(fill) => {
                    if !column.dtype().is_primitive_numeric() {
                        return Err(MlHelperError::ValidationError(format!(
                            "Cannot fill non-numeric column '{}' with {}",
                            entry.column, fill
                        )));
                    }
                    let floats = column.cast(&DataType::Float64)?;
                    let values: Vec<f64> = floats
                        .f64()?
                        .into_iter()
                        .map(|v| v.filter(|x| !x.is_nan()).unwrap_or(*fill))
                        .collect();
                    Series::new(name, values)
                }
                FillValue::Text(fill) => {
                    // an all-null column carries no type of its own
                    let column = if column.null_count() == column.len() {
                        column.cast(&DataType::String)?
                    } else {
                        column.clone()
                    };
                    let strings = column.str().map_err(|_| {
                        MlHelperError::ValidationError(format!(
                            "Cannot fill non-string column '{}' with '{}'",
                            entry.column, fill
                        ))
                    })?;
                    let values: Vec<&str> = strings
                        .into_iter()
                        .map(|v| v.unwrap_or(fill.as_str()))
                        .collect();
                    Series::new(name, values)
                }
            };
            result.with_column(filled)?;
        }

        Ok(result)
    }
}

fn no_values(column: &str) -> MlHelperError {
    MlHelperError::ValidationError(format!("Column '{}' has no observed values", column))
}

/// Most frequent value; ties resolve to the smallest.
fn fit_mode(df: &DataFrame, column: &str) -> MlHelperResult<FillValue> {
    let dtype = require_column(df, column)?.dtype().clone();

    if dtype.is_primitive_numeric() {
        let mut values: Vec<f64> = numeric_values(df, column)?.into_iter().flatten().collect();
        values.sort_by(f64::total_cmp);

        let mut best: Option<(f64, usize)> = None;
        for run in values.chunk_by(|a, b| a == b) {
            if best.map_or(true, |(_, count)| run.len() > count) {
                best = Some((run[0], run.len()));
            }
        }
        best.map(|(v, _)| FillValue::Number(v))
            .ok_or_else(|| no_values(column))
    } else if dtype == DataType::String {
        let column_ref = require_column(df, column)?;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for value in column_ref.str()?.into_iter().flatten() {
            *counts.entry(value).or_insert(0) += 1;
        }

        let mut best: Option<(&str, usize)> = None;
        for (value, count) in counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((value, count));
            }
        }
        best.map(|(v, _)| FillValue::Text(v.to_string()))
            .ok_or_else(|| no_values(column))
    } else {
        Err(MlHelperError::ValidationError(format!(
            "Mode imputation does not support column '{}' of type {}",
            column, dtype
        )))
    }
}

// ============================================================================
// Closed variant set
// ============================================================================

/// Row preprocessors selectable by name.
#[derive(Debug, Clone, PartialEq)]
pub enum Preprocessor {
    DropMissing(DropMissing),
    Impute(Imputer),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FittedPreprocessor {
    DropMissing,
    Impute(ImputeState),
}

impl Preprocessor {
    /// `method` is only read by `impute`.
    pub fn from_name(name: &str, method: Option<&str>) -> MlHelperResult<Self> {
        match name {
            "drop_missing" => Ok(Self::DropMissing(DropMissing)),
            "impute" => Ok(Self::Impute(Imputer::new(method.unwrap_or("mean"))?)),
            _ => Err(MlHelperError::ConfigurationError(format!(
                "Preprocessor '{}' not supported",
                name
            ))),
        }
    }
}

impl RowPreprocessor for Preprocessor {
    type Fitted = FittedPreprocessor;

    fn fit(&self, df: &DataFrame, columns: &[String]) -> MlHelperResult<FittedPreprocessor> {
        match self {
            Self::DropMissing(stage) => {
                stage.fit(df, columns)?;
                Ok(FittedPreprocessor::DropMissing)
            }
            Self::Impute(stage) => Ok(FittedPreprocessor::Impute(stage.fit(df, columns)?)),
        }
    }
}

impl FittedRowPreprocessor for FittedPreprocessor {
    fn transform(&self, df: &DataFrame, columns: &[String]) -> MlHelperResult<DataFrame> {
        match self {
            Self::DropMissing => DropMissing.transform(df, columns),
            Self::Impute(state) => state.transform(df, columns),
        }
    }
}
