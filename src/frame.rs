//! Column helpers shared by the preprocessing and feature stages.
//!
//! Missing means null, or NaN in a float column. Column auto-detection walks
//! the frame in its column order, so the detected list is stable for a given
//! schema.

use crate::errors::{MlHelperError, MlHelperResult};
use polars::prelude::*;

/// Look up a column, reporting absence as a validation failure.
pub fn require_column<'a>(df: &'a DataFrame, name: &str) -> MlHelperResult<&'a Column> {
    df.column(name).map_err(|_| {
        MlHelperError::ValidationError(format!("Column '{}' not found in dataset", name))
    })
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// `true` for every row whose value in `name` is missing.
pub fn missing_mask(df: &DataFrame, name: &str) -> MlHelperResult<Vec<bool>> {
    let column = require_column(df, name)?;
    let mask = if column.dtype().is_float() {
        let floats = column.cast(&DataType::Float64)?;
        floats
            .f64()?
            .into_iter()
            .map(|v| v.map_or(true, f64::is_nan))
            .collect()
    } else {
        column
            .is_null()
            .into_iter()
            .map(|v| v.unwrap_or(false))
            .collect()
    };
    Ok(mask)
}

pub fn missing_count(df: &DataFrame, name: &str) -> MlHelperResult<usize> {
    Ok(missing_mask(df, name)?.into_iter().filter(|m| *m).count())
}

/// Numeric view of a column as Float64 with NaN folded into null.
pub fn numeric_values(df: &DataFrame, name: &str) -> MlHelperResult<Float64Chunked> {
    let column = require_column(df, name)?;
    if !column.dtype().is_primitive_numeric() {
        return Err(MlHelperError::ValidationError(format!(
            "Column '{}' must be numeric, found {}",
            name,
            column.dtype()
        )));
    }
    let floats = column.cast(&DataType::Float64)?;
    let values = floats
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    Ok(values)
}

/// Categorical view of a column as strings.
pub fn string_values(df: &DataFrame, name: &str) -> MlHelperResult<StringChunked> {
    let column = require_column(df, name)?;
    let strings = column.cast(&DataType::String)?;
    Ok(strings.str()?.clone())
}

/// String-typed columns, in frame order.
pub fn string_columns(df: &DataFrame, exclude: &[String]) -> Vec<String> {
    detect_columns(df, exclude, |dtype| matches!(dtype, DataType::String))
}

/// Numeric (non-boolean) columns, in frame order.
pub fn numeric_columns(df: &DataFrame, exclude: &[String]) -> Vec<String> {
    detect_columns(df, exclude, DataType::is_primitive_numeric)
}

fn detect_columns(
    df: &DataFrame,
    exclude: &[String],
    keep: impl Fn(&DataType) -> bool,
) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| keep(c.dtype()))
        .map(|c| c.name().to_string())
        .filter(|name| !exclude.contains(name))
        .collect()
}
