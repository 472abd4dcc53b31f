use crate::errors::{MlHelperError, MlHelperResult};
use polars::prelude::*;
use serde_json::{Map, Value};
use std::path::Path;

pub fn read_csv<P: AsRef<Path>>(path: P) -> MlHelperResult<LazyFrame> {
    LazyCsvReader::new(path)
        .with_has_header(true)
        .finish()
        .map_err(MlHelperError::PolarsError)
}

pub fn read_parquet<P: AsRef<Path>>(path: P) -> MlHelperResult<LazyFrame> {
    LazyFrame::scan_parquet(path, Default::default()).map_err(MlHelperError::PolarsError)
}

/// Read a CSV or Parquet table, chosen by file extension.
pub fn read_table<P: AsRef<Path>>(path: P) -> MlHelperResult<DataFrame> {
    let path = path.as_ref();
    let lf = if is_parquet(path) {
        read_parquet(path)?
    } else {
        read_csv(path)?
    };
    lf.collect().map_err(MlHelperError::PolarsError)
}

pub fn write_parquet<P: AsRef<Path>>(df: &DataFrame, path: P) -> MlHelperResult<()> {
    let file = std::fs::File::create(path).map_err(MlHelperError::IoError)?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(MlHelperError::PolarsError)?;
    Ok(())
}

pub fn write_csv<P: AsRef<Path>>(df: &DataFrame, path: P) -> MlHelperResult<()> {
    let mut file = std::fs::File::create(path).map_err(MlHelperError::IoError)?;
    CsvWriter::new(&mut file)
        .finish(&mut df.clone())
        .map_err(MlHelperError::PolarsError)?;
    Ok(())
}

/// Write a table as Parquet or CSV, chosen by file extension.
pub fn write_table<P: AsRef<Path>>(df: &DataFrame, path: P) -> MlHelperResult<()> {
    let path = path.as_ref();
    if is_parquet(path) {
        write_parquet(df, path)
    } else if path.extension().is_some_and(|ext| ext == "csv") {
        write_csv(df, path)
    } else {
        Err(MlHelperError::ConfigurationError(format!(
            "Unsupported output format for file: {}",
            path.display()
        )))
    }
}

fn is_parquet(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "parquet")
}

/// Build a one-row frame from a flat JSON object.
///
/// Numbers become Float64, strings String, booleans Boolean and nulls a
/// null Float64. Nested arrays and objects are rejected.
pub fn record_to_frame(record: &Map<String, Value>) -> MlHelperResult<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(record.len());
    for (name, value) in record {
        let series = match value {
            Value::Number(n) => Series::new(name.as_str().into(), [n.as_f64()]),
            Value::String(s) => Series::new(name.as_str().into(), [s.as_str()]),
            Value::Bool(b) => Series::new(name.as_str().into(), [*b]),
            Value::Null => Series::new(name.as_str().into(), [None::<f64>]),
            Value::Array(_) | Value::Object(_) => {
                return Err(MlHelperError::ValidationError(format!(
                    "Field '{}' must be a scalar value",
                    name
                )))
            }
        };
        columns.push(series.into());
    }
    DataFrame::new(columns).map_err(MlHelperError::PolarsError)
}
