//! Feature Engineering module
//!
//! Implements the fit/transform pattern for categorical encoding (one-hot,
//! target mean) and standard scaling. Fitting never touches the stage; it
//! returns a serializable state that `transform` only reads.

use crate::errors::{MlHelperError, MlHelperResult};
use crate::frame::{
    has_column, numeric_columns, numeric_values, require_column, string_columns, string_values,
};
use crate::interfaces::{FeatureEngineer, FittedFeatureEngineer};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::debug;

/// Categorical encoding methods
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMethod {
    #[serde(rename = "onehot")]
    OneHot,
    Target,
}

impl FromStr for EncodingMethod {
    type Err = MlHelperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onehot" | "one_hot" => Ok(Self::OneHot),
            "target" => Ok(Self::Target),
            _ => Err(MlHelperError::ConfigurationError(format!(
                "Unsupported encoding method: {}",
                s
            ))),
        }
    }
}

/// Value kind of a categorical column at fit time.
///
/// Categories are compared as strings. A record whose column arrives as a
/// float (every JSON number does) is relabelled with the fit-time kind, so
/// `3.0` matches the integer category `3`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Integer,
    #[default]
    Text,
    Other,
}

impl CategoryKind {
    fn of(dtype: &DataType) -> Self {
        if dtype.is_integer() {
            Self::Integer
        } else if matches!(dtype, DataType::String) {
            Self::Text
        } else {
            Self::Other
        }
    }
}

/// Vocabulary for OneHot encoding of one column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OneHotVocab {
    pub column: String,
    #[serde(default)]
    pub kind: CategoryKind,
    /// Smallest observed category; encoded as all indicators false.
    pub reference: Option<String>,
    /// Categories that get an indicator column, sorted.
    pub categories: Vec<String>,
}

/// Per-category target means for one column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetMeans {
    pub column: String,
    #[serde(default)]
    pub kind: CategoryKind,
    pub means: BTreeMap<String, f64>,
    /// Mean of `means`, used for categories not seen at fit.
    pub fallback: f64,
}

/// Statistics for Standard scaling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandardStats {
    pub column: String,
    pub mean: f64,
    pub std: f64,
}

// ============================================================================
// Categorical encoding
// ============================================================================

/// Encodes categorical columns with one method chosen at construction.
///
/// Without explicit columns the encoder selects every String column of the
/// fit frame, in frame order, minus `exclude`.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalEncoder {
    method: EncodingMethod,
    columns: Option<Vec<String>>,
    exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum EncoderState {
    #[serde(rename = "onehot")]
    OneHot { vocabs: Vec<OneHotVocab> },
    Target { encodings: Vec<TargetMeans> },
}

impl CategoricalEncoder {
    pub fn new(method: &str, columns: Option<Vec<String>>) -> MlHelperResult<Self> {
        Ok(Self::with_method(method.parse()?, columns))
    }

    pub fn with_method(method: EncodingMethod, columns: Option<Vec<String>>) -> Self {
        Self {
            method,
            columns,
            exclude: Vec::new(),
        }
    }

    /// Columns never selected by auto-detection (e.g. a string row id).
    pub fn exclude(mut self, columns: Vec<String>) -> Self {
        self.exclude = columns;
        self
    }

    pub fn method(&self) -> EncodingMethod {
        self.method
    }

    fn select_columns(&self, df: &DataFrame) -> MlHelperResult<Vec<String>> {
        match &self.columns {
            Some(columns) => {
                for column in columns {
                    require_column(df, column)?;
                }
                Ok(columns.clone())
            }
            None => Ok(string_columns(df, &self.exclude)),
        }
    }
}

impl FeatureEngineer for CategoricalEncoder {
    type Fitted = EncoderState;

    fn fit(&self, df: &DataFrame, target: Option<&Series>) -> MlHelperResult<EncoderState> {
        let columns = self.select_columns(df)?;
        debug!(columns = ?columns, method = ?self.method, "Fitting categorical encoder");

        match self.method {
            EncodingMethod::OneHot => {
                let vocabs = columns
                    .iter()
                    .map(|column| fit_onehot(df, column))
                    .collect::<MlHelperResult<Vec<_>>>()?;
                Ok(EncoderState::OneHot { vocabs })
            }
            EncodingMethod::Target => {
                let target = target.ok_or_else(|| {
                    MlHelperError::ValidationError(
                        "target must be provided for target encoding".to_string(),
                    )
                })?;
                let encodings = columns
                    .iter()
                    .map(|column| fit_target(df, column, target))
                    .collect::<MlHelperResult<Vec<_>>>()?;
                Ok(EncoderState::Target { encodings })
            }
        }
    }
}

impl EncoderState {
    /// Input columns consumed by this state.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::OneHot { vocabs } => vocabs.iter().map(|v| v.column.as_str()).collect(),
            Self::Target { encodings } => encodings.iter().map(|e| e.column.as_str()).collect(),
        }
    }
}

impl FittedFeatureEngineer for EncoderState {
    fn transform(&self, df: &DataFrame) -> MlHelperResult<DataFrame> {
        let mut result = df.clone();
        match self {
            Self::OneHot { vocabs } => {
                for vocab in vocabs {
                    result = transform_onehot(&result, vocab)?;
                }
            }
            Self::Target { encodings } => {
                for encoding in encodings {
                    result = transform_target(&result, encoding)?;
                }
            }
        }
        Ok(result)
    }
}

/// Fit OneHot encoder on a column
pub fn fit_onehot(df: &DataFrame, column: &str) -> MlHelperResult<OneHotVocab> {
    let kind = CategoryKind::of(require_column(df, column)?.dtype());
    let values = string_values(df, column)?;
    let mut categories: Vec<String> = values
        .into_iter()
        .flatten()
        .map(|s| s.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let reference = if categories.is_empty() {
        None
    } else {
        Some(categories.remove(0))
    };

    Ok(OneHotVocab {
        column: column.to_string(),
        kind,
        reference,
        categories,
    })
}

/// Replace a column with one Boolean indicator per non-reference category
///
/// A frame without the column passes through unchanged.
pub fn transform_onehot(df: &DataFrame, vocab: &OneHotVocab) -> MlHelperResult<DataFrame> {
    if !has_column(df, &vocab.column) {
        debug!(column = %vocab.column, "Column absent, skipping one-hot encoding");
        return Ok(df.clone());
    }
    let values = &category_values(df, &vocab.column, vocab.kind)?;

    let indicators: Vec<Column> = vocab
        .categories
        .iter()
        .map(|category| {
            let name = format!("{}_{}", vocab.column, category);
            let flags: Vec<bool> = values
                .into_iter()
                .map(|v| v == Some(category.as_str()))
                .collect();
            Series::new(name.into(), flags).into()
        })
        .collect();

    replace_column(df, &vocab.column, indicators)
}

/// Fit per-category target means on a column
pub fn fit_target(df: &DataFrame, column: &str, target: &Series) -> MlHelperResult<TargetMeans> {
    if target.len() != df.height() {
        return Err(MlHelperError::ValidationError(format!(
            "target has {} rows but the dataset has {}",
            target.len(),
            df.height()
        )));
    }
    if !(target.dtype().is_primitive_numeric() || target.dtype().is_bool()) {
        return Err(MlHelperError::ValidationError(format!(
            "target must be numeric or boolean for target encoding, found {}",
            target.dtype()
        )));
    }

    let kind = CategoryKind::of(require_column(df, column)?.dtype());
    let categories = string_values(df, column)?;
    let outcomes = target.cast(&DataType::Float64)?;
    let outcomes = outcomes.f64()?;

    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (category, outcome) in categories.into_iter().zip(outcomes.into_iter()) {
        if let (Some(category), Some(outcome)) = (category, outcome) {
            if outcome.is_nan() {
                continue;
            }
            let entry = sums.entry(category.to_string()).or_insert((0.0, 0));
            entry.0 += outcome;
            entry.1 += 1;
        }
    }

    if sums.is_empty() {
        return Err(MlHelperError::ValidationError(format!(
            "Column '{}' has no observed categories with a target value",
            column
        )));
    }

    let means: BTreeMap<String, f64> = sums
        .into_iter()
        .map(|(category, (sum, count))| (category, sum / count as f64))
        .collect();
    let fallback = means.values().sum::<f64>() / means.len() as f64;

    Ok(TargetMeans {
        column: column.to_string(),
        kind,
        means,
        fallback,
    })
}

/// Replace a column with `{column}_te` holding per-category target means
pub fn transform_target(df: &DataFrame, encoding: &TargetMeans) -> MlHelperResult<DataFrame> {
    if !has_column(df, &encoding.column) {
        debug!(column = %encoding.column, "Column absent, skipping target encoding");
        return Ok(df.clone());
    }
    let values = category_values(df, &encoding.column, encoding.kind)?;
    let encoded: Vec<f64> = values
        .into_iter()
        .map(|v| {
            v.and_then(|category| encoding.means.get(category).copied())
                .unwrap_or(encoding.fallback)
        })
        .collect();

    let name = format!("{}_te", encoding.column);
    let series = Series::new(name.into(), encoded);
    replace_column(df, &encoding.column, vec![series.into()])
}

/// String labels of a categorical column, read the way they were at fit.
fn category_values(
    df: &DataFrame,
    column: &str,
    kind: CategoryKind,
) -> MlHelperResult<StringChunked> {
    let values = require_column(df, column)?;
    if kind == CategoryKind::Integer && values.dtype().is_float() {
        let floats = values.cast(&DataType::Float64)?;
        let labels: StringChunked = floats
            .f64()?
            .into_iter()
            .map(|v| v.map(integer_label))
            .collect();
        return Ok(labels);
    }
    string_values(df, column)
}

fn integer_label(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Drop `column` and append `encoded`, refusing to shadow another column.
fn replace_column(
    df: &DataFrame,
    column: &str,
    encoded: Vec<Column>,
) -> MlHelperResult<DataFrame> {
    let kept = df.drop(column)?;
    if let Some(clash) = encoded.iter().find(|c| has_column(&kept, c.name().as_str())) {
        return Err(MlHelperError::ValidationError(format!(
            "Encoding '{}' would create column '{}', which already exists",
            column,
            clash.name()
        )));
    }
    Ok(kept.hstack(&encoded)?)
}

// ============================================================================
// Standard scaling
// ============================================================================

/// Rescales numeric columns to zero mean and unit sample standard deviation.
///
/// Without explicit columns the scaler selects every numeric, non-boolean
/// column of the fit frame, in frame order, minus `exclude`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureScaler {
    columns: Option<Vec<String>>,
    exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalerState {
    pub stats: Vec<StandardStats>,
}

impl FeatureScaler {
    pub fn new(columns: Option<Vec<String>>) -> Self {
        Self {
            columns,
            exclude: Vec::new(),
        }
    }

    /// Columns never selected by auto-detection (e.g. the row index).
    pub fn exclude(mut self, columns: Vec<String>) -> Self {
        self.exclude = columns;
        self
    }
}

impl FeatureEngineer for FeatureScaler {
    type Fitted = ScalerState;

    fn fit(&self, df: &DataFrame, _target: Option<&Series>) -> MlHelperResult<ScalerState> {
        let columns = match &self.columns {
            Some(columns) => columns.clone(),
            None => numeric_columns(df, &self.exclude),
        };
        debug!(columns = ?columns, "Fitting standard scaler");

        let stats = columns
            .iter()
            .map(|column| fit_standard(df, column))
            .collect::<MlHelperResult<Vec<_>>>()?;
        Ok(ScalerState { stats })
    }
}

impl FittedFeatureEngineer for ScalerState {
    fn transform(&self, df: &DataFrame) -> MlHelperResult<DataFrame> {
        let mut exprs = Vec::with_capacity(self.stats.len());
        for stats in &self.stats {
            // absent columns pass through; the model reports required ones
            let Ok(column) = df.column(&stats.column) else {
                debug!(column = %stats.column, "Column absent, skipping scaling");
                continue;
            };
            if !column.dtype().is_primitive_numeric() {
                return Err(MlHelperError::ValidationError(format!(
                    "Cannot scale non-numeric column '{}'",
                    stats.column
                )));
            }
            exprs.push(standard_expr(stats));
        }

        if exprs.is_empty() {
            return Ok(df.clone());
        }
        let result = df.clone().lazy().with_columns(exprs).collect()?;
        Ok(result)
    }
}

/// Fit Standard scaler on a column
///
/// A zero or undefined sample standard deviation is a numeric error.
pub fn fit_standard(df: &DataFrame, column: &str) -> MlHelperResult<StandardStats> {
    let ca = numeric_values(df, column)?;

    let mean = ca.mean().ok_or_else(|| {
        MlHelperError::ValidationError(format!("Column '{}' has no values", column))
    })?;
    let std = ca
        .std(1)
        .filter(|s| s.is_finite() && *s > 0.0)
        .ok_or_else(|| {
            MlHelperError::NumericError(format!(
                "Column '{}' has zero or undefined standard deviation; standardization would divide by zero",
                column
            ))
        })?;

    debug!(column = %column, mean, std, "Fitted standard scaler");
    Ok(StandardStats {
        column: column.to_string(),
        mean,
        std,
    })
}

fn standard_expr(stats: &StandardStats) -> Expr {
    let base = col(stats.column.as_str()).cast(DataType::Float64);
    ((base - lit(stats.mean)) / lit(stats.std)).alias(stats.column.as_str())
}

// ============================================================================
// Closed variant set
// ============================================================================

/// Feature engineers selectable by name.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureEngineerStage {
    Encoder(CategoricalEncoder),
    Scaler(FeatureScaler),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FittedFeatureStage {
    Encoder(EncoderState),
    Scaler(ScalerState),
}

impl FeatureEngineer for FeatureEngineerStage {
    type Fitted = FittedFeatureStage;

    fn fit(&self, df: &DataFrame, target: Option<&Series>) -> MlHelperResult<FittedFeatureStage> {
        match self {
            Self::Encoder(stage) => Ok(FittedFeatureStage::Encoder(stage.fit(df, target)?)),
            Self::Scaler(stage) => Ok(FittedFeatureStage::Scaler(stage.fit(df, target)?)),
        }
    }
}

impl FittedFeatureEngineer for FittedFeatureStage {
    fn transform(&self, df: &DataFrame) -> MlHelperResult<DataFrame> {
        match self {
            Self::Encoder(state) => state.transform(df),
            Self::Scaler(state) => state.transform(df),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // OneHot Encoder Tests
    // ============================================================================

    #[test]
    fn test_fit_onehot() {
        let df = df! {
            "category" => &["cat", "dog", "bird", "cat", "dog"]
        }
        .unwrap();

        let vocab = fit_onehot(&df, "category").unwrap();
        assert_eq!(vocab.reference.as_deref(), Some("bird"));
        assert_eq!(vocab.categories, vec!["cat", "dog"]);
    }

    #[test]
    fn test_onehot_three_categories_gives_two_indicators() {
        let df = df! {
            "category" => &["cat", "dog", "bird"],
            "value" => &[1.0, 2.0, 3.0],
        }
        .unwrap();

        let encoder = CategoricalEncoder::new("onehot", None).unwrap();
        let (_, result) = encoder.fit_transform(&df, None).unwrap();

        assert!(result.column("category").is_err());
        assert_eq!(
            result.get_column_names(),
            &["value", "category_cat", "category_dog"]
        );

        let cat_col = result.column("category_cat").unwrap().bool().unwrap();
        assert_eq!(cat_col.get(0), Some(true));
        assert_eq!(cat_col.get(1), Some(false));
        assert_eq!(cat_col.get(2), Some(false));
    }

    #[test]
    fn test_onehot_unseen_category_is_all_zero() {
        let train = df! { "city" => &["LA", "NYC", "SF"] }.unwrap();
        let test = df! { "city" => &["Boston"] }.unwrap();

        let state = CategoricalEncoder::new("onehot", None)
            .unwrap()
            .fit(&train, None)
            .unwrap();
        let result = state.transform(&test).unwrap();

        assert_eq!(result.width(), 2);
        assert_eq!(result.column("city_NYC").unwrap().bool().unwrap().get(0), Some(false));
        assert_eq!(result.column("city_SF").unwrap().bool().unwrap().get(0), Some(false));
    }

    #[test]
    fn test_onehot_autodetects_string_columns_only() {
        let df = df! {
            "age" => &[30, 40],
            "gender" => &["F", "M"],
        }
        .unwrap();

        let state = CategoricalEncoder::new("onehot", None)
            .unwrap()
            .fit(&df, None)
            .unwrap();
        assert_eq!(state.columns(), vec!["gender"]);
    }

    #[test]
    fn test_explicit_missing_column_is_error() {
        let df = df! { "gender" => &["F", "M"] }.unwrap();
        let encoder = CategoricalEncoder::new("onehot", Some(vec!["city".to_string()])).unwrap();
        assert!(matches!(
            encoder.fit(&df, None),
            Err(MlHelperError::ValidationError(_))
        ));
    }

    #[test]
    fn test_onehot_integer_category_matches_float_value() {
        let train = df! { "zone" => &[1i64, 2, 3, 2, 3] }.unwrap();
        let record = df! { "zone" => &[3.0f64] }.unwrap();

        let state = CategoricalEncoder::new("onehot", Some(vec!["zone".to_string()]))
            .unwrap()
            .fit(&train, None)
            .unwrap();
        let result = state.transform(&record).unwrap();

        assert_eq!(result.column("zone_2").unwrap().bool().unwrap().get(0), Some(false));
        assert_eq!(result.column("zone_3").unwrap().bool().unwrap().get(0), Some(true));
    }

    #[test]
    fn test_onehot_indicator_name_collision_is_validation_error() {
        let df = df! {
            "city" => &["LA", "NYC"],
            "city_NYC" => &[1.0, 2.0],
        }
        .unwrap();

        let encoder = CategoricalEncoder::new("onehot", Some(vec!["city".to_string()])).unwrap();
        assert!(matches!(
            encoder.fit_transform(&df, None),
            Err(MlHelperError::ValidationError(_))
        ));
    }

    #[test]
    fn test_encoder_excludes_columns() {
        let df = df! {
            "id" => &["a1", "a2", "a3"],
            "gender" => &["F", "M", "F"],
        }
        .unwrap();

        let state = CategoricalEncoder::new("onehot", None)
            .unwrap()
            .exclude(vec!["id".to_string()])
            .fit(&df, None)
            .unwrap();
        assert_eq!(state.columns(), vec!["gender"]);
        assert!(state.transform(&df).unwrap().column("id").is_ok());
    }

    #[test]
    fn test_encoder_passes_absent_column_through() {
        let train = df! { "city" => &["LA", "NYC"], "age" => &[30.0, 40.0] }.unwrap();
        let record = df! { "age" => &[35.0] }.unwrap();

        for method in ["onehot", "target"] {
            let target = Series::new("y".into(), &[0, 1]);
            let state = CategoricalEncoder::new(method, None)
                .unwrap()
                .fit(&train, Some(&target))
                .unwrap();
            let result = state.transform(&record).unwrap();
            assert_eq!(result.get_column_names(), &["age"]);
        }
    }

    #[test]
    fn test_unknown_encoding_method() {
        assert!(matches!(
            CategoricalEncoder::new("hashing", None),
            Err(MlHelperError::ConfigurationError(_))
        ));
    }

    // ============================================================================
    // Target Encoder Tests
    // ============================================================================

    #[test]
    fn test_target_encoding_unseen_category_uses_mean_of_means() {
        let train = df! {
            "group" => &["A", "A", "A", "A", "A", "B", "B", "B", "B", "B"],
        }
        .unwrap();
        let target = Series::new("y".into(), &[1, 0, 0, 0, 0, 1, 1, 1, 1, 0]);

        let encoder = CategoricalEncoder::new("target", None).unwrap();
        let state = encoder.fit(&train, Some(&target)).unwrap();

        match &state {
            EncoderState::Target { encodings } => {
                assert!((encodings[0].means["A"] - 0.2).abs() < 1e-12);
                assert!((encodings[0].means["B"] - 0.8).abs() < 1e-12);
            }
            other => panic!("unexpected state {:?}", other),
        }

        let test = df! { "group" => &["A", "C"] }.unwrap();
        let result = state.transform(&test).unwrap();

        assert!(result.column("group").is_err());
        let encoded = result.column("group_te").unwrap().f64().unwrap();
        assert!((encoded.get(0).unwrap() - 0.2).abs() < 1e-12);
        assert!((encoded.get(1).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_target_encoding_integer_category_matches_float_value() {
        let train = df! { "zone" => &[1i64, 1, 2, 2] }.unwrap();
        let target = Series::new("y".into(), &[0, 0, 1, 1]);
        let record = df! { "zone" => &[2.0f64, 2.5] }.unwrap();

        let state = CategoricalEncoder::new("target", Some(vec!["zone".to_string()]))
            .unwrap()
            .fit(&train, Some(&target))
            .unwrap();
        let result = state.transform(&record).unwrap();
        let encoded = result.column("zone_te").unwrap().f64().unwrap();
        assert!((encoded.get(0).unwrap() - 1.0).abs() < 1e-12);
        // 2.5 was never a category
        assert!((encoded.get(1).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_target_encoding_requires_target() {
        let df = df! { "group" => &["A", "B"] }.unwrap();
        let encoder = CategoricalEncoder::new("target", None).unwrap();
        assert!(matches!(
            encoder.fit(&df, None),
            Err(MlHelperError::ValidationError(_))
        ));
    }

    #[test]
    fn test_target_encoding_rejects_misaligned_target() {
        let df = df! { "group" => &["A", "B", "A"] }.unwrap();
        let target = Series::new("y".into(), &[1, 0]);
        let encoder = CategoricalEncoder::new("target", None).unwrap();
        assert!(matches!(
            encoder.fit(&df, Some(&target)),
            Err(MlHelperError::ValidationError(_))
        ));
    }

    // ============================================================================
    // Standard Scaler Tests
    // ============================================================================

    #[test]
    fn test_fit_standard() {
        // Use simple data: [0, 10] => mean=5, std=7.07... (sample std)
        let df = df! {
            "value" => &[0.0, 10.0]
        }
        .unwrap();

        let stats = fit_standard(&df, "value").unwrap();
        assert!((stats.mean - 5.0).abs() < 1e-10);
        assert!((stats.std - 50f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn test_scaled_train_has_zero_mean_unit_std() {
        let df = df! {
            "value" => &[3.0, 7.5, 1.0, 12.0, 4.25, 9.0],
            "label" => &["a", "b", "a", "b", "a", "b"],
        }
        .unwrap();

        let (state, result) = FeatureScaler::new(None).fit_transform(&df, None).unwrap();
        assert_eq!(state.stats.len(), 1);

        let scaled = result.column("value").unwrap().f64().unwrap();
        assert!(scaled.mean().unwrap().abs() < 1e-6);
        assert!((scaled.std(1).unwrap() - 1.0).abs() < 1e-6);
        // Input frame unchanged
        assert_eq!(df.column("value").unwrap().f64().unwrap().get(0), Some(3.0));
    }

    #[test]
    fn test_scaler_uses_fit_statistics_on_new_data() {
        let train = df! { "value" => &[0.0, 5.0, 10.0] }.unwrap();
        let test = df! { "value" => &[10.0] }.unwrap();

        let state = FeatureScaler::new(None).fit(&train, None).unwrap();
        let result = state.transform(&test).unwrap();

        let scaled = result.column("value").unwrap().f64().unwrap();
        assert!((scaled.get(0).unwrap() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_standard_constant_column_is_numeric_error() {
        let df = df! {
            "value" => &[5.0, 5.0, 5.0]
        }
        .unwrap();

        assert!(matches!(
            FeatureScaler::new(None).fit(&df, None),
            Err(MlHelperError::NumericError(_))
        ));
    }

    #[test]
    fn test_scaler_excludes_columns() {
        let df = df! {
            "index" => &[0u32, 1, 2],
            "value" => &[1.0, 2.0, 4.0],
        }
        .unwrap();

        let state = FeatureScaler::new(None)
            .exclude(vec!["index".to_string()])
            .fit(&df, None)
            .unwrap();
        assert_eq!(state.stats.len(), 1);
        assert_eq!(state.stats[0].column, "value");
    }

    #[test]
    fn test_scaler_skips_boolean_indicators() {
        let df = df! {
            "value" => &[1.0, 2.0, 4.0],
            "gender_M" => &[true, false, true],
        }
        .unwrap();

        let state = FeatureScaler::new(None).fit(&df, None).unwrap();
        let result = state.transform(&df).unwrap();
        assert_eq!(result.column("gender_M").unwrap().dtype(), &DataType::Boolean);
    }

    #[test]
    fn test_scaler_passes_absent_column_through() {
        let train = df! {
            "age" => &[20.0, 40.0, 60.0],
            "bmi" => &[18.0, 22.0, 30.0],
        }
        .unwrap();
        let record = df! { "age" => &[40.0] }.unwrap();

        let state = FeatureScaler::new(None).fit(&train, None).unwrap();
        let result = state.transform(&record).unwrap();

        assert_eq!(result.get_column_names(), &["age"]);
        assert!(result.column("age").unwrap().f64().unwrap().get(0).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_fitted_stage_serde() {
        let df = df! { "value" => &[1.0, 2.0, 4.0] }.unwrap();
        let stage = FeatureEngineerStage::Scaler(FeatureScaler::new(None));
        let fitted = stage.fit(&df, None).unwrap();

        let json = serde_json::to_string(&fitted).unwrap();
        let loaded: FittedFeatureStage = serde_json::from_str(&json).unwrap();
        assert_eq!(fitted, loaded);
    }
}
