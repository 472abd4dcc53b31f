//! Classifier wrapper binding an estimator to a feature/target schema.
//!
//! Algorithm names and hyperparameters are checked when the classifier is
//! built, before any data is read. Class labels are the sorted distinct target
//! values; `predict` reports one `class_i` probability column per label.

use crate::errors::{MlHelperError, MlHelperResult};
use crate::forest::{ForestParams, RandomForest};
use crate::frame::require_column;
use crate::interfaces::{FittedModel, Model};
use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use tracing::{debug, info};

/// Free-form hyperparameter mapping as written in the pipeline file.
pub type Hyperparameters = Map<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    LogisticRegression,
    RandomForest,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::LogisticRegression => "logistic_regression",
            Algorithm::RandomForest => "random_forest",
        }
    }
}

impl FromStr for Algorithm {
    type Err = MlHelperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logistic_regression" => Ok(Algorithm::LogisticRegression),
            "random_forest" => Ok(Algorithm::RandomForest),
            other => Err(MlHelperError::ConfigurationError(format!(
                "Model {} not supported.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogisticParams {
    pub max_iterations: u64,
    /// L2 penalty strength.
    pub alpha: f64,
    pub gradient_tolerance: f64,
    pub with_intercept: bool,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            alpha: 1.0,
            gradient_tolerance: 1e-4,
            with_intercept: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum EstimatorParams {
    LogisticRegression(LogisticParams),
    RandomForest(ForestParams),
}

fn parse_hyperparameters<T: DeserializeOwned>(
    algorithm: Algorithm,
    hyperparameters: &Hyperparameters,
) -> MlHelperResult<T> {
    serde_json::from_value(Value::Object(hyperparameters.clone())).map_err(|e| {
        MlHelperError::ConfigurationError(format!(
            "Invalid hyperparameters for {}: {}",
            algorithm.as_str(),
            e
        ))
    })
}

#[derive(Debug, Clone)]
pub struct Classifier {
    algorithm: Algorithm,
    feature_cols: Vec<String>,
    target_col: String,
    hyperparameters: Hyperparameters,
    params: EstimatorParams,
}

impl Classifier {
    pub fn new<I, S>(
        algorithm: &str,
        feature_cols: I,
        target_col: impl Into<String>,
        hyperparameters: Hyperparameters,
    ) -> MlHelperResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let algorithm: Algorithm = algorithm.parse()?;
        let feature_cols: Vec<String> = feature_cols.into_iter().map(Into::into).collect();
        if feature_cols.is_empty() {
            return Err(MlHelperError::ConfigurationError(
                "At least one feature column is required".to_string(),
            ));
        }

        let params = match algorithm {
            Algorithm::LogisticRegression => EstimatorParams::LogisticRegression(
                parse_hyperparameters(algorithm, &hyperparameters)?,
            ),
            Algorithm::RandomForest => {
                let params: ForestParams = parse_hyperparameters(algorithm, &hyperparameters)?;
                params.validate()?;
                EstimatorParams::RandomForest(params)
            }
        };

        Ok(Self {
            algorithm,
            feature_cols,
            target_col: target_col.into(),
            hyperparameters,
            params,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn feature_cols(&self) -> &[String] {
        &self.feature_cols
    }

    pub fn target_col(&self) -> &str {
        &self.target_col
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }
}

impl Model for Classifier {
    type Fitted = ModelArtifact;

    fn train(&self, x: &DataFrame, y: &Series) -> MlHelperResult<ModelArtifact> {
        let records = feature_matrix(x, &self.feature_cols)?;
        if records.nrows() == 0 {
            return Err(MlHelperError::ValidationError(
                "Cannot train on an empty dataset".to_string(),
            ));
        }
        if y.len() != records.nrows() {
            return Err(MlHelperError::ValidationError(format!(
                "Target has {} rows but features have {}",
                y.len(),
                records.nrows()
            )));
        }

        let (classes, labels) = encode_target(y)?;
        if classes.len() < 2 {
            return Err(MlHelperError::ValidationError(format!(
                "Target '{}' needs at least two distinct classes, found {}",
                self.target_col,
                classes.len()
            )));
        }

        let estimator = match &self.params {
            EstimatorParams::LogisticRegression(params) => {
                if classes.len() != 2 {
                    return Err(MlHelperError::ValidationError(format!(
                        "logistic_regression supports exactly two classes, found {}",
                        classes.len()
                    )));
                }
                let model = LogisticRegression::default()
                    .max_iterations(params.max_iterations)
                    .alpha(params.alpha)
                    .gradient_tolerance(params.gradient_tolerance)
                    .with_intercept(params.with_intercept)
                    .fit(&Dataset::new(records, labels))
                    .map_err(|e| {
                        MlHelperError::EstimatorError(format!(
                            "Logistic regression training failed: {}",
                            e
                        ))
                    })?;
                FittedEstimator::LogisticRegression { model }
            }
            EstimatorParams::RandomForest(params) => FittedEstimator::RandomForest {
                model: RandomForest::fit(&records, &labels, classes.len(), params)?,
            },
        };

        info!(
            algorithm = self.algorithm.as_str(),
            rows = x.height(),
            features = self.feature_cols.len(),
            classes = classes.len(),
            "Trained classifier"
        );

        Ok(ModelArtifact {
            algorithm: self.algorithm,
            feature_cols: self.feature_cols.clone(),
            target_col: self.target_col.clone(),
            hyperparameters: self.hyperparameters.clone(),
            classes,
            estimator,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedEstimator {
    LogisticRegression {
        model: FittedLogisticRegression<f64, usize>,
    },
    RandomForest {
        model: RandomForest,
    },
}

/// Trained classifier together with the schema it was trained on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub algorithm: Algorithm,
    pub feature_cols: Vec<String>,
    pub target_col: String,
    pub hyperparameters: Hyperparameters,
    /// Target labels; position `i` is reported as `class_i`.
    pub classes: Vec<String>,
    pub estimator: FittedEstimator,
}

impl ModelArtifact {
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Position of `label` among the trained classes.
    pub fn class_index(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }

    pub fn predict_proba(&self, x: &DataFrame) -> MlHelperResult<Array2<f64>> {
        let records = feature_matrix(x, &self.feature_cols)?;
        let probs = match &self.estimator {
            FittedEstimator::LogisticRegression { model } => {
                let positive = model.predict_probabilities(&records);
                let positive_class = model.labels().pos.class;
                let mut probs = Array2::<f64>::zeros((records.nrows(), 2));
                for (row, p) in positive.iter().enumerate() {
                    probs[[row, positive_class]] = *p;
                    probs[[row, 1 - positive_class]] = 1.0 - *p;
                }
                probs
            }
            FittedEstimator::RandomForest { model } => model.predict_proba(&records),
        };
        debug!(rows = probs.nrows(), "Predicted class probabilities");
        Ok(probs)
    }
}

impl FittedModel for ModelArtifact {
    fn predict(&self, x: &DataFrame) -> MlHelperResult<DataFrame> {
        probability_table(&self.predict_proba(x)?)
    }
}

/// One Float64 `class_i` column per probability matrix column.
pub fn probability_table(probs: &Array2<f64>) -> MlHelperResult<DataFrame> {
    let columns: Vec<Column> = (0..probs.ncols())
        .map(|i| Series::new(format!("class_{}", i).into(), probs.column(i).to_vec()).into())
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Dense feature matrix in `feature_cols` order.
///
/// Columns must be numeric or Boolean and free of missing values.
pub fn feature_matrix(df: &DataFrame, feature_cols: &[String]) -> MlHelperResult<Array2<f64>> {
    let absent: Vec<&str> = feature_cols
        .iter()
        .filter(|c| df.column(c.as_str()).is_err())
        .map(String::as_str)
        .collect();
    if !absent.is_empty() {
        return Err(MlHelperError::ValidationError(format!(
            "Feature columns not found: {}",
            absent.join(", ")
        )));
    }

    let n_rows = df.height();
    let mut matrix = Array2::<f64>::zeros((n_rows, feature_cols.len()));
    for (j, name) in feature_cols.iter().enumerate() {
        let column = require_column(df, name)?;
        let dtype = column.dtype();
        if !(dtype.is_primitive_numeric() || matches!(dtype, DataType::Boolean)) {
            return Err(MlHelperError::ValidationError(format!(
                "Feature '{}' must be numeric or boolean, found {}",
                name, dtype
            )));
        }
        let floats = column.cast(&DataType::Float64)?;
        for (i, value) in floats.f64()?.into_iter().enumerate() {
            match value {
                Some(v) if v.is_finite() => matrix[[i, j]] = v,
                Some(v) => {
                    return Err(MlHelperError::NumericError(format!(
                        "Feature '{}' has non-finite value {} at row {}",
                        name, v, i
                    )))
                }
                None => {
                    return Err(MlHelperError::ValidationError(format!(
                        "Feature '{}' has a missing value at row {}",
                        name, i
                    )))
                }
            }
        }
    }
    Ok(matrix)
}

/// Sorted distinct labels of `y` and each row's label position.
///
/// Numeric targets sort by value, everything else lexicographically.
pub fn encode_target(y: &Series) -> MlHelperResult<(Vec<String>, Array1<usize>)> {
    if y.null_count() > 0 {
        return Err(MlHelperError::ValidationError(format!(
            "Target '{}' has {} missing values",
            y.name(),
            y.null_count()
        )));
    }

    let names = y.cast(&DataType::String)?;
    let names = names.str()?;
    let mut classes: Vec<String> = names
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if y.dtype().is_primitive_numeric() {
        let value = |s: &String| s.parse::<f64>().unwrap_or(f64::NAN);
        classes.sort_by(|a, b| value(a).total_cmp(&value(b)));
    }

    let positions: HashMap<&str, usize> = classes
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();
    let labels = names
        .into_iter()
        .flatten()
        .map(|v| positions.get(v).copied().unwrap_or_default())
        .collect::<Vec<usize>>();

    Ok((classes, Array1::from(labels)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn separable() -> (DataFrame, Series) {
        let x = df! {
            "age" => &[20.0, 22.0, 25.0, 27.0, 60.0, 62.0, 65.0, 67.0],
            "smoker" => &[false, false, true, false, true, true, false, true],
        }
        .unwrap();
        let y = Series::new("label".into(), &[0i32, 0, 0, 0, 1, 1, 1, 1]);
        (x, y)
    }

    fn hp(value: serde_json::Value) -> Hyperparameters {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_unknown_algorithm_is_configuration_error() {
        let err = Classifier::new("svm", ["age"], "label", Hyperparameters::new()).unwrap_err();
        assert!(matches!(err, MlHelperError::ConfigurationError(_)));
        assert!(err.to_string().contains("Model svm not supported."));
    }

    #[test]
    fn test_unknown_hyperparameter_is_configuration_error() {
        let err = Classifier::new(
            "random_forest",
            ["age"],
            "label",
            hp(json!({"n_trees": 10})),
        )
        .unwrap_err();
        assert!(matches!(err, MlHelperError::ConfigurationError(_)));
    }

    #[test]
    fn test_logistic_regression_probabilities() {
        let (x, y) = separable();
        let clf = Classifier::new(
            "logistic_regression",
            ["age", "smoker"],
            "label",
            hp(json!({"alpha": 0.01, "max_iterations": 200})),
        )
        .unwrap();

        let artifact = clf.train(&x, &y).unwrap();
        assert_eq!(artifact.classes, vec!["0", "1"]);

        let probs = artifact.predict(&x).unwrap();
        assert_eq!(probs.get_column_names(), vec!["class_0", "class_1"]);
        let c0 = probs.column("class_0").unwrap().f64().unwrap();
        let c1 = probs.column("class_1").unwrap().f64().unwrap();
        for i in 0..x.height() {
            let (p0, p1) = (c0.get(i).unwrap(), c1.get(i).unwrap());
            assert!((p0 + p1 - 1.0).abs() < 1e-9);
        }
        assert!(c1.get(7).unwrap() > c1.get(0).unwrap());
    }

    #[test]
    fn test_random_forest_multiclass() {
        let x = df! {
            "v" => &[0.0, 0.1, 0.2, 5.0, 5.1, 5.2, 9.0, 9.1, 9.2],
        }
        .unwrap();
        let y = Series::new("label".into(), &["b", "b", "b", "a", "a", "a", "c", "c", "c"]);
        let clf = Classifier::new(
            "random_forest",
            ["v"],
            "label",
            hp(json!({"n_estimators": 20, "random_state": 1})),
        )
        .unwrap();

        let artifact = clf.train(&x, &y).unwrap();
        assert_eq!(artifact.classes, vec!["a", "b", "c"]);

        let probs = artifact.predict(&x).unwrap();
        assert_eq!(probs.width(), 3);
        let total = probs.column("class_0").unwrap().f64().unwrap().get(0).unwrap()
            + probs.column("class_1").unwrap().f64().unwrap().get(0).unwrap()
            + probs.column("class_2").unwrap().f64().unwrap().get(0).unwrap();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_logistic_rejects_multiclass_target() {
        let x = df! { "v" => &[1.0, 2.0, 3.0] }.unwrap();
        let y = Series::new("label".into(), &[0, 1, 2]);
        let clf =
            Classifier::new("logistic_regression", ["v"], "label", Hyperparameters::new()).unwrap();
        assert!(matches!(
            clf.train(&x, &y),
            Err(MlHelperError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_feature_is_validation_error() {
        let (x, y) = separable();
        let clf =
            Classifier::new("random_forest", ["age", "income"], "label", Hyperparameters::new())
                .unwrap();
        let err = clf.train(&x, &y).unwrap_err();
        assert!(matches!(err, MlHelperError::ValidationError(_)));
        assert!(err.to_string().contains("income"));
    }

    #[test]
    fn test_numeric_classes_sort_by_value() {
        let y = Series::new("label".into(), &[10, 2, 2, 10, 1]);
        let (classes, labels) = encode_target(&y).unwrap();
        assert_eq!(classes, vec!["1", "2", "10"]);
        assert_eq!(labels.to_vec(), vec![2, 1, 1, 2, 0]);
    }

    #[test]
    fn test_artifact_serde_round_trip() {
        let (x, y) = separable();
        let clf = Classifier::new(
            "random_forest",
            ["age"],
            "label",
            hp(json!({"n_estimators": 5})),
        )
        .unwrap();
        let artifact = clf.train(&x, &y).unwrap();

        let json = serde_json::to_string(&artifact).unwrap();
        let restored: ModelArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(
            restored.predict_proba(&x).unwrap(),
            artifact.predict_proba(&x).unwrap()
        );
    }
}
