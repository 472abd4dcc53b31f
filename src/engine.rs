//! End-to-end training pipeline and the fitted artifact it produces.
//!
//! Preprocessors and feature engineers are fitted on the train split only and
//! then replayed on the test split. The target column is separated after row
//! preprocessing so feature stages never see it as a feature.

use crate::dsl::Pipeline;
use crate::errors::{MlHelperError, MlHelperResult};
use crate::features::{FeatureEngineerStage, FittedFeatureStage};
use crate::frame::{has_column, require_column};
use crate::interfaces::{
    FeatureEngineer, FittedFeatureEngineer, FittedModel, FittedRowPreprocessor, Loader, Model,
    RowPreprocessor,
};
use crate::loader::DataLoader;
use crate::model::{Classifier, ModelArtifact};
use crate::observability::{Evaluation, Metrics};
use crate::preprocess::{FillValue, FittedPreprocessor, Preprocessor};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

pub struct DataPipeline {
    loader: DataLoader,
    preprocessors: Vec<(Preprocessor, Vec<String>)>,
    features: Vec<FeatureEngineerStage>,
    classifier: Classifier,
}

/// Everything a training run produces.
#[derive(Debug)]
pub struct PipelineRun {
    pub artifact: PipelineArtifact,
    /// Transformed train split, target column last.
    pub train: DataFrame,
    pub test: DataFrame,
    pub evaluation: Option<Evaluation>,
}

impl DataPipeline {
    pub fn new(
        loader: DataLoader,
        preprocessors: Vec<(Preprocessor, Vec<String>)>,
        features: Vec<FeatureEngineerStage>,
        classifier: Classifier,
    ) -> Self {
        Self {
            loader,
            preprocessors,
            features,
            classifier,
        }
    }

    /// Build every stage from a pipeline file. Configuration errors surface
    /// here, before the source is read.
    pub fn from_config(pipeline: &Pipeline) -> MlHelperResult<Self> {
        Ok(Self::new(
            pipeline.build_loader()?,
            pipeline.build_preprocessors()?,
            pipeline.build_feature_stages()?,
            pipeline.build_classifier()?,
        ))
    }

    pub fn loader(&self) -> &DataLoader {
        &self.loader
    }

    pub fn run(&self, metrics: &mut Metrics) -> MlHelperResult<PipelineRun> {
        self.run_with_progress(metrics, |_| {})
    }

    /// Run every phase, calling `on_phase` with each phase name as it starts.
    pub fn run_with_progress(
        &self,
        metrics: &mut Metrics,
        mut on_phase: impl FnMut(&str),
    ) -> MlHelperResult<PipelineRun> {
        let target = self.classifier.target_col();

        on_phase("load");
        let start = Instant::now();
        let split = self.loader.load()?;
        metrics.rows_read = split.train.height() + split.test.height();
        metrics.record_phase("load", start.elapsed());

        on_phase("preprocess");
        let start = Instant::now();
        let (mut train, mut test) = (split.train, split.test);
        let mut fitted_preprocess = Vec::with_capacity(self.preprocessors.len());
        for (stage, columns) in &self.preprocessors {
            let (state, transformed) = stage.fit_transform(&train, columns)?;
            test = state.transform(&test, columns)?;
            train = transformed;
            fitted_preprocess.push(FittedPreprocessStage {
                columns: columns.clone(),
                state,
            });
        }
        info!(
            stages = fitted_preprocess.len(),
            train_rows = train.height(),
            test_rows = test.height(),
            "Preprocessed splits"
        );
        metrics.record_phase("preprocess", start.elapsed());

        let y_train = require_column(&train, target)?.as_materialized_series().clone();
        let mut x_train = train.drop(target)?;
        let (mut x_test, y_test) = if has_column(&test, target) {
            let y = test.column(target)?.as_materialized_series().clone();
            (test.drop(target)?, Some(y))
        } else {
            warn!(target = %target, "Test split has no target column; skipping evaluation");
            (test, None)
        };

        on_phase("features");
        let start = Instant::now();
        let mut fitted_features = Vec::with_capacity(self.features.len());
        for stage in &self.features {
            let (state, transformed) = stage.fit_transform(&x_train, Some(&y_train))?;
            x_test = state.transform(&x_test)?;
            x_train = transformed;
            fitted_features.push(state);
        }
        info!(
            stages = fitted_features.len(),
            columns = x_train.width(),
            "Engineered features"
        );
        metrics.record_phase("features", start.elapsed());

        on_phase("train");
        let start = Instant::now();
        let model = self.classifier.train(&x_train, &y_train)?;
        metrics.record_phase("train", start.elapsed());
        metrics.rows_train = x_train.height();
        metrics.rows_test = x_test.height();

        on_phase("evaluate");
        let start = Instant::now();
        let evaluation = match &y_test {
            Some(y) if x_test.height() > 0 => {
                let evaluation = evaluate(&model, &x_test, y)?;
                info!(
                    accuracy = evaluation.accuracy,
                    log_loss = evaluation.log_loss,
                    rows = evaluation.rows,
                    "Evaluated on test split"
                );
                Some(evaluation)
            }
            Some(_) => {
                warn!("Test split is empty after preprocessing; skipping evaluation");
                None
            }
            None => None,
        };
        metrics.record_phase("evaluate", start.elapsed());

        let mut train = x_train;
        train.with_column(y_train)?;
        let test = match y_test {
            Some(y) => {
                let mut test = x_test;
                test.with_column(y)?;
                test
            }
            None => x_test,
        };

        Ok(PipelineRun {
            artifact: PipelineArtifact {
                preprocess: fitted_preprocess,
                features: fitted_features,
                model,
            },
            train,
            test,
            evaluation,
        })
    }
}

/// Accuracy and log loss of `model` against held-out labels.
///
/// Labels never seen in training count as misclassified.
pub fn evaluate(model: &ModelArtifact, x: &DataFrame, y: &Series) -> MlHelperResult<Evaluation> {
    let probs = model.predict_proba(x)?;
    let labels = y.cast(&DataType::String)?;
    let labels = labels.str()?;

    let mut correct = 0;
    let mut true_probs = Vec::with_capacity(probs.nrows());
    for (row, label) in labels.into_iter().enumerate() {
        let scores = probs.row(row);
        let predicted = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        match label.and_then(|l| model.class_index(l)) {
            Some(actual) => {
                if predicted == Some(actual) {
                    correct += 1;
                }
                true_probs.push(scores[actual]);
            }
            None => true_probs.push(0.0),
        }
    }
    Ok(Evaluation::from_scores(correct, &true_probs))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPreprocessStage {
    pub columns: Vec<String>,
    pub state: FittedPreprocessor,
}

/// Fitted stages and trained model, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub preprocess: Vec<FittedPreprocessStage>,
    pub features: Vec<FittedFeatureStage>,
    pub model: ModelArtifact,
}

impl PipelineArtifact {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MlHelperResult<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> MlHelperResult<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Replay the fitted stages on unlabeled rows.
    ///
    /// The target column is removed from the input and from every stage.
    /// Imputed columns absent from the input are added as all-missing so the
    /// imputer fills them.
    pub fn transform(&self, df: &DataFrame) -> MlHelperResult<DataFrame> {
        let target = self.model.target_col.as_str();
        let mut result = if has_column(df, target) {
            df.drop(target)?
        } else {
            df.clone()
        };

        for stage in &self.preprocess {
            let columns: Vec<String> = stage
                .columns
                .iter()
                .filter(|c| c.as_str() != target)
                .cloned()
                .collect();
            result = match &stage.state {
                FittedPreprocessor::DropMissing if columns.is_empty() => continue,
                FittedPreprocessor::DropMissing => stage.state.transform(&result, &columns)?,
                FittedPreprocessor::Impute(state) => {
                    let state = state.without_column(target);
                    for entry in &state.entries {
                        if !has_column(&result, &entry.column) {
                            let dtype = match entry.value {
                                FillValue::Number(_) => DataType::Float64,
                                FillValue::Text(_) => DataType::String,
                            };
                            result.with_column(Series::full_null(
                                entry.column.as_str().into(),
                                result.height(),
                                &dtype,
                            ))?;
                        }
                    }
                    state.transform(&result, &columns)?
                }
            };
        }

        for stage in &self.features {
            result = stage.transform(&result)?;
        }
        Ok(result)
    }

    /// Probability table for unlabeled rows.
    pub fn predict(&self, df: &DataFrame) -> MlHelperResult<DataFrame> {
        let features = self.transform(df)?;
        if features.height() == 0 && df.height() > 0 {
            return Err(MlHelperError::ValidationError(
                "All input rows were removed by missing-value filtering".to_string(),
            ));
        }
        self.model.predict(&features)
    }
}
