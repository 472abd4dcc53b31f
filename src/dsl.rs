use crate::errors::MlHelperResult;
use crate::features::{CategoricalEncoder, FeatureEngineerStage, FeatureScaler};
use crate::loader::{DataLoader, ROW_INDEX_COLUMN};
use crate::model::{Classifier, Hyperparameters};
use crate::preprocess::Preprocessor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Pipeline {
    pub data: DataConfig,
    #[serde(default)]
    pub preprocess: Vec<PreprocessStep>,
    #[serde(default)]
    pub features: Vec<FeatureStep>,
    pub model: ModelConfig,
    #[serde(default)]
    pub outputs: OutputConfig,
}

/// Source table and split parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    pub path: PathBuf,
    #[serde(default = "default_test_frac")]
    pub test_frac: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub index_col: Option<String>,
}

fn default_test_frac() -> f64 {
    0.2
}

/// Row preprocessing step, applied in file order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PreprocessStep {
    DropMissing {
        columns: Vec<String>,
    },
    Impute {
        #[serde(default = "default_impute_method")]
        method: String,
        columns: Vec<String>,
    },
}

fn default_impute_method() -> String {
    "mean".to_string()
}

/// Feature engineering step, applied in file order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureStep {
    CategoricalEncoder {
        #[serde(default = "default_encoding")]
        method: String,
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
    StandardScaler {
        #[serde(default)]
        columns: Option<Vec<String>>,
        #[serde(default)]
        exclude: Vec<String>,
    },
}

fn default_encoding() -> String {
    "onehot".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub algorithm: String,
    pub features: Vec<String>,
    pub target: String,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
}

/// Files written after a training run. Every entry is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub artifact: Option<PathBuf>,
    pub report: Option<PathBuf>,
    /// Transformed train split (CSV or Parquet).
    pub train: Option<PathBuf>,
    pub test: Option<PathBuf>,
}

impl Pipeline {
    /// Load a pipeline file. Relative paths inside it resolve against the
    /// file's directory.
    pub fn from_path<P: AsRef<Path>>(path: P) -> MlHelperResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut pipeline = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            pipeline.resolve_paths(base);
        }
        Ok(pipeline)
    }

    pub fn from_yaml(content: &str) -> MlHelperResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.data.path);
        for output in [
            &mut self.outputs.artifact,
            &mut self.outputs.report,
            &mut self.outputs.train,
            &mut self.outputs.test,
        ]
        .into_iter()
        .flatten()
        {
            resolve(output);
        }
    }

    /// Provenance column carried by both splits.
    pub fn index_column(&self) -> &str {
        self.data.index_col.as_deref().unwrap_or(ROW_INDEX_COLUMN)
    }

    pub fn build_loader(&self) -> MlHelperResult<DataLoader> {
        let loader = DataLoader::new(&self.data.path, self.data.test_frac, self.data.seed)?;
        Ok(match &self.data.index_col {
            Some(index_col) => loader.with_index_col(index_col),
            None => loader,
        })
    }

    /// Preprocessors paired with the columns they apply to.
    pub fn build_preprocessors(&self) -> MlHelperResult<Vec<(Preprocessor, Vec<String>)>> {
        self.preprocess
            .iter()
            .map(|step| match step {
                PreprocessStep::DropMissing { columns } => {
                    Ok((Preprocessor::from_name("drop_missing", None)?, columns.clone()))
                }
                PreprocessStep::Impute { method, columns } => Ok((
                    Preprocessor::from_name("impute", Some(method))?,
                    columns.clone(),
                )),
            })
            .collect()
    }

    /// Auto-detection in every stage skips the provenance column.
    pub fn build_feature_stages(&self) -> MlHelperResult<Vec<FeatureEngineerStage>> {
        self.features
            .iter()
            .map(|step| match step {
                FeatureStep::CategoricalEncoder { method, columns } => {
                    let encoder = CategoricalEncoder::new(method, columns.clone())?
                        .exclude(vec![self.index_column().to_string()]);
                    Ok(FeatureEngineerStage::Encoder(encoder))
                }
                FeatureStep::StandardScaler { columns, exclude } => {
                    let mut exclude = exclude.clone();
                    exclude.push(self.index_column().to_string());
                    Ok(FeatureEngineerStage::Scaler(
                        FeatureScaler::new(columns.clone()).exclude(exclude),
                    ))
                }
            })
            .collect()
    }

    pub fn build_classifier(&self) -> MlHelperResult<Classifier> {
        Classifier::new(
            &self.model.algorithm,
            self.model.features.iter().cloned(),
            self.model.target.clone(),
            self.model.hyperparameters.clone(),
        )
    }
}
