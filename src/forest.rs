//! Bagged random forest over `linfa-trees` decision trees.
//!
//! Each tree is trained on a bootstrap sample of the rows and, optionally, a
//! random subset of the features. Class probabilities are vote fractions.

use crate::errors::{MlHelperError, MlHelperResult};
use linfa::prelude::*;
use linfa_trees::{DecisionTree, DecisionTreeParams, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SplitCriterion {
    #[default]
    Gini,
    Entropy,
}

/// Random forest hyperparameters, deserialized from the model configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_weight_split: f32,
    pub min_weight_leaf: f32,
    pub min_impurity_decrease: f64,
    pub split_quality: SplitCriterion,
    pub bootstrap: bool,
    /// Features drawn per tree; all features when unset.
    pub max_features: Option<usize>,
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_weight_split: 2.0,
            min_weight_leaf: 1.0,
            min_impurity_decrease: 0.00001,
            split_quality: SplitCriterion::Gini,
            bootstrap: true,
            max_features: None,
            random_state: 0,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> MlHelperResult<()> {
        if self.n_estimators == 0 {
            return Err(MlHelperError::ConfigurationError(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.max_features == Some(0) {
            return Err(MlHelperError::ConfigurationError(
                "max_features must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn tree_params(&self) -> DecisionTreeParams<f64, usize> {
        let quality = match self.split_quality {
            SplitCriterion::Gini => SplitQuality::Gini,
            SplitCriterion::Entropy => SplitQuality::Entropy,
        };
        DecisionTree::params()
            .split_quality(quality)
            .max_depth(self.max_depth)
            .min_weight_split(self.min_weight_split)
            .min_weight_leaf(self.min_weight_leaf)
            .min_impurity_decrease(self.min_impurity_decrease)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForestTree {
    /// Column positions of the training matrix seen by this tree.
    features: Vec<usize>,
    tree: DecisionTree<f64, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    n_classes: usize,
    trees: Vec<ForestTree>,
}

impl RandomForest {
    /// `labels` are class indices in `0..n_classes`.
    pub fn fit(
        records: &Array2<f64>,
        labels: &Array1<usize>,
        n_classes: usize,
        params: &ForestParams,
    ) -> MlHelperResult<Self> {
        params.validate()?;
        let n_rows = records.nrows();
        let n_features = records.ncols();
        if n_rows == 0 || n_features == 0 {
            return Err(MlHelperError::ValidationError(
                "random forest requires at least one row and one feature".to_string(),
            ));
        }

        let n_sampled = params
            .max_features
            .map_or(n_features, |m| m.min(n_features));
        let tree_params = params.tree_params();
        let mut rng = StdRng::seed_from_u64(params.random_state);

        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let rows: Vec<usize> = if params.bootstrap {
                (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect()
            } else {
                (0..n_rows).collect()
            };
            let mut features: Vec<usize> = if n_sampled < n_features {
                sample(&mut rng, n_features, n_sampled).into_vec()
            } else {
                (0..n_features).collect()
            };
            features.sort_unstable();

            let dataset = Dataset::new(
                records.select(Axis(0), &rows).select(Axis(1), &features),
                labels.select(Axis(0), &rows),
            );
            let tree = tree_params.fit(&dataset).map_err(|e| {
                MlHelperError::EstimatorError(format!("Decision tree training failed: {}", e))
            })?;
            trees.push(ForestTree { features, tree });
        }

        debug!(
            trees = trees.len(),
            features_per_tree = n_sampled,
            bootstrap = params.bootstrap,
            "Fitted random forest"
        );
        Ok(Self { n_classes, trees })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Fraction of trees voting for each class; one row per record.
    pub fn predict_proba(&self, records: &Array2<f64>) -> Array2<f64> {
        let mut votes = Array2::<f64>::zeros((records.nrows(), self.n_classes));
        if records.nrows() == 0 {
            return votes;
        }

        for member in &self.trees {
            let predicted: Array1<usize> =
                member.tree.predict(&records.select(Axis(1), &member.features));
            for (row, class) in predicted.iter().enumerate() {
                votes[[row, *class]] += 1.0;
            }
        }
        votes / self.trees.len() as f64
    }
}
