//! Tabular data preparation for binary classification.
//!
//! A pipeline loads a table, splits it into train and test, runs row
//! preprocessors and feature engineers fitted on the train split, and trains a
//! classifier. The fitted stages and model are persisted together as a
//! [`engine::PipelineArtifact`] that scores new records.

pub mod dsl;
pub mod engine;
pub mod errors;
pub mod features;
pub mod forest;
pub mod frame;
pub mod interfaces;
pub mod io;
pub mod loader;
pub mod model;
pub mod observability;
pub mod preprocess;
pub mod runner;

pub use errors::{MlHelperError, MlHelperResult};
pub use interfaces::{
    FeatureEngineer, FittedFeatureEngineer, FittedModel, FittedRowPreprocessor, Loader, Model,
    RowPreprocessor, Split,
};
