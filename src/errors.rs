use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum MlHelperError {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code("MLHELPER-001"),
        help("Check algorithm, method and hyperparameter names in your pipeline.yaml.")
    )]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    #[diagnostic(
        code("MLHELPER-002"),
        help("The data passed to this stage does not satisfy its input contract.")
    )]
    ValidationError(String),

    #[error("Data error: {0}")]
    #[diagnostic(
        code("MLHELPER-003"),
        help("Check that the source file exists and is a well-formed CSV or Parquet table.")
    )]
    DataError(String),

    #[error("Numeric error: {0}")]
    #[diagnostic(
        code("MLHELPER-004"),
        help("A fitted statistic is degenerate for this data (e.g. a constant column).")
    )]
    NumericError(String),

    #[error("Pipeline file error: {0}")]
    #[diagnostic(
        code("MLHELPER-005"),
        help("Please check your pipeline.yaml syntax and structure.")
    )]
    PipelineFileError(#[from] serde_yaml::Error),

    #[error("Artifact error: {0}")]
    #[diagnostic(
        code("MLHELPER-006"),
        help("The artifact or record is not valid JSON for this version of mlhelper.")
    )]
    ArtifactError(#[from] serde_json::Error),

    #[error("Estimator error: {0}")]
    #[diagnostic(
        code("MLHELPER-007"),
        help("The underlying estimator failed to fit on the prepared features.")
    )]
    EstimatorError(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code("MLHELPER-008"), help("Check file paths and permissions."))]
    IoError(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    #[diagnostic(
        code("MLHELPER-009"),
        help("An error occurred within the data processing engine.")
    )]
    PolarsError(#[from] polars::error::PolarsError),

    #[error(transparent)]
    #[diagnostic(code("MLHELPER-000"))]
    Unknown(#[from] anyhow::Error),
}

pub type MlHelperResult<T> = Result<T, MlHelperError>;
