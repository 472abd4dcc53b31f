use crate::dsl::Pipeline;
use crate::engine::{DataPipeline, PipelineArtifact};
use crate::errors::{MlHelperError, MlHelperResult};
use crate::io;
use crate::observability::{InputFileStats, Metrics, RunReport};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub fn train_pipeline(path: &Path, run_id: Uuid) -> MlHelperResult<RunReport> {
    info!("Loading pipeline from {:?}", path);
    let pipeline = Pipeline::from_path(path)?;
    let data_pipeline = DataPipeline::from_config(&pipeline)?;
    let mut metrics = Metrics::new();

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .map_err(|e| MlHelperError::Unknown(e.into()))?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let run = data_pipeline.run_with_progress(&mut metrics, |phase| {
        pb.set_message(format!("Running phase: {}", phase));
    });
    let run = match run {
        Ok(run) => run,
        Err(e) => {
            pb.abandon_with_message("Pipeline failed.");
            return Err(e);
        }
    };
    pb.finish_with_message("Pipeline finished.");

    let mut outputs = Vec::new();
    if let Some(path) = &pipeline.outputs.artifact {
        info!("Writing artifact to: {:?}", path);
        run.artifact.save(path)?;
        outputs.push(path.display().to_string());
    }
    if let Some(path) = &pipeline.outputs.train {
        io::write_table(&run.train, path)?;
        outputs.push(path.display().to_string());
    }
    if let Some(path) = &pipeline.outputs.test {
        io::write_table(&run.test, path)?;
        outputs.push(path.display().to_string());
    }

    let report = RunReport {
        run_id,
        timestamp: Utc::now(),
        input: InputFileStats::from_path(data_pipeline.loader().path())?,
        algorithm: run.artifact.model.algorithm.as_str().to_string(),
        classes: run.artifact.model.classes.clone(),
        total_duration_ms: metrics.total_duration().as_millis() as u64,
        metrics,
        evaluation: run.evaluation,
        outputs,
    };
    if let Some(path) = &pipeline.outputs.report {
        info!("Writing run report to: {:?}", path);
        report.write(path)?;
    }

    info!("Pipeline completed successfully.");
    Ok(report)
}

/// Answer returned for one record at the serving boundary.
#[derive(Debug, Serialize)]
pub struct Prediction {
    /// Probability of the last class, the positive class of a binary target.
    pub prediction: f64,
    pub probabilities: BTreeMap<String, f64>,
}

pub fn predict_record(artifact: &PipelineArtifact, record: &serde_json::Value) -> MlHelperResult<Prediction> {
    let fields = record.as_object().ok_or_else(|| {
        MlHelperError::ValidationError("Record must be a JSON object".to_string())
    })?;
    let df = io::record_to_frame(fields)?;
    let probs = artifact.predict(&df)?;

    let mut probabilities = BTreeMap::new();
    for column in probs.get_columns() {
        let p = column.f64()?.get(0).ok_or_else(|| {
            MlHelperError::ValidationError("Record produced no prediction".to_string())
        })?;
        probabilities.insert(column.name().to_string(), p);
    }
    let last = format!("class_{}", probs.width().saturating_sub(1));
    let prediction = probabilities.get(&last).copied().ok_or_else(|| {
        MlHelperError::ValidationError("Record produced no prediction".to_string())
    })?;

    Ok(Prediction {
        prediction,
        probabilities,
    })
}

pub fn predict_file(artifact_path: &Path, record_path: &Path) -> MlHelperResult<Prediction> {
    info!("Loading artifact from {:?}", artifact_path);
    let artifact = PipelineArtifact::load(artifact_path)?;
    let content = std::fs::read_to_string(record_path)?;
    let record: serde_json::Value = serde_json::from_str(&content)?;
    predict_record(&artifact, &record)
}
