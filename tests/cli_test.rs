use anyhow::Result;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn write_patients(path: &Path) -> Result<()> {
    let mut body = String::from("id,age,height,weight,gender,ethnicity,outcome\n");
    for i in 0..60 {
        let outcome = usize::from(i % 3 == 0);
        let age = 30 + outcome * 30 + i % 9;
        let height = if i % 11 == 0 {
            String::new()
        } else {
            format!("{:.1}", 150.0 + (i % 13) as f64 * 2.5)
        };
        let gender = if i % 2 == 0 { "F" } else { "M" };
        let ethnicity = ["a", "b", "c"][i % 3];
        body.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            i,
            age,
            height,
            55 + i % 17,
            gender,
            ethnicity,
            outcome
        ));
    }
    fs::write(path, body)?;
    Ok(())
}

#[test]
fn test_cli_train_then_predict() -> Result<()> {
    let dir = tempdir()?;
    let input_path = dir.path().join("patients.csv");
    let config_path = dir.path().join("pipeline.yaml");
    let artifact_path = dir.path().join("model.json");
    let report_path = dir.path().join("report.json");
    let train_path = dir.path().join("train.parquet");
    let test_path = dir.path().join("test.csv");
    write_patients(&input_path)?;

    // Relative paths resolve against the pipeline file
    let yaml = r#"
data:
  path: patients.csv
  test_frac: 0.2
  seed: 42
  index_col: id
preprocess:
  - type: drop_missing
    columns: [age, gender]
  - type: impute
    method: mean
    columns: [height]
features:
  - type: categorical_encoder
    method: onehot
    columns: [gender, ethnicity]
  - type: standard_scaler
    columns: [age, height, weight]
model:
  algorithm: random_forest
  features: [age, height, weight, gender_M, ethnicity_b, ethnicity_c]
  target: outcome
  hyperparameters:
    n_estimators: 25
    random_state: 7
outputs:
  artifact: model.json
  report: report.json
  train: train.parquet
  test: test.csv
"#;
    fs::write(&config_path, yaml)?;

    let status = Command::new(env!("CARGO_BIN_EXE_mlhelper"))
        .args(["--quiet", "train", config_path.to_str().unwrap()])
        .status()?;
    assert!(status.success());

    assert!(artifact_path.exists());
    assert!(train_path.exists());
    assert!(test_path.exists());

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report_path)?)?;
    assert_eq!(report["metrics"]["rows_read"], 60);
    assert_eq!(report["algorithm"], "random_forest");
    assert_eq!(report["input"]["hash"].as_str().map(str::len), Some(64));
    assert!(report["evaluation"]["accuracy"].as_f64().is_some());

    let record_path = dir.path().join("record.json");
    fs::write(
        &record_path,
        r#"{"age": 65, "height": null, "weight": 70, "gender": "M", "ethnicity": "a"}"#,
    )?;

    let output = Command::new(env!("CARGO_BIN_EXE_mlhelper"))
        .args([
            "--quiet",
            "predict",
            "--artifact",
            artifact_path.to_str().unwrap(),
            "--record",
            record_path.to_str().unwrap(),
        ])
        .output()?;
    assert!(output.status.success());

    let answer: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let p0 = answer["probabilities"]["class_0"].as_f64().unwrap();
    let p1 = answer["probabilities"]["class_1"].as_f64().unwrap();
    assert!((p0 + p1 - 1.0).abs() < 1e-6);
    assert_eq!(answer["prediction"].as_f64(), Some(p1));

    Ok(())
}

#[test]
fn test_cli_rejects_unknown_algorithm() -> Result<()> {
    let dir = tempdir()?;
    let input_path = dir.path().join("patients.csv");
    let config_path = dir.path().join("pipeline.yaml");
    let artifact_path = dir.path().join("model.json");
    write_patients(&input_path)?;

    let yaml = r#"
data:
  path: patients.csv
model:
  algorithm: svm
  features: [age]
  target: outcome
outputs:
  artifact: model.json
"#;
    fs::write(&config_path, yaml)?;

    let output = Command::new(env!("CARGO_BIN_EXE_mlhelper"))
        .args(["--quiet", "train", config_path.to_str().unwrap()])
        .output()?;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Model svm not supported."));
    assert!(!artifact_path.exists());
    Ok(())
}

#[test]
fn test_cli_rejects_nested_record() -> Result<()> {
    let dir = tempdir()?;
    let input_path = dir.path().join("patients.csv");
    let config_path = dir.path().join("pipeline.yaml");
    let artifact_path = dir.path().join("model.json");
    write_patients(&input_path)?;

    let yaml = r#"
data:
  path: patients.csv
features:
  - type: standard_scaler
    columns: [age, weight]
model:
  algorithm: logistic_regression
  features: [age, weight]
  target: outcome
outputs:
  artifact: model.json
"#;
    fs::write(&config_path, yaml)?;
    let status = Command::new(env!("CARGO_BIN_EXE_mlhelper"))
        .args(["--quiet", "train", config_path.to_str().unwrap()])
        .status()?;
    assert!(status.success());

    let record_path = dir.path().join("record.json");
    fs::write(&record_path, r#"{"age": [1, 2], "weight": 70}"#)?;
    let output = Command::new(env!("CARGO_BIN_EXE_mlhelper"))
        .args([
            "--quiet",
            "predict",
            "--artifact",
            artifact_path.to_str().unwrap(),
            "--record",
            record_path.to_str().unwrap(),
        ])
        .output()?;
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    Ok(())
}
