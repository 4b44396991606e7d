//! Integration tests for the `strata train` command.

mod common;

use common::{run_file, strata, write, WEATHER, WEATHER_TEST};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_train_prints_model_text() {
    let dir = TempDir::new().unwrap();
    let config = run_file(dir.path(), "", "zero_r");
    let input = write(dir.path(), "weather.csv", WEATHER);

    strata()
        .args(["train", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Model text"))
        .stdout(predicate::str::contains("predicts class value: yes"));
}

#[test]
fn test_train_saves_model_per_stratum() {
    let dir = TempDir::new().unwrap();
    let models = dir.path().join("models");
    let config = run_file(
        dir.path(),
        &format!(
            "model_output_dir = {:?}\nincremental = false\n\n[training.row_handling]\nmode = \"stratified\"\nfield = \"outlook\"",
            models.to_string_lossy()
        ),
        "zero_r",
    );
    let input = write(
        dir.path(),
        "sorted.csv",
        "outlook,temp,play\novercast,83,yes\novercast,64,yes\nrainy,70,yes\nrainy,65,no\n",
    );

    strata()
        .args(["train", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Stratification value,Model text"));

    assert!(models.join("overcast_model").is_file());
    assert!(models.join("rainy_model").is_file());
}

#[test]
fn test_train_rejects_unsorted_strata() {
    let dir = TempDir::new().unwrap();
    let config = run_file(
        dir.path(),
        "incremental = false\n\n[training.row_handling]\nmode = \"stratified\"\nfield = \"outlook\"",
        "zero_r",
    );
    let input = write(dir.path(), "weather.csv", WEATHER);

    strata()
        .args(["train", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("reappeared after its group was closed"));
}

#[test]
fn test_cross_validation_writes_metric_row() {
    let dir = TempDir::new().unwrap();
    let config = run_file(
        dir.path(),
        "evaluation = \"cross_validation\"\nfolds = 3\nincremental = false",
        "naive_bayes",
    );
    let input = write(dir.path(), "weather.csv", WEATHER);
    let output = dir.path().join("out.csv");

    strata()
        .args(["train", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let text = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("Correctly classified instances"));
    assert!(lines[0].contains("Total number of instances"));
    assert!(lines[1].contains("Cross-validation"));
}

#[test]
fn test_separate_test_set_evaluation() {
    let dir = TempDir::new().unwrap();
    let config = run_file(dir.path(), "evaluation = \"separate_test_set\"", "naive_bayes");
    let input = write(dir.path(), "weather.csv", WEATHER);
    let test = write(dir.path(), "test.csv", WEATHER_TEST);

    strata()
        .args(["train", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--test")
        .arg(&test)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Evaluation mode\":\"Separate test set\""))
        .stdout(predicate::str::contains("\"Total number of instances\":4.0"));
}

#[test]
fn test_test_file_requires_separate_test_mode() {
    let dir = TempDir::new().unwrap();
    let config = run_file(dir.path(), "", "zero_r");
    let input = write(dir.path(), "weather.csv", WEATHER);
    let test = write(dir.path(), "test.csv", WEATHER_TEST);

    strata()
        .args(["train", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--test")
        .arg(&test)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot evaluate on a test set"));
}

#[test]
fn test_unknown_learner_fails() {
    let dir = TempDir::new().unwrap();
    let config = run_file(dir.path(), "", "forest");
    let input = write(dir.path(), "weather.csv", WEATHER);

    strata()
        .args(["train", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to create learner 'forest'"));
}

#[test]
fn test_missing_run_file_fails() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "weather.csv", WEATHER);

    strata()
        .args(["train", "--config"])
        .arg(dir.path().join("absent.toml"))
        .arg("--input")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read run file"));
}

#[test]
fn test_train_infers_types_from_sampled_rows() {
    let dir = TempDir::new().unwrap();
    let config = run_file(dir.path(), "header_sample_size = \"2\"", "zero_r");
    let input = write(
        dir.path(),
        "weather.csv",
        "outlook,temp,play\nsunny,85,no\nrainy,70,yes\novercast,warm,yes\n",
    );

    strata()
        .args(["train", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("row 3, column 'temp': cannot read 'warm'"));
}
