//! Integration tests for the `strata score` command.

mod common;

use common::{strata, trained_model, write, WEATHER_TEST};
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_score_appends_prediction() {
    let dir = TempDir::new().unwrap();
    let model = trained_model(dir.path());
    let input = write(dir.path(), "rows.csv", "outlook,temp\nsunny,70\nrainy,60\n");

    strata()
        .args(["score", "--model"])
        .arg(&model)
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout("outlook,temp,play_predicted\nsunny,70,yes\nrainy,60,yes\n");
}

#[test]
fn test_score_accepts_file_uri() {
    let dir = TempDir::new().unwrap();
    let model = trained_model(dir.path());
    let input = write(dir.path(), "rows.csv", "outlook,temp\nsunny,70\n");

    strata()
        .args(["score", "--model"])
        .arg(format!("file://{}", model.display()))
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("sunny,70,yes"));
}

#[test]
fn test_score_with_probabilities_in_batches() {
    let dir = TempDir::new().unwrap();
    let model = trained_model(dir.path());
    let input = write(dir.path(), "rows.csv", "outlook,temp\nsunny,70\nrainy,60\novercast,65\n");

    strata()
        .args(["score", "--probabilities", "--batch-size", "2", "--model"])
        .arg(&model)
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "outlook,temp,play_predicted,play:no_predicted_prob,play:yes_predicted_prob,play_max_prob\n",
        ))
        .stdout(predicate::str::contains("overcast,65,yes"));
}

#[test]
fn test_score_rejects_zero_batch_size() {
    let dir = TempDir::new().unwrap();
    let model = trained_model(dir.path());
    let input = write(dir.path(), "rows.csv", "outlook,temp\nsunny,70\n");

    strata()
        .args(["score", "--batch-size", "0", "--model"])
        .arg(&model)
        .arg("--input")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--batch-size must be at least 1"));
}

#[test]
fn test_evaluate_emits_one_metric_row() {
    let dir = TempDir::new().unwrap();
    let model = trained_model(dir.path());
    let input = write(dir.path(), "test.csv", WEATHER_TEST);

    let output = strata()
        .args(["score", "--evaluate", "--json", "--model"])
        .arg(&model)
        .arg("--input")
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert_eq!(text.lines().count(), 1);
    let metrics: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(metrics["Evaluation mode"], "Separate test set");
    assert_eq!(metrics["Correctly classified instances"], 3.0);
    assert_eq!(metrics["Total number of instances"], 4.0);
}

#[test]
fn test_missing_model_fails() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "rows.csv", "outlook,temp\nsunny,70\n");

    strata()
        .args(["score", "--model"])
        .arg(dir.path().join("absent"))
        .arg("--input")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load model"));
}
