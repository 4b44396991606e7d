//! Shared fixtures for CLI tests.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};

pub const WEATHER: &str = "\
outlook,temp,play
sunny,85,no
sunny,80,no
overcast,83,yes
rainy,70,yes
rainy,68,yes
rainy,65,no
overcast,64,yes
sunny,72,no
sunny,69,yes
rainy,75,yes
";

pub const WEATHER_TEST: &str = "\
outlook,temp,play
overcast,81,yes
rainy,71,no
sunny,75,yes
overcast,72,yes
";

pub fn strata() -> Command {
    Command::cargo_bin("strata").unwrap()
}

pub fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// Run file with the given `[training]` body and learner.
pub fn run_file(dir: &Path, training: &str, learner: &str) -> PathBuf {
    write(dir, "run.toml", &format!("[training]\n{training}\n\n[learner]\nname = \"{learner}\"\n"))
}

/// Train a zero_r model on the weather rows and return its path.
pub fn trained_model(dir: &Path) -> PathBuf {
    let models = dir.join("models");
    let config = run_file(
        dir,
        &format!("model_output_dir = {:?}\nincremental = false", models.to_string_lossy()),
        "zero_r",
    );
    let input = write(dir, "weather.csv", WEATHER);
    strata().args(["train", "--config"]).arg(&config).arg("--input").arg(&input).assert().success();
    models.join("model")
}
