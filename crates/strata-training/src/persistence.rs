//! Model artifacts on disk.
//!
//! A saved model is a JSON document holding the learner name, the model state, the
//! schema it is bound to and, when trained on real data, the class priors.

use crate::error::{TrainingError, TrainingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use strata_abstraction::{Capabilities, Dataset, Learner, Model, Priors, Schema};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_MODEL_FILE_NAME: &str = "model";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub learner: String,
    pub options: String,
    pub capabilities: Capabilities,
    pub schema: Schema,
    pub state: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priors: Option<Priors>,
}

impl ModelArtifact {
    /// Capture a model. Priors are kept only when `training_data` has labelled records.
    pub fn capture(
        learner: &dyn Learner,
        model: &dyn Model,
        schema: &Schema,
        training_data: Option<&Dataset>,
    ) -> TrainingResult<Self> {
        let priors = training_data.and_then(Priors::from_dataset);
        if priors.is_some() {
            debug!("storing training class priors with saved model");
        }
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            learner: learner.name().to_string(),
            options: learner.options(),
            capabilities: model.capabilities(),
            schema: schema.without_string_values(),
            state: model.to_state()?,
            priors,
        })
    }

    /// Rebuild the live model through the learner that produced it.
    pub fn restore(&self, learner: &dyn Learner) -> TrainingResult<Box<dyn Model>> {
        if learner.name() != self.learner {
            return Err(TrainingError::Persistence(format!(
                "artifact was produced by '{}', not '{}'",
                self.learner,
                learner.name()
            )));
        }
        Ok(learner.restore(&self.state, &self.schema)?)
    }
}

/// A model file written by [`ModelStore::save`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedModel {
    pub path: PathBuf,
    pub sha256: String,
}

/// Resolve a model location given as a plain path or a `file:` URI.
///
/// Spaces are tolerated inside URIs. Malformed escapes and remote hosts are rejected.
pub fn resolve_model_path(raw: &str) -> TrainingResult<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(malformed(raw, "empty path"));
    }
    let Some(rest) = trimmed
        .get(..5)
        .filter(|scheme| scheme.eq_ignore_ascii_case("file:"))
        .and_then(|_| trimmed.get(5..))
    else {
        return Ok(PathBuf::from(trimmed));
    };

    let encoded = rest.replace(' ', "%20");
    let path_part = if let Some(rest) = encoded.strip_prefix("//") {
        let (host, path) = rest.find('/').map_or((rest, ""), |i| rest.split_at(i));
        if !(host.is_empty() || host.eq_ignore_ascii_case("localhost")) {
            return Err(malformed(raw, "remote hosts are not supported"));
        }
        path.to_string()
    } else {
        encoded
    };
    if path_part.is_empty() {
        return Err(malformed(raw, "no path component"));
    }
    if !has_valid_escapes(&path_part) {
        return Err(malformed(raw, "invalid percent escape"));
    }
    let decoded = urlencoding::decode(&path_part).map_err(|e| malformed(raw, &e.to_string()))?;
    Ok(PathBuf::from(decoded.into_owned()))
}

/// `urlencoding::decode` passes malformed escapes such as `%zz` through unchanged and
/// only fails on invalid UTF-8, so they are checked here first.
fn has_valid_escapes(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
            if !ok {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

fn malformed(path: &str, reason: &str) -> TrainingError {
    TrainingError::MalformedModelPath { path: path.to_string(), reason: reason.to_string() }
}

/// File name for a model: prefixed by the stratification value or the batch number.
///
/// The stratification value is percent-encoded, so it never adds a path component.
pub fn artifact_file_name(base: &str, stratum: Option<&str>, batch: Option<u64>) -> String {
    match (stratum, batch) {
        (Some(s), _) => format!("{}_{base}", urlencoding::encode(s)),
        (None, Some(b)) => format!("{b}_{base}"),
        (None, None) => base.to_string(),
    }
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Output directory for saved models.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
    file_name: String,
}

impl ModelStore {
    pub fn from_uri(dir: &str, file_name: Option<&str>) -> TrainingResult<Self> {
        let file_name = file_name
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_MODEL_FILE_NAME)
            .to_string();
        Ok(Self { dir: resolve_model_path(dir)?, file_name })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> TrainingResult<()> {
        if self.dir.is_file() {
            return Err(TrainingError::Persistence(format!(
                "model output path {} is not a directory",
                self.dir.display()
            )));
        }
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| {
                TrainingError::Persistence(format!(
                    "unable to create model output directory {}: {e}",
                    self.dir.display()
                ))
            })?;
        }
        Ok(())
    }

    pub fn save(
        &self,
        artifact: &ModelArtifact,
        stratum: Option<&str>,
        batch: Option<u64>,
    ) -> TrainingResult<SavedModel> {
        self.ensure_dir()?;
        let path = self.dir.join(artifact_file_name(&self.file_name, stratum, batch));
        let bytes = serde_json::to_vec_pretty(artifact)?;
        std::fs::write(&path, bytes)?;
        let sha256 = sha256_file(&path)?;
        info!(learner = %artifact.learner, path = %path.display(), sha256 = %sha256, "saved model");
        Ok(SavedModel { path, sha256 })
    }
}

pub fn load_artifact(location: &str) -> TrainingResult<ModelArtifact> {
    let path = resolve_model_path(location)?;
    let bytes = std::fs::read(&path).map_err(|e| {
        TrainingError::Persistence(format!("unable to read model {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Load a model whose training will be continued. Fails if it cannot resume.
pub fn load_resumable(
    location: &str,
    learner: &dyn Learner,
) -> TrainingResult<(Box<dyn Model>, ModelArtifact)> {
    info!(path = location, "loading resumable model");
    let artifact = load_artifact(location)?;
    if !artifact.capabilities.resumable {
        return Err(TrainingError::NotResumable(artifact.learner));
    }
    let model = artifact.restore(learner)?;
    if !model.capabilities().resumable {
        return Err(TrainingError::NotResumable(artifact.learner));
    }
    Ok((model, artifact))
}
