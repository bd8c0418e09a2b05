use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::pipeline::PipelineDefinition;
use crate::steps::StepDescriptor;

#[derive(Debug, Serialize)]
pub struct PipelineLock {
    pub pipeline: String,
    pub environment_type: String,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub fingerprint: String,
    pub steps: Vec<StepLock>,
    pub stages: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StepLock {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub advisory: bool,
    pub fingerprint: String,
}

pub fn pipeline_lock(definition: &PipelineDefinition) -> PipelineLock {
    let steps = definition
        .steps()
        .map(|step| StepLock {
            name: step.name.clone(),
            project_name: step.project_name.clone(),
            advisory: step.is_exit_tolerant(),
            fingerprint: step_fingerprint(step),
        })
        .collect();

    PipelineLock {
        pipeline: definition.name.clone(),
        environment_type: definition.environment_type.clone(),
        generated_at: Utc::now(),
        source: definition.source.to_string(),
        fingerprint: definition_fingerprint(definition),
        steps,
        stages: definition
            .stages
            .iter()
            .map(|stage| stage.construct_id.clone())
            .collect(),
    }
}

pub fn generate_lock(definition: &PipelineDefinition, path: &Path) -> Result<()> {
    let lock = pipeline_lock(definition);

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create lockfile directory: {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create lockfile: {}", path.display()))?;
    serde_yaml::to_writer(file, &lock)
        .with_context(|| format!("Failed to write lockfile: {}", path.display()))?;

    Ok(())
}

/// SHA-256 over everything that affects how a step executes.
pub fn step_fingerprint(step: &StepDescriptor) -> String {
    let mut hasher = Sha256::new();
    hash_step(&mut hasher, step);
    format!("{:x}", hasher.finalize())
}

pub fn definition_fingerprint(definition: &PipelineDefinition) -> String {
    let mut hasher = Sha256::new();
    hash_field(&mut hasher, &definition.name);
    hash_field(&mut hasher, &definition.source.to_string());
    hash_field(&mut hasher, definition.source.credential.name());
    for step in definition.steps() {
        hash_step(&mut hasher, step);
    }
    for stage in &definition.stages {
        hash_field(&mut hasher, &stage.construct_id);
        hash_field(&mut hasher, &stage.environment_type);
        hash_field(&mut hasher, stage.account.as_deref().unwrap_or_default());
    }
    format!("{:x}", hasher.finalize())
}

fn hash_step(hasher: &mut Sha256, step: &StepDescriptor) {
    hash_field(hasher, &step.name);
    hash_field(hasher, step.project_name.as_deref().unwrap_or_default());
    if let Some(environment) = &step.environment {
        hash_field(hasher, environment.image.identifier());
        hash_field(hasher, environment.compute_type.identifier());
        hash_field(hasher, if environment.privileged { "privileged" } else { "" });
    }
    for (key, value) in &step.env {
        hash_field(hasher, key);
        hash_field(hasher, value);
    }
    hash_field(hasher, "install");
    for command in &step.install_commands {
        hash_field(hasher, command);
    }
    hash_field(hasher, "run");
    for command in &step.run_commands {
        hash_field(hasher, command);
    }
}

// Length-prefixed so adjacent fields cannot run together.
fn hash_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}
