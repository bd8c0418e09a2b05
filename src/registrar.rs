use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::buildspec::Buildspec;
use crate::pipeline::PipelineDefinition;

pub const DEFAULT_OUTPUT_DIR: &str = "cdk.out";
pub const DEFINITION_FILE: &str = "pipeline.json";
pub const BUILDSPEC_DIR: &str = "buildspecs";

/// Receiver for assembled pipelines. Scheduling and execution belong to
/// whatever sits behind it.
pub trait Registrar {
    fn register(&mut self, definition: &PipelineDefinition) -> Result<Registration>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub pipeline: String,
    pub location: String,
    pub steps: usize,
    pub registered_at: DateTime<Utc>,
}

/// Writes the definition plus one buildspec per step into an output
/// directory for the platform to pick up.
#[derive(Debug, Clone)]
pub struct ManifestRegistrar {
    out_dir: PathBuf,
}

impl ManifestRegistrar {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn pipeline_dir(&self, definition: &PipelineDefinition) -> PathBuf {
        self.out_dir.join(&definition.name)
    }
}

impl Registrar for ManifestRegistrar {
    fn register(&mut self, definition: &PipelineDefinition) -> Result<Registration> {
        let pipeline_dir = self.pipeline_dir(definition);
        let buildspec_dir = pipeline_dir.join(BUILDSPEC_DIR);
        fs::create_dir_all(&buildspec_dir).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                buildspec_dir.display()
            )
        })?;

        let definition_path = pipeline_dir.join(DEFINITION_FILE);
        let file = File::create(&definition_path).with_context(|| {
            format!(
                "Failed to create pipeline definition: {}",
                definition_path.display()
            )
        })?;
        serde_json::to_writer_pretty(file, definition).with_context(|| {
            format!(
                "Failed to write pipeline definition: {}",
                definition_path.display()
            )
        })?;

        let mut steps = 0usize;
        for step in definition.steps() {
            let path = buildspec_dir.join(format!("{}.yaml", step.name));
            let rendered = Buildspec::for_step(step)
                .to_yaml()
                .with_context(|| format!("Failed to render buildspec for step '{}'", step.name))?;
            fs::write(&path, rendered)
                .with_context(|| format!("Failed to write buildspec: {}", path.display()))?;
            debug!(step = step.name.as_str(), path = %path.display(), "Buildspec written");
            steps += 1;
        }

        Ok(Registration {
            pipeline: definition.name.clone(),
            location: pipeline_dir.display().to_string(),
            steps,
            registered_at: Utc::now(),
        })
    }
}

/// Keeps registered definitions in memory. Used for dry runs.
#[derive(Debug, Default)]
pub struct InMemoryRegistrar {
    registered: Vec<PipelineDefinition>,
}

impl InMemoryRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered(&self) -> &[PipelineDefinition] {
        &self.registered
    }
}

impl Registrar for InMemoryRegistrar {
    fn register(&mut self, definition: &PipelineDefinition) -> Result<Registration> {
        self.registered.push(definition.clone());
        Ok(Registration {
            pipeline: definition.name.clone(),
            location: "memory".to_string(),
            steps: definition.steps().count(),
            registered_at: Utc::now(),
        })
    }
}
