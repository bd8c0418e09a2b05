use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::DEFAULT_ENVIRONMENT_TYPE;

pub const PRESETS: &[&str] = &["cdk", "minimal"];

#[derive(Debug, Clone, Serialize)]
struct CdkDocument {
    app: String,
    context: ContextPreset,
}

#[derive(Debug, Clone, Serialize)]
struct ContextPreset {
    #[serde(rename = "environmentType")]
    environment_type: String,
    #[serde(flatten)]
    environments: BTreeMap<String, EnvironmentPreset>,
}

#[derive(Debug, Clone, Serialize)]
struct EnvironmentPreset {
    repository: RepositoryPreset,
    pipeline: PipelinePreset,
}

#[derive(Debug, Clone, Serialize)]
struct RepositoryPreset {
    name: String,
    branch: String,
}

#[derive(Debug, Clone, Serialize)]
struct PipelinePreset {
    name: String,
}

/// Writes a starter context document. JSON when `destination` ends in
/// `.json`, YAML otherwise.
pub fn generate_preset(name: &str, repository: &str, destination: &Path) -> Result<PathBuf> {
    let rendered = match name {
        "cdk" => render(
            &CdkDocument {
                app: "python3 app.py".into(),
                context: context_preset(repository),
            },
            destination,
        )?,
        "minimal" => render(&context_preset(repository), destination)?,
        other => anyhow::bail!(
            "Unknown preset '{other}'. Available presets: {}",
            PRESETS.join(", ")
        ),
    };

    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(destination, rendered)
        .with_context(|| format!("Failed to write context file: {}", destination.display()))?;

    Ok(destination.to_path_buf())
}

fn render<T: Serialize>(value: &T, destination: &Path) -> Result<String> {
    let is_json = destination
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let mut rendered = serde_json::to_string_pretty(value)?;
        rendered.push('\n');
        Ok(rendered)
    } else {
        Ok(serde_yaml::to_string(value)?)
    }
}

fn context_preset(repository: &str) -> ContextPreset {
    let slug = repository
        .rsplit('/')
        .next()
        .filter(|slug| !slug.is_empty())
        .unwrap_or("app");
    let mut environments = BTreeMap::new();
    environments.insert(
        "qa".to_string(),
        environment(repository, "main", &format!("{slug}-qa")),
    );
    environments.insert(
        "prod".to_string(),
        environment(repository, "release", &format!("{slug}-prod")),
    );
    ContextPreset {
        environment_type: DEFAULT_ENVIRONMENT_TYPE.into(),
        environments,
    }
}

fn environment(repository: &str, branch: &str, pipeline: &str) -> EnvironmentPreset {
    EnvironmentPreset {
        repository: RepositoryPreset {
            name: repository.into(),
            branch: branch.into(),
        },
        pipeline: PipelinePreset {
            name: pipeline.into(),
        },
    }
}
