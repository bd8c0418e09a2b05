//! Context resolution: the environment-selection key and the per-environment
//! settings bundles that parameterize the pipeline.
//!
//! Context documents are YAML or JSON. Either the document itself is the
//! context map, or it is shaped like `cdk.json` and the map lives under its
//! `context` key. Command-line `key=value` overrides are layered on top.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

pub const ENVIRONMENT_TYPE_KEY: &str = "environmentType";
pub const DEFAULT_ENVIRONMENT_TYPE: &str = "qa";
pub const ACCOUNT_KEY: &str = "account";

const REPOSITORY_NAME: &str = "repository.name";
const REPOSITORY_BRANCH: &str = "repository.branch";
const PIPELINE_NAME: &str = "pipeline.name";

/// Errors raised while resolving configuration. All of them surface before a
/// pipeline is registered.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read context file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse context file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Context must be a mapping of keys to values")]
    NotAMapping,

    #[error("Invalid context override '{0}': expected KEY=VALUE")]
    InvalidOverride(String),

    #[error("Context key '{key}' must be a string")]
    InvalidKeyType { key: String },

    #[error("No settings found for environment '{environment}'. Available environments: {available}")]
    UnknownEnvironment {
        environment: String,
        available: String,
    },

    #[error("Environment '{environment}' is missing required key '{key}'")]
    MissingKey {
        environment: String,
        key: &'static str,
    },

    #[error("Environment '{environment}' key '{key}' must be a string")]
    InvalidType {
        environment: String,
        key: &'static str,
    },

    #[error("Environment '{environment}' key '{key}' cannot be empty")]
    EmptyValue {
        environment: String,
        key: &'static str,
    },

    #[error(
        "Environment '{environment}' pipeline name '{name}' must be a single path component"
    )]
    InvalidPipelineName { environment: String, name: String },

    #[error("Repository '{0}' must have the form owner/repo")]
    InvalidRepository(String),

    #[error("Branch for repository '{0}' cannot be empty")]
    InvalidBranch(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositorySettings {
    pub name: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSettings {
    pub name: String,
}

/// Fully resolved settings for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentContext {
    pub environment_type: String,
    pub repository: RepositorySettings,
    pub pipeline: PipelineSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

/// Raw key-value context as read from disk plus any overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextConfig {
    values: Map<String, Value>,
}

impl ContextConfig {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "Loaded context document");
        Self::from_value(value)
    }

    /// Builds a context from a parsed document, unwrapping a `cdk.json`-style
    /// `context` section when one is present.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let Value::Object(mut root) = value else {
            return Err(ConfigError::NotAMapping);
        };
        if matches!(root.get("context"), Some(Value::Object(_)))
            && let Some(Value::Object(inner)) = root.remove("context")
        {
            return Ok(Self::new(inner));
        }
        Ok(Self::new(root))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Applies a `KEY=VALUE` override. Values are always stored as strings.
    pub fn apply_override(&mut self, raw: &str) -> Result<(), ConfigError> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidOverride(raw.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::InvalidOverride(raw.to_string()));
        }
        debug!(key, "Applying context override");
        self.set(key, Value::String(value.to_string()));
        Ok(())
    }

    pub fn apply_overrides<I, S>(&mut self, overrides: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in overrides {
            self.apply_override(raw.as_ref())?;
        }
        Ok(())
    }

    /// The selected environment tag, falling back to `qa` when unset.
    pub fn environment_type(&self) -> Result<String, ConfigError> {
        match self.values.get(ENVIRONMENT_TYPE_KEY) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => {
                Ok(DEFAULT_ENVIRONMENT_TYPE.to_string())
            }
            Some(Value::String(tag)) if tag.trim().is_empty() => {
                Ok(DEFAULT_ENVIRONMENT_TYPE.to_string())
            }
            Some(Value::String(tag)) => Ok(tag.trim().to_string()),
            Some(_) => Err(ConfigError::InvalidKeyType {
                key: ENVIRONMENT_TYPE_KEY.to_string(),
            }),
        }
    }

    /// Names of every key holding a settings bundle, sorted. Namespaced
    /// framework keys (`@scope/pkg:flag`) are not environments.
    pub fn environments(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .values
            .iter()
            .filter(|(key, value)| value.is_object() && !is_framework_key(key))
            .map(|(key, _)| key.clone())
            .collect();
        names.sort();
        names
    }

    pub fn account(&self) -> Result<Option<String>, ConfigError> {
        match self.values.get(ACCOUNT_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(account)) if account.trim().is_empty() => Ok(None),
            Some(Value::String(account)) => Ok(Some(account.trim().to_string())),
            Some(Value::Number(account)) => Ok(Some(account.to_string())),
            Some(_) => Err(ConfigError::InvalidKeyType {
                key: ACCOUNT_KEY.to_string(),
            }),
        }
    }

    pub fn resolve(&self) -> Result<EnvironmentContext, ConfigError> {
        let tag = self.environment_type()?;
        self.resolve_environment(&tag)
    }

    pub fn resolve_environment(&self, tag: &str) -> Result<EnvironmentContext, ConfigError> {
        let bundle = self
            .values
            .get(tag)
            .filter(|value| value.is_object())
            .ok_or_else(|| ConfigError::UnknownEnvironment {
                environment: tag.to_string(),
                available: display_list(&self.environments()),
            })?;

        let context = EnvironmentContext {
            environment_type: tag.to_string(),
            repository: RepositorySettings {
                name: lookup_string(bundle, tag, REPOSITORY_NAME)?,
                branch: lookup_string(bundle, tag, REPOSITORY_BRANCH)?,
            },
            pipeline: PipelineSettings {
                name: lookup_pipeline_name(bundle, tag)?,
            },
            account: self.account()?,
        };
        debug!(
            environment = tag,
            repository = context.repository.name.as_str(),
            pipeline = context.pipeline.name.as_str(),
            "Resolved environment context"
        );
        Ok(context)
    }
}

fn lookup_string(
    bundle: &Value,
    environment: &str,
    key: &'static str,
) -> Result<String, ConfigError> {
    let mut current = bundle;
    for segment in key.split('.') {
        current = current
            .get(segment)
            .ok_or_else(|| ConfigError::MissingKey {
                environment: environment.to_string(),
                key,
            })?;
    }
    let value = current.as_str().ok_or_else(|| ConfigError::InvalidType {
        environment: environment.to_string(),
        key,
    })?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::EmptyValue {
            environment: environment.to_string(),
            key,
        });
    }
    Ok(value.to_string())
}

fn lookup_pipeline_name(bundle: &Value, environment: &str) -> Result<String, ConfigError> {
    let name = lookup_string(bundle, environment, PIPELINE_NAME)?;
    if !is_valid_pipeline_name(&name) {
        return Err(ConfigError::InvalidPipelineName {
            environment: environment.to_string(),
            name,
        });
    }
    Ok(name)
}

/// Pipeline names double as output directory names, so they must be a single
/// plain path component.
pub fn is_valid_pipeline_name(name: &str) -> bool {
    if name.contains('/') || name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn is_framework_key(key: &str) -> bool {
    key.starts_with('@') || key.contains(':')
}

fn display_list(names: &[String]) -> String {
    if names.is_empty() {
        "<none>".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ContextConfig {
        ContextConfig::from_value(json!({
            "qa": {
                "repository": { "name": "acme/app", "branch": "main" },
                "pipeline": { "name": "acme-qa" }
            },
            "prod": {
                "repository": { "name": "acme/app", "branch": "release" },
                "pipeline": { "name": "acme-prod" }
            },
            "@aws-cdk/core:stackRelativeExports": true
        }))
        .unwrap()
    }

    #[test]
    fn defaults_to_qa_without_override() {
        let context = sample().resolve().unwrap();
        assert_eq!(context.environment_type, "qa");
        assert_eq!(context.repository.name, "acme/app");
        assert_eq!(context.repository.branch, "main");
        assert_eq!(context.pipeline.name, "acme-qa");
        assert_eq!(context.account, None);
    }

    #[test]
    fn override_selects_environment() {
        let mut config = sample();
        config
            .apply_overrides(["environmentType=prod", "account=123456789012"])
            .unwrap();
        let context = config.resolve().unwrap();
        assert_eq!(context.environment_type, "prod");
        assert_eq!(context.repository.branch, "release");
        assert_eq!(context.account.as_deref(), Some("123456789012"));
    }

    #[test]
    fn unwraps_cdk_json_layout() {
        let config = ContextConfig::from_value(json!({
            "app": "python3 app.py",
            "context": {
                "qa": {
                    "repository": { "name": "acme/app", "branch": "main" },
                    "pipeline": { "name": "acme-qa" }
                }
            }
        }))
        .unwrap();
        assert_eq!(config.environments(), vec!["qa".to_string()]);
        assert!(config.resolve().is_ok());
    }

    #[test]
    fn unknown_environment_lists_available() {
        let err = sample().resolve_environment("staging").unwrap_err();
        match err {
            ConfigError::UnknownEnvironment {
                environment,
                available,
            } => {
                assert_eq!(environment, "staging");
                assert_eq!(available, "prod, qa");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_and_empty_keys_are_rejected() {
        let config = ContextConfig::from_value(json!({
            "qa": { "repository": { "name": "acme/app" }, "pipeline": { "name": "p" } },
            "dev": {
                "repository": { "name": "acme/app", "branch": "  " },
                "pipeline": { "name": "p" }
            },
            "ci": {
                "repository": { "name": "acme/app", "branch": "main" },
                "pipeline": { "name": 42 }
            }
        }))
        .unwrap();

        assert!(matches!(
            config.resolve_environment("qa"),
            Err(ConfigError::MissingKey { key: "repository.branch", .. })
        ));
        assert!(matches!(
            config.resolve_environment("dev"),
            Err(ConfigError::EmptyValue { key: "repository.branch", .. })
        ));
        assert!(matches!(
            config.resolve_environment("ci"),
            Err(ConfigError::InvalidType { key: "pipeline.name", .. })
        ));
    }

    #[test]
    fn malformed_override_is_rejected() {
        let mut config = sample();
        assert!(matches!(
            config.apply_override("environmentType"),
            Err(ConfigError::InvalidOverride(_))
        ));
        assert!(matches!(
            config.apply_override("=prod"),
            Err(ConfigError::InvalidOverride(_))
        ));
    }

    #[test]
    fn blank_or_false_environment_type_falls_back_to_qa() {
        let mut config = sample();
        config.apply_override("environmentType=").unwrap();
        assert_eq!(config.resolve().unwrap().environment_type, "qa");

        config.set(ENVIRONMENT_TYPE_KEY, json!(false));
        assert_eq!(config.environment_type().unwrap(), "qa");
    }

    #[test]
    fn non_string_environment_type_is_rejected() {
        let mut config = sample();
        config.set(ENVIRONMENT_TYPE_KEY, json!(7));
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidKeyType { key }) if key == ENVIRONMENT_TYPE_KEY
        ));
    }

    #[test]
    fn pipeline_name_must_be_a_single_component() {
        for name in ["../escaped", "/abs", "nested/name", "..", ".", "a\\b"] {
            let config = ContextConfig::from_value(json!({
                "qa": {
                    "repository": { "name": "acme/app", "branch": "main" },
                    "pipeline": { "name": name }
                }
            }))
            .unwrap();
            assert!(
                matches!(config.resolve(), Err(ConfigError::InvalidPipelineName { .. })),
                "expected '{name}' to be rejected"
            );
        }
        assert!(is_valid_pipeline_name("acme-qa"));
    }

    #[test]
    fn framework_keys_are_not_environments() {
        let config = ContextConfig::from_value(json!({
            "qa": {
                "repository": { "name": "acme/app", "branch": "main" },
                "pipeline": { "name": "acme-qa" }
            },
            "@aws-cdk/core:bootstrapQualifier": { "value": "hnb659fds" },
            "acme:settings": { "enabled": true }
        }))
        .unwrap();
        assert_eq!(config.environments(), vec!["qa".to_string()]);
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        assert!(matches!(
            ContextConfig::from_value(json!(["qa"])),
            Err(ConfigError::NotAMapping)
        ));
    }
}
