use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::source::SourceDescriptor;

const TOLERANT_SUFFIX: &str = "|| true";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BuildImage {
    #[serde(rename = "aws/codebuild/standard:5.0")]
    Standard5_0,
    #[serde(rename = "aws/codebuild/standard:6.0")]
    Standard6_0,
    #[serde(rename = "aws/codebuild/standard:7.0")]
    Standard7_0,
}

impl BuildImage {
    pub fn identifier(self) -> &'static str {
        match self {
            BuildImage::Standard5_0 => "aws/codebuild/standard:5.0",
            BuildImage::Standard6_0 => "aws/codebuild/standard:6.0",
            BuildImage::Standard7_0 => "aws/codebuild/standard:7.0",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComputeType {
    #[serde(rename = "BUILD_GENERAL1_SMALL")]
    Small,
    #[serde(rename = "BUILD_GENERAL1_MEDIUM")]
    Medium,
    #[serde(rename = "BUILD_GENERAL1_LARGE")]
    Large,
    #[serde(rename = "BUILD_GENERAL1_2XLARGE")]
    X2Large,
}

impl ComputeType {
    pub fn identifier(self) -> &'static str {
        match self {
            ComputeType::Small => "BUILD_GENERAL1_SMALL",
            ComputeType::Medium => "BUILD_GENERAL1_MEDIUM",
            ComputeType::Large => "BUILD_GENERAL1_LARGE",
            ComputeType::X2Large => "BUILD_GENERAL1_2XLARGE",
        }
    }
}

/// Isolated execution environment a build step runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildEnvironment {
    pub image: BuildImage,
    pub compute_type: ComputeType,
    pub privileged: bool,
}

impl BuildEnvironment {
    /// Standard 7.0 image on the small tier, privileged so steps can run
    /// container tooling.
    pub fn standard() -> Self {
        Self {
            image: BuildImage::Standard7_0,
            compute_type: ComputeType::Small,
            privileged: true,
        }
    }
}

/// One externally executed unit of work. Command order is execution order and
/// every install command runs before the first run command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDescriptor {
    pub name: String,
    #[serde(serialize_with = "serialize_source_ref")]
    pub input: Arc<SourceDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Arc<BuildEnvironment>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    pub install_commands: Vec<String>,
    pub run_commands: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

impl StepDescriptor {
    pub fn new(name: impl Into<String>, input: Arc<SourceDescriptor>) -> Self {
        Self {
            name: name.into(),
            input,
            environment: None,
            env: BTreeMap::new(),
            install_commands: Vec::new(),
            run_commands: Vec::new(),
            project_name: None,
        }
    }

    pub fn with_environment(mut self, environment: Arc<BuildEnvironment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_project_name(mut self, project_name: impl Into<String>) -> Self {
        self.project_name = Some(project_name.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_install_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.install_commands
            .extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn with_run_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_commands.extend(commands.into_iter().map(Into::into));
        self
    }

    /// True when every run command swallows its own exit status.
    pub fn is_exit_tolerant(&self) -> bool {
        !self.run_commands.is_empty() && self.run_commands.iter().all(|c| is_exit_tolerant(c))
    }

    pub fn has_tolerant_commands(&self) -> bool {
        self.run_commands.iter().any(|c| is_exit_tolerant(c))
    }
}

/// Suffixes `command` so that a non-zero exit does not fail the step.
pub fn tolerate_failure(command: &str) -> String {
    if is_exit_tolerant(command) {
        command.to_string()
    } else {
        format!("{} {TOLERANT_SUFFIX}", command.trim_end())
    }
}

pub fn is_exit_tolerant(command: &str) -> bool {
    command.trim_end().ends_with(TOLERANT_SUFFIX)
}

fn serialize_source_ref<S>(source: &Arc<SourceDescriptor>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(source.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::CredentialReference;

    fn source() -> Arc<SourceDescriptor> {
        Arc::new(
            SourceDescriptor::github("acme/app", "main", CredentialReference::default()).unwrap(),
        )
    }

    #[test]
    fn builder_preserves_command_order() {
        let step = StepDescriptor::new("Build", source())
            .with_install_commands(["a", "b"])
            .with_install_commands(["c"])
            .with_run_commands(["x", "y"]);
        assert_eq!(step.install_commands, vec!["a", "b", "c"]);
        assert_eq!(step.run_commands, vec!["x", "y"]);
        assert!(step.environment.is_none());
        assert!(step.project_name.is_none());
    }

    #[test]
    fn tolerate_failure_is_idempotent() {
        let once = tolerate_failure("python3 -m pylint tests");
        assert_eq!(once, "python3 -m pylint tests || true");
        assert_eq!(tolerate_failure(&once), once);
        assert!(is_exit_tolerant(&once));
        assert!(!is_exit_tolerant("python3 -m pytest"));
    }

    #[test]
    fn step_without_run_commands_is_not_tolerant() {
        let step = StepDescriptor::new("Empty", source());
        assert!(!step.is_exit_tolerant());
        assert!(!step.has_tolerant_commands());
    }

    #[test]
    fn serializes_input_as_reference() {
        let step = StepDescriptor::new("Build", source())
            .with_environment(Arc::new(BuildEnvironment::standard()))
            .with_run_commands(["make"]);
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["input"], "acme/app@main");
        assert_eq!(value["environment"]["image"], "aws/codebuild/standard:7.0");
        assert_eq!(value["environment"]["compute_type"], "BUILD_GENERAL1_SMALL");
        assert_eq!(value["environment"]["privileged"], true);
        assert!(value.get("env").is_none());
    }
}
