use std::collections::BTreeMap;

use serde::Serialize;

use crate::steps::StepDescriptor;

pub const BUILDSPEC_VERSION: &str = "0.2";

/// Build specification the platform executes for a single step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Buildspec {
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BuildspecEnv>,
    pub phases: Phases,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildspecEnv {
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Phases {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<Phase>,
    pub build: Phase,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Phase {
    pub commands: Vec<String>,
}

impl Buildspec {
    pub fn for_step(step: &StepDescriptor) -> Self {
        let env = (!step.env.is_empty()).then(|| BuildspecEnv {
            variables: step.env.clone(),
        });
        let install = (!step.install_commands.is_empty()).then(|| Phase {
            commands: step.install_commands.clone(),
        });
        Self {
            version: BUILDSPEC_VERSION,
            env,
            phases: Phases {
                install,
                build: Phase {
                    commands: step.run_commands.clone(),
                },
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::source::{CredentialReference, SourceDescriptor};

    #[test]
    fn renders_phases_in_order() {
        let source = Arc::new(
            SourceDescriptor::github("acme/app", "main", CredentialReference::default()).unwrap(),
        );
        let step = StepDescriptor::new("Synth", source)
            .with_env("ENV_TYPE", "qa")
            .with_install_commands(["npm install -g aws-cdk"])
            .with_run_commands(["cdk synth"]);

        let yaml = Buildspec::for_step(&step).to_yaml().unwrap();
        let install = yaml.find("install:").unwrap();
        let build = yaml.find("build:").unwrap();
        assert!(install < build);
        assert!(yaml.contains("version: '0.2'") || yaml.contains("version: \"0.2\""));
        assert!(yaml.contains("ENV_TYPE: qa"));
        assert!(yaml.contains("- cdk synth"));
    }

    #[test]
    fn omits_empty_sections() {
        let source = Arc::new(
            SourceDescriptor::github("acme/app", "main", CredentialReference::default()).unwrap(),
        );
        let step = StepDescriptor::new("Test", source).with_run_commands(["python3 -m pytest"]);
        let spec = Buildspec::for_step(&step);
        assert!(spec.env.is_none());
        assert!(spec.phases.install.is_none());
    }
}
