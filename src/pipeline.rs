use std::sync::Arc;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::context::{ConfigError, ContextConfig, EnvironmentContext};
use crate::gates::quality_gates;
use crate::registrar::{Registrar, Registration};
use crate::source::SourceDescriptor;
use crate::steps::StepDescriptor;
use crate::synth::synth_step;
use crate::validation::validate_definition;

/// Deployment stage handed to the platform. Its composition is owned by the
/// deploying application; the pipeline only parameterizes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployStage {
    pub construct_id: String,
    pub environment_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl DeployStage {
    pub fn new(environment_type: impl Into<String>, account: Option<String>) -> Self {
        let environment_type = environment_type.into();
        Self {
            construct_id: environment_type.to_uppercase(),
            environment_type,
            account,
        }
    }
}

/// A complete pipeline: source, synth, the pre-deployment gates and the
/// deployment stage they guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub environment_type: String,
    pub source: Arc<SourceDescriptor>,
    pub synth: StepDescriptor,
    pub pre_steps: Vec<StepDescriptor>,
    pub stages: Vec<DeployStage>,
}

impl PipelineDefinition {
    /// Synth first, then every pre-step.
    pub fn steps(&self) -> impl Iterator<Item = &StepDescriptor> {
        std::iter::once(&self.synth).chain(self.pre_steps.iter())
    }

    pub fn step(&self, name: &str) -> Option<&StepDescriptor> {
        self.steps().find(|step| step.name == name)
    }

    /// Names in the order the platform gates them.
    pub fn execution_order(&self) -> Vec<String> {
        self.steps()
            .map(|step| step.name.clone())
            .chain(
                self.stages
                    .iter()
                    .map(|stage| format!("Deploy:{}", stage.construct_id)),
            )
            .collect()
    }
}

/// Builds the pipeline for one resolved environment. Identical input always
/// yields an equal definition.
#[instrument(skip(context), fields(environment = %context.environment_type))]
pub fn assemble(context: &EnvironmentContext) -> Result<PipelineDefinition, ConfigError> {
    let source = Arc::new(SourceDescriptor::from_context(context)?);
    let synth = synth_step(&source, &context.environment_type);
    let pre_steps = quality_gates(&source, &context.environment_type);
    let stages = vec![DeployStage::new(
        context.environment_type.clone(),
        context.account.clone(),
    )];

    Ok(PipelineDefinition {
        name: context.pipeline.name.clone(),
        environment_type: context.environment_type.clone(),
        source,
        synth,
        pre_steps,
        stages,
    })
}

/// Resolves, assembles and validates, and only then hands the definition to
/// `registrar`. Nothing is registered when any earlier phase fails.
pub fn synthesize(config: &ContextConfig, registrar: &mut dyn Registrar) -> Result<Registration> {
    let context = config.resolve()?;
    let definition = assemble(&context)?;

    let report = validate_definition(&definition);
    for warning in &report.warnings {
        warn!(pipeline = definition.name.as_str(), "{warning}");
    }
    if !report.is_ok() {
        for message in &report.errors {
            error!(pipeline = definition.name.as_str(), "{message}");
        }
        bail!(
            "Pipeline '{}' failed validation with {} error(s)",
            definition.name,
            report.errors.len()
        );
    }

    let registration = registrar.register(&definition)?;
    info!(
        pipeline = registration.pipeline.as_str(),
        location = registration.location.as_str(),
        steps = registration.steps,
        "Pipeline registered"
    );
    Ok(registration)
}
