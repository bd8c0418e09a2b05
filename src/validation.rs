use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::context::{ContextConfig, ENVIRONMENT_TYPE_KEY, is_valid_pipeline_name};
use crate::gates::GateKind;
use crate::pipeline::{PipelineDefinition, assemble};
use crate::synth::SYNTH_STEP_NAME;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Structural checks on an assembled pipeline.
pub fn validate_definition(definition: &PipelineDefinition) -> ValidationReport {
    let mut report = ValidationReport::default();

    if definition.name.trim().is_empty() {
        report.errors.push("Pipeline name cannot be empty".into());
    } else if !is_valid_pipeline_name(&definition.name) {
        report.errors.push(format!(
            "Pipeline name '{}' must be a single path component",
            definition.name
        ));
    }

    if definition.synth.name != SYNTH_STEP_NAME {
        report.errors.push(format!(
            "First step must be '{SYNTH_STEP_NAME}', found '{}'",
            definition.synth.name
        ));
    }
    if definition
        .pre_steps
        .iter()
        .any(|step| step.name == SYNTH_STEP_NAME)
    {
        report
            .errors
            .push("Synth step may only appear once, ahead of all other steps".into());
    }

    match definition.stages.len() {
        0 => report
            .errors
            .push("Pipeline must contain a deployment stage".into()),
        1 => {}
        n => report
            .errors
            .push(format!("Pipeline must contain exactly one deployment stage, found {n}")),
    }

    let names: Vec<_> = definition
        .pre_steps
        .iter()
        .map(|step| step.name.as_str())
        .collect();
    let expected: Vec<_> = GateKind::ALL.iter().map(|kind| kind.step_name()).collect();
    if names != expected {
        report.errors.push(format!(
            "Quality gates must be [{}], found [{}]",
            expected.join(", "),
            names.join(", ")
        ));
    }

    let mut seen_steps = HashSet::new();
    let mut seen_projects = HashSet::new();
    for step in definition.steps() {
        if !seen_steps.insert(step.name.as_str()) {
            report
                .errors
                .push(format!("Duplicate step name '{}'", step.name));
        }
        if let Some(project) = &step.project_name
            && !seen_projects.insert(project.as_str())
        {
            report
                .errors
                .push(format!("Duplicate project name '{project}'"));
        }
        if step.run_commands.is_empty() {
            report
                .errors
                .push(format!("Step '{}' has no run commands", step.name));
        }
        if step
            .install_commands
            .iter()
            .chain(step.run_commands.iter())
            .any(|command| command.trim().is_empty())
        {
            report
                .errors
                .push(format!("Step '{}' contains an empty command", step.name));
        }
        if !Arc::ptr_eq(&step.input, &definition.source) {
            report.errors.push(format!(
                "Step '{}' does not consume the pipeline source",
                step.name
            ));
        }

        let advisory = GateKind::from_step_name(&step.name) == Some(GateKind::Lint);
        if step.has_tolerant_commands() && !advisory {
            report.errors.push(format!(
                "Step '{}' suppresses command failures; only lint findings are advisory",
                step.name
            ));
        }
        if advisory && !step.is_exit_tolerant() {
            report.warnings.push(format!(
                "Lint step '{}' has commands that block the pipeline",
                step.name
            ));
        }
    }

    let mut environments = definition
        .pre_steps
        .iter()
        .map(|step| step.environment.as_ref());
    if let Some(first) = environments.next() {
        let shared = environments.all(|env| match (first, env) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        });
        if first.is_none() || !shared {
            report
                .errors
                .push("Quality gates must share a single build environment".into());
        }
    }

    report
}

/// Checks that the selected environment and every bundle in the context
/// resolve to a valid pipeline.
pub fn validate_context(config: &ContextConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.get(ENVIRONMENT_TYPE_KEY).is_none() {
        report.warnings.push(format!(
            "'{ENVIRONMENT_TYPE_KEY}' is not set; the default environment will be used"
        ));
    }

    match config.environment_type() {
        Ok(selected) => {
            if let Err(err) = config.resolve_environment(&selected) {
                report.errors.push(err.to_string());
            }
        }
        Err(err) => report.errors.push(err.to_string()),
    }

    for environment in config.environments() {
        let assembled = config
            .resolve_environment(&environment)
            .and_then(|context| assemble(&context));
        match assembled {
            Ok(definition) => {
                let mut nested = validate_definition(&definition);
                nested.errors = nested
                    .errors
                    .into_iter()
                    .map(|message| format!("Environment '{environment}': {message}"))
                    .collect();
                nested.warnings = nested
                    .warnings
                    .into_iter()
                    .map(|message| format!("Environment '{environment}': {message}"))
                    .collect();
                report.merge(nested);
            }
            Err(err) => {
                let message = err.to_string();
                if !report.errors.contains(&message) {
                    report.errors.push(message);
                }
            }
        }
    }

    report
}
