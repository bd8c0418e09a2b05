use std::sync::Arc;

use gatepipe::context::ContextConfig;
use gatepipe::gates::GateKind;
use gatepipe::pipeline::{assemble, synthesize};
use gatepipe::registrar::InMemoryRegistrar;
use gatepipe::steps::is_exit_tolerant;
use gatepipe::validation::validate_definition;
use serde_json::json;

fn acme_context() -> ContextConfig {
    ContextConfig::from_value(json!({
        "qa": {
            "repository": { "name": "acme/app", "branch": "main" },
            "pipeline": { "name": "acme-qa" }
        }
    }))
    .unwrap()
}

#[test]
fn assembles_acme_pipeline_in_order() {
    let context = acme_context().resolve().unwrap();
    assert_eq!(context.environment_type, "qa");

    let definition = assemble(&context).unwrap();
    assert_eq!(definition.name, "acme-qa");
    assert_eq!(definition.synth.name, "Synth");
    assert_eq!(definition.pre_steps.len(), 5);
    assert_eq!(definition.stages.len(), 1);
    assert_eq!(definition.stages[0].environment_type, "qa");

    let gate_names: Vec<_> = definition.pre_steps.iter().map(|s| s.name.as_str()).collect();
    let expected: Vec<_> = GateKind::ALL.iter().map(|k| k.step_name()).collect();
    assert_eq!(gate_names, expected);

    for step in definition.steps() {
        assert!(Arc::ptr_eq(&step.input, &definition.source));
    }
    assert_eq!(definition.source.credential.name(), "github-token");

    let report = validate_definition(&definition);
    assert!(report.is_ok(), "{:?}", report.errors);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
}

#[test]
fn only_lint_commands_are_exit_tolerant() {
    let definition = assemble(&acme_context().resolve().unwrap()).unwrap();
    for step in definition.steps() {
        let tolerant = step.run_commands.iter().filter(|c| is_exit_tolerant(c)).count();
        if step.name == "Linter" {
            assert_eq!(tolerant, step.run_commands.len());
        } else {
            assert_eq!(tolerant, 0, "{} suppresses failures", step.name);
        }
    }
}

#[test]
fn assembly_is_a_pure_function_of_configuration() {
    let config = acme_context();
    let first = assemble(&config.resolve().unwrap()).unwrap();
    let second = assemble(&config.resolve().unwrap()).unwrap();
    assert_eq!(first, second);
    assert!(!Arc::ptr_eq(&first.source, &second.source));
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

#[test]
fn unknown_environment_registers_nothing() {
    let mut config = acme_context();
    config.apply_override("environmentType=staging").unwrap();

    let mut registrar = InMemoryRegistrar::new();
    let err = synthesize(&config, &mut registrar).unwrap_err();
    assert!(err.to_string().contains("staging"));
    assert!(registrar.registered().is_empty());
}

#[test]
fn synthesize_registers_one_definition() {
    let mut registrar = InMemoryRegistrar::new();
    let registration = synthesize(&acme_context(), &mut registrar).unwrap();
    assert_eq!(registration.pipeline, "acme-qa");
    assert_eq!(registration.steps, 6);
    assert_eq!(registrar.registered().len(), 1);
}

#[test]
fn tampered_definition_fails_validation() {
    let mut definition = assemble(&acme_context().resolve().unwrap()).unwrap();
    definition.pre_steps[2].run_commands = vec!["python3 -m pytest || true".into()];
    definition.stages.clear();

    let report = validate_definition(&definition);
    assert!(!report.is_ok());
    assert!(report.errors.iter().any(|e| e.contains("deployment stage")));
    assert!(report.errors.iter().any(|e| e.contains("UnitTests")));
}

#[test]
fn nested_pipeline_name_fails_validation() {
    let mut definition = assemble(&acme_context().resolve().unwrap()).unwrap();
    definition.name = "nested/acme-qa".into();

    let report = validate_definition(&definition);
    assert!(report.errors.iter().any(|e| e.contains("single path component")));
}
