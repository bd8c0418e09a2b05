use gatepipe::context::ContextConfig;
use gatepipe::presets::generate_preset;
use gatepipe::validation::validate_context;
use std::fs;
use tempfile::tempdir;

#[test]
fn cdk_preset_writes_loadable_context() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("cdk.json");
    let generated = generate_preset("cdk", "acme/app", &path).expect("preset generation");
    let contents = fs::read_to_string(&generated).expect("read preset");
    assert!(contents.contains("\"environmentType\": \"qa\""));
    assert!(contents.contains("\"app\": \"python3 app.py\""));

    let config = ContextConfig::load(&generated).unwrap();
    let report = validate_context(&config);
    assert!(report.is_ok(), "{:?}", report.errors);
    assert_eq!(config.resolve().unwrap().pipeline.name, "app-qa");
}

#[test]
fn minimal_preset_renders_yaml() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("context.yaml");
    generate_preset("minimal", "acme/app", &path).unwrap();
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("environmentType: qa"));
    assert!(contents.contains("branch: release"));
}

#[test]
fn unknown_preset_is_rejected() {
    let temp = tempdir().unwrap();
    let err = generate_preset("nightly", "acme/app", &temp.path().join("x.yaml")).unwrap_err();
    assert!(err.to_string().contains("Unknown preset 'nightly'"));
}
