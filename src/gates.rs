//! Pre-deployment quality gates.
//!
//! Five independent build steps share one source binding and one build
//! environment. Their order is for readability only; no gate consumes another
//! gate's output. Lint findings are advisory, every other gate blocks
//! promotion on a non-zero exit.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::source::SourceDescriptor;
use crate::steps::{BuildEnvironment, StepDescriptor, tolerate_failure};
use crate::synth::ENV_TYPE_VARIABLE;

/// Stack synthesized for the template scan.
pub const SCAN_STACK_NAME: &str = "cdk-pipeline-scan";

const SHARED_INSTALL_COMMANDS: &[&str] = &[
    "npm install -g aws-cdk",
    "python3 -m venv .env",
    "chmod +x .env/bin/activate",
    ". .env/bin/activate",
    "pip3 install -r requirements.txt",
    "pip3 install -r requirements-dev.txt",
];

const LINT_TARGETS: &[&str] = &["cdk_workshop", "tests", "app.py"];
const AUDITED_MANIFESTS: &[&str] = &["requirements.txt", "requirements-dev.txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GateKind {
    SecretScan,
    Lint,
    UnitTests,
    TemplateScan,
    DependencyAudit,
}

impl GateKind {
    pub const ALL: [GateKind; 5] = [
        GateKind::SecretScan,
        GateKind::Lint,
        GateKind::UnitTests,
        GateKind::TemplateScan,
        GateKind::DependencyAudit,
    ];

    pub fn step_name(self) -> &'static str {
        match self {
            GateKind::SecretScan => "GitSecrets",
            GateKind::Lint => "Linter",
            GateKind::UnitTests => "UnitTests",
            GateKind::TemplateScan => "CfnNag",
            GateKind::DependencyAudit => "DependencyAudit",
        }
    }

    pub fn project_name(self) -> &'static str {
        match self {
            GateKind::SecretScan => "cdk-pipelines-git-secrets",
            GateKind::Lint => "cdk-pipelines-linter",
            GateKind::UnitTests => "cdk-pipelines-unit-tests",
            GateKind::TemplateScan => "cdk-pipelines-cfn-nag",
            GateKind::DependencyAudit => "cdk-pipelines-audit",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            GateKind::SecretScan => "Scan the checked-out tree for committed secrets",
            GateKind::Lint => "Run pylint over the application sources (advisory)",
            GateKind::UnitTests => "Run the unit test suite",
            GateKind::TemplateScan => "Synthesize the scan stack and check it with cfn_nag",
            GateKind::DependencyAudit => "Audit dependency manifests for known vulnerabilities",
        }
    }

    /// Whether a failure of this gate stops the deployment.
    pub fn blocks_pipeline(self) -> bool {
        !matches!(self, GateKind::Lint)
    }

    pub fn from_step_name(name: &str) -> Option<GateKind> {
        GateKind::ALL.into_iter().find(|kind| kind.step_name() == name)
    }
}

/// Builds all five gates against a single shared build environment.
#[instrument(skip(source), fields(source = %source))]
pub fn quality_gates(source: &Arc<SourceDescriptor>, environment_type: &str) -> Vec<StepDescriptor> {
    let environment = Arc::new(BuildEnvironment::standard());
    let steps: Vec<_> = GateKind::ALL
        .into_iter()
        .map(|kind| gate_step(kind, source, &environment, environment_type))
        .collect();
    debug!(count = steps.len(), "Quality gates assembled");
    steps
}

pub fn gate_step(
    kind: GateKind,
    source: &Arc<SourceDescriptor>,
    environment: &Arc<BuildEnvironment>,
    environment_type: &str,
) -> StepDescriptor {
    let step = StepDescriptor::new(kind.step_name(), Arc::clone(source))
        .with_environment(Arc::clone(environment))
        .with_project_name(kind.project_name());

    match kind {
        GateKind::SecretScan => step
            .with_install_commands([
                "SECRETS_FOLDER=git-secrets",
                "mkdir $SECRETS_FOLDER",
                "git clone --quiet https://github.com/awslabs/git-secrets.git $SECRETS_FOLDER",
                "cd $SECRETS_FOLDER",
                "make install",
                "cd .. && rm -rf $SECRETS_FOLDER",
            ])
            .with_run_commands([
                "git secrets --register-aws",
                "git secrets --scan",
                "echo No vulnerabilities detected. Have a really nice day!",
            ]),
        GateKind::Lint => step
            .with_install_commands(shared_install_commands())
            .with_run_commands(
                LINT_TARGETS
                    .iter()
                    .map(|target| tolerate_failure(&format!("python3 -m pylint {target}"))),
            ),
        GateKind::UnitTests => step
            .with_install_commands(shared_install_commands())
            .with_run_commands(["python3 -m pytest"]),
        // The scan re-synthesizes with $ENV_TYPE, so the step exports it.
        GateKind::TemplateScan => step
            .with_env(ENV_TYPE_VARIABLE, environment_type)
            .with_install_commands(shared_install_commands())
            .with_install_commands(["gem install cfn-nag"])
            .with_run_commands([
                "ACCOUNT=$(aws sts get-caller-identity | jq -r '.Account')".to_string(),
                format!("STACK_NAME={SCAN_STACK_NAME}"),
                "cdk synth $STACK_NAME -c account=$ACCOUNT -c environmentType=$ENV_TYPE > template.yaml"
                    .to_string(),
                "cfn_nag_scan --input-path template.yaml".to_string(),
            ]),
        GateKind::DependencyAudit => step
            .with_install_commands(shared_install_commands())
            .with_run_commands(
                AUDITED_MANIFESTS
                    .iter()
                    .map(|manifest| format!("safety check -r {manifest}")),
            ),
    }
}

/// Toolchain bootstrap shared by the Python-based gates.
pub fn shared_install_commands() -> Vec<String> {
    SHARED_INSTALL_COMMANDS
        .iter()
        .map(|command| command.to_string())
        .collect()
}
