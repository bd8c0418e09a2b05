use std::sync::Arc;

use tracing::debug;

use crate::source::SourceDescriptor;
use crate::steps::StepDescriptor;

pub const SYNTH_STEP_NAME: &str = "Synth";
pub const ENV_TYPE_VARIABLE: &str = "ENV_TYPE";

/// Resolves the deploying account into `$ACCOUNT` for later commands.
pub const RESOLVE_ACCOUNT: &str = "ACCOUNT=$(aws sts get-caller-identity | jq -r .Account)";

const INSTALL_COMMANDS: &[&str] = &[
    "npm install -g aws-cdk",
    "pip3 install -r requirements.txt",
    "pip3 install -r requirements-dev.txt",
    RESOLVE_ACCOUNT,
];

const BUILD_COMMANDS: &[&str] =
    &["cdk synth -c account=$ACCOUNT -c environmentType=$ENV_TYPE"];

/// The mandatory first step: bootstraps the toolchain and synthesizes the
/// deployable application for `environment_type`.
pub fn synth_step(source: &Arc<SourceDescriptor>, environment_type: &str) -> StepDescriptor {
    debug!(environment = environment_type, "Building synth step");
    StepDescriptor::new(SYNTH_STEP_NAME, Arc::clone(source))
        .with_env(ENV_TYPE_VARIABLE, environment_type)
        .with_install_commands(INSTALL_COMMANDS.iter().copied())
        .with_run_commands(BUILD_COMMANDS.iter().copied())
}
