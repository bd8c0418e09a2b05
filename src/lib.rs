pub mod buildspec;
pub mod context;
pub mod diff;
pub mod gates;
pub mod lockfile;
pub mod pipeline;
pub mod presets;
pub mod registrar;
pub mod source;
pub mod steps;
pub mod synth;
pub mod validation;

pub use context::{ConfigError, ContextConfig, EnvironmentContext};
pub use pipeline::{DeployStage, PipelineDefinition, assemble, synthesize};
pub use registrar::{InMemoryRegistrar, ManifestRegistrar, Registrar, Registration};
pub use source::SourceDescriptor;
pub use steps::{BuildEnvironment, StepDescriptor};
