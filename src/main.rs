use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use gatepipe::context::ContextConfig;
use gatepipe::diff::diff_definitions;
use gatepipe::gates::GateKind;
use gatepipe::lockfile::generate_lock;
use gatepipe::pipeline::{assemble, synthesize};
use gatepipe::presets::generate_preset;
use gatepipe::registrar::{DEFAULT_OUTPUT_DIR, InMemoryRegistrar, ManifestRegistrar};
use gatepipe::validation::{validate_context, validate_definition};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    match cli.command {
        Commands::Synth {
            context,
            out,
            dry_run,
        } => synth_command(&context, out, dry_run),
        Commands::Validate { context } => validate_command(&context),
        Commands::Lock { context, output } => lock_command(&context, &output),
        Commands::Diff {
            context,
            left,
            right,
        } => diff_command(&context, &left, &right),
        Commands::ListGates => {
            list_gates();
            Ok(())
        }
        Commands::Init {
            preset,
            repository,
            output,
        } => {
            let path = generate_preset(&preset, &repository, &output)?;
            info!(preset = preset.as_str(), path = %path.display(), "Context file written");
            Ok(())
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "gatepipe", &mut io::stdout());
            Ok(())
        }
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))
}

fn load_context(args: &ContextArgs) -> Result<ContextConfig> {
    let mut config = ContextConfig::load(&args.context)?;
    config.apply_overrides(&args.values)?;
    Ok(config)
}

fn synth_command(args: &ContextArgs, out: PathBuf, dry_run: bool) -> Result<()> {
    let config = load_context(args)?;

    if dry_run {
        let mut registrar = InMemoryRegistrar::new();
        synthesize(&config, &mut registrar)?;
        let definition = registrar
            .registered()
            .first()
            .ok_or_else(|| anyhow!("Dry run produced no pipeline"))?;
        println!("{}", serde_json::to_string_pretty(definition)?);
        return Ok(());
    }

    let mut registrar = ManifestRegistrar::new(out);
    let registration = synthesize(&config, &mut registrar)?;
    println!(
        "Synthesized pipeline '{}' ({} steps) into {}",
        registration.pipeline, registration.steps, registration.location
    );
    Ok(())
}

fn validate_command(args: &ContextArgs) -> Result<()> {
    let config = load_context(args)?;
    let report = validate_context(&config);

    for warning in &report.warnings {
        warn!(file = %args.context.display(), "{warning}");
    }
    if !report.is_ok() {
        for message in &report.errors {
            error!(file = %args.context.display(), "{message}");
        }
        bail!(
            "Validation failed with {} error(s)",
            report.errors.len()
        );
    }

    info!(
        file = %args.context.display(),
        environments = config.environments().len(),
        "Context is valid"
    );
    Ok(())
}

fn lock_command(args: &ContextArgs, output: &Path) -> Result<()> {
    let config = load_context(args)?;
    let definition = assemble(&config.resolve()?)?;
    let report = validate_definition(&definition);
    if !report.is_ok() {
        bail!(
            "Pipeline '{}' is invalid: {}",
            definition.name,
            report.errors.join("; ")
        );
    }
    generate_lock(&definition, output)?;
    info!(
        pipeline = definition.name.as_str(),
        lockfile = %output.display(),
        "Lockfile written"
    );
    Ok(())
}

fn diff_command(args: &ContextArgs, left: &str, right: &str) -> Result<()> {
    let config = load_context(args)?;
    let left_definition = assemble(&config.resolve_environment(left)?)
        .with_context(|| format!("Failed to assemble environment '{left}'"))?;
    let right_definition = assemble(&config.resolve_environment(right)?)
        .with_context(|| format!("Failed to assemble environment '{right}'"))?;

    let differences = diff_definitions(&left_definition, &right_definition);
    if differences.is_empty() {
        println!("Pipelines match: {left} == {right}");
    } else {
        println!("Pipeline differences between '{left}' and '{right}':");
        for difference in &differences {
            println!("- {difference}");
        }
    }
    Ok(())
}

fn list_gates() {
    println!("Quality gates:");
    for (idx, kind) in GateKind::ALL.iter().enumerate() {
        let policy = if kind.blocks_pipeline() {
            "blocking"
        } else {
            "advisory"
        };
        println!(
            "  {}. {} [{}] ({policy}) - {}",
            idx + 1,
            kind.step_name(),
            kind.project_name(),
            kind.description()
        );
    }
}

#[derive(Parser)]
#[command(
    name = "gatepipe",
    version,
    about = "Assemble gated delivery pipelines from context configuration"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ContextArgs {
    /// Context document (YAML or JSON, bare map or cdk.json layout)
    #[arg(long, default_value = "cdk.json")]
    context: PathBuf,
    /// Context override, e.g. -c environmentType=prod
    #[arg(short = 'c', long = "context-value", value_name = "KEY=VALUE")]
    values: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the pipeline and write its manifests
    Synth {
        #[command(flatten)]
        context: ContextArgs,
        #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
        out: PathBuf,
        /// Print the definition instead of writing manifests
        #[arg(long)]
        dry_run: bool,
    },
    /// Check every environment in the context document
    Validate {
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Write a fingerprint lockfile for the selected environment
    Lock {
        #[command(flatten)]
        context: ContextArgs,
        output: PathBuf,
    },
    /// Compare the pipelines of two environments
    Diff {
        #[command(flatten)]
        context: ContextArgs,
        left: String,
        right: String,
    },
    /// List the quality gates and whether they block deployment
    ListGates,
    /// Write a starter context document
    Init {
        #[arg(long, default_value = "cdk")]
        preset: String,
        #[arg(long, default_value = "owner/repo")]
        repository: String,
        #[arg(long, default_value = "cdk.json")]
        output: PathBuf,
    },
    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
