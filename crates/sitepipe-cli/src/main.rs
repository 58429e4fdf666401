//! sitepipe CLI tool.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sitepipe")]
#[command(about = "Synthesize static site stacks with a CI/CD pipeline", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Values that take precedence over the configuration file.
#[derive(Args, Debug, Clone)]
struct OverrideArgs {
    /// Stack name
    #[arg(long, env = "SITEPIPE_STACK_NAME", global = true)]
    stack_name: Option<String>,

    /// Domain name of the site
    #[arg(long, env = "SITEPIPE_DOMAIN", global = true)]
    domain: Option<String>,

    /// Target account
    #[arg(long, env = "SITEPIPE_ACCOUNT", global = true)]
    account: Option<String>,

    /// Target region
    #[arg(long, env = "SITEPIPE_REGION", global = true)]
    region: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct InputArgs {
    /// Path to the configuration file
    #[arg(long, short, default_value = "sitepipe.kdl")]
    config: PathBuf,

    /// Lookup context file (defaults to sitepipe.context.json next to the config)
    #[arg(long)]
    context: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the stack into a cloud assembly
    Synth {
        #[command(flatten)]
        input: InputArgs,
        /// Output directory
        #[arg(long, short, default_value = "cdk.out")]
        out: PathBuf,
    },
    /// Validate the configuration and the resource graph
    Validate {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Print resources in dependency order
    Graph {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Show the lookups the stack needs and whether they are resolved
    Context {
        #[command(flatten)]
        input: InputArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let overrides = sitepipe_config::Overrides {
        stack_name: cli.overrides.stack_name,
        domain: cli.overrides.domain,
        account: cli.overrides.account,
        region: cli.overrides.region,
    };

    match cli.command {
        Commands::Synth { input, out } => {
            let input = commands::Input::new(input.config, input.context, overrides);
            commands::synth::run(&input, &out)?;
        }
        Commands::Validate { input } => {
            let input = commands::Input::new(input.config, input.context, overrides);
            commands::validate(&input)?;
        }
        Commands::Graph { input } => {
            let input = commands::Input::new(input.config, input.context, overrides);
            commands::graph::run(&input)?;
        }
        Commands::Context { input } => {
            let input = commands::Input::new(input.config, input.context, overrides);
            commands::context::run(&input)?;
        }
    }

    Ok(())
}
