use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "jury",
    about = "Jury — secondary-reviewer completion and rebalancing",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Complete, rebalance and fix a first-phase assignment.
    ///
    /// Reads a problem JSON (resources, slots, rooms, tasks) and writes the
    /// finished tasks plus run statistics.
    Run {
        /// Problem JSON produced by the first phase
        #[arg(short, long)]
        input: String,
        /// Engine tuning (engine.toml). Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<String>,
        /// Write the outcome JSON here instead of stdout
        #[arg(short, long)]
        output: Option<String>,
        /// Override the rebalancer seed from the config
        #[arg(long)]
        seed: Option<u64>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print the fair-share band and the per-resource quota plan
    Plan {
        #[arg(short, long)]
        input: String,
    },
    /// Audit a finished assignment (outcome or problem JSON)
    Check {
        #[arg(short, long)]
        input: String,
    },
    /// Print the default engine.toml
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jury=info".parse()?)
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { input, config, output, seed, format } => {
            commands::run::run(&input, config.as_deref(), output.as_deref(), seed, &format)
        }
        Commands::Plan { input } => commands::plan::plan(&input),
        Commands::Check { input } => commands::check::check(&input),
        Commands::Config => commands::config::print_default(),
    }
}
