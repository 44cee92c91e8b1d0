use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "geoshift-cli", version, about = "Geoshift CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check schedules for conflicts
    Validate {
        #[command(subcommand)]
        action: commands::validate::ValidateAction,
    },
    /// Plan and apply batch schedule operations
    Plan {
        #[command(subcommand)]
        action: commands::plan::PlanAction,
    },
    /// Replay a scripted shift through the session engine
    Simulate {
        #[command(subcommand)]
        action: commands::simulate::SimulateAction,
    },
    /// Inspect and drain the offline event queue
    Queue {
        #[command(subcommand)]
        action: commands::queue::QueueAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Validate { action } => commands::validate::run(action),
        Commands::Plan { action } => commands::plan::run(action),
        Commands::Simulate { action } => commands::simulate::run(action),
        Commands::Queue { action } => commands::queue::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
