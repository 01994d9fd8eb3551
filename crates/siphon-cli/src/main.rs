mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "siphon",
    version,
    about = "Bulk export and merge-join of task records into downloadable artifacts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one export and print the artifact URL
    Export {
        /// Path to service config YAML
        #[arg(short, long)]
        config: PathBuf,
        /// Path to export request JSON
        #[arg(short, long)]
        request: PathBuf,
    },
    /// Count rows matching a request's primary dataset
    Count {
        /// Path to service config YAML
        #[arg(short, long)]
        config: PathBuf,
        /// Path to export request JSON
        #[arg(short, long)]
        request: PathBuf,
    },
    /// Delete stored artifacts past their retention period
    Sweep {
        /// Path to service config YAML
        #[arg(short, long)]
        config: PathBuf,
        /// Override the configured retention, in days
        #[arg(long)]
        days: Option<u32>,
    },
    /// List output schemas and the task types they serve
    Schemas {
        /// Service config whose schema overrides should be applied
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Export { config, request } => commands::export::execute(&config, &request).await,
        Commands::Count { config, request } => commands::count::execute(&config, &request).await,
        Commands::Sweep { config, days } => commands::sweep::execute(&config, days),
        Commands::Schemas { config } => commands::schemas::execute(config.as_deref()),
    }
}
