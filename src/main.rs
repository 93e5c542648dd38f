use anyhow::Result;
use clap::{Parser, Subcommand};

use earl::cli::{self, OutputFormat};
use earl::config::Config;

#[derive(Parser)]
#[command(name = "earl")]
#[command(about = "EARL lead automation API", version)]
struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server
    Serve {
        #[command(flatten)]
        config: Config,
    },
    /// Sign webhook parameters the way Mailgun does
    Sign {
        /// Webhook signing key
        #[arg(long, env = "EARL_MAILGUN_SIGNING_KEY", hide_env_values = true)]
        key: String,
        /// Token to sign (default: random)
        #[arg(long)]
        token: Option<String>,
        /// Unix timestamp to sign (default: now)
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Evaluate dashboard health without sending alerts
    Health {
        /// Database file path
        #[arg(long, env = "EARL_DB", default_value = "./earl.db")]
        db: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("earl=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Serve { config } => {
            earl::server::run_server(config).await?;
        }
        Commands::Sign {
            key,
            token,
            timestamp,
        } => {
            cli::run_sign(&key, token.as_deref(), timestamp.as_deref(), format)?;
        }
        Commands::Health { db } => {
            cli::run_health(&db, format)?;
        }
    }

    Ok(())
}
