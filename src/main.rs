//! chatrelay - streaming proxy for OpenAI-compatible chat completion providers
//!
//! Forwards chat prompts to a hosted completion endpoint and relays the
//! answer as one JSON body or as server-sent events.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::config::{Config, KeySource};

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "Streaming proxy for OpenAI-compatible chat completion providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Path to configuration file (defaults and environment only when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and show the resolved upstream
    Check {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chatrelay={},tower_http=info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is not an error.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let (mut config, key_source) = Config::load(config.as_deref())?;
            init_tracing(&config.logging.level);

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            tracing::info!(
                model = %config.upstream.model,
                base_url = %config.upstream.base_url,
                key_source = %key_source,
                pacing_ms = config.stream.pacing_ms,
                "Loaded configuration"
            );
            if key_source == KeySource::None {
                tracing::warn!("No API key configured - chat requests will fail until one is set");
            }

            chatrelay::proxy::run_server(config).await
        }

        Commands::Check { config } => {
            let (config, key_source) = Config::load(config.as_deref())?;
            init_tracing(&config.logging.level);

            println!("Configuration OK");
            println!("  listen:     {}", config.server.listen);
            println!("  base_url:   {}", config.upstream.base_url);
            println!("  model:      {}", config.upstream.model);
            println!("  api key:    {}", key_source);
            println!("  pacing:     {} ms", config.stream.pacing_ms);
            if key_source == KeySource::None {
                println!("  warning:    no API key, every chat request will fail");
            }
            Ok(())
        }
    }
}
