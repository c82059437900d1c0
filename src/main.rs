use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use reqflow::config::Config;
use reqflow::console::Console;
use reqflow::gateways::mock::{MockContext, MockReasoning, MockTranscription};
use reqflow::gateways::{HttpContextGateway, HttpReasoningGateway, HttpTranscriptionGateway};
use reqflow::logging;
use reqflow::navigation::{JsonFileStateStore, Navigator};
use reqflow::notifications::NotificationService;
use reqflow::ratelimit::RateLimiter;
use reqflow::rest::{self, ApiState};
use reqflow::store::MemoryStore;
use reqflow::workflow::{Gateways, SessionEngine};

#[derive(Parser)]
#[command(name = "reqflow")]
#[command(about = "Guided requirements interviews and draft collection")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Use built-in canned gateways instead of the configured services
    #[arg(long)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API (default)
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,
    },

    /// Chat with the workflow on stdin/stdout
    Chat {
        /// Conversation owner
        #[arg(short, long, default_value_t = 1)]
        user: i64,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Print the OpenAPI document
    Openapi,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let mut config = Config::load(cli.config.as_deref())?;

    let logging_handle = logging::init_logging(&config, cli.debug)?;
    if let Some(path) = &logging_handle.log_file_path {
        tracing::info!(path = %path.display(), "Logging to file");
    }

    match cli.command {
        None => cmd_serve(config, cli.offline).await?,
        Some(Commands::Serve { port, host }) => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            cmd_serve(config, cli.offline).await?;
        }
        Some(Commands::Chat { user }) => cmd_chat(config, cli.offline, user).await?,
        Some(Commands::Config) => {
            println!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to render configuration")?
            );
        }
        Some(Commands::Openapi) => println!("{}", rest::ApiDoc::json()?),
    }

    Ok(())
}

fn gateways(config: &Config, offline: bool) -> Result<Gateways> {
    if offline {
        tracing::warn!("Using canned gateways; no external service will be called");
        return Ok(Gateways {
            reasoning: Arc::new(MockReasoning::new()),
            context: Arc::new(MockContext::default()),
            transcription: Arc::new(MockTranscription::default()),
        });
    }
    Ok(Gateways {
        reasoning: Arc::new(
            HttpReasoningGateway::new(&config.reasoning)
                .context("Failed to configure reasoning gateway")?,
        ),
        context: Arc::new(
            HttpContextGateway::new(&config.context)
                .context("Failed to configure context gateway")?,
        ),
        transcription: Arc::new(
            HttpTranscriptionGateway::new(&config.transcription)
                .context("Failed to configure transcription gateway")?,
        ),
    })
}

fn engine(config: &Config, offline: bool) -> Result<SessionEngine> {
    let store = MemoryStore::load(config.sessions_snapshot_path())?;
    Ok(SessionEngine::new(
        Arc::new(store),
        gateways(config, offline)?,
        config.workflow.clone(),
    ))
}

async fn cmd_serve(config: Config, offline: bool) -> Result<()> {
    let engine = engine(&config, offline)?;
    let notifier = NotificationService::from_config(&config)?;
    if !notifier.is_enabled() {
        tracing::warn!("Callbacks are disabled; asynchronous results will not be delivered");
    }
    let state = ApiState::new(engine, notifier, config);
    rest::serve(state).await
}

async fn cmd_chat(config: Config, offline: bool, user: i64) -> Result<()> {
    let engine = engine(&config, offline)?;
    let states = JsonFileStateStore::open(config.conversations_path())?;
    let navigator = Navigator::new(engine, Arc::new(states), config.navigation.clone());

    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let sweeper =
        limiter.spawn_sweeper(Duration::from_secs(config.rate_limit.cleanup_interval_secs.max(1)));

    let console = Console::new(navigator, limiter, user);
    let result = console
        .run(
            tokio::io::BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await;
    sweeper.abort();
    result
}
