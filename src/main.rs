//! ana-router: one-shot CLI.
//!
//! Routes a single message through the classifier, fallback chain and tool
//! loop, then prints the JSON response envelope on stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use ana_router::agent_core::{RouterRequest, Router};
use ana_router::inference::config::load_or_default;
use ana_router::inference::mock::MockProvider;
use ana_router::inference::{build_chain, FallbackChain};
use ana_router::{init_tracing, tools, LogTarget};

/// Route a message to the right model, calling tools when needed
#[derive(Parser)]
#[command(name = "ana-router")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: $ANA_ROUTER_CONFIG, then ana-router.yaml upward from cwd)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// The message carries an image
    #[arg(long)]
    image: bool,

    /// Session identifier (default: random)
    #[arg(long, env = "ANA_SESSION_ID")]
    session: Option<String>,

    /// Log to stderr instead of the log file
    #[arg(long)]
    log_stderr: bool,

    /// Use an echo provider instead of the configured chain
    #[arg(long)]
    offline: bool,

    /// Print the classification decision and exit
    #[arg(long)]
    classify: bool,

    /// The user message
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let target = if cli.log_stderr {
        LogTarget::Stderr
    } else {
        LogTarget::File
    };
    init_tracing(target).context("failed to initialize logging")?;

    let cwd = std::env::current_dir().context("cannot read working directory")?;
    let config = load_or_default(cli.config.as_deref(), &cwd)?;

    let chain = if cli.offline {
        FallbackChain::new(vec![Arc::new(MockProvider::echo("offline"))])
    } else {
        FallbackChain::new(build_chain(&config.providers)?)
    };
    let registry = tools::builtin_registry()?;
    let router = Router::new(config, chain, registry)?;

    let mut request = RouterRequest::new(cli.message).with_image(cli.image);
    if let Some(session) = cli.session {
        request = request.with_session(session);
    }

    let output = if cli.classify {
        serde_json::to_string_pretty(&router.classify(&request.message, &request.context))?
    } else {
        serde_json::to_string_pretty(&router.handle(request).await)?
    };
    println!("{output}");
    Ok(())
}
