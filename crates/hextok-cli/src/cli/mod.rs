//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use hextok_core::{config, logging};

mod app;
mod browser;
mod commands;

#[derive(Parser)]
#[command(name = "hextok")]
#[command(version)]
#[command(about = "Drive the Hextok deep-link and sign-in pipeline from a terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override the API base URL from config
    #[arg(long, global = true, env = "HEXTOK_API_BASE", value_name = "URL")]
    api_base: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show where a deep link would be routed
    Route {
        /// Deep link URL, e.g. hextok://video/42
        #[arg(value_name = "URL")]
        url: String,

        /// Route as a signed-in user
        #[arg(long)]
        authenticated: bool,

        /// Current location before routing
        #[arg(long, value_name = "PATH", default_value = "/home")]
        current: String,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Deliver a deep link and run the startup sequence once
    Simulate {
        /// Deep link URL, e.g. hextok://oauth/callback?token=abc&user_id=5
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Sign in (browser flow, or exchange a one-time token directly)
    Login {
        /// One-time token from an OAuth callback
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
    },

    /// Sign out and clear the stored session
    Logout,

    /// Show the current auth status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Persist the API base URL
    SetApiBase {
        #[arg(value_name = "URL")]
        url: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = config::Config::load().context("load config")?;
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }

    let _log_guard = logging::init(&config).context("init logging")?;

    match cli.command {
        Commands::Route {
            url,
            authenticated,
            current,
            json,
        } => commands::route::run(&config, &url, authenticated, &current, json),
        Commands::Simulate { url } => commands::simulate::run(&config, &url).await,
        Commands::Login { token } => match token {
            Some(token) => commands::auth::login_with_token(&config, &token).await,
            None => commands::auth::login(&config).await,
        },
        Commands::Logout => commands::auth::logout(&config).await,
        Commands::Status => commands::auth::status(&config).await,
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::SetApiBase { url } => commands::config::set_api_base(&url),
        },
    }
}
