//! auth-relay CLI - simulate the website-to-extension relay and drive Supabase sign-in.

mod commands;
mod output;
mod page;

use std::path::PathBuf;

use auth_relay::OAuthProvider;
use clap::{Parser, Subcommand, ValueEnum};
use relay_config_and_utils::{init_logging_for_service, Config, Paths};
use tracing::debug;

/// auth-relay CLI - Relay sessions from the Sift website to the browser extension.
#[derive(Parser)]
#[command(name = "auth-relay")]
#[command(about = "Simulate the auth relay and drive Supabase sign-in flows")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and logs. Defaults to ~/.auth-relay
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge against an in-memory page described by a JSON fixture
    Simulate {
        /// Fixture file
        #[arg(long)]
        fixture: PathBuf,
    },

    /// Print the OAuth sign-in URL for a provider
    AuthorizeUrl {
        #[arg(long, value_enum)]
        provider: ProviderArg,
        /// Where the provider sends the user back. Defaults to the site's callback page
        #[arg(long)]
        redirect_to: Option<String>,
    },

    /// Send a magic sign-in link
    MagicLink {
        #[arg(long)]
        email: String,
        #[arg(long)]
        redirect_to: Option<String>,
    },

    /// Settle a sign-in callback from the redirect URL the provider returned
    CompleteCallback {
        /// Full redirect URL, including its fragment
        #[arg(long)]
        url: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Google,
    Apple,
}

impl From<ProviderArg> for OAuthProvider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Google => OAuthProvider::Google,
            ProviderArg::Apple => OAuthProvider::Apple,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let paths = match cli.base_dir.clone() {
        Some(base) => Paths::with_base_dir(base),
        None => match Paths::new() {
            Ok(paths) => paths,
            Err(e) => {
                output::print_error(&e.to_string(), &cli.format);
                std::process::exit(1);
            }
        },
    };
    let config = match Config::load(&paths) {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&format!("Failed to load config: {}", e), &cli.format);
            std::process::exit(1);
        }
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.effective_log_level().to_string());
    init_logging_for_service("auth-relay-cli", &level, &paths);
    debug!(base_dir = %paths.base_dir().display(), "Configuration loaded");

    let result = match cli.command {
        Commands::Simulate { fixture } => {
            commands::simulate(&fixture, &config.bridge, &cli.format).await
        }
        Commands::AuthorizeUrl {
            provider,
            redirect_to,
        } => commands::authorize_url(&config, provider.into(), redirect_to.as_deref(), &cli.format),
        Commands::MagicLink { email, redirect_to } => {
            commands::magic_link(&config, &email, redirect_to.as_deref(), &cli.format).await
        }
        Commands::CompleteCallback { url } => {
            commands::complete_callback(&config, &url, &cli.format).await
        }
    };

    if let Err(e) = result {
        output::print_error(&e.to_string(), &cli.format);
        std::process::exit(1);
    }
}
