//! Supabase sign-in commands.

use crate::output::{self, OutputFormat};
use crate::page::{ConsoleNavigator, ConsoleNotifier, RecordingMessenger};
use anyhow::{Context, Result};
use auth_relay::provider::ProviderBinding;
use auth_relay::{CallbackHandler, CallbackPage, CallbackState, OAuthProvider, SupabaseAuthClient};
use relay_config_and_utils::Config;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

fn client(config: &Config) -> Result<SupabaseAuthClient> {
    let api_url = config.supabase_url().context("invalid supabase_url")?;
    Ok(SupabaseAuthClient::new(
        api_url.as_str(),
        config.supabase_publishable_key.clone(),
    ))
}

fn redirect_target(config: &Config, redirect_to: Option<&str>) -> Result<String> {
    match redirect_to {
        Some(url) => Ok(Url::parse(url).context("invalid --redirect-to")?.to_string()),
        None => Ok(config.callback_url()?.to_string()),
    }
}

/// `auth-relay authorize-url`
pub fn authorize_url(
    config: &Config,
    provider: OAuthProvider,
    redirect_to: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let redirect = redirect_target(config, redirect_to)?;
    let url = client(config)?.authorize_url(provider, &redirect)?;
    match format {
        OutputFormat::Text => println!("{}", url),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "provider": provider.as_str(), "url": url.as_str() })
        ),
    }
    Ok(())
}

/// `auth-relay magic-link`
pub async fn magic_link(
    config: &Config,
    email: &str,
    redirect_to: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let redirect = redirect_target(config, redirect_to)?;
    client(config)?.send_magic_link(email, &redirect).await?;
    output::print_success(&format!("Magic link sent to {}", email.trim()), format);
    Ok(())
}

/// Outcome of a callback run.
#[derive(Debug, Serialize)]
pub struct CallbackOutcome {
    pub state: CallbackState,
    pub navigated_to: Option<String>,
    pub relayed: bool,
    pub notices: Vec<String>,
}

impl fmt::Display for CallbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", output::heading("Sign-in callback"))?;
        writeln!(f, "{}", output::row("state", self.state.as_str()))?;
        writeln!(
            f,
            "{}",
            output::row("navigated to", self.navigated_to.as_deref().unwrap_or("-"))
        )?;
        write!(f, "{}", output::row("relayed", if self.relayed { "yes" } else { "no" }))
    }
}

/// `auth-relay complete-callback --url <redirect>`
pub async fn complete_callback(config: &Config, redirect: &str, format: &OutputFormat) -> Result<()> {
    let redirect = Url::parse(redirect).context("invalid --url")?;
    let supabase = Arc::new(client(config)?);

    let messenger = Arc::new(RecordingMessenger::new(
        config.site_url()?.origin().ascii_serialization(),
    ));
    let navigator = Arc::new(ConsoleNavigator::default());
    let notifier = Arc::new(ConsoleNotifier::default());
    let binding = ProviderBinding::from_client("supabase", supabase.clone());
    let handler = CallbackHandler::new(
        config.callback.clone(),
        &binding,
        CallbackPage {
            messenger: messenger.clone(),
            navigator: navigator.clone(),
            notifier: notifier.clone(),
        },
    )?;

    // A failed exchange surfaces through the handler's session query
    match supabase.establish_from_redirect(&redirect).await {
        Ok(Some(_)) => debug!("Redirect carried a session"),
        Ok(None) => warn!("Redirect carried no session, waiting for auth state change"),
        Err(e) => debug!(error = %e, "Redirect exchange failed"),
    }

    let state = handler.run().await;
    let outcome = CallbackOutcome {
        state,
        navigated_to: navigator.paths().into_iter().next(),
        relayed: !messenger.posted().is_empty(),
        notices: notifier.notices(),
    };
    output::print(&outcome, format);

    if state != CallbackState::Succeeded {
        anyhow::bail!("sign-in did not complete ({})", state.as_str());
    }
    Ok(())
}
