//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the
//! appropriate commands against the access layer.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::api::client::HttpAccessApi;
use crate::api::AccessApi;
use crate::auth::LoginFlow;
use crate::core::catalog::ModelCatalog;
use crate::core::constants::{DEFAULT_APP_URL, DEFAULT_CONTROL_URL};
use crate::core::guard::{evaluate_path, RouteDecision};
use crate::core::policy::{PolicySync, SyncState};
use crate::core::quota::{QuotaTracker, Tier};
use crate::core::session::Session;
use crate::core::store::FileSessionStore;

#[derive(Parser)]
#[command(name = "chatgate")]
#[command(about = "Access and entitlement gate for a hosted chat service")]
#[command(
    long_about = "Chatgate manages the client side of a gated chat deployment: it signs \
users in against the control plane, keeps the session token and server \
policy in a persisted session, and tracks remaining per-tier usage.\n\n\
Session state lives in the platform config directory and survives \
restarts. Server policy is fetched at most once per invocation; use \
'chatgate sync' to trigger it explicitly.\n\n\
Environment Variables:\n\
  RUST_LOG          Log filter for diagnostics (e.g. chatgate=debug)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Hosted app origin serving the policy endpoint
    #[arg(long, global = true, value_name = "URL")]
    pub app_url: Option<String>,

    /// Control-plane base URL for account and quota endpoints
    #[arg(long, global = true, value_name = "URL")]
    pub control_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and persist the session token
    Login {
        /// Account name
        account: String,
        /// Password; prompted for when omitted
        password: Option<String>,
    },
    /// Show session, policy, and quota state
    Status,
    /// Trigger the one-time policy sync
    Sync,
    /// Refresh remaining quota for both tiers
    Quota,
    /// Spend one unit of usage on a tier ('standard' or 'premium')
    Consume { tier: String },
    /// Evaluate the route guard for a path
    Guard { path: String },
    /// Store the shared access code (an empty string clears it)
    SetCode { code: String },
    /// Point model traffic at a different upstream endpoint
    SetUrl { url: String },
    /// Drop the current session
    Logout,
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let session = Arc::new(Session::open(Arc::new(FileSessionStore::new())));
    let app_url = args.app_url.as_deref().unwrap_or(DEFAULT_APP_URL);
    let control_url = args.control_url.as_deref().unwrap_or(DEFAULT_CONTROL_URL);
    let api: Arc<dyn AccessApi> = Arc::new(HttpAccessApi::new(
        reqwest::Client::new(),
        app_url,
        control_url,
    ));
    let catalog = Arc::new(ModelCatalog::builtin());
    let policy = Arc::new(PolicySync::new(
        api.clone(),
        session.clone(),
        catalog.clone(),
    ));

    match args.command {
        Commands::Login { account, password } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password()?,
            };
            let flow = LoginFlow::new(api, session);
            let success = flow.login(&account, &password).await?;
            println!("✓ Logged in as user {}", success.user_id);
            println!("Continue at {}", success.destination.path());
        }
        Commands::Status => {
            let tracker = QuotaTracker::new(api.clone(), session.clone());
            let (_, quota) =
                futures_util::future::join(policy.ensure_synced(), tracker.refresh()).await;
            if let Err(e) = quota {
                tracing::debug!(error = %e, "quota refresh failed; showing persisted counts");
            }
            print_status(&session, &catalog);
        }
        Commands::Sync => {
            policy.ensure_synced().await;
            let state = match policy.state() {
                SyncState::NotFetched => "not fetched (static export build)",
                SyncState::Fetching => "fetching",
                SyncState::Done => "done",
            };
            println!("Policy sync: {state}");
        }
        Commands::Quota => {
            let tracker = QuotaTracker::new(api, session);
            let quota = tracker.refresh().await?;
            println!("Standard remaining: {}", quota.standard_remaining);
            println!("Premium remaining: {}", quota.premium_remaining);
        }
        Commands::Consume { tier } => {
            let tier: Tier = tier.parse().map_err(Box::<dyn Error>::from)?;
            let tracker = QuotaTracker::new(api, session);
            let quota = tracker.consume(tier).await?;
            println!("✓ Recorded one {tier} use");
            println!("Standard remaining: {}", quota.standard_remaining);
            println!("Premium remaining: {}", quota.premium_remaining);
        }
        Commands::Guard { path } => match evaluate_path(&path, &session.snapshot()) {
            RouteDecision::Allow => println!("allow"),
            RouteDecision::RedirectToLogin => println!("redirect: /login"),
            RouteDecision::RedirectToAuth => println!("redirect: /auth"),
        },
        Commands::SetCode { code } => {
            session.set_access_code(&code)?;
            if code.is_empty() {
                println!("✓ Access code cleared");
            } else {
                println!("✓ Access code stored");
            }
        }
        Commands::SetUrl { url } => {
            session.set_remote_url(&url)?;
            println!("✓ Upstream set to {}", session.snapshot().remote_url);
        }
        Commands::Logout => {
            LoginFlow::new(api, session).logout()?;
            println!("✓ Logged out");
        }
    }

    Ok(())
}

fn print_status(session: &Session, catalog: &ModelCatalog) {
    let state = session.snapshot();
    println!(
        "Authorized: {}",
        if state.is_authorized() { "yes" } else { "no" }
    );
    println!(
        "Access code required: {}",
        if state.need_code { "yes" } else { "no" }
    );
    println!("Upstream: {}", state.remote_url);
    println!(
        "Standard remaining: {}",
        state.standard_remaining.as_deref().unwrap_or("unknown")
    );
    println!(
        "Premium remaining: {}",
        state.premium_remaining.as_deref().unwrap_or("unknown")
    );
    println!("Greeting: {}", catalog.greeting());
    println!("Models:");
    for model in catalog.models() {
        println!(
            "  {} {} [{}]",
            if model.available { "✓" } else { "✗" },
            model.id,
            model.tier
        );
    }
}

fn prompt_password() -> Result<String, Box<dyn Error>> {
    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
