//! KageControl CLI entry point

mod cli;

use crate::cli::{Cli, Commands};
use anyhow::{bail, Context, Result};
use clap::Parser;
use kage_control::api::ReportSection;
use kage_control::channels::{ConnectionState, Endpoint, ReconnectPolicy};
use kage_control::routes::{menu, GuardDecision};
use kage_control::storage::FileStore;
use kage_control::{AppContext, ClientConfig};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let ctx = context(&cli)?;

    match cli.command {
        Commands::Login { username, password } => login(&ctx, username, password).await,
        Commands::Logout => {
            ctx.session().logout()?;
            println!("Logged out");
            Ok(())
        }
        Commands::Whoami => whoami(&ctx),
        Commands::Menu => show_menu(&ctx),
        Commands::Check { path } => check(&ctx, &path),
        Commands::Get { path } => get(&ctx, &path).await,
        Commands::OrderStatus { order_id, status } => {
            let order = ctx.kage().update_order_status(order_id, &status).await?;
            println!("{}", serde_json::to_string_pretty(&order)?);
            Ok(())
        }
        Commands::Report { start, end, sections, out } => report(&ctx, &start, &end, sections, &out).await,
        Commands::Watch { tables, max_attempts } => watch(&ctx, tables, max_attempts).await,
    }
}

/// Build the client from flags and environment, then pick up any stored login
fn context(cli: &Cli) -> Result<AppContext> {
    let mut config = ClientConfig::from_env();
    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
    }
    if let Some(url) = &cli.ws_url {
        config.ws_url = Some(url.clone());
    }
    if let Some(ms) = cli.reconnect_ms {
        config.reconnect_policy = ReconnectPolicy::constant(Duration::from_millis(ms));
    }

    let store = FileStore::new(&cli.store)
        .with_context(|| format!("Failed to open credential store: {}", cli.store))?;

    let ctx = AppContext::new(config, Arc::new(store)).context("Invalid client configuration")?;
    // an unreadable store must not block `logout`, which resets it
    if let Err(e) = ctx.restore_session() {
        warn!(error = %e, "Ignoring unreadable stored credential");
    }
    Ok(ctx)
}

async fn login(ctx: &AppContext, username: String, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            eprint!("Password: ");
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read password")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    let identity = ctx.session().login(&username, &password).await?;
    match identity.role {
        Some(role) => println!("Logged in as {} ({})", identity.username, role),
        None => println!("Logged in as {} (no recognized role)", identity.username),
    }
    Ok(())
}

fn whoami(ctx: &AppContext) -> Result<()> {
    let Some(identity) = ctx.session().identity() else {
        bail!("Not logged in");
    };

    println!("User: {}", identity.username);
    match identity.role {
        Some(role) => println!("Role: {}", role),
        None => println!("Role: (none)"),
    }
    Ok(())
}

fn show_menu(ctx: &AppContext) -> Result<()> {
    let role = ctx.session().role().context("Not logged in with a known role")?;

    println!("{} menu:", role);
    for route in menu(role) {
        println!("  {:<24} {}", route.path, route.label);
    }
    Ok(())
}

fn check(ctx: &AppContext, path: &str) -> Result<()> {
    match ctx.navigate(path) {
        GuardDecision::Render => println!("{}: render", path),
        GuardDecision::Redirect(redirect) => println!("{}: redirect to {}", path, redirect.path()),
    }
    Ok(())
}

async fn get(ctx: &AppContext, path: &str) -> Result<()> {
    let value: serde_json::Value = ctx.api().get(path).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn report(
    ctx: &AppContext,
    start: &str,
    end: &str,
    mut sections: Vec<ReportSection>,
    out: &str,
) -> Result<()> {
    if sections.is_empty() {
        sections = ReportSection::ALL.to_vec();
    }

    let pdf = ctx.kage().pdf_report(start, end, &sections).await?;
    std::fs::write(out, &pdf).with_context(|| format!("Failed to write report: {}", out))?;

    println!("Wrote {} bytes to {}", pdf.len(), out);
    Ok(())
}

async fn watch(ctx: &AppContext, tables: bool, max_attempts: Option<u32>) -> Result<()> {
    let endpoint = if tables { Endpoint::Tables } else { Endpoint::Notifications };

    let mut policy = ctx.config().reconnect_policy;
    if let Some(n) = max_attempts {
        policy = policy.max_attempts(n);
    }

    let handle = ctx
        .channel(endpoint)?
        .reconnect_policy(policy)
        .on_event(|event| match serde_json::to_string(&event) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Unprintable event: {}", e),
        })
        .on_error(|e| eprintln!("{}", e))
        .start();

    info!(%endpoint, "Watching");
    let mut state = handle.state_receiver();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ConnectionState::Closed {
                    break;
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
