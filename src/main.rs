mod config;
mod cycle;
mod error;
mod utils;
mod modules;

use clap::Parser;
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::bot_profile::BotProfile;
use crate::cycle::{BotCycle, Mode};
use crate::modules::action::{LedgerStore, XPublisher};
use crate::modules::brain::{FallbackChain, LlmProvider, QualityGate, TextProvider};
use crate::modules::perception::{MarketDataFetcher, NewsSentinel};
use crate::utils::http_client::HttpClientFactory;
use crate::utils::notifier::AlertNotifier;

/// Posts crypto market updates and news to X. One invocation = one run.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// `market`, `news`, or the cron expression that triggered this run.
    mode: Option<String>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn dry_run_enabled() -> bool {
    matches!(
        env::var("DRY_RUN").map(|v| v.trim().to_lowercase()).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("Starting market_update_bot v{}...", env!("CARGO_PKG_VERSION"));

    let profile = match BotProfile::load() {
        Ok(p) => p,
        Err(e) => {
            warn!("⚠️ Could not load bot_config: {:#}. Using defaults.", e);
            BotProfile::default()
        }
    };
    let mode = Mode::resolve(cli.mode.as_deref(), &profile.schedule);
    let dry_run = dry_run_enabled();
    if dry_run {
        info!("🧪 DRY_RUN set: nothing will be posted and the ledger will not be saved");
    }

    let data_client = HttpClientFactory::create()?;
    let llm_client = HttpClientFactory::create_llm()?;
    let retry = profile.retry_policy();

    let providers: Vec<Arc<dyn TextProvider>> = profile
        .providers
        .iter()
        .map(|cfg| {
            Arc::new(LlmProvider::new(llm_client.clone(), cfg.clone(), profile.gate.clone(), profile.threads.enabled))
                as Arc<dyn TextProvider>
        })
        .collect();
    if providers.is_empty() {
        warn!("🧠 No text providers configured; news posts will use the local template");
    }

    let chain = FallbackChain::new(providers, QualityGate::new(profile.gate.clone()), retry);
    let publisher = Arc::new(XPublisher::new(data_client.clone(), dry_run));
    let notifier = AlertNotifier::new(data_client.clone(), profile.alerts.format);
    let store = LedgerStore::from_config(&profile.ledger);

    let bot = BotCycle::new(
        Arc::new(MarketDataFetcher::new(data_client.clone(), profile.market.clone())),
        Arc::new(NewsSentinel::new(data_client.clone(), profile.news.clone())),
        chain,
        publisher,
        profile,
        retry,
    );

    let mut ledger = store.load();
    let report = tokio::select! {
        report = bot.run(mode, &mut ledger) => Some(report),
        _ = shutdown_signal() => {
            warn!("🛑 Interrupted, flushing ledger before exit...");
            None
        }
    };

    if dry_run {
        info!("🧪 Dry run: ledger left untouched at {}", store.path().display());
    } else if let Err(e) = store.save(&ledger) {
        error!("❌ Failed to persist ledger: {:#}", e);
    }

    match report {
        Some(report) if report.has_failures() => {
            warn!("⚠️ Run finished with failures:\n{}", report.summary());
            notifier.send_alert(&report.summary()).await;
        }
        Some(report) => info!("✅ {}", report.summary()),
        None => notifier.send_alert(&format!("{} run interrupted by signal", mode)).await,
    }

    Ok(())
}
