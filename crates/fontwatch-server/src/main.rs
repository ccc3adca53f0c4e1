//! fontwatch server binary.
//!
//! Usage: `fontwatch-server [settings.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use fontwatch_process::MemoryProcessStore;
use fontwatch_server::{PollScheduler, Settings, build, metrics, run_server};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = Settings::load(path.as_deref()).context("can't load settings")?;
    let addr = settings.server.addr().context("invalid server address")?;

    info!(version = fontwatch_server::version(), sources = settings.sources.len(), "starting fontwatch");

    let prometheus = metrics::init_metrics().context("can't install metrics recorder")?;
    let app = build(&settings, Arc::new(MemoryProcessStore::new()))?;

    for (id, result) in app.state.service().init_all().await {
        if let Err(e) = result {
            anyhow::bail!("source '{id}' failed to initialize: {e}");
        }
    }

    let _poll = settings
        .poll
        .enabled
        .then(|| PollScheduler::new(app.state.service().clone(), settings.poll.clone()).start());

    run_server(addr, app.state, prometheus).await?;
    info!(bundles = app.cache.entry_count(), "server stopped");
    Ok(())
}
