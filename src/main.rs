use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::info;

use swarm_dashboard::appstate::Store;
use swarm_dashboard::config::{load_config, Settings};
use swarm_dashboard::factory::{initial_state, start_monitoring};
use swarm_dashboard::server;

/// Headless dashboard for load-test runs stored in a cloud-stats backend.
#[derive(Debug, Parser)]
#[command(name = "swarm_dashboard", version)]
struct Args {
    /// Directory holding config.yaml, config.yml or config.toml.
    #[arg(long)]
    config_dir: Option<String>,

    /// Address of the local HTTP surface, e.g. 127.0.0.1:8080.
    #[arg(long)]
    listen: Option<String>,

    /// Initial view as a query string: ?testrun=..&profile=..&showAdvanced=..
    #[arg(long)]
    query: Option<String>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, settings: &mut Settings) {
        if let Some(listen) = self.listen {
            settings.listen_address = listen;
        }
        if let Some(query) = self.query {
            settings.initial_query = Some(query);
        }
        if let Some(log_level) = self.log_level {
            settings.log_level = log_level;
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut settings = load_config(args.config_dir.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut settings);
    settings.init_logging();

    let settings = Arc::new(settings);
    let store = Store::new(initial_state(&settings));

    start_monitoring(settings.clone(), store.clone()).context("Failed to start monitoring")?;

    let store_for_actix = web::Data::new(store);
    info!("Serving dashboard state on http://{}", settings.listen_address);

    HttpServer::new(move || {
        App::new()
            .app_data(store_for_actix.clone())
            .configure(server::configure)
    })
    .bind(settings.listen_address.as_str())
    .with_context(|| format!("Failed to bind {}", settings.listen_address))?
    .run()
    .await
    .context("HTTP server failed")
}
