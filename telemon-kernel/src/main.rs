/**
 * TELEMON KERNEL - Point d'entrée du pont télémétrie
 *
 * RÔLE : Orchestration : config, historique CSV, lien broker, tick périodique, HTTP.
 *
 * ARCHITECTURE : un seul Arc<Telemetry> partagé entre la boucle de tick et les
 * handlers axum ; le lien MQTT tourne sur sa propre tâche tokio.
 * ARRÊT : Ctrl-C arrête le serveur HTTP, puis la boucle de tick, puis envoie
 * DISCONNECT au broker.
 */

mod config;
mod health;
mod history;
mod http;
mod ticker;

use anyhow::{Context, Result};
use telemon_core::{HistoricalDataset, Telemetry};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("telemon=info")))
        .init();

    let cfg = load_config().await;

    // historique : absent ou illisible = pas de requêtes d'usage, le reste tourne
    let offset = cfg.utc_offset()?;
    let history = match history::load_history(&cfg.history.path, offset) {
        Ok(dataset) => dataset,
        Err(e) => {
            warn!("[kernel] no usage history: {e:#}");
            HistoricalDataset::default()
        }
    };

    let settings = cfg.broker_settings();
    let telemetry = Telemetry::connect(&settings, cfg.telemetry_config(history)?);
    info!("[kernel] watching {}", telemetry.layout().subscribe_filter());

    let (stop_tx, stop_rx) = watch::channel(false);
    let ticker = ticker::spawn_tick_loop(telemetry.clone(), cfg.tick_interval, stop_rx);

    let app = http::build_router(AppState {
        telemetry: telemetry.clone(),
        health_tracker: HealthTracker::new(),
    });

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("cannot bind {}", cfg.http.bind))?;
    info!("[kernel] listening on http://{}", cfg.http.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    let _ = stop_tx.send(true);
    if let Err(e) = ticker.await {
        warn!("[kernel] tick loop ended abnormally: {e}");
    }
    telemetry.shutdown().await;
    info!("[kernel] bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("[kernel] cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("[kernel] shutdown requested");
}
