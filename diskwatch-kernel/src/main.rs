/**
 * DISKWATCH KERNEL - Point d'entrée principal
 *
 * RÔLE : Bootstrap : config, préférences, feed d'usage, vues, ingest MQTT, HTTP.
 * ARCHITECTURE : sondes --MQTT--> feed (pub/sub par noeud) --> indicateurs des vues --> API REST.
 */

use anyhow::Context;
use diskwatch_kernel::config::load_config;
use diskwatch_kernel::feed::FeedRegistry;
use diskwatch_kernel::health::HealthTracker;
use diskwatch_kernel::http::{build_router, AppState};
use diskwatch_kernel::mqtt::spawn_mqtt_listener;
use diskwatch_kernel::preferences::PreferencesStore;
use diskwatch_kernel::views::ViewRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;

    let prefs = match PreferencesStore::load(&cfg.preferences_file).await {
        Ok(store) => store,
        Err(e) => {
            warn!(path = %cfg.preferences_file, "failed to load preferences, using defaults: {e}");
            PreferencesStore::defaults_at(&cfg.preferences_file)
        }
    };
    let prefs = Arc::new(prefs);

    // feed unique, passé explicitement aux vues et à l'ingest
    let feed = FeedRegistry::new();
    let health = HealthTracker::new();

    let views = ViewRegistry::new(feed.clone(), prefs.thresholds());
    for name in &cfg.views {
        views.ensure_view(name);
    }
    views.spawn_threshold_listener(prefs.subscribe());

    spawn_mqtt_listener(cfg.mqtt.clone(), feed.clone(), health.clone());

    let api_key = cfg.resolve_api_key();
    if api_key.is_none() {
        warn!("no API key configured (http.api_key / DISKWATCH_API_KEY): only /health is reachable");
    }

    let app = build_router(AppState {
        feed,
        views,
        prefs,
        health,
        api_key,
    });

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.bind))?;
    info!("listening on http://{}", cfg.http.bind);
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
