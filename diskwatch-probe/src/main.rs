//! diskwatch probe - per-node disk usage publisher
//!
//! Samples the configured mount points at a fixed interval and publishes one
//! disk-usage@v1 event per tick to the kernel over MQTT.

mod config;
mod metrics;

use anyhow::{Context, Result};
use config::ProbeConfig;
use metrics::{MountUsage, UsageEvent};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Transport for outgoing usage events
pub trait UsagePublisher {
    fn publish_event(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;
}

impl UsagePublisher for AsyncClient {
    async fn publish_event(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .context("Failed to publish usage event")
    }
}

struct Probe<P> {
    config: ProbeConfig,
    publisher: P,
}

impl<P: UsagePublisher> Probe<P> {
    fn new(config: ProbeConfig, publisher: P) -> Self {
        Self { config, publisher }
    }

    /// Sample and publish once
    async fn tick(&self) -> Result<()> {
        let usage = metrics::collect_usage(&self.config.probe.mounts)
            .context("Failed to collect disk usage")?;
        self.publish_usage(usage).await
    }

    async fn publish_usage(&self, usage: BTreeMap<String, MountUsage>) -> Result<()> {
        let event = UsageEvent {
            node_id: self.config.probe.node_id.clone(),
            usage,
        };
        let payload = serde_json::to_vec(&event).context("Failed to serialize usage event")?;
        self.publisher
            .publish_event(&self.config.mqtt.topic, payload)
            .await?;
        debug!("Usage event sent for node {}", event.node_id);
        Ok(())
    }

    async fn run(&self) -> Result<()> {
        let mut timer = interval(Duration::from_secs(self.config.probe.interval_secs.max(1)));
        info!(
            "Publishing disk usage of {:?} every {}s on {}",
            self.config.probe.mounts, self.config.probe.interval_secs, self.config.mqtt.topic
        );

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Failed to publish disk usage: {:#}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down probe");
                    return Ok(());
                }
            }
        }
    }
}

fn connect(config: &ProbeConfig) -> AsyncClient {
    let mut mqtt_options = MqttOptions::new(
        config.client_id(),
        &config.mqtt.broker_host,
        config.mqtt.broker_port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs.into()));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

    // Start MQTT event loop in background
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("Connected to MQTT broker"),
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    });
    client
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ProbeConfig::load_or_init()
        .await
        .context("Failed to load probe configuration")?;
    info!(
        "diskwatch probe starting - node {} on {}",
        config.probe.node_id,
        gethostname::gethostname().to_string_lossy()
    );

    let client = connect(&config);
    Probe::new(config, client)
        .run()
        .await
        .context("Probe execution failed")
}
