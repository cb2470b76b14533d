use crate::config::MqttConf;
use crate::error::SnapshotError;
use crate::feed::{FeedRegistry, PublishReport};
use crate::health::HealthTracker;
use crate::models::decode_snapshot;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Décode un événement d'usage et le livre au feed.
/// Un payload invalide est compté puis ignoré : rien ne remonte à la source.
pub fn ingest_usage(
    payload: &[u8],
    feed: &FeedRegistry,
    health: &HealthTracker,
) -> Result<PublishReport, SnapshotError> {
    health.record_event();
    match decode_snapshot(payload) {
        Ok(snapshot) => {
            let report = feed.publish(&snapshot);
            debug!(
                node = %snapshot.resource_id,
                delivered = report.delivered,
                failed = report.failed,
                "usage snapshot published"
            );
            Ok(report)
        }
        Err(e) => {
            health.record_dropped();
            warn!("dropping malformed usage event: {e}");
            Err(e)
        }
    }
}

pub fn spawn_mqtt_listener(conf: MqttConf, feed: FeedRegistry, health: HealthTracker) -> JoinHandle<()> {
    task::spawn(async move {
        let mut opts = MqttOptions::new(&conf.client_id, &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        info!(host = %conf.host, port = conf.port, topic = %conf.topic, "listening for disk usage events");

        loop {
            match eventloop.poll().await {
                // session propre : l'abonnement est perdu à chaque reconnexion
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    health.mark_mqtt_connected();
                    if let Err(e) = client.try_subscribe(&conf.topic, QoS::AtLeastOnce) {
                        error!("subscribe MQTT failed: {e:?}");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == conf.topic => {
                    let _ = ingest_usage(&p.payload, &feed, &health);
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT erreur: {e:?}");
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}
