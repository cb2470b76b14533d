/*!
# diskwatch DevKit - Stubs et utilitaires pour le développement

Bibliothèque facilitant le test du kernel et des sondes sans broker :
- Client MQTT mock (publications enregistrées, réception simulée)
- Builders d'événements d'usage disque conformes à disk-usage@v1
- Harness de tests avec expectations par topic
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{MockMessage, MockMqttClient, UsageEventBuilder, USAGE_TOPIC};
pub use test_utils::TestHarness;
