/*!
# Telemon DevKit - Stubs et fixtures pour les tests

Permet de tester le pont télémétrie sans broker MQTT:
- `MockBroker`: puits de commandes qui enregistre publications et abonnements
- `TestHarness`: façade hors-ligne pilotée à la main (CONNACK, messages, coupures)
- `fixtures`: topologie du brûleur et historique d'exemple
*/

pub mod fixtures;
pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{MockBroker, PublishedCommand};
pub use test_utils::TestHarness;
