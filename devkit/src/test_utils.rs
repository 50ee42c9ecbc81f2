/*!
Test harness pour le pont télémétrie

Construit une façade hors-ligne au-dessus d'un `MockBroker` et joue le rôle
du broker: CONNACK, SUBACK, messages des équipements, coupures réseau.
*/

use std::sync::{Arc, Once};
use telemon_core::{ConnectionError, LinkEvents, Telemetry, TelemetryConfig, TopicLayout};
use tracing::info;

use crate::fixtures;
use crate::mqtt_stub::MockBroker;

static LOGGING: Once = Once::new();

/// Installs a test-writer subscriber once per test binary.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct TestHarness {
    pub broker: Arc<MockBroker>,
    pub telemetry: Arc<Telemetry>,
    events: LinkEvents,
}

impl TestHarness {
    /// Burner layout with the sample history, not yet connected.
    pub fn new() -> Self {
        Self::with_config(fixtures::telemetry_config(fixtures::sample_history()))
    }

    pub fn with_config(config: TelemetryConfig) -> Self {
        init_logging();
        let broker = MockBroker::new();
        let (telemetry, events) = Telemetry::offline(broker.clone(), &fixtures::offline_settings(), config);
        Self {
            broker,
            telemetry,
            events,
        }
    }

    /// Harness already through CONNACK and SUBACK.
    pub fn connected() -> Self {
        let harness = Self::new();
        harness.connect_ok();
        harness
    }

    pub fn layout(&self) -> &TopicLayout {
        self.telemetry.layout()
    }

    pub fn topic(&self, channel: &str, metric: &str) -> String {
        self.layout().topic(channel, metric)
    }

    pub fn events(&self) -> &LinkEvents {
        &self.events
    }

    pub fn connect_ok(&self) {
        self.events.connecting();
        let _ = self.events.connack(0);
        self.events.suback(true);
        info!("[harness] link up");
    }

    pub fn refuse(&self, code: u8) -> Result<(), ConnectionError> {
        self.events.connecting();
        self.events.connack(code)
    }

    /// Queues a message as if a device had published it. Nothing reaches
    /// the store before the next tick.
    pub fn device_publishes(&self, topic: &str, payload: &str) {
        self.events.message(topic.to_string(), payload.as_bytes().to_vec());
    }

    pub fn device_publishes_raw(&self, topic: &str, payload: Vec<u8>) {
        self.events.message(topic.to_string(), payload);
    }

    pub fn drop_connection(&self) {
        self.events
            .connection_lost(&ConnectionError::Transport("connection reset by peer".into()));
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
