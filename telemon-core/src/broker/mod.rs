//! Broker Client Adapter.
//!
//! `BrokerLink` owns one MQTT connection. The rumqttc event loop runs on its
//! own task (see `driver`) and only ever pushes inbound messages onto a queue;
//! the store is mutated when the host calls `pump()`, so "when does state
//! change" is decided by the tick, not by the network.

mod driver;
mod status;

pub use status::{ConnectionState, LinkStatus};

use parking_lot::Mutex;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, MalformedPayload, PublishError};
use crate::store::{new_state, Shared, TopicStore};

const SUBSCRIBE_QOS: QoS = QoS::AtLeastOnce;
const COMMAND_QOS: QoS = QoS::AtMostOnce;

/// Connection parameters, handed over already parsed by the host.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Upper bound for one connection attempt (TCP + CONNACK).
    pub connect_timeout: Duration,
    pub retry_initial: Duration,
    pub retry_max: Duration,
    /// Max inbound messages applied by a single `pump()`.
    pub pump_budget: usize,
    /// Capacity of the rumqttc request channel.
    pub request_capacity: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            username: None,
            password: None,
            client_id: "telemon".into(),
            keep_alive: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            retry_initial: Duration::from_secs(1),
            retry_max: Duration::from_secs(30),
            pump_budget: 256,
            request_capacity: 10,
        }
    }
}

impl BrokerSettings {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Outbound half of a broker client. Implemented by `rumqttc::AsyncClient`
/// and by test doubles; every call must return without waiting on the network.
pub trait CommandSink: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;
    fn subscribe(&self, filter: &str) -> Result<(), String>;
    fn disconnect(&self) -> Result<(), String>;
}

impl CommandSink for AsyncClient {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.try_publish(topic, COMMAND_QOS, false, payload.as_bytes().to_vec())
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }

    fn subscribe(&self, filter: &str) -> Result<(), String> {
        self.try_subscribe(filter, SUBSCRIBE_QOS).map_err(|e| e.to_string())
    }

    fn disconnect(&self) -> Result<(), String> {
        self.try_disconnect().map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Result of one `pump()` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PumpReport {
    pub applied: usize,
    #[serde(skip)]
    pub malformed: Vec<MalformedPayload>,
}

impl PumpReport {
    pub fn handled(&self) -> usize {
        self.applied + self.malformed.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Lifecycle {
    Running,
    Stopping { flush: bool },
}

/// Translates broker protocol events into state transitions and queued
/// messages. The connection task owns one; tests drive one by hand.
#[derive(Clone)]
pub struct LinkEvents {
    status: Shared<LinkStatus>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    sink: Arc<dyn CommandSink>,
    filter: String,
}

impl LinkEvents {
    pub fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    pub fn connecting(&self) -> bool {
        self.status.lock().begin_connect()
    }

    /// CONNACK received. On success the wildcard subscription is issued right away.
    pub fn connack(&self, code: u8) -> Result<(), ConnectionError> {
        let accepted = {
            let mut status = self.status.lock();
            status.connack(code) && status.state == ConnectionState::Connected
        };
        if code != 0 {
            return Err(ConnectionError::Refused(code));
        }
        if !accepted {
            return Ok(());
        }
        info!("[link] connected (code {code}), subscribing to {}", self.filter);
        if let Err(e) = self.sink.subscribe(&self.filter) {
            warn!("[link] subscribe to {} failed: {e}", self.filter);
        }
        Ok(())
    }

    pub fn suback(&self, granted: bool) {
        if granted {
            self.status.lock().subscribed();
        } else {
            warn!("[link] broker refused subscription to {}", self.filter);
        }
    }

    pub fn message(&self, topic: String, payload: Vec<u8>) {
        debug!("[link] queued message on {topic} ({} bytes)", payload.len());
        // A closed queue means the link is shutting down.
        let _ = self.inbound.send(InboundMessage { topic, payload });
    }

    pub fn connection_lost(&self, err: &ConnectionError) {
        self.status.lock().connection_lost(err);
    }
}

pub struct BrokerLink {
    endpoint: String,
    filter: String,
    status: Shared<LinkStatus>,
    store: TopicStore,
    sink: Arc<dyn CommandSink>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
    pump_budget: usize,
    lifecycle: watch::Sender<Lifecycle>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BrokerLink {
    /// Builds a link around any sink without starting a connection task.
    /// Protocol events are fed through the returned `LinkEvents`.
    pub fn with_sink(
        sink: Arc<dyn CommandSink>,
        settings: &BrokerSettings,
        filter: String,
        store: TopicStore,
    ) -> (Self, LinkEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (lifecycle, _) = watch::channel(Lifecycle::Running);
        let status = new_state(LinkStatus::default());
        let events = LinkEvents {
            status: status.clone(),
            inbound: tx,
            sink: sink.clone(),
            filter: filter.clone(),
        };
        let link = Self {
            endpoint: settings.endpoint(),
            filter,
            status,
            store,
            sink,
            inbound: Mutex::new(Some(rx)),
            pump_budget: settings.pump_budget.max(1),
            lifecycle,
            task: Mutex::new(None),
        };
        (link, events)
    }

    /// Starts the MQTT connection on the current tokio runtime. Returns
    /// immediately; connection, subscription and retries happen on a
    /// background task.
    pub fn connect(settings: &BrokerSettings, filter: String, store: TopicStore) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);
        if let Some(username) = &settings.username {
            options.set_credentials(username, settings.password.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, settings.request_capacity);
        let (link, events) = Self::with_sink(Arc::new(client), settings, filter, store);

        info!("[link] connecting to {} as {}", link.endpoint, settings.client_id);
        let retry = driver::RetryPolicy {
            connect_timeout: settings.connect_timeout,
            initial: settings.retry_initial,
            max: settings.retry_max,
        };
        let task = tokio::spawn(driver::run(eventloop, events, link.lifecycle.subscribe(), retry));
        *link.task.lock() = Some(task);
        link
    }

    /// Applies the messages queued so far (at most `pump_budget`) to the
    /// store and returns. Never waits for new messages.
    pub fn pump(&self) -> PumpReport {
        let mut report = PumpReport::default();
        let mut inbound = self.inbound.lock();
        let Some(queue) = inbound.as_mut() else {
            return report;
        };
        while report.handled() < self.pump_budget {
            let Ok(message) = queue.try_recv() else { break };
            match String::from_utf8(message.payload) {
                Ok(text) => {
                    debug!("[link] {} = {}", message.topic, text);
                    self.store.set(&message.topic, text);
                    report.applied += 1;
                }
                Err(e) => {
                    let malformed = MalformedPayload {
                        topic: message.topic,
                        len: e.as_bytes().len(),
                    };
                    warn!("[link] {malformed}, value left unchanged");
                    report.malformed.push(malformed);
                }
            }
        }
        report
    }

    /// Fire-and-forget publish. Fails fast when the link is not connected;
    /// retrying is the caller's call.
    pub fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        let state = self.status.lock().state;
        if !state.can_publish() {
            return Err(PublishError::NotConnected(state));
        }
        self.sink.publish(topic, payload)?;
        info!("[link] published {payload:?} on {topic}");
        Ok(())
    }

    pub fn status(&self) -> LinkStatus {
        self.status.lock().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn subscribe_filter(&self) -> &str {
        &self.filter
    }

    /// Tears the connection down. An in-flight `pump()` finishes first
    /// (it holds the inbound queue); later pumps are no-ops.
    pub async fn shutdown(&self) {
        if let Some(mut queue) = self.inbound.lock().take() {
            queue.close();
        }
        let was_online = {
            let mut status = self.status.lock();
            let online = status.state.can_publish();
            status.shut_down();
            online
        };
        if was_online {
            if let Err(e) = self.sink.disconnect() {
                warn!("[link] disconnect request failed: {e}");
            }
        }
        let _ = self.lifecycle.send(Lifecycle::Stopping { flush: was_online });

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("[link] connection task ended abnormally: {e}");
            }
        }
        info!("[link] shut down ({})", self.endpoint);
    }
}
