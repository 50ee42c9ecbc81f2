//! Query/Command Facade: the only way collaborators reach the store, the
//! window, the history and the broker link.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::broker::{BrokerLink, BrokerSettings, CommandSink, ConnectionState, LinkEvents, PumpReport};
use crate::error::{FacadeError, UsageError};
use crate::store::{TopicStore, DEFAULT_VALUE};
use crate::topics::TopicLayout;
use crate::usage::{self, CategoryFilter, DayMark, HistoricalDataset, UsageRange, UsageSummary};
use crate::window::{Reading, RollingWindow};

/// Everything the facade needs besides the broker connection.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub layout: TopicLayout,
    pub history: HistoricalDataset,
    pub horizon: Duration,
    pub filter: CategoryFilter,
    /// Pre-fill the window with the last `horizon` of history.
    pub seed_window: bool,
}

/// Diagnostic view of the broker link for status display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkDiagnostics {
    pub state: ConnectionState,
    pub endpoint: String,
    pub subscribe_filter: String,
    pub return_code: Option<u8>,
    pub reconnects: u32,
    pub last_error: Option<String>,
}

/// Outcome of one periodic tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub pumped: PumpReport,
    /// Value appended to the window, `None` if the tracked topic held no number.
    pub sample: Option<f64>,
    pub window_len: usize,
}

pub struct Telemetry {
    layout: TopicLayout,
    store: TopicStore,
    link: BrokerLink,
    window: Mutex<RollingWindow>,
    history: HistoricalDataset,
    filter: CategoryFilter,
}

impl Telemetry {
    /// Connects to the broker on the current tokio runtime.
    pub fn connect(settings: &BrokerSettings, config: TelemetryConfig) -> Arc<Self> {
        let store = store_for(&config.layout);
        let link = BrokerLink::connect(settings, config.layout.subscribe_filter(), store.clone());
        Arc::new(Self::assemble(config, store, link))
    }

    /// Builds a facade over an arbitrary sink with no connection task; the
    /// returned `LinkEvents` plays the broker's part.
    pub fn offline(
        sink: Arc<dyn CommandSink>,
        settings: &BrokerSettings,
        config: TelemetryConfig,
    ) -> (Arc<Self>, LinkEvents) {
        let store = store_for(&config.layout);
        let (link, events) = BrokerLink::with_sink(sink, settings, config.layout.subscribe_filter(), store.clone());
        (Arc::new(Self::assemble(config, store, link)), events)
    }

    fn assemble(config: TelemetryConfig, store: TopicStore, link: BrokerLink) -> Self {
        let mut window = RollingWindow::new(config.horizon);
        if config.seed_window {
            let seed = config.history.tail_readings(config.horizon);
            info!("[telemetry] seeding window with {} historical readings", seed.len());
            window.seed(seed);
        }
        Self {
            layout: config.layout,
            store,
            link,
            window: Mutex::new(window),
            history: config.history,
            filter: config.filter,
        }
    }

    pub fn layout(&self) -> &TopicLayout {
        &self.layout
    }

    pub fn current_value(&self, topic: &str) -> String {
        self.store.get(topic)
    }

    pub fn state_snapshot(&self) -> Vec<(String, String)> {
        self.store.snapshot()
    }

    /// Window contents after evicting against the wall clock.
    pub fn window_snapshot(&self) -> Vec<Reading> {
        self.window_snapshot_at(OffsetDateTime::now_utc())
    }

    pub fn window_snapshot_at(&self, now: OffsetDateTime) -> Vec<Reading> {
        let mut window = self.window.lock();
        let horizon = window.horizon();
        window.evict_older_than(horizon, now);
        window.snapshot()
    }

    pub fn aggregate(&self, range: UsageRange) -> UsageSummary {
        usage::aggregate(self.history.records(), range, &self.filter)
    }

    pub fn aggregate_between(&self, start: OffsetDateTime, end: OffsetDateTime) -> Result<UsageSummary, UsageError> {
        usage::aggregate_between(self.history.records(), start, end, &self.filter)
    }

    /// Aggregate over whole days counted from the first historical record.
    pub fn aggregate_days(&self, from_day: i64, to_day: i64) -> Result<UsageSummary, UsageError> {
        Ok(self.aggregate(self.history.range_for_days(from_day, to_day)?))
    }

    pub fn history_span(&self) -> Option<UsageRange> {
        self.history.span()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_marks(&self, parts: u32) -> Vec<DayMark> {
        self.history.day_marks(parts)
    }

    /// Publishes the complement of the current boolean-like value of
    /// `topic` on its command topic and returns the payload sent. The read
    /// and the publish happen under the store guard; the store itself only
    /// changes when the device echoes its new status.
    pub fn toggle(&self, topic: &str) -> Result<String, FacadeError> {
        let command = self
            .layout
            .command_for(topic)
            .ok_or_else(|| FacadeError::NotSwitchable(topic.to_string()))?;
        self.store.with_value(topic, |current| -> Result<String, FacadeError> {
            let next = complement(current);
            self.link.publish(command, next)?;
            info!("[telemetry] toggle {topic}: {current} -> {next} via {command}");
            Ok(next.to_string())
        })
    }

    /// One periodic step: apply queued messages, then sample the tracked
    /// topic into the window.
    pub fn tick(&self, now: OffsetDateTime) -> TickReport {
        let pumped = self.link.pump();
        let raw = self.store.get(self.layout.tracked());
        let sample = match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                warn!("[telemetry] {} holds non-numeric {raw:?}, no sample", self.layout.tracked());
                None
            }
        };

        let mut window = self.window.lock();
        match sample {
            Some(value) => window.record(value, now),
            None => {
                let horizon = window.horizon();
                window.evict_older_than(horizon, now);
            }
        }
        let report = TickReport {
            pumped,
            sample,
            window_len: window.len(),
        };
        debug!("[telemetry] tick: {report:?}");
        report
    }

    pub fn status(&self) -> LinkDiagnostics {
        let status = self.link.status();
        LinkDiagnostics {
            state: status.state,
            endpoint: self.link.endpoint().to_string(),
            subscribe_filter: self.link.subscribe_filter().to_string(),
            return_code: status.return_code,
            reconnects: status.reconnects,
            last_error: status.last_error,
        }
    }

    pub async fn shutdown(&self) {
        self.link.shutdown().await;
    }
}

fn store_for(layout: &TopicLayout) -> TopicStore {
    TopicStore::with_defaults(layout.default_topics(), DEFAULT_VALUE)
}

fn complement(current: &str) -> &'static str {
    if current.trim() == "1" {
        "0"
    } else {
        "1"
    }
}
