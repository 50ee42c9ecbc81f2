//! Telemetry core: topic state, broker link, rolling window and usage
//! aggregation behind a single facade.

pub mod broker;
pub mod error;
pub mod facade;
pub mod store;
pub mod topics;
pub mod usage;
pub mod window;

pub use broker::{BrokerLink, BrokerSettings, CommandSink, ConnectionState, LinkEvents, LinkStatus, PumpReport};
pub use error::{ConnectionError, FacadeError, MalformedPayload, PublishError, TopicError, UsageError};
pub use facade::{LinkDiagnostics, Telemetry, TelemetryConfig, TickReport};
pub use store::{TopicStore, DEFAULT_VALUE};
pub use topics::TopicLayout;
pub use usage::{
    aggregate, aggregate_between, Category, CategoryFilter, DayMark, HistoricalDataset, HistoricalRecord,
    UsageRange, UsageSummary, UsageTotals,
};
pub use window::{Reading, RollingWindow};
