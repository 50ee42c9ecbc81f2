/*!
Fixtures partagées: topologie du brûleur et historique d'exemple.
*/

use telemon_core::{
    BrokerSettings, CategoryFilter, HistoricalDataset, HistoricalRecord, TelemetryConfig, TopicLayout,
};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

/// First record of `sample_history()`.
pub const HISTORY_START: OffsetDateTime = datetime!(2020-10-01 00:00 +8);

/// LED1/LED2/ANA watched, LED3 switchable, RND tracked.
pub fn burner_layout() -> TopicLayout {
    TopicLayout::builder("gogclpba", "T_SKF", "C003", "NPB19F")
        .watch("LED1", "Status")
        .watch("LED2", "Status")
        .watch("ANA", "Level-Burner")
        .switch("LED3", "Status", "Switch")
        .track("RND", "Level-Burner")
        .build()
        .expect("fixture layout is valid")
}

pub fn record(hours: i64, category: u32, duration_hr: f64, consumption_mj: f64) -> HistoricalRecord {
    HistoricalRecord {
        time: HISTORY_START + Duration::hours(hours),
        category,
        duration_hr,
        consumption_mj,
    }
}

/// Ten days of burner history, including idle rows.
pub fn sample_history() -> HistoricalDataset {
    HistoricalDataset::new(vec![
        record(0, 0, 2.0, 0.0),
        record(6, 1, 1.0, 10.0),
        record(12, 2, 0.5, 6.0),
        record(30, 1, 2.0, 20.0),
        record(50, 3, 1.0, 15.0),
        record(96, 0, 8.0, 0.0),
        record(120, 2, 1.5, 18.0),
        record(180, 4, 0.5, 10.0),
        record(240, 1, 1.0, 10.0),
    ])
}

pub fn telemetry_config(history: HistoricalDataset) -> TelemetryConfig {
    TelemetryConfig {
        layout: burner_layout(),
        history,
        horizon: Duration::hours(1),
        filter: CategoryFilter::default(),
        seed_window: false,
    }
}

pub fn offline_settings() -> BrokerSettings {
    BrokerSettings {
        client_id: "telemon-test".into(),
        ..Default::default()
    }
}
