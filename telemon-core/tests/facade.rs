use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use telemon_core::{ConnectionState, FacadeError, HistoricalDataset, PublishError, UsageError, UsageTotals};
use telemon_devkit::fixtures::{self, HISTORY_START};
use telemon_devkit::TestHarness;
use time::Duration;

const LED3_SWITCH: &str = "gogclpba/T_SKF/C003/NPB19F/LED3/Switch";

#[test]
fn configured_topics_read_default_before_any_message() {
    let harness = TestHarness::new();
    let snapshot = harness.telemetry.state_snapshot();
    assert_eq!(snapshot.len(), 6);
    assert!(snapshot.iter().all(|(_, value)| value == "0"));
    assert_eq!(harness.telemetry.current_value("not/configured"), "0");
}

#[test]
fn messages_apply_only_on_tick() {
    let harness = TestHarness::connected();
    let led1 = harness.topic("LED1", "Status");
    harness.device_publishes(&led1, "1");
    assert_eq!(harness.telemetry.current_value(&led1), "0");

    let report = harness.telemetry.tick(HISTORY_START);
    assert_eq!(report.pumped.applied, 1);
    assert_eq!(harness.telemetry.current_value(&led1), "1");
}

#[test]
fn toggle_publishes_complement_without_touching_store() {
    let harness = TestHarness::connected();
    let led3 = harness.topic("LED3", "Status");

    assert_eq!(harness.telemetry.toggle(&led3).unwrap(), "1");
    assert_eq!(harness.broker.published_on(LED3_SWITCH), vec!["1"]);
    assert_eq!(harness.telemetry.current_value(&led3), "0");

    // Device echoes its new status.
    harness.device_publishes(&led3, "1");
    harness.telemetry.tick(HISTORY_START);
    assert_eq!(harness.telemetry.toggle(&led3).unwrap(), "0");
    assert_eq!(harness.broker.published_on(LED3_SWITCH), vec!["1", "0"]);
}

#[test]
fn toggle_treats_any_other_value_as_off() {
    let harness = TestHarness::connected();
    let led3 = harness.topic("LED3", "Status");
    harness.device_publishes(&led3, "unknown");
    harness.telemetry.tick(HISTORY_START);
    assert_eq!(harness.telemetry.toggle(&led3).unwrap(), "1");
}

#[test]
fn toggle_while_disconnected_fails_without_publishing() {
    let harness = TestHarness::new();
    let led3 = harness.topic("LED3", "Status");
    assert_eq!(
        harness.telemetry.toggle(&led3),
        Err(FacadeError::Publish(PublishError::NotConnected(ConnectionState::Disconnected)))
    );
    assert!(harness.broker.published().is_empty());

    harness.connect_ok();
    harness.drop_connection();
    assert_eq!(
        harness.telemetry.toggle(&led3),
        Err(FacadeError::Publish(PublishError::NotConnected(ConnectionState::Reconnecting)))
    );
}

#[test]
fn toggle_on_plain_status_topic_is_rejected() {
    let harness = TestHarness::connected();
    let led1 = harness.topic("LED1", "Status");
    assert_eq!(harness.telemetry.toggle(&led1), Err(FacadeError::NotSwitchable(led1)));
}

#[test]
fn rejected_publish_surfaces_to_caller() {
    let harness = TestHarness::connected();
    harness.broker.fail_next_publish("request queue full");
    let led3 = harness.topic("LED3", "Status");
    assert_eq!(
        harness.telemetry.toggle(&led3),
        Err(FacadeError::Publish(PublishError::Rejected("request queue full".into())))
    );
    assert!(harness.broker.published().is_empty());
}

#[test]
fn toggle_publishes_exactly_once_under_concurrent_pump() {
    let harness = TestHarness::connected();
    let led3 = harness.topic("LED3", "Status");
    harness.device_publishes(&led3, "1");
    harness.telemetry.tick(HISTORY_START);

    let stop = Arc::new(AtomicBool::new(false));
    let pumper = {
        let telemetry = harness.telemetry.clone();
        let events = harness.events().clone();
        let led3 = led3.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                events.message(led3.clone(), b"1".to_vec());
                telemetry.tick(HISTORY_START);
            }
        })
    };

    let sent = harness.telemetry.toggle(&led3).unwrap();
    stop.store(true, Ordering::Relaxed);
    pumper.join().unwrap();

    assert_eq!(sent, "0");
    assert_eq!(harness.broker.published_on(LED3_SWITCH), vec!["0"]);
}

#[test]
fn tick_samples_tracked_topic_into_window() {
    let harness = TestHarness::connected();
    let rnd = harness.layout().tracked().to_string();

    let values = [(0, "1"), (30, "2"), (61, "3"), (90, "4")];
    for (minute, value) in values {
        harness.device_publishes(&rnd, value);
        let report = harness.telemetry.tick(HISTORY_START + Duration::minutes(minute));
        assert_eq!(report.sample, value.parse().ok());
    }

    let window = harness.telemetry.window_snapshot_at(HISTORY_START + Duration::minutes(90));
    let values: Vec<f64> = window.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![2.0, 3.0, 4.0]);
}

#[test]
fn non_numeric_tracked_value_yields_no_sample() {
    let harness = TestHarness::connected();
    harness.device_publishes(harness.layout().tracked(), "n/a");
    let report = harness.telemetry.tick(HISTORY_START);
    assert_eq!(report.sample, None);
    assert_eq!(report.window_len, 0);
}

#[test]
fn malformed_payload_is_reported_by_tick() {
    let harness = TestHarness::connected();
    let led2 = harness.topic("LED2", "Status");
    harness.device_publishes_raw(&led2, vec![0xc3, 0x28]);
    let report = harness.telemetry.tick(HISTORY_START);
    assert_eq!(report.pumped.applied, 0);
    assert_eq!(report.pumped.malformed.len(), 1);
    assert_eq!(harness.telemetry.current_value(&led2), "0");
}

#[test]
fn window_can_be_seeded_from_history() {
    let mut config = fixtures::telemetry_config(fixtures::sample_history());
    config.seed_window = true;
    let harness = TestHarness::with_config(config);

    let last = HISTORY_START + Duration::hours(240);
    let window = harness.telemetry.window_snapshot_at(last);
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].value, 1.0);
}

#[test]
fn aggregate_first_day_excludes_idle() {
    let harness = TestHarness::new();
    let summary = harness.telemetry.aggregate_days(0, 1).unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.categories[&1], UsageTotals { duration_hr: 1.0, consumption_mj: 10.0 });
    assert_eq!(summary.categories[&2], UsageTotals { duration_hr: 0.5, consumption_mj: 6.0 });
    assert_eq!(summary.total, UsageTotals { duration_hr: 1.5, consumption_mj: 16.0 });
}

#[test]
fn aggregate_whole_history() {
    let harness = TestHarness::new();
    let span = harness.telemetry.history_span().unwrap();
    assert_eq!(span.start, HISTORY_START);
    assert_eq!(span.end, HISTORY_START + Duration::days(10));

    let summary = harness.telemetry.aggregate(span);
    assert_eq!(summary.records, 7);
    assert_eq!(summary.total, UsageTotals { duration_hr: 7.5, consumption_mj: 89.0 });
}

#[test]
fn aggregate_rejects_inverted_range() {
    let harness = TestHarness::new();
    assert!(matches!(
        harness.telemetry.aggregate_days(5, 2),
        Err(UsageError::InvertedRange { .. })
    ));
    assert!(matches!(
        harness.telemetry.aggregate_between(HISTORY_START + Duration::days(1), HISTORY_START),
        Err(UsageError::InvertedRange { .. })
    ));
}

#[test]
fn aggregate_days_without_history() {
    let harness = TestHarness::with_config(fixtures::telemetry_config(HistoricalDataset::default()));
    assert_eq!(harness.telemetry.aggregate_days(0, 1), Err(UsageError::EmptyHistory));
    assert!(harness.telemetry.history_marks(5).is_empty());
}

#[test]
fn status_reports_link_diagnostics() {
    let harness = TestHarness::new();
    assert_eq!(harness.refuse(5), Err(telemon_core::ConnectionError::Refused(5)));

    let status = harness.telemetry.status();
    assert_eq!(status.state, ConnectionState::Reconnecting);
    assert_eq!(status.return_code, Some(5));
    assert_eq!(status.endpoint, "localhost:1883");
    assert_eq!(status.subscribe_filter, "gogclpba/T_SKF/C003/NPB19F/#");
    assert_eq!(status.reconnects, 1);
}

#[tokio::test]
async fn shutdown_disconnects_and_stops_pumping() {
    let harness = TestHarness::connected();
    harness.telemetry.shutdown().await;

    assert_eq!(harness.telemetry.status().state, ConnectionState::Disconnected);
    assert_eq!(harness.broker.disconnects(), 1);

    let led1 = harness.topic("LED1", "Status");
    harness.device_publishes(&led1, "1");
    assert_eq!(harness.telemetry.tick(HISTORY_START).pumped.applied, 0);
    assert!(matches!(harness.telemetry.toggle(&harness.topic("LED3", "Status")), Err(FacadeError::Publish(_))));
}

#[test]
fn snapshots_serialize_for_display() {
    let harness = TestHarness::connected();
    harness.device_publishes(harness.layout().tracked(), "2.5");
    let report = harness.telemetry.tick(HISTORY_START);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["sample"], 2.5);
    assert_eq!(json["pumped"]["applied"], 1);

    let window = serde_json::to_value(harness.telemetry.window_snapshot_at(HISTORY_START)).unwrap();
    assert_eq!(window[0]["timestamp"], "2020-10-01T00:00:00+08:00");

    let status = serde_json::to_value(harness.telemetry.status()).unwrap();
    assert_eq!(status["state"], "subscribed");
}
