/**
 * HEALTH KERNEL - Vue synthétique de l'état du pont
 *
 * RÔLE : Agrège uptime, mémoire et état du lien broker pour GET /system/health.
 */

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use telemon_core::{ConnectionState, Telemetry};

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub memory_usage_mb: f32,
    pub link_state: ConnectionState,
    pub link_reconnects: u32,
    pub topics_tracked: usize,
    pub window_len: usize,
    pub history_records: usize,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn get_health(&self, telemetry: &Arc<Telemetry>) -> KernelHealth {
        let status = telemetry.status();
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            memory_usage_mb: get_memory_usage_mb(),
            link_state: status.state,
            link_reconnects: status.reconnects,
            topics_tracked: telemetry.state_snapshot().len(),
            window_len: telemetry.window_snapshot().len(),
            history_records: telemetry.history_len(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemon_devkit::TestHarness;

    #[test]
    fn reports_link_and_data_sizes() {
        let harness = TestHarness::connected();
        let health = HealthTracker::new().get_health(&harness.telemetry);
        assert_eq!(health.link_state, ConnectionState::Subscribed);
        assert_eq!(health.link_reconnects, 0);
        assert_eq!(health.topics_tracked, 6);
        assert_eq!(health.window_len, 0);
        assert_eq!(health.history_records, 9);
    }
}
