/**
 * TICK LOOP - Pilote périodique du pont
 *
 * RÔLE : Toutes les `tick_interval`, applique les messages reçus au store et
 * échantillonne le canal suivi dans la fenêtre glissante.
 * S'arrête dès que le signal de shutdown passe à true.
 */

use std::sync::Arc;
use std::time::Duration;
use telemon_core::Telemetry;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const FALLBACK_PERIOD: Duration = Duration::from_secs(5);

pub fn spawn_tick_loop(
    telemetry: Arc<Telemetry>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = if period.is_zero() {
        warn!("[tick] tick_interval is zero, using {FALLBACK_PERIOD:?}");
        FALLBACK_PERIOD
    } else {
        period
    };

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("[tick] every {period:?}");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = telemetry.tick(OffsetDateTime::now_utc());
                    if report.pumped.handled() > 0 {
                        debug!(
                            "[tick] applied {} messages ({} malformed), window {}",
                            report.pumped.applied,
                            report.pumped.malformed.len(),
                            report.window_len
                        );
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!("[tick] stopped");
    })
}
