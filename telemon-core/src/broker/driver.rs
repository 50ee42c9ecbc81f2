//! Connection task: drives the rumqttc event loop, bounds each connection
//! attempt, and backs off between retries.

use rumqttc::{Event, EventLoop, Outgoing, Packet, SubscribeReasonCode};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::{ConnectionState, Lifecycle, LinkEvents};
use crate::error::ConnectionError;

const FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub connect_timeout: Duration,
    pub initial: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

pub(crate) async fn run(
    mut eventloop: EventLoop,
    events: LinkEvents,
    mut lifecycle: watch::Receiver<Lifecycle>,
    retry: RetryPolicy,
) {
    let mut backoff = retry.initial;
    events.connecting();

    loop {
        let deadline = (events.state() == ConnectionState::Connecting).then_some(retry.connect_timeout);
        let polled = tokio::select! {
            _ = lifecycle.changed() => break,
            polled = poll_once(&mut eventloop, deadline) => polled,
        };

        let outcome = match polled {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                let connected = events.connack(ack.code as u8);
                if connected.is_ok() {
                    backoff = retry.initial;
                }
                connected
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let granted = ack
                    .return_codes
                    .iter()
                    .all(|code| !matches!(code, SubscribeReasonCode::Failure));
                events.suback(granted);
                Ok(())
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                events.message(publish.topic, publish.payload.to_vec());
                Ok(())
            }
            Ok(other) => {
                debug!("[link] event {other:?}");
                Ok(())
            }
            Err(err) => {
                events.connection_lost(&err);
                Err(err)
            }
        };

        if let Err(err) = outcome {
            warn!("[link] {err}; retrying in {backoff:?}");
            tokio::select! {
                _ = lifecycle.changed() => break,
                _ = sleep(backoff) => {}
            }
            backoff = retry.next(backoff);
            events.connecting();
        }
    }

    let stopping = *lifecycle.borrow();
    if let Lifecycle::Stopping { flush: true } = stopping {
        flush_disconnect(&mut eventloop).await;
    }
    debug!("[link] connection task stopped");
}

async fn poll_once(eventloop: &mut EventLoop, deadline: Option<Duration>) -> Result<Event, ConnectionError> {
    match deadline {
        Some(limit) => match timeout(limit, eventloop.poll()).await {
            Ok(polled) => polled.map_err(ConnectionError::from),
            Err(_) => Err(ConnectionError::Timeout(limit)),
        },
        None => eventloop.poll().await.map_err(ConnectionError::from),
    }
}

/// Lets the event loop write the queued DISCONNECT before the task exits.
async fn flush_disconnect(eventloop: &mut EventLoop) {
    let flushed = timeout(FLUSH_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    if flushed.is_err() {
        debug!("[link] DISCONNECT not flushed within {FLUSH_TIMEOUT:?}");
    }
}
