//! MQTT telemetry source.
//!
//! Drives the rumqttc event loop, (re)subscribes to the namespace
//! wildcard on every connection, and forwards decoded messages to the
//! evaluator in the order the broker delivered them.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Inbound, Topics};
use crate::config::MqttConfig;
use crate::tracing::prelude::*;

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Capacity of rumqttc's internal request queue.
const REQUEST_CAPACITY: usize = 64;

const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_CAP: Duration = Duration::from_secs(30);

/// Delay before the next poll after a connection error.
///
/// Each consecutive failure doubles the wait, from `base` up to `cap`.
/// The result is scaled by a random factor in [0.5, 1.0) so that several
/// services losing the same broker come back at different moments.
struct Backoff {
    base: Duration,
    cap: Duration,
    failures: u32,
    rng: RandomState,
    draws: u64,
}

impl Backoff {
    fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            failures: 0,
            rng: RandomState::new(),
            draws: 0,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.failures).unwrap_or(u32::MAX);
        let nominal = self.base.saturating_mul(factor).min(self.cap);
        self.failures = self.failures.saturating_add(1);
        nominal.mul_f64(self.jitter())
    }

    /// Uniform in [0.5, 1.0).
    fn jitter(&mut self) -> f64 {
        let mut hasher = self.rng.build_hasher();
        hasher.write_u64(self.draws);
        self.draws = self.draws.wrapping_add(1);
        let unit = (hasher.finish() >> 11) as f64 / (1u64 << 53) as f64;
        0.5 + unit * 0.5
    }

    /// Call once the broker accepts us again.
    fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Unique-enough client id so two instances never kick each other off
/// the broker.
fn client_id() -> String {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(std::process::id() as u64);
    format!("labwatch-{:08x}", hasher.finish() as u32)
}

/// Create the broker connection.
///
/// Returns the source, which owns the event loop, and a client handle
/// that can publish commands on the same connection.
pub fn connect(config: &MqttConfig, topics: Topics) -> (MqttSource, AsyncClient) {
    let mut options = MqttOptions::new(client_id(), config.host.clone(), config.port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);
    if config.tls {
        options.set_transport(Transport::tls_with_default_config());
    }

    let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
    let source = MqttSource {
        client: client.clone(),
        event_loop,
        topics,
        broker: format!("{}:{}", config.host, config.port),
    };
    (source, client)
}

pub struct MqttSource {
    client: AsyncClient,
    event_loop: EventLoop,
    topics: Topics,
    broker: String,
}

impl MqttSource {
    /// Poll the broker until cancelled or the evaluator goes away.
    ///
    /// Connection errors never end the loop; rumqttc reconnects on the
    /// next poll and we wait out a backoff delay in between.
    pub async fn run(mut self, tx: mpsc::Sender<Inbound>, cancel: CancellationToken) {
        info!(broker = %self.broker, topic = %self.topics.all, "Connecting to MQTT broker");
        let mut backoff = Backoff::new(RECONNECT_BASE, RECONNECT_CAP);

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.event_loop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    backoff.reset();
                    info!(broker = %self.broker, "MQTT broker connected");
                    // try_subscribe: the request queue is drained by this
                    // very loop, so awaiting here could deadlock.
                    if let Err(e) = self
                        .client
                        .try_subscribe(self.topics.all.clone(), QoS::AtLeastOnce)
                    {
                        error!(topic = %self.topics.all, error = %e, "MQTT subscribe failed");
                    }
                }

                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    info!(topic = %self.topics.all, "Subscribed");
                }

                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match self.topics.decode(&publish.topic, &publish.payload) {
                        Ok(Some(inbound)) => {
                            if tx.send(inbound).await.is_err() {
                                debug!("Evaluator channel closed, stopping MQTT source");
                                break;
                            }
                        }
                        Ok(None) => {
                            trace!(topic = %publish.topic, "Ignoring message");
                        }
                        Err(e) => {
                            warn!(error = %e, "Dropping undecodable message");
                        }
                    }
                }

                Ok(_) => {}

                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        broker = %self.broker,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "MQTT connection error"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    debug!(broker = %self.broker, "Reconnecting to MQTT broker");
                }
            }
        }

        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "MQTT disconnect request failed");
        }
        info!("MQTT source stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_each_step() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));

        let d1 = backoff.next_delay();
        let d2 = backoff.next_delay();
        let d3 = backoff.next_delay();

        // Nominal 1s, 2s, 4s; jitter keeps each at least half of that.
        assert!(d1 >= Duration::from_millis(500), "d1={d1:?}");
        assert!(d1 <= Duration::from_secs(1), "d1={d1:?}");
        assert!(d2 >= Duration::from_secs(1), "d2={d2:?}");
        assert!(d2 <= Duration::from_secs(2), "d2={d2:?}");
        assert!(d3 >= Duration::from_secs(2), "d3={d3:?}");
        assert!(d3 <= Duration::from_secs(4), "d3={d3:?}");
    }

    #[test]
    fn backoff_caps_at_max() {
        let mut backoff = Backoff::new(Duration::from_secs(16), Duration::from_secs(30));

        let _ = backoff.next_delay();
        for _ in 0..3 {
            let d = backoff.next_delay();
            assert!(d >= Duration::from_secs(15), "d={d:?}");
            assert!(d <= Duration::from_secs(30), "d={d:?}");
        }
    }

    #[test]
    fn backoff_reset_restores_initial() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        for _ in 0..4 {
            let _ = backoff.next_delay();
        }

        backoff.reset();

        let d = backoff.next_delay();
        assert!(d <= Duration::from_secs(1), "d={d:?}");
    }

    #[test]
    fn long_outage_stays_at_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        for _ in 0..100 {
            let d = backoff.next_delay();
            assert!(d < Duration::from_secs(30), "d={d:?}");
        }
        assert!(backoff.next_delay() >= Duration::from_secs(15));
    }

    #[test]
    fn client_ids_carry_prefix() {
        assert!(client_id().starts_with("labwatch-"));
    }
}
