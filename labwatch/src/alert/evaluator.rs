//! Alert evaluator.
//!
//! Owns one [`Debouncer`] per configured signal and the control-channel
//! trackers. Decisions are made synchronously and in arrival order; the
//! resulting side effects are handed to the dispatcher and never awaited.

use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::debouncer::{Debouncer, Decision, SuppressReason};
use super::device::{ActuatorTracker, DeviceSnapshot, OnlineTracker};
use super::effect::Effect;
use super::signal::SignalSpec;
use crate::sink::EffectDispatcher;
use crate::telemetry::{ControlMessage, Inbound, Reading, Sample};
use crate::tracing::prelude::*;

const ONLINE_TITLE: &str = "✅ DEVICE ONLINE";
const ONLINE_BODY: &str = "The IoT device is back online!";
const OFFLINE_TITLE: &str = "🛑 DEVICE OFFLINE";
const OFFLINE_BODY: &str = "The IoT device went offline!\nLast Will and Testament triggered.";

/// Decision taken for one signal of a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDecision {
    pub signal: String,
    pub value: f64,
    pub decision: Decision,
}

/// Everything a single sample produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub decisions: Vec<SignalDecision>,
    pub effects: Vec<Effect>,
}

pub struct AlertEvaluator {
    debouncers: Vec<Debouncer>,
    online: OnlineTracker,
    actuators: ActuatorTracker,
    devices_tx: watch::Sender<DeviceSnapshot>,
}

impl AlertEvaluator {
    /// `specs` must already be validated.
    pub fn new<I, S>(specs: Vec<SignalSpec>, tracked_actuators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (devices_tx, _) = watch::channel(DeviceSnapshot::default());
        Self {
            debouncers: specs.into_iter().map(Debouncer::new).collect(),
            online: OnlineTracker::default(),
            actuators: ActuatorTracker::new(tracked_actuators),
            devices_tx,
        }
    }

    pub fn specs(&self) -> impl Iterator<Item = &SignalSpec> {
        self.debouncers.iter().map(Debouncer::spec)
    }

    /// Follow device presence and actuator states.
    pub fn subscribe_devices(&self) -> watch::Receiver<DeviceSnapshot> {
        self.devices_tx.subscribe()
    }

    /// Run every configured signal against `sample`, observed at `now`.
    ///
    /// Signals missing from the sample are skipped without touching
    /// their state; so are signals whose value is not a number.
    pub fn on_sample(&mut self, sample: &Sample, now: Instant) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for debouncer in &mut self.debouncers {
            let spec = debouncer.spec();
            let value = match sample.reading(&spec.key) {
                Reading::Value(v) => v,
                Reading::Absent => {
                    debug!(signal = %spec.name, key = %spec.key, "Signal absent from sample");
                    continue;
                }
                Reading::NonNumeric => {
                    warn!(
                        signal = %spec.name,
                        key = %spec.key,
                        "Skipping signal with non-numeric value"
                    );
                    continue;
                }
            };

            let previous_streak = debouncer.streak();
            let decision = debouncer.evaluate(value, now);
            let spec = debouncer.spec();

            match decision {
                Decision::NoBreach => {
                    if previous_streak > 0 {
                        info!(signal = %spec.name, value, "Signal back to normal");
                    }
                }
                Decision::BreachBelowStreak { streak, required } => {
                    debug!(
                        signal = %spec.name,
                        value,
                        threshold = spec.threshold,
                        comparator = %spec.comparator,
                        streak,
                        required,
                        "Threshold breached"
                    );
                }
                Decision::Suppressed(SuppressReason::CooldownActive { remaining }) => {
                    debug!(
                        signal = %spec.name,
                        value,
                        remaining_ms = remaining.as_millis() as u64,
                        "Alert suppressed (cooldown)"
                    );
                }
                Decision::Fire { streak } => {
                    warn!(
                        signal = %spec.name,
                        value,
                        threshold = spec.threshold,
                        streak,
                        event_type = %spec.event_type,
                        "Alert fired"
                    );
                    evaluation.effects.extend(fire_effects(spec, value));
                }
            }

            evaluation.decisions.push(SignalDecision {
                signal: spec.name.clone(),
                value,
                decision,
            });
        }

        evaluation
    }

    /// React to a control-channel message. Not debounced.
    pub fn on_control(&mut self, message: &ControlMessage) -> Vec<Effect> {
        let mut effects = Vec::new();

        match message {
            ControlMessage::DeviceOnline(online) => {
                if let Some(online) = self.online.observe(*online) {
                    let (event_type, title, body) = if online {
                        ("DEVICE_ONLINE", ONLINE_TITLE, ONLINE_BODY)
                    } else {
                        ("DEVICE_OFFLINE", OFFLINE_TITLE, OFFLINE_BODY)
                    };
                    info!(online, "Device presence changed");

                    let mut details = Map::new();
                    details.insert("online".into(), Value::Bool(online));
                    effects.push(Effect::append(event_type, details));
                    effects.push(Effect::notify(title, body));
                }
            }

            ControlMessage::DeviceState(states) => {
                for (actuator, state) in states {
                    if !self.actuators.observe(actuator, state) {
                        continue;
                    }
                    let suffix = if state == "on" { "ON" } else { "OFF" };
                    let event_type = format!("{}_{suffix}", actuator.to_uppercase());
                    info!(actuator = %actuator, state = %state, "Actuator state changed");

                    let mut details = Map::new();
                    details.insert("state".into(), Value::String(state.clone()));
                    effects.push(Effect::append(event_type, details));
                }
            }
        }

        self.devices_tx.send_replace(DeviceSnapshot {
            online: self.online.current(),
            actuators: self.actuators.snapshot(),
        });

        effects
    }

    /// Consume inbound messages until cancelled or the source goes away.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Inbound>,
        dispatcher: EffectDispatcher,
        cancel: CancellationToken,
    ) {
        info!(signals = self.debouncers.len(), "Alert evaluator started");
        for spec in self.specs() {
            info!(
                signal = %spec.name,
                key = %spec.key,
                rule = %format_args!("{} {}", spec.comparator, spec.threshold),
                streak = spec.streak_required,
                cooldown_ms = spec.cooldown.as_millis() as u64,
                resets_streak = spec.resets_streak_after_fire,
                "Monitoring"
            );
        }

        loop {
            let inbound = tokio::select! {
                _ = cancel.cancelled() => break,
                inbound = rx.recv() => match inbound {
                    Some(inbound) => inbound,
                    None => {
                        debug!("Telemetry channel closed");
                        break;
                    }
                },
            };

            let effects = match inbound {
                Inbound::Sample(sample) => {
                    dispatcher.save_sample(&sample);
                    self.on_sample(&sample, Instant::now()).effects
                }
                Inbound::Control(message) => self.on_control(&message),
            };
            for effect in effects {
                dispatcher.dispatch(effect);
            }
        }

        info!("Alert evaluator stopped");
    }
}

/// Side effects for a fired signal, in the order they are issued.
fn fire_effects(spec: &SignalSpec, value: f64) -> Vec<Effect> {
    let mut details = Map::new();
    details.insert(spec.detail_key.clone(), Value::from(value));

    let mut effects = vec![
        Effect::append(spec.event_type.clone(), details),
        Effect::notify(spec.title.clone(), spec.render_body(value)),
    ];
    if let Some(command) = &spec.command {
        effects.push(Effect::PublishCommand(command.clone()));
    }
    effects
}
