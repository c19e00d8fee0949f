use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::SideEffectSink;
use crate::alert::Effect;
use crate::event_log::EventLog;
use crate::history::{SampleRecord, SampleStore};
use crate::telemetry::Sample;
use crate::tracing::prelude::*;

/// Writes queued per log or store before new ones are dropped.
const WRITE_QUEUE: usize = 1024;

type EventJob = (String, Map<String, Value>);

/// Runs side effects and sample saves in the background.
///
/// `dispatch` and `save_sample` return immediately, so a slow notification
/// or disk never holds up the next sample. Each log and each sample store
/// has a single writer that applies records in dispatch order.
/// Notifications and commands run concurrently, one task each. Outcomes
/// are logged; failures are not retried and never reach the evaluator.
#[derive(Clone)]
pub struct EffectDispatcher {
    sink: Arc<dyn SideEffectSink>,
    events: Arc<[mpsc::Sender<EventJob>]>,
    samples: Arc<[mpsc::Sender<SampleRecord>]>,
    effects: TaskTracker,
    writers: TaskTracker,
    closing: CancellationToken,
}

impl EffectDispatcher {
    /// Start one writer per log and per store. Must be called from within
    /// a Tokio runtime.
    pub fn new(
        sink: Arc<dyn SideEffectSink>,
        logs: Vec<Arc<dyn EventLog>>,
        stores: Vec<Arc<dyn SampleStore>>,
    ) -> Self {
        let writers = TaskTracker::new();
        let closing = CancellationToken::new();

        let events: Arc<[_]> = logs
            .into_iter()
            .map(|log| {
                let (tx, rx) = mpsc::channel::<EventJob>(WRITE_QUEUE);
                writers.spawn(write_in_order(rx, closing.clone(), move |job| {
                    let log = log.clone();
                    async move { append_event(log.as_ref(), &job.0, &job.1).await }
                }));
                tx
            })
            .collect();

        let samples: Arc<[_]> = stores
            .into_iter()
            .map(|store| {
                let (tx, rx) = mpsc::channel::<SampleRecord>(WRITE_QUEUE);
                writers.spawn(write_in_order(rx, closing.clone(), move |record| {
                    let store = store.clone();
                    async move { save_record(store.as_ref(), &record).await }
                }));
                tx
            })
            .collect();

        Self {
            sink,
            events,
            samples,
            effects: TaskTracker::new(),
            writers,
            closing,
        }
    }

    /// Start `effect` without waiting for it.
    pub fn dispatch(&self, effect: Effect) {
        trace!(effect = effect.kind(), "Dispatching");
        match effect {
            Effect::Append {
                event_type,
                details,
            } => {
                for tx in self.events.iter() {
                    enqueue(tx, (event_type.clone(), details.clone()), "event");
                }
            }
            effect => {
                let sink = self.sink.clone();
                self.effects.spawn(async move {
                    execute(sink.as_ref(), effect).await;
                });
            }
        }
    }

    /// Queue `sample` for every sample store, stamped with the current time.
    pub fn save_sample(&self, sample: &Sample) {
        if self.samples.is_empty() {
            return;
        }
        let record = SampleRecord::new(OffsetDateTime::now_utc(), sample.values().clone());
        for tx in self.samples.iter() {
            enqueue(tx, record.clone(), "sample");
        }
    }

    /// Number of notifications and commands still running.
    pub fn in_flight(&self) -> usize {
        self.effects.len()
    }

    /// Wait for running effects, then flush every queued write.
    pub async fn shutdown(&self) {
        self.effects.close();
        self.effects.wait().await;
        self.closing.cancel();
        self.writers.close();
        self.writers.wait().await;
    }
}

fn enqueue<T>(tx: &mpsc::Sender<T>, job: T, what: &str) {
    match tx.try_send(job) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => warn!(kind = what, "Write queue full, dropping"),
        Err(TrySendError::Closed(_)) => debug!(kind = what, "Writer stopped, dropping"),
    }
}

/// Apply queued jobs one at a time. Once `closing` fires, whatever is
/// already queued is still written before returning.
async fn write_in_order<T, F, Fut>(
    mut rx: mpsc::Receiver<T>,
    closing: CancellationToken,
    mut write: F,
) where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        tokio::select! {
            biased;

            job = rx.recv() => match job {
                Some(job) => write(job).await,
                None => break,
            },

            _ = closing.cancelled() => {
                rx.close();
                while let Some(job) = rx.recv().await {
                    write(job).await;
                }
                break;
            }
        }
    }
}

async fn append_event(log: &dyn EventLog, event_type: &str, details: &Map<String, Value>) {
    match log.append(event_type, details).await {
        Ok(()) => debug!(log = log.name(), event_type, "Event saved"),
        Err(e) => warn!(
            log = log.name(),
            event_type,
            error = %e,
            "Failed to save event"
        ),
    }
}

async fn save_record(store: &dyn SampleStore, record: &SampleRecord) {
    if let Err(e) = store.save(record).await {
        warn!(store = store.name(), error = %e, "Failed to save sample");
    }
}

async fn execute(sink: &dyn SideEffectSink, effect: Effect) {
    match effect {
        Effect::Append { .. } => {}

        Effect::Notify { title, body } => match sink.notify(&title, &body).await {
            Ok(()) => info!(title = %title, "Notification sent"),
            Err(e) => warn!(title = %title, error = %e, "Notification failed"),
        },

        Effect::PublishCommand(command) => match sink.publish_command(&command).await {
            Ok(()) => info!(command = ?command, "Command published"),
            Err(e) => warn!(command = ?command, error = %e, "Command publish failed"),
        },
    }
}
