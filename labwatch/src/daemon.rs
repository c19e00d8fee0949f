//! Service lifecycle: wires the telemetry source, the evaluator, the
//! side-effect sinks and the API together and tears them down in order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::alert::AlertEvaluator;
use crate::api::{self, SharedState};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::event_log::{EventLog, JsonLinesLog, RecentEvents};
use crate::history::{JsonLinesSampleLog, SampleHistory, SampleStore};
use crate::sink::{EffectDispatcher, MqttCommandPublisher, ServiceSink, TelegramNotifier};
use crate::telemetry::{Topics, mqtt};
use crate::tracing::prelude::*;

/// Messages buffered between the MQTT source and the evaluator.
const INBOUND_CAPACITY: usize = 256;

/// How long pending notifications may take once shutdown starts.
const EFFECT_GRACE: Duration = Duration::from_secs(10);

pub struct Daemon {
    config: ServiceConfig,
    shutdown: CancellationToken,
}

impl Daemon {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the daemon when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until a shutdown signal arrives or a component fails.
    pub async fn run(self) -> Result<()> {
        let Self { config, shutdown } = self;
        let topics = Topics::new(&config.topic_namespace);
        info!(
            broker = %format_args!("{}:{}", config.mqtt.host, config.mqtt.port),
            tls = config.mqtt.tls,
            namespace = %config.topic_namespace,
            "Starting labwatch"
        );

        let (source, client) = mqtt::connect(&config.mqtt, topics.clone());

        let notifier = TelegramNotifier::new(config.telegram.clone())?;
        if notifier.is_none() {
            warn!("Telegram credentials missing, notifications will only be logged");
        }
        let publisher =
            MqttCommandPublisher::new(client, topics.command.clone(), config.command_timeout);
        let sink = Arc::new(ServiceSink::new(notifier, publisher));

        let recent = Arc::new(RecentEvents::new(config.recent_events));
        let mut logs: Vec<Arc<dyn EventLog>> = vec![recent.clone()];
        if let Some(path) = &config.event_log_path {
            let log = JsonLinesLog::open(path).await?;
            info!(path = %path.display(), "Writing events to file");
            logs.push(Arc::new(log));
        }

        let history = Arc::new(SampleHistory::new(config.history_capacity));
        let mut stores: Vec<Arc<dyn SampleStore>> = vec![history.clone()];
        if let Some(path) = &config.sample_log_path {
            let log = JsonLinesSampleLog::open(path).await?;
            info!(path = %path.display(), "Writing samples to file");
            stores.push(Arc::new(log));
        }
        let dispatcher = EffectDispatcher::new(sink, logs, stores);

        let evaluator = AlertEvaluator::new(config.signals, config.tracked_actuators);
        let state = SharedState {
            events: recent,
            history,
            devices: evaluator.subscribe_devices(),
        };

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let tasks = TaskTracker::new();
        tasks.spawn(source.run(tx, shutdown.clone()));
        tasks.spawn(evaluator.run(rx, dispatcher.clone(), shutdown.clone()));

        let api_addr = config.api_addr;
        let api_shutdown = shutdown.clone();
        let api_task = tokio::spawn(async move {
            let result = api::serve(api_addr, state, api_shutdown.clone()).await;
            if let Err(e) = &result {
                error!(addr = %api_addr, error = %e, "API server failed");
                api_shutdown.cancel();
            }
            result
        });
        tasks.close();

        tokio::select! {
            _ = wait_for_signal() => info!("Shutdown requested"),
            _ = shutdown.cancelled() => {}
        }
        shutdown.cancel();
        tasks.wait().await;

        if tokio::time::timeout(EFFECT_GRACE, dispatcher.shutdown())
            .await
            .is_err()
        {
            warn!(
                pending = dispatcher.in_flight(),
                "Gave up waiting for pending side effects"
            );
        }

        let api_result = api_task
            .await
            .map_err(|e| crate::error::Error::Other(format!("API task panicked: {e}")))?;
        api_result?;

        info!("labwatch stopped");
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
