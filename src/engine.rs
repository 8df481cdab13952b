use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{Endpoint, MonitorConfig};
use crate::models::{Observation, ProbeOutcome, Transition};
use crate::notify::{ChatId, Notifier};
use crate::persistence::SnapshotFile;
use crate::probe::{probe, ProbeSettings};
use crate::store::SharedStore;

/// Drives probe cycles and owns every write to the health store.
pub struct Monitor {
    config: Arc<MonitorConfig>,
    store: SharedStore,
    snapshots: SnapshotFile,
    notifier: Arc<dyn Notifier>,
    alert_chat: ChatId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub probed: usize,
    pub failed: usize,
    pub transitions: usize,
    pub persisted: bool,
}

struct ProbeResult {
    endpoint: Endpoint,
    outcome: ProbeOutcome,
    checked_at: DateTime<Utc>,
}

impl Monitor {
    pub fn new(
        config: Arc<MonitorConfig>,
        store: SharedStore,
        snapshots: SnapshotFile,
        notifier: Arc<dyn Notifier>,
        alert_chat: ChatId,
    ) -> Self {
        Self { config, store, snapshots, notifier, alert_chat }
    }

    fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            port: self.config.port,
            timeout: self.config.probe_timeout(),
            max_attempts: self.config.max_attempts,
            retry_delay: self.config.retry_delay(),
        }
    }

    /// The pause is counted from the end of each cycle.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(
            endpoints = self.config.endpoints.len(),
            port = self.config.port,
            interval_secs = self.config.check_interval,
            "availability monitor active"
        );

        loop {
            self.run_cycle().await;
            tokio::time::sleep(Duration::from_secs(self.config.check_interval)).await;
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let start_time = Utc::now();
        let results = self.probe_all().await;
        let (report, transitions) = self.apply(results).await;

        for (endpoint, transition) in transitions {
            self.notify(&endpoint, transition).await;
        }

        let duration = Utc::now() - start_time;
        info!(
            probed = report.probed,
            failed = report.failed,
            transitions = report.transitions,
            persisted = report.persisted,
            "cycle completed in {:.2}s",
            duration.num_milliseconds() as f64 / 1000.0
        );
        report
    }

    async fn probe_all(&self) -> Vec<ProbeResult> {
        let settings = self.probe_settings();
        let mut tasks = FuturesUnordered::new();

        for endpoint in &self.config.endpoints {
            let endpoint = endpoint.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = probe(&endpoint.address, &settings).await;
                ProbeResult { endpoint, outcome, checked_at: Utc::now() }
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(join_res) = tasks.next().await {
            match join_res {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "probe task aborted"),
            }
        }

        results.sort_by(|a, b| a.endpoint.name.cmp(&b.endpoint.name));
        results
    }

    async fn apply(&self, results: Vec<ProbeResult>) -> (CycleReport, Vec<(Endpoint, Transition)>) {
        let mut report = CycleReport { probed: results.len(), ..Default::default() };
        let mut transitions = Vec::new();

        let mut store = self.store.write().await;
        for result in results {
            let address = result.endpoint.address.as_str();
            let Some(previous) = store.current_status(address) else {
                continue;
            };
            if !result.outcome.success {
                report.failed += 1;
            }
            if let Some(transition) = Transition::detect(&previous, &result.outcome) {
                transitions.push((result.endpoint.clone(), transition));
            }
            store.record(
                address,
                Observation { timestamp: result.checked_at, success: result.outcome.success },
                result.outcome.response_time_ms,
            );
        }
        store.prune(Utc::now());

        report.persisted = match self.snapshots.save(&store.snapshot()).await {
            Ok(()) => true,
            Err(e) => {
                error!(path = %self.snapshots.path().display(), error = %e, "failed to persist snapshot");
                false
            }
        };
        drop(store);

        report.transitions = transitions.len();
        (report, transitions)
    }

    async fn notify(&self, endpoint: &Endpoint, transition: Transition) {
        let message = transition_message(endpoint, transition);
        match transition {
            Transition::Down => error!(name = %endpoint.name, address = %endpoint.address, "[CHANGE] endpoint down"),
            Transition::Recovered { .. } => {
                warn!(name = %endpoint.name, address = %endpoint.address, "[CHANGE] endpoint recovered")
            }
        }

        if let Err(e) = self.notifier.send_text(self.alert_chat, &message, true).await {
            warn!(name = %endpoint.name, error = %e, "failed to deliver transition alert");
        }
    }
}

pub fn transition_message(endpoint: &Endpoint, transition: Transition) -> String {
    match transition {
        Transition::Down => format!(
            "⚠️ Server {} ({}) is unavailable!",
            endpoint.name, endpoint.address
        ),
        Transition::Recovered { response_time_ms } => format!(
            "✅ Server {} ({}) is available again!\n\n⏱ Response time: {}",
            endpoint.name,
            endpoint.address,
            response_time_ms.map_or("N/A".to_string(), |ms| format!("{} ms", ms))
        ),
    }
}
