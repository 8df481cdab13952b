use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Endpoint;
use crate::models::{CurrentStatus, Observation};
use crate::persistence::{EndpointSnapshot, Snapshot};

pub type SharedStore = Arc<RwLock<HealthStore>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_count: usize,
    pub max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { max_count: 10_000, max_age: Duration::hours(24) }
    }
}

/// Time-ordered observations bounded by count and age.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSeries {
    entries: VecDeque<Observation>,
    policy: RetentionPolicy,
}

impl HealthSeries {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { entries: VecDeque::new(), policy }
    }

    /// `None` when the entries are not in time order.
    pub fn from_entries(entries: Vec<Observation>, policy: RetentionPolicy) -> Option<Self> {
        if entries.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
            return None;
        }
        let mut series = Self { entries: entries.into(), policy };
        series.evict_overflow();
        Some(series)
    }

    pub fn push(&mut self, mut observation: Observation) {
        // Wall clock can step backwards; keep the series ordered.
        if let Some(last) = self.entries.back() {
            if observation.timestamp < last.timestamp {
                observation.timestamp = last.timestamp;
            }
        }
        let now = observation.timestamp;
        self.entries.push_back(observation);
        self.prune(now);
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.policy.max_age;
        while self.entries.front().is_some_and(|o| o.timestamp < cutoff) {
            self.entries.pop_front();
        }
        self.evict_overflow();
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.policy.max_count {
            self.entries.pop_front();
        }
    }

    pub fn since(&self, since: DateTime<Utc>) -> Vec<Observation> {
        let start = self.entries.partition_point(|o| o.timestamp < since);
        self.entries.range(start..).copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
struct EndpointState {
    status: CurrentStatus,
    series: HealthSeries,
}

#[derive(Debug)]
pub struct HealthStore {
    endpoints: Vec<Endpoint>,
    states: HashMap<String, EndpointState>,
}

impl HealthStore {
    pub fn new(endpoints: Vec<Endpoint>, policy: RetentionPolicy) -> Self {
        Self::restore(endpoints, policy, Snapshot::default())
    }

    /// Snapshot entries for unconfigured addresses are dropped.
    pub fn restore(endpoints: Vec<Endpoint>, policy: RetentionPolicy, mut snapshot: Snapshot) -> Self {
        let states = endpoints
            .iter()
            .map(|endpoint| {
                let state = match snapshot.endpoints.remove(&endpoint.address) {
                    Some(saved) => EndpointState {
                        status: saved.status,
                        series: HealthSeries::from_entries(saved.history, policy)
                            .unwrap_or_else(|| HealthSeries::new(policy)),
                    },
                    None => EndpointState {
                        status: CurrentStatus::default(),
                        series: HealthSeries::new(policy),
                    },
                };
                (endpoint.address.clone(), state)
            })
            .collect();

        Self { endpoints, states }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn record(&mut self, address: &str, observation: Observation, response_time_ms: Option<u64>) {
        let Some(state) = self.states.get_mut(address) else {
            return;
        };
        state.series.push(observation);
        state.status = CurrentStatus {
            available: observation.success,
            response_time_ms: if observation.success { response_time_ms } else { None },
        };
    }

    pub fn current_status(&self, address: &str) -> Option<CurrentStatus> {
        self.states.get(address).map(|s| s.status)
    }

    pub fn series_in_window(&self, address: &str, since: DateTime<Utc>) -> Vec<Observation> {
        self.states
            .get(address)
            .map(|s| s.series.since(since))
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn series(&self, address: &str) -> Option<&HealthSeries> {
        self.states.get(address).map(|s| &s.series)
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        for state in self.states.values_mut() {
            state.series.prune(now);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let endpoints = self
            .states
            .iter()
            .map(|(address, state)| {
                (
                    address.clone(),
                    EndpointSnapshot {
                        status: state.status,
                        history: state.series.iter().copied().collect(),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();
        Snapshot { endpoints }
    }
}
