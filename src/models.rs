use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

/// State as of the last completed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentStatus {
    pub available: bool,
    pub response_time_ms: Option<u64>,
}

impl Default for CurrentStatus {
    fn default() -> Self {
        Self { available: true, response_time_ms: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub response_time_ms: Option<u64>,
}

impl ProbeOutcome {
    pub fn up(response_time_ms: u64) -> Self {
        Self { success: true, response_time_ms: Some(response_time_ms) }
    }

    pub fn down() -> Self {
        Self { success: false, response_time_ms: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Down,
    Recovered { response_time_ms: Option<u64> },
}

impl Transition {
    /// Compares a fresh probe result against the previous status.
    pub fn detect(previous: &CurrentStatus, outcome: &ProbeOutcome) -> Option<Self> {
        match (previous.available, outcome.success) {
            (true, false) => Some(Transition::Down),
            (false, true) => Some(Transition::Recovered {
                response_time_ms: outcome.response_time_ms,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// `None` when the window holds no observations.
    pub availability_pct: Option<f64>,
}

pub fn format_response_time(ms: Option<u64>) -> String {
    ms.map_or("N/A".to_string(), |ms| format!("⏱ {} ms", ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_down_transition() {
        let prev = CurrentStatus { available: true, response_time_ms: Some(12) };
        assert_eq!(Transition::detect(&prev, &ProbeOutcome::down()), Some(Transition::Down));
    }

    #[test]
    fn detects_recovery_with_response_time() {
        let prev = CurrentStatus { available: false, response_time_ms: None };
        assert_eq!(
            Transition::detect(&prev, &ProbeOutcome::up(42)),
            Some(Transition::Recovered { response_time_ms: Some(42) })
        );
    }

    #[test]
    fn steady_state_is_not_a_transition() {
        let up = CurrentStatus::default();
        let down = CurrentStatus { available: false, response_time_ms: None };
        assert_eq!(Transition::detect(&up, &ProbeOutcome::up(5)), None);
        assert_eq!(Transition::detect(&down, &ProbeOutcome::down()), None);
    }
}
