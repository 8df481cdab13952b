use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt::Write;

use crate::models::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlotPoint {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

impl From<&Observation> for PlotPoint {
    fn from(o: &Observation) -> Self {
        Self { timestamp: o.timestamp, success: o.success }
    }
}

/// Fixed-step sampling plus every point whose state differs from the last
/// kept one, so a short outage is never skipped.
pub fn reduce(
    series: &[Observation],
    window: Duration,
    max_points: usize,
    now: DateTime<Utc>,
) -> Vec<PlotPoint> {
    let since = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let filtered: Vec<&Observation> = series
        .iter()
        .filter(|o| o.timestamp >= since && o.timestamp <= now)
        .collect();

    if filtered.is_empty() {
        return vec![PlotPoint { timestamp: now, success: false }];
    }

    let step = (filtered.len() / max_points.max(1)).max(1);
    let mut points: Vec<PlotPoint> = Vec::with_capacity(max_points.min(filtered.len()) + 1);
    for (i, o) in filtered.iter().enumerate() {
        let changed = points.last().is_some_and(|last| last.success != o.success);
        if points.is_empty() || i % step == 0 || changed {
            points.push(PlotPoint::from(*o));
        }
    }
    points
}

pub fn to_csv(points: &[PlotPoint]) -> String {
    let mut out = String::from("timestamp,available\n");
    for p in points {
        let _ = writeln!(
            out,
            "{},{}",
            p.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            u8::from(p.success)
        );
    }
    out
}

pub fn step_strip(points: &[PlotPoint]) -> String {
    points
        .iter()
        .map(|p| if p.success { '█' } else { '▁' })
        .collect()
}
