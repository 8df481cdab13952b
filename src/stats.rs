use chrono::{DateTime, Duration, Utc};

use crate::models::{Observation, Stats};

/// Counts outcomes in `[now - window, now]`.
pub fn stats(series: &[Observation], window: Duration, now: DateTime<Utc>) -> Stats {
    let since = now - window;
    let (total, successful) = series
        .iter()
        .filter(|o| o.timestamp >= since && o.timestamp <= now)
        .fold((0, 0), |(total, ok), o| (total + 1, ok + usize::from(o.success)));

    let availability_pct = (total > 0).then(|| {
        let pct = 100.0 * successful as f64 / total as f64;
        (pct * 100.0).round() / 100.0
    });

    Stats {
        total,
        successful,
        failed: total - successful,
        availability_pct,
    }
}

pub fn format_availability(pct: Option<f64>) -> String {
    pct.map_or("N/A".to_string(), |p| format!("{:.2}%", p))
}
