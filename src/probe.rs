use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

use crate::models::ProbeOutcome;

#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub port: u16,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

/// The response time belongs to the attempt that succeeded.
pub async fn probe(address: &str, settings: &ProbeSettings) -> ProbeOutcome {
    let attempts = settings.max_attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(elapsed) = connect_once(address, settings.port, settings.timeout).await {
            return ProbeOutcome::up(elapsed);
        }
        if attempt < attempts {
            tokio::time::sleep(settings.retry_delay).await;
        }
    }
    ProbeOutcome::down()
}

async fn connect_once(address: &str, port: u16, timeout: Duration) -> Option<u64> {
    let target = format!("{}:{}", address, port);
    let start = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(&target)).await {
        Ok(Ok(_stream)) => Some(start.elapsed().as_millis() as u64),
        Ok(Err(e)) => {
            debug!(%target, error = %e, "connection refused");
            None
        }
        Err(_) => {
            debug!(%target, timeout_ms = timeout.as_millis() as u64, "connection timed out");
            None
        }
    }
}
