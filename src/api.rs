use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::MonitorConfig;
use crate::models::{CurrentStatus, Stats};
use crate::reducer::{reduce, PlotPoint};
use crate::stats::stats;
use crate::store::SharedStore;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<MonitorConfig>,
    pub store: SharedStore,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub hours: Option<u32>,
    pub points: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EndpointStatus {
    pub name: String,
    pub address: String,
    #[serde(flatten)]
    pub status: CurrentStatus,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub name: String,
    pub address: String,
    #[serde(flatten)]
    pub stats: Stats,
}

#[derive(Debug, Serialize)]
pub struct EndpointGraph {
    pub name: String,
    pub address: String,
    pub points: Vec<PlotPoint>,
}

const MAX_WINDOW_HOURS: u32 = 24 * 365;

fn window(query: &WindowQuery) -> Duration {
    Duration::hours(i64::from(query.hours.unwrap_or(24).clamp(1, MAX_WINDOW_HOURS)))
}

pub async fn get_status(State(state): State<ApiState>) -> Json<Vec<EndpointStatus>> {
    let store = state.store.read().await;
    Json(
        store
            .endpoints()
            .iter()
            .map(|e| EndpointStatus {
                name: e.name.clone(),
                address: e.address.clone(),
                status: store.current_status(&e.address).unwrap_or_default(),
            })
            .collect(),
    )
}

pub async fn get_stats(
    State(state): State<ApiState>,
    Query(query): Query<WindowQuery>,
) -> Json<Vec<EndpointStats>> {
    let window = window(&query);
    let now = Utc::now();
    let store = state.store.read().await;
    Json(
        store
            .endpoints()
            .iter()
            .map(|e| EndpointStats {
                name: e.name.clone(),
                address: e.address.clone(),
                stats: stats(&store.series_in_window(&e.address, now - window), window, now),
            })
            .collect(),
    )
}

pub async fn get_graph(
    State(state): State<ApiState>,
    Query(query): Query<WindowQuery>,
) -> Json<Vec<EndpointGraph>> {
    let window = window(&query);
    let max_points = query.points.unwrap_or(state.config.graph_points).max(1);
    let now = Utc::now();
    let store = state.store.read().await;
    Json(
        store
            .endpoints()
            .iter()
            .map(|e| EndpointGraph {
                name: e.name.clone(),
                address: e.address.clone(),
                points: reduce(&store.series_in_window(&e.address, now - window), window, max_points, now),
            })
            .collect(),
    )
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/stats", get(get_stats))
        .route("/api/graph", get(get_graph))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(port: u16, state: ApiState) -> std::io::Result<()> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API: http://localhost:{}/api/status", addr.port());
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Observation;
    use crate::store::{HealthStore, RetentionPolicy};
    use tokio::sync::RwLock;

    fn state() -> ApiState {
        let config: MonitorConfig = serde_json::from_value(serde_json::json!({
            "endpoints": [{"name": "alpha", "address": "10.0.0.1"}]
        }))
        .unwrap();
        let config = Arc::new(config);
        let mut store = HealthStore::new(config.endpoints.clone(), RetentionPolicy::default());
        let now = Utc::now();
        store.record("10.0.0.1", Observation { timestamp: now - Duration::minutes(2), success: true }, Some(9));
        store.record("10.0.0.1", Observation { timestamp: now - Duration::minutes(1), success: false }, None);
        ApiState { config, store: Arc::new(RwLock::new(store)) }
    }

    #[tokio::test]
    async fn status_serializes_flat() {
        let Json(body) = get_status(State(state())).await;
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "name": "alpha",
                "address": "10.0.0.1",
                "available": false,
                "response_time_ms": null
            }])
        );
    }

    #[tokio::test]
    async fn stats_defaults_to_day_window() {
        let query = WindowQuery { hours: None, points: None };
        let Json(body) = get_stats(State(state()), Query(query)).await;
        assert_eq!(body[0].stats.total, 2);
        assert_eq!(body[0].stats.availability_pct, Some(50.0));
    }

    #[tokio::test]
    async fn graph_keeps_transition() {
        let query = WindowQuery { hours: Some(1), points: Some(1) };
        let Json(body) = get_graph(State(state()), Query(query)).await;
        let flags: Vec<bool> = body[0].points.iter().map(|p| p.success).collect();
        assert_eq!(flags, vec![true, false]);
    }

    #[tokio::test]
    async fn huge_window_is_clamped() {
        let query = WindowQuery { hours: Some(u32::MAX), points: None };
        let Json(body) = get_stats(State(state()), Query(query)).await;
        assert_eq!(body[0].stats.total, 2);

        let query = WindowQuery { hours: Some(u32::MAX), points: Some(10) };
        let Json(body) = get_graph(State(state()), Query(query)).await;
        assert_eq!(body[0].points.len(), 2);
    }

    #[test]
    fn window_bounds() {
        assert_eq!(window(&WindowQuery { hours: Some(0), points: None }), Duration::hours(1));
        assert_eq!(window(&WindowQuery { hours: Some(u32::MAX), points: None }), Duration::days(365));
    }
}
