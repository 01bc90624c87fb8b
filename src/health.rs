// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Health and metrics endpoint.
//!
//! - `GET /actuator/health` returns `{"status":"UP"}`
//! - `GET /actuator/metrics` returns the Prometheus text exposition

use crate::metrics::gather_metrics;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tracing::{error, info};

pub const HEALTH_PATH: &str = "/actuator/health";
pub const METRICS_PATH: &str = "/actuator/metrics";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "UP" }))
}

pub async fn metrics() -> Response {
    match gather_metrics() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[must_use]
pub fn router() -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(METRICS_PATH, get(metrics))
}

/// Serve [`router`] on `addr` until the process exits.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Health endpoint listening");
    axum::serve(listener, router()).await
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod health_tests;
