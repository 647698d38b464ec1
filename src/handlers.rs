// SPDX-License-Identifier: MIT

//! HTTP handlers and shared application state.
//!
//! The admission filter fronts an application router; the handlers here are
//! the service's own surface (health check plus a stand-in upstream that
//! confirms a request made it past admission).

use crate::admission::AdmissionControl;
use crate::config::Config;
use axum::Json;
use serde::Serialize;

/// Shared application state.
pub struct AppState {
    pub admission: AdmissionControl,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "ingress-admission",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Catch-all upstream stand-in for admitted requests.
pub async fn admitted() -> &'static str {
    "Request admitted"
}
