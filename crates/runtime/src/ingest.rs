//! Webhook ingest — the HTTP boundary where channel payloads arrive.
//!
//! One route per concern: `POST /webhook/{channel}` runs the channel's
//! normalizer and hands canonical events to the dispatcher;
//! `GET /health` answers liveness probes. Discarded payloads still get a
//! 200 so platforms stop redelivering them.

use crate::{dispatch, Runtime};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use everclaw_channels::{slack, telegram, Normalized};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Build the ingest router.
pub fn router(rt: Arc<Runtime>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook/:channel", post(webhook))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(rt)
}

/// Serve ingest on the configured address.
pub async fn serve(rt: Arc<Runtime>) -> Result<(), everclaw_core::Error> {
    let addr = rt.config.ingest_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| everclaw_core::Error::Internal(format!("bind {addr}: {e}")))?;
    info!(addr = %addr, "Ingest server listening");
    axum::serve(listener, router(rt))
        .await
        .map_err(|e| everclaw_core::Error::Internal(format!("ingest server: {e}")))
}

async fn health() -> &'static str {
    "ok"
}

async fn webhook(
    State(rt): State<Arc<Runtime>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (StatusCode, String) {
    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let normalized = match channel.as_str() {
        telegram::CHANNEL => telegram::normalize(&payload),
        slack::CHANNEL => slack::normalize(&payload, &header_map),
        _ => return (StatusCode::NOT_FOUND, format!("unknown channel: {channel}")),
    };

    match normalized {
        Normalized::Event(event) => {
            debug!(channel = %channel, session = %event.session_key, "Inbound message accepted");
            // Fire and forget: the platform only needs the 200
            let rt = rt.clone();
            tokio::spawn(async move {
                let _ = dispatch::on_message_received(rt, event).await;
            });
            (StatusCode::OK, "ok".into())
        }
        Normalized::Discard { event } => {
            debug!(channel = %channel, event = %event, "Payload discarded");
            (StatusCode::OK, event)
        }
        Normalized::Challenge { body } => (StatusCode::OK, body),
    }
}
