// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! HTTP surfaces of the host process: the exporter transport adapter and the
//! ingest endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use bytes::Bytes;
use nrdq_config::ExporterSettings;
use nrdq_engine::{Error as EngineError, Exporter, Pipeline, SendOutcome};
use nrdq_pdata::DataPoint;
use tracing::debug;

/// Exporter adapter performing one HTTP POST per send attempt.
///
/// Classification: 2xx is accepted; 408, 429 and 5xx are transient (the
/// upstream may recover); remaining 4xx are permanent (the payload will
/// never be taken); transport-level failures are transient.
pub struct HttpExporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExporter {
    /// Builds the adapter with the configured per-send timeout.
    pub fn new(settings: &ExporterSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
        })
    }
}

#[async_trait]
impl Exporter for HttpExporter {
    async fn send(&self, payload: Bytes) -> SendOutcome {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/cbor")
            .body(payload)
            .send()
            .await;
        match response {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    SendOutcome::Accepted
                } else if status.as_u16() == 408
                    || status.as_u16() == 429
                    || status.is_server_error()
                {
                    SendOutcome::Transient(format!("upstream returned {status}"))
                } else {
                    SendOutcome::Permanent(format!("upstream returned {status}"))
                }
            }
            Err(e) => SendOutcome::Transient(format!("transport error: {e}")),
        }
    }
}

/// Router for the development/test ingest front-end: a JSON array of data
/// points per request.
pub fn ingest_router(pipeline: Arc<Pipeline>) -> axum::Router {
    axum::Router::new()
        .route("/v1/points", post(ingest_points))
        .with_state(pipeline)
}

async fn ingest_points(
    State(pipeline): State<Arc<Pipeline>>,
    Json(batch): Json<Vec<DataPoint>>,
) -> StatusCode {
    debug!(points = batch.len(), "ingest request");
    match pipeline.ingest(batch) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(EngineError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
