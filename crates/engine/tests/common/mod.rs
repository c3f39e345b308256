// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Exporter test doubles and config helpers shared by the integration tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use nrdq_config::RelayConfig;
use nrdq_engine::{Exporter, SendOutcome};
use parking_lot::Mutex;

/// Exporter that can be switched between accepting everything and failing
/// transiently, recording every accepted payload.
pub struct SwitchExporter {
    fail: AtomicBool,
    received: Mutex<Vec<Bytes>>,
}

impl SwitchExporter {
    /// An exporter that accepts everything.
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            received: Mutex::new(Vec::new()),
        })
    }

    /// An exporter that fails transiently until switched.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(true),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<Bytes> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl Exporter for SwitchExporter {
    async fn send(&self, payload: Bytes) -> SendOutcome {
        if self.fail.load(Ordering::SeqCst) {
            SendOutcome::Transient("injected upstream failure".to_owned())
        } else {
            self.received.lock().push(payload);
            SendOutcome::Accepted
        }
    }
}

/// Exporter whose sends never complete, for exercising shutdown while a
/// payload is in flight.
pub struct StuckExporter;

#[async_trait]
impl Exporter for StuckExporter {
    async fn send(&self, _payload: Bytes) -> SendOutcome {
        std::future::pending().await
    }
}

/// A pipeline configuration pointing at a temporary spill directory.
pub fn test_config(dir: &Path, concurrency: usize, drain_deadline: Duration) -> RelayConfig {
    RelayConfig::from_yaml(&format!(
        r#"
limiter:
  scorer: attribute-bytes
queue:
  capacity: 100
  classes:
    - {{ name: critical, weight: 3, pattern: "^system\\." }}
    - {{ name: normal, weight: 1, pattern: ".*" }}
spill:
  directory: {dir}
  max_segment_bytes: 64 KiB
exporter:
  endpoint: http://127.0.0.1:1/
  concurrency: {concurrency}
shutdown:
  drain_deadline: {drain_ms}ms
"#,
        dir = dir.display(),
        drain_ms = drain_deadline.as_millis(),
    ))
    .expect("test config parses")
}

/// Polls `condition` until it holds or the timeout elapses.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}
