// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Adaptive priority queue.
//!
//! Payloads are partitioned into operator-defined classes by matching a
//! caller-provided projection string (metric name, severity, span name)
//! against the class patterns. Dequeue order is weighted round-robin: a
//! class with weight `w` yields `w` consecutive items before the scheduler
//! rotates to the next non-empty class, so under sustained backlog class `i`
//! receives a `w_i / Σw` share of dequeues.
//!
//! Capacity is strict. When the free ratio falls below the spill floor the
//! queue diverts new items to the configured spill sink instead of growing;
//! with no sink (or a failing one) the enqueue is rejected and the caller
//! keeps the payload.

mod classify;
mod metrics;

use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use nrdq_config::QueueConfig;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use classify::ClassMatcher;

pub use metrics::QueueMetrics;

/// Free-ratio floor below which enqueues spill.
const SPILL_FREE_RATIO: f64 = 0.05;

/// Errors surfaced while building a queue or running its spill sink.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A class pattern failed to compile.
    #[error("invalid pattern for class `{class}`: {details}")]
    InvalidPattern {
        /// The class whose pattern failed.
        class: String,
        /// Compilation failure details.
        details: String,
    },

    /// The class list was empty.
    #[error("the queue needs at least one class")]
    NoClasses,

    /// The spill sink could not take a payload.
    #[error("spill sink error: {details}")]
    SpillSink {
        /// A description of the error that occurred.
        details: String,
    },
}

/// Result of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The item was admitted to its class queue.
    Enqueued,
    /// The queue was at pressure and the item went to the spill sink.
    Spilled,
    /// The queue was at pressure and no sink took the item; the caller must
    /// drop or retry.
    Rejected,
}

/// An item owned by the queue between enqueue and dequeue.
#[derive(Debug)]
pub struct QueueItem {
    /// The opaque payload, unchanged from enqueue.
    pub payload: Bytes,
    /// Class index assigned at enqueue.
    pub class: usize,
    /// When the item entered the queue.
    pub enqueued_at: Instant,
}

/// Callback that takes overflowing payloads, typically bound to the durable
/// store's append.
pub type SpillSink = Box<dyn Fn(&Bytes) -> Result<(), Error> + Send + Sync>;

struct State {
    queues: Vec<VecDeque<QueueItem>>,
    total: usize,
    /// Scheduler position.
    current: usize,
    /// Dequeues left before the scheduler rotates away from `current`.
    tokens: u32,
}

/// Class-partitioned queue with weighted round-robin dequeue and overflow
/// spill. All methods take `&self`; one exclusive section guards mutation.
pub struct PriorityQueue {
    state: Mutex<State>,
    notify: Notify,
    matcher: ClassMatcher,
    class_names: Vec<String>,
    weights: Vec<u32>,
    capacity: usize,
    sink: Mutex<Option<SpillSink>>,
    metrics: QueueMetrics,
}

impl PriorityQueue {
    /// Builds a queue from validated configuration.
    pub fn new(config: &QueueConfig, metrics: QueueMetrics) -> Result<Self, Error> {
        if config.classes.is_empty() {
            return Err(Error::NoClasses);
        }
        let matcher = ClassMatcher::new(&config.classes)?;
        let class_names: Vec<String> = config.classes.iter().map(|c| c.name.clone()).collect();
        let weights: Vec<u32> = config.classes.iter().map(|c| c.weight).collect();
        let queues = config.classes.iter().map(|_| VecDeque::new()).collect();
        let tokens = weights[0];
        Ok(Self {
            state: Mutex::new(State {
                queues,
                total: 0,
                current: 0,
                tokens,
            }),
            notify: Notify::new(),
            matcher,
            class_names,
            weights,
            capacity: config.capacity,
            sink: Mutex::new(None),
            metrics,
        })
    }

    /// Installs the spill sink. Until a sink is set, overflow enqueues are
    /// rejected.
    pub fn set_spill_sink<F>(&self, sink: F)
    where
        F: Fn(&Bytes) -> Result<(), Error> + Send + Sync + 'static,
    {
        *self.sink.lock() = Some(Box::new(sink));
    }

    /// Admits a payload, or diverts it to the spill sink under pressure.
    pub fn enqueue(&self, payload: Bytes, projection: &str) -> EnqueueOutcome {
        let class = self.matcher.classify(projection);
        {
            let mut state = self.state.lock();
            let free = (self.capacity - state.total) as f64 / self.capacity as f64;
            if free >= SPILL_FREE_RATIO {
                state.queues[class].push_back(QueueItem {
                    payload,
                    class,
                    enqueued_at: Instant::now(),
                });
                state.total += 1;
                self.metrics.apq_size.set(state.total as u64);
                drop(state);
                self.notify.notify_one();
                return EnqueueOutcome::Enqueued;
            }
        }

        // Overflow: hand the payload to the sink outside the queue lock; the
        // sink typically blocks on disk I/O.
        let class_name = &self.class_names[class];
        let sink = self.sink.lock();
        match sink.as_ref() {
            Some(sink_fn) => match sink_fn(&payload) {
                Ok(()) => {
                    self.metrics.apq_spill_total.inc(class_name);
                    EnqueueOutcome::Spilled
                }
                Err(e) => {
                    warn!(class = %class_name, error = %e, "spill sink rejected an overflow item");
                    self.metrics.apq_rejected_total.inc(class_name);
                    EnqueueOutcome::Rejected
                }
            },
            None => {
                self.metrics.apq_rejected_total.inc(class_name);
                EnqueueOutcome::Rejected
            }
        }
    }

    /// Removes and returns the next item by weighted round-robin, waiting
    /// for an enqueue when every class is empty. Returns `None` once `cancel`
    /// fires; cancellation never removes an item.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<QueueItem> {
        loop {
            // Register interest before the emptiness check so an enqueue
            // racing with the check leaves a stored permit, not a lost
            // wakeup.
            let notified = self.notify.notified();
            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    /// Non-blocking weighted round-robin pop.
    fn try_dequeue(&self) -> Option<QueueItem> {
        let mut state = self.state.lock();
        if state.total == 0 {
            return None;
        }
        loop {
            let current = state.current;
            if state.tokens > 0 {
                if let Some(item) = state.queues[current].pop_front() {
                    state.tokens -= 1;
                    state.total -= 1;
                    self.metrics.apq_size.set(state.total as u64);
                    let backlog = state.total;
                    drop(state);
                    if backlog > 0 {
                        // Keep sibling consumers moving while items remain.
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
            }
            // Rotate to the next non-empty class and grant it a full weight
            // of tokens. Empty classes accumulate no credit.
            let n = state.queues.len();
            let mut idx = (current + 1) % n;
            while state.queues[idx].is_empty() {
                idx = (idx + 1) % n;
            }
            state.current = idx;
            state.tokens = self.weights[idx];
        }
    }

    /// Total occupancy across classes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.lock().total
    }

    /// Occupancy of one class.
    #[must_use]
    pub fn per_class_size(&self, class: usize) -> usize {
        self.state.lock().queues[class].len()
    }

    /// Number of configured classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.class_names.len()
    }

    /// Name of a class, for labelling.
    #[must_use]
    pub fn class_name(&self, class: usize) -> &str {
        &self.class_names[class]
    }

    /// Empties the queue in class order, returning everything still buffered.
    /// Used by shutdown to spill the undrained remainder.
    pub fn drain_all(&self) -> Vec<QueueItem> {
        let mut state = self.state.lock();
        let mut drained = Vec::with_capacity(state.total);
        for queue in &mut state.queues {
            drained.extend(queue.drain(..));
        }
        state.total = 0;
        self.metrics.apq_size.set(0);
        drained
    }
}
