// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Sliding-window upstream health model.
//!
//! The dispatcher feeds every send outcome into a window of the most recent
//! 32. The upstream is healthy while the transient-failure ratio stays below
//! 25% and no permanent failure sits in the window. Replay is gated on the
//! transitions, not the level, so a flapping upstream does not restart
//! replay on every send.

use std::collections::VecDeque;

use crate::exporter::SendOutcome;

/// Number of outcomes the window holds.
pub const HEALTH_WINDOW: usize = 32;

/// Transient ratio at or above which the upstream counts as unhealthy.
const MAX_TRANSIENT_RATIO: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutcomeKind {
    Accepted,
    Transient,
    Permanent,
}

/// A health flip produced by recording an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The window crossed into healthy territory.
    BecameHealthy,
    /// The window crossed into unhealthy territory.
    BecameUnhealthy,
}

/// Sliding window over recent send outcomes.
#[derive(Debug)]
pub struct HealthWindow {
    outcomes: VecDeque<OutcomeKind>,
    healthy: bool,
}

impl Default for HealthWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthWindow {
    /// An empty window; an upstream with no history counts as healthy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            outcomes: VecDeque::with_capacity(HEALTH_WINDOW),
            healthy: true,
        }
    }

    /// Current health level.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Records one outcome and reports a transition when the health level
    /// flipped.
    pub fn record(&mut self, outcome: &SendOutcome) -> Option<Transition> {
        let kind = match outcome {
            SendOutcome::Accepted => OutcomeKind::Accepted,
            SendOutcome::Transient(_) => OutcomeKind::Transient,
            SendOutcome::Permanent(_) => OutcomeKind::Permanent,
        };
        if self.outcomes.len() == HEALTH_WINDOW {
            let _ = self.outcomes.pop_front();
        }
        self.outcomes.push_back(kind);

        let healthy_now = self.evaluate();
        if healthy_now != self.healthy {
            self.healthy = healthy_now;
            Some(if healthy_now {
                Transition::BecameHealthy
            } else {
                Transition::BecameUnhealthy
            })
        } else {
            None
        }
    }

    fn evaluate(&self) -> bool {
        if self.outcomes.is_empty() {
            return true;
        }
        if self
            .outcomes
            .iter()
            .any(|kind| *kind == OutcomeKind::Permanent)
        {
            return false;
        }
        let transients = self
            .outcomes
            .iter()
            .filter(|kind| **kind == OutcomeKind::Transient)
            .count();
        (transients as f64 / self.outcomes.len() as f64) < MAX_TRANSIENT_RATIO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> SendOutcome {
        SendOutcome::Accepted
    }

    fn transient() -> SendOutcome {
        SendOutcome::Transient("upstream 503".to_owned())
    }

    #[test]
    fn nine_of_thirty_two_transients_is_unhealthy_seven_is_healthy() {
        let mut window = HealthWindow::new();
        // Nine transients up front: the first already flips to unhealthy.
        assert_eq!(
            window.record(&transient()),
            Some(Transition::BecameUnhealthy)
        );
        for _ in 0..8 {
            assert_eq!(window.record(&transient()), None);
        }
        // Fill the window to 32 with successes: 9/32 = 28% stays unhealthy.
        for _ in 0..23 {
            assert_eq!(window.record(&ok()), None);
            assert!(!window.is_healthy());
        }
        // One more success slides a transient out: 8/32 = 25% is still not
        // strictly below the threshold.
        assert_eq!(window.record(&ok()), None);
        assert!(!window.is_healthy());
        // The next one reaches 7/32 = 22% and must flip healthy.
        assert_eq!(window.record(&ok()), Some(Transition::BecameHealthy));
        assert!(window.is_healthy());
    }

    #[test]
    fn a_single_permanent_failure_poisons_the_window() {
        let mut window = HealthWindow::new();
        for _ in 0..10 {
            let _ = window.record(&ok());
        }
        assert_eq!(
            window.record(&SendOutcome::Permanent("400 bad request".to_owned())),
            Some(Transition::BecameUnhealthy)
        );
        // It takes a full window of successes to push the permanent out.
        for _ in 0..(HEALTH_WINDOW - 1) {
            let _ = window.record(&ok());
            assert!(!window.is_healthy());
        }
        assert_eq!(window.record(&ok()), Some(Transition::BecameHealthy));
    }

    #[test]
    fn an_empty_window_is_healthy() {
        assert!(HealthWindow::new().is_healthy());
    }
}
