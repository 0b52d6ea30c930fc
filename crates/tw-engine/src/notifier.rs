//! Throttled progress notifications

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tw_core::RunResult;

/// Receives an immutable snapshot of the run result
pub type Listener = Box<dyn Fn(&RunResult) + Send + Sync + 'static>;

/// Listener registry shared between a `Runner` and its scheduler
pub(crate) type Listeners = Arc<Mutex<Vec<Listener>>>;

pub(crate) struct Notifier {
    listeners: Listeners,
    period: Duration,
    last: Option<Instant>,
}

impl Notifier {
    pub(crate) fn new(listeners: Listeners, period: Duration) -> Self {
        Self {
            listeners,
            period,
            last: None,
        }
    }

    /// Notify unless a notification went out within the period
    pub(crate) fn notify(&mut self, result: &RunResult) {
        if self.last.is_some_and(|last| last.elapsed() < self.period) {
            return;
        }
        self.flush(result);
    }

    /// Notify regardless of throttling
    pub(crate) fn flush(&mut self, result: &RunResult) {
        let listeners = self.listeners.lock().unwrap_or_else(|p| p.into_inner());
        self.last = Some(Instant::now());
        if listeners.is_empty() {
            return;
        }
        let snapshot = result.clone();
        for listener in listeners.iter() {
            listener(&snapshot);
        }
    }
}
