//! Look-ahead event dispatch against session time.

use tracing::warn;

use crate::error::{DispatchError, SchedulerError};

/// An event handed to the dispatch callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Scheduled<E> {
    pub event: E,
    pub at_ms: f64,
}

/// Counts from one `tick`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub failed: usize,
}

struct Entry<E> {
    at_ms: f64,
    event: E,
}

type ErrorHandler = Box<dyn FnMut(&DispatchError)>;

/// Time-ordered queue; ties dispatch in insertion order.
pub struct Scheduler<E> {
    queue: Vec<Entry<E>>,
    lookahead_ms: f64,
    on_error: Option<ErrorHandler>,
}

impl<E> Scheduler<E> {
    pub fn new(lookahead_ms: f64) -> Self {
        Self {
            queue: Vec::new(),
            lookahead_ms: lookahead_ms.max(0.0),
            on_error: None,
        }
    }

    pub fn lookahead_ms(&self) -> f64 {
        self.lookahead_ms
    }

    pub fn set_lookahead_ms(&mut self, lookahead_ms: f64) {
        self.lookahead_ms = lookahead_ms.max(0.0);
    }

    /// Registers the side channel that receives dispatch failures.
    pub fn set_error_handler(&mut self, handler: impl FnMut(&DispatchError) + 'static) {
        self.on_error = Some(Box::new(handler));
    }

    pub fn schedule(&mut self, event: E, at_ms: f64) -> Result<(), SchedulerError> {
        if !at_ms.is_finite() {
            return Err(SchedulerError::InvalidTime(at_ms));
        }
        // Insert after every entry due at the same time so ties stay FIFO.
        let pos = self.queue.partition_point(|e| e.at_ms <= at_ms);
        self.queue.insert(pos, Entry { at_ms, event });
        Ok(())
    }

    /// Dispatches, in order, every event due by `now_ms + lookahead`.
    ///
    /// A large jump in `now_ms` dispatches the whole backlog in one call. A
    /// failing callback is reported and the remaining events still run.
    pub fn tick<F>(&mut self, now_ms: f64, mut dispatch: F) -> TickReport
    where
        F: FnMut(Scheduled<E>) -> Result<(), DispatchError>,
    {
        let horizon = now_ms + self.lookahead_ms;
        let due = self.queue.partition_point(|e| e.at_ms <= horizon);
        let mut report = TickReport::default();
        for entry in self.queue.drain(..due) {
            report.dispatched += 1;
            let scheduled = Scheduled {
                event: entry.event,
                at_ms: entry.at_ms,
            };
            if let Err(err) = dispatch(scheduled) {
                report.failed += 1;
                match self.on_error.as_mut() {
                    Some(handler) => handler(&err),
                    None => warn!("scheduled event dropped: {err}"),
                }
            }
        }
        report
    }

    /// Clears the queue without dispatching anything.
    pub fn cancel_all(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn next_due_ms(&self) -> Option<f64> {
        self.queue.first().map(|e| e.at_ms)
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new(0.0)
    }
}
