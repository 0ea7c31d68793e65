//! Counters describing the most recent run.

use serde::Serialize;

/// Counters collected by the execution loop during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunMetrics {
    /// Events taken from the proxy's channel.
    pub events_received: u64,
    /// Calls to `Transducer::update`, external and internal events alike.
    pub transitions: u64,
    /// Events produced by actions and processed inside a cascade.
    pub internal_events: u64,
    /// Values accepted by the subject.
    pub outputs: u64,
    pub operations_spawned: u64,
    /// `Cancel` effects dispatched, whether or not a task was registered.
    pub cancellations: u64,
    /// Deepest the work list grew while processing a single event.
    pub max_stack_depth: usize,
}

impl RunMetrics {
    pub(crate) fn observe_depth(&mut self, depth: usize) {
        self.max_stack_depth = self.max_stack_depth.max(depth);
    }
}
