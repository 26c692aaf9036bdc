// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Event queries: a CPU-side marker that resolves once a queue has finished everything that was
//! submitted to it before the marker was set.
//!
//! A query is set against the queue's last submitted instance, so it costs nothing on the GPU.
//! See [`crate::Device::set_event_query`].

use crate::config::QueueType;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub(crate) enum EventQueryState {
    #[default]
    NotStarted,
    Pending {
        queue: QueueType,
        instance: u64,
    },
    Resolved,
}

/// A shared handle; clones observe the same query.
#[derive(Clone, Debug, Default)]
pub struct EventQuery(Arc<Mutex<EventQueryState>>);

impl EventQuery {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EventQueryState> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn state(&self) -> EventQueryState {
        *self.lock()
    }

    pub(crate) fn set_state(&self, state: EventQueryState) {
        *self.lock() = state;
    }

    /// Marks the query resolved unless it was set again or reset since `observed` was read.
    pub(crate) fn resolve(&self, observed: EventQueryState) {
        let mut state = self.lock();
        if *state == observed {
            *state = EventQueryState::Resolved;
        }
    }

    /// Whether the query was set since it was created or last reset.
    pub fn is_started(&self) -> bool {
        self.state() != EventQueryState::NotStarted
    }

    /// The queue and instance the query waits for, while it is pending.
    pub fn pending_instance(&self) -> Option<(QueueType, u64)> {
        match self.state() {
            EventQueryState::Pending { queue, instance } => Some((queue, instance)),
            _ => None,
        }
    }
}
