//! Shared record of calls made to the in-memory services.

use std::sync::{Arc, Mutex, PoisonError};

/// Ordered log of service calls, shared between fakes.
///
/// Each in-memory service can be attached to the same journal so tests can
/// assert on the global order of calls across services, e.g. that a refund
/// happened before a purchase cancellation.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `service.operation(argument)`.
    pub fn record(&self, service: &str, operation: &str, argument: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("{service}.{operation}({argument})"));
    }

    /// All recorded calls, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded calls whose `service.operation` prefix matches.
    pub fn calls_to(&self, service: &str, operation: &str) -> Vec<String> {
        let prefix = format!("{service}.{operation}(");
        self.entries()
            .into_iter()
            .filter(|entry| entry.starts_with(&prefix))
            .collect()
    }
}
