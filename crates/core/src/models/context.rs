use chrono::{DateTime, Utc};

use super::MessageEnvelope;

/// Per-invocation state handed through the middleware pipeline.
///
/// Carries an optional deadline so a runaway handler can be cut off by the
/// executor instead of blocking a worker slot indefinitely.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub envelope_id: String,
    pub message_type: String,
    pub retry_count: i32,
    pub deadline: Option<DateTime<Utc>>,
}

impl HandlerContext {
    pub fn for_envelope(envelope: &MessageEnvelope) -> Self {
        Self {
            envelope_id: envelope.id.clone(),
            message_type: envelope.message_type().to_string(),
            retry_count: envelope.retry_count,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Remaining time budget, `None` when no deadline is set.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.deadline
            .map(|deadline| (deadline - now).to_std().unwrap_or_default())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline.map(|deadline| deadline <= now).unwrap_or(false)
    }
}
