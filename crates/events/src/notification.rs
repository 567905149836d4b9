//! Outbound lifecycle notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A lifecycle event addressed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event_type: String,
    pub payload: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(event_type: impl Into<String>, payload: JsonValue, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            occurred_at,
        }
    }
}

/// One-way notification channel.
///
/// There is no result: the only contract is "attempted". Implementations must
/// not block and must swallow (and log) their own failures, because callers
/// invoke this after a transition has already committed.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: Notification);
}

impl<T> NotificationSink for std::sync::Arc<T>
where
    T: NotificationSink + ?Sized,
{
    fn publish(&self, notification: Notification) {
        (**self).publish(notification)
    }
}
