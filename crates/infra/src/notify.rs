//! Lifecycle notifications to connected clients.
//!
//! Emitted after commit, fire-and-forget: a sink failure is logged and never
//! surfaces to the caller of the transition.

use std::sync::Arc;

use quoteflow_events::{EventBus, Notification, NotificationSink};

use crate::event_store::StoredEvent;

/// Committed event types that clients are told about.
pub const NOTIFIED_EVENT_TYPES: &[&str] = &[
    "quotation.created",
    "quotation.revised",
    "quotation.submitted",
    "quotation.approved",
    "quotation.rejected",
    "quotation.accepted",
    "quotation.cancelled",
    "quotation.cancellation_requested",
    "quotation.cancellation_denied",
    "quotation.completed",
    "sale.created",
    "sale.payment_recorded",
    "inventory.transfer.completed",
    "purchasing.receiving.posted",
];

/// Sink that forwards notifications onto an in-process bus.
#[derive(Debug)]
pub struct BusNotificationSink<B> {
    bus: B,
}

impl<B> BusNotificationSink<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B> NotificationSink for BusNotificationSink<B>
where
    B: EventBus<Notification>,
{
    fn publish(&self, notification: Notification) {
        let event_type = notification.event_type.clone();
        if let Err(err) = self.bus.publish(notification) {
            tracing::warn!(%event_type, "notification dropped: {err:?}");
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullNotificationSink;

impl NotificationSink for NullNotificationSink {
    fn publish(&self, _notification: Notification) {}
}

/// Turns committed events into notifications.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl core::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NullNotificationSink))
    }

    /// Publish a notification for every committed event of a notified type.
    pub fn committed(&self, events: &[StoredEvent]) {
        for stored in events
            .iter()
            .filter(|e| NOTIFIED_EVENT_TYPES.contains(&e.event_type.as_str()))
        {
            self.sink.publish(Notification::new(
                stored.event_type.clone(),
                stored.payload.clone(),
                stored.occurred_at,
            ));
        }
    }
}
