//! Shared wiring for the reconciliation services.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use quoteflow_auth::{Actor, Permission, authorize};
use quoteflow_events::InMemoryEventBus;

use crate::clock::{Clock, SystemClock};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::ReconcileConfig;
use crate::event_store::{InMemoryEventStore, StoredEvent};
use crate::notify::Notifier;

/// What every service shares: the dispatcher, the time source, the notifier
/// and the tuning knobs.
pub struct ServiceContext<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    config: ReconcileConfig,
}

impl<S, B> core::fmt::Debug for ServiceContext<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S, B> ServiceContext<S, B> {
    pub fn new(
        store: S,
        bus: B,
        clock: Arc<dyn Clock>,
        notifier: Notifier,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus).with_max_attempts(config.max_attempts),
            clock,
            notifier,
            config,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn config(&self) -> ReconcileConfig {
        self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

pub type InMemoryStore = Arc<InMemoryEventStore>;
pub type InMemoryBus = Arc<InMemoryEventBus<StoredEvent>>;
pub type InMemoryContext = ServiceContext<InMemoryStore, InMemoryBus>;

impl InMemoryContext {
    /// In-memory wiring for tests and local runs.
    pub fn in_memory(clock: Arc<dyn Clock>, notifier: Notifier, config: ReconcileConfig) -> Self {
        ServiceContext::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            clock,
            notifier,
            config,
        )
    }

    /// In-memory wiring on the wall clock with notifications disabled.
    pub fn in_memory_default() -> Self {
        Self::in_memory(
            Arc::new(SystemClock),
            Notifier::disabled(),
            ReconcileConfig::default(),
        )
    }
}

/// Role check at a service entry point.
pub(crate) fn require(actor: &Actor, permission: &Permission) -> Result<(), DispatchError> {
    Ok(authorize(actor, permission)?)
}
