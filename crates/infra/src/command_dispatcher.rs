//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream
//!   ↓
//! 2. Rehydrate (apply history)
//!   ↓
//! 3. Handle (pure decision, produces events)
//!   ↓
//! 4. Append with the version read in step 1 as expected version
//!   ↓
//! 5. Publish committed events (best-effort)
//! ```
//!
//! A concurrent writer between steps 1 and 4 makes the append fail with a
//! concurrency error. [`CommandDispatcher::dispatch_with_retry`] reloads and
//! decides again, up to `max_attempts` times, then reports
//! [`DispatchError::ConcurrentModification`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use quoteflow_auth::AuthzError;
use quoteflow_core::{Aggregate, AggregateId, DomainError, ErrorKind, ExpectedVersion};
use quoteflow_events::EventBus;

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Default bound on optimistic retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The aggregate rejected the command.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The stream moved since it was read (single attempt).
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// Every retry lost the race.
    #[error("concurrent modification of {aggregate_type} {aggregate_id} after {attempts} attempts")]
    ConcurrentModification {
        aggregate_type: String,
        aggregate_id: AggregateId,
        attempts: u32,
    },

    /// A stored payload no longer matches the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// The store returned a stream that violates its own ordering guarantees.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    #[error("event store failure: {0}")]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<AuthzError> for DispatchError {
    fn from(value: AuthzError) -> Self {
        DispatchError::Domain(value.into())
    }
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Domain(e) => e.kind(),
            DispatchError::Concurrency(_) | DispatchError::ConcurrentModification { .. } => {
                ErrorKind::ConcurrentModification
            }
            DispatchError::Deserialize(_)
            | DispatchError::CorruptStream(_)
            | DispatchError::Store(_) => ErrorKind::Internal,
        }
    }

    /// A lost optimistic race that a reload may win.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

/// Result of a committed command: the aggregate after the new events, and the
/// events as stored.
#[derive(Debug, Clone)]
pub struct Committed<A> {
    pub aggregate: A,
    pub events: Vec<StoredEvent>,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and the bus so tests run on the in-memory
/// implementations. Events are published only after the append succeeded; a
/// failed publish is logged and never undoes the commit.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    max_attempts: u32,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<StoredEvent>,
{
    /// Rehydrate an aggregate from its stream.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Typed events of a stream, oldest first.
    pub fn history<E>(&self, aggregate_id: AggregateId) -> Result<Vec<E>, DispatchError>
    where
        E: DeserializeOwned,
    {
        let stream = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &stream)?;

        stream
            .iter()
            .map(|stored| {
                serde_json::from_value(stored.payload.clone())
                    .map_err(|e| DispatchError::Deserialize(format!("{}: {e}", stored.event_type)))
            })
            .collect()
    }

    /// Single attempt: decide against the current state and append under the
    /// version that state was read at.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Committed<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: quoteflow_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatch_expecting(
            aggregate_id,
            aggregate_type,
            ExpectedVersion::Any,
            command,
            make_aggregate,
        )
    }

    /// Like [`dispatch`](Self::dispatch), but fails with a concurrency error
    /// unless the stream is still at `expected`.
    ///
    /// Used for conditional writes: a caller that read an aggregate, did other
    /// work, and must only commit if nobody changed it meanwhile.
    pub fn dispatch_expecting<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected: ExpectedVersion,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Committed<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: quoteflow_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let current = stream_version(&history);
        if !expected.matches(current) {
            return Err(DispatchError::Concurrency(format!(
                "{aggregate_type} {aggregate_id}: expected {expected:?}, found {current}"
            )));
        }

        // 2) Rehydrate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide (no mutation)
        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(Committed {
                aggregate,
                events: vec![],
            });
        }

        // 4) Persist under the version we decided against
        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self
            .store
            .append(uncommitted, ExpectedVersion::Exact(current))?;

        for ev in &decided {
            aggregate.apply(ev);
        }

        tracing::debug!(
            aggregate_type,
            %aggregate_id,
            events = committed.len(),
            version = stream_version(&committed),
            "committed"
        );

        // 5) Publish (best-effort)
        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.clone()) {
                tracing::warn!(
                    aggregate_type,
                    %aggregate_id,
                    event_type = %stored.event_type,
                    "failed to publish committed event: {err:?}"
                );
            }
        }

        Ok(Committed {
            aggregate,
            events: committed,
        })
    }

    /// Dispatch, reloading and deciding again when another writer won the
    /// race, at most `max_attempts` times.
    pub fn dispatch_with_retry<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Committed<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: quoteflow_events::Event + Serialize + DeserializeOwned,
    {
        for attempt in 1..=self.max_attempts {
            match self.dispatch(aggregate_id, aggregate_type, command, &make_aggregate) {
                Err(err) if err.is_concurrency() => {
                    tracing::warn!(
                        aggregate_type,
                        %aggregate_id,
                        attempt,
                        max_attempts = self.max_attempts,
                        "version conflict, retrying"
                    );
                }
                other => return other,
            }
        }

        Err(DispatchError::ConcurrentModification {
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
            attempts: self.max_attempts,
        })
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::CorruptStream(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::CorruptStream(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(format!("{}: {e}", stored.event_type)))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
