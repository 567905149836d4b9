//! Document numbering: `<PREFIX>-<YEAR>-<MONTH>-<sequence>`.
//!
//! Each (kind, year, month) has its own [`NumberSeries`] stream, with an id
//! derived from the kind and period. Reserving a number appends to that
//! stream under optimistic concurrency, so two concurrent reservations cannot
//! both win the same sequence; the loser reloads and takes the next one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quoteflow_core::{
    Aggregate, AggregateId, AggregateRoot, DocumentKind, DocumentNumber, DomainError, Period,
};
use quoteflow_events::{Event, EventBus};

use crate::command_dispatcher::DispatchError;
use crate::context::ServiceContext;
use crate::event_store::{EventStore, StoredEvent};

pub const SERIES_AGGREGATE_TYPE: &str = "numbering.series";

/// Aggregate root: the issued sequences of one kind in one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberSeries {
    id: AggregateId,
    kind: Option<DocumentKind>,
    period: Option<Period>,
    highest: u32,
    version: u64,
}

impl NumberSeries {
    pub fn id_for(kind: DocumentKind, period: Period) -> AggregateId {
        AggregateId::derived(
            SERIES_AGGREGATE_TYPE,
            &format!("{}-{:04}-{:02}", kind.prefix(), period.year, period.month),
        )
    }

    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            kind: None,
            period: None,
            highest: 0,
            version: 0,
        }
    }

    /// Highest sequence issued so far (0 when none).
    pub fn highest(&self) -> u32 {
        self.highest
    }
}

impl AggregateRoot for NumberSeries {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveNext {
    pub kind: DocumentKind,
    pub period: Period,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberSeriesCommand {
    ReserveNext(ReserveNext),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberReserved {
    pub kind: DocumentKind,
    pub period: Period,
    pub sequence: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberSeriesEvent {
    NumberReserved(NumberReserved),
}

impl Event for NumberSeriesEvent {
    fn event_type(&self) -> &'static str {
        match self {
            NumberSeriesEvent::NumberReserved(_) => "numbering.number_reserved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            NumberSeriesEvent::NumberReserved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for NumberSeries {
    type Command = NumberSeriesCommand;
    type Event = NumberSeriesEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            NumberSeriesEvent::NumberReserved(e) => {
                self.kind = Some(e.kind);
                self.period = Some(e.period);
                self.highest = self.highest.max(e.sequence);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            NumberSeriesCommand::ReserveNext(cmd) => {
                if self.id != Self::id_for(cmd.kind, cmd.period) {
                    return Err(DomainError::invariant("series id does not match kind and period"));
                }
                let sequence = self
                    .highest
                    .checked_add(1)
                    .ok_or_else(|| DomainError::validation("number series exhausted"))?;

                Ok(vec![NumberSeriesEvent::NumberReserved(NumberReserved {
                    kind: cmd.kind,
                    period: cmd.period,
                    sequence,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

/// Issues document numbers.
#[derive(Debug)]
pub struct NumberingService<S, B> {
    ctx: Arc<ServiceContext<S, B>>,
}

impl<S, B> Clone for NumberingService<S, B> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<S, B> NumberingService<S, B>
where
    S: EventStore,
    B: EventBus<StoredEvent>,
{
    pub fn new(ctx: Arc<ServiceContext<S, B>>) -> Self {
        Self { ctx }
    }

    /// Next number of `kind` in the current period.
    pub fn next(&self, kind: DocumentKind) -> Result<DocumentNumber, DispatchError> {
        self.next_in(kind, Period::of(self.ctx.now()))
    }

    /// Next number of `kind` in an explicit period.
    pub fn next_in(&self, kind: DocumentKind, period: Period) -> Result<DocumentNumber, DispatchError> {
        let series_id = NumberSeries::id_for(kind, period);
        let cmd = NumberSeriesCommand::ReserveNext(ReserveNext {
            kind,
            period,
            occurred_at: self.ctx.now(),
        });

        let committed = self.ctx.dispatcher().dispatch_with_retry(
            series_id,
            SERIES_AGGREGATE_TYPE,
            &cmd,
            NumberSeries::empty,
        )?;

        let number = DocumentNumber::new(
            kind,
            period,
            committed.aggregate.highest(),
            self.ctx.config().sequence_width,
        );
        tracing::debug!(%number, "document number issued");
        Ok(number)
    }
}
