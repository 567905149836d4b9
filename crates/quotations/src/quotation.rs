use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quoteflow_auth::{Actor, Permission, Role, authorize};
use quoteflow_core::{
    Aggregate, AggregateId, AggregateRoot, DocumentNumber, DomainError, UserId,
};
use quoteflow_events::Event;

use crate::guard::{GuardContext, QuotationAction, Target, transition};
use crate::pricing::{NewQuotationItem, QuotationItem, Totals};

/// Quotation identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotationId(pub AggregateId);

impl QuotationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for QuotationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Draft,
    Pending,
    Approved,
    Accepted,
    Rejected,
    CancellationRequested,
    Cancelled,
    Completed,
}

impl QuotationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QuotationStatus::Draft => "draft",
            QuotationStatus::Pending => "pending",
            QuotationStatus::Approved => "approved",
            QuotationStatus::Accepted => "accepted",
            QuotationStatus::Rejected => "rejected",
            QuotationStatus::CancellationRequested => "cancellation_requested",
            QuotationStatus::Cancelled => "cancelled",
            QuotationStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QuotationStatus::Rejected | QuotationStatus::Cancelled | QuotationStatus::Completed
        )
    }
}

impl core::fmt::Display for QuotationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a quotation became a sale.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMethod {
    Deliver,
    Convert,
}

impl CompletionMethod {
    pub fn action(self) -> QuotationAction {
        match self {
            CompletionMethod::Deliver => QuotationAction::Deliver,
            CompletionMethod::Convert => QuotationAction::Convert,
        }
    }
}

/// An open cancellation request on an approved or accepted quotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRequest {
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub previous_status: QuotationStatus,
}

/// Aggregate root: Quotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quotation {
    id: QuotationId,
    number: Option<DocumentNumber>,
    customer_id: UserId,
    created_by: UserId,
    items: Vec<QuotationItem>,
    totals: Totals,
    status: QuotationStatus,
    assigned_delivery: Option<UserId>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    rejected_by: Option<UserId>,
    rejected_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    cancelled_by: Option<UserId>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    cancellation_request: Option<CancellationRequest>,
    stock_committed: bool,
    sale_id: Option<AggregateId>,
    sale_number: Option<DocumentNumber>,
    version: u64,
    created: bool,
}

impl Quotation {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: QuotationId) -> Self {
        Self {
            id,
            number: None,
            customer_id: UserId::default(),
            created_by: UserId::default(),
            items: Vec::new(),
            totals: Totals::default(),
            status: QuotationStatus::Draft,
            assigned_delivery: None,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            cancellation_reason: None,
            cancellation_request: None,
            stock_committed: false,
            sale_id: None,
            sale_number: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> QuotationId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn number(&self) -> Option<&DocumentNumber> {
        self.number.as_ref()
    }

    pub fn customer_id(&self) -> UserId {
        self.customer_id
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn items(&self) -> &[QuotationItem] {
        &self.items
    }

    /// Lines that move stock when the quotation becomes a sale.
    pub fn positive_items(&self) -> impl Iterator<Item = &QuotationItem> {
        self.items.iter().filter(|item| item.quantity > 0)
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn status(&self) -> QuotationStatus {
        self.status
    }

    pub fn assigned_delivery(&self) -> Option<UserId> {
        self.assigned_delivery
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn rejected_by(&self) -> Option<UserId> {
        self.rejected_by
    }

    pub fn rejected_at(&self) -> Option<DateTime<Utc>> {
        self.rejected_at
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn cancelled_by(&self) -> Option<UserId> {
        self.cancelled_by
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn cancellation_request(&self) -> Option<&CancellationRequest> {
        self.cancellation_request.as_ref()
    }

    /// True once a completion moved stock out for this quotation and it has
    /// not been restored since.
    pub fn stock_committed(&self) -> bool {
        self.stock_committed
    }

    pub fn sale_id(&self) -> Option<AggregateId> {
        self.sale_id
    }

    pub fn sale_number(&self) -> Option<&DocumentNumber> {
        self.sale_number.as_ref()
    }

    fn guard_context(&self) -> GuardContext {
        GuardContext {
            created_by: self.created_by,
            customer_id: self.customer_id,
            assigned_delivery: self.assigned_delivery,
        }
    }

    /// Check that `action` is legal from the current status and that `actor`
    /// may perform it. Returns where the transition leads.
    pub fn authorize(
        &self,
        action: QuotationAction,
        actor: &Actor,
    ) -> Result<Target, DomainError> {
        self.ensure_created()?;
        let step = transition(self.status, action)
            .ok_or_else(|| DomainError::invalid_transition(self.status.as_str(), action.as_str()))?;
        step.guard.check(actor, &self.guard_context())?;
        Ok(step.target)
    }
}

impl AggregateRoot for Quotation {
    type Id = QuotationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateQuotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQuotation {
    pub quotation_id: QuotationId,
    pub quotation_number: DocumentNumber,
    pub customer_id: UserId,
    pub actor: Actor,
    pub items: Vec<NewQuotationItem>,
    pub tax_amount: i64,
    pub discount_amount: i64,
    /// Start in `draft` instead of `pending`.
    pub as_draft: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseItems (replace all lines, recompute totals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseItems {
    pub quotation_id: QuotationId,
    pub actor: Actor,
    pub items: Vec<NewQuotationItem>,
    pub tax_amount: i64,
    pub discount_amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Submit (draft -> pending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submit {
    pub quotation_id: QuotationId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approve {
    pub quotation_id: QuotationId,
    pub actor: Actor,
    pub assigned_delivery: Option<Actor>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reject {
    pub quotation_id: QuotationId,
    pub actor: Actor,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Accept (customer acknowledges an approved quotation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accept {
    pub quotation_id: QuotationId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Complete.
///
/// Issued only after the sale exists and stock was decremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complete {
    pub quotation_id: QuotationId,
    pub actor: Actor,
    pub via: CompletionMethod,
    pub sale_id: AggregateId,
    pub sale_number: DocumentNumber,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel.
///
/// Cancels outright before approval; raises a cancellation request after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub quotation_id: QuotationId,
    pub actor: Actor,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveCancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveCancellation {
    pub quotation_id: QuotationId,
    pub actor: Actor,
    /// Whether committed stock was put back. Must match `stock_committed`.
    pub stock_restored: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DenyCancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyCancellation {
    pub quotation_id: QuotationId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotationCommand {
    CreateQuotation(CreateQuotation),
    ReviseItems(ReviseItems),
    Submit(Submit),
    Approve(Approve),
    Reject(Reject),
    Accept(Accept),
    Complete(Complete),
    Cancel(Cancel),
    ApproveCancellation(ApproveCancellation),
    DenyCancellation(DenyCancellation),
}

/// Event: QuotationCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationCreated {
    pub quotation_id: QuotationId,
    pub quotation_number: DocumentNumber,
    pub customer_id: UserId,
    pub created_by: UserId,
    pub items: Vec<QuotationItem>,
    pub totals: Totals,
    pub status: QuotationStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemsRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsRevised {
    pub quotation_id: QuotationId,
    pub revised_by: UserId,
    pub items: Vec<QuotationItem>,
    pub totals: Totals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuotationSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationSubmitted {
    pub quotation_id: QuotationId,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuotationApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationApproved {
    pub quotation_id: QuotationId,
    pub approved_by: UserId,
    pub assigned_delivery: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuotationRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationRejected {
    pub quotation_id: QuotationId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuotationAccepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationAccepted {
    pub quotation_id: QuotationId,
    pub accepted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuotationCompleted. Marks stock as committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationCompleted {
    pub quotation_id: QuotationId,
    pub completed_by: UserId,
    pub via: CompletionMethod,
    pub sale_id: AggregateId,
    pub sale_number: DocumentNumber,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CancellationRequested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRequested {
    pub quotation_id: QuotationId,
    pub requested_by: UserId,
    pub reason: Option<String>,
    pub previous_status: QuotationStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CancellationDenied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationDenied {
    pub quotation_id: QuotationId,
    pub denied_by: UserId,
    pub restored_status: QuotationStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuotationCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationCancelled {
    pub quotation_id: QuotationId,
    pub cancelled_by: UserId,
    pub reason: Option<String>,
    pub stock_restored: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotationEvent {
    QuotationCreated(QuotationCreated),
    ItemsRevised(ItemsRevised),
    QuotationSubmitted(QuotationSubmitted),
    QuotationApproved(QuotationApproved),
    QuotationRejected(QuotationRejected),
    QuotationAccepted(QuotationAccepted),
    QuotationCompleted(QuotationCompleted),
    CancellationRequested(CancellationRequested),
    CancellationDenied(CancellationDenied),
    QuotationCancelled(QuotationCancelled),
}

impl Event for QuotationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QuotationEvent::QuotationCreated(_) => "quotation.created",
            QuotationEvent::ItemsRevised(_) => "quotation.revised",
            QuotationEvent::QuotationSubmitted(_) => "quotation.submitted",
            QuotationEvent::QuotationApproved(_) => "quotation.approved",
            QuotationEvent::QuotationRejected(_) => "quotation.rejected",
            QuotationEvent::QuotationAccepted(_) => "quotation.accepted",
            QuotationEvent::QuotationCompleted(_) => "quotation.completed",
            QuotationEvent::CancellationRequested(_) => "quotation.cancellation_requested",
            QuotationEvent::CancellationDenied(_) => "quotation.cancellation_denied",
            QuotationEvent::QuotationCancelled(_) => "quotation.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            QuotationEvent::QuotationCreated(e) => e.occurred_at,
            QuotationEvent::ItemsRevised(e) => e.occurred_at,
            QuotationEvent::QuotationSubmitted(e) => e.occurred_at,
            QuotationEvent::QuotationApproved(e) => e.occurred_at,
            QuotationEvent::QuotationRejected(e) => e.occurred_at,
            QuotationEvent::QuotationAccepted(e) => e.occurred_at,
            QuotationEvent::QuotationCompleted(e) => e.occurred_at,
            QuotationEvent::CancellationRequested(e) => e.occurred_at,
            QuotationEvent::CancellationDenied(e) => e.occurred_at,
            QuotationEvent::QuotationCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Quotation {
    type Command = QuotationCommand;
    type Event = QuotationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            QuotationEvent::QuotationCreated(e) => {
                self.id = e.quotation_id;
                self.number = Some(e.quotation_number.clone());
                self.customer_id = e.customer_id;
                self.created_by = e.created_by;
                self.items = e.items.clone();
                self.totals = e.totals;
                self.status = e.status;
                self.created = true;
            }
            QuotationEvent::ItemsRevised(e) => {
                self.items = e.items.clone();
                self.totals = e.totals;
            }
            QuotationEvent::QuotationSubmitted(_) => {
                self.status = QuotationStatus::Pending;
            }
            QuotationEvent::QuotationApproved(e) => {
                self.status = QuotationStatus::Approved;
                self.approved_by = Some(e.approved_by);
                self.approved_at = Some(e.occurred_at);
                self.assigned_delivery = e.assigned_delivery;
            }
            QuotationEvent::QuotationRejected(e) => {
                self.status = QuotationStatus::Rejected;
                self.rejected_by = Some(e.rejected_by);
                self.rejected_at = Some(e.occurred_at);
                self.rejection_reason = Some(e.reason.clone());
            }
            QuotationEvent::QuotationAccepted(_) => {
                self.status = QuotationStatus::Accepted;
            }
            QuotationEvent::QuotationCompleted(e) => {
                self.status = QuotationStatus::Completed;
                self.stock_committed = true;
                self.sale_id = Some(e.sale_id);
                self.sale_number = Some(e.sale_number.clone());
            }
            QuotationEvent::CancellationRequested(e) => {
                self.status = QuotationStatus::CancellationRequested;
                self.cancellation_request = Some(CancellationRequest {
                    requested_by: e.requested_by,
                    requested_at: e.occurred_at,
                    reason: e.reason.clone(),
                    previous_status: e.previous_status,
                });
            }
            QuotationEvent::CancellationDenied(e) => {
                self.status = e.restored_status;
                self.cancellation_request = None;
            }
            QuotationEvent::QuotationCancelled(e) => {
                self.status = QuotationStatus::Cancelled;
                self.cancelled_by = Some(e.cancelled_by);
                self.cancelled_at = Some(e.occurred_at);
                self.cancellation_reason = e.reason.clone();
                if e.stock_restored {
                    self.stock_committed = false;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            QuotationCommand::CreateQuotation(cmd) => self.handle_create(cmd),
            QuotationCommand::ReviseItems(cmd) => self.handle_revise(cmd),
            QuotationCommand::Submit(cmd) => self.handle_submit(cmd),
            QuotationCommand::Approve(cmd) => self.handle_approve(cmd),
            QuotationCommand::Reject(cmd) => self.handle_reject(cmd),
            QuotationCommand::Accept(cmd) => self.handle_accept(cmd),
            QuotationCommand::Complete(cmd) => self.handle_complete(cmd),
            QuotationCommand::Cancel(cmd) => self.handle_cancel(cmd),
            QuotationCommand::ApproveCancellation(cmd) => self.handle_approve_cancellation(cmd),
            QuotationCommand::DenyCancellation(cmd) => self.handle_deny_cancellation(cmd),
        }
    }
}

impl Quotation {
    fn ensure_quotation_id(&self, quotation_id: QuotationId) -> Result<(), DomainError> {
        if self.id != quotation_id {
            return Err(DomainError::invariant("quotation_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("quotation {}", self.id)));
        }
        Ok(())
    }

    fn price(
        items: &[NewQuotationItem],
        tax_amount: i64,
        discount_amount: i64,
    ) -> Result<(Vec<QuotationItem>, Totals), DomainError> {
        if items.is_empty() {
            return Err(DomainError::validation("quotation must have at least one line"));
        }
        let priced = QuotationItem::price_lines(items)?;
        let totals = Totals::compute(&priced, tax_amount, discount_amount)?;
        Ok((priced, totals))
    }

    fn handle_create(&self, cmd: &CreateQuotation) -> Result<Vec<QuotationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("quotation already exists"));
        }
        self.ensure_quotation_id(cmd.quotation_id)?;

        authorize(&cmd.actor, &Permission::QUOTATION_CREATE)?;
        if cmd.actor.has_role(Role::Customer) && cmd.actor.id != cmd.customer_id {
            return Err(DomainError::unauthorized(
                "customers may only create quotations for themselves",
            ));
        }

        let (items, totals) = Self::price(&cmd.items, cmd.tax_amount, cmd.discount_amount)?;
        let status = if cmd.as_draft {
            QuotationStatus::Draft
        } else {
            QuotationStatus::Pending
        };

        Ok(vec![QuotationEvent::QuotationCreated(QuotationCreated {
            quotation_id: cmd.quotation_id,
            quotation_number: cmd.quotation_number.clone(),
            customer_id: cmd.customer_id,
            created_by: cmd.actor.id,
            items,
            totals,
            status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseItems) -> Result<Vec<QuotationEvent>, DomainError> {
        self.ensure_quotation_id(cmd.quotation_id)?;
        self.authorize(QuotationAction::Revise, &cmd.actor)?;

        let (items, totals) = Self::price(&cmd.items, cmd.tax_amount, cmd.discount_amount)?;

        Ok(vec![QuotationEvent::ItemsRevised(ItemsRevised {
            quotation_id: cmd.quotation_id,
            revised_by: cmd.actor.id,
            items,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &Submit) -> Result<Vec<QuotationEvent>, DomainError> {
        self.ensure_quotation_id(cmd.quotation_id)?;
        self.authorize(QuotationAction::Submit, &cmd.actor)?;

        Ok(vec![QuotationEvent::QuotationSubmitted(QuotationSubmitted {
            quotation_id: cmd.quotation_id,
            submitted_by: cmd.actor.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &Approve) -> Result<Vec<QuotationEvent>, DomainError> {
        self.ensure_quotation_id(cmd.quotation_id)?;
        self.authorize(QuotationAction::Approve, &cmd.actor)?;

        if let Some(assignee) = &cmd.assigned_delivery {
            if !assignee.has_role(Role::Delivery) {
                return Err(DomainError::validation(format!(
                    "assigned delivery actor has role '{}', expected 'delivery'",
                    assignee.role.as_str()
                )));
            }
        }

        Ok(vec![QuotationEvent::QuotationApproved(QuotationApproved {
            quotation_id: cmd.quotation_id,
            approved_by: cmd.actor.id,
            assigned_delivery: cmd.assigned_delivery.map(|a| a.id),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &Reject) -> Result<Vec<QuotationEvent>, DomainError> {
        self.ensure_quotation_id(cmd.quotation_id)?;
        self.authorize(QuotationAction::Reject, &cmd.actor)?;

        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("rejection reason cannot be empty"));
        }

        Ok(vec![QuotationEvent::QuotationRejected(QuotationRejected {
            quotation_id: cmd.quotation_id,
            rejected_by: cmd.actor.id,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &Accept) -> Result<Vec<QuotationEvent>, DomainError> {
        self.ensure_quotation_id(cmd.quotation_id)?;
        self.authorize(QuotationAction::Accept, &cmd.actor)?;

        Ok(vec![QuotationEvent::QuotationAccepted(QuotationAccepted {
            quotation_id: cmd.quotation_id,
            accepted_by: cmd.actor.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &Complete) -> Result<Vec<QuotationEvent>, DomainError> {
        self.ensure_quotation_id(cmd.quotation_id)?;
        self.authorize(cmd.via.action(), &cmd.actor)?;

        if self.sale_id.is_some() {
            return Err(DomainError::conflict("quotation already has a sale"));
        }
        if self.positive_items().next().is_none() {
            return Err(DomainError::validation("quotation has no line with a positive quantity"));
        }

        Ok(vec![QuotationEvent::QuotationCompleted(QuotationCompleted {
            quotation_id: cmd.quotation_id,
            completed_by: cmd.actor.id,
            via: cmd.via,
            sale_id: cmd.sale_id,
            sale_number: cmd.sale_number.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> Result<Vec<QuotationEvent>, DomainError> {
        self.ensure_quotation_id(cmd.quotation_id)?;
        let target = self.authorize(QuotationAction::Cancel, &cmd.actor)?;
        let reason = cmd
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        match target {
            Target::To(QuotationStatus::CancellationRequested) => {
                Ok(vec![QuotationEvent::CancellationRequested(CancellationRequested {
                    quotation_id: cmd.quotation_id,
                    requested_by: cmd.actor.id,
                    reason,
                    previous_status: self.status,
                    occurred_at: cmd.occurred_at,
                })])
            }
            _ => Ok(vec![QuotationEvent::QuotationCancelled(QuotationCancelled {
                quotation_id: cmd.quotation_id,
                cancelled_by: cmd.actor.id,
                reason,
                stock_restored: false,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_approve_cancellation(
        &self,
        cmd: &ApproveCancellation,
    ) -> Result<Vec<QuotationEvent>, DomainError> {
        self.ensure_quotation_id(cmd.quotation_id)?;
        self.authorize(QuotationAction::ApproveCancellation, &cmd.actor)?;

        if cmd.stock_restored != self.stock_committed {
            return Err(DomainError::invariant(if self.stock_committed {
                "committed stock must be restored before cancelling"
            } else {
                "no stock was committed for this quotation"
            }));
        }

        let reason = self
            .cancellation_request
            .as_ref()
            .and_then(|r| r.reason.clone());

        Ok(vec![QuotationEvent::QuotationCancelled(QuotationCancelled {
            quotation_id: cmd.quotation_id,
            cancelled_by: cmd.actor.id,
            reason,
            stock_restored: cmd.stock_restored,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deny_cancellation(
        &self,
        cmd: &DenyCancellation,
    ) -> Result<Vec<QuotationEvent>, DomainError> {
        self.ensure_quotation_id(cmd.quotation_id)?;
        self.authorize(QuotationAction::DenyCancellation, &cmd.actor)?;

        let restored_status = self
            .cancellation_request
            .as_ref()
            .map(|r| r.previous_status)
            .ok_or_else(|| DomainError::invariant("cancellation request is missing"))?;

        Ok(vec![QuotationEvent::CancellationDenied(CancellationDenied {
            quotation_id: cmd.quotation_id,
            denied_by: cmd.actor.id,
            restored_status,
            occurred_at: cmd.occurred_at,
        })])
    }
}
