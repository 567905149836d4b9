//! Quotations domain module (event-sourced).
//!
//! The quotation status state machine, its authorization guards, and the
//! totals invariant. Stock movements triggered by transitions are orchestrated
//! in infra; this crate only records that they happened.

pub mod guard;
pub mod pricing;
pub mod quotation;

pub use guard::{Guard, GuardContext, QuotationAction, Target, Transition, transition};
pub use pricing::{NewQuotationItem, QuotationItem, Totals};
pub use quotation::{
    Accept, Approve, ApproveCancellation, CancellationDenied, CancellationRequest,
    CancellationRequested, Cancel, Complete, CompletionMethod, CreateQuotation, DenyCancellation,
    ItemsRevised, Quotation, QuotationAccepted, QuotationApproved, QuotationCancelled,
    QuotationCommand, QuotationCompleted, QuotationCreated, QuotationEvent, QuotationId,
    QuotationRejected, QuotationStatus, QuotationSubmitted, Reject, ReviseItems, Submit,
};
