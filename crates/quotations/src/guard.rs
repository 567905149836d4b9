//! Transition table and authorization guards.
//!
//! Every legal `(status, action)` pair maps to exactly one [`Transition`]; a
//! missing entry is an invalid transition. Legality is decided before the
//! guard runs, so terminal statuses report `InvalidTransition` to every actor.

use serde::{Deserialize, Serialize};

use quoteflow_auth::{Actor, Permission, authorize};
use quoteflow_core::{DomainError, UserId};

use crate::QuotationStatus;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationAction {
    Submit,
    Revise,
    Approve,
    Reject,
    Accept,
    Deliver,
    Convert,
    Cancel,
    ApproveCancellation,
    DenyCancellation,
}

impl QuotationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            QuotationAction::Submit => "submit",
            QuotationAction::Revise => "revise",
            QuotationAction::Approve => "approve",
            QuotationAction::Reject => "reject",
            QuotationAction::Accept => "accept",
            QuotationAction::Deliver => "deliver",
            QuotationAction::Convert => "convert",
            QuotationAction::Cancel => "cancel",
            QuotationAction::ApproveCancellation => "approve cancellation",
            QuotationAction::DenyCancellation => "deny cancellation",
        }
    }
}

/// Who a guard is evaluated against.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GuardContext {
    pub created_by: UserId,
    pub customer_id: UserId,
    pub assigned_delivery: Option<UserId>,
}

/// Required capability for a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// The actor's role must grant the permission.
    Permission(Permission),
    /// The creator, or anyone whose role grants the permission.
    CreatorOr(Permission),
    /// Only the creator.
    Creator,
    /// The quotation's own customer, holding the permission.
    Customer(Permission),
    /// A role granting the permission; when a delivery actor is assigned,
    /// only that actor.
    AssignedDelivery(Permission),
}

impl Guard {
    pub fn check(&self, actor: &Actor, ctx: &GuardContext) -> Result<(), DomainError> {
        match self {
            Guard::Permission(p) => Ok(authorize(actor, p)?),
            Guard::CreatorOr(p) => {
                if actor.id == ctx.created_by {
                    Ok(())
                } else {
                    Ok(authorize(actor, p)?)
                }
            }
            Guard::Creator => {
                if actor.id == ctx.created_by {
                    Ok(())
                } else {
                    Err(DomainError::unauthorized("only the creator may do this"))
                }
            }
            Guard::Customer(p) => {
                authorize(actor, p)?;
                if actor.id != ctx.customer_id {
                    return Err(DomainError::unauthorized(
                        "only the quotation's customer may do this",
                    ));
                }
                Ok(())
            }
            Guard::AssignedDelivery(p) => {
                authorize(actor, p)?;
                match ctx.assigned_delivery {
                    Some(assignee) if assignee != actor.id => Err(DomainError::unauthorized(
                        "quotation is assigned to another delivery actor",
                    )),
                    _ => Ok(()),
                }
            }
        }
    }
}

/// Where a transition leads.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Target {
    To(QuotationStatus),
    /// Status unchanged (edits).
    Same,
    /// Back to the status a cancellation request was raised from.
    Previous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub target: Target,
    pub guard: Guard,
}

/// The quotation state machine.
pub fn transition(from: QuotationStatus, action: QuotationAction) -> Option<Transition> {
    use QuotationAction as A;
    use QuotationStatus as S;

    let (target, guard) = match (from, action) {
        (S::Draft, A::Submit) => (Target::To(S::Pending), Guard::Creator),
        (S::Draft | S::Pending, A::Revise) => {
            (Target::Same, Guard::CreatorOr(Permission::QUOTATION_MANAGE_ANY))
        }
        (S::Draft | S::Pending, A::Approve) => {
            (Target::To(S::Approved), Guard::Permission(Permission::QUOTATION_APPROVE))
        }
        (S::Draft | S::Pending, A::Reject) => {
            (Target::To(S::Rejected), Guard::Permission(Permission::QUOTATION_REJECT))
        }
        (S::Approved, A::Accept) => {
            (Target::To(S::Accepted), Guard::Customer(Permission::QUOTATION_CONVERT))
        }
        (S::Approved | S::Accepted, A::Deliver) => (
            Target::To(S::Completed),
            Guard::AssignedDelivery(Permission::QUOTATION_DELIVER),
        ),
        (S::Approved | S::Accepted, A::Convert) => {
            (Target::To(S::Completed), Guard::Customer(Permission::QUOTATION_CONVERT))
        }
        (S::Draft | S::Pending, A::Cancel) => (
            Target::To(S::Cancelled),
            Guard::CreatorOr(Permission::QUOTATION_MANAGE_ANY),
        ),
        (S::Approved | S::Accepted, A::Cancel) => (
            Target::To(S::CancellationRequested),
            Guard::CreatorOr(Permission::QUOTATION_MANAGE_ANY),
        ),
        (S::CancellationRequested, A::ApproveCancellation) => (
            Target::To(S::Cancelled),
            Guard::Permission(Permission::CANCELLATION_REVIEW),
        ),
        (S::CancellationRequested, A::DenyCancellation) => {
            (Target::Previous, Guard::Permission(Permission::CANCELLATION_REVIEW))
        }
        _ => return None,
    };

    Some(Transition { target, guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ACTIONS: [QuotationAction; 10] = [
        QuotationAction::Submit,
        QuotationAction::Revise,
        QuotationAction::Approve,
        QuotationAction::Reject,
        QuotationAction::Accept,
        QuotationAction::Deliver,
        QuotationAction::Convert,
        QuotationAction::Cancel,
        QuotationAction::ApproveCancellation,
        QuotationAction::DenyCancellation,
    ];

    fn ctx(created_by: UserId) -> GuardContext {
        GuardContext {
            created_by,
            customer_id: created_by,
            assigned_delivery: None,
        }
    }

    #[test]
    fn terminal_statuses_have_no_transitions() {
        for status in [
            QuotationStatus::Completed,
            QuotationStatus::Cancelled,
            QuotationStatus::Rejected,
        ] {
            for action in ALL_ACTIONS {
                assert!(transition(status, action).is_none(), "{status:?} / {action:?}");
            }
        }
    }

    #[test]
    fn cancel_target_depends_on_whether_quotation_was_approved() {
        let from_pending = transition(QuotationStatus::Pending, QuotationAction::Cancel).unwrap();
        let from_approved = transition(QuotationStatus::Approved, QuotationAction::Cancel).unwrap();

        assert_eq!(from_pending.target, Target::To(QuotationStatus::Cancelled));
        assert_eq!(
            from_approved.target,
            Target::To(QuotationStatus::CancellationRequested)
        );
    }

    #[test]
    fn creator_or_permission_lets_owner_and_admin_through() {
        let owner = Actor::customer(UserId::new());
        let guard = Guard::CreatorOr(Permission::QUOTATION_MANAGE_ANY);

        assert!(guard.check(&owner, &ctx(owner.id)).is_ok());
        assert!(guard.check(&Actor::admin(UserId::new()), &ctx(owner.id)).is_ok());
        assert!(guard.check(&Actor::customer(UserId::new()), &ctx(owner.id)).is_err());
    }

    #[test]
    fn assigned_delivery_guard_pins_the_assignee() {
        let assignee = Actor::delivery(UserId::new());
        let other = Actor::delivery(UserId::new());
        let guard = Guard::AssignedDelivery(Permission::QUOTATION_DELIVER);
        let mut context = ctx(UserId::new());

        assert!(guard.check(&other, &context).is_ok());

        context.assigned_delivery = Some(assignee.id);
        assert!(guard.check(&assignee, &context).is_ok());
        assert!(matches!(
            guard.check(&other, &context).unwrap_err(),
            DomainError::Unauthorized(_)
        ));
    }

    #[test]
    fn convert_requires_the_quotations_own_customer() {
        let customer = Actor::customer(UserId::new());
        let guard = Guard::Customer(Permission::QUOTATION_CONVERT);

        assert!(guard.check(&customer, &ctx(customer.id)).is_ok());
        assert!(guard.check(&Actor::customer(UserId::new()), &ctx(customer.id)).is_err());
        assert!(guard.check(&Actor::admin(customer.id), &ctx(customer.id)).is_err());
    }
}
