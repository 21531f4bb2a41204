//! Lifecycle state machines.
//!
//! Each status enum implements [`StateMachine`]; callers never assign a
//! status directly but go through [`StateMachine::transition`], which
//! rejects edges that are not part of the lifecycle.

use crate::labeled_enum;
use crate::types::catalog::ProductSource;

/// A status change that the lifecycle does not allow.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The target equals the current status.
    #[error("{entity} is already {status}")]
    Unchanged {
        /// Entity name.
        entity: &'static str,
        /// Current status.
        status: &'static str,
    },
    /// No edge between the two statuses.
    #[error("{entity} cannot move from {from} to {to}")]
    Illegal {
        /// Entity name.
        entity: &'static str,
        /// Current status.
        from: &'static str,
        /// Requested status.
        to: &'static str,
    },
}

/// A finite lifecycle.
pub trait StateMachine: Copy + Eq + Sized {
    /// Entity name used in error messages.
    const ENTITY: &'static str;

    /// Wire label of the status.
    fn label(self) -> &'static str;

    /// Whether `self → next` is an edge of the lifecycle.
    fn can_transition_to(self, next: Self) -> bool;

    /// Whether no further transition is possible.
    fn is_terminal(self) -> bool;

    /// Validate `self → next`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Unchanged`] when `next == self` and
    /// [`TransitionError::Illegal`] when the edge does not exist.
    fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self == next {
            return Err(TransitionError::Unchanged {
                entity: Self::ENTITY,
                status: self.label(),
            });
        }
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::Illegal {
                entity: Self::ENTITY,
                from: self.label(),
                to: next.label(),
            })
        }
    }
}

labeled_enum! {
    /// Listing lifecycle.
    pub enum ProductStatus as "product_status" {
        Draft => "DRAFT",
        Pending => "PENDING",
        Active => "ACTIVE",
        Reserved => "RESERVED",
        Sold => "SOLD",
        Expired => "EXPIRED",
        Suspended => "SUSPENDED",
        Rejected => "REJECTED",
    }
}

impl ProductStatus {
    /// Like [`StateMachine::transition`], but platform stock may skip moderation
    /// and go straight from draft to active.
    ///
    /// # Errors
    ///
    /// Same as [`StateMachine::transition`].
    pub fn transition_for(
        self,
        next: Self,
        source: ProductSource,
    ) -> Result<Self, TransitionError> {
        if source == ProductSource::Admin && self == Self::Draft && next == Self::Active {
            return Ok(next);
        }
        self.transition(next)
    }

    /// Whether buyers can see and order the listing.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether the seller may still edit the listing.
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        matches!(
            self,
            Self::Draft | Self::Pending | Self::Active | Self::Rejected | Self::Expired
        )
    }
}

impl StateMachine for ProductStatus {
    const ENTITY: &'static str = "product";

    fn label(self) -> &'static str {
        self.as_str()
    }

    fn can_transition_to(self, next: Self) -> bool {
        use ProductStatus::{Active, Draft, Expired, Pending, Rejected, Reserved, Sold, Suspended};
        matches!(
            (self, next),
            (Draft, Pending)
                | (Pending, Active | Rejected)
                | (Rejected, Pending)
                | (Active, Sold | Expired | Suspended | Reserved)
                | (Reserved, Active | Sold)
                | (Suspended, Active)
                | (Expired, Pending)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Sold)
    }
}

labeled_enum! {
    /// Order lifecycle.
    pub enum OrderStatus as "order_status" {
        Pending => "PENDING",
        Paid => "PAID",
        Processing => "PROCESSING",
        Shipped => "SHIPPED",
        Delivered => "DELIVERED",
        Cancelled => "CANCELLED",
        Refunded => "REFUNDED",
    }
}

impl OrderStatus {
    /// Statuses counted as a sale by the analytics.
    pub const SALE_STATUSES: &'static [Self] =
        &[Self::Paid, Self::Processing, Self::Shipped, Self::Delivered];

    /// Whether the order counts as a realised sale.
    #[must_use]
    pub fn is_sale(&self) -> bool {
        Self::SALE_STATUSES.contains(self)
    }
}

impl StateMachine for OrderStatus {
    const ENTITY: &'static str = "order";

    fn label(self) -> &'static str {
        self.as_str()
    }

    fn can_transition_to(self, next: Self) -> bool {
        use OrderStatus::{Cancelled, Delivered, Paid, Pending, Processing, Refunded, Shipped};
        matches!(
            (self, next),
            (Pending, Paid | Cancelled)
                | (Paid, Processing | Cancelled | Refunded)
                | (Processing, Shipped | Cancelled | Refunded)
                | (Shipped, Delivered | Refunded)
                | (Delivered, Refunded)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }
}

labeled_enum! {
    /// Payment attempt lifecycle.
    pub enum PaymentStatus as "payment_status" {
        Pending => "PENDING",
        Processing => "PROCESSING",
        Completed => "COMPLETED",
        Failed => "FAILED",
        Cancelled => "CANCELLED",
        Refunded => "REFUNDED",
    }
}

impl StateMachine for PaymentStatus {
    const ENTITY: &'static str = "payment";

    fn label(self) -> &'static str {
        self.as_str()
    }

    fn can_transition_to(self, next: Self) -> bool {
        use PaymentStatus::{Cancelled, Completed, Failed, Pending, Processing, Refunded};
        matches!(
            (self, next),
            (Pending, Processing | Completed | Failed | Cancelled)
                | (Processing, Completed | Failed)
                | (Completed, Refunded)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Refunded)
    }
}

labeled_enum! {
    /// Escrow lifecycle.
    pub enum EscrowStatus as "escrow_status" {
        Pending => "PENDING",
        Funded => "FUNDED",
        ReleasedToSeller => "RELEASED_TO_SELLER",
        RefundedToBuyer => "REFUNDED_TO_BUYER",
        Disputed => "DISPUTED",
        Cancelled => "CANCELLED",
    }
}

impl StateMachine for EscrowStatus {
    const ENTITY: &'static str = "escrow";

    fn label(self) -> &'static str {
        self.as_str()
    }

    fn can_transition_to(self, next: Self) -> bool {
        use EscrowStatus::{Cancelled, Disputed, Funded, Pending, RefundedToBuyer, ReleasedToSeller};
        matches!(
            (self, next),
            (Pending, Funded | Cancelled)
                | (Funded, ReleasedToSeller | RefundedToBuyer | Disputed)
                | (Disputed, ReleasedToSeller | RefundedToBuyer)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ReleasedToSeller | Self::RefundedToBuyer | Self::Cancelled
        )
    }
}

labeled_enum! {
    /// Single installment lifecycle.
    pub enum InstallmentStatus as "installment_status" {
        Pending => "PENDING",
        Paid => "PAID",
        Overdue => "OVERDUE",
        Failed => "FAILED",
        Cancelled => "CANCELLED",
    }
}

impl StateMachine for InstallmentStatus {
    const ENTITY: &'static str = "installment";

    fn label(self) -> &'static str {
        self.as_str()
    }

    fn can_transition_to(self, next: Self) -> bool {
        use InstallmentStatus::{Cancelled, Failed, Overdue, Paid, Pending};
        matches!(
            (self, next),
            (Pending, Paid | Overdue | Failed | Cancelled) | (Overdue | Failed, Paid | Cancelled)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }
}

labeled_enum! {
    /// Staff task lifecycle.
    pub enum TaskStatus as "task_status" {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
}

impl StateMachine for TaskStatus {
    const ENTITY: &'static str = "task";

    fn label(self) -> &'static str {
        self.as_str()
    }

    fn can_transition_to(self, next: Self) -> bool {
        use TaskStatus::{Cancelled, Completed, InProgress, Pending};
        matches!(
            (self, next),
            (Pending, InProgress | Cancelled) | (InProgress, Completed | Cancelled)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

labeled_enum! {
    /// Support ticket lifecycle. WAITING means the customer spoke last,
    /// RESPONDED that support did.
    pub enum SupportStatus as "support_status" {
        Open => "OPEN",
        Waiting => "WAITING",
        Responded => "RESPONDED",
        Closed => "CLOSED",
    }
}

impl SupportStatus {
    /// Status after a new message. `None` when the ticket already has it.
    #[must_use]
    pub fn after_message(self, from_staff: bool) -> Option<Self> {
        let next = if from_staff { Self::Responded } else { Self::Waiting };
        (next != self).then_some(next)
    }
}

impl StateMachine for SupportStatus {
    const ENTITY: &'static str = "support ticket";

    fn label(self) -> &'static str {
        self.as_str()
    }

    fn can_transition_to(self, next: Self) -> bool {
        use SupportStatus::{Closed, Open, Responded, Waiting};
        matches!(
            (self, next),
            (Open, Waiting | Responded | Closed)
                | (Waiting, Responded | Closed)
                | (Responded, Waiting | Closed)
        )
    }

    fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Every edge accepted by `can_transition_to`, for exhaustive checks.
    fn edges<S: StateMachine>(all: &[S]) -> Vec<(S, S)> {
        all.iter()
            .flat_map(|&a| all.iter().map(move |&b| (a, b)))
            .filter(|&(a, b)| a.can_transition_to(b))
            .collect()
    }

    #[test]
    fn test_product_happy_path() {
        let status = ProductStatus::Draft
            .transition(ProductStatus::Pending)
            .and_then(|s| s.transition(ProductStatus::Active))
            .and_then(|s| s.transition(ProductStatus::Sold))
            .unwrap();
        assert_eq!(status, ProductStatus::Sold);
        assert!(status.is_terminal());
    }

    #[test]
    fn test_product_cannot_skip_moderation() {
        let err = ProductStatus::Draft
            .transition(ProductStatus::Active)
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                entity: "product",
                from: "DRAFT",
                to: "ACTIVE"
            }
        );
    }

    #[test]
    fn test_admin_stock_publishes_directly() {
        assert_eq!(
            ProductStatus::Draft
                .transition_for(ProductStatus::Active, ProductSource::Admin)
                .unwrap(),
            ProductStatus::Active
        );
        assert!(ProductStatus::Draft
            .transition_for(ProductStatus::Active, ProductSource::Client)
            .is_err());
    }

    #[test]
    fn test_reservation_round_trip() {
        assert!(ProductStatus::Active.can_transition_to(ProductStatus::Reserved));
        assert!(ProductStatus::Reserved.can_transition_to(ProductStatus::Active));
        assert!(ProductStatus::Reserved.can_transition_to(ProductStatus::Sold));
        assert!(!ProductStatus::Reserved.can_transition_to(ProductStatus::Expired));
    }

    #[test]
    fn test_same_state_rejected() {
        assert!(matches!(
            OrderStatus::Paid.transition(OrderStatus::Paid),
            Err(TransitionError::Unchanged { .. })
        ));
    }

    #[test]
    fn test_order_edges() {
        let expected = vec![
            (OrderStatus::Pending, OrderStatus::Paid),
            (OrderStatus::Pending, OrderStatus::Cancelled),
            (OrderStatus::Paid, OrderStatus::Processing),
            (OrderStatus::Paid, OrderStatus::Cancelled),
            (OrderStatus::Paid, OrderStatus::Refunded),
            (OrderStatus::Processing, OrderStatus::Shipped),
            (OrderStatus::Processing, OrderStatus::Cancelled),
            (OrderStatus::Processing, OrderStatus::Refunded),
            (OrderStatus::Shipped, OrderStatus::Delivered),
            (OrderStatus::Shipped, OrderStatus::Refunded),
            (OrderStatus::Delivered, OrderStatus::Refunded),
        ];
        assert_eq!(edges(OrderStatus::ALL), expected);
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for &status in OrderStatus::ALL {
            if status.is_terminal() {
                assert!(OrderStatus::ALL.iter().all(|&n| !status.can_transition_to(n)));
            }
        }
        for &status in EscrowStatus::ALL {
            if status.is_terminal() {
                assert!(EscrowStatus::ALL.iter().all(|&n| !status.can_transition_to(n)));
            }
        }
        for &status in TaskStatus::ALL {
            if status.is_terminal() {
                assert!(TaskStatus::ALL.iter().all(|&n| !status.can_transition_to(n)));
            }
        }
    }

    #[test]
    fn test_cannot_cancel_shipped_order() {
        assert!(OrderStatus::Shipped
            .transition(OrderStatus::Cancelled)
            .is_err());
    }

    #[test]
    fn test_payment_completion() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Completed));
        assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Completed));
    }

    #[test]
    fn test_escrow_dispute_resolution() {
        assert!(EscrowStatus::Funded.can_transition_to(EscrowStatus::Disputed));
        assert!(EscrowStatus::Disputed.can_transition_to(EscrowStatus::RefundedToBuyer));
        assert!(!EscrowStatus::Pending.can_transition_to(EscrowStatus::Disputed));
    }

    #[test]
    fn test_installment_late_payment() {
        assert!(InstallmentStatus::Overdue.can_transition_to(InstallmentStatus::Paid));
        assert!(!InstallmentStatus::Paid.can_transition_to(InstallmentStatus::Overdue));
        assert!(InstallmentStatus::Overdue.can_transition_to(InstallmentStatus::Cancelled));
        assert!(!InstallmentStatus::Paid.can_transition_to(InstallmentStatus::Cancelled));
    }

    #[test]
    fn test_sale_statuses() {
        assert!(OrderStatus::Shipped.is_sale());
        assert!(!OrderStatus::Pending.is_sale());
        assert!(!OrderStatus::Cancelled.is_sale());
    }

    #[test]
    fn test_support_status_follows_the_last_speaker() {
        assert_eq!(SupportStatus::Open.after_message(false), Some(SupportStatus::Waiting));
        assert_eq!(SupportStatus::Waiting.after_message(false), None);
        assert_eq!(SupportStatus::Waiting.after_message(true), Some(SupportStatus::Responded));
        assert_eq!(SupportStatus::Responded.after_message(false), Some(SupportStatus::Waiting));
        assert!(SupportStatus::Closed.is_terminal());
        assert!(SupportStatus::ALL.iter().all(|&n| !SupportStatus::Closed.can_transition_to(n)));
    }

    #[test]
    fn test_error_message() {
        let err = TaskStatus::Completed
            .transition(TaskStatus::InProgress)
            .unwrap_err();
        assert_eq!(err.to_string(), "task cannot move from COMPLETED to IN_PROGRESS");
    }
}
