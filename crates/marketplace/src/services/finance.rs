//! Wallets, escrow and installment plans.
//!
//! Every money movement locks the wallet row, applies the core ledger rules
//! and writes the entry in the same transaction as the status change it pays
//! for.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use vide_grenier_core::finance::{
    EscrowParty, EscrowTerms, FinanceError as LedgerError, InstallmentSchedule, dispute_reason,
};
use vide_grenier_core::{
    EscrowId, EscrowStatus, InstallmentPlanId, InstallmentStatus, NotificationKind, OrderId,
    OrderStatus, StateMachine, TransitionError, UserId, WalletTransactionKind, Xaf,
};

use super::notifier::Notifier;
use crate::db::finance::FinanceRepository;
use crate::db::orders::OrderRepository;
use crate::db::{Page, RepositoryError};
use crate::models::{
    Escrow, InstallmentPayment, InstallmentPlan, Order, WalletAccount, WalletTransaction,
};

/// Largest single top-up accepted.
pub const MAX_TOP_UP: i64 = 5_000_000;

#[derive(Debug, Error)]
pub enum FinanceError {
    #[error("order not found")]
    OrderNotFound,

    #[error("escrow not found")]
    EscrowNotFound,

    #[error("installment plan not found")]
    PlanNotFound,

    #[error("only pending orders can be paid this way")]
    OrderNotPending,

    #[error("top-up must be between 1 and {MAX_TOP_UP} XAF")]
    InvalidTopUp,

    #[error("installment plan is already paid")]
    PlanCompleted,

    #[error("you are not allowed to act on this escrow")]
    Forbidden,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A plan with its scheduled payments.
#[derive(Debug, Clone, Serialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub plan: InstallmentPlan,
    pub payments: Vec<InstallmentPayment>,
}

/// Outcome of paying an installment.
#[derive(Debug, Clone, Serialize)]
pub struct InstallmentReceipt {
    pub installment: InstallmentPayment,
    pub transaction: WalletTransaction,
    pub remaining_installments: usize,
    pub plan_completed: bool,
}

/// How an admin settles a disputed escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    ReleaseToSeller,
    RefundToBuyer,
}

impl Resolution {
    /// Who is credited and how much. A release pays the seller's share of
    /// the order; commission and delivery fee stay with the platform. A
    /// refund returns the escrowed amount, the fee is kept.
    #[must_use]
    pub fn payee(self, escrow: &Escrow, seller_amount: Xaf) -> (UserId, Xaf) {
        match self {
            Self::ReleaseToSeller => (escrow.seller_id, seller_amount),
            Self::RefundToBuyer => (escrow.buyer_id, escrow.amount),
        }
    }
}

/// Installments can only be paid while the order still waits for payment.
fn check_payable(plan: &InstallmentPlan, order_status: OrderStatus) -> Result<(), FinanceError> {
    if plan.cancelled_at.is_some() || order_status != OrderStatus::Pending {
        return Err(FinanceError::OrderNotPending);
    }
    Ok(())
}

/// Finance service.
pub struct FinanceService<'a> {
    finance: FinanceRepository<'a>,
    orders: OrderRepository<'a>,
    notifier: &'a Notifier,
}

impl<'a> FinanceService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, notifier: &'a Notifier) -> Self {
        Self {
            finance: FinanceRepository::new(pool),
            orders: OrderRepository::new(pool),
            notifier,
        }
    }

    // =========================================================================
    // Wallet
    // =========================================================================

    /// The user's wallet.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::Repository` if the query fails.
    pub async fn wallet(&self, user: UserId) -> Result<WalletAccount, FinanceError> {
        Ok(self.finance.wallet(user).await?)
    }

    /// Wallet ledger, newest first.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::Repository` if the query fails.
    pub async fn transactions(
        &self,
        user: UserId,
        page: Page,
    ) -> Result<Vec<WalletTransaction>, FinanceError> {
        let wallet = self.finance.wallet(user).await?;
        Ok(self.finance.transactions(wallet.id, page).await?)
    }

    /// Credit the wallet with money collected outside the platform.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::InvalidTopUp` for amounts outside
    /// `1..=MAX_TOP_UP`.
    #[instrument(skip(self))]
    pub async fn top_up(
        &self,
        user: UserId,
        amount: Xaf,
        reference: &str,
    ) -> Result<(WalletAccount, WalletTransaction), FinanceError> {
        if !amount.is_positive() || amount > Xaf::from_francs(MAX_TOP_UP) {
            return Err(FinanceError::InvalidTopUp);
        }
        let mut tx = self.finance.begin().await?;
        let account = FinanceRepository::lock_wallet(&mut tx, user).await?;
        let mut ledger = account.ledger();
        let entry = ledger.credit(WalletTransactionKind::TopUp, amount)?;
        let transaction = FinanceRepository::post_entry(
            &mut tx,
            account.id,
            &entry,
            reference,
            "Rechargement du portefeuille",
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(user_id = %user, amount = %amount, "Wallet topped up");
        Ok((
            WalletAccount {
                balance: entry.balance_after,
                ..account
            },
            transaction,
        ))
    }

    // =========================================================================
    // Escrow
    // =========================================================================

    /// Open an escrow for one of the buyer's pending orders.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::OrderNotFound` unless `buyer` placed the order,
    /// `FinanceError::OrderNotPending`, or a conflict when the order already
    /// has an escrow.
    #[instrument(skip(self))]
    pub async fn create_escrow(
        &self,
        order: OrderId,
        buyer: UserId,
    ) -> Result<Escrow, FinanceError> {
        let order = self.buyer_order(order, buyer).await?;
        let terms = EscrowTerms::new(order.total_amount, Utc::now());
        let escrow = self
            .finance
            .create_escrow(order.id, buyer, order.seller_id, &terms)
            .await?;
        tracing::info!(escrow_id = %escrow.id, order_number = %order.order_number, "Escrow created");
        Ok(escrow)
    }

    /// Get an escrow visible to one of its parties.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::EscrowNotFound` for strangers.
    pub async fn escrow(&self, id: EscrowId, user: UserId) -> Result<Escrow, FinanceError> {
        let escrow = self.finance.escrow(id).await?.ok_or(FinanceError::EscrowNotFound)?;
        EscrowParty::of(user, escrow.buyer_id, escrow.seller_id)
            .map_err(|_| FinanceError::EscrowNotFound)?;
        Ok(escrow)
    }

    /// Fund an escrow from the buyer's wallet: amount and fee are debited and
    /// the order becomes PAID.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::Ledger` with insufficient funds, or a
    /// transition error when the escrow is not PENDING.
    #[instrument(skip(self))]
    pub async fn fund_escrow(&self, id: EscrowId, user: UserId) -> Result<Escrow, FinanceError> {
        let mut tx = self.finance.begin().await?;
        let escrow = lock_escrow(&mut tx, id).await?;
        if escrow.buyer_id != user {
            return Err(FinanceError::Forbidden);
        }
        escrow.status.transition(EscrowStatus::Funded)?;

        let account = FinanceRepository::lock_wallet(&mut tx, user).await?;
        let mut ledger = account.ledger();
        let available = ledger.available();
        let total = escrow.amount + escrow.fee;
        if total > available {
            return Err(LedgerError::InsufficientFunds {
                available,
                requested: total,
            }
            .into());
        }
        let reference = format!("ESCROW_{}", escrow.id);
        let funding = ledger.debit(WalletTransactionKind::EscrowFunding, escrow.amount)?;
        FinanceRepository::post_entry(&mut tx, account.id, &funding, &reference, "Paiement sécurisé")
            .await?;
        if escrow.fee.is_positive() {
            let fee = ledger.debit(WalletTransactionKind::EscrowFee, escrow.fee)?;
            FinanceRepository::post_entry(
                &mut tx,
                account.id,
                &fee,
                &reference,
                "Frais de paiement sécurisé",
            )
            .await?;
        }

        let escrow =
            FinanceRepository::set_escrow_status(&mut tx, escrow.id, EscrowStatus::Funded, None)
                .await?;
        OrderRepository::set_status(&mut tx, escrow.order_id, OrderStatus::Pending, OrderStatus::Paid)
            .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(escrow_id = %escrow.id, amount = %escrow.amount, "Escrow funded");
        self.notifier
            .notify(
                escrow.seller_id,
                NotificationKind::Payment,
                "Paiement sécurisé reçu",
                &format!(
                    "L'acheteur a versé {} sur un compte séquestre. Les fonds vous seront libérés à la réception.",
                    escrow.amount
                ),
                serde_json::json!({ "escrow_id": escrow.id, "order_id": escrow.order_id }),
            )
            .await;
        Ok(escrow)
    }

    /// Release escrowed funds to the seller. Only the buyer may release
    /// early.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::Forbidden` for anyone but the buyer, or a
    /// transition error when the escrow is not FUNDED.
    #[instrument(skip(self))]
    pub async fn release_escrow(&self, id: EscrowId, user: UserId) -> Result<Escrow, FinanceError> {
        self.settle(id, Some(user), Resolution::ReleaseToSeller).await
    }

    /// Open a dispute. Either party may dispute a funded escrow.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::Ledger` for an empty reason or a stranger, and
    /// a transition error when the escrow is not FUNDED.
    #[instrument(skip(self, reason))]
    pub async fn dispute_escrow(
        &self,
        id: EscrowId,
        user: UserId,
        reason: &str,
    ) -> Result<Escrow, FinanceError> {
        let reason = dispute_reason(reason)?;
        let mut tx = self.finance.begin().await?;
        let escrow = lock_escrow(&mut tx, id).await?;
        let party = EscrowParty::of(user, escrow.buyer_id, escrow.seller_id)?;
        escrow.status.transition(EscrowStatus::Disputed)?;
        let escrow = FinanceRepository::set_escrow_status(
            &mut tx,
            escrow.id,
            EscrowStatus::Disputed,
            Some((&reason, user)),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::warn!(escrow_id = %escrow.id, ?party, "Escrow disputed");
        let other = match party {
            EscrowParty::Buyer => escrow.seller_id,
            EscrowParty::Seller => escrow.buyer_id,
        };
        self.notifier
            .notify(
                other,
                NotificationKind::Payment,
                "Litige ouvert",
                &format!("Un litige a été ouvert sur un paiement sécurisé : {reason}"),
                serde_json::json!({ "escrow_id": escrow.id }),
            )
            .await;
        Ok(escrow)
    }

    /// Settle a disputed escrow on behalf of an admin.
    ///
    /// # Errors
    ///
    /// Returns a transition error unless the escrow is FUNDED or DISPUTED.
    pub async fn resolve_escrow(
        &self,
        id: EscrowId,
        resolution: Resolution,
    ) -> Result<Escrow, FinanceError> {
        self.settle(id, None, resolution).await
    }

    /// Release every funded escrow whose release date has passed.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::Repository` if the escrows cannot be listed.
    /// Individual release failures are logged and skipped.
    #[instrument(skip(self))]
    pub async fn release_due(&self, now: DateTime<Utc>) -> Result<usize, FinanceError> {
        let due = self.finance.escrows_due(now).await?;
        let mut released = 0;
        for id in due {
            match self.settle(id, None, Resolution::ReleaseToSeller).await {
                Ok(_) => released += 1,
                Err(e) => tracing::warn!(escrow_id = %id, error = %e, "Automatic escrow release failed"),
            }
        }
        Ok(released)
    }

    /// Move escrowed money to its final owner. `by` is the acting buyer, or
    /// `None` for the platform.
    async fn settle(
        &self,
        id: EscrowId,
        by: Option<UserId>,
        resolution: Resolution,
    ) -> Result<Escrow, FinanceError> {
        let mut tx = self.finance.begin().await?;
        let escrow = lock_escrow(&mut tx, id).await?;
        if let Some(user) = by {
            EscrowParty::of(user, escrow.buyer_id, escrow.seller_id)?;
            if user != escrow.buyer_id {
                return Err(FinanceError::Forbidden);
            }
        }

        let (status, kind, description) = match resolution {
            Resolution::ReleaseToSeller => (
                EscrowStatus::ReleasedToSeller,
                WalletTransactionKind::EscrowRelease,
                "Fonds libérés par le séquestre",
            ),
            Resolution::RefundToBuyer => (
                EscrowStatus::RefundedToBuyer,
                WalletTransactionKind::EscrowRefund,
                "Remboursement du séquestre",
            ),
        };
        escrow.status.transition(status)?;

        let order = OrderRepository::lock(&mut tx, escrow.order_id).await?;
        let (beneficiary, amount) = resolution.payee(&escrow, order.seller_amount);
        if amount.is_positive() {
            let account = FinanceRepository::lock_wallet(&mut tx, beneficiary).await?;
            let entry = account.ledger().credit(kind, amount)?;
            let reference = format!("ESCROW_{}", escrow.id);
            FinanceRepository::post_entry(&mut tx, account.id, &entry, &reference, description)
                .await?;
        }
        let escrow = FinanceRepository::set_escrow_status(&mut tx, escrow.id, status, None).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(
            escrow_id = %escrow.id,
            status = %status.as_str(),
            amount = %amount,
            commission = %order.commission_amount,
            "Escrow settled"
        );
        self.notifier
            .notify(
                beneficiary,
                NotificationKind::Payment,
                description,
                &format!("{amount} ont été crédités sur votre portefeuille."),
                serde_json::json!({ "escrow_id": escrow.id }),
            )
            .await;
        Ok(escrow)
    }

    // =========================================================================
    // Installments
    // =========================================================================

    /// Split a pending order into installments. A positive down payment is
    /// debited from the wallet in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::Ledger` for an invalid count or down payment or
    /// insufficient funds, and a conflict when the order already has a plan.
    #[instrument(skip(self))]
    pub async fn create_plan(
        &self,
        order: OrderId,
        buyer: UserId,
        installments: u32,
        down_payment_percent: Option<u32>,
    ) -> Result<PlanDetail, FinanceError> {
        let order = self.buyer_order(order, buyer).await?;
        let schedule = InstallmentSchedule::compute(
            order.total_amount,
            installments,
            down_payment_percent,
            Utc::now(),
        )?;

        let mut tx = self.finance.begin().await?;
        if schedule.down_payment.is_positive() {
            let account = FinanceRepository::lock_wallet(&mut tx, buyer).await?;
            let entry = account
                .ledger()
                .debit(WalletTransactionKind::InstallmentPayment, schedule.down_payment)?;
            FinanceRepository::post_entry(
                &mut tx,
                account.id,
                &entry,
                &format!("INSTALLMENT_{}", order.order_number),
                "Apport initial",
            )
            .await?;
        }
        let plan = FinanceRepository::create_plan(&mut tx, order.id, buyer, &schedule).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(plan_id = %plan.id, order_number = %order.order_number, installments, "Installment plan created");
        let payments = self.finance.installments(plan.id).await?;
        Ok(PlanDetail { plan, payments })
    }

    /// The user's plans.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::Repository` if the query fails.
    pub async fn plans(&self, user: UserId) -> Result<Vec<InstallmentPlan>, FinanceError> {
        Ok(self.finance.plans_for_user(user).await?)
    }

    /// A plan with its payments, visible to its owner only.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::PlanNotFound` for strangers.
    pub async fn plan(
        &self,
        id: InstallmentPlanId,
        user: UserId,
    ) -> Result<PlanDetail, FinanceError> {
        let plan = self
            .finance
            .plan(id)
            .await?
            .filter(|p| p.user_id == user)
            .ok_or(FinanceError::PlanNotFound)?;
        let payments = self.finance.installments(plan.id).await?;
        Ok(PlanDetail { plan, payments })
    }

    /// Pay the earliest unpaid installment from the wallet. Paying the last
    /// one marks the order PAID.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::PlanCompleted` when nothing is left,
    /// `FinanceError::OrderNotPending` once the order was cancelled or paid
    /// otherwise, and `FinanceError::Ledger` with insufficient funds.
    #[instrument(skip(self))]
    pub async fn pay_next(
        &self,
        id: InstallmentPlanId,
        user: UserId,
    ) -> Result<InstallmentReceipt, FinanceError> {
        let plan = self
            .finance
            .plan(id)
            .await?
            .filter(|p| p.user_id == user)
            .ok_or(FinanceError::PlanNotFound)?;

        let mut tx = self.finance.begin().await?;
        let order = OrderRepository::lock(&mut tx, plan.order_id).await?;
        check_payable(&plan, order.status)?;
        let installment = FinanceRepository::lock_next_installment(&mut tx, plan.id)
            .await?
            .ok_or(FinanceError::PlanCompleted)?;
        installment.status.transition(InstallmentStatus::Paid)?;

        let account = FinanceRepository::lock_wallet(&mut tx, user).await?;
        let entry = account
            .ledger()
            .debit(WalletTransactionKind::InstallmentPayment, installment.amount)?;
        let transaction = FinanceRepository::post_entry(
            &mut tx,
            account.id,
            &entry,
            &format!("INSTALLMENT_{}_{}", plan.id, installment.number),
            &format!("Versement {}/{}", installment.number, plan.number_of_installments),
        )
        .await?;
        let installment =
            FinanceRepository::mark_installment_paid(&mut tx, installment.id, plan.id).await?;

        let remaining =
            usize::try_from(plan.number_of_installments - installment.number).unwrap_or(0);
        let completed = remaining == 0;
        let order = if completed {
            Some(
                OrderRepository::set_status(&mut tx, plan.order_id, OrderStatus::Pending, OrderStatus::Paid)
                    .await?,
            )
        } else {
            None
        };
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(plan_id = %plan.id, number = installment.number, remaining, "Installment paid");
        if let Some(order) = order {
            self.notifier
                .notify(
                    order.seller_id,
                    NotificationKind::Payment,
                    "Paiement échelonné terminé",
                    &format!("La commande {} est entièrement payée.", order.order_number),
                    serde_json::json!({ "order_id": order.id }),
                )
                .await;
        }

        Ok(InstallmentReceipt {
            installment,
            transaction,
            remaining_installments: remaining,
            plan_completed: completed,
        })
    }

    /// Mark pending installments past their due date as OVERDUE.
    ///
    /// # Errors
    ///
    /// Returns `FinanceError::Repository` if the update fails.
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> Result<u64, FinanceError> {
        let count = self.finance.sweep_overdue(now).await?;
        if count > 0 {
            tracing::info!(count, "Installments marked overdue");
        }
        Ok(count)
    }

    async fn buyer_order(&self, id: OrderId, buyer: UserId) -> Result<Order, FinanceError> {
        let order = self
            .orders
            .get(id)
            .await?
            .filter(|o| o.buyer_id == Some(buyer))
            .ok_or(FinanceError::OrderNotFound)?;
        if order.status != OrderStatus::Pending {
            return Err(FinanceError::OrderNotPending);
        }
        Ok(order)
    }
}

async fn lock_escrow(conn: &mut sqlx::PgConnection, id: EscrowId) -> Result<Escrow, FinanceError> {
    FinanceRepository::lock_escrow(conn, id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => FinanceError::EscrowNotFound,
            other => FinanceError::Repository(other),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use vide_grenier_core::{EscrowId, InstallmentPlanId};

    fn escrow(amount: i64) -> Escrow {
        let now = Utc::now();
        Escrow {
            id: EscrowId::generate(),
            order_id: OrderId::generate(),
            buyer_id: UserId::generate(),
            seller_id: UserId::generate(),
            amount: Xaf::from_francs(amount),
            fee: Xaf::from_francs(amount / 50),
            status: EscrowStatus::Funded,
            auto_release_at: now,
            dispute_reason: None,
            disputed_by: None,
            funded_at: Some(now),
            released_at: None,
            created_at: now,
        }
    }

    fn plan(cancelled: bool) -> InstallmentPlan {
        InstallmentPlan {
            id: InstallmentPlanId::generate(),
            order_id: OrderId::generate(),
            user_id: UserId::generate(),
            total_amount: Xaf::from_francs(100_000),
            down_payment: Xaf::from_francs(30_000),
            remaining_amount: Xaf::from_francs(70_000),
            interest_rate: Decimal::new(5, 0),
            interest_amount: Xaf::from_francs(3_500),
            installment_amount: Xaf::from_francs(24_500),
            number_of_installments: 3,
            is_completed: false,
            cancelled_at: cancelled.then(Utc::now),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_release_pays_seller_share_not_escrowed_total() {
        // 50 000 goods + 1 500 delivery escrowed, seller nets 47 500
        let e = escrow(51_500);
        let (payee, amount) = Resolution::ReleaseToSeller.payee(&e, Xaf::from_francs(47_500));
        assert_eq!(payee, e.seller_id);
        assert_eq!(amount, Xaf::from_francs(47_500));
    }

    #[test]
    fn test_refund_returns_escrowed_amount_to_buyer() {
        let e = escrow(51_500);
        let (payee, amount) = Resolution::RefundToBuyer.payee(&e, Xaf::from_francs(47_500));
        assert_eq!(payee, e.buyer_id);
        assert_eq!(amount, Xaf::from_francs(51_500));
    }

    #[test]
    fn test_installments_only_paid_on_pending_orders() {
        assert!(check_payable(&plan(false), OrderStatus::Pending).is_ok());
        for status in [OrderStatus::Cancelled, OrderStatus::Refunded, OrderStatus::Paid] {
            assert!(matches!(
                check_payable(&plan(false), status),
                Err(FinanceError::OrderNotPending)
            ));
        }
        assert!(matches!(
            check_payable(&plan(true), OrderStatus::Pending),
            Err(FinanceError::OrderNotPending)
        ));
    }
}
