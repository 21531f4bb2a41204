//! Wallet, escrow, installment and payout persistence.
//!
//! Balance arithmetic lives in `vide_grenier_core::finance`; the methods here
//! lock rows and write the results. Multi-step operations take a
//! `&mut PgConnection` so the caller can run them inside one transaction.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::instrument;

use vide_grenier_core::finance::{
    EscrowTerms, EscrowUnwind, InstallmentSchedule, LedgerEntry, plan_refund,
};
use vide_grenier_core::{
    EscrowId, EscrowStatus, InstallmentPaymentId, InstallmentPlanId, InstallmentStatus, OrderId,
    PaymentStatus, UserId, WalletId, WalletTransactionId, WalletTransactionKind, Xaf,
};

use super::{Page, RepositoryError};
use crate::models::{Escrow, InstallmentPayment, InstallmentPlan, WalletAccount, WalletTransaction};

const WALLET_COLUMNS: &str = "id, user_id, balance, pending_balance, updated_at";
const TRANSACTION_COLUMNS: &str =
    "id, wallet_id, kind, amount, balance_after, reference, description, status, created_at";
const ESCROW_COLUMNS: &str = "id, order_id, buyer_id, seller_id, amount, fee, status, \
     auto_release_at, dispute_reason, disputed_by, funded_at, released_at, created_at";
const PLAN_COLUMNS: &str = "id, order_id, user_id, total_amount, down_payment, remaining_amount, \
     interest_rate, interest_amount, installment_amount, number_of_installments, is_completed, \
     cancelled_at, created_at";
const INSTALLMENT_COLUMNS: &str = "id, plan_id, number, amount, due_date, status, paid_at";

/// Repository for money held on the platform.
pub struct FinanceRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> FinanceRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Start a transaction for a multi-step operation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if no connection is available.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, RepositoryError> {
        Ok(self.pool.begin().await?)
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// The user's wallet, created empty on first access.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn wallet(&self, user: UserId) -> Result<WalletAccount, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::ensure_wallet(&mut conn, user).await
    }

    async fn ensure_wallet(
        conn: &mut PgConnection,
        user: UserId,
    ) -> Result<WalletAccount, RepositoryError> {
        let sql = format!(
            "INSERT INTO wallets (id, user_id) VALUES ($1, $2)
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
             RETURNING {WALLET_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, WalletAccount>(&sql)
            .bind(WalletId::generate())
            .bind(user)
            .fetch_one(conn)
            .await?)
    }

    /// Lock the user's wallet row for the rest of the transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_wallet(
        conn: &mut PgConnection,
        user: UserId,
    ) -> Result<WalletAccount, RepositoryError> {
        Self::ensure_wallet(&mut *conn, user).await?;
        let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1 FOR UPDATE");
        Ok(sqlx::query_as::<_, WalletAccount>(&sql)
            .bind(user)
            .fetch_one(conn)
            .await?)
    }

    /// Persist a ledger entry computed by the core wallet rules: store the
    /// new balance and append the transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn post_entry(
        conn: &mut PgConnection,
        wallet: WalletId,
        entry: &LedgerEntry,
        reference: &str,
        description: &str,
    ) -> Result<WalletTransaction, RepositoryError> {
        sqlx::query("UPDATE wallets SET balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(wallet)
            .bind(entry.balance_after)
            .execute(&mut *conn)
            .await?;

        let sql = format!(
            "INSERT INTO wallet_transactions (id, wallet_id, kind, amount, balance_after,
                                              reference, description, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {TRANSACTION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, WalletTransaction>(&sql)
            .bind(WalletTransactionId::generate())
            .bind(wallet)
            .bind(entry.kind)
            .bind(entry.amount)
            .bind(entry.balance_after)
            .bind(reference)
            .bind(description)
            .bind(PaymentStatus::Completed)
            .fetch_one(conn)
            .await?)
    }

    /// Ledger of a wallet, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn transactions(
        &self,
        wallet: WalletId,
        page: Page,
    ) -> Result<Vec<WalletTransaction>, RepositoryError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE wallet_id = $1
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        Ok(sqlx::query_as::<_, WalletTransaction>(&sql)
            .bind(wallet)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?)
    }

    // =========================================================================
    // Escrow
    // =========================================================================

    /// Open an escrow for an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order already has one.
    #[instrument(skip(self, terms))]
    pub async fn create_escrow(
        &self,
        order: OrderId,
        buyer: UserId,
        seller: UserId,
        terms: &EscrowTerms,
    ) -> Result<Escrow, RepositoryError> {
        let sql = format!(
            "INSERT INTO escrow_payments (id, order_id, buyer_id, seller_id, amount, fee,
                                          auto_release_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {ESCROW_COLUMNS}"
        );
        sqlx::query_as::<_, Escrow>(&sql)
            .bind(EscrowId::generate())
            .bind(order)
            .bind(buyer)
            .bind(seller)
            .bind(terms.amount)
            .bind(terms.fee)
            .bind(terms.auto_release_at)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "escrow for this order"))
    }

    /// Get an escrow by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn escrow(&self, id: EscrowId) -> Result<Option<Escrow>, RepositoryError> {
        let sql = format!("SELECT {ESCROW_COLUMNS} FROM escrow_payments WHERE id = $1");
        Ok(sqlx::query_as::<_, Escrow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Lock an escrow row for the rest of the transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the escrow does not exist.
    pub async fn lock_escrow(
        conn: &mut PgConnection,
        id: EscrowId,
    ) -> Result<Escrow, RepositoryError> {
        let sql = format!("SELECT {ESCROW_COLUMNS} FROM escrow_payments WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Escrow>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Store an escrow status already validated by the escrow lifecycle.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_escrow_status(
        conn: &mut PgConnection,
        id: EscrowId,
        status: EscrowStatus,
        dispute: Option<(&str, UserId)>,
    ) -> Result<Escrow, RepositoryError> {
        let sql = format!(
            "UPDATE escrow_payments SET status = $2,
                funded_at = CASE WHEN $2 = 'funded'::escrow_status THEN NOW() ELSE funded_at END,
                released_at = CASE WHEN $2 IN ('released_to_seller'::escrow_status,
                                               'refunded_to_buyer'::escrow_status)
                                   THEN NOW() ELSE released_at END,
                dispute_reason = COALESCE($3, dispute_reason),
                disputed_by = COALESCE($4, disputed_by)
             WHERE id = $1
             RETURNING {ESCROW_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Escrow>(&sql)
            .bind(id)
            .bind(status)
            .bind(dispute.map(|(reason, _)| reason))
            .bind(dispute.map(|(_, by)| by))
            .fetch_one(conn)
            .await?)
    }

    /// Funded escrows whose automatic release date has passed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn escrows_due(&self, now: DateTime<Utc>) -> Result<Vec<EscrowId>, RepositoryError> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM escrow_payments WHERE status = 'funded' AND auto_release_at <= $1",
        )
        .bind(now)
        .fetch_all(self.pool)
        .await?)
    }

    // =========================================================================
    // Installments
    // =========================================================================

    /// Store a plan and its scheduled payments.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order already has a plan.
    #[instrument(skip(conn, schedule))]
    pub async fn create_plan(
        conn: &mut PgConnection,
        order: OrderId,
        user: UserId,
        schedule: &InstallmentSchedule,
    ) -> Result<InstallmentPlan, RepositoryError> {
        let count = i32::try_from(schedule.payments.len())
            .map_err(|_| RepositoryError::DataCorruption("too many installments".to_owned()))?;

        let sql = format!(
            "INSERT INTO installment_plans (id, order_id, user_id, total_amount, down_payment,
                                            remaining_amount, interest_rate, interest_amount,
                                            installment_amount, number_of_installments)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {PLAN_COLUMNS}"
        );
        let plan = sqlx::query_as::<_, InstallmentPlan>(&sql)
            .bind(InstallmentPlanId::generate())
            .bind(order)
            .bind(user)
            .bind(schedule.total_amount)
            .bind(schedule.down_payment)
            .bind(schedule.remaining_amount)
            .bind(schedule.interest_rate)
            .bind(schedule.interest_amount)
            .bind(schedule.installment_amount)
            .bind(count)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "installment plan for this order"))?;

        for payment in &schedule.payments {
            sqlx::query(
                "INSERT INTO installment_payments (id, plan_id, number, amount, due_date)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(InstallmentPaymentId::generate())
            .bind(plan.id)
            .bind(i32::try_from(payment.number).unwrap_or(i32::MAX))
            .bind(payment.amount)
            .bind(payment.due_date)
            .execute(&mut *conn)
            .await?;
        }

        Ok(plan)
    }

    /// Get a plan by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn plan(
        &self,
        id: InstallmentPlanId,
    ) -> Result<Option<InstallmentPlan>, RepositoryError> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM installment_plans WHERE id = $1");
        Ok(sqlx::query_as::<_, InstallmentPlan>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// A user's plans, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn plans_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<InstallmentPlan>, RepositoryError> {
        let sql = format!(
            "SELECT {PLAN_COLUMNS} FROM installment_plans WHERE user_id = $1
             ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, InstallmentPlan>(&sql)
            .bind(user)
            .fetch_all(self.pool)
            .await?)
    }

    /// Scheduled payments of a plan, in order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn installments(
        &self,
        plan: InstallmentPlanId,
    ) -> Result<Vec<InstallmentPayment>, RepositoryError> {
        let sql = format!(
            "SELECT {INSTALLMENT_COLUMNS} FROM installment_payments WHERE plan_id = $1
             ORDER BY number"
        );
        Ok(sqlx::query_as::<_, InstallmentPayment>(&sql)
            .bind(plan)
            .fetch_all(self.pool)
            .await?)
    }

    /// Lock the earliest unpaid installment of a plan.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_next_installment(
        conn: &mut PgConnection,
        plan: InstallmentPlanId,
    ) -> Result<Option<InstallmentPayment>, RepositoryError> {
        let sql = format!(
            "SELECT {INSTALLMENT_COLUMNS} FROM installment_payments
             WHERE plan_id = $1 AND status NOT IN ('paid', 'cancelled')
             ORDER BY number LIMIT 1 FOR UPDATE"
        );
        Ok(sqlx::query_as::<_, InstallmentPayment>(&sql)
            .bind(plan)
            .fetch_optional(conn)
            .await?)
    }

    /// Mark an installment paid and close the plan when nothing is left.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_installment_paid(
        conn: &mut PgConnection,
        id: InstallmentPaymentId,
        plan: InstallmentPlanId,
    ) -> Result<InstallmentPayment, RepositoryError> {
        let sql = format!(
            "UPDATE installment_payments SET status = 'paid', paid_at = NOW() WHERE id = $1
             RETURNING {INSTALLMENT_COLUMNS}"
        );
        let payment = sqlx::query_as::<_, InstallmentPayment>(&sql)
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;

        sqlx::query(
            "UPDATE installment_plans SET is_completed = NOT EXISTS (
                SELECT 1 FROM installment_payments WHERE plan_id = $1 AND status <> 'paid'
             ) WHERE id = $1",
        )
        .bind(plan)
        .execute(conn)
        .await?;

        Ok(payment)
    }

    /// Mark pending installments past their due date as overdue.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE installment_payments SET status = $2 WHERE status = $3 AND due_date < $1",
        )
        .bind(now)
        .bind(InstallmentStatus::Overdue)
        .bind(InstallmentStatus::Pending)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Cancelled orders
    // =========================================================================

    /// Give the buyer back what they paid towards a cancelled or refunded
    /// order, inside the caller's transaction:
    ///
    /// - PENDING escrow → CANCELLED
    /// - FUNDED or DISPUTED escrow → amount and fee refunded, REFUNDED_TO_BUYER
    /// - open installment plan → down payment and paid installments
    ///   refunded, remaining installments CANCELLED
    ///
    /// Returns the total credited back.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(conn))]
    pub async fn unwind_order(
        conn: &mut PgConnection,
        order: OrderId,
    ) -> Result<Xaf, RepositoryError> {
        let mut refunded = Xaf::ZERO;

        let sql =
            format!("SELECT {ESCROW_COLUMNS} FROM escrow_payments WHERE order_id = $1 FOR UPDATE");
        let escrow = sqlx::query_as::<_, Escrow>(&sql)
            .bind(order)
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(escrow) = escrow {
            let unwind = EscrowUnwind::for_escrow(escrow.status, escrow.amount, escrow.fee);
            if let EscrowUnwind::Refund(amount) = unwind {
                Self::refund(
                    &mut *conn,
                    escrow.buyer_id,
                    WalletTransactionKind::EscrowRefund,
                    amount,
                    &format!("ESCROW_{}", escrow.id),
                    "Remboursement du séquestre, commande annulée",
                )
                .await?;
                refunded += amount;
            }
            if let Some(status) = unwind.next_status() {
                Self::set_escrow_status(&mut *conn, escrow.id, status, None).await?;
            }
        }

        let sql = format!(
            "SELECT {PLAN_COLUMNS} FROM installment_plans
             WHERE order_id = $1 AND cancelled_at IS NULL FOR UPDATE"
        );
        let plan = sqlx::query_as::<_, InstallmentPlan>(&sql)
            .bind(order)
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(plan) = plan {
            let payments = sqlx::query_as::<_, (InstallmentStatus, Xaf)>(
                "SELECT status, amount FROM installment_payments WHERE plan_id = $1",
            )
            .bind(plan.id)
            .fetch_all(&mut *conn)
            .await?;
            let amount = plan_refund(plan.down_payment, &payments);
            if amount.is_positive() {
                Self::refund(
                    &mut *conn,
                    plan.user_id,
                    WalletTransactionKind::Refund,
                    amount,
                    &format!("INSTALLMENT_{}", plan.id),
                    "Remboursement du paiement échelonné",
                )
                .await?;
                refunded += amount;
            }
            sqlx::query(
                "UPDATE installment_payments SET status = 'cancelled'
                 WHERE plan_id = $1 AND status <> 'paid'",
            )
            .bind(plan.id)
            .execute(&mut *conn)
            .await?;
            sqlx::query("UPDATE installment_plans SET cancelled_at = NOW() WHERE id = $1")
                .bind(plan.id)
                .execute(&mut *conn)
                .await?;
        }

        Ok(refunded)
    }

    async fn refund(
        conn: &mut PgConnection,
        user: UserId,
        kind: WalletTransactionKind,
        amount: Xaf,
        reference: &str,
        description: &str,
    ) -> Result<(), RepositoryError> {
        let account = Self::lock_wallet(&mut *conn, user).await?;
        let entry = account
            .ledger()
            .credit(kind, amount)
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        Self::post_entry(conn, account.id, &entry, reference, description).await?;
        Ok(())
    }

    // =========================================================================
    // Payouts
    // =========================================================================

    /// Total already paid out, per seller.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn paid_out(&self) -> Result<Vec<(UserId, Xaf)>, RepositoryError> {
        Ok(sqlx::query_as::<_, (UserId, Xaf)>(
            "SELECT seller_id, SUM(amount) FROM payouts GROUP BY seller_id",
        )
        .fetch_all(self.pool)
        .await?)
    }

    /// Serialize payouts to one seller until the transaction ends.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_payouts(
        conn: &mut PgConnection,
        seller: UserId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('payout:' || $1::text))")
            .bind(seller)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Total already paid out to one seller.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn paid_out_to(
        conn: &mut PgConnection,
        seller: UserId,
    ) -> Result<Xaf, RepositoryError> {
        Ok(sqlx::query_scalar::<_, Xaf>(
            "SELECT COALESCE(SUM(amount), 0) FROM payouts WHERE seller_id = $1",
        )
        .bind(seller)
        .fetch_one(conn)
        .await?)
    }

    /// Record money sent to a seller. Callers hold [`Self::lock_payouts`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record_payout(
        conn: &mut PgConnection,
        seller: UserId,
        amount: Xaf,
    ) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO payouts (id, seller_id, amount) VALUES ($1, $2, $3)")
            .bind(uuid::Uuid::new_v4())
            .bind(seller)
            .bind(amount)
            .execute(conn)
            .await?;
        Ok(())
    }
}
