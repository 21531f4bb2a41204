//! Payment repository.

use sqlx::PgPool;
use tracing::instrument;

use vide_grenier_core::{OrderId, OrderStatus, PaymentId, PaymentMethod, PaymentStatus, Xaf};

use super::RepositoryError;
use super::finance::FinanceRepository;
use super::orders::OrderRepository;
use crate::models::Payment;

const PAYMENT_COLUMNS: &str = "id, order_id, reference, method, amount, status, provider, \
     provider_reference, provider_response, completed_at, created_at";

/// Fields of a payment attempt.
#[derive(Debug, Clone)]
pub struct NewPayment<'a> {
    pub order_id: OrderId,
    pub reference: &'a str,
    pub method: PaymentMethod,
    pub amount: Xaf,
    pub status: PaymentStatus,
    pub provider: &'a str,
    pub provider_reference: Option<&'a str>,
    pub provider_response: &'a serde_json::Value,
}

/// Repository for payments.
pub struct PaymentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PaymentRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a payment attempt.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the reference is taken.
    #[instrument(skip(self, new), fields(reference = new.reference))]
    pub async fn create(&self, new: &NewPayment<'_>) -> Result<Payment, RepositoryError> {
        let sql = format!(
            "INSERT INTO payments (id, order_id, reference, method, amount, status, provider,
                                   provider_reference, provider_response, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                     CASE WHEN $6 = 'completed'::payment_status THEN NOW() END)
             RETURNING {PAYMENT_COLUMNS}"
        );
        sqlx::query_as::<_, Payment>(&sql)
            .bind(PaymentId::generate())
            .bind(new.order_id)
            .bind(new.reference)
            .bind(new.method)
            .bind(new.amount)
            .bind(new.status)
            .bind(new.provider)
            .bind(new.provider_reference)
            .bind(new.provider_response)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "payment reference"))
    }

    /// Get a payment by its public reference.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1");
        Ok(sqlx::query_as::<_, Payment>(&sql)
            .bind(reference)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Get a payment by the provider's transaction reference.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_provider_reference(
        &self,
        provider_reference: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider_reference = $1");
        Ok(sqlx::query_as::<_, Payment>(&sql)
            .bind(provider_reference)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Payments of an order, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_order(&self, order: OrderId) -> Result<Vec<Payment>, RepositoryError> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Payment>(&sql)
            .bind(order)
            .fetch_all(self.pool)
            .await?)
    }

    /// Settle a payment: store the final status and provider response and,
    /// on success, move a pending order to PAID. A failed payment cancels a
    /// pending order and releases its product.
    ///
    /// Both writes share one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the payment was settled concurrently.
    #[instrument(skip(self, provider_response))]
    pub async fn settle(
        &self,
        id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
        provider_response: &serde_json::Value,
    ) -> Result<Payment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE payments SET status = $3,
                provider_response = provider_response || $4,
                completed_at = CASE WHEN $3 = 'completed'::payment_status THEN NOW()
                                    ELSE completed_at END,
                updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {PAYMENT_COLUMNS}"
        );
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .bind(provider_response)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::Conflict(format!("payment {id} status changed")))?;

        let status: Option<OrderStatus> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(payment.order_id)
                .fetch_optional(&mut *tx)
                .await?;

        if status == Some(OrderStatus::Pending) {
            match to {
                PaymentStatus::Completed => {
                    OrderRepository::set_status(
                        &mut tx,
                        payment.order_id,
                        OrderStatus::Pending,
                        OrderStatus::Paid,
                    )
                    .await?;
                }
                PaymentStatus::Failed => {
                    let order = OrderRepository::set_status(
                        &mut tx,
                        payment.order_id,
                        OrderStatus::Pending,
                        OrderStatus::Cancelled,
                    )
                    .await?;
                    sqlx::query(
                        "UPDATE products SET status = 'active', updated_at = NOW()
                         WHERE id = $1 AND status = 'reserved'",
                    )
                    .bind(order.product_id)
                    .execute(&mut *tx)
                    .await?;
                    FinanceRepository::unwind_order(&mut tx, order.id).await?;
                }
                _ => {}
            }
        }

        tx.commit().await?;
        Ok(payment)
    }
}
