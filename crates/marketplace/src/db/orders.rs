//! Order repository.
//!
//! Order creation reserves the product in the same transaction, so two
//! buyers can never hold the same listing.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::instrument;

use vide_grenier_core::commission::CommissionRecord;
use vide_grenier_core::{
    DeliveryMethod, OrderId, OrderStatus, PaymentMethod, PickupPointId, ProductId, ProductStatus,
    UserId, Xaf,
};

use super::RepositoryError;
use super::catalog::ProductRepository;
use super::finance::FinanceRepository;
use crate::models::Order;

pub(crate) const ORDER_COLUMNS: &str = "id, order_number, buyer_id, seller_id, product_id, \
     quantity, unit_price, delivery_cost, total_amount, commission_amount, seller_amount, status, \
     payment_method, delivery_method, delivery_address, pickup_point_id, pickup_code, \
     picked_up_at, guest_name, guest_phone, guest_email, notes, delivered_at, created_at, \
     updated_at";

/// Lay `(age in days, quantity)` rows out oldest first; age 0 is the last
/// slot. Ages outside the window are dropped.
fn daily_series(rows: &[(i32, i64)], days: usize) -> Vec<f64> {
    let mut series = vec![0.0; days];
    for &(age, quantity) in rows {
        let Some(index) = usize::try_from(age).ok().and_then(|age| days.checked_sub(age + 1)) else {
            continue;
        };
        if let Some(slot) = series.get_mut(index) {
            #[allow(clippy::cast_precision_loss)]
            {
                *slot = quantity as f64;
            }
        }
    }
    series
}

/// Outcome of [`OrderRepository::apply_status`].
#[derive(Debug)]
pub struct StatusChange {
    pub order: Order,
    /// Loyalty points awarded to the buyer.
    pub points: i64,
    /// Money credited back to the buyer's wallet.
    pub refunded: Xaf,
}

/// Sale order as read for commission accounting.
#[derive(Debug, sqlx::FromRow)]
struct CommissionRow {
    seller_id: UserId,
    id: OrderId,
    total_amount: Xaf,
    delivery_cost: Xaf,
    commission_amount: Xaf,
    seller_amount: Xaf,
    escrowed: bool,
    created_at: DateTime<Utc>,
}

impl From<CommissionRow> for CommissionRecord {
    fn from(row: CommissionRow) -> Self {
        Self {
            seller: row.seller_id,
            order: row.id,
            total: row.total_amount - row.delivery_cost,
            commission: row.commission_amount,
            seller_amount: row.seller_amount,
            escrowed: row.escrowed,
            at: row.created_at,
        }
    }
}

/// Buyer contact details for checkouts without an account.
#[derive(Debug, Clone)]
pub struct GuestContact<'a> {
    pub name: &'a str,
    pub phone: &'a str,
    pub email: &'a str,
}

/// A fully priced order ready to insert.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub order_number: &'a str,
    pub buyer_id: Option<UserId>,
    pub guest: Option<GuestContact<'a>>,
    pub seller_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Xaf,
    pub delivery_cost: Xaf,
    pub total_amount: Xaf,
    pub commission_amount: Xaf,
    pub seller_amount: Xaf,
    pub payment_method: PaymentMethod,
    pub delivery_method: DeliveryMethod,
    pub delivery_address: Option<&'a str>,
    pub pickup_point_id: Option<PickupPointId>,
    pub pickup_code: &'a str,
    pub notes: Option<&'a str>,
}

/// Repository for orders.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert an order and move its product from ACTIVE to RESERVED.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the product is no longer
    /// active or the order number is taken.
    #[instrument(skip(self, new), fields(order_number = new.order_number))]
    pub async fn create_reserving(&self, new: &NewOrder<'_>) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let order = Self::insert_reserving(&mut tx, new).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Insert several orders in one transaction, reserving each product.
    /// Nothing is written if any product is unavailable.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` naming the first unavailable product.
    #[instrument(skip(self, orders), fields(count = orders.len()))]
    pub async fn create_many_reserving(
        &self,
        orders: &[NewOrder<'_>],
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(orders.len());
        for new in orders {
            created.push(Self::insert_reserving(&mut tx, new).await?);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn insert_reserving(
        tx: &mut Transaction<'static, Postgres>,
        new: &NewOrder<'_>,
    ) -> Result<Order, RepositoryError> {
        let reserved = ProductRepository::compare_and_set_status(
            &mut **tx,
            new.product_id,
            ProductStatus::Active,
            ProductStatus::Reserved,
        )
        .await?;
        if !reserved {
            return Err(RepositoryError::Conflict(format!(
                "product {} is no longer available",
                new.product_id
            )));
        }

        let sql = format!(
            "INSERT INTO orders (id, order_number, buyer_id, seller_id, product_id, quantity,
                                 unit_price, delivery_cost, total_amount, commission_amount,
                                 seller_amount, payment_method, delivery_method, delivery_address,
                                 pickup_point_id, pickup_code, guest_name, guest_phone,
                                 guest_email, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                     $18, $19, $20)
             RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(OrderId::generate())
            .bind(new.order_number)
            .bind(new.buyer_id)
            .bind(new.seller_id)
            .bind(new.product_id)
            .bind(new.quantity)
            .bind(new.unit_price)
            .bind(new.delivery_cost)
            .bind(new.total_amount)
            .bind(new.commission_amount)
            .bind(new.seller_amount)
            .bind(new.payment_method)
            .bind(new.delivery_method)
            .bind(new.delivery_address)
            .bind(new.pickup_point_id)
            .bind(new.pickup_code)
            .bind(new.guest.as_ref().map(|g| g.name))
            .bind(new.guest.as_ref().map(|g| g.phone))
            .bind(new.guest.as_ref().map(|g| g.email))
            .bind(new.notes)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "order number"))
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        Ok(sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Lock an order row for the rest of the transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub(crate) async fn lock(
        conn: &mut PgConnection,
        id: OrderId,
    ) -> Result<Order, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Find an order by its pickup code among orders still waiting at a pickup point.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_pickup_code(&self, code: &str) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE pickup_code = $1 AND delivery_method = 'pickup' AND picked_up_at IS NULL
               AND status IN ('paid', 'processing', 'shipped')
             ORDER BY created_at DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, Order>(&sql)
            .bind(code)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Orders placed by a buyer, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_buyer(&self, buyer: UserId) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Order>(&sql)
            .bind(buyer)
            .fetch_all(self.pool)
            .await?)
    }

    /// Orders received by a seller, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_seller(&self, seller: UserId) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE seller_id = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Order>(&sql)
            .bind(seller)
            .fetch_all(self.pool)
            .await?)
    }

    /// Apply a status change already validated by the order lifecycle, and
    /// the matching side effects:
    ///
    /// - cancelled → product back to ACTIVE if it was RESERVED
    /// - cancelled or refunded → escrow and installment money returned to
    ///   the buyer's wallet
    /// - delivered → product SOLD, `delivered_at` stamped, loyalty points
    ///   awarded to the buyer
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order status changed
    /// concurrently.
    #[instrument(skip(self))]
    pub async fn apply_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<StatusChange, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let order = Self::set_status(&mut tx, id, from, to).await?;

        let mut points = 0;
        let mut refunded = Xaf::ZERO;
        match to {
            OrderStatus::Cancelled => {
                ProductRepository::compare_and_set_status(
                    &mut *tx,
                    order.product_id,
                    ProductStatus::Reserved,
                    ProductStatus::Active,
                )
                .await?;
                refunded = FinanceRepository::unwind_order(&mut tx, order.id).await?;
            }
            OrderStatus::Refunded => {
                refunded = FinanceRepository::unwind_order(&mut tx, order.id).await?;
            }
            OrderStatus::Delivered => {
                sqlx::query(
                    "UPDATE products SET status = 'sold', updated_at = NOW()
                     WHERE id = $1 AND status IN ('reserved', 'active')",
                )
                .bind(order.product_id)
                .execute(&mut *tx)
                .await?;
                if let Some(buyer) = order.buyer_id {
                    points = super::users::UserRepository::award_loyalty_points(
                        &mut *tx,
                        buyer,
                        order.total_amount,
                    )
                    .await?;
                }
            }
            _ => {}
        }

        tx.commit().await?;
        Ok(StatusChange {
            order,
            points,
            refunded,
        })
    }

    /// Compare-and-set an order status inside a transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order no longer has `from`.
    pub(crate) async fn set_status(
        tx: &mut Transaction<'static, Postgres>,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let sql = format!(
            "UPDATE orders SET status = $3,
                delivered_at = CASE WHEN $3 = 'delivered'::order_status THEN NOW()
                                    ELSE delivered_at END,
                updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| RepositoryError::Conflict(format!("order {id} status changed")))
    }

    /// Stamp the pickup of an order collected at a pickup point.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist or was already picked up.
    pub async fn mark_picked_up(&self, id: OrderId) -> Result<Order, RepositoryError> {
        let sql = format!(
            "UPDATE orders SET picked_up_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND picked_up_at IS NULL
             RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Units sold per day for a product over the last `days` days, oldest
    /// first, with zero-filled gaps.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn daily_sales(
        &self,
        product: ProductId,
        days: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<f64>, RepositoryError> {
        let days_i32 = i32::try_from(days).unwrap_or(i32::MAX);
        let rows = sqlx::query_as::<_, (i32, i64)>(
            "SELECT ($2::date - created_at::date)::int AS age, SUM(quantity)::bigint
             FROM orders
             WHERE product_id = $1
               AND status IN ('paid', 'processing', 'shipped', 'delivered')
               AND created_at::date > $2::date - $3
               AND created_at::date <= $2::date
             GROUP BY age",
        )
        .bind(product)
        .bind(now)
        .bind(days_i32)
        .fetch_all(self.pool)
        .await?;

        Ok(daily_series(&rows, days))
    }

    /// Commission records of sale orders, optionally for one seller.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn commission_records(
        &self,
        seller: Option<UserId>,
    ) -> Result<Vec<CommissionRecord>, RepositoryError> {
        Self::commission_records_with(self.pool, seller).await
    }

    /// [`Self::commission_records`] on any executor, so a payout can read
    /// balances inside its own transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn commission_records_with<'e, E>(
        executor: E,
        seller: Option<UserId>,
    ) -> Result<Vec<CommissionRecord>, RepositoryError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, CommissionRow>(
            "SELECT o.seller_id, o.id, o.total_amount, o.delivery_cost, o.commission_amount,
                    o.seller_amount,
                    EXISTS (
                        SELECT 1 FROM escrow_payments e
                        WHERE e.order_id = o.id
                          AND e.status IN ('funded', 'disputed', 'released_to_seller', 'refunded_to_buyer')
                    ) AS escrowed,
                    o.created_at
             FROM orders o
             WHERE o.status IN ('paid', 'processing', 'shipped', 'delivered')
               AND ($1::uuid IS NULL OR o.seller_id = $1)
             ORDER BY o.created_at",
        )
        .bind(seller)
        .fetch_all(executor)
        .await?;
        Ok(rows.into_iter().map(CommissionRecord::from).collect())
    }

    /// `(buyer, product)` pairs of paid and delivered orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purchase_pairs(&self) -> Result<Vec<(UserId, ProductId)>, RepositoryError> {
        Ok(sqlx::query_as::<_, (UserId, ProductId)>(
            "SELECT DISTINCT buyer_id, product_id FROM orders
             WHERE buyer_id IS NOT NULL AND status IN ('paid', 'delivered')",
        )
        .fetch_all(self.pool)
        .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::orders::Pricing;
    use vide_grenier_core::commission::SellerSummary;
    use vide_grenier_core::ProductSource;

    fn row(pricing: &Pricing, escrowed: bool) -> CommissionRow {
        CommissionRow {
            seller_id: UserId::generate(),
            id: OrderId::generate(),
            total_amount: pricing.total,
            delivery_cost: pricing.delivery_cost,
            commission_amount: pricing.commission,
            seller_amount: pricing.seller_amount,
            escrowed,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_daily_series_ignores_ages_outside_the_window() {
        let rows = [(0, 3), (2, 1), (7, 9), (-1, 4)];
        assert_eq!(daily_series(&rows, 3), vec![1.0, 0.0, 3.0]);
        assert!(daily_series(&rows, 0).is_empty());
    }

    #[test]
    fn test_delivery_fee_is_not_owed_to_the_seller() {
        let pricing = Pricing::compute(
            Xaf::from_francs(50_000),
            1,
            DeliveryMethod::Delivery,
            ProductSource::Client,
            None,
        );
        let record = CommissionRecord::from(row(&pricing, false));
        assert_eq!(record.total, Xaf::from_francs(50_000));

        let summary = SellerSummary::from_records(record.seller, &[record], Xaf::ZERO);
        assert_eq!(summary.total_sales, Xaf::from_francs(50_000));
        assert_eq!(summary.balance, Xaf::from_francs(47_500));
    }

    #[test]
    fn test_escrowed_sale_leaves_nothing_to_pay_out() {
        let pricing = Pricing::compute(
            Xaf::from_francs(50_000),
            1,
            DeliveryMethod::Pickup,
            ProductSource::Client,
            None,
        );
        let record = CommissionRecord::from(row(&pricing, true));
        let summary = SellerSummary::from_records(record.seller, &[record], Xaf::ZERO);
        assert_eq!(summary.total_commission, Xaf::from_francs(2_500));
        assert_eq!(summary.balance, Xaf::ZERO);
    }
}
