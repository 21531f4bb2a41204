//! Aggregates for the admin dashboard.

use serde::Serialize;
use sqlx::PgPool;

use vide_grenier_core::{OrderStatus, ProductStatus, Xaf};

use super::RepositoryError;

/// Headline numbers for the back-office.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_users: i64,
    pub new_users_30d: i64,
    pub products_by_status: Vec<(ProductStatus, i64)>,
    pub pending_products: i64,
    pub total_orders: i64,
    pub orders_by_status: Vec<(OrderStatus, i64)>,
    /// Sum of `total_amount` over sale orders.
    pub revenue: Xaf,
    pub commission_total: Xaf,
    pub revenue_30d: Xaf,
}

pub struct DashboardRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DashboardRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Compute the dashboard in a single read-only transaction so the
    /// numbers are consistent with each other.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn stats(&self) -> Result<DashboardStats, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let (total_users, new_users_30d) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '30 days')
             FROM users",
        )
        .fetch_one(&mut *tx)
        .await?;

        let products_by_status = sqlx::query_as::<_, (ProductStatus, i64)>(
            "SELECT status, COUNT(*) FROM products GROUP BY status ORDER BY status",
        )
        .fetch_all(&mut *tx)
        .await?;

        let orders_by_status = sqlx::query_as::<_, (OrderStatus, i64)>(
            "SELECT status, COUNT(*) FROM orders GROUP BY status ORDER BY status",
        )
        .fetch_all(&mut *tx)
        .await?;

        let (revenue, commission_total, revenue_30d) = sqlx::query_as::<_, (Xaf, Xaf, Xaf)>(
            "SELECT COALESCE(SUM(total_amount), 0),
                    COALESCE(SUM(commission_amount), 0),
                    COALESCE(SUM(total_amount) FILTER (
                        WHERE created_at >= NOW() - INTERVAL '30 days'), 0)
             FROM orders WHERE status IN ('paid', 'processing', 'shipped', 'delivered')",
        )
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let pending_products = products_by_status
            .iter()
            .find(|(s, _)| *s == ProductStatus::Pending)
            .map_or(0, |(_, n)| *n);
        let total_orders = orders_by_status.iter().map(|(_, n)| n).sum();

        Ok(DashboardStats {
            total_users,
            new_users_30d,
            products_by_status,
            pending_products,
            total_orders,
            orders_by_status,
            revenue,
            commission_total,
            revenue_30d,
        })
    }
}
