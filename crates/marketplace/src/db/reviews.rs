//! Review repository.

use rust_decimal::Decimal;
use sqlx::PgPool;

use vide_grenier_core::{OrderId, ProductId, ReviewId, ReviewScores, UserId};

use super::RepositoryError;
use crate::models::Review;

const REVIEW_COLUMNS: &str = "id, order_id, reviewer_id, seller_id, product_id, overall_rating, \
     communication_rating, delivery_rating, product_quality_rating, value_rating, average_rating, \
     comment, created_at";

/// Repository for seller reviews.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store the review of a delivered order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order was already reviewed.
    pub async fn create(
        &self,
        order: OrderId,
        reviewer: UserId,
        seller: UserId,
        product: ProductId,
        scores: &ReviewScores,
        comment: &str,
    ) -> Result<Review, RepositoryError> {
        let sql = format!(
            "INSERT INTO reviews (id, order_id, reviewer_id, seller_id, product_id, overall_rating,
                                  communication_rating, delivery_rating, product_quality_rating,
                                  value_rating, average_rating, comment)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {REVIEW_COLUMNS}"
        );
        sqlx::query_as::<_, Review>(&sql)
            .bind(ReviewId::generate())
            .bind(order)
            .bind(reviewer)
            .bind(seller)
            .bind(product)
            .bind(scores.overall)
            .bind(scores.communication)
            .bind(scores.delivery)
            .bind(scores.product_quality)
            .bind(scores.value_for_money)
            .bind(scores.average())
            .bind(comment)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "review for this order"))
    }

    /// Reviews received by a seller, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_seller(&self, seller: UserId) -> Result<Vec<Review>, RepositoryError> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE seller_id = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Review>(&sql)
            .bind(seller)
            .fetch_all(self.pool)
            .await?)
    }

    /// Mean average rating and review count of a seller.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn seller_rating(
        &self,
        seller: UserId,
    ) -> Result<(Option<Decimal>, i64), RepositoryError> {
        Ok(sqlx::query_as::<_, (Option<Decimal>, i64)>(
            "SELECT ROUND(AVG(average_rating), 2), COUNT(*) FROM reviews WHERE seller_id = $1",
        )
        .bind(seller)
        .fetch_one(self.pool)
        .await?)
    }
}
