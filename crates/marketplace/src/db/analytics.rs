//! Behavior log, analytics events, search history and stored recommendations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use vide_grenier_core::recommend::{ActivityEvent, Interaction, Recommendation};
use vide_grenier_core::{AnalyticsMetric, InteractionKind, ProductId, RecommendationKind, UserId};

use super::RepositoryError;

/// A persisted recommendation row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredRecommendation {
    pub product_id: ProductId,
    pub kind: RecommendationKind,
    pub score: f64,
    pub reasons: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Daily total of one metric.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MetricPoint {
    pub day: chrono::NaiveDate,
    pub total: Decimal,
}

/// Repository for analytics data.
pub struct AnalyticsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AnalyticsRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append a user interaction to the behavior log.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn record_behavior(
        &self,
        user: UserId,
        product: Option<ProductId>,
        kind: InteractionKind,
        search_query: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_behaviors (id, user_id, product_id, kind, search_query)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(user)
        .bind(product)
        .bind(kind)
        .bind(search_query)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Append an analytics event.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record_event(
        &self,
        metric: AnalyticsMetric,
        user: Option<UserId>,
        product: Option<ProductId>,
        value: Decimal,
        metadata: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO analytics_events (id, metric, user_id, product_id, value, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(metric)
        .bind(user)
        .bind(product)
        .bind(value)
        .bind(metadata)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Store a search query and how many results it returned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record_search(
        &self,
        user: Option<UserId>,
        query: &str,
        results_count: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO search_history (id, user_id, query, results_count) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(user)
        .bind(query)
        .bind(results_count)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Every product interaction since `since`, for the user×product matrix.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn interactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        let rows = sqlx::query_as::<_, (UserId, ProductId, InteractionKind)>(
            "SELECT user_id, product_id, kind FROM user_behaviors
             WHERE product_id IS NOT NULL AND created_at >= $1",
        )
        .bind(since)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(user, product, kind)| Interaction {
                user,
                product,
                kind,
            })
            .collect())
    }

    /// A user's product interactions, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn user_history(
        &self,
        user: UserId,
        limit: i64,
    ) -> Result<Vec<(ProductId, InteractionKind)>, RepositoryError> {
        Ok(sqlx::query_as::<_, (ProductId, InteractionKind)>(
            "SELECT product_id, kind FROM user_behaviors
             WHERE user_id = $1 AND product_id IS NOT NULL
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user)
        .bind(limit)
        .fetch_all(self.pool)
        .await?)
    }

    /// View, like and purchase events since `since`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn activity_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, RepositoryError> {
        let rows = sqlx::query_as::<_, (ProductId, InteractionKind, DateTime<Utc>)>(
            "SELECT b.product_id, b.kind, b.created_at
             FROM user_behaviors b JOIN products p ON p.id = b.product_id
             WHERE b.created_at > $1 AND b.kind IN ('view', 'like', 'purchase')
               AND p.status = 'active'",
        )
        .bind(since)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(product, kind, at)| ActivityEvent { product, kind, at })
            .collect())
    }

    /// Replace a user's stored recommendations in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, recommendations), fields(count = recommendations.len()))]
    pub async fn replace_recommendations(
        &self,
        user: UserId,
        recommendations: &[(Recommendation, Vec<String>)],
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM product_recommendations WHERE user_id = $1")
            .bind(user)
            .execute(&mut *tx)
            .await?;
        for (rec, reasons) in recommendations {
            sqlx::query(
                "INSERT INTO product_recommendations (user_id, product_id, kind, score, reasons,
                                                      expires_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(user)
            .bind(rec.product)
            .bind(rec.kind)
            .bind(rec.score.clamp(0.0, 1.0))
            .bind(reasons)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Unexpired stored recommendations for active products, best first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recommendations(
        &self,
        user: UserId,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<StoredRecommendation>, RepositoryError> {
        Ok(sqlx::query_as::<_, StoredRecommendation>(
            "SELECT r.product_id, r.kind, r.score, r.reasons, r.expires_at
             FROM product_recommendations r JOIN products p ON p.id = r.product_id
             WHERE r.user_id = $1 AND r.expires_at > $2 AND p.status = 'active'
             ORDER BY r.score DESC, r.product_id
             LIMIT $3",
        )
        .bind(user)
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool)
        .await?)
    }

    /// Daily totals of a metric since `since`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn daily_totals(
        &self,
        metric: AnalyticsMetric,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricPoint>, RepositoryError> {
        Ok(sqlx::query_as::<_, MetricPoint>(
            "SELECT created_at::date AS day, SUM(value) AS total
             FROM analytics_events
             WHERE metric = $1 AND created_at >= $2
             GROUP BY day ORDER BY day",
        )
        .bind(metric)
        .bind(since)
        .fetch_all(self.pool)
        .await?)
    }

    /// Most frequent search queries since `since`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_searches(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<(String, i64)>, RepositoryError> {
        Ok(sqlx::query_as::<_, (String, i64)>(
            "SELECT lower(query) AS q, COUNT(*) AS n FROM search_history
             WHERE created_at >= $1
             GROUP BY q ORDER BY n DESC, q LIMIT $2",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(self.pool)
        .await?)
    }
}
