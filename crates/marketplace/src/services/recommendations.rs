//! Recommendation service.
//!
//! Loads interactions and product rows, runs the core engine and persists
//! the blended result per user with an expiry. Trending scores are shared by
//! every user and cached in-process for five minutes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use vide_grenier_core::recommend::{
    InteractionMatrix, ProductFeatures, Recommendation, Scored, Source, TfIdfIndex,
    UserPreferences, blend, co_purchase_scores, content_based, explain, similar_products, tally,
    trending::TRENDING_WINDOW_DAYS, trending_scores, with_popular_fallback,
};
use vide_grenier_core::{ProductId, RecommendationKind, UserId};

use crate::db::RepositoryError;
use crate::db::analytics::AnalyticsRepository;
use crate::db::catalog::ProductRepository;
use crate::db::orders::OrderRepository;
use crate::db::users::UserRepository;
use crate::models::Product;

/// Default number of recommendations returned to clients.
pub const DEFAULT_LIMIT: usize = 10;
/// Largest page a client may ask for.
pub const MAX_LIMIT: usize = 50;
/// Rows stored per user on refresh, enough to serve the largest page.
const PERSISTED_PER_USER: usize = MAX_LIMIT;

const NEIGHBOURS: usize = 10;
const HISTORY_LIMIT: i64 = 200;
const INTERACTION_WINDOW_DAYS: i64 = 90;
const TRENDING_CACHE_TTL: Duration = Duration::from_secs(300);
/// Each signal produces this many times `limit` candidates before blending.
const OVERSAMPLE: usize = 2;

/// A recommended product ready for the API.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendedProduct {
    pub product: Product,
    pub score: f64,
    pub kind: RecommendationKind,
    pub reasons: Vec<String>,
}

/// Everything the engine needs that is shared across users.
struct Snapshot {
    matrix: InteractionMatrix,
    active: Vec<ProductFeatures>,
    popular: Vec<(ProductId, i64)>,
    trending: Arc<Vec<Scored>>,
}

/// Recommendation engine bound to the database.
#[derive(Clone)]
pub struct RecommendationService {
    pool: PgPool,
    trending: Cache<usize, Arc<Vec<Scored>>>,
    ttl: chrono::Duration,
}

impl RecommendationService {
    #[must_use]
    pub fn new(pool: PgPool, ttl_hours: i64) -> Self {
        let trending = Cache::builder()
            .max_capacity(16)
            .time_to_live(TRENDING_CACHE_TTL)
            .build();
        Self {
            pool,
            trending,
            ttl: chrono::Duration::hours(ttl_hours),
        }
    }

    /// Trending scores over the last seven days, cached per `limit`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if loading activity fails.
    pub async fn trending_scores(&self, limit: usize) -> Result<Arc<Vec<Scored>>, RepositoryError> {
        if let Some(cached) = self.trending.get(&limit).await {
            return Ok(cached);
        }

        let now = Utc::now();
        let window = chrono::Duration::days(TRENDING_WINDOW_DAYS);
        let events = AnalyticsRepository::new(&self.pool)
            .activity_since(now - window)
            .await?;
        let scores = Arc::new(trending_scores(&tally(&events, now, window), limit));
        self.trending.insert(limit, Arc::clone(&scores)).await;
        Ok(scores)
    }

    /// Trending products, most active first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self))]
    pub async fn trending(&self, limit: usize) -> Result<Vec<RecommendedProduct>, RepositoryError> {
        let scores = self.trending_scores(limit).await?;
        let items: Vec<(ProductId, f64, RecommendationKind, Vec<String>)> = scores
            .iter()
            .map(|s| (s.product, s.score, RecommendationKind::Trending, Vec::new()))
            .collect();
        self.hydrate(items).await
    }

    /// Persisted recommendations for `user`, computing them first when none
    /// are stored or all have expired.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self))]
    pub async fn for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<RecommendedProduct>, RepositoryError> {
        let analytics = AnalyticsRepository::new(&self.pool);
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut stored = analytics.recommendations(user, Utc::now(), limit_i64).await?;
        if stored.is_empty() {
            self.refresh_user(user).await?;
            stored = analytics.recommendations(user, Utc::now(), limit_i64).await?;
        }

        let items = stored
            .into_iter()
            .map(|r| (r.product_id, r.score, r.kind, r.reasons))
            .collect();
        self.hydrate(items).await
    }

    /// Recompute and persist recommendations for one user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn refresh_user(&self, user: UserId) -> Result<usize, RepositoryError> {
        let snapshot = self.snapshot(PERSISTED_PER_USER).await?;
        self.refresh_with(&snapshot, user, PERSISTED_PER_USER).await
    }

    /// Recompute and persist recommendations for every active user. Returns
    /// the number of users refreshed. Per-user failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the shared data cannot be loaded.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> Result<usize, RepositoryError> {
        let snapshot = self.snapshot(PERSISTED_PER_USER).await?;
        let users = UserRepository::new(&self.pool).active_ids().await?;

        let mut refreshed = 0;
        for user in users {
            match self.refresh_with(&snapshot, user, PERSISTED_PER_USER).await {
                Ok(_) => refreshed += 1,
                Err(e) => tracing::warn!(error = %e, user_id = %user, "Recommendation refresh failed"),
            }
        }
        tracing::info!(refreshed, "Recommendations refreshed");
        Ok(refreshed)
    }

    /// Products similar to `product`: attribute overlap blended with text
    /// similarity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn similar(
        &self,
        product: &Product,
        limit: usize,
    ) -> Result<Vec<RecommendedProduct>, RepositoryError> {
        let products = ProductRepository::new(&self.pool);
        let candidates: Vec<ProductFeatures> = products
            .all_active()
            .await?
            .iter()
            .map(Product::features)
            .collect();
        let by_attributes = similar_products(&product.features(), &candidates, limit * OVERSAMPLE);

        let index = TfIdfIndex::build(products.similarity_documents().await?);
        let by_text = index.similar(product.id, limit * OVERSAMPLE);

        let blended = blend(
            &[
                Source::new(RecommendationKind::Similar, by_attributes),
                Source::new(RecommendationKind::ContentBased, by_text),
            ],
            limit,
        );
        let items = blended
            .into_iter()
            .filter(|r| r.product != product.id)
            .map(|r| (r.product, r.score, RecommendationKind::Similar, Vec::new()))
            .collect();
        self.hydrate(items).await
    }

    /// Products frequently bought by buyers of `product`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn cross_sell(
        &self,
        product: ProductId,
        limit: usize,
    ) -> Result<Vec<RecommendedProduct>, RepositoryError> {
        let pairs = OrderRepository::new(&self.pool).purchase_pairs().await?;
        let items = co_purchase_scores(&pairs, product, limit)
            .into_iter()
            .map(|s| (s.product, s.score, RecommendationKind::CrossSell, Vec::new()))
            .collect();
        self.hydrate(items).await
    }

    async fn snapshot(&self, limit: usize) -> Result<Snapshot, RepositoryError> {
        let since = Utc::now() - chrono::Duration::days(INTERACTION_WINDOW_DAYS);
        let products = ProductRepository::new(&self.pool);
        let interactions = AnalyticsRepository::new(&self.pool)
            .interactions_since(since)
            .await?;

        let limit_i64 = i64::try_from(limit * OVERSAMPLE).unwrap_or(i64::MAX);
        Ok(Snapshot {
            matrix: InteractionMatrix::from_interactions(interactions),
            active: products
                .all_active()
                .await?
                .iter()
                .map(Product::features)
                .collect(),
            popular: products.most_viewed(limit_i64).await?,
            trending: self.trending_scores(limit * OVERSAMPLE).await?,
        })
    }

    async fn refresh_with(
        &self,
        snapshot: &Snapshot,
        user: UserId,
        limit: usize,
    ) -> Result<usize, RepositoryError> {
        let analytics = AnalyticsRepository::new(&self.pool);
        let history = analytics.user_history(user, HISTORY_LIMIT).await?;

        // History may include products that are no longer active.
        let history_ids: Vec<ProductId> = history.iter().map(|(p, _)| *p).collect();
        let history_features: HashMap<ProductId, ProductFeatures> =
            ProductRepository::new(&self.pool)
                .get_many(&history_ids)
                .await?
                .iter()
                .map(|p| (p.id, p.features()))
                .collect();

        let recommendations = compute(snapshot, user, &history, &history_features, limit);
        let count = recommendations.len();
        analytics
            .replace_recommendations(user, &recommendations, Utc::now() + self.ttl)
            .await?;
        Ok(count)
    }

    /// Load products for scored ids, keeping the score order and dropping
    /// products that are gone or no longer active.
    async fn hydrate(
        &self,
        items: Vec<(ProductId, f64, RecommendationKind, Vec<String>)>,
    ) -> Result<Vec<RecommendedProduct>, RepositoryError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<ProductId> = items.iter().map(|(p, ..)| *p).collect();
        let mut products: HashMap<ProductId, Product> = ProductRepository::new(&self.pool)
            .get_many(&ids)
            .await?
            .into_iter()
            .filter(|p| p.status.is_purchasable())
            .map(|p| (p.id, p))
            .collect();

        Ok(items
            .into_iter()
            .filter_map(|(id, score, kind, reasons)| {
                products.remove(&id).map(|product| RecommendedProduct {
                    product,
                    score,
                    kind,
                    reasons,
                })
            })
            .collect())
    }
}

/// Blend the three signals for one user and attach explanations.
fn compute(
    snapshot: &Snapshot,
    user: UserId,
    history: &[(ProductId, vide_grenier_core::InteractionKind)],
    history_features: &HashMap<ProductId, ProductFeatures>,
    limit: usize,
) -> Vec<(Recommendation, Vec<String>)> {
    let prefs = UserPreferences::from_history(
        history
            .iter()
            .filter_map(|(p, kind)| history_features.get(p).map(|f| (f, *kind))),
    );

    let mut seen: HashSet<ProductId> = snapshot.matrix.interacted(user);
    seen.extend(history.iter().map(|(p, _)| *p));
    // Sellers don't get their own listings back.
    let own: HashSet<ProductId> = snapshot
        .active
        .iter()
        .filter(|p| p.seller == user)
        .map(|p| p.id)
        .collect();
    seen.extend(&own);

    let candidates = limit * OVERSAMPLE;
    let collaborative: Vec<Scored> = snapshot
        .matrix
        .collaborative(user, NEIGHBOURS, candidates)
        .into_iter()
        .filter(|s| !own.contains(&s.product))
        .collect();
    let content = content_based(&prefs, &snapshot.active, &seen, candidates);
    let trending: Vec<Scored> = snapshot
        .trending
        .iter()
        .filter(|s| !seen.contains(&s.product))
        .copied()
        .collect();

    let blended = blend(
        &[
            Source::new(RecommendationKind::Collaborative, collaborative),
            Source::new(RecommendationKind::ContentBased, content),
            Source::new(RecommendationKind::Trending, trending),
        ],
        limit,
    );
    let recommendations = with_popular_fallback(blended, &snapshot.popular, &seen, limit);

    let features: HashMap<ProductId, &ProductFeatures> =
        snapshot.active.iter().map(|p| (p.id, p)).collect();
    recommendations
        .into_iter()
        .map(|r| {
            let reasons = features
                .get(&r.product)
                .map(|f| explain(&prefs, f).into_iter().map(str::to_owned).collect())
                .unwrap_or_default();
            (r, reasons)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use vide_grenier_core::recommend::Interaction;
    use vide_grenier_core::{CategoryId, City, Condition, InteractionKind, Xaf};

    use super::*;

    fn features(category: CategoryId, seller: UserId, price: i64) -> ProductFeatures {
        ProductFeatures {
            id: ProductId::generate(),
            category,
            seller,
            condition: Condition::Bon,
            city: City::Douala,
            price: Xaf::new(Decimal::from(price)),
            views: 10,
        }
    }

    fn snapshot(
        interactions: Vec<Interaction>,
        active: Vec<ProductFeatures>,
        popular: Vec<(ProductId, i64)>,
    ) -> Snapshot {
        Snapshot {
            matrix: InteractionMatrix::from_interactions(interactions),
            active,
            popular,
            trending: Arc::new(Vec::new()),
        }
    }

    #[test]
    fn test_compute_excludes_seen_and_own_products() {
        let phones = CategoryId::generate();
        let user = UserId::generate();
        let seller = UserId::generate();

        let viewed = features(phones, seller, 50_000);
        let fresh = features(phones, seller, 55_000);
        let own = features(phones, user, 52_000);

        let snapshot = snapshot(
            Vec::new(),
            vec![viewed.clone(), fresh.clone(), own.clone()],
            vec![(viewed.id, 40), (own.id, 30), (fresh.id, 20)],
        );
        let history = vec![(viewed.id, InteractionKind::Like)];
        let history_features: HashMap<_, _> = [(viewed.id, viewed.clone())].into();

        let recs = compute(&snapshot, user, &history, &history_features, 10);
        let ids: Vec<ProductId> = recs.iter().map(|(r, _)| r.product).collect();
        assert!(ids.contains(&fresh.id));
        assert!(!ids.contains(&viewed.id));
        assert!(!ids.contains(&own.id));
        assert!(recs.iter().all(|(r, _)| (0.0..=1.0).contains(&r.score)));
    }

    #[test]
    fn test_compute_explains_category_affinity() {
        let phones = CategoryId::generate();
        let user = UserId::generate();
        let seller = UserId::generate();

        let bought = features(phones, seller, 50_000);
        let candidate = features(phones, seller, 50_000);

        let snapshot = snapshot(Vec::new(), vec![candidate.clone()], Vec::new());
        let history = vec![(bought.id, InteractionKind::Purchase)];
        let history_features: HashMap<_, _> = [(bought.id, bought)].into();

        let recs = compute(&snapshot, user, &history, &history_features, 5);
        let (rec, reasons) = recs.first().unwrap();
        assert_eq!(rec.product, candidate.id);
        assert!(
            reasons
                .iter()
                .any(|r| r == "Basé sur vos intérêts pour cette catégorie")
        );
    }

    #[test]
    fn test_compute_falls_back_to_popular() {
        let user = UserId::generate();
        let seller = UserId::generate();
        let popular = features(CategoryId::generate(), seller, 10_000);

        let snapshot = snapshot(Vec::new(), vec![popular.clone()], vec![(popular.id, 500)]);
        let recs = compute(&snapshot, user, &[], &HashMap::new(), 5);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].0.kind, RecommendationKind::Popular);
        assert!(recs[0].0.score <= 0.5);
    }

    #[test]
    fn test_refresh_stores_a_full_page() {
        let user = UserId::generate();
        let seller = UserId::generate();
        let category = CategoryId::generate();
        let active: Vec<ProductFeatures> = (0..80)
            .map(|i| features(category, seller, 10_000 + i))
            .collect();
        let popular = active
            .iter()
            .zip(0..)
            .map(|(p, views)| (p.id, 1_000 - views))
            .collect();

        let snapshot = snapshot(Vec::new(), active, popular);
        let recs = compute(&snapshot, user, &[], &HashMap::new(), PERSISTED_PER_USER);
        assert_eq!(recs.len(), MAX_LIMIT);
    }
}
