//! Content-based scoring against a user preference profile.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use super::{Scored, by_score_desc};
use crate::types::{CategoryId, City, Condition, InteractionKind, ProductId, UserId, Xaf};

/// Price range assumed when a user has no history.
const DEFAULT_PRICE_RANGE: (f64, f64) = (0.0, 100_000.0);

const CATEGORY_SHARE: f64 = 0.4;
const PRICE_SHARE: f64 = 0.3;
const CONDITION_SHARE: f64 = 0.15;
const CITY_SHARE: f64 = 0.15;

/// Attributes of a product that the engine reasons about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductFeatures {
    pub id: ProductId,
    pub category: CategoryId,
    pub seller: UserId,
    pub condition: Condition,
    pub city: City,
    pub price: Xaf,
    pub views: i64,
}

/// Weighted affinities derived from a user's interaction history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPreferences {
    categories: HashMap<CategoryId, f64>,
    conditions: HashMap<Condition, f64>,
    cities: HashMap<City, f64>,
    price_range: Option<(f64, f64)>,
}

impl UserPreferences {
    /// Build a profile from `(product, action)` pairs.
    ///
    /// Category, condition and city counters add the action weight; the
    /// price range is the min/max price over every product touched.
    #[must_use]
    pub fn from_history<'a, I>(history: I) -> Self
    where
        I: IntoIterator<Item = (&'a ProductFeatures, InteractionKind)>,
    {
        let mut prefs = Self::default();
        for (product, kind) in history {
            let w = kind.weight();
            *prefs.categories.entry(product.category).or_insert(0.0) += w;
            *prefs.conditions.entry(product.condition).or_insert(0.0) += w;
            *prefs.cities.entry(product.city).or_insert(0.0) += w;

            let price = product.price.to_f64();
            prefs.price_range = Some(match prefs.price_range {
                Some((lo, hi)) => (lo.min(price), hi.max(price)),
                None => (price, price),
            });
        }
        prefs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Observed price range, or `0..100 000` without history.
    #[must_use]
    pub fn price_range(&self) -> (f64, f64) {
        self.price_range.unwrap_or(DEFAULT_PRICE_RANGE)
    }

    /// The range candidates are matched against: `0.7·min ..= 1.3·max`.
    #[must_use]
    pub fn price_window(&self) -> (f64, f64) {
        let (lo, hi) = self.price_range();
        (lo * 0.7, hi * 1.3)
    }

    /// Raw weighted affinity for a category.
    #[must_use]
    pub fn category_affinity(&self, category: CategoryId) -> f64 {
        self.categories.get(&category).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn top_categories(&self, n: usize) -> Vec<CategoryId> {
        top_keys(&self.categories, n)
    }

    #[must_use]
    pub fn top_conditions(&self, n: usize) -> Vec<Condition> {
        top_keys(&self.conditions, n)
    }

    #[must_use]
    pub fn top_cities(&self, n: usize) -> Vec<City> {
        top_keys(&self.cities, n)
    }

    fn max_category_affinity(&self) -> f64 {
        self.categories.values().copied().fold(0.0, f64::max)
    }
}

fn top_keys<K: Copy + Ord + Hash>(counts: &HashMap<K, f64>, n: usize) -> Vec<K> {
    let mut entries: Vec<(K, f64)> = counts.iter().map(|(k, v)| (*k, *v)).collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.into_iter().take(n).map(|(k, _)| k).collect()
}

/// Score a product against a profile, in `0.0..=1.0`.
///
/// Category affinity relative to the favourite category contributes up to
/// 0.4, a price inside the preferred window 0.3, a top-2 condition 0.15 and
/// a top-2 city 0.15. A profile with no history scores everything 0.
#[must_use]
pub fn content_score(prefs: &UserPreferences, product: &ProductFeatures) -> f64 {
    if prefs.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;

    let max_affinity = prefs.max_category_affinity();
    if max_affinity > 0.0 {
        score += CATEGORY_SHARE * (prefs.category_affinity(product.category) / max_affinity);
    }

    let (lo, hi) = prefs.price_window();
    let price = product.price.to_f64();
    if price >= lo && price <= hi {
        score += PRICE_SHARE;
    }

    if prefs.top_conditions(2).contains(&product.condition) {
        score += CONDITION_SHARE;
    }

    if prefs.top_cities(2).contains(&product.city) {
        score += CITY_SHARE;
    }

    score.clamp(0.0, 1.0)
}

/// Rank candidates by [`content_score`], skipping `exclude`.
///
/// Only products in one of the user's top-3 categories are considered,
/// so the signal stays focused on what the user actually browses.
#[must_use]
pub fn content_based(
    prefs: &UserPreferences,
    candidates: &[ProductFeatures],
    exclude: &HashSet<ProductId>,
    limit: usize,
) -> Vec<Scored> {
    let top = prefs.top_categories(3);
    // Scores are absolute shares, so they are sorted but not rescaled.
    let mut items: Vec<Scored> = candidates
        .iter()
        .filter(|p| !exclude.contains(&p.id) && top.contains(&p.category))
        .map(|p| Scored::new(p.id, content_score(prefs, p)))
        .filter(|s| s.score > 0.0)
        .collect();
    items.sort_by(by_score_desc);
    items.truncate(limit);
    items
}

/// Human-readable reasons a product matches a profile.
#[must_use]
pub fn explain(prefs: &UserPreferences, product: &ProductFeatures) -> Vec<&'static str> {
    let mut reasons = Vec::new();

    if prefs.category_affinity(product.category) > 2.0 {
        reasons.push("Basé sur vos intérêts pour cette catégorie");
    }

    if !prefs.is_empty() {
        let (lo, hi) = prefs.price_range();
        let avg = (lo + hi) / 2.0;
        let price = product.price.to_f64();
        if avg > 0.0 && (price - avg).abs() <= avg * 0.3 {
            reasons.push("Dans votre gamme de prix");
        }
    }

    if prefs.top_conditions(2).contains(&product.condition) {
        reasons.push("Correspond à vos préférences d'état");
    }

    if prefs.top_cities(2).contains(&product.city) {
        reasons.push("Disponible dans votre ville");
    }

    if product.views > 100 {
        reasons.push("Produit populaire");
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(
        category: CategoryId,
        condition: Condition,
        city: City,
        price: i64,
    ) -> ProductFeatures {
        ProductFeatures {
            id: ProductId::generate(),
            category,
            seller: UserId::generate(),
            condition,
            city,
            price: Xaf::from_francs(price),
            views: 0,
        }
    }

    #[test]
    fn test_empty_profile() {
        let prefs = UserPreferences::default();
        assert!(prefs.is_empty());
        assert_eq!(prefs.price_range(), (0.0, 100_000.0));
        let p = product(CategoryId::generate(), Condition::Bon, City::Douala, 5_000);
        assert!(content_score(&prefs, &p).abs() < f64::EPSILON);
    }

    #[test]
    fn test_profile_from_history() {
        let phones = CategoryId::generate();
        let furniture = CategoryId::generate();
        let a = product(phones, Condition::Excellent, City::Douala, 40_000);
        let b = product(phones, Condition::Bon, City::Douala, 60_000);
        let c = product(furniture, Condition::Usage, City::Garoua, 15_000);

        let prefs = UserPreferences::from_history([
            (&a, InteractionKind::Purchase),
            (&b, InteractionKind::Like),
            (&c, InteractionKind::View),
        ]);

        assert_eq!(prefs.top_categories(1), vec![phones]);
        assert_eq!(prefs.top_cities(1), vec![City::Douala]);
        assert_eq!(prefs.price_range(), (15_000.0, 60_000.0));
        assert!((prefs.category_affinity(phones) - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_perfect_match_scores_one() {
        let phones = CategoryId::generate();
        let seen = product(phones, Condition::Excellent, City::Yaounde, 50_000);
        let prefs = UserPreferences::from_history([(&seen, InteractionKind::Purchase)]);

        let candidate = product(phones, Condition::Excellent, City::Yaounde, 55_000);
        assert!((content_score(&prefs, &candidate) - 1.0).abs() < 1e-12);

        let unrelated = product(CategoryId::generate(), Condition::Usage, City::Garoua, 900_000);
        assert!(content_score(&prefs, &unrelated).abs() < 1e-12);
    }

    #[test]
    fn test_content_based_filters_and_excludes() {
        let phones = CategoryId::generate();
        let seen = product(phones, Condition::Bon, City::Douala, 20_000);
        let prefs = UserPreferences::from_history([(&seen, InteractionKind::Like)]);

        let match_a = product(phones, Condition::Bon, City::Douala, 21_000);
        let match_b = product(phones, Condition::Usage, City::Bamenda, 21_000);
        let other = product(CategoryId::generate(), Condition::Bon, City::Douala, 21_000);
        let candidates = vec![seen.clone(), match_a.clone(), match_b.clone(), other];
        let exclude: HashSet<ProductId> = [seen.id].into_iter().collect();

        let recs = content_based(&prefs, &candidates, &exclude, 10);
        let ids: Vec<ProductId> = recs.iter().map(|s| s.product).collect();
        assert_eq!(ids, vec![match_a.id, match_b.id]);
        assert!(recs.iter().all(|s| (0.0..=1.0).contains(&s.score)));
    }

    #[test]
    fn test_explanations() {
        let phones = CategoryId::generate();
        let seen = product(phones, Condition::Bon, City::Douala, 20_000);
        let prefs = UserPreferences::from_history([(&seen, InteractionKind::Like)]);

        let mut candidate = product(phones, Condition::Bon, City::Douala, 22_000);
        candidate.views = 150;
        let reasons = explain(&prefs, &candidate);
        assert_eq!(
            reasons,
            vec![
                "Basé sur vos intérêts pour cette catégorie",
                "Dans votre gamme de prix",
                "Correspond à vos préférences d'état",
                "Disponible dans votre ville",
                "Produit populaire",
            ]
        );
    }
}
