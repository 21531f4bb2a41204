//! Product-to-product similarity.

use std::collections::HashMap;

use super::{Scored, by_score_desc, cosine_similarity};
use crate::recommend::ProductFeatures;
use crate::types::ProductId;

/// Highest score [`similarity_score`] can return.
pub const SIMILARITY_MAX: f64 = 9.0;

/// Attribute overlap between two products.
///
/// +3 same category, +2 same condition, +1 same city, +1 same seller, and
/// up to +2 for close prices: with `diff = |p1 − p2| / max(p1, p2)`, a
/// difference under 30% adds `2·(1 − diff)`.
#[must_use]
pub fn similarity_score(a: &ProductFeatures, b: &ProductFeatures) -> f64 {
    let mut score = 0.0;
    if a.category == b.category {
        score += 3.0;
    }
    if a.condition == b.condition {
        score += 2.0;
    }
    if a.city == b.city {
        score += 1.0;
    }
    if a.seller == b.seller {
        score += 1.0;
    }

    let (pa, pb) = (a.price.to_f64(), b.price.to_f64());
    let max = pa.max(pb);
    if max > 0.0 {
        let diff = (pa - pb).abs() / max;
        if diff < 0.3 {
            score += 2.0 * (1.0 - diff);
        }
    }
    score
}

/// Rank `candidates` by similarity to `target`, normalized by
/// [`SIMILARITY_MAX`]. The target itself is skipped.
#[must_use]
pub fn similar_products(
    target: &ProductFeatures,
    candidates: &[ProductFeatures],
    limit: usize,
) -> Vec<Scored> {
    let mut items: Vec<Scored> = candidates
        .iter()
        .filter(|c| c.id != target.id)
        .map(|c| Scored::new(c.id, similarity_score(target, c) / SIMILARITY_MAX))
        .filter(|s| s.score > 0.0)
        .collect();
    items.sort_by(by_score_desc);
    items.truncate(limit);
    items
}

/// Lowercase alphanumeric tokens of at least two characters.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

/// TF-IDF vectors over product descriptions.
///
/// Documents are typically `title + description + category + condition + city`.
/// Vectors use raw term frequency times smoothed idf `ln((1+n)/(1+df)) + 1`
/// and are L2-normalized, so cosine similarity is a plain dot product.
#[derive(Debug, Clone, Default)]
pub struct TfIdfIndex {
    ids: Vec<ProductId>,
    vectors: Vec<HashMap<String, f64>>,
}

impl TfIdfIndex {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn build<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = (ProductId, S)>,
        S: AsRef<str>,
    {
        let docs: Vec<(ProductId, Vec<String>)> = documents
            .into_iter()
            .map(|(id, text)| (id, tokenize(text.as_ref())))
            .collect();

        let mut df: HashMap<&str, usize> = HashMap::new();
        for (_, tokens) in &docs {
            let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        let n = docs.len() as f64;
        let idf: HashMap<&str, f64> = df
            .iter()
            .map(|(term, count)| (*term, ((1.0 + n) / (1.0 + *count as f64)).ln() + 1.0))
            .collect();

        let mut ids = Vec::with_capacity(docs.len());
        let mut vectors = Vec::with_capacity(docs.len());
        for (id, tokens) in &docs {
            let mut tf: HashMap<String, f64> = HashMap::new();
            for token in tokens {
                *tf.entry(token.clone()).or_insert(0.0) += 1.0;
            }
            for (term, weight) in &mut tf {
                *weight *= idf.get(term.as_str()).copied().unwrap_or(1.0);
            }
            let norm = tf.values().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                for weight in tf.values_mut() {
                    *weight /= norm;
                }
            }
            ids.push(*id);
            vectors.push(tf);
        }

        Self { ids, vectors }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The `k` documents most similar to `product`, excluding itself and
    /// documents with no shared terms.
    #[must_use]
    pub fn similar(&self, product: ProductId, k: usize) -> Vec<Scored> {
        let Some(pos) = self.ids.iter().position(|id| *id == product) else {
            return Vec::new();
        };
        let Some(target) = self.vectors.get(pos) else {
            return Vec::new();
        };
        let mut items: Vec<Scored> = self
            .ids
            .iter()
            .zip(&self.vectors)
            .filter(|(id, _)| **id != product)
            .map(|(id, v)| Scored::new(*id, cosine_similarity(target, v)))
            .filter(|s| s.score > 0.0)
            .collect();
        items.sort_by(by_score_desc);
        items.truncate(k);
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CategoryId, City, Condition, UserId, Xaf};

    fn features(category: CategoryId, seller: UserId, price: i64) -> ProductFeatures {
        ProductFeatures {
            id: ProductId::generate(),
            category,
            seller,
            condition: Condition::Bon,
            city: City::Douala,
            price: Xaf::from_francs(price),
            views: 0,
        }
    }

    #[test]
    fn test_identical_attributes_score_max() {
        let cat = CategoryId::generate();
        let seller = UserId::generate();
        let a = features(cat, seller, 10_000);
        let b = features(cat, seller, 10_000);
        assert!((similarity_score(&a, &b) - SIMILARITY_MAX).abs() < 1e-12);
    }

    #[test]
    fn test_price_component() {
        let cat = CategoryId::generate();
        let a = features(cat, UserId::generate(), 10_000);
        let close = features(cat, UserId::generate(), 8_000);
        let far = features(cat, UserId::generate(), 5_000);
        // 3 + 2 + 1 + 2·(1 − 0.2)
        assert!((similarity_score(&a, &close) - 7.6).abs() < 1e-9);
        // price difference of 50% adds nothing
        assert!((similarity_score(&a, &far) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_similar_products_skip_target() {
        let cat = CategoryId::generate();
        let target = features(cat, UserId::generate(), 10_000);
        let other = features(cat, UserId::generate(), 10_500);
        let out = similar_products(&target, &[target.clone(), other.clone()], 5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].product, other.id);
        assert!(out[0].score <= 1.0);
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Téléphone Samsung A52, 128Go - très bon état!"),
            vec!["téléphone", "samsung", "a52", "128go", "très", "bon", "état"]
        );
    }

    #[test]
    fn test_tfidf_ranks_shared_vocabulary() {
        let phone_a = ProductId::generate();
        let phone_b = ProductId::generate();
        let chair = ProductId::generate();
        let index = TfIdfIndex::build([
            (phone_a, "Samsung Galaxy A52 smartphone Douala"),
            (phone_b, "Samsung Galaxy S21 smartphone Yaounde"),
            (chair, "Chaise en bois massif Garoua"),
        ]);
        assert_eq!(index.len(), 3);
        let similar = index.similar(phone_a, 10);
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].product, phone_b);
        assert!(similar[0].score > 0.0 && similar[0].score < 1.0);
    }

    #[test]
    fn test_tfidf_unknown_product() {
        let index = TfIdfIndex::build(Vec::<(ProductId, String)>::new());
        assert!(index.is_empty());
        assert!(index.similar(ProductId::generate(), 3).is_empty());
    }
}
