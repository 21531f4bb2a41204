//! Product recommendation engine.
//!
//! Three independent signals are computed from plain values loaded by the
//! caller, then blended:
//!
//! - [`collaborative`] - cosine similarity between users over a sparse
//!   user×product matrix of weighted interactions
//! - [`content`] - a preference profile (categories, price range, condition,
//!   city) scored against candidate products
//! - [`trending`] - recent activity counts, plus co-purchase cross-selling
//!
//! [`blend`] deduplicates the candidates, averages their scores and pads the
//! list with popular products when the signals are sparse. [`similarity`]
//! ranks products against another product (attribute overlap and TF-IDF
//! text similarity) for the "similar items" panel.
//!
//! Every score handed between stages is normalized into `0.0..=1.0`.

pub mod blend;
pub mod collaborative;
pub mod content;
pub mod similarity;
pub mod trending;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{ProductId, RecommendationKind};

pub use blend::{Source, blend, with_popular_fallback};
pub use collaborative::{Interaction, InteractionMatrix, cosine_similarity};
pub use content::{ProductFeatures, UserPreferences, content_based, content_score, explain};
pub use similarity::{TfIdfIndex, similar_products, similarity_score};
pub use trending::{ActivityEvent, TrendingCounts, co_purchase_scores, tally, trending_scores};

/// A candidate product with a score from a single signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scored {
    pub product: ProductId,
    pub score: f64,
}

impl Scored {
    #[must_use]
    pub const fn new(product: ProductId, score: f64) -> Self {
        Self { product, score }
    }
}

/// A final, blended recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product: ProductId,
    /// Mean of the contributing scores, in `0.0..=1.0`.
    pub score: f64,
    /// `Blended` when more than one signal produced the product.
    pub kind: RecommendationKind,
    /// The signal that scored the product highest.
    pub primary: RecommendationKind,
    /// How many signals produced the product.
    pub sources: usize,
}

/// Descending by score, then ascending by product id for a stable order.
pub(crate) fn by_score_desc(a: &Scored, b: &Scored) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.product.cmp(&b.product))
}

/// Divide every score by the maximum so the best candidate scores 1.0,
/// drop non-positive scores, sort and truncate.
pub(crate) fn normalize_top(mut items: Vec<Scored>, limit: usize) -> Vec<Scored> {
    items.retain(|s| s.score > 0.0 && s.score.is_finite());
    let max = items.iter().map(|s| s.score).fold(0.0_f64, f64::max);
    if max > 0.0 {
        for item in &mut items {
            item.score /= max;
        }
    }
    items.sort_by(by_score_desc);
    items.truncate(limit);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_top() {
        let a = ProductId::generate();
        let b = ProductId::generate();
        let c = ProductId::generate();
        let out = normalize_top(
            vec![Scored::new(a, 2.0), Scored::new(b, 8.0), Scored::new(c, 0.0)],
            10,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].product, b);
        assert!((out[0].score - 1.0).abs() < 1e-12);
        assert!((out[1].score - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_truncates() {
        let items = (0..5)
            .map(|i| Scored::new(ProductId::generate(), f64::from(i + 1)))
            .collect();
        assert_eq!(normalize_top(items, 3).len(), 3);
    }
}
