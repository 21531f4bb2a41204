//! Merging signals into one ranked list.

use std::collections::{HashMap, HashSet};

use super::{Recommendation, Scored};
use crate::types::{ProductId, RecommendationKind};

/// Highest score a popularity filler can receive, so fillers never
/// outrank products backed by a personal signal of equal strength.
const POPULAR_SCORE_CAP: f64 = 0.5;

/// The output of one signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub kind: RecommendationKind,
    pub items: Vec<Scored>,
}

impl Source {
    #[must_use]
    pub const fn new(kind: RecommendationKind, items: Vec<Scored>) -> Self {
        Self { kind, items }
    }
}

#[derive(Default)]
struct Tally {
    sum: f64,
    count: usize,
    best: Option<(RecommendationKind, f64)>,
}

/// Deduplicate and average scores across sources.
///
/// Within a single source, a repeated product keeps its best score. Across
/// sources, the final score is the mean of the per-source scores. Ties are
/// broken by the number of contributing sources, then by product id.
#[must_use]
pub fn blend(sources: &[Source], limit: usize) -> Vec<Recommendation> {
    let mut tallies: HashMap<ProductId, Tally> = HashMap::new();

    for source in sources {
        let mut best_in_source: HashMap<ProductId, f64> = HashMap::new();
        for item in &source.items {
            if !item.score.is_finite() {
                continue;
            }
            let score = item.score.clamp(0.0, 1.0);
            best_in_source
                .entry(item.product)
                .and_modify(|s| *s = s.max(score))
                .or_insert(score);
        }

        for (product, score) in best_in_source {
            let tally = tallies.entry(product).or_default();
            tally.sum += score;
            tally.count += 1;
            if tally.best.is_none_or(|(_, best)| score > best) {
                tally.best = Some((source.kind, score));
            }
        }
    }

    let mut out: Vec<Recommendation> = tallies
        .into_iter()
        .filter_map(|(product, tally)| {
            let (primary, _) = tally.best?;
            #[allow(clippy::cast_precision_loss)]
            let score = tally.sum / tally.count as f64;
            Some(Recommendation {
                product,
                score,
                kind: if tally.count > 1 {
                    RecommendationKind::Blended
                } else {
                    primary
                },
                primary,
                sources: tally.count,
            })
        })
        .collect();

    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.sources.cmp(&a.sources))
            .then_with(|| a.product.cmp(&b.product))
    });
    out.truncate(limit);
    out
}

/// Pad `recommendations` up to `limit` with popular products.
///
/// `popular` is `(product, views)` ordered most-viewed first. Products
/// already recommended or in `exclude` are skipped. Filler scores are
/// `views / max_views · 0.5`.
#[must_use]
pub fn with_popular_fallback(
    mut recommendations: Vec<Recommendation>,
    popular: &[(ProductId, i64)],
    exclude: &HashSet<ProductId>,
    limit: usize,
) -> Vec<Recommendation> {
    if recommendations.len() >= limit {
        recommendations.truncate(limit);
        return recommendations;
    }

    let present: HashSet<ProductId> = recommendations.iter().map(|r| r.product).collect();
    let max_views = popular.iter().map(|(_, v)| *v).max().unwrap_or(0).max(1);

    for (product, views) in popular {
        if recommendations.len() >= limit {
            break;
        }
        if present.contains(product) || exclude.contains(product) {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let score = ((*views).max(0) as f64 / max_views as f64) * POPULAR_SCORE_CAP;
        recommendations.push(Recommendation {
            product: *product,
            score,
            kind: RecommendationKind::Popular,
            primary: RecommendationKind::Popular,
            sources: 1,
        });
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_averages_and_dedupes() {
        let a = ProductId::generate();
        let b = ProductId::generate();
        let c = ProductId::generate();

        let sources = [
            Source::new(
                RecommendationKind::Collaborative,
                vec![Scored::new(a, 1.0), Scored::new(b, 0.5), Scored::new(a, 0.2)],
            ),
            Source::new(RecommendationKind::ContentBased, vec![Scored::new(a, 0.6)]),
            Source::new(RecommendationKind::Trending, vec![Scored::new(c, 0.9)]),
        ];

        let out = blend(&sources, 10);
        assert_eq!(out.len(), 3);

        let products: HashSet<ProductId> = out.iter().map(|r| r.product).collect();
        assert_eq!(products.len(), out.len(), "no duplicates");

        assert_eq!(out[0].product, c);
        assert_eq!(out[0].kind, RecommendationKind::Trending);

        assert_eq!(out[1].product, a);
        assert!((out[1].score - 0.8).abs() < 1e-12);
        assert_eq!(out[1].kind, RecommendationKind::Blended);
        assert_eq!(out[1].primary, RecommendationKind::Collaborative);
        assert_eq!(out[1].sources, 2);

        assert!(out.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(out.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[test]
    fn test_blend_clamps_out_of_range_scores() {
        let a = ProductId::generate();
        let out = blend(
            &[Source::new(RecommendationKind::Similar, vec![Scored::new(a, 3.0)])],
            5,
        );
        assert!((out[0].score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tie_prefers_more_sources() {
        let single = ProductId::generate();
        let double = ProductId::generate();
        let out = blend(
            &[
                Source::new(
                    RecommendationKind::Collaborative,
                    vec![Scored::new(single, 0.5), Scored::new(double, 0.5)],
                ),
                Source::new(RecommendationKind::ContentBased, vec![Scored::new(double, 0.5)]),
            ],
            5,
        );
        assert_eq!(out[0].product, double);
    }

    #[test]
    fn test_popular_fallback_pads() {
        let a = ProductId::generate();
        let p1 = ProductId::generate();
        let p2 = ProductId::generate();
        let seen = ProductId::generate();

        let recs = blend(
            &[Source::new(RecommendationKind::Trending, vec![Scored::new(a, 0.9)])],
            3,
        );
        let exclude: HashSet<ProductId> = [seen].into_iter().collect();
        let popular = [(seen, 500), (a, 400), (p1, 200), (p2, 100)];
        let out = with_popular_fallback(recs, &popular, &exclude, 3);

        let ids: Vec<ProductId> = out.iter().map(|r| r.product).collect();
        assert_eq!(ids, vec![a, p1, p2]);
        assert_eq!(out[1].kind, RecommendationKind::Popular);
        assert!((out[1].score - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_popular_fallback_with_no_data() {
        let out = with_popular_fallback(Vec::new(), &[], &HashSet::new(), 5);
        assert!(out.is_empty());
    }
}
