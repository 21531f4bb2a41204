//! Trending products and co-purchase cross-selling.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Scored, normalize_top};
use crate::types::{InteractionKind, ProductId, UserId};

/// Days of activity considered "recent".
pub const TRENDING_WINDOW_DAYS: i64 = 7;

/// A timestamped interaction, as stored in the behavior log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub product: ProductId,
    pub kind: InteractionKind,
    pub at: DateTime<Utc>,
}

/// Recent activity for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingCounts {
    pub product: ProductId,
    pub views: i64,
    pub likes: i64,
    pub purchases: i64,
}

impl TrendingCounts {
    #[must_use]
    pub const fn new(product: ProductId) -> Self {
        Self {
            product,
            views: 0,
            likes: 0,
            purchases: 0,
        }
    }

    /// `views·1 + likes·3 + purchases·5`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn raw_score(&self) -> f64 {
        self.views as f64 * InteractionKind::View.weight()
            + self.likes as f64 * InteractionKind::Like.weight()
            + self.purchases as f64 * InteractionKind::Purchase.weight()
    }
}

/// Count views, likes and purchases that happened in `(now − window, now]`.
///
/// Other interaction kinds are ignored. Output is ordered by product id.
#[must_use]
pub fn tally(
    events: &[ActivityEvent],
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<TrendingCounts> {
    let since = now - window;
    let mut counts: HashMap<ProductId, TrendingCounts> = HashMap::new();
    for event in events.iter().filter(|e| e.at > since && e.at <= now) {
        let entry = counts
            .entry(event.product)
            .or_insert_with(|| TrendingCounts::new(event.product));
        match event.kind {
            InteractionKind::View => entry.views += 1,
            InteractionKind::Like => entry.likes += 1,
            InteractionKind::Purchase => entry.purchases += 1,
            _ => {}
        }
    }
    let mut out: Vec<TrendingCounts> = counts
        .into_values()
        .filter(|c| c.views + c.likes + c.purchases > 0)
        .collect();
    out.sort_by_key(|c| c.product);
    out
}

/// Normalized trending scores, best first.
#[must_use]
pub fn trending_scores(counts: &[TrendingCounts], limit: usize) -> Vec<Scored> {
    let items = counts
        .iter()
        .map(|c| Scored::new(c.product, c.raw_score()))
        .collect();
    normalize_top(items, limit)
}

/// Products bought by the buyers of `product`, ranked by how many of those
/// buyers bought them.
///
/// `purchases` are `(buyer, product)` pairs from paid or delivered orders.
#[must_use]
pub fn co_purchase_scores(
    purchases: &[(UserId, ProductId)],
    product: ProductId,
    limit: usize,
) -> Vec<Scored> {
    let buyers: HashSet<UserId> = purchases
        .iter()
        .filter(|(_, p)| *p == product)
        .map(|(u, _)| *u)
        .collect();
    if buyers.is_empty() {
        return Vec::new();
    }

    let mut pairs: HashSet<(UserId, ProductId)> = HashSet::new();
    let mut counts: HashMap<ProductId, f64> = HashMap::new();
    for (buyer, other) in purchases {
        if *other == product || !buyers.contains(buyer) || !pairs.insert((*buyer, *other)) {
            continue;
        }
        *counts.entry(*other).or_insert(0.0) += 1.0;
    }

    let items = counts
        .into_iter()
        .map(|(p, n)| Scored::new(p, n))
        .collect();
    normalize_top(items, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(product: ProductId, kind: InteractionKind, at: DateTime<Utc>) -> ActivityEvent {
        ActivityEvent { product, kind, at }
    }

    #[test]
    fn test_tally_respects_window() {
        let now = Utc::now();
        let p = ProductId::generate();
        let events = [
            event(p, InteractionKind::View, now - Duration::days(1)),
            event(p, InteractionKind::Like, now - Duration::days(2)),
            event(p, InteractionKind::Purchase, now - Duration::days(8)),
            event(p, InteractionKind::Share, now - Duration::hours(1)),
        ];
        let counts = tally(&events, now, Duration::days(TRENDING_WINDOW_DAYS));
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].views, 1);
        assert_eq!(counts[0].likes, 1);
        assert_eq!(counts[0].purchases, 0);
        assert!((counts[0].raw_score() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_trending_prefers_purchases() {
        let viewed = ProductId::generate();
        let bought = ProductId::generate();
        let counts = [
            TrendingCounts {
                product: viewed,
                views: 4,
                likes: 0,
                purchases: 0,
            },
            TrendingCounts {
                product: bought,
                views: 0,
                likes: 0,
                purchases: 2,
            },
        ];
        let scores = trending_scores(&counts, 10);
        assert_eq!(scores[0].product, bought);
        assert!((scores[0].score - 1.0).abs() < 1e-12);
        assert!((scores[1].score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_co_purchase() {
        let (u1, u2, u3) = (UserId::generate(), UserId::generate(), UserId::generate());
        let phone = ProductId::generate();
        let case = ProductId::generate();
        let charger = ProductId::generate();
        let sofa = ProductId::generate();
        let purchases = [
            (u1, phone),
            (u1, case),
            (u1, case),
            (u2, phone),
            (u2, case),
            (u2, charger),
            (u3, sofa),
        ];
        let scores = co_purchase_scores(&purchases, phone, 5);
        let ids: Vec<ProductId> = scores.iter().map(|s| s.product).collect();
        assert_eq!(ids, vec![case, charger]);
        assert!((scores[1].score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_co_purchase_without_buyers() {
        assert!(co_purchase_scores(&[], ProductId::generate(), 5).is_empty());
    }
}
