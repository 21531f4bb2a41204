//! User-based collaborative filtering.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use super::{Scored, normalize_top};
use crate::types::{InteractionKind, ProductId, UserId};

/// One tracked action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub user: UserId,
    pub product: ProductId,
    pub kind: InteractionKind,
}

/// Cosine similarity of two sparse vectors.
///
/// Returns 0.0 when either vector has zero norm. The result is clamped to
/// `-1.0..=1.0` to absorb rounding.
#[must_use]
pub fn cosine_similarity<K: Eq + Hash>(a: &HashMap<K, f64>, b: &HashMap<K, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(key, x)| large.get(key).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Sparse user×product matrix of summed interaction weights.
#[derive(Debug, Clone, Default)]
pub struct InteractionMatrix {
    rows: HashMap<UserId, HashMap<ProductId, f64>>,
}

impl InteractionMatrix {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the weight of `kind` to the `(user, product)` cell.
    pub fn record(&mut self, user: UserId, product: ProductId, kind: InteractionKind) {
        *self
            .rows
            .entry(user)
            .or_default()
            .entry(product)
            .or_insert(0.0) += kind.weight();
    }

    #[must_use]
    pub fn from_interactions<I>(interactions: I) -> Self
    where
        I: IntoIterator<Item = Interaction>,
    {
        let mut matrix = Self::new();
        for i in interactions {
            matrix.record(i.user, i.product, i.kind);
        }
        matrix
    }

    /// Number of users with at least one interaction.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The weight of a single cell (0.0 when absent).
    #[must_use]
    pub fn weight(&self, user: UserId, product: ProductId) -> f64 {
        self.rows
            .get(&user)
            .and_then(|row| row.get(&product))
            .copied()
            .unwrap_or(0.0)
    }

    /// Products the user has touched in any way.
    #[must_use]
    pub fn interacted(&self, user: UserId) -> HashSet<ProductId> {
        self.rows
            .get(&user)
            .map(|row| row.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Cosine similarity between two users' rows.
    #[must_use]
    pub fn similarity(&self, a: UserId, b: UserId) -> f64 {
        match (self.rows.get(&a), self.rows.get(&b)) {
            (Some(ra), Some(rb)) => cosine_similarity(ra, rb),
            _ => 0.0,
        }
    }

    /// The `k` users most similar to `user`, with positive similarity only.
    #[must_use]
    pub fn neighbours(&self, user: UserId, k: usize) -> Vec<(UserId, f64)> {
        let Some(target) = self.rows.get(&user) else {
            return Vec::new();
        };
        let mut scored: Vec<(UserId, f64)> = self
            .rows
            .iter()
            .filter(|(other, _)| **other != user)
            .map(|(other, row)| (*other, cosine_similarity(target, row)))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    /// Recommend products the user has not interacted with.
    ///
    /// Each candidate scores `Σ sim(u, v)·w(v, p) / Σ |sim(u, v)|` over the
    /// `k` nearest neighbours; the list is normalized so the best candidate
    /// scores 1.0.
    #[must_use]
    pub fn collaborative(&self, user: UserId, k: usize, limit: usize) -> Vec<Scored> {
        let neighbours = self.neighbours(user, k);
        let total_similarity: f64 = neighbours.iter().map(|(_, sim)| sim.abs()).sum();
        if total_similarity <= f64::EPSILON {
            return Vec::new();
        }

        let seen = self.interacted(user);
        let mut accumulated: HashMap<ProductId, f64> = HashMap::new();
        for (neighbour, sim) in &neighbours {
            let Some(row) = self.rows.get(neighbour) else {
                continue;
            };
            for (product, weight) in row {
                if seen.contains(product) {
                    continue;
                }
                *accumulated.entry(*product).or_insert(0.0) += sim * weight;
            }
        }

        let items = accumulated
            .into_iter()
            .map(|(product, sum)| Scored::new(product, sum / total_similarity))
            .collect();
        normalize_top(items, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<const N: usize>() -> [ProductId; N] {
        std::array::from_fn(|_| ProductId::generate())
    }

    fn hit(user: UserId, product: ProductId, kind: InteractionKind) -> Interaction {
        Interaction {
            user,
            product,
            kind,
        }
    }

    #[test]
    fn test_cosine_basics() {
        let a: HashMap<u8, f64> = [(1, 1.0), (2, 2.0)].into_iter().collect();
        let b: HashMap<u8, f64> = [(1, 2.0), (2, 4.0)].into_iter().collect();
        let c: HashMap<u8, f64> = [(3, 5.0)].into_iter().collect();
        let empty: HashMap<u8, f64> = HashMap::new();

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&a, &c).abs() < 1e-12);
        assert!(cosine_similarity(&a, &empty).abs() < 1e-12);
        assert!((cosine_similarity(&a, &c) - cosine_similarity(&c, &a)).abs() < 1e-12);
    }

    #[test]
    fn test_weights_accumulate() {
        let user = UserId::generate();
        let [p] = ids::<1>();
        let mut m = InteractionMatrix::new();
        m.record(user, p, InteractionKind::View);
        m.record(user, p, InteractionKind::Like);
        m.record(user, p, InteractionKind::Purchase);
        assert!((m.weight(user, p) - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recommends_what_similar_users_liked() {
        let alice = UserId::generate();
        let bruno = UserId::generate();
        let carine = UserId::generate();
        let [phone, case, charger, sofa] = ids::<4>();

        let m = InteractionMatrix::from_interactions([
            hit(alice, phone, InteractionKind::Purchase),
            hit(alice, case, InteractionKind::Like),
            hit(bruno, phone, InteractionKind::Purchase),
            hit(bruno, case, InteractionKind::Like),
            hit(bruno, charger, InteractionKind::Purchase),
            hit(carine, sofa, InteractionKind::Purchase),
        ]);

        let recs = m.collaborative(alice, 5, 10);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].product, charger);
        assert!((recs[0].score - 1.0).abs() < 1e-12);
        // carine shares nothing with alice, so the sofa is never suggested
        assert!(recs.iter().all(|r| r.product != sofa));
    }

    #[test]
    fn test_excludes_already_seen_products() {
        let u1 = UserId::generate();
        let u2 = UserId::generate();
        let [a, b] = ids::<2>();
        let m = InteractionMatrix::from_interactions([
            hit(u1, a, InteractionKind::View),
            hit(u1, b, InteractionKind::View),
            hit(u2, a, InteractionKind::Like),
            hit(u2, b, InteractionKind::Like),
        ]);
        assert!(m.collaborative(u1, 5, 10).is_empty());
    }

    #[test]
    fn test_unknown_user_gets_nothing() {
        let m = InteractionMatrix::new();
        assert!(m.collaborative(UserId::generate(), 5, 10).is_empty());
        assert!(m.is_empty());
    }

    #[test]
    fn test_neighbours_are_sorted_and_limited() {
        let me = UserId::generate();
        let close = UserId::generate();
        let far = UserId::generate();
        let [a, b, c] = ids::<3>();
        let m = InteractionMatrix::from_interactions([
            hit(me, a, InteractionKind::Purchase),
            hit(me, b, InteractionKind::Purchase),
            hit(close, a, InteractionKind::Purchase),
            hit(close, b, InteractionKind::Purchase),
            hit(far, a, InteractionKind::View),
            hit(far, c, InteractionKind::Purchase),
        ]);
        let n = m.neighbours(me, 1);
        assert_eq!(n.len(), 1);
        assert_eq!(n[0].0, close);
        assert!(m.similarity(me, close) > m.similarity(me, far));
    }
}
