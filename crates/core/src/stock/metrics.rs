//! Sales statistics and stock health.

use serde::{Deserialize, Serialize};

/// Least-squares slope of `data` against its index.
///
/// Fewer than two points have no trend.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn trend(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let x_sum: f64 = (0..n).map(|i| i as f64).sum();
    let y_sum: f64 = data.iter().sum();
    let xy_sum: f64 = data.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let x2_sum: f64 = (0..n).map(|i| (i as f64) * (i as f64)).sum();
    let denominator = n_f * x2_sum - x_sum * x_sum;
    if denominator.abs() <= f64::EPSILON {
        return 0.0;
    }
    (n_f * xy_sum - x_sum * y_sum) / denominator
}

/// Arithmetic mean, 0 for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        0.0
    } else {
        data.iter().sum::<f64>() / data.len() as f64
    }
}

/// Population variance, 0 for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn variance(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64
}

/// Ratio of the last 7 days' mean to the overall mean.
///
/// 1.0 when there is no data or no sales at all.
#[must_use]
pub fn seasonality(data: &[f64]) -> f64 {
    let overall = mean(data);
    if overall <= 0.0 {
        return 1.0;
    }
    mean(last(data, 7)) / overall
}

/// The last `n` elements (or all of them).
#[must_use]
pub fn last(data: &[f64], n: usize) -> &[f64] {
    data.get(data.len().saturating_sub(n)..).unwrap_or(data)
}

/// Sales statistics over a daily series (oldest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesMetrics {
    /// Units sold over the whole history window.
    pub total: f64,
    /// Mean units per day over the last 30 days.
    pub avg_daily_sales: f64,
    /// Population standard deviation over the whole history.
    pub std_dev: f64,
    pub trend_7d: f64,
    pub trend_30d: f64,
    pub seasonality: f64,
    /// Index into the last 30 days of the best day.
    pub peak_day: usize,
    /// Index into the last 30 days of the worst day.
    pub low_day: usize,
}

impl SalesMetrics {
    #[must_use]
    pub fn from_daily(history: &[f64]) -> Self {
        let last_30 = last(history, 30);
        let last_7 = last(history, 7);
        Self {
            total: history.iter().sum(),
            avg_daily_sales: mean(last_30),
            std_dev: variance(history).sqrt(),
            trend_7d: trend(last_7),
            trend_30d: trend(last_30),
            seasonality: seasonality(last_30),
            peak_day: position_by(last_30, |a, b| a > b),
            low_day: position_by(last_30, |a, b| a < b),
        }
    }
}

/// First index whose value beats every earlier one under `better`.
fn position_by(data: &[f64], better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for (i, value) in data.iter().enumerate() {
        if let Some(current) = data.get(best)
            && better(*value, *current)
        {
            best = i;
        }
    }
    best
}

/// Stock health, 0 to 100.
///
/// | Component   | Points | Rule |
/// |-------------|--------|------|
/// | Stock level | 40     | > 2×threshold 40, > threshold 30, > ½ threshold 20, > 0 10 |
/// | Trend (7d)  | 30     | > 0.1 30, > −0.1 20, > −0.3 10 |
/// | Coverage    | 20     | days of stock 7–30 20, 3–60 15, > 60 5 (only with sales) |
/// | Seasonality | 10     | 0.8–1.2 10, 0.6–1.4 5 |
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn health_score(current_stock: i64, threshold: i64, metrics: &SalesMetrics) -> f64 {
    let stock = current_stock as f64;
    let threshold = threshold as f64;
    let mut score: f64 = 0.0;

    score += if stock > threshold * 2.0 {
        40.0
    } else if stock > threshold {
        30.0
    } else if stock > threshold * 0.5 {
        20.0
    } else if stock > 0.0 {
        10.0
    } else {
        0.0
    };

    score += if metrics.trend_7d > 0.1 {
        30.0
    } else if metrics.trend_7d > -0.1 {
        20.0
    } else if metrics.trend_7d > -0.3 {
        10.0
    } else {
        0.0
    };

    if metrics.avg_daily_sales > 0.0 {
        let days_of_stock = stock / metrics.avg_daily_sales;
        score += if (7.0..=30.0).contains(&days_of_stock) {
            20.0
        } else if (3.0..=60.0).contains(&days_of_stock) {
            15.0
        } else if days_of_stock > 60.0 {
            5.0
        } else {
            0.0
        };
    }

    score += if (0.8..=1.2).contains(&metrics.seasonality) {
        10.0
    } else if (0.6..=1.4).contains(&metrics.seasonality) {
        5.0
    } else {
        0.0
    };

    score.min(100.0)
}

/// Overall stock classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    Critical,
    Low,
    Moderate,
    PoorHealth,
    FairHealth,
    GoodHealth,
}

impl StockStatus {
    /// Quantity thresholds first, then health bands.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn classify(current_stock: i64, threshold: i64, health: f64) -> Self {
        let stock = current_stock as f64;
        let threshold = threshold as f64;
        if current_stock <= 0 {
            Self::OutOfStock
        } else if stock <= threshold * 0.2 {
            Self::Critical
        } else if stock <= threshold * 0.5 {
            Self::Low
        } else if stock <= threshold {
            Self::Moderate
        } else if health < 30.0 {
            Self::PoorHealth
        } else if health < 60.0 {
            Self::FairHealth
        } else {
            Self::GoodHealth
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_of_a_line() {
        assert!((trend(&[1.0, 2.0, 3.0, 4.0]) - 1.0).abs() < 1e-12);
        assert!((trend(&[8.0, 6.0, 4.0]) + 2.0).abs() < 1e-12);
        assert!(trend(&[5.0]).abs() < f64::EPSILON);
        assert!(trend(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_seasonality() {
        let flat = vec![2.0; 30];
        assert!((seasonality(&flat) - 1.0).abs() < 1e-12);

        let mut rising = vec![1.0; 23];
        rising.extend([3.0; 7]);
        // overall mean = (23 + 21) / 30
        let expected = 3.0 / (44.0 / 30.0);
        assert!((seasonality(&rising) - expected).abs() < 1e-12);

        assert!((seasonality(&[0.0; 10]) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metrics_peak_and_low() {
        let m = SalesMetrics::from_daily(&[1.0, 4.0, 0.0, 4.0, 2.0]);
        assert_eq!(m.peak_day, 1);
        assert_eq!(m.low_day, 2);
        assert!((m.total - 11.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_health_score_components() {
        let steady = SalesMetrics::from_daily(&[1.0; 30]);
        // 40 (stock 20 > 2×5) + 20 (flat trend) + 20 (20 days of stock) + 10
        assert!((health_score(20, 5, &steady) - 90.0).abs() < f64::EPSILON);

        let mut growing_data: Vec<f64> = vec![1.0; 23];
        growing_data.extend([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let growing = SalesMetrics::from_daily(&growing_data);
        assert!(growing.trend_7d > 0.1);
        let score = health_score(60, 5, &growing);
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn test_health_score_without_sales() {
        let none = SalesMetrics::from_daily(&[]);
        // only trend (20) and seasonality (10) apply to an empty shelf
        assert!((health_score(0, 5, &none) - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_classify() {
        assert_eq!(StockStatus::classify(0, 10, 90.0), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(2, 10, 90.0), StockStatus::Critical);
        assert_eq!(StockStatus::classify(5, 10, 90.0), StockStatus::Low);
        assert_eq!(StockStatus::classify(10, 10, 90.0), StockStatus::Moderate);
        assert_eq!(StockStatus::classify(11, 10, 20.0), StockStatus::PoorHealth);
        assert_eq!(StockStatus::classify(11, 10, 45.0), StockStatus::FairHealth);
        assert_eq!(StockStatus::classify(11, 10, 75.0), StockStatus::GoodHealth);
    }
}
