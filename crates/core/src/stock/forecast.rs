//! Demand forecasting.

use serde::{Deserialize, Serialize};

use super::metrics::{last, mean, trend, variance};

/// Days covered by the short-term forecasts.
pub const SHORT_HORIZON: usize = 7;
/// Days covered by the extended forecast.
pub const LONG_HORIZON: usize = 30;
/// Smoothing factor for exponential smoothing.
pub const SMOOTHING_ALPHA: f64 = 0.3;

const SMA_WEIGHT: f64 = 0.3;
const ES_WEIGHT: f64 = 0.4;
const LR_WEIGHT: f64 = 0.3;

/// Demand multiplier per calendar month (January first).
pub const MONTHLY_FACTORS: [f64; 12] = [0.8, 0.9, 1.0, 1.1, 1.2, 1.1, 1.0, 0.9, 1.0, 1.1, 1.2, 1.3];

/// Simple moving average over shrinking trailing windows.
///
/// Step `i` is the mean of the last `window − i` observations. With fewer
/// than `window` observations the overall mean is repeated `window` times.
#[must_use]
pub fn simple_moving_average(data: &[f64], window: usize) -> Vec<f64> {
    if data.is_empty() {
        return vec![0.0; window];
    }
    if data.len() < window {
        return vec![mean(data); window];
    }
    (0..window)
        .map(|i| mean(last(data, window - i)))
        .collect()
}

/// Exponential smoothing, projected `horizon` steps ahead.
///
/// Each projected step keeps smoothing toward the last observation.
#[must_use]
pub fn exponential_smoothing(data: &[f64], alpha: f64, horizon: usize) -> Vec<f64> {
    let Some((&first, rest)) = data.split_first() else {
        return vec![0.0; horizon];
    };
    let mut level = first;
    for value in rest {
        level = alpha * value + (1.0 - alpha) * level;
    }
    let anchor = data.last().copied().unwrap_or(first);
    (0..horizon)
        .map(|_| {
            level = alpha * anchor + (1.0 - alpha) * level;
            level
        })
        .collect()
}

/// Extrapolate the least-squares line for the next `horizon` days,
/// clamped at zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn linear_regression(data: &[f64], horizon: usize) -> Vec<f64> {
    if data.len() < 2 {
        let value = data.first().copied().unwrap_or(0.0).max(0.0);
        return vec![value; horizon];
    }
    let n = data.len();
    let slope = trend(data);
    let x_mean = (n - 1) as f64 / 2.0;
    let intercept = mean(data) - slope * x_mean;
    (n..n + horizon)
        .map(|x| (slope * x as f64 + intercept).max(0.0))
        .collect()
}

/// Weighted average of several forecasts, step by step.
///
/// Weights are normalized; a forecast shorter than the others simply stops
/// contributing past its end.
#[must_use]
pub fn weighted_average(forecasts: &[(&[f64], f64)]) -> Vec<f64> {
    let total_weight: f64 = forecasts.iter().map(|(_, w)| w).sum();
    if total_weight <= 0.0 {
        return Vec::new();
    }
    let len = forecasts.iter().map(|(f, _)| f.len()).max().unwrap_or(0);
    (0..len)
        .map(|i| {
            forecasts
                .iter()
                .filter_map(|(f, w)| f.get(i).map(|v| v * (w / total_weight)))
                .sum()
        })
        .collect()
}

/// Pad a forecast to `days` entries by repeating its last value.
#[must_use]
pub fn extend(short: &[f64], days: usize) -> Vec<f64> {
    let Some(&last_value) = short.last() else {
        return Vec::new();
    };
    let mut out = short.to_vec();
    out.resize(days.max(short.len()), last_value);
    out
}

/// 95% confidence interval of the mean daily demand.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn confidence_interval(data: &[f64]) -> (f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    let m = mean(data);
    let margin = 1.96 * (variance(data) / data.len() as f64).sqrt();
    (m - margin, m + margin)
}

/// Direction of demand over the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    #[must_use]
    pub fn of(data: &[f64]) -> Self {
        let slope = trend(data);
        if slope > 0.1 {
            Self::Increasing
        } else if slope < -0.1 {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }
}

/// Seasonal factor for a month number (1 = January). Out-of-range months
/// get a neutral 1.0.
#[must_use]
pub fn seasonal_factor(month: u32) -> f64 {
    month
        .checked_sub(1)
        .and_then(|i| usize::try_from(i).ok())
        .and_then(|i| MONTHLY_FACTORS.get(i))
        .copied()
        .unwrap_or(1.0)
}

/// Blended demand forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    pub next_7_days: Vec<f64>,
    pub next_30_days: Vec<f64>,
    pub confidence_interval: (f64, f64),
    pub seasonal_adjustment: f64,
    pub trend_direction: TrendDirection,
}

impl DemandForecast {
    /// Blend SMA (0.3), exponential smoothing (0.4) and linear regression
    /// (0.3) for the next week, then extend to 30 days.
    #[must_use]
    pub fn from_history(history: &[f64], month: u32) -> Self {
        if history.is_empty() {
            return Self {
                next_7_days: vec![0.0; SHORT_HORIZON],
                next_30_days: vec![0.0; LONG_HORIZON],
                confidence_interval: (0.0, 0.0),
                seasonal_adjustment: seasonal_factor(month),
                trend_direction: TrendDirection::Stable,
            };
        }

        let sma = simple_moving_average(history, SHORT_HORIZON);
        let es = exponential_smoothing(history, SMOOTHING_ALPHA, SHORT_HORIZON);
        let lr = linear_regression(history, SHORT_HORIZON);
        let next_7_days: Vec<f64> = weighted_average(&[
            (sma.as_slice(), SMA_WEIGHT),
            (es.as_slice(), ES_WEIGHT),
            (lr.as_slice(), LR_WEIGHT),
        ])
        .into_iter()
        .map(|v| v.max(0.0))
        .collect();
        let next_30_days = extend(&next_7_days, LONG_HORIZON);

        Self {
            next_7_days,
            next_30_days,
            confidence_interval: confidence_interval(history),
            seasonal_adjustment: seasonal_factor(month),
            trend_direction: TrendDirection::of(history),
        }
    }

    #[must_use]
    pub fn weekly_demand(&self) -> f64 {
        self.next_7_days.iter().sum()
    }

    #[must_use]
    pub fn monthly_demand(&self) -> f64 {
        self.next_30_days.iter().sum()
    }

    /// Monthly demand scaled by the seasonal factor.
    #[must_use]
    pub fn seasonally_adjusted_monthly_demand(&self) -> f64 {
        self.monthly_demand() * self.seasonal_adjustment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_short_history() {
        assert_eq!(simple_moving_average(&[2.0, 4.0], 7), vec![3.0; 7]);
    }

    #[test]
    fn test_sma_shrinking_windows() {
        let data: Vec<f64> = (1..=7).map(f64::from).collect();
        let sma = simple_moving_average(&data, 7);
        assert!((sma[0] - 4.0).abs() < 1e-12);
        assert!((sma[6] - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_es_converges_to_last_value() {
        let es = exponential_smoothing(&[10.0, 10.0, 0.0], 0.3, 7);
        assert_eq!(es.len(), 7);
        assert!(es.windows(2).all(|w| w[1] <= w[0]));
        assert!(es.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_lr_extrapolates_and_clamps() {
        let lr = linear_regression(&[1.0, 2.0, 3.0], 2);
        assert!((lr[0] - 4.0).abs() < 1e-12);
        assert!((lr[1] - 5.0).abs() < 1e-12);

        let falling = linear_regression(&[3.0, 2.0, 1.0], 3);
        assert!(falling.iter().all(|v| *v >= 0.0));
        assert!(falling[2].abs() < f64::EPSILON);
    }

    #[test]
    fn test_weighted_average() {
        let a = [1.0, 1.0];
        let b = [3.0];
        let out = weighted_average(&[(&a[..], 1.0), (&b[..], 1.0)]);
        assert!((out[0] - 2.0).abs() < 1e-12);
        assert!((out[1] - 0.5).abs() < 1e-12);
        assert!(weighted_average(&[(&a[..], 0.0)]).is_empty());
    }

    #[test]
    fn test_extend() {
        assert_eq!(extend(&[1.0, 2.0], 4), vec![1.0, 2.0, 2.0, 2.0]);
        assert!(extend(&[], 30).is_empty());
    }

    #[test]
    fn test_confidence_interval() {
        let (lo, hi) = confidence_interval(&[2.0, 4.0]);
        // mean 3, variance 1, std error sqrt(1/2)
        let margin = 1.96 * 0.5_f64.sqrt();
        assert!((lo - (3.0 - margin)).abs() < 1e-12);
        assert!((hi - (3.0 + margin)).abs() < 1e-12);
    }

    #[test]
    fn test_seasonal_factor() {
        assert!((seasonal_factor(1) - 0.8).abs() < f64::EPSILON);
        assert!((seasonal_factor(12) - 1.3).abs() < f64::EPSILON);
        assert!((seasonal_factor(0) - 1.0).abs() < f64::EPSILON);
        assert!((seasonal_factor(13) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_forecast_shape() {
        let history: Vec<f64> = (0..90).map(|i| f64::from(i % 5)).collect();
        let f = DemandForecast::from_history(&history, 6);
        assert_eq!(f.next_7_days.len(), 7);
        assert_eq!(f.next_30_days.len(), 30);
        assert!(f.next_30_days.iter().all(|v| *v >= 0.0));
        assert!((f.seasonal_adjustment - 1.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_forecast_empty_history() {
        let f = DemandForecast::from_history(&[], 3);
        assert_eq!(f.next_30_days, vec![0.0; 30]);
        assert_eq!(f.trend_direction, TrendDirection::Stable);
    }

    #[test]
    fn test_trend_direction() {
        assert_eq!(TrendDirection::of(&[1.0, 2.0, 3.0]), TrendDirection::Increasing);
        assert_eq!(TrendDirection::of(&[3.0, 2.0, 1.0]), TrendDirection::Decreasing);
        assert_eq!(TrendDirection::of(&[2.0, 2.0]), TrendDirection::Stable);
    }
}
