//! Reorder planning and stock alerts.

use serde::{Deserialize, Serialize};

use super::forecast::DemandForecast;
use super::metrics::SalesMetrics;
use crate::types::Xaf;

/// z-score for a 95% service level.
const SERVICE_LEVEL_Z: f64 = 1.645;
/// Replenishment lead time in days.
const LEAD_TIME_DAYS: f64 = 7.0;
/// Fixed cost of placing one order, in francs.
const ORDERING_COST: f64 = 1_000.0;
/// Yearly holding cost as a share of unit price.
const HOLDING_RATE: f64 = 0.2;
/// Sentinel when demand is zero.
pub const NO_REORDER_DAYS: f64 = 999.0;

/// Safety stock: `z·σ·√lead_time`, at least one unit. Without any sales
/// history the configured threshold is used instead.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn safety_stock(metrics: &SalesMetrics, threshold: i64) -> f64 {
    if metrics.total <= 0.0 {
        return threshold.max(0) as f64;
    }
    (SERVICE_LEVEL_Z * metrics.std_dev * LEAD_TIME_DAYS.sqrt()).max(1.0)
}

/// Economic order quantity `√(2·D·S / H)` with `D` the annualized demand.
///
/// Falls back to the threshold when there are no sales or no usable price.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn economic_order_quantity(
    metrics: &SalesMetrics,
    history_days: usize,
    unit_price: Xaf,
    threshold: i64,
) -> f64 {
    let price = unit_price.to_f64();
    if metrics.total <= 0.0 || price <= 0.0 || history_days == 0 {
        return threshold.max(0) as f64;
    }
    let annual_demand = metrics.total * 365.0 / history_days as f64;
    let holding = price * HOLDING_RATE;
    (2.0 * annual_demand * ORDERING_COST / holding).sqrt().max(1.0)
}

/// How soon a reorder is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    Soon,
    Urgent,
    Critical,
}

impl Urgency {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn of(current_stock: i64, reorder_point: f64) -> Self {
        let stock = current_stock as f64;
        if stock <= reorder_point * 0.5 {
            Self::Critical
        } else if stock <= reorder_point {
            Self::Urgent
        } else if stock <= reorder_point * 1.5 {
            Self::Soon
        } else {
            Self::Normal
        }
    }
}

/// When and how much to reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderPlan {
    pub reorder_point: f64,
    pub recommended_quantity: f64,
    pub safety_stock: f64,
    pub economic_order_quantity: f64,
    pub days_until_reorder: f64,
    pub urgency: Urgency,
}

impl ReorderPlan {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(
        current_stock: i64,
        threshold: i64,
        unit_price: Xaf,
        history_days: usize,
        metrics: &SalesMetrics,
        forecast: &DemandForecast,
    ) -> Self {
        let safety = safety_stock(metrics, threshold);
        let eoq = economic_order_quantity(metrics, history_days, unit_price, threshold);
        let weekly = forecast.weekly_demand();
        let monthly = forecast.monthly_demand();
        let stock = current_stock as f64;

        let reorder_point = safety + weekly * 0.5;
        let recommended_quantity = eoq.max(monthly - stock + safety).max(0.0);
        let daily = weekly / 7.0;
        let days_until_reorder = if daily > 0.0 {
            stock / daily
        } else {
            NO_REORDER_DAYS
        };

        Self {
            reorder_point,
            recommended_quantity,
            safety_stock: safety,
            economic_order_quantity: eoq,
            days_until_reorder,
            urgency: Urgency::of(current_stock, reorder_point),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Critical,
    Warning,
    Health,
    Overstock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
}

/// A human-readable stock alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub kind: AlertKind,
    pub priority: AlertPriority,
    pub message: String,
}

impl StockAlert {
    fn new(kind: AlertKind, priority: AlertPriority, message: String) -> Self {
        Self {
            kind,
            priority,
            message,
        }
    }
}

/// Alerts for one product, most severe first.
///
/// The quantity alerts are mutually exclusive; health and overstock alerts
/// are added independently.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn generate_alerts(
    title: &str,
    current_stock: i64,
    threshold: i64,
    health: f64,
) -> Vec<StockAlert> {
    let stock = current_stock as f64;
    let limit = threshold as f64;
    let mut alerts = Vec::new();

    if current_stock <= 0 {
        alerts.push(StockAlert::new(
            AlertKind::Critical,
            AlertPriority::High,
            format!("Produit \"{title}\" en rupture de stock"),
        ));
    } else if stock <= limit * 0.2 {
        alerts.push(StockAlert::new(
            AlertKind::Critical,
            AlertPriority::High,
            format!("Stock critique pour \"{title}\" ({current_stock} restant)"),
        ));
    } else if stock <= limit * 0.5 {
        alerts.push(StockAlert::new(
            AlertKind::Warning,
            AlertPriority::Medium,
            format!("Stock faible pour \"{title}\" ({current_stock} restant)"),
        ));
    }

    if health < 30.0 {
        alerts.push(StockAlert::new(
            AlertKind::Health,
            AlertPriority::Medium,
            format!("Santé du stock dégradée pour \"{title}\" (score: {health:.1})"),
        ));
    }

    if threshold > 0 && stock > limit * 3.0 {
        alerts.push(StockAlert::new(
            AlertKind::Overstock,
            AlertPriority::Low,
            format!("Stock élevé pour \"{title}\" ({current_stock} en stock)"),
        ));
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_stock_without_sales_uses_threshold() {
        let none = SalesMetrics::from_daily(&[0.0; 30]);
        assert!((safety_stock(&none, 5) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_safety_stock_floor() {
        let steady = SalesMetrics::from_daily(&[2.0; 30]);
        // zero deviation still keeps one unit in reserve
        assert!((safety_stock(&steady, 5) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_eoq() {
        let steady = SalesMetrics::from_daily(&[1.0; 365]);
        // √(2·365·1000 / (10000·0.2)) = √365
        let eoq = economic_order_quantity(&steady, 365, Xaf::from_francs(10_000), 5);
        assert!((eoq - 365.0_f64.sqrt()).abs() < 1e-9);
        assert!((economic_order_quantity(&steady, 365, Xaf::ZERO, 5) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_urgency_bands() {
        assert_eq!(Urgency::of(2, 10.0), Urgency::Critical);
        assert_eq!(Urgency::of(8, 10.0), Urgency::Urgent);
        assert_eq!(Urgency::of(14, 10.0), Urgency::Soon);
        assert_eq!(Urgency::of(30, 10.0), Urgency::Normal);
    }

    #[test]
    fn test_plan_without_demand() {
        let history = [0.0; 90];
        let metrics = SalesMetrics::from_daily(&history);
        let forecast = DemandForecast::from_history(&history, 1);
        let plan = ReorderPlan::compute(10, 5, Xaf::from_francs(5_000), 90, &metrics, &forecast);
        assert!((plan.days_until_reorder - NO_REORDER_DAYS).abs() < f64::EPSILON);
        assert!((plan.reorder_point - 5.0).abs() < f64::EPSILON);
        assert_eq!(plan.urgency, Urgency::Normal);
    }

    #[test]
    fn test_plan_with_steady_demand() {
        let history = [2.0; 90];
        let metrics = SalesMetrics::from_daily(&history);
        let forecast = DemandForecast::from_history(&history, 1);
        let plan = ReorderPlan::compute(14, 5, Xaf::from_francs(5_000), 90, &metrics, &forecast);
        assert!((plan.days_until_reorder - 7.0).abs() < 1e-6);
        // safety 1 + half of a 14-unit week
        assert!((plan.reorder_point - 8.0).abs() < 1e-6);
        assert!(plan.recommended_quantity >= plan.economic_order_quantity);
    }

    #[test]
    fn test_alerts() {
        let out = generate_alerts("Radio", 0, 10, 90.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, "Produit \"Radio\" en rupture de stock");

        let low = generate_alerts("Radio", 4, 10, 20.0);
        assert_eq!(low[0].kind, AlertKind::Warning);
        assert_eq!(low[1].message, "Santé du stock dégradée pour \"Radio\" (score: 20.0)");

        let over = generate_alerts("Radio", 40, 10, 80.0);
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].kind, AlertKind::Overstock);
        assert_eq!(over[0].priority, AlertPriority::Low);
    }
}
