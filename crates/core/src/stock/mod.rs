//! Inventory analytics for admin-owned stock.
//!
//! Everything here works on a zero-filled daily sales series, oldest day
//! first. The database layer is responsible for building that series from
//! paid orders over the last [`HISTORY_DAYS`] days.
//!
//! ```text
//! daily sales ──► SalesMetrics ──► health_score ──► StockStatus
//!      │                                 │
//!      └──► DemandForecast ──► ReorderPlan   └──► alerts
//! ```

mod forecast;
mod metrics;
mod reorder;

pub use forecast::{
    DemandForecast, LONG_HORIZON, MONTHLY_FACTORS, SHORT_HORIZON, SMOOTHING_ALPHA, TrendDirection,
    confidence_interval, exponential_smoothing, extend, linear_regression, seasonal_factor,
    simple_moving_average, weighted_average,
};
pub use metrics::{SalesMetrics, StockStatus, health_score, mean, seasonality, trend, variance};
pub use reorder::{
    AlertKind, AlertPriority, NO_REORDER_DAYS, ReorderPlan, StockAlert, Urgency,
    economic_order_quantity, generate_alerts, safety_stock,
};

use serde::{Deserialize, Serialize};

use crate::types::Xaf;

/// Days of sales history fed to the analysis.
pub const HISTORY_DAYS: usize = 90;

/// What the analysis needs to know about one stock line.
#[derive(Debug, Clone, Copy)]
pub struct StockInput<'a> {
    pub title: &'a str,
    pub current_stock: i64,
    pub threshold: i64,
    pub unit_price: Xaf,
    pub daily_sales: &'a [f64],
    /// Calendar month (1 to 12) used for the seasonal factor.
    pub month: u32,
}

/// Full analysis of one stock line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReport {
    pub current_stock: i64,
    pub threshold: i64,
    pub metrics: SalesMetrics,
    pub health_score: f64,
    pub status: StockStatus,
    pub forecast: DemandForecast,
    pub reorder: ReorderPlan,
    pub alerts: Vec<StockAlert>,
}

/// Run metrics, health, forecast, reorder planning and alerting.
#[must_use]
pub fn analyse(input: &StockInput<'_>) -> StockReport {
    let metrics = SalesMetrics::from_daily(input.daily_sales);
    let health = health_score(input.current_stock, input.threshold, &metrics);
    let forecast = DemandForecast::from_history(input.daily_sales, input.month);
    let reorder = ReorderPlan::compute(
        input.current_stock,
        input.threshold,
        input.unit_price,
        input.daily_sales.len(),
        &metrics,
        &forecast,
    );
    StockReport {
        current_stock: input.current_stock,
        threshold: input.threshold,
        status: StockStatus::classify(input.current_stock, input.threshold, health),
        alerts: generate_alerts(input.title, input.current_stock, input.threshold, health),
        health_score: health,
        metrics,
        forecast,
        reorder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyse_out_of_stock() {
        let sales = vec![0.0; HISTORY_DAYS];
        let report = analyse(&StockInput {
            title: "Ventilateur",
            current_stock: 0,
            threshold: 5,
            unit_price: Xaf::from_francs(15_000),
            daily_sales: &sales,
            month: 4,
        });
        assert_eq!(report.status, StockStatus::OutOfStock);
        assert_eq!(report.alerts[0].kind, AlertKind::Critical);
        assert_eq!(report.reorder.urgency, Urgency::Critical);
    }

    #[test]
    fn test_analyse_healthy_line() {
        let sales = vec![1.0; HISTORY_DAYS];
        let report = analyse(&StockInput {
            title: "Ventilateur",
            current_stock: 12,
            threshold: 5,
            unit_price: Xaf::from_francs(15_000),
            daily_sales: &sales,
            month: 4,
        });
        assert_eq!(report.status, StockStatus::GoodHealth);
        assert!(report.alerts.is_empty());
        assert!(report.health_score >= 60.0);
    }
}
