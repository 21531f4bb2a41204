//! Back-office reports: platform stock health and commission earnings.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use vide_grenier_core::commission::{
    CommissionDistribution, CommissionError, CommissionRecord, PayoutRecommendation,
    SellerSummary, payout_recommendations, request_payout, weekly_growth_rate, weekly_totals,
};
use vide_grenier_core::stock::{HISTORY_DAYS, StockInput, StockReport, analyse};
use vide_grenier_core::{AdminStockId, NotificationKind, UserId, Xaf};

use super::notifier::Notifier;
use crate::db::RepositoryError;
use crate::db::backoffice::BackofficeRepository;
use crate::db::finance::FinanceRepository;
use crate::db::orders::OrderRepository;
use crate::models::AdminStockItem;

/// Sellers listed in the commission report.
pub const TOP_SELLERS: usize = 10;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("stock item not found")]
    StockNotFound,

    #[error(transparent)]
    Payout(#[from] CommissionError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// One admin stock line with its analysis.
#[derive(Debug, Clone, Serialize)]
pub struct StockLineReport {
    #[serde(flatten)]
    pub item: AdminStockItem,
    pub profit_margin: Decimal,
    pub analysis: StockReport,
}

/// Platform commission over a period.
#[derive(Debug, Clone, Serialize)]
pub struct CommissionReport {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub order_count: usize,
    pub total_sales: Xaf,
    pub total_commission: Xaf,
    pub average_commission: Xaf,
    pub distribution: CommissionDistribution,
    pub weekly: Vec<(DateTime<Utc>, Xaf)>,
    pub growth_rate: Decimal,
    pub top_sellers: Vec<SellerSummary>,
    pub payouts: Vec<PayoutRecommendation>,
}

impl CommissionReport {
    /// Build the report from every sale record. Seller balances use all
    /// records; the period figures only those inside `[start, end)`.
    #[must_use]
    pub fn build(
        records: &[CommissionRecord],
        paid_out: &HashMap<UserId, Xaf>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let in_period: Vec<CommissionRecord> = records
            .iter()
            .filter(|r| r.at >= start && r.at < end)
            .copied()
            .collect();
        let total_sales: Xaf = in_period.iter().map(|r| r.total).sum();
        let total_commission: Xaf = in_period.iter().map(|r| r.commission).sum();
        let average_commission = if in_period.is_empty() {
            Xaf::ZERO
        } else {
            Xaf::new(
                (total_commission.amount() / Decimal::from(in_period.len()))
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
            )
        };

        let weekly = weekly_totals(&in_period, start, end);
        let weekly_amounts: Vec<Xaf> = weekly.iter().map(|(_, amount)| *amount).collect();

        let sellers: BTreeSet<UserId> = records.iter().map(|r| r.seller).collect();
        let summaries: Vec<SellerSummary> = sellers
            .into_iter()
            .map(|seller| {
                let paid = paid_out.get(&seller).copied().unwrap_or(Xaf::ZERO);
                SellerSummary::from_records(seller, records, paid)
            })
            .collect();
        let payouts = payout_recommendations(&summaries);

        let mut top_sellers = summaries;
        top_sellers.sort_by(|a, b| {
            b.total_commission
                .cmp(&a.total_commission)
                .then_with(|| a.seller.cmp(&b.seller))
        });
        top_sellers.truncate(TOP_SELLERS);

        Self {
            period_start: start,
            period_end: end,
            order_count: in_period.len(),
            total_sales,
            total_commission,
            average_commission,
            distribution: CommissionDistribution::from_amounts(
                in_period.iter().map(|r| r.commission),
            ),
            growth_rate: weekly_growth_rate(&weekly_amounts),
            weekly,
            top_sellers,
            payouts,
        }
    }
}

/// Report service.
pub struct ReportService<'a> {
    orders: OrderRepository<'a>,
    backoffice: BackofficeRepository<'a>,
    finance: FinanceRepository<'a>,
}

impl<'a> ReportService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            orders: OrderRepository::new(pool),
            backoffice: BackofficeRepository::new(pool),
            finance: FinanceRepository::new(pool),
        }
    }

    /// Analyse every admin stock line against its sales history.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Repository` if a query fails.
    #[instrument(skip(self))]
    pub async fn stock_report(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockLineReport>, ReportError> {
        let items = self.backoffice.admin_stock(None).await?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.analyse_line(item, now).await?);
        }
        Ok(out)
    }

    /// Analyse one admin stock line.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::StockNotFound` for an unknown line.
    pub async fn stock_line(
        &self,
        id: AdminStockId,
        now: DateTime<Utc>,
    ) -> Result<StockLineReport, ReportError> {
        let item = self
            .backoffice
            .admin_stock_item(id)
            .await?
            .ok_or(ReportError::StockNotFound)?;
        self.analyse_line(item, now).await
    }

    async fn analyse_line(
        &self,
        item: AdminStockItem,
        now: DateTime<Utc>,
    ) -> Result<StockLineReport, ReportError> {
        let sales = self.orders.daily_sales(item.product_id, HISTORY_DAYS, now).await?;
        let analysis = analyse(&StockInput {
            title: &item.product_title,
            current_stock: i64::from(item.quantity),
            threshold: i64::from(item.low_stock_threshold),
            unit_price: item.selling_price,
            daily_sales: &sales,
            month: now.month(),
        });
        Ok(StockLineReport {
            profit_margin: item.profit_margin(),
            item,
            analysis,
        })
    }

    /// Commission report over the last `days` days.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Repository` if a query fails.
    #[instrument(skip(self))]
    pub async fn commission_report(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<CommissionReport, ReportError> {
        let records = self.orders.commission_records(None).await?;
        let paid_out: HashMap<UserId, Xaf> = self.finance.paid_out().await?.into_iter().collect();
        Ok(CommissionReport::build(
            &records,
            &paid_out,
            now - Duration::days(days.max(1)),
            now,
        ))
    }

    /// One seller's earnings.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Repository` if a query fails.
    pub async fn seller_summary(&self, seller: UserId) -> Result<SellerSummary, ReportError> {
        let records = self.orders.commission_records(Some(seller)).await?;
        let paid = self
            .finance
            .paid_out()
            .await?
            .into_iter()
            .find_map(|(s, amount)| (s == seller).then_some(amount))
            .unwrap_or(Xaf::ZERO);
        Ok(SellerSummary::from_records(seller, &records, paid))
    }

    /// Record a payout to a seller, bounded by their unpaid balance.
    ///
    /// The balance is recomputed under a per-seller lock in the same
    /// transaction as the payout row, so two concurrent payouts cannot both
    /// spend it.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Payout` for non-positive amounts or amounts above
    /// the balance.
    #[instrument(skip(self, notifier))]
    pub async fn record_payout(
        &self,
        notifier: &Notifier,
        seller: UserId,
        amount: Xaf,
    ) -> Result<Xaf, ReportError> {
        let mut tx = self.finance.begin().await?;
        FinanceRepository::lock_payouts(&mut tx, seller).await?;
        let records = OrderRepository::commission_records_with(&mut *tx, Some(seller)).await?;
        let paid = FinanceRepository::paid_out_to(&mut tx, seller).await?;
        let summary = SellerSummary::from_records(seller, &records, paid);
        let remaining = request_payout(summary.balance, amount)?;
        FinanceRepository::record_payout(&mut tx, seller, amount).await?;
        tx.commit().await.map_err(RepositoryError::from)?;
        tracing::info!(seller_id = %seller, amount = %amount, remaining = %remaining, "Payout recorded");

        notifier
            .notify(
                seller,
                NotificationKind::Payment,
                "Paiement envoyé",
                &format!("Un versement de {amount} a été effectué sur votre compte."),
                serde_json::json!({ "amount": amount }),
            )
            .await;
        Ok(remaining)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vide_grenier_core::OrderId;

    fn record(seller: UserId, total: i64, commission: i64, at: DateTime<Utc>) -> CommissionRecord {
        CommissionRecord {
            seller,
            order: OrderId::generate(),
            total: Xaf::from_francs(total),
            commission: Xaf::from_francs(commission),
            seller_amount: Xaf::from_francs(total - commission),
            escrowed: false,
            at,
        }
    }

    #[test]
    fn test_commission_report_period_and_payouts() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(14);
        let big = UserId::generate();
        let small = UserId::generate();
        let records = vec![
            // before the period, still counts towards the balance
            record(big, 100_000, 5_000, start - Duration::days(3)),
            record(big, 20_000, 1_000, start + Duration::days(1)),
            record(small, 2_000, 100, start + Duration::days(9)),
        ];
        let mut paid_out = HashMap::new();
        paid_out.insert(big, Xaf::from_francs(10_000));

        let report = CommissionReport::build(&records, &paid_out, start, end);

        assert_eq!(report.order_count, 2);
        assert_eq!(report.total_commission, Xaf::from_francs(1_100));
        assert_eq!(report.average_commission, Xaf::from_francs(550));
        assert_eq!(report.weekly.len(), 2);
        assert_eq!(report.top_sellers[0].seller, big);

        // big: 120 000 sales - 6 000 commission - 10 000 paid
        assert_eq!(report.payouts.len(), 2);
        assert_eq!(report.payouts[0].seller, big);
        assert_eq!(report.payouts[0].amount, Xaf::from_francs(104_000));
    }

    #[test]
    fn test_commission_report_empty() {
        let end = Utc::now();
        let report = CommissionReport::build(&[], &HashMap::new(), end - Duration::days(30), end);
        assert_eq!(report.order_count, 0);
        assert_eq!(report.average_commission, Xaf::ZERO);
        assert!(report.payouts.is_empty());
        assert_eq!(report.growth_rate, Decimal::ZERO);
    }
}
