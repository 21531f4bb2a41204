//! Platform commission and seller payouts.
//!
//! Two rates coexist. A listing shows the flat listing commission
//! ([`LISTING_COMMISSION_RATE`], configurable at the server) so sellers know
//! what they will net. When an order is paid, the commission actually booked
//! depends on the seller's loyalty tier and is clamped per order.
//! Admin-sourced products never carry a commission.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{LoyaltyLevel, OrderId, ProductSource, UserId, Xaf};

/// 8% shown on client listings.
pub const LISTING_COMMISSION_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);
/// Rate for sellers without a tier.
pub const DEFAULT_ORDER_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);
/// Smallest commission booked on an order.
pub const MIN_ORDER_COMMISSION: i64 = 100;
/// Largest commission booked on an order.
pub const MAX_ORDER_COMMISSION: i64 = 5_000;
/// Balance a seller needs before a payout is offered.
pub const PAYOUT_THRESHOLD: i64 = 1_000;
/// Balance above which a payout is recommended with high priority.
pub const HIGH_PRIORITY_PAYOUT: i64 = 5_000;

/// Commission errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommissionError {
    #[error("payout amount must be positive")]
    NonPositiveAmount,

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Xaf, requested: Xaf },
}

/// Commission split shown on a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingCommission {
    pub rate: Decimal,
    pub commission: Xaf,
    pub seller_amount: Xaf,
}

impl ListingCommission {
    /// `price × rate` for client products, nothing for platform stock.
    #[must_use]
    pub fn compute(price: Xaf, source: ProductSource, rate: Decimal) -> Self {
        let rate = match source {
            ProductSource::Client => rate,
            ProductSource::Admin => Decimal::ZERO,
        };
        let commission = price.times(rate).round();
        Self {
            rate,
            commission,
            seller_amount: price - commission,
        }
    }
}

/// Order commission rate for a seller's loyalty tier.
#[must_use]
pub fn tier_rate(level: Option<LoyaltyLevel>) -> Decimal {
    match level {
        Some(LoyaltyLevel::Bronze) => Decimal::from_parts(6, 0, 0, false, 2),
        Some(LoyaltyLevel::Argent) | None => DEFAULT_ORDER_RATE,
        Some(LoyaltyLevel::Or) => Decimal::from_parts(4, 0, 0, false, 2),
        Some(LoyaltyLevel::Platine) => Decimal::from_parts(3, 0, 0, false, 2),
    }
}

/// Commission booked when an order is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCommission {
    pub total: Xaf,
    pub rate: Decimal,
    pub commission: Xaf,
    pub net_amount: Xaf,
}

impl OrderCommission {
    /// Tier rate on the order total, clamped to
    /// `[MIN_ORDER_COMMISSION, MAX_ORDER_COMMISSION]` and never more than the
    /// total itself. Admin-sourced products are exempt.
    #[must_use]
    pub fn compute(total: Xaf, source: ProductSource, level: Option<LoyaltyLevel>) -> Self {
        if source == ProductSource::Admin || !total.is_positive() {
            return Self {
                total,
                rate: Decimal::ZERO,
                commission: Xaf::ZERO,
                net_amount: total,
            };
        }
        let rate = tier_rate(level);
        let commission = total
            .times(rate)
            .round()
            .clamp_between(
                Xaf::from_francs(MIN_ORDER_COMMISSION),
                Xaf::from_francs(MAX_ORDER_COMMISSION),
            )
            .min(total);
        Self {
            total,
            rate,
            commission,
            net_amount: total - commission,
        }
    }
}

/// One booked commission, as read back from paid orders.
///
/// `total` is the price of the goods; delivery fees belong to the platform
/// and never reach the seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRecord {
    pub seller: UserId,
    pub order: OrderId,
    pub total: Xaf,
    pub commission: Xaf,
    /// What the seller earns on the order.
    pub seller_amount: Xaf,
    /// The order was paid through escrow, so the seller's share goes to
    /// their wallet on release instead of through a manual payout.
    pub escrowed: bool,
    pub at: DateTime<Utc>,
}

/// Commission activity of one seller over a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerSummary {
    pub seller: UserId,
    pub total_orders: usize,
    pub total_sales: Xaf,
    pub total_commission: Xaf,
    /// Commission as a percentage of sales, two decimals.
    pub average_rate: Decimal,
    /// Seller earnings on non-escrow orders not yet paid out.
    pub balance: Xaf,
    pub payout_eligible: bool,
}

impl SellerSummary {
    /// Summarize `records` belonging to `seller`; records for other sellers
    /// are ignored.
    #[must_use]
    pub fn from_records(seller: UserId, records: &[CommissionRecord], paid_out: Xaf) -> Self {
        let mine: Vec<&CommissionRecord> = records.iter().filter(|r| r.seller == seller).collect();
        let total_sales: Xaf = mine.iter().map(|r| r.total).sum();
        let total_commission: Xaf = mine.iter().map(|r| r.commission).sum();
        let average_rate = if total_sales.is_positive() {
            (total_commission.amount() / total_sales.amount() * Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        } else {
            Decimal::ZERO
        };
        let earned: Xaf = mine.iter().filter(|r| !r.escrowed).map(|r| r.seller_amount).sum();
        let balance = earned - paid_out;
        Self {
            seller,
            total_orders: mine.len(),
            total_sales,
            total_commission,
            average_rate,
            balance,
            payout_eligible: balance >= Xaf::from_francs(PAYOUT_THRESHOLD),
        }
    }
}

/// Number of sellers per commission bracket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionDistribution {
    #[serde(rename = "0-1000")]
    pub up_to_1k: usize,
    #[serde(rename = "1000-5000")]
    pub up_to_5k: usize,
    #[serde(rename = "5000-10000")]
    pub up_to_10k: usize,
    #[serde(rename = "10000-25000")]
    pub up_to_25k: usize,
    #[serde(rename = "25000+")]
    pub above_25k: usize,
}

impl CommissionDistribution {
    /// Bucket each amount; bracket upper bounds are inclusive.
    #[must_use]
    pub fn from_amounts(amounts: impl IntoIterator<Item = Xaf>) -> Self {
        let mut out = Self::default();
        for amount in amounts {
            let value = amount.amount();
            if value <= Decimal::from(1_000) {
                out.up_to_1k += 1;
            } else if value <= Decimal::from(5_000) {
                out.up_to_5k += 1;
            } else if value <= Decimal::from(10_000) {
                out.up_to_10k += 1;
            } else if value <= Decimal::from(25_000) {
                out.up_to_25k += 1;
            } else {
                out.above_25k += 1;
            }
        }
        out
    }
}

/// Commission totals per 7-day bucket starting at `start`.
///
/// The last bucket is cut at `end`.
#[must_use]
pub fn weekly_totals(
    records: &[CommissionRecord],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, Xaf)> {
    let mut out = Vec::new();
    let mut week_start = start;
    while week_start < end {
        let week_end = (week_start + Duration::days(7)).min(end);
        let total = records
            .iter()
            .filter(|r| r.at >= week_start && r.at < week_end)
            .map(|r| r.commission)
            .sum();
        out.push((week_start, total));
        week_start = week_end;
    }
    out
}

/// Growth between the first and last weekly totals, in percent.
///
/// Zero with fewer than two weeks or an empty first week.
#[must_use]
pub fn weekly_growth_rate(weekly: &[Xaf]) -> Decimal {
    let (Some(first), Some(last)) = (weekly.first(), weekly.last()) else {
        return Decimal::ZERO;
    };
    if weekly.len() < 2 || first.amount().is_zero() {
        return Decimal::ZERO;
    }
    ((last.amount() - first.amount()) / first.amount() * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutPriority {
    Medium,
    High,
}

/// A seller who should be paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecommendation {
    pub seller: UserId,
    pub amount: Xaf,
    pub priority: PayoutPriority,
    pub reason: String,
}

/// Eligible sellers, largest balance first.
#[must_use]
pub fn payout_recommendations(summaries: &[SellerSummary]) -> Vec<PayoutRecommendation> {
    let mut out: Vec<PayoutRecommendation> = summaries
        .iter()
        .filter(|s| s.payout_eligible)
        .map(|s| PayoutRecommendation {
            seller: s.seller,
            amount: s.balance,
            priority: if s.balance > Xaf::from_francs(HIGH_PRIORITY_PAYOUT) {
                PayoutPriority::High
            } else {
                PayoutPriority::Medium
            },
            reason: "Au-dessus du seuil de paiement".to_owned(),
        })
        .collect();
    out.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.seller.cmp(&b.seller)));
    out
}

/// Check a payout request against the available balance and return the
/// balance left afterwards.
///
/// # Errors
///
/// Returns an error for a non-positive amount or one larger than
/// `available`.
pub fn request_payout(available: Xaf, amount: Xaf) -> Result<Xaf, CommissionError> {
    if !amount.is_positive() {
        return Err(CommissionError::NonPositiveAmount);
    }
    if amount > available {
        return Err(CommissionError::InsufficientBalance {
            available,
            requested: amount,
        });
    }
    Ok(available - amount)
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_listing_commission() {
        let client = ListingCommission::compute(
            Xaf::from_francs(25_000),
            ProductSource::Client,
            LISTING_COMMISSION_RATE,
        );
        assert_eq!(client.commission, Xaf::from_francs(2_000));
        assert_eq!(client.seller_amount, Xaf::from_francs(23_000));

        let admin = ListingCommission::compute(
            Xaf::from_francs(25_000),
            ProductSource::Admin,
            LISTING_COMMISSION_RATE,
        );
        assert_eq!(admin.commission, Xaf::ZERO);
        assert_eq!(admin.seller_amount, Xaf::from_francs(25_000));
    }

    #[test]
    fn test_tier_rates() {
        assert_eq!(tier_rate(Some(LoyaltyLevel::Bronze)), Decimal::new(6, 2));
        assert_eq!(tier_rate(Some(LoyaltyLevel::Platine)), Decimal::new(3, 2));
        assert_eq!(tier_rate(None), Decimal::new(5, 2));
    }

    #[test]
    fn test_order_commission_clamped() {
        let small = OrderCommission::compute(Xaf::from_francs(1_000), ProductSource::Client, None);
        assert_eq!(small.commission, Xaf::from_francs(100));

        let large = OrderCommission::compute(
            Xaf::from_francs(1_000_000),
            ProductSource::Client,
            Some(LoyaltyLevel::Bronze),
        );
        assert_eq!(large.commission, Xaf::from_francs(5_000));
        assert_eq!(large.net_amount, Xaf::from_francs(995_000));

        let mid = OrderCommission::compute(
            Xaf::from_francs(50_000),
            ProductSource::Client,
            Some(LoyaltyLevel::Or),
        );
        assert_eq!(mid.commission, Xaf::from_francs(2_000));
    }

    #[test]
    fn test_order_commission_exempts_platform_stock() {
        let c = OrderCommission::compute(Xaf::from_francs(50_000), ProductSource::Admin, None);
        assert_eq!(c.commission, Xaf::ZERO);
        assert_eq!(c.net_amount, Xaf::from_francs(50_000));
    }

    #[test]
    fn test_seller_summary() {
        let seller = UserId::generate();
        let now = Utc::now();
        let records = [
            record(seller, 20_000, 1_000, now),
            record(seller, 30_000, 1_500, now),
            record(UserId::generate(), 99_000, 4_950, now),
        ];
        let summary = SellerSummary::from_records(seller, &records, Xaf::from_francs(40_000));
        assert_eq!(summary.total_orders, 2);
        assert_eq!(summary.total_sales, Xaf::from_francs(50_000));
        assert_eq!(summary.average_rate, Decimal::new(5, 0));
        assert_eq!(summary.balance, Xaf::from_francs(7_500));
        assert!(summary.payout_eligible);

        let drained = SellerSummary::from_records(seller, &records, Xaf::from_francs(47_000));
        assert!(!drained.payout_eligible);
    }

    #[test]
    fn test_escrowed_orders_are_not_owed_again() {
        let seller = UserId::generate();
        let now = Utc::now();
        let released = CommissionRecord {
            escrowed: true,
            ..record(seller, 50_000, 2_500, now)
        };
        let records = [released, record(seller, 10_000, 500, now)];
        let summary = SellerSummary::from_records(seller, &records, Xaf::ZERO);
        assert_eq!(summary.total_orders, 2);
        assert_eq!(summary.total_sales, Xaf::from_francs(60_000));
        assert_eq!(summary.total_commission, Xaf::from_francs(3_000));
        assert_eq!(summary.balance, Xaf::from_francs(9_500));
    }

    #[test]
    fn test_balance_uses_seller_amount_not_order_total() {
        let seller = UserId::generate();
        // 50 000 goods, commission 2 500; the 1 500 delivery fee is not in
        // the record at all.
        let records = [record(seller, 50_000, 2_500, Utc::now())];
        let summary = SellerSummary::from_records(seller, &records, Xaf::ZERO);
        assert_eq!(summary.balance, Xaf::from_francs(47_500));
    }

    #[test]
    fn test_distribution() {
        let d = CommissionDistribution::from_amounts(
            [500, 1_000, 1_001, 7_000, 25_000, 30_000].map(Xaf::from_francs),
        );
        assert_eq!(d.up_to_1k, 2);
        assert_eq!(d.up_to_5k, 1);
        assert_eq!(d.up_to_10k, 1);
        assert_eq!(d.up_to_25k, 1);
        assert_eq!(d.above_25k, 1);
        let json = serde_json::to_value(d).unwrap_or_default();
        assert_eq!(json["25000+"], 1);
    }

    #[test]
    fn test_weekly_totals_and_growth() {
        let seller = UserId::generate();
        let start = Utc::now() - Duration::days(14);
        let records = [
            record(seller, 10_000, 500, start + Duration::days(1)),
            record(seller, 10_000, 500, start + Duration::days(8)),
            record(seller, 10_000, 500, start + Duration::days(9)),
        ];
        let weeks = weekly_totals(&records, start, start + Duration::days(14));
        assert_eq!(weeks.len(), 2);
        let totals: Vec<Xaf> = weeks.iter().map(|(_, t)| *t).collect();
        assert_eq!(totals, vec![Xaf::from_francs(500), Xaf::from_francs(1_000)]);
        assert_eq!(weekly_growth_rate(&totals), Decimal::new(100, 0));
        assert_eq!(weekly_growth_rate(&[Xaf::ZERO, Xaf::from_francs(10)]), Decimal::ZERO);
        assert_eq!(weekly_growth_rate(&[Xaf::from_francs(10)]), Decimal::ZERO);
    }

    #[test]
    fn test_payout_recommendations() {
        let now = Utc::now();
        let (a, b, c) = (UserId::generate(), UserId::generate(), UserId::generate());
        let records = [
            record(a, 3_000, 100, now),
            record(b, 10_000, 500, now),
            record(c, 500, 100, now),
        ];
        let summaries: Vec<SellerSummary> = [a, b, c]
            .into_iter()
            .map(|s| SellerSummary::from_records(s, &records, Xaf::ZERO))
            .collect();
        let recs = payout_recommendations(&summaries);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].seller, b);
        assert_eq!(recs[0].priority, PayoutPriority::High);
        assert_eq!(recs[1].priority, PayoutPriority::Medium);
    }

    #[test]
    fn test_request_payout() {
        let available = Xaf::from_francs(5_000);
        assert_eq!(
            request_payout(available, Xaf::from_francs(2_000)),
            Ok(Xaf::from_francs(3_000))
        );
        assert!(matches!(
            request_payout(available, Xaf::from_francs(6_000)),
            Err(CommissionError::InsufficientBalance { .. })
        ));
        assert_eq!(
            request_payout(available, Xaf::ZERO),
            Err(CommissionError::NonPositiveAmount)
        );
    }
}
