//! End-to-end money scenarios computed with the core rules, no database.
//!
//! Amounts are whole francs CFA, as shown to users.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use vide_grenier_core::commission::{
    CommissionRecord, ListingCommission, OrderCommission, PayoutPriority, SellerSummary,
    payout_recommendations, request_payout,
};
use vide_grenier_core::finance::{EscrowTerms, InstallmentSchedule, Wallet};
use vide_grenier_core::{
    LoyaltyLevel, OrderId, OrderStatus, ProductSource, StateMachine, UserId,
    WalletTransactionKind, Xaf,
};

fn xaf(francs: i64) -> Xaf {
    Xaf::from_francs(francs)
}

/// A smartphone sold 50 000 F between two clients, paid through escrow.
#[test]
fn test_smartphone_sale_through_escrow() {
    let price = xaf(50_000);
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

    // Listing: 8% shown to the seller up front.
    let listing = ListingCommission::compute(price, ProductSource::Client, Decimal::new(8, 2));
    assert_eq!(listing.commission, xaf(4_000));
    assert_eq!(listing.seller_amount, xaf(46_000));

    // Buyer tops up and funds the escrow: amount plus the 2% fee.
    let terms = EscrowTerms::new(price, now);
    assert_eq!(terms.fee, xaf(1_000));
    assert_eq!(terms.total(), xaf(51_000));
    assert_eq!(terms.auto_release_at, now + Duration::days(7));

    let mut buyer = Wallet::default();
    buyer.credit(WalletTransactionKind::TopUp, xaf(60_000)).unwrap();
    buyer.debit(WalletTransactionKind::EscrowFunding, terms.amount).unwrap();
    let fee = buyer.debit(WalletTransactionKind::EscrowFee, terms.fee).unwrap();
    assert_eq!(fee.balance_after, xaf(9_000));

    // Order commission at the default tier: 5%, inside the 100..5000 clamp.
    let order = OrderCommission::compute(price, ProductSource::Client, None);
    assert_eq!(order.commission, xaf(2_500));
    assert_eq!(order.net_amount, xaf(47_500));

    // Release credits the seller with their share; the commission stays
    // with the platform.
    let mut seller = Wallet::default();
    let release = seller
        .credit(WalletTransactionKind::EscrowRelease, order.net_amount)
        .unwrap();
    assert_eq!(release.balance_after, xaf(47_500));

    // The released order is no longer owed through a manual payout.
    let record = CommissionRecord {
        seller: UserId::generate(),
        order: OrderId::generate(),
        total: price,
        commission: order.commission,
        seller_amount: order.net_amount,
        escrowed: true,
        at: now,
    };
    let summary = SellerSummary::from_records(record.seller, &[record], Xaf::ZERO);
    assert_eq!(summary.balance, Xaf::ZERO);
    assert!(!summary.payout_eligible);
}

#[test]
fn test_buyer_cannot_fund_escrow_beyond_available_balance() {
    let terms = EscrowTerms::new(xaf(50_000), Utc::now());
    let mut buyer = Wallet::new(xaf(55_000), xaf(5_000));
    buyer.debit(WalletTransactionKind::EscrowFunding, terms.amount).unwrap();
    assert!(buyer.debit(WalletTransactionKind::EscrowFee, terms.fee).is_err());
    assert_eq!(buyer.balance, xaf(5_000));
}

#[test]
fn test_platform_stock_pays_no_commission() {
    let price = xaf(120_000);
    let listing = ListingCommission::compute(price, ProductSource::Admin, Decimal::new(8, 2));
    assert_eq!(listing.commission, Xaf::ZERO);
    let order = OrderCommission::compute(price, ProductSource::Admin, Some(LoyaltyLevel::Bronze));
    assert_eq!(order.commission, Xaf::ZERO);
    assert_eq!(order.net_amount, price);
}

#[test]
fn test_loyalty_tier_lowers_and_clamp_caps_commission() {
    let small = OrderCommission::compute(xaf(1_000), ProductSource::Client, None);
    assert_eq!(small.commission, xaf(100), "minimum commission");

    let fridge =
        OrderCommission::compute(xaf(400_000), ProductSource::Client, Some(LoyaltyLevel::Platine));
    assert_eq!(fridge.commission, xaf(5_000), "3% would be 12 000, capped");
}

/// A 50 000 F purchase spread over three months with the default 30% down.
#[test]
fn test_three_month_installment_plan() {
    let created = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
    let plan = InstallmentSchedule::compute(xaf(50_000), 3, None, created).unwrap();

    assert_eq!(plan.down_payment, xaf(15_000));
    assert_eq!(plan.remaining_amount, xaf(35_000));
    assert_eq!(plan.interest_rate, Decimal::from(8));
    assert_eq!(plan.interest_amount, xaf(2_800));
    assert_eq!(plan.payments.len(), 3);
    assert!(plan.payments.iter().all(|p| p.amount == xaf(12_600)));
    assert_eq!(plan.payments[2].due_date, created + Duration::days(90));
    assert_eq!(plan.total_payable(), xaf(52_800));
}

#[test]
fn test_installment_rounding_lands_on_the_last_payment() {
    let plan = InstallmentSchedule::compute(xaf(10_001), 6, Some(0), Utc::now()).unwrap();
    let sum: Xaf = plan.payments.iter().map(|p| p.amount).sum();
    assert_eq!(sum, plan.remaining_amount + plan.interest_amount);
    assert!(plan.payments[5].amount >= plan.installment_amount);
}

#[test]
fn test_order_lifecycle_to_delivery() {
    let mut status = OrderStatus::Pending;
    for next in [
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        status = status.transition(next).unwrap();
    }
    assert_eq!(status, OrderStatus::Delivered);
    assert!(status.is_sale());
    assert!(OrderStatus::Delivered.transition(OrderStatus::Pending).is_err());
    assert!(OrderStatus::Cancelled.is_terminal());
}

/// Two sellers after a month of sales: one is owed a payout, one is not.
#[test]
fn test_monthly_payout_run() {
    let awa = UserId::generate();
    let paul = UserId::generate();
    let at = Utc::now();
    let record = |seller, total: i64| {
        let commission = OrderCommission::compute(xaf(total), ProductSource::Client, None);
        CommissionRecord {
            seller,
            order: OrderId::generate(),
            total: commission.total,
            commission: commission.commission,
            seller_amount: commission.net_amount,
            escrowed: false,
            at,
        }
    };
    let records = vec![
        record(awa, 50_000),
        record(awa, 35_000),
        record(paul, 800),
    ];

    let awa_summary = SellerSummary::from_records(awa, &records, xaf(20_000));
    assert_eq!(awa_summary.total_orders, 2);
    assert_eq!(awa_summary.total_commission, xaf(4_250));
    assert_eq!(awa_summary.balance, xaf(60_750));

    let paul_summary = SellerSummary::from_records(paul, &records, Xaf::ZERO);
    assert!(!paul_summary.payout_eligible);

    let payouts = payout_recommendations(&[awa_summary.clone(), paul_summary]);
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].seller, awa);
    assert_eq!(payouts[0].priority, PayoutPriority::High);

    let left = request_payout(awa_summary.balance, xaf(60_000)).unwrap();
    assert_eq!(left, xaf(750));
    assert!(request_payout(left, xaf(1_000)).is_err());
}
