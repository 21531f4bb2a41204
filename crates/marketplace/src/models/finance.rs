//! Wallets, escrow and installment plans.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use vide_grenier_core::finance::Wallet;
use vide_grenier_core::{
    EscrowId, EscrowStatus, InstallmentPaymentId, InstallmentPlanId, InstallmentStatus, OrderId,
    PaymentStatus, UserId, WalletId, WalletTransactionId, WalletTransactionKind, Xaf,
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WalletAccount {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Xaf,
    pub pending_balance: Xaf,
    pub updated_at: DateTime<Utc>,
}

impl WalletAccount {
    #[must_use]
    pub const fn ledger(&self) -> Wallet {
        Wallet::new(self.balance, self.pending_balance)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WalletTransaction {
    pub id: WalletTransactionId,
    pub wallet_id: WalletId,
    pub kind: WalletTransactionKind,
    pub amount: Xaf,
    pub balance_after: Xaf,
    pub reference: String,
    pub description: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Escrow {
    pub id: EscrowId,
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub amount: Xaf,
    pub fee: Xaf,
    pub status: EscrowStatus,
    pub auto_release_at: DateTime<Utc>,
    pub dispute_reason: Option<String>,
    pub disputed_by: Option<UserId>,
    pub funded_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InstallmentPlan {
    pub id: InstallmentPlanId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_amount: Xaf,
    pub down_payment: Xaf,
    pub remaining_amount: Xaf,
    pub interest_rate: Decimal,
    pub interest_amount: Xaf,
    pub installment_amount: Xaf,
    pub number_of_installments: i32,
    pub is_completed: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InstallmentPayment {
    pub id: InstallmentPaymentId,
    pub plan_id: InstallmentPlanId,
    pub number: i32,
    pub amount: Xaf,
    pub due_date: DateTime<Utc>,
    pub status: InstallmentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}
