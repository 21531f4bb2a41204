//! Wallet ledger rules, escrow terms and installment schedules.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EscrowStatus, InstallmentStatus, UserId, WalletTransactionKind, Xaf};

/// Escrow service fee, 2% of the order amount.
pub const ESCROW_FEE_RATE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);
/// Days after which funded escrow is released automatically.
pub const ESCROW_RELEASE_DAYS: i64 = 7;
/// Down payment used when the buyer does not choose one.
pub const DEFAULT_DOWN_PAYMENT_PERCENT: u32 = 30;
/// Largest down payment percentage accepted.
pub const MAX_DOWN_PAYMENT_PERCENT: u32 = 90;
/// Days between installment due dates.
pub const INSTALLMENT_INTERVAL_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinanceError {
    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Xaf, requested: Xaf },

    #[error("{kind} is not a {expected} transaction")]
    WrongDirection {
        kind: WalletTransactionKind,
        expected: &'static str,
    },

    #[error("number of installments must be between 2 and 12, got {0}")]
    InvalidInstallmentCount(u32),

    #[error("down payment must be between 0 and 90 percent, got {0}")]
    InvalidDownPayment(u32),

    #[error("a dispute needs a reason")]
    EmptyDisputeReason,

    #[error("only the buyer or the seller can act on this escrow")]
    NotParticipant,
}

/// Wallet balances.
///
/// `pending_balance` is money already committed but not settled; it cannot be
/// spent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub balance: Xaf,
    pub pending_balance: Xaf,
}

/// A signed movement applied to a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub kind: WalletTransactionKind,
    /// Positive for credits, negative for debits.
    pub amount: Xaf,
    pub balance_after: Xaf,
}

impl Wallet {
    #[must_use]
    pub const fn new(balance: Xaf, pending_balance: Xaf) -> Self {
        Self {
            balance,
            pending_balance,
        }
    }

    #[must_use]
    pub fn available(&self) -> Xaf {
        self.balance - self.pending_balance
    }

    /// Add money.
    ///
    /// # Errors
    ///
    /// Fails for non-positive amounts and for kinds that are debits.
    pub fn credit(
        &mut self,
        kind: WalletTransactionKind,
        amount: Xaf,
    ) -> Result<LedgerEntry, FinanceError> {
        if !amount.is_positive() {
            return Err(FinanceError::NonPositiveAmount);
        }
        if !kind.is_credit() {
            return Err(FinanceError::WrongDirection {
                kind,
                expected: "credit",
            });
        }
        self.balance += amount;
        Ok(LedgerEntry {
            kind,
            amount,
            balance_after: self.balance,
        })
    }

    /// Take money out of the available balance.
    ///
    /// # Errors
    ///
    /// Fails for non-positive amounts, credit kinds, and amounts above
    /// [`Wallet::available`].
    pub fn debit(
        &mut self,
        kind: WalletTransactionKind,
        amount: Xaf,
    ) -> Result<LedgerEntry, FinanceError> {
        if !amount.is_positive() {
            return Err(FinanceError::NonPositiveAmount);
        }
        if kind.is_credit() {
            return Err(FinanceError::WrongDirection {
                kind,
                expected: "debit",
            });
        }
        let available = self.available();
        if amount > available {
            return Err(FinanceError::InsufficientFunds {
                available,
                requested: amount,
            });
        }
        self.balance -= amount;
        Ok(LedgerEntry {
            kind,
            amount: Xaf::ZERO - amount,
            balance_after: self.balance,
        })
    }
}

/// Money held for an order until the buyer confirms reception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowTerms {
    pub amount: Xaf,
    pub fee: Xaf,
    pub auto_release_at: DateTime<Utc>,
}

impl EscrowTerms {
    #[must_use]
    pub fn new(amount: Xaf, created_at: DateTime<Utc>) -> Self {
        Self {
            amount,
            fee: amount.times(ESCROW_FEE_RATE).round(),
            auto_release_at: created_at + Duration::days(ESCROW_RELEASE_DAYS),
        }
    }

    /// What the buyer pays to fund the escrow.
    #[must_use]
    pub fn total(&self) -> Xaf {
        self.amount + self.fee
    }
}

/// What cancelling or refunding an order does to its escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowUnwind {
    /// Nothing was funded yet: the escrow is closed.
    Cancel,
    /// Funded money goes back to the buyer, fee included.
    Refund(Xaf),
    /// Already settled one way or the other.
    Keep,
}

impl EscrowUnwind {
    #[must_use]
    pub fn for_escrow(status: EscrowStatus, amount: Xaf, fee: Xaf) -> Self {
        match status {
            EscrowStatus::Pending => Self::Cancel,
            EscrowStatus::Funded | EscrowStatus::Disputed => Self::Refund(amount + fee),
            EscrowStatus::ReleasedToSeller | EscrowStatus::RefundedToBuyer | EscrowStatus::Cancelled => {
                Self::Keep
            }
        }
    }

    /// Status the escrow ends in, if it moves.
    #[must_use]
    pub const fn next_status(self) -> Option<EscrowStatus> {
        match self {
            Self::Cancel => Some(EscrowStatus::Cancelled),
            Self::Refund(_) => Some(EscrowStatus::RefundedToBuyer),
            Self::Keep => None,
        }
    }
}

/// What the buyer gets back when the order behind a plan is cancelled: the
/// down payment and every installment already paid.
#[must_use]
pub fn plan_refund(down_payment: Xaf, payments: &[(InstallmentStatus, Xaf)]) -> Xaf {
    down_payment
        + payments
            .iter()
            .filter(|(status, _)| *status == InstallmentStatus::Paid)
            .map(|(_, amount)| *amount)
            .sum::<Xaf>()
}

/// Who raised a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowParty {
    Buyer,
    Seller,
}

impl EscrowParty {
    /// # Errors
    ///
    /// Returns [`FinanceError::NotParticipant`] when `user` is neither side.
    pub fn of(user: UserId, buyer: UserId, seller: UserId) -> Result<Self, FinanceError> {
        if user == buyer {
            Ok(Self::Buyer)
        } else if user == seller {
            Ok(Self::Seller)
        } else {
            Err(FinanceError::NotParticipant)
        }
    }
}

/// Trim a dispute reason and reject blank ones.
///
/// # Errors
///
/// Returns [`FinanceError::EmptyDisputeReason`] for blank input.
pub fn dispute_reason(reason: &str) -> Result<String, FinanceError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(FinanceError::EmptyDisputeReason);
    }
    Ok(reason.to_owned())
}

/// Interest percentage for an installment count.
///
/// # Errors
///
/// Counts outside `2..=12` are rejected.
pub fn installment_interest_rate(count: u32) -> Result<Decimal, FinanceError> {
    match count {
        2 => Ok(Decimal::from(5)),
        3 => Ok(Decimal::from(8)),
        6 => Ok(Decimal::from(12)),
        12 => Ok(Decimal::from(18)),
        4 | 5 | 7..=11 => Ok(Decimal::from(10)),
        other => Err(FinanceError::InvalidInstallmentCount(other)),
    }
}

/// One scheduled installment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub number: u32,
    pub amount: Xaf,
    pub due_date: DateTime<Utc>,
}

/// A computed installment plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentSchedule {
    pub total_amount: Xaf,
    pub down_payment: Xaf,
    pub remaining_amount: Xaf,
    /// Percent.
    pub interest_rate: Decimal,
    pub interest_amount: Xaf,
    pub installment_amount: Xaf,
    pub payments: Vec<ScheduledInstallment>,
}

impl InstallmentSchedule {
    /// Split `total` into a down payment and `count` monthly installments.
    ///
    /// Every installment is the same whole-franc amount except the last,
    /// which absorbs the rounding remainder.
    ///
    /// # Errors
    ///
    /// Fails for an unsupported count or a down payment above 90%.
    pub fn compute(
        total: Xaf,
        count: u32,
        down_payment_percent: Option<u32>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, FinanceError> {
        if !total.is_positive() {
            return Err(FinanceError::NonPositiveAmount);
        }
        let interest_rate = installment_interest_rate(count)?;
        let percent = down_payment_percent.unwrap_or(DEFAULT_DOWN_PAYMENT_PERCENT);
        if percent > MAX_DOWN_PAYMENT_PERCENT {
            return Err(FinanceError::InvalidDownPayment(percent));
        }

        let hundred = Decimal::ONE_HUNDRED;
        let down_payment = total.times(Decimal::from(percent) / hundred).round();
        let remaining_amount = total - down_payment;
        let interest_amount = remaining_amount.times(interest_rate / hundred).round();
        let payable = remaining_amount + interest_amount;

        let installment_amount = Xaf::new(
            (payable.amount() / Decimal::from(count))
                .round_dp_with_strategy(0, RoundingStrategy::ToZero),
        );
        let last_amount = payable - installment_amount.times(Decimal::from(count - 1));

        let payments = (1..=count)
            .map(|number| ScheduledInstallment {
                number,
                amount: if number == count {
                    last_amount
                } else {
                    installment_amount
                },
                due_date: created_at + Duration::days(INSTALLMENT_INTERVAL_DAYS * i64::from(number)),
            })
            .collect();

        Ok(Self {
            total_amount: total,
            down_payment,
            remaining_amount,
            interest_rate,
            interest_amount,
            installment_amount,
            payments,
        })
    }

    /// Down payment plus every installment.
    #[must_use]
    pub fn total_payable(&self) -> Xaf {
        self.down_payment + self.payments.iter().map(|p| p.amount).sum::<Xaf>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escrow_unwind() {
        let (amount, fee) = (Xaf::from_francs(50_000), Xaf::from_francs(1_000));
        assert_eq!(EscrowUnwind::for_escrow(EscrowStatus::Pending, amount, fee), EscrowUnwind::Cancel);
        assert_eq!(
            EscrowUnwind::for_escrow(EscrowStatus::Funded, amount, fee),
            EscrowUnwind::Refund(Xaf::from_francs(51_000))
        );
        assert_eq!(
            EscrowUnwind::for_escrow(EscrowStatus::Disputed, amount, fee).next_status(),
            Some(EscrowStatus::RefundedToBuyer)
        );
        let released = EscrowUnwind::for_escrow(EscrowStatus::ReleasedToSeller, amount, fee);
        assert_eq!(released, EscrowUnwind::Keep);
        assert_eq!(released.next_status(), None);
    }

    #[test]
    fn test_plan_refund_counts_paid_installments_only() {
        let payments = [
            (InstallmentStatus::Paid, Xaf::from_francs(12_000)),
            (InstallmentStatus::Overdue, Xaf::from_francs(12_000)),
            (InstallmentStatus::Pending, Xaf::from_francs(12_000)),
        ];
        assert_eq!(plan_refund(Xaf::from_francs(15_000), &payments), Xaf::from_francs(27_000));
        assert_eq!(plan_refund(Xaf::ZERO, &[]), Xaf::ZERO);
    }

    #[test]
    fn test_wallet_credit_and_debit() {
        let mut wallet = Wallet::new(Xaf::from_francs(10_000), Xaf::from_francs(3_000));
        assert_eq!(wallet.available(), Xaf::from_francs(7_000));

        let entry = wallet
            .debit(WalletTransactionKind::Payment, Xaf::from_francs(5_000))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(entry.amount, Xaf::from_francs(-5_000));
        assert_eq!(entry.balance_after, Xaf::from_francs(5_000));

        assert!(matches!(
            wallet.debit(WalletTransactionKind::Payment, Xaf::from_francs(2_500)),
            Err(FinanceError::InsufficientFunds { .. })
        ));

        let top_up = wallet
            .credit(WalletTransactionKind::TopUp, Xaf::from_francs(1_000))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(top_up.balance_after, Xaf::from_francs(6_000));
    }

    #[test]
    fn test_wallet_rejects_wrong_direction() {
        let mut wallet = Wallet::default();
        assert!(matches!(
            wallet.credit(WalletTransactionKind::Payment, Xaf::from_francs(10)),
            Err(FinanceError::WrongDirection { .. })
        ));
        assert_eq!(
            wallet.credit(WalletTransactionKind::TopUp, Xaf::ZERO),
            Err(FinanceError::NonPositiveAmount)
        );
    }

    #[test]
    fn test_escrow_terms() {
        let now = Utc::now();
        let terms = EscrowTerms::new(Xaf::from_francs(50_000), now);
        assert_eq!(terms.fee, Xaf::from_francs(1_000));
        assert_eq!(terms.total(), Xaf::from_francs(51_000));
        assert_eq!(terms.auto_release_at, now + Duration::days(7));
    }

    #[test]
    fn test_dispute_rules() {
        let (buyer, seller) = (UserId::generate(), UserId::generate());
        assert_eq!(EscrowParty::of(seller, buyer, seller), Ok(EscrowParty::Seller));
        assert_eq!(
            EscrowParty::of(UserId::generate(), buyer, seller),
            Err(FinanceError::NotParticipant)
        );
        assert_eq!(dispute_reason("  jamais reçu "), Ok("jamais reçu".to_owned()));
        assert_eq!(dispute_reason("   "), Err(FinanceError::EmptyDisputeReason));
    }

    #[test]
    fn test_interest_rates() {
        assert_eq!(installment_interest_rate(3), Ok(Decimal::from(8)));
        assert_eq!(installment_interest_rate(12), Ok(Decimal::from(18)));
        assert_eq!(installment_interest_rate(4), Ok(Decimal::from(10)));
        assert_eq!(installment_interest_rate(1), Err(FinanceError::InvalidInstallmentCount(1)));
        assert_eq!(installment_interest_rate(13), Err(FinanceError::InvalidInstallmentCount(13)));
    }

    #[test]
    fn test_schedule_with_default_down_payment() {
        let now = Utc::now();
        let plan = InstallmentSchedule::compute(Xaf::from_francs(100_000), 3, None, now)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(plan.down_payment, Xaf::from_francs(30_000));
        assert_eq!(plan.remaining_amount, Xaf::from_francs(70_000));
        assert_eq!(plan.interest_amount, Xaf::from_francs(5_600));
        // 75 600 / 3
        assert_eq!(plan.installment_amount, Xaf::from_francs(25_200));
        assert_eq!(plan.payments.len(), 3);
        assert_eq!(plan.payments[2].due_date, now + Duration::days(90));
        assert_eq!(plan.total_payable(), Xaf::from_francs(105_600));
    }

    #[test]
    fn test_schedule_remainder_on_last_installment() {
        let plan = InstallmentSchedule::compute(Xaf::from_francs(10_000), 6, Some(0), Utc::now())
            .unwrap_or_else(|e| panic!("{e}"));
        // 11 200 / 6 = 1 866.67
        assert_eq!(plan.installment_amount, Xaf::from_francs(1_866));
        assert_eq!(plan.payments[5].amount, Xaf::from_francs(1_870));
        assert_eq!(plan.total_payable(), Xaf::from_francs(11_200));
    }

    #[test]
    fn test_schedule_rejects_large_down_payment() {
        assert_eq!(
            InstallmentSchedule::compute(Xaf::from_francs(10_000), 2, Some(95), Utc::now()),
            Err(FinanceError::InvalidDownPayment(95))
        );
    }
}
