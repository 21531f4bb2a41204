//! Checkout, messaging and warehouse vocabularies.

use crate::labeled_enum;

labeled_enum! {
    /// How the buyer pays.
    pub enum PaymentMethod as "payment_method" {
        Campay => "CAMPAY",
        OrangeMoney => "ORANGE_MONEY",
        MtnMoney => "MTN_MONEY",
        Noupia => "NOUPIA",
        Card => "CARD",
        CashOnDelivery => "CASH_ON_DELIVERY",
        Wallet => "WALLET",
        Installment => "INSTALLMENT",
    }
}

impl PaymentMethod {
    /// Mobile-money methods are collected through the Campay gateway.
    #[must_use]
    pub const fn is_mobile_money(&self) -> bool {
        matches!(self, Self::Campay | Self::OrangeMoney | Self::MtnMoney)
    }
}

labeled_enum! {
    /// How the item reaches the buyer.
    pub enum DeliveryMethod as "delivery_method" {
        Pickup => "PICKUP",
        Delivery => "DELIVERY",
    }
}

labeled_enum! {
    /// In-app notification categories.
    pub enum NotificationKind as "notification_kind" {
        Order => "ORDER",
        Payment => "PAYMENT",
        Message => "MESSAGE",
        Review => "REVIEW",
        System => "SYSTEM",
        Promotion => "PROMOTION",
    }
}

labeled_enum! {
    /// Chat message payload type.
    pub enum MessageKind as "message_kind" {
        Text => "TEXT",
        Image => "IMAGE",
        Offer => "OFFER",
        System => "SYSTEM",
    }
}

labeled_enum! {
    /// Physical state of a platform-owned stock item.
    pub enum AdminStockStatus as "admin_stock_status" {
        Available => "AVAILABLE",
        Reserved => "RESERVED",
        Sold => "SOLD",
        Damaged => "DAMAGED",
        Maintenance => "MAINTENANCE",
    }
}

labeled_enum! {
    /// Warehouse task families.
    pub enum TaskKind as "task_kind" {
        StockReceive => "STOCK_RECEIVE",
        InventoryCount => "INVENTORY_COUNT",
        OrderPickup => "ORDER_PICKUP",
        CustomerService => "CUSTOMER_SERVICE",
        Cleaning => "CLEANING",
        Reporting => "REPORTING",
    }
}

labeled_enum! {
    /// What a support ticket is about.
    pub enum SupportCategory as "support_category" {
        Technical => "TECHNICAL",
        Billing => "BILLING",
        Account => "ACCOUNT",
        Product => "PRODUCT",
        General => "GENERAL",
        Complaint => "COMPLAINT",
        Suggestion => "SUGGESTION",
    }
}

labeled_enum! {
    /// Task and support ticket urgency, lowest first.
    pub enum TaskPriority as "task_priority" {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
        Urgent => "URGENT",
    }
}

labeled_enum! {
    /// Inventory movement at a pickup point.
    pub enum MovementKind as "movement_kind" {
        Receive => "RECEIVE",
        Pick => "PICK",
        Return => "RETURN",
        Damage => "DAMAGE",
        Adjustment => "ADJUSTMENT",
        Transfer => "TRANSFER",
    }
}

impl MovementKind {
    /// Whether a signed quantity change is consistent with the movement.
    ///
    /// Receipts and returns add stock, picks and damage remove it,
    /// adjustments and transfers go either way. Zero is never valid.
    #[must_use]
    pub const fn accepts(&self, quantity_change: i32) -> bool {
        if quantity_change == 0 {
            return false;
        }
        match self {
            Self::Receive | Self::Return => quantity_change > 0,
            Self::Pick | Self::Damage => quantity_change < 0,
            Self::Adjustment | Self::Transfer => true,
        }
    }
}

labeled_enum! {
    /// Reason for a wallet ledger entry.
    pub enum WalletTransactionKind as "wallet_transaction_kind" {
        TopUp => "TOP_UP",
        Payment => "PAYMENT",
        EscrowFunding => "ESCROW_FUNDING",
        EscrowFee => "ESCROW_FEE",
        EscrowRelease => "ESCROW_RELEASE",
        EscrowRefund => "ESCROW_REFUND",
        InstallmentPayment => "INSTALLMENT_PAYMENT",
        Refund => "REFUND",
        Payout => "PAYOUT",
    }
}

impl WalletTransactionKind {
    /// Whether the entry adds money to the wallet.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(
            self,
            Self::TopUp | Self::EscrowRelease | Self::EscrowRefund | Self::Refund
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_signs() {
        assert!(MovementKind::Receive.accepts(5));
        assert!(!MovementKind::Receive.accepts(-5));
        assert!(MovementKind::Pick.accepts(-1));
        assert!(!MovementKind::Damage.accepts(2));
        assert!(MovementKind::Adjustment.accepts(-3));
        assert!(!MovementKind::Transfer.accepts(0));
    }

    #[test]
    fn test_mobile_money() {
        assert!(PaymentMethod::OrangeMoney.is_mobile_money());
        assert!(!PaymentMethod::CashOnDelivery.is_mobile_money());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Urgent > TaskPriority::High);
        assert!(TaskPriority::Low < TaskPriority::Medium);
    }

    #[test]
    fn test_wallet_direction() {
        assert!(WalletTransactionKind::TopUp.is_credit());
        assert!(!WalletTransactionKind::EscrowFee.is_credit());
    }
}
