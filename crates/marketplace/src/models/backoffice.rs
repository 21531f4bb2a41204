//! Pickup points, platform stock and warehouse work.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use vide_grenier_core::{
    AdminStockId, AdminStockStatus, City, InventoryMovementId, MovementKind, OrderId,
    PickupPointId, ProductId, StaffTaskId, TaskKind, TaskPriority, TaskStatus, UserId, Xaf,
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PickupPoint {
    pub id: PickupPointId,
    pub name: String,
    pub address: String,
    pub city: City,
    pub phone: Option<String>,
    pub manager_id: Option<UserId>,
    pub opening_hours: Option<String>,
    pub capacity: i32,
    pub current_stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PickupPoint {
    pub const DEFAULT_CAPACITY: i32 = 100;

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current_stock >= self.capacity
    }
}

/// A platform-owned stock line, joined with its product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdminStockItem {
    pub id: AdminStockId,
    pub product_id: ProductId,
    pub product_title: String,
    pub selling_price: Xaf,
    pub pickup_point_id: Option<PickupPointId>,
    pub sku: String,
    pub purchase_price: Xaf,
    pub quantity: i32,
    pub low_stock_threshold: i32,
    pub status: AdminStockStatus,
    pub supplier: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AdminStockItem {
    /// `(selling − purchase) / purchase · 100`, two decimals; zero when the
    /// purchase price is zero.
    #[must_use]
    pub fn profit_margin(&self) -> Decimal {
        let purchase = self.purchase_price.amount();
        if purchase.is_zero() {
            return Decimal::ZERO;
        }
        ((self.selling_price.amount() - purchase) / purchase * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StaffTask {
    pub id: StaffTaskId,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub title: String,
    pub description: String,
    pub assigned_to: Option<UserId>,
    pub created_by: UserId,
    pub pickup_point_id: Option<PickupPointId>,
    pub order_id: Option<OrderId>,
    pub due_date: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InventoryMovement {
    pub id: InventoryMovementId,
    pub pickup_point_id: PickupPointId,
    pub product_id: Option<ProductId>,
    pub kind: MovementKind,
    pub quantity_change: i32,
    pub stock_after: i32,
    pub reason: String,
    pub performed_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock(selling: i64, purchase: i64) -> AdminStockItem {
        AdminStockItem {
            id: AdminStockId::generate(),
            product_id: ProductId::generate(),
            product_title: "Frigo".to_string(),
            selling_price: Xaf::from_francs(selling),
            pickup_point_id: None,
            sku: "VGK-0001".to_string(),
            purchase_price: Xaf::from_francs(purchase),
            quantity: 3,
            low_stock_threshold: 5,
            status: AdminStockStatus::Available,
            supplier: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_profit_margin() {
        assert_eq!(stock(150_000, 120_000).profit_margin(), Decimal::from(25));
        assert_eq!(stock(10_000, 0).profit_margin(), Decimal::ZERO);
    }

    #[test]
    fn test_pickup_point_full() {
        let mut point = PickupPoint {
            id: PickupPointId::generate(),
            name: "Akwa".to_string(),
            address: "Boulevard de la Liberté".to_string(),
            city: City::Douala,
            phone: None,
            manager_id: None,
            opening_hours: None,
            capacity: PickupPoint::DEFAULT_CAPACITY,
            current_stock: 99,
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(!point.is_full());
        point.current_stock = 100;
        assert!(point.is_full());
    }
}
