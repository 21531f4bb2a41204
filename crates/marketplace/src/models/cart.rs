//! Anonymous visitor carts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vide_grenier_core::{CartId, CartItemId, ProductId, ProductStatus, UserId, Xaf};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub seller_id: UserId,
    pub title: String,
    pub unit_price: Xaf,
    pub status: ProductStatus,
    pub quantity: i32,
}

impl CartItem {
    #[must_use]
    pub fn subtotal(&self) -> Xaf {
        self.unit_price.times(self.quantity.into())
    }
}

/// A cart with its lines and totals.
#[derive(Debug, Clone, Serialize)]
pub struct Cart {
    pub id: CartId,
    pub session_key: String,
    pub items: Vec<CartItem>,
    pub item_count: i64,
    pub total: Xaf,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    #[must_use]
    pub fn new(
        id: CartId,
        session_key: String,
        items: Vec<CartItem>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let item_count = items.iter().map(|i| i64::from(i.quantity)).sum();
        let total = items.iter().map(CartItem::subtotal).sum();
        Self {
            id,
            session_key,
            items,
            item_count,
            total,
            updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_totals() {
        let item = |price: i64, quantity: i32| CartItem {
            id: CartItemId::generate(),
            product_id: ProductId::generate(),
            seller_id: UserId::generate(),
            title: "Lot de livres".to_string(),
            unit_price: Xaf::from_francs(price),
            status: ProductStatus::Active,
            quantity,
        };
        let cart = Cart::new(
            CartId::generate(),
            "sess-1".to_string(),
            vec![item(2_500, 2), item(10_000, 1)],
            Utc::now(),
        );
        assert_eq!(cart.item_count, 3);
        assert_eq!(cart.total, Xaf::from_francs(15_000));
    }
}
