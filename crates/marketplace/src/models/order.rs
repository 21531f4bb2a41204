//! Orders, payments and reviews.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use vide_grenier_core::{
    DeliveryMethod, OrderId, OrderStatus, PaymentId, PaymentMethod, PaymentStatus, PickupPointId,
    ProductId, Rating, ReviewId, UserId, Xaf,
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    /// `None` for guest checkouts.
    pub buyer_id: Option<UserId>,
    pub seller_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Xaf,
    pub delivery_cost: Xaf,
    pub total_amount: Xaf,
    pub commission_amount: Xaf,
    pub seller_amount: Xaf,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub delivery_method: DeliveryMethod,
    pub delivery_address: Option<String>,
    pub pickup_point_id: Option<PickupPointId>,
    #[serde(skip_serializing)]
    pub pickup_code: String,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub guest_name: Option<String>,
    pub guest_phone: Option<String>,
    pub guest_email: Option<String>,
    pub notes: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether `user` is the buyer or the seller.
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.seller_id == user || self.buyer_id == Some(user)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub reference: String,
    pub method: PaymentMethod,
    pub amount: Xaf,
    pub status: PaymentStatus,
    pub provider: String,
    pub provider_reference: Option<String>,
    pub provider_response: serde_json::Value,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: ReviewId,
    pub order_id: OrderId,
    pub reviewer_id: UserId,
    pub seller_id: UserId,
    pub product_id: ProductId,
    pub overall_rating: Rating,
    pub communication_rating: Rating,
    pub delivery_rating: Rating,
    pub product_quality_rating: Rating,
    pub value_rating: Rating,
    pub average_rating: Decimal,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}
