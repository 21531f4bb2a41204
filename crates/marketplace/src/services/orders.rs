//! Order placement, lifecycle and reviews.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use vide_grenier_core::commission::OrderCommission;
use vide_grenier_core::{
    DeliveryMethod, Email, LoyaltyLevel, NotificationKind, OrderId, OrderStatus, PaymentMethod,
    Phone, PickupPointId, ProductId, ProductSource, ReviewScores, StateMachine, TransitionError,
    UserId, UserType, Xaf,
};

use super::notifier::Notifier;
use crate::db::RepositoryError;
use crate::db::backoffice::BackofficeRepository;
use crate::db::carts::CartRepository;
use crate::db::catalog::ProductRepository;
use crate::db::orders::{GuestContact, NewOrder, OrderRepository, StatusChange};
use crate::db::reviews::ReviewRepository;
use crate::db::users::UserRepository;
use crate::models::{Order, Product, Review, User};

/// Flat home delivery fee.
pub const HOME_DELIVERY_COST: i64 = 1_500;

/// Longest quantity accepted on one order line.
pub const MAX_QUANTITY: i32 = 100;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order not found")]
    NotFound,

    #[error("product not found")]
    ProductNotFound,

    #[error("product is not available")]
    ProductUnavailable,

    #[error("you cannot order your own product")]
    OwnProduct,

    #[error("quantity must be between 1 and {MAX_QUANTITY}")]
    InvalidQuantity,

    #[error("a delivery address is required for home delivery")]
    MissingAddress,

    #[error("pickup point not found or closed")]
    InvalidPickupPoint,

    #[error("cart is empty")]
    EmptyCart,

    #[error("{0}")]
    InvalidContact(String),

    #[error("you are not allowed to change this order")]
    Forbidden,

    #[error("only the buyer of a delivered order can review it")]
    NotReviewable,

    #[error("review comment is too long")]
    CommentTooLong,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Order request from an authenticated buyer.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrder {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: i32,
    pub payment_method: PaymentMethod,
    pub delivery_method: DeliveryMethod,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub pickup_point_id: Option<PickupPointId>,
    #[serde(default)]
    pub notes: Option<String>,
}

const fn one() -> i32 {
    1
}

/// Guest checkout of a visitor cart.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestCheckout {
    pub session_key: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub pickup_point_id: PickupPointId,
    #[serde(default = "cash")]
    pub payment_method: PaymentMethod,
}

const fn cash() -> PaymentMethod {
    PaymentMethod::CashOnDelivery
}

/// Money breakdown of one order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pricing {
    pub subtotal: Xaf,
    pub delivery_cost: Xaf,
    pub total: Xaf,
    pub commission: Xaf,
    pub seller_amount: Xaf,
}

impl Pricing {
    /// Price a line. Commission is taken on the goods only, never on the
    /// delivery fee.
    #[must_use]
    pub fn compute(
        unit_price: Xaf,
        quantity: i32,
        delivery: DeliveryMethod,
        source: ProductSource,
        seller_level: Option<LoyaltyLevel>,
    ) -> Self {
        let subtotal = unit_price.times(quantity.into());
        let delivery_cost = match delivery {
            DeliveryMethod::Pickup => Xaf::ZERO,
            DeliveryMethod::Delivery => Xaf::from_francs(HOME_DELIVERY_COST),
        };
        let commission = OrderCommission::compute(subtotal, source, seller_level);
        Self {
            subtotal,
            delivery_cost,
            total: subtotal + delivery_cost,
            commission: commission.commission,
            seller_amount: commission.net_amount,
        }
    }
}

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    Seller,
    Buyer,
}

impl Actor {
    /// The role `user` plays on `order`, if any.
    #[must_use]
    pub fn of(user: UserId, user_type: UserType, order: &Order) -> Option<Self> {
        if user_type == UserType::Admin {
            Some(Self::Admin)
        } else if order.seller_id == user {
            Some(Self::Seller)
        } else if order.buyer_id == Some(user) {
            Some(Self::Buyer)
        } else {
            None
        }
    }
}

/// Check that `actor` may move an order from `from` to `to`.
///
/// Legality comes first: an illegal edge is a transition error whoever asks.
///
/// # Errors
///
/// Returns `OrderError::Transition` or `OrderError::Forbidden`.
pub fn authorize_transition(
    actor: Actor,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<(), OrderError> {
    from.transition(to)?;
    let allowed = match actor {
        Actor::Admin => true,
        Actor::Seller => matches!(
            (from, to),
            (OrderStatus::Paid, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
        ),
        Actor::Buyer => from == OrderStatus::Pending && to == OrderStatus::Cancelled,
    };
    if allowed { Ok(()) } else { Err(OrderError::Forbidden) }
}

/// Generate an order number: `VGK` + 8 digits.
#[must_use]
pub fn generate_order_number() -> String {
    use rand::Rng;
    let n: u32 = rand::rng().random_range(0..100_000_000);
    format!("VGK{n:08}")
}

/// Generate a 6-digit pickup code.
#[must_use]
pub fn generate_pickup_code() -> String {
    use rand::Rng;
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{n:06}")
}

/// Order service.
pub struct OrderService<'a> {
    orders: OrderRepository<'a>,
    products: ProductRepository<'a>,
    users: UserRepository<'a>,
    backoffice: BackofficeRepository<'a>,
    carts: CartRepository<'a>,
    reviews: ReviewRepository<'a>,
    notifier: &'a Notifier,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, notifier: &'a Notifier) -> Self {
        Self {
            orders: OrderRepository::new(pool),
            products: ProductRepository::new(pool),
            users: UserRepository::new(pool),
            backoffice: BackofficeRepository::new(pool),
            carts: CartRepository::new(pool),
            reviews: ReviewRepository::new(pool),
            notifier,
        }
    }

    /// Place an order and reserve the product.
    ///
    /// # Errors
    ///
    /// Returns a validation error, `OrderError::ProductUnavailable` when the
    /// product is not ACTIVE (including when another buyer reserved it first)
    /// and `OrderError::OwnProduct` for the seller's own listing.
    #[instrument(skip(self, buyer, request), fields(buyer_id = %buyer.id, product_id = %request.product_id))]
    pub async fn place(&self, buyer: &User, request: &PlaceOrder) -> Result<Order, OrderError> {
        if !(1..=MAX_QUANTITY).contains(&request.quantity) {
            return Err(OrderError::InvalidQuantity);
        }
        let address = request
            .delivery_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());
        if request.delivery_method == DeliveryMethod::Delivery && address.is_none() {
            return Err(OrderError::MissingAddress);
        }
        if let Some(point) = request.pickup_point_id {
            self.open_pickup_point(point).await?;
        }

        let product = self.purchasable(request.product_id).await?;
        if product.seller_id == buyer.id {
            return Err(OrderError::OwnProduct);
        }

        let pricing = self
            .price(&product, request.quantity, request.delivery_method)
            .await?;
        let order_number = generate_order_number();
        let pickup_code = generate_pickup_code();

        let order = self
            .orders
            .create_reserving(&NewOrder {
                order_number: &order_number,
                buyer_id: Some(buyer.id),
                guest: None,
                seller_id: product.seller_id,
                product_id: product.id,
                quantity: request.quantity,
                unit_price: product.price,
                delivery_cost: pricing.delivery_cost,
                total_amount: pricing.total,
                commission_amount: pricing.commission,
                seller_amount: pricing.seller_amount,
                payment_method: request.payment_method,
                delivery_method: request.delivery_method,
                delivery_address: address,
                pickup_point_id: request.pickup_point_id,
                pickup_code: &pickup_code,
                notes: request.notes.as_deref(),
            })
            .await
            .map_err(unavailable_on_conflict)?;

        self.notify_new_order(&order, &product).await;
        Ok(order)
    }

    /// Turn a visitor cart into one guest order per line, all or nothing,
    /// then empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::EmptyCart`, `OrderError::InvalidContact`,
    /// `OrderError::InvalidPickupPoint` or `OrderError::ProductUnavailable`.
    #[instrument(skip(self, checkout), fields(session_key = %checkout.session_key))]
    pub async fn checkout_guest(&self, checkout: &GuestCheckout) -> Result<Vec<Order>, OrderError> {
        let name = checkout.name.trim();
        if name.is_empty() {
            return Err(OrderError::InvalidContact("name is required".to_owned()));
        }
        let phone =
            Phone::parse(&checkout.phone).map_err(|e| OrderError::InvalidContact(e.to_string()))?;
        let email =
            Email::parse(&checkout.email).map_err(|e| OrderError::InvalidContact(e.to_string()))?;
        self.open_pickup_point(checkout.pickup_point_id).await?;

        let cart = self.carts.get_or_create(&checkout.session_key).await?;
        if cart.items.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let mut lines = Vec::with_capacity(cart.items.len());
        for item in &cart.items {
            let product = self.purchasable(item.product_id).await?;
            let pricing = self
                .price(&product, item.quantity, DeliveryMethod::Pickup)
                .await?;
            lines.push((
                product,
                item.quantity,
                pricing,
                generate_order_number(),
                generate_pickup_code(),
            ));
        }

        let contact = GuestContact {
            name,
            phone: phone.as_str(),
            email: email.as_str(),
        };
        let new_orders: Vec<NewOrder<'_>> = lines
            .iter()
            .map(|(product, quantity, pricing, number, code)| NewOrder {
                order_number: number,
                buyer_id: None,
                guest: Some(contact.clone()),
                seller_id: product.seller_id,
                product_id: product.id,
                quantity: *quantity,
                unit_price: product.price,
                delivery_cost: pricing.delivery_cost,
                total_amount: pricing.total,
                commission_amount: pricing.commission,
                seller_amount: pricing.seller_amount,
                payment_method: checkout.payment_method,
                delivery_method: DeliveryMethod::Pickup,
                delivery_address: None,
                pickup_point_id: Some(checkout.pickup_point_id),
                pickup_code: code,
                notes: None,
            })
            .collect();

        let orders = self
            .orders
            .create_many_reserving(&new_orders)
            .await
            .map_err(unavailable_on_conflict)?;
        self.carts.clear(cart.id).await?;

        for (order, (product, ..)) in orders.iter().zip(&lines) {
            self.notify_new_order(order, product).await;
        }
        Ok(orders)
    }

    /// Get an order visible to `user` (buyer, seller, or staff/admin).
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` when the order is missing or not visible.
    pub async fn get_for(
        &self,
        id: OrderId,
        user: UserId,
        user_type: UserType,
    ) -> Result<Order, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        if !user_type.is_staff_or_admin() && !order.involves(user) {
            return Err(OrderError::NotFound);
        }
        Ok(order)
    }

    /// Orders the user bought and sold.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if a query fails.
    pub async fn list_for(&self, user: UserId) -> Result<(Vec<Order>, Vec<Order>), OrderError> {
        Ok((
            self.orders.list_for_buyer(user).await?,
            self.orders.list_for_seller(user).await?,
        ))
    }

    /// Move an order along its lifecycle on behalf of `user`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound`, `OrderError::Forbidden` or
    /// `OrderError::Transition`.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: OrderId,
        user: UserId,
        user_type: UserType,
        next: OrderStatus,
    ) -> Result<Order, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        let actor = Actor::of(user, user_type, &order).ok_or(OrderError::NotFound)?;
        authorize_transition(actor, order.status, next)?;

        let StatusChange {
            order,
            points,
            refunded,
        } = self.orders.apply_status(order.id, order.status, next).await?;
        tracing::info!(
            order_number = %order.order_number,
            status = %next.as_str(),
            points,
            refunded = %refunded,
            "Order status changed"
        );

        let message = match next {
            OrderStatus::Delivered if points > 0 => format!(
                "Votre commande {} a été livrée. Vous gagnez {points} points de fidélité.",
                order.order_number
            ),
            OrderStatus::Cancelled | OrderStatus::Refunded if refunded.is_positive() => format!(
                "Votre commande {} est {}. {refunded} ont été recrédités sur votre portefeuille.",
                order.order_number,
                status_label(next)
            ),
            _ => format!(
                "Votre commande {} est maintenant {}.",
                order.order_number,
                status_label(next)
            ),
        };
        let data = serde_json::json!({ "order_id": order.id, "status": next });
        if let Some(buyer) = order.buyer_id
            && buyer != user
        {
            self.notifier
                .notify(
                    buyer,
                    NotificationKind::Order,
                    "Mise à jour de commande",
                    &message,
                    data.clone(),
                )
                .await;
        }
        if order.seller_id != user
            && matches!(next, OrderStatus::Cancelled | OrderStatus::Refunded)
        {
            self.notifier
                .notify(
                    order.seller_id,
                    NotificationKind::Order,
                    "Commande annulée",
                    &message,
                    data,
                )
                .await;
        }
        Ok(order)
    }

    /// Review the seller of a delivered order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotReviewable` unless `reviewer` bought the order
    /// and it was delivered, and `OrderError::Repository` with a conflict for
    /// a second review.
    #[instrument(skip(self, scores, comment))]
    pub async fn review(
        &self,
        order: OrderId,
        reviewer: UserId,
        scores: &ReviewScores,
        comment: &str,
    ) -> Result<Review, OrderError> {
        let comment = comment.trim();
        if comment.chars().count() > 2000 {
            return Err(OrderError::CommentTooLong);
        }
        let order = self.orders.get(order).await?.ok_or(OrderError::NotFound)?;
        if order.buyer_id != Some(reviewer) || order.status != OrderStatus::Delivered {
            return Err(OrderError::NotReviewable);
        }

        let review = self
            .reviews
            .create(order.id, reviewer, order.seller_id, order.product_id, scores, comment)
            .await?;

        self.notifier
            .notify(
                order.seller_id,
                NotificationKind::Review,
                "Nouvel avis",
                &format!(
                    "Vous avez reçu un avis de {}/5 pour la commande {}.",
                    scores.overall.get(),
                    order.order_number
                ),
                serde_json::json!({ "order_id": order.id, "review_id": review.id }),
            )
            .await;
        Ok(review)
    }

    async fn purchasable(&self, id: ProductId) -> Result<Product, OrderError> {
        let product = self
            .products
            .get(id)
            .await?
            .ok_or(OrderError::ProductNotFound)?;
        if !product.status.is_purchasable() {
            return Err(OrderError::ProductUnavailable);
        }
        Ok(product)
    }

    async fn open_pickup_point(&self, id: PickupPointId) -> Result<(), OrderError> {
        match self.backoffice.pickup_point(id).await? {
            Some(point) if point.is_active => Ok(()),
            _ => Err(OrderError::InvalidPickupPoint),
        }
    }

    async fn price(
        &self,
        product: &Product,
        quantity: i32,
        delivery: DeliveryMethod,
    ) -> Result<Pricing, OrderError> {
        let seller_level = self
            .users
            .get_by_id(product.seller_id)
            .await?
            .map(|s| s.loyalty_level());
        Ok(Pricing::compute(
            product.price,
            quantity,
            delivery,
            product.source,
            seller_level,
        ))
    }

    async fn notify_new_order(&self, order: &Order, product: &Product) {
        self.notifier
            .notify(
                order.seller_id,
                NotificationKind::Order,
                "Nouvelle commande",
                &format!(
                    "Nouvelle commande {} pour \"{}\" ({}).",
                    order.order_number, product.title, order.total_amount
                ),
                serde_json::json!({ "order_id": order.id }),
            )
            .await;
    }
}

/// A lost reservation race surfaces as a conflict from the repository.
fn unavailable_on_conflict(e: RepositoryError) -> OrderError {
    match e {
        RepositoryError::Conflict(_) => OrderError::ProductUnavailable,
        other => OrderError::Repository(other),
    }
}

const fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "en attente",
        OrderStatus::Paid => "payée",
        OrderStatus::Processing => "en préparation",
        OrderStatus::Shipped => "expédiée",
        OrderStatus::Delivered => "livrée",
        OrderStatus::Cancelled => "annulée",
        OrderStatus::Refunded => "remboursée",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_format() {
        let n = generate_order_number();
        assert_eq!(n.len(), 11);
        assert!(n.starts_with("VGK"));
        assert!(n[3..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_pickup_code_format() {
        for _ in 0..50 {
            let code = generate_pickup_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_pricing_pickup_client_product() {
        let p = Pricing::compute(
            Xaf::from_francs(25_000),
            2,
            DeliveryMethod::Pickup,
            ProductSource::Client,
            Some(LoyaltyLevel::Bronze),
        );
        assert_eq!(p.subtotal, Xaf::from_francs(50_000));
        assert_eq!(p.delivery_cost, Xaf::ZERO);
        assert_eq!(p.total, Xaf::from_francs(50_000));
        // 6% of 50 000
        assert_eq!(p.commission, Xaf::from_francs(3_000));
        assert_eq!(p.seller_amount, Xaf::from_francs(47_000));
    }

    #[test]
    fn test_pricing_delivery_is_not_commissioned() {
        let p = Pricing::compute(
            Xaf::from_francs(200_000),
            1,
            DeliveryMethod::Delivery,
            ProductSource::Client,
            None,
        );
        assert_eq!(p.total, Xaf::from_francs(201_500));
        // 5% of 200 000 is 10 000, clamped to 5 000
        assert_eq!(p.commission, Xaf::from_francs(5_000));
        assert_eq!(p.seller_amount, Xaf::from_francs(195_000));
    }

    #[test]
    fn test_pricing_admin_product_has_no_commission() {
        let p = Pricing::compute(
            Xaf::from_francs(10_000),
            1,
            DeliveryMethod::Pickup,
            ProductSource::Admin,
            None,
        );
        assert_eq!(p.commission, Xaf::ZERO);
        assert_eq!(p.seller_amount, Xaf::from_francs(10_000));
    }

    #[test]
    fn test_seller_advances_order() {
        assert!(
            authorize_transition(Actor::Seller, OrderStatus::Paid, OrderStatus::Processing).is_ok()
        );
        assert!(
            authorize_transition(Actor::Seller, OrderStatus::Shipped, OrderStatus::Delivered).is_ok()
        );
        assert!(matches!(
            authorize_transition(Actor::Seller, OrderStatus::Pending, OrderStatus::Paid),
            Err(OrderError::Forbidden)
        ));
    }

    #[test]
    fn test_buyer_only_cancels_pending() {
        assert!(
            authorize_transition(Actor::Buyer, OrderStatus::Pending, OrderStatus::Cancelled).is_ok()
        );
        assert!(matches!(
            authorize_transition(Actor::Buyer, OrderStatus::Paid, OrderStatus::Cancelled),
            Err(OrderError::Forbidden)
        ));
    }

    #[test]
    fn test_illegal_edges_rejected_for_everyone() {
        assert!(matches!(
            authorize_transition(Actor::Admin, OrderStatus::Delivered, OrderStatus::Pending),
            Err(OrderError::Transition(_))
        ));
        assert!(matches!(
            authorize_transition(Actor::Admin, OrderStatus::Paid, OrderStatus::Paid),
            Err(OrderError::Transition(TransitionError::Unchanged { .. }))
        ));
        assert!(
            authorize_transition(Actor::Admin, OrderStatus::Delivered, OrderStatus::Refunded).is_ok()
        );
    }
}
