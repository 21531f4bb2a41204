//! HTTP route handlers for the marketplace API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (database)
//! GET  /ws/chat/{chat_id}?token=        - Chat WebSocket
//!
//! # Auth (/api/v1/auth, strict rate limit)
//! POST /register                        - Create a client account
//! POST /login                           - Email or phone + password
//! POST /login/2fa                       - Finish a two-factor login
//! POST /refresh                         - Exchange a refresh token
//! POST /logout                          - Acknowledge logout
//! POST /phone/send-code                 - Send a phone verification code
//! POST /phone/verify                    - Confirm the phone number
//! POST /2fa                             - Turn two-factor login on or off
//! POST /password/forgot                 - Send a reset code (always acknowledged)
//! POST /password/reset                  - New password with a reset code
//! GET  /me                              - Current account
//!
//! # Users (/api/v1/users)
//! GET   /me                             - Profile
//! PATCH /me                             - Update profile
//! POST  /me/password                    - Change password
//! GET   /me/earnings                    - Seller earnings summary
//! GET   /{id}                           - Public seller profile with rating
//! GET   /{id}/reviews                   - Reviews received by a seller
//!
//! # Catalog (/api/v1)
//! GET  /categories                      - Active category tree
//! GET  /pickup-points                   - Active pickup points
//! GET  /products                        - Listing with filters
//! POST /products                        - Create a listing
//! GET  /products/mine                   - The caller's listings
//! GET  /products/{id}                   - Detail (counts a view)
//! PATCH /products/{id}                  - Edit a listing
//! POST /products/{id}/submit            - Send to moderation
//! POST /products/{id}/status            - Seller status change
//! POST /products/{id}/images            - Attach an image
//! POST /products/{id}/favorite          - Toggle favorite
//! GET  /products/{id}/similar           - Content-similar listings
//! GET  /products/{id}/also-bought       - Cross-sell
//! GET  /favorites                       - The caller's favorites
//! GET  /wishlists                       - The caller's wishlists with items
//! POST /wishlists                       - Create a wishlist
//! GET  /wishlists/{id}                  - One wishlist (public or own)
//! DELETE /wishlists/{id}                - Delete a wishlist
//! POST /wishlists/{id}/items            - Add a product
//! DELETE /wishlists/{id}/items/{product_id} - Remove a product
//! GET  /search?q=                       - Full-text search
//! GET  /recommendations                 - Personalized
//! GET  /recommendations/trending        - Trending
//!
//! # Orders and payments (/api/v1)
//! POST /orders                          - Place an order
//! GET  /orders                          - Bought and sold orders
//! GET  /orders/{id}                     - Order detail
//! POST /orders/{id}/status              - Move along the order lifecycle
//! POST /orders/{id}/review              - Review the seller
//! POST /orders/{id}/payments            - Initiate a payment
//! GET  /payments/{reference}            - Payment status
//! POST /payments/{reference}/verify     - Poll the provider
//! POST /webhooks/campay                 - Provider callback (signed)
//!
//! # Visitor cart (/api/v1/cart, public rate limit)
//! GET    /{session_key}                 - View cart
//! POST   /{session_key}/items           - Add an item
//! DELETE /{session_key}/items/{item_id} - Remove an item
//! POST   /checkout                      - Guest checkout
//!
//! # Chats and notifications (/api/v1)
//! GET  /chats                           - Inbox
//! POST /chats                           - Open a chat on a product
//! GET  /chats/unread                    - Unread message total
//! GET  /chats/{id}                      - Chat with history
//! POST /chats/{id}/messages             - Send a message
//! POST /chats/{id}/read                 - Mark messages read
//! GET  /notifications                   - List (?unread_only)
//! GET  /notifications/unread-count      - Unread count
//! POST /notifications/{id}/read         - Mark one read
//! POST /notifications/read-all          - Mark all read
//!
//! # Support (/api/v1/support)
//! GET  /                                - The caller's tickets
//! POST /                                - Open a ticket
//! GET  /{id}                            - Ticket with messages
//! POST /{id}/messages                   - Add a message
//! POST /{id}/close                      - Close a ticket
//!
//! # Finance (/api/v1)
//! GET  /wallet                          - Balance
//! GET  /wallet/transactions             - Ledger
//! POST /wallet/top-up                   - Add funds
//! POST /escrow                          - Create an escrow for an order
//! GET  /escrow/{id}                     - Escrow detail
//! POST /escrow/{id}/fund                - Fund from the wallet
//! POST /escrow/{id}/release             - Release to the seller
//! POST /escrow/{id}/dispute             - Open a dispute
//! POST /installments                    - Create a plan
//! GET  /installments                    - The caller's plans
//! GET  /installments/{id}               - Plan with schedule
//! POST /installments/{id}/pay           - Pay the next installment
//!
//! # Newsletter (/api/v1/newsletter, public rate limit)
//! POST /subscribe                       - Subscribe
//! GET|POST /unsubscribe?email=          - Unsubscribe
//!
//! # Admin (/api/v1/admin, ADMIN only)
//! GET  /dashboard                       - Platform totals
//! GET  /analytics?days=                 - Daily views and top searches
//! GET  /users                           - Search accounts
//! POST /users/{id}/active               - Activate or deactivate
//! GET  /products/pending                - Moderation queue
//! POST /products/{id}/approve|reject|suspend|feature
//! POST /categories                      - Create a category
//! GET  /stock                           - Platform stock (?status)
//! POST /stock                           - Add a stock line
//! PATCH /stock/{id}                     - Update quantity or status
//! GET  /stock/report                    - Stock analysis for every line
//! GET  /stock/{id}/report               - Stock analysis for one line
//! GET  /pickup-points                   - All pickup points
//! POST /pickup-points                   - Create a pickup point
//! POST /pickup-points/{id}/active       - Open or close a point
//! GET  /commissions?days=               - Commission report and payouts
//! GET  /sellers/{id}/summary            - Seller balance
//! POST /sellers/{id}/payouts            - Record a payout
//! POST /escrow/{id}/resolve             - Settle a dispute
//! GET  /newsletter/subscribers          - Subscribers (?active_only)
//! GET  /newsletter/campaigns            - Campaigns
//! POST /newsletter/campaigns            - Create a campaign
//! POST /newsletter/campaigns/{id}/send  - Send a campaign
//! GET  /support?status=                 - Support queue, most urgent first
//! GET  /support/stats                   - Tickets per status
//! GET  /support/{id}                    - Ticket with messages
//! POST /support/{id}/messages           - Reply to the customer
//! POST /support/{id}/assign             - Hand to a staff account
//! POST /support/{id}/close              - Close a ticket
//!
//! # Staff (/api/v1/staff, STAFF or ADMIN)
//! GET  /tasks                           - Tasks (?status)
//! POST /tasks                           - Create a task (admin)
//! POST /tasks/{id}/start|complete|cancel
//! POST /movements                       - Record a stock movement
//! GET  /pickup-points/{id}/movements    - Movement history
//! POST /pickups/confirm                 - Hand over an order by pickup code
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod chat;
pub mod finance;
pub mod newsletter;
pub mod notifications;
pub mod orders;
pub mod staff;
pub mod support;
pub mod users;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use serde::{Deserialize, Serialize};

use crate::db::Page;
use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// `?page=&per_page=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl From<PageQuery> for Page {
    fn from(query: PageQuery) -> Self {
        Self::new(query.page, query.per_page)
    }
}

/// Body of acknowledgement-only responses.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: &'static str,
}

impl Ack {
    #[must_use]
    pub const fn new(message: &'static str) -> Self {
        Self {
            success: true,
            message,
        }
    }
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/login/2fa", post(auth::verify_two_factor))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/phone/send-code", post(auth::send_phone_code))
        .route("/phone/verify", post(auth::verify_phone))
        .route("/2fa", post(auth::toggle_two_factor))
        .route("/password/forgot", post(auth::forgot_password))
        .route("/password/reset", post(auth::reset_password))
        .route("/me", get(auth::me))
        .layer(auth_rate_limiter())
}

/// Create the user routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(users::profile).patch(users::update_profile))
        .route("/me/password", post(users::change_password))
        .route("/me/earnings", get(users::earnings))
        .route("/{id}", get(users::seller_profile))
        .route("/{id}/reviews", get(users::seller_reviews))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(catalog::list_products).post(catalog::create_product))
        .route("/mine", get(catalog::my_products))
        .route(
            "/{id}",
            get(catalog::product_detail).patch(catalog::update_product),
        )
        .route("/{id}/submit", post(catalog::submit_product))
        .route("/{id}/status", post(catalog::set_product_status))
        .route("/{id}/images", post(catalog::add_image))
        .route("/{id}/favorite", post(catalog::toggle_favorite))
        .route("/{id}/similar", get(catalog::similar_products))
        .route("/{id}/also-bought", get(catalog::also_bought))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(catalog::wishlists).post(catalog::create_wishlist))
        .route(
            "/{id}",
            get(catalog::wishlist).delete(catalog::delete_wishlist),
        )
        .route("/{id}/items", post(catalog::add_wishlist_item))
        .route(
            "/{id}/items/{product_id}",
            delete(catalog::remove_wishlist_item),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list_orders).post(orders::place_order))
        .route("/{id}", get(orders::get_order))
        .route("/{id}/status", post(orders::update_status))
        .route("/{id}/review", post(orders::review_order))
        .route("/{id}/payments", post(orders::initiate_payment))
}

/// Create the visitor cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(cart::checkout))
        .route("/{session_key}", get(cart::view))
        .route("/{session_key}/items", post(cart::add_item))
        .route("/{session_key}/items/{item_id}", delete(cart::remove_item))
        .layer(api_rate_limiter())
}

/// Create the chat routes router.
pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(chat::inbox).post(chat::open))
        .route("/unread", get(chat::unread))
        .route("/{id}", get(chat::show))
        .route("/{id}/messages", post(chat::send_message))
        .route("/{id}/read", post(chat::mark_read))
}

/// Create the notification routes router.
pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(notifications::list))
        .route("/unread-count", get(notifications::unread_count))
        .route("/read-all", post(notifications::mark_all_read))
        .route("/{id}/read", post(notifications::mark_read))
}

/// Create the wallet, escrow and installment routes.
pub fn finance_routes() -> Router<AppState> {
    Router::new()
        .route("/wallet", get(finance::wallet))
        .route("/wallet/transactions", get(finance::transactions))
        .route("/wallet/top-up", post(finance::top_up))
        .route("/escrow", post(finance::create_escrow))
        .route("/escrow/{id}", get(finance::get_escrow))
        .route("/escrow/{id}/fund", post(finance::fund_escrow))
        .route("/escrow/{id}/release", post(finance::release_escrow))
        .route("/escrow/{id}/dispute", post(finance::dispute_escrow))
        .route(
            "/installments",
            get(finance::list_plans).post(finance::create_plan),
        )
        .route("/installments/{id}", get(finance::get_plan))
        .route("/installments/{id}/pay", post(finance::pay_installment))
}

/// Create the public newsletter routes router.
pub fn newsletter_routes() -> Router<AppState> {
    Router::new()
        .route("/subscribe", post(newsletter::subscribe))
        .route(
            "/unsubscribe",
            get(newsletter::unsubscribe).post(newsletter::unsubscribe),
        )
        .layer(api_rate_limiter())
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(admin::dashboard))
        .route("/analytics", get(admin::analytics))
        .route("/users", get(admin::list_users))
        .route("/users/{id}/active", post(admin::set_user_active))
        .route("/products/pending", get(admin::pending_products))
        .route("/products/{id}/approve", post(admin::approve_product))
        .route("/products/{id}/reject", post(admin::reject_product))
        .route("/products/{id}/suspend", post(admin::suspend_product))
        .route("/products/{id}/feature", post(admin::feature_product))
        .route("/categories", post(admin::create_category))
        .route("/stock", get(admin::list_stock).post(admin::create_stock))
        .route("/stock/report", get(admin::stock_report))
        .route("/stock/{id}", patch(admin::update_stock))
        .route("/stock/{id}/report", get(admin::stock_line_report))
        .route(
            "/pickup-points",
            get(admin::list_pickup_points).post(admin::create_pickup_point),
        )
        .route("/pickup-points/{id}/active", post(admin::set_pickup_point_active))
        .route("/commissions", get(admin::commission_report))
        .route("/sellers/{id}/summary", get(admin::seller_summary))
        .route("/sellers/{id}/payouts", post(admin::record_payout))
        .route("/escrow/{id}/resolve", post(admin::resolve_escrow))
        .route("/newsletter/subscribers", get(admin::newsletter_subscribers))
        .route(
            "/newsletter/campaigns",
            get(admin::newsletter_campaigns).post(admin::create_campaign),
        )
        .route("/newsletter/campaigns/{id}/send", post(admin::send_campaign))
        .route("/support", get(support::queue))
        .route("/support/stats", get(support::stats))
        .route("/support/{id}", get(support::admin_ticket))
        .route("/support/{id}/messages", post(support::admin_reply))
        .route("/support/{id}/assign", post(support::assign))
        .route("/support/{id}/close", post(support::admin_close))
}

/// Create the staff routes router.
pub fn staff_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(staff::list_tasks).post(staff::create_task))
        .route("/tasks/{id}/start", post(staff::start_task))
        .route("/tasks/{id}/complete", post(staff::complete_task))
        .route("/tasks/{id}/cancel", post(staff::cancel_task))
        .route("/movements", post(staff::record_movement))
        .route("/pickup-points/{id}/movements", get(staff::movements))
        .route("/pickups/confirm", post(staff::confirm_pickup))
}

/// Create the customer support routes router.
pub fn support_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(support::my_tickets).post(support::open_ticket))
        .route("/{id}", get(support::ticket))
        .route("/{id}/messages", post(support::reply))
        .route("/{id}/close", post(support::close))
}

/// Everything served under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/users", user_routes())
        .route("/categories", get(catalog::categories))
        .route("/pickup-points", get(catalog::pickup_points))
        .nest("/products", product_routes())
        .route("/favorites", get(catalog::favorites))
        .nest("/wishlists", wishlist_routes())
        .route("/search", get(catalog::search))
        .route("/recommendations", get(catalog::recommended))
        .route("/recommendations/trending", get(catalog::trending))
        .nest("/orders", order_routes())
        .route("/payments/{reference}", get(orders::get_payment))
        .route("/payments/{reference}/verify", post(orders::verify_payment))
        .route("/webhooks/campay", post(orders::campay_webhook))
        .nest("/cart", cart_routes())
        .nest("/chats", chat_routes())
        .nest("/notifications", notification_routes())
        .nest("/support", support_routes())
        .merge(finance_routes())
        .nest("/newsletter", newsletter_routes())
        .nest("/admin", admin_routes())
        .nest("/staff", staff_routes())
}

/// Create the full router (without state or outer layers).
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", api_routes())
        .route("/ws/chat/{chat_id}", get(chat::websocket))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_is_clamped() {
        let page = Page::from(PageQuery {
            page: Some(0),
            per_page: Some(500),
        });
        assert_eq!(page.number, 1);
        assert_eq!(page.size, Page::MAX_SIZE);

        let page = Page::from(PageQuery::default());
        assert_eq!(page.size, Page::DEFAULT_SIZE);
    }
}
