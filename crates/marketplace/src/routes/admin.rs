//! Admin back-office handlers.
//!
//! Every handler takes [`RequireAdmin`]; the extractor rejects other account
//! types with 403 before any query runs.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vide_grenier_core::{
    AdminStockId, AdminStockStatus, AnalyticsMetric, CategoryId, City, EscrowId, NewsletterId,
    PickupPointId, ProductId, UserId, UserType, Xaf, commission::SellerSummary,
};

use super::{Ack, PageQuery};
use crate::db::Page;
use crate::db::analytics::{AnalyticsRepository, MetricPoint};
use crate::db::backoffice::{BackofficeRepository, NewAdminStock, NewPickupPoint};
use crate::db::dashboard::{DashboardRepository, DashboardStats};
use crate::db::users::UserRepository;
use crate::error::{ApiJson, AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{
    AdminStockItem, Category, Escrow, Newsletter, PickupPoint, Product, Subscriber, UserProfile,
};
use crate::services::finance::Resolution;
use crate::services::reports::{CommissionReport, StockLineReport};
use crate::services::{CatalogService, FinanceService, NewsletterService, ReportService};
use crate::state::AppState;

const DEFAULT_REPORT_DAYS: i64 = 30;
const MAX_REPORT_DAYS: i64 = 365;
const TOP_SEARCHES: i64 = 20;

fn catalog(state: &AppState) -> CatalogService<'_> {
    CatalogService::new(
        state.pool(),
        state.notifier(),
        state.config().commission_rate,
    )
}

// =============================================================================
// Request and response types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

impl DaysQuery {
    fn days(&self) -> i64 {
        self.days
            .unwrap_or(DEFAULT_REPORT_DAYS)
            .clamp(1, MAX_REPORT_DAYS)
    }
}

#[derive(Debug, Serialize)]
pub struct SearchCount {
    pub query: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsOverview {
    pub since: DateTime<Utc>,
    pub product_views: Vec<MetricPoint>,
    pub top_searches: Vec<SearchCount>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub user_type: Option<UserType>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub items: Vec<UserProfile>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuspendRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeatureRequest {
    pub featured: bool,
}

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    pub parent_id: Option<CategoryId>,
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockQuery {
    pub status: Option<AdminStockStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StockRequest {
    pub product_id: ProductId,
    pub pickup_point_id: Option<PickupPointId>,
    pub sku: String,
    /// Whole francs paid to the supplier per unit.
    pub purchase_price: i64,
    pub quantity: i32,
    #[serde(default = "default_low_stock")]
    pub low_stock_threshold: i32,
    pub supplier: Option<String>,
    pub notes: Option<String>,
}

const fn default_low_stock() -> i32 {
    5
}

#[derive(Debug, Deserialize)]
pub struct StockUpdate {
    pub quantity: Option<i32>,
    pub status: Option<AdminStockStatus>,
}

#[derive(Debug, Deserialize)]
pub struct PickupPointRequest {
    pub name: String,
    pub address: String,
    pub city: City,
    pub phone: Option<String>,
    pub manager_id: Option<UserId>,
    pub opening_hours: Option<String>,
    pub capacity: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    /// Whole francs.
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct PayoutResponse {
    pub seller_id: UserId,
    pub amount: Xaf,
    pub remaining_balance: Xaf,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: Resolution,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriberQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct CampaignRequest {
    pub subject: String,
    pub content: String,
    pub scheduled_for: Option<DateTime<Utc>>,
}

// =============================================================================
// Dashboard and analytics
// =============================================================================

pub async fn dashboard(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>> {
    Ok(Json(DashboardRepository::new(state.pool()).stats().await?))
}

/// Daily product views and the most frequent searches.
pub async fn analytics(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<AnalyticsOverview>> {
    let since = Utc::now() - Duration::days(query.days());
    let repo = AnalyticsRepository::new(state.pool());
    let product_views = repo.daily_totals(AnalyticsMetric::ProductView, since).await?;
    let top_searches = repo
        .top_searches(since, TOP_SEARCHES)
        .await?
        .into_iter()
        .map(|(query, count)| SearchCount { query, count })
        .collect();
    Ok(Json(AnalyticsOverview {
        since,
        product_views,
        top_searches,
    }))
}

// =============================================================================
// Users
// =============================================================================

pub async fn list_users(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserPage>> {
    let page = Page::new(query.page, query.per_page);
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let (users, total) = UserRepository::new(state.pool())
        .list(search, query.user_type, page)
        .await?;
    Ok(Json(UserPage {
        items: users.into_iter().map(UserProfile::from).collect(),
        total,
        page: page.number,
        per_page: page.size,
    }))
}

#[instrument(skip(admin, state), fields(admin_id = %admin.id))]
pub async fn set_user_active(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    ApiJson(body): ApiJson<ActiveRequest>,
) -> Result<Json<Ack>> {
    if id == admin.id && !body.active {
        return Err(AppError::BadRequest(
            "you cannot deactivate your own account".to_owned(),
        ));
    }
    UserRepository::new(state.pool())
        .set_active(id, body.active)
        .await?;
    tracing::info!(user_id = %id, active = body.active, "Account activation changed");
    Ok(Json(Ack::new(if body.active {
        "Account activated"
    } else {
        "Account deactivated"
    })))
}

// =============================================================================
// Moderation
// =============================================================================

pub async fn pending_products(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(catalog(&state).pending(page.into()).await?))
}

#[instrument(skip(admin, state), fields(admin_id = %admin.id))]
pub async fn approve_product(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    Ok(Json(catalog(&state).approve(id).await?))
}

#[instrument(skip(admin, state, body), fields(admin_id = %admin.id))]
pub async fn reject_product(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    ApiJson(body): ApiJson<RejectRequest>,
) -> Result<Json<Product>> {
    Ok(Json(catalog(&state).reject(id, &body.reason).await?))
}

#[instrument(skip(admin, state, body), fields(admin_id = %admin.id))]
pub async fn suspend_product(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    ApiJson(body): ApiJson<SuspendRequest>,
) -> Result<Json<Product>> {
    Ok(Json(
        catalog(&state)
            .suspend(id, body.reason.as_deref())
            .await?,
    ))
}

pub async fn feature_product(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    ApiJson(body): ApiJson<FeatureRequest>,
) -> Result<Json<Ack>> {
    catalog(&state).set_featured(id, body.featured).await?;
    Ok(Json(Ack::new(if body.featured {
        "Product featured"
    } else {
        "Product no longer featured"
    })))
}

pub async fn create_category(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>)> {
    let category = catalog(&state)
        .create_category(
            &body.name,
            body.parent_id,
            body.icon.as_deref(),
            body.sort_order,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

// =============================================================================
// Platform stock
// =============================================================================

pub async fn list_stock(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<StockQuery>,
) -> Result<Json<Vec<AdminStockItem>>> {
    Ok(Json(
        BackofficeRepository::new(state.pool())
            .admin_stock(query.status)
            .await?,
    ))
}

#[instrument(skip(admin, state, body), fields(admin_id = %admin.id, sku = %body.sku))]
pub async fn create_stock(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<StockRequest>,
) -> Result<(StatusCode, Json<AdminStockItem>)> {
    let sku = body.sku.trim();
    if sku.is_empty() {
        return Err(AppError::BadRequest("sku is required".to_owned()));
    }
    if body.purchase_price <= 0 {
        return Err(AppError::BadRequest(
            "purchase_price must be positive".to_owned(),
        ));
    }
    if body.quantity < 0 || body.low_stock_threshold < 0 {
        return Err(AppError::BadRequest(
            "quantities cannot be negative".to_owned(),
        ));
    }

    let item = BackofficeRepository::new(state.pool())
        .create_admin_stock(&NewAdminStock {
            product_id: body.product_id,
            pickup_point_id: body.pickup_point_id,
            sku,
            purchase_price: Xaf::from_francs(body.purchase_price),
            quantity: body.quantity,
            low_stock_threshold: body.low_stock_threshold,
            supplier: body.supplier.as_deref(),
            notes: body.notes.as_deref(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_stock(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<AdminStockId>,
    ApiJson(body): ApiJson<StockUpdate>,
) -> Result<Json<AdminStockItem>> {
    if body.quantity.is_some_and(|q| q < 0) {
        return Err(AppError::BadRequest(
            "quantity cannot be negative".to_owned(),
        ));
    }
    let repo = BackofficeRepository::new(state.pool());
    repo.update_admin_stock(id, body.quantity, body.status).await?;
    let item = repo
        .admin_stock_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock line".to_owned()))?;
    Ok(Json(item))
}

/// Stock analysis (velocity, forecast, reorder point) for every line.
pub async fn stock_report(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<StockLineReport>>> {
    Ok(Json(
        ReportService::new(state.pool())
            .stock_report(Utc::now())
            .await?,
    ))
}

pub async fn stock_line_report(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<AdminStockId>,
) -> Result<Json<StockLineReport>> {
    Ok(Json(
        ReportService::new(state.pool())
            .stock_line(id, Utc::now())
            .await?,
    ))
}

// =============================================================================
// Pickup points
// =============================================================================

pub async fn list_pickup_points(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<PickupPoint>>> {
    Ok(Json(
        BackofficeRepository::new(state.pool())
            .pickup_points()
            .await?,
    ))
}

#[instrument(skip(admin, state, body), fields(admin_id = %admin.id, name = %body.name))]
pub async fn create_pickup_point(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<PickupPointRequest>,
) -> Result<(StatusCode, Json<PickupPoint>)> {
    let name = body.name.trim();
    let address = body.address.trim();
    if name.is_empty() || address.is_empty() {
        return Err(AppError::BadRequest(
            "name and address are required".to_owned(),
        ));
    }
    let capacity = body.capacity.unwrap_or(PickupPoint::DEFAULT_CAPACITY);
    if capacity <= 0 {
        return Err(AppError::BadRequest("capacity must be positive".to_owned()));
    }

    let point = BackofficeRepository::new(state.pool())
        .create_pickup_point(&NewPickupPoint {
            name,
            address,
            city: body.city,
            phone: body.phone.as_deref(),
            manager_id: body.manager_id,
            opening_hours: body.opening_hours.as_deref(),
            capacity,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(point)))
}

pub async fn set_pickup_point_active(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<PickupPointId>,
    ApiJson(body): ApiJson<ActiveRequest>,
) -> Result<Json<Ack>> {
    BackofficeRepository::new(state.pool())
        .set_pickup_point_active(id, body.active)
        .await?;
    Ok(Json(Ack::new(if body.active {
        "Pickup point opened"
    } else {
        "Pickup point closed"
    })))
}

// =============================================================================
// Commission, payouts and escrow
// =============================================================================

/// Commission over the last `days` days with payout recommendations.
pub async fn commission_report(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<CommissionReport>> {
    Ok(Json(
        ReportService::new(state.pool())
            .commission_report(query.days(), Utc::now())
            .await?,
    ))
}

pub async fn seller_summary(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<SellerSummary>> {
    Ok(Json(ReportService::new(state.pool()).seller_summary(id).await?))
}

#[instrument(skip(admin, state), fields(admin_id = %admin.id))]
pub async fn record_payout(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    ApiJson(body): ApiJson<PayoutRequest>,
) -> Result<(StatusCode, Json<PayoutResponse>)> {
    let amount = Xaf::from_francs(body.amount);
    let remaining_balance = ReportService::new(state.pool())
        .record_payout(state.notifier(), id, amount)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PayoutResponse {
            seller_id: id,
            amount,
            remaining_balance,
        }),
    ))
}

#[instrument(skip(admin, state), fields(admin_id = %admin.id))]
pub async fn resolve_escrow(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<EscrowId>,
    ApiJson(body): ApiJson<ResolveRequest>,
) -> Result<Json<Escrow>> {
    Ok(Json(
        FinanceService::new(state.pool(), state.notifier())
            .resolve_escrow(id, body.resolution)
            .await?,
    ))
}

// =============================================================================
// Newsletter
// =============================================================================

pub async fn newsletter_subscribers(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<SubscriberQuery>,
) -> Result<Json<Vec<Subscriber>>> {
    Ok(Json(
        NewsletterService::new(state.pool(), state.email())
            .subscribers(query.active_only)
            .await?,
    ))
}

pub async fn newsletter_campaigns(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<Newsletter>>> {
    Ok(Json(
        NewsletterService::new(state.pool(), state.email())
            .campaigns()
            .await?,
    ))
}

#[instrument(skip(admin, state, body), fields(admin_id = %admin.id))]
pub async fn create_campaign(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CampaignRequest>,
) -> Result<(StatusCode, Json<Newsletter>)> {
    let campaign = NewsletterService::new(state.pool(), state.email())
        .create(&body.subject, &body.content, admin.id, body.scheduled_for)
        .await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// Send a campaign to every active subscriber. A campaign is sent once.
#[instrument(skip(admin, state), fields(admin_id = %admin.id))]
pub async fn send_campaign(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<NewsletterId>,
) -> Result<Json<Newsletter>> {
    let campaign = NewsletterService::new(state.pool(), state.email())
        .send(id)
        .await?;
    tracing::info!(newsletter_id = %id, recipients = campaign.recipients_count, "Newsletter sent");
    Ok(Json(campaign))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_report_days_are_clamped() {
        assert_eq!(DaysQuery::default().days(), DEFAULT_REPORT_DAYS);
        assert_eq!(DaysQuery { days: Some(-3) }.days(), 1);
        assert_eq!(DaysQuery { days: Some(10_000) }.days(), MAX_REPORT_DAYS);
    }

    #[test]
    fn test_resolution_labels() {
        let body: ResolveRequest =
            serde_json::from_value(serde_json::json!({ "resolution": "REFUND_TO_BUYER" })).unwrap();
        assert_eq!(body.resolution, Resolution::RefundToBuyer);
    }

    #[test]
    fn test_stock_request_defaults() {
        let body: StockRequest = serde_json::from_value(serde_json::json!({
            "product_id": ProductId::generate(),
            "sku": "VGK-TV-001",
            "purchase_price": 45000,
            "quantity": 3,
        }))
        .unwrap();
        assert_eq!(body.low_stock_threshold, 5);
        assert!(body.pickup_point_id.is_none());
    }
}
