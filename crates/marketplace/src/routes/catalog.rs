//! Catalog route handlers: categories, listings, favorites, wishlists,
//! search and recommendations.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vide_grenier_core::{
    CategoryId, City, Condition, ProductId, ProductStatus, UserType, WishlistId, Xaf,
};

use crate::db::Page;
use crate::db::backoffice::BackofficeRepository;
use crate::db::catalog::{ProductFilter, ProductRepository};
use crate::error::{ApiJson, AppError, Result};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{
    CategoryNode, PickupPoint, Product, ProductImage, Wishlist, WishlistDetail,
};
use crate::services::catalog::{
    ListingChanges, ListingForm, NewImage, ProductDetail, ProductPage, WishlistForm,
};
use crate::services::recommendations::{DEFAULT_LIMIT, MAX_LIMIT, RecommendedProduct};
use crate::services::CatalogService;
use crate::state::AppState;

fn catalog(state: &AppState) -> CatalogService<'_> {
    CatalogService::new(
        state.pool(),
        state.notifier(),
        state.config().commission_rate,
    )
}

/// Product listing query: filters plus pagination.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<CategoryId>,
    pub condition: Option<Condition>,
    pub city: Option<City>,
    pub search: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ProductQuery {
    fn filter(&self) -> ProductFilter {
        ProductFilter {
            category: self.category,
            condition: self.condition,
            city: self.city,
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            min_price: self.min_price.map(Xaf::from_francs),
            max_price: self.max_price.map(Xaf::from_francs),
            seller: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ProductStatus,
}

#[derive(Debug, Deserialize)]
pub struct WishlistItemRequest {
    pub product_id: ProductId,
}

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub product_id: ProductId,
    pub is_favorite: bool,
}

/// Active category tree with product counts.
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<CategoryNode>>> {
    Ok(Json(catalog(&state).categories().await?))
}

/// Open pickup points, for checkout forms.
pub async fn pickup_points(State(state): State<AppState>) -> Result<Json<Vec<PickupPoint>>> {
    let points = BackofficeRepository::new(state.pool())
        .pickup_points()
        .await?
        .into_iter()
        .filter(|p| p.is_active)
        .collect();
    Ok(Json(points))
}

#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductPage>> {
    let page = Page::new(query.page, query.per_page);
    Ok(Json(catalog(&state).list(&query.filter(), page).await?))
}

/// Listing detail. Counts a view and records it for recommendations.
#[instrument(skip(viewer, state))]
pub async fn product_detail(
    OptionalAuth(viewer): OptionalAuth,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductDetail>> {
    let viewer = viewer.map(|u| (u.id, u.user_type));
    Ok(Json(catalog(&state).detail(id, viewer).await?))
}

pub async fn my_products(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(catalog(&state).seller_listings(user.id).await?))
}

#[instrument(skip(user, state, form), fields(seller_id = %user.id))]
pub async fn create_product(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(form): ApiJson<ListingForm>,
) -> Result<(StatusCode, Json<Product>)> {
    if user.user_type == UserType::Staff {
        return Err(AppError::Forbidden(
            "staff accounts cannot publish listings".to_owned(),
        ));
    }
    let product = catalog(&state)
        .create(user.id, user.user_type, &form)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[instrument(skip(user, state, changes), fields(seller_id = %user.id))]
pub async fn update_product(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    ApiJson(changes): ApiJson<ListingChanges>,
) -> Result<Json<Product>> {
    Ok(Json(catalog(&state).update(id, user.id, &changes).await?))
}

#[instrument(skip(user, state), fields(seller_id = %user.id))]
pub async fn submit_product(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    Ok(Json(catalog(&state).submit(id, user.id).await?))
}

/// Seller-driven status change (resubmit, mark sold, withdraw).
#[instrument(skip(user, state), fields(seller_id = %user.id, status = %body.status))]
pub async fn set_product_status(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    ApiJson(body): ApiJson<StatusRequest>,
) -> Result<Json<Product>> {
    Ok(Json(
        catalog(&state)
            .set_seller_status(id, user.id, body.status)
            .await?,
    ))
}

pub async fn add_image(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    ApiJson(image): ApiJson<NewImage>,
) -> Result<(StatusCode, Json<ProductImage>)> {
    let image = catalog(&state).add_image(id, user.id, &image).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn toggle_favorite(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<FavoriteResponse>> {
    let is_favorite = catalog(&state).toggle_favorite(user.id, id).await?;
    Ok(Json(FavoriteResponse {
        product_id: id,
        is_favorite,
    }))
}

pub async fn favorites(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(catalog(&state).favorites(user.id).await?))
}

pub async fn wishlists(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<WishlistDetail>>> {
    Ok(Json(catalog(&state).wishlists(user.id).await?))
}

#[instrument(skip(user, state, form), fields(user_id = %user.id))]
pub async fn create_wishlist(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(form): ApiJson<WishlistForm>,
) -> Result<(StatusCode, Json<Wishlist>)> {
    let wishlist = catalog(&state).create_wishlist(user.id, &form).await?;
    Ok((StatusCode::CREATED, Json(wishlist)))
}

/// A wishlist. Public lists are readable without an account.
pub async fn wishlist(
    OptionalAuth(viewer): OptionalAuth,
    State(state): State<AppState>,
    Path(id): Path<WishlistId>,
) -> Result<Json<WishlistDetail>> {
    Ok(Json(
        catalog(&state)
            .wishlist(id, viewer.map(|u| u.id))
            .await?,
    ))
}

pub async fn delete_wishlist(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<WishlistId>,
) -> Result<StatusCode> {
    catalog(&state).delete_wishlist(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(user, state, request), fields(user_id = %user.id))]
pub async fn add_wishlist_item(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<WishlistId>,
    ApiJson(request): ApiJson<WishlistItemRequest>,
) -> Result<Json<WishlistDetail>> {
    Ok(Json(
        catalog(&state)
            .add_to_wishlist(user.id, id, request.product_id)
            .await?,
    ))
}

pub async fn remove_wishlist_item(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path((id, product)): Path<(WishlistId, ProductId)>,
) -> Result<Json<WishlistDetail>> {
    Ok(Json(
        catalog(&state)
            .remove_from_wishlist(user.id, id, product)
            .await?,
    ))
}

#[instrument(skip(viewer, state), fields(q = %query.q))]
pub async fn search(
    OptionalAuth(viewer): OptionalAuth,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(
        catalog(&state)
            .search(&query.q, viewer.map(|u| u.id))
            .await?,
    ))
}

pub async fn trending(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<RecommendedProduct>>> {
    Ok(Json(state.recommendations().trending(query.limit()).await?))
}

/// Personalized recommendations for the caller.
#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn recommended(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<RecommendedProduct>>> {
    Ok(Json(
        state
            .recommendations()
            .for_user(user.id, query.limit())
            .await?,
    ))
}

pub async fn similar_products(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<RecommendedProduct>>> {
    let product = public_product(&state, id).await?;
    Ok(Json(
        state
            .recommendations()
            .similar(&product, query.limit())
            .await?,
    ))
}

/// Listings bought together with this one.
pub async fn also_bought(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<RecommendedProduct>>> {
    let product = public_product(&state, id).await?;
    Ok(Json(
        state
            .recommendations()
            .cross_sell(product.id, query.limit())
            .await?,
    ))
}

async fn public_product(state: &AppState, id: ProductId) -> Result<Product> {
    ProductRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|p| p.status == ProductStatus::Active)
        .ok_or_else(|| AppError::NotFound("Product".to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_product_query_filter() {
        let query: ProductQuery = serde_json::from_value(serde_json::json!({
            "city": "DOUALA",
            "condition": "BON",
            "search": "  ",
            "min_price": 5000,
        }))
        .unwrap();
        let filter = query.filter();
        assert_eq!(filter.city, Some(City::Douala));
        assert_eq!(filter.condition, Some(Condition::Bon));
        assert!(filter.search.is_none());
        assert_eq!(filter.min_price, Some(Xaf::from_francs(5000)));
        assert!(filter.max_price.is_none());
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(LimitQuery::default().limit(), DEFAULT_LIMIT);
        assert_eq!(LimitQuery { limit: Some(0) }.limit(), 1);
        assert_eq!(LimitQuery { limit: Some(500) }.limit(), MAX_LIMIT);
    }
}
