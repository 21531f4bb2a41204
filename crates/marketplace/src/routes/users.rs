//! Profile and public seller route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vide_grenier_core::{City, LoyaltyLevel, UserId, commission::SellerSummary};

use super::Ack;
use crate::db::Page;
use crate::db::catalog::ProductFilter;
use crate::db::reviews::ReviewRepository;
use crate::db::users::UserRepository;
use crate::error::{ApiJson, AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{Product, Review, User, UserProfile};
use crate::services::{AuthService, CatalogService, ReportService};
use crate::state::AppState;

/// Profile edits. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub city: Option<City>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

/// What buyers see about a seller. Contact details stay private.
#[derive(Debug, Serialize)]
pub struct SellerProfile {
    pub id: UserId,
    pub first_name: String,
    pub last_name_initial: String,
    pub city: City,
    pub trust_score: i32,
    pub loyalty_level: LoyaltyLevel,
    pub phone_verified: bool,
    pub member_since: DateTime<Utc>,
    pub average_rating: Option<Decimal>,
    pub review_count: i64,
    pub listings: Vec<Product>,
}

impl SellerProfile {
    fn new(user: &User, rating: (Option<Decimal>, i64), listings: Vec<Product>) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name_initial: user
                .last_name
                .chars()
                .next()
                .map(|c| format!("{}.", c.to_uppercase()))
                .unwrap_or_default(),
            city: user.city,
            trust_score: user.trust_score,
            loyalty_level: user.loyalty_level(),
            phone_verified: user.phone_verified,
            member_since: user.created_at,
            average_rating: rating.0,
            review_count: rating.1,
            listings,
        }
    }
}

pub async fn profile(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>> {
    let account = AuthService::new(state.pool()).get_user(user.id).await?;
    Ok(Json(account.into()))
}

#[instrument(skip(user, state, body), fields(user_id = %user.id))]
pub async fn update_profile(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ProfileUpdate>,
) -> Result<Json<UserProfile>> {
    let first_name = non_blank(body.first_name.as_deref(), "first_name")?;
    let last_name = non_blank(body.last_name.as_deref(), "last_name")?;
    let address = body.address.as_deref().map(str::trim);

    let updated = UserRepository::new(state.pool())
        .update_profile(user.id, first_name, last_name, body.city, address)
        .await?;
    Ok(Json(updated.into()))
}

#[instrument(skip(user, state, body), fields(user_id = %user.id))]
pub async fn change_password(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<PasswordChange>,
) -> Result<Json<Ack>> {
    AuthService::new(state.pool())
        .change_password(user.id, &body.current_password, &body.new_password)
        .await?;
    Ok(Json(Ack::new("Password updated")))
}

/// Sales, commission and unpaid balance of the caller as a seller.
pub async fn earnings(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<SellerSummary>> {
    Ok(Json(
        ReportService::new(state.pool()).seller_summary(user.id).await?,
    ))
}

#[instrument(skip(state))]
pub async fn seller_profile(
    Path(id): Path<UserId>,
    State(state): State<AppState>,
) -> Result<Json<SellerProfile>> {
    let seller = AuthService::new(state.pool())
        .get_user(id)
        .await
        .ok()
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::NotFound("Seller".to_owned()))?;

    let rating = ReviewRepository::new(state.pool())
        .seller_rating(seller.id)
        .await?;
    let listings = CatalogService::new(
        state.pool(),
        state.notifier(),
        state.config().commission_rate,
    )
    .list(
        &ProductFilter {
            seller: Some(seller.id),
            ..ProductFilter::default()
        },
        Page::new(None, None),
    )
    .await?
    .items;

    Ok(Json(SellerProfile::new(&seller, rating, listings)))
}

pub async fn seller_reviews(
    Path(id): Path<UserId>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Review>>> {
    Ok(Json(
        ReviewRepository::new(state.pool()).list_for_seller(id).await?,
    ))
}

fn non_blank<'s>(value: Option<&'s str>, field: &str) -> Result<Option<&'s str>> {
    match value.map(str::trim) {
        Some("") => Err(AppError::BadRequest(format!("{field} cannot be empty"))),
        other => Ok(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(None, "first_name").unwrap(), None);
        assert_eq!(non_blank(Some(" Awa "), "first_name").unwrap(), Some("Awa"));
        assert!(non_blank(Some("   "), "first_name").is_err());
    }
}
