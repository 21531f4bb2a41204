//! Account and token route handlers.
//!
//! Tokens are stateless: logout is acknowledged and the client drops its
//! tokens. Two-factor logins answer the password step with
//! `two_factor_required` and a code sent by SMS (email fallback).

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vide_grenier_core::{City, UserId, VerificationPurpose};

use super::Ack;
use crate::error::{ApiJson, Result};
use crate::middleware::RequireAuth;
use crate::models::UserProfile;
use crate::services::auth::{AuthService, LoginOutcome, Registration, TokenPair, TokenType};
use crate::state::AppState;

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub phone: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub city: City,
}

/// Login request body. `identifier` is an email or a phone number.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorRequest {
    pub user_id: UserId,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub identifier: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

/// Tokens plus the account they were issued for.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserProfile,
}

/// Answer to the password step of a login.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Session(Box<SessionResponse>),
    TwoFactor {
        two_factor_required: bool,
        user_id: UserId,
    },
}

/// Create a client account and sign it in.
#[instrument(skip(state, body), fields(email = %body.email))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let user = AuthService::new(state.pool())
        .register(&Registration {
            email: &body.email,
            phone: &body.phone,
            password: &body.password,
            first_name: &body.first_name,
            last_name: &body.last_name,
            city: body.city,
        })
        .await?;
    tracing::info!(user_id = %user.id, "Account registered");

    state.notifier().welcome(&user);
    let tokens = state.jwt().issue_pair(&user)?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            tokens,
            user: user.into(),
        }),
    ))
}

/// Check a password. Accounts with two-factor enabled get a code instead of tokens.
#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let auth = AuthService::new(state.pool());
    match auth.login(&body.identifier, &body.password).await? {
        LoginOutcome::Authenticated(user) => {
            let tokens = state.jwt().issue_pair(&user)?;
            Ok(Json(LoginResponse::Session(Box::new(SessionResponse {
                tokens,
                user: user.into(),
            }))))
        }
        LoginOutcome::TwoFactorRequired(user) => {
            let code = auth.issue_code(user.id, VerificationPurpose::TwoFactor).await?;
            state.notifier().send_code(&user, &code).await;
            Ok(Json(LoginResponse::TwoFactor {
                two_factor_required: true,
                user_id: user.id,
            }))
        }
    }
}

/// Finish a two-factor login with the code that was sent.
#[instrument(skip(state, body), fields(user_id = %body.user_id))]
pub async fn verify_two_factor(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<TwoFactorRequest>,
) -> Result<Json<SessionResponse>> {
    let user = AuthService::new(state.pool())
        .complete_two_factor(body.user_id, &body.code)
        .await?;
    let tokens = state.jwt().issue_pair(&user)?;
    Ok(Json(SessionResponse {
        tokens,
        user: user.into(),
    }))
}

/// Exchange a refresh token for a new pair. Only refresh tokens are accepted.
#[instrument(skip(state, body))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> Result<Json<TokenPair>> {
    let claims = state.jwt().verify(&body.refresh_token, TokenType::Refresh)?;
    let user = AuthService::new(state.pool())
        .active_user(claims.user_id)
        .await?;
    Ok(Json(state.jwt().issue_pair(&user)?))
}

pub async fn logout(RequireAuth(user): RequireAuth) -> Json<Ack> {
    tracing::debug!(user_id = %user.id, "Logout");
    Json(Ack::new("Logged out"))
}

/// Send a fresh phone verification code.
#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn send_phone_code(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Ack>> {
    let auth = AuthService::new(state.pool());
    let account = auth.active_user(user.id).await?;
    let code = auth.issue_code(account.id, VerificationPurpose::Phone).await?;
    state.notifier().send_code(&account, &code).await;
    Ok(Json(Ack::new("Verification code sent")))
}

#[instrument(skip(user, state, body), fields(user_id = %user.id))]
pub async fn verify_phone(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CodeRequest>,
) -> Result<Json<Ack>> {
    AuthService::new(state.pool())
        .confirm_phone(user.id, &body.code)
        .await?;
    Ok(Json(Ack::new("Phone number verified")))
}

/// Send a reset code. The answer is the same whether or not the account
/// exists.
#[instrument(skip(state, body))]
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<Ack>> {
    if let Some((user, code)) = AuthService::new(state.pool())
        .request_password_reset(&body.identifier)
        .await?
    {
        state.notifier().send_code(&user, &code).await;
    }
    Ok(Json(Ack::new("If an account matches, a reset code has been sent")))
}

#[instrument(skip(state, body))]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResetPasswordRequest>,
) -> Result<Json<Ack>> {
    AuthService::new(state.pool())
        .reset_password(&body.identifier, &body.code, &body.new_password)
        .await?;
    Ok(Json(Ack::new("Password updated")))
}

#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn toggle_two_factor(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ToggleRequest>,
) -> Result<Json<Ack>> {
    AuthService::new(state.pool())
        .set_two_factor(user.id, body.enabled)
        .await?;
    Ok(Json(Ack::new(if body.enabled {
        "Two-factor login enabled"
    } else {
        "Two-factor login disabled"
    })))
}

/// The account behind the access token.
pub async fn me(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>> {
    let account = AuthService::new(state.pool()).active_user(user.id).await?;
    Ok(Json(account.into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_two_factor_response_shape() {
        let user_id = UserId::generate();
        let body = serde_json::to_value(LoginResponse::TwoFactor {
            two_factor_required: true,
            user_id,
        })
        .unwrap();
        assert_eq!(body["two_factor_required"], true);
        assert_eq!(body["user_id"], serde_json::json!(user_id));
        assert!(body.get("access_token").is_none());
    }

    #[test]
    fn test_register_request_rejects_unknown_city() {
        let parsed = serde_json::from_value::<RegisterRequest>(serde_json::json!({
            "email": "awa@example.cm",
            "phone": "677123456",
            "password": "motdepasse1",
            "first_name": "Awa",
            "last_name": "Ngono",
            "city": "KRIBI",
        }));
        assert!(parsed.is_err());
    }
}
