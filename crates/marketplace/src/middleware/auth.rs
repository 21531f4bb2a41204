//! Bearer token extractors.
//!
//! Handlers opt into authentication by taking one of these extractors:
//!
//! ```rust,ignore
//! async fn my_orders(RequireAuth(user): RequireAuth, State(state): State<AppState>) -> ... {
//!     // user.id, user.user_type
//! }
//! ```
//!
//! Only access tokens are accepted; a refresh token is rejected with 401.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};

use vide_grenier_core::{UserId, UserType};

use crate::error::{AppError, set_sentry_user};
use crate::services::auth::{AuthError, Claims, JwtKeys, TokenType};
use crate::state::AppState;

/// The authenticated caller, as stated by a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub user_type: UserType,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.user_id,
            email: claims.email,
            user_type: claims.user_type,
        }
    }
}

impl AuthUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }
}

/// Why a request was refused by an auth extractor.
#[derive(Debug)]
pub enum AuthRejection {
    /// No `Authorization: Bearer` header.
    MissingToken,
    /// The token failed verification.
    InvalidToken(AuthError),
    /// Authenticated, but the account type may not use the route.
    Forbidden(&'static str),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::MissingToken => AppError::Unauthorized("authentication required".to_owned()),
            Self::InvalidToken(e) => AppError::Auth(e),
            Self::Forbidden(msg) => AppError::Forbidden(msg.to_owned()),
        }
        .into_response()
    }
}

/// The token in an `Authorization: Bearer <token>` header, if any.
fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify an access token and tag the Sentry scope with its user.
///
/// # Errors
///
/// Returns the verification error from [`JwtKeys::verify`].
pub fn authenticate(keys: &JwtKeys, token: &str) -> Result<AuthUser, AuthError> {
    let user = AuthUser::from(keys.verify(token, TokenType::Access)?);
    set_sentry_user(&user.id, Some(&user.email));
    Ok(user)
}

/// Extractor that requires a valid access token.
pub struct RequireAuth(pub AuthUser);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthRejection::MissingToken)?;
        authenticate(state.jwt(), token)
            .map(Self)
            .map_err(AuthRejection::InvalidToken)
    }
}

/// Extractor that reads the caller when a token is present.
///
/// A missing header yields `None`; a present but invalid token is still
/// rejected so clients notice expired sessions.
pub struct OptionalAuth(pub Option<AuthUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            None => Ok(Self(None)),
            Some(token) => authenticate(state.jwt(), token)
                .map(|user| Self(Some(user)))
                .map_err(AuthRejection::InvalidToken),
        }
    }
}

/// Extractor that requires an ADMIN account.
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthRejection::Forbidden("admin access required"));
        }
        Ok(Self(user))
    }
}

/// Extractor that requires a STAFF or ADMIN account.
pub struct RequireStaff(pub AuthUser);

impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.user_type.is_staff_or_admin() {
            return Err(AuthRejection::Forbidden("staff access required"));
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{Request, StatusCode};

    use super::*;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/orders");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc.def.ghi"))), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&parts(Some("Basic dXNlcjpwYXNz"))), None);
        assert_eq!(bearer_token(&parts(Some("Bearer   "))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }

    #[test]
    fn test_rejection_statuses() {
        assert_eq!(
            AuthRejection::MissingToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::InvalidToken(AuthError::WrongTokenType)
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::Forbidden("admin access required")
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
    }
}
