//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Every error leaves the API as
//! `{"success": false, "error": "<message>"}` with a matching status code;
//! server-side failures are captured to Sentry and their details hidden.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use thiserror::Error;

use vide_grenier_core::TransitionError;

use crate::db::RepositoryError;
use crate::services::catalog::CatalogError;
use crate::services::chat::ChatError;
use crate::services::finance::FinanceError;
use crate::services::newsletter::NewsletterError;
use crate::services::orders::OrderError;
use crate::services::payments::PaymentError;
use crate::services::reports::ReportError;
use crate::services::staff::StaffError;
use crate::services::support::SupportError;
use crate::services::AuthError;

/// Application-level error type for the marketplace API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Finance(#[from] FinanceError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Newsletter(#[from] NewsletterError),

    #[error(transparent)]
    Staff(#[from] StaffError),

    #[error(transparent)]
    Support(#[from] SupportError),

    /// A status change the lifecycle does not allow.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Caller is not authenticated.
    #[error("{0}")]
    Unauthorized(String),

    /// Caller lacks permission.
    #[error("{0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// Request conflicts with current state.
    #[error("{0}")]
    Conflict(String),

    /// Rate limited.
    #[error("Too many requests")]
    RateLimited,

    /// Upstream provider unavailable.
    #[error("{0}")]
    ServiceUnavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(e) => repository_status(e),
            Self::Auth(e) => auth_status(e),
            Self::Catalog(e) => match e {
                CatalogError::NotFound
                | CatalogError::CategoryNotFound
                | CatalogError::WishlistNotFound => StatusCode::NOT_FOUND,
                CatalogError::NotOwner => StatusCode::FORBIDDEN,
                CatalogError::NotEditable | CatalogError::Unavailable => StatusCode::CONFLICT,
                CatalogError::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CatalogError::Repository(e) => repository_status(e),
                CatalogError::Price(_) | CatalogError::Invalid(_) => StatusCode::BAD_REQUEST,
            },
            Self::Order(e) => match e {
                OrderError::NotFound | OrderError::ProductNotFound => StatusCode::NOT_FOUND,
                OrderError::ProductUnavailable => StatusCode::CONFLICT,
                OrderError::Forbidden | OrderError::NotReviewable => StatusCode::FORBIDDEN,
                OrderError::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
                OrderError::Repository(e) => repository_status(e),
                OrderError::OwnProduct
                | OrderError::InvalidQuantity
                | OrderError::MissingAddress
                | OrderError::InvalidPickupPoint
                | OrderError::EmptyCart
                | OrderError::InvalidContact(_)
                | OrderError::CommentTooLong => StatusCode::BAD_REQUEST,
            },
            Self::Payment(e) => match e {
                PaymentError::NotFound => StatusCode::NOT_FOUND,
                PaymentError::OrderNotPayable => StatusCode::CONFLICT,
                PaymentError::UnsupportedMethod(_) => StatusCode::BAD_REQUEST,
                PaymentError::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PaymentError::Repository(e) => repository_status(e),
            },
            Self::Finance(e) => match e {
                FinanceError::OrderNotFound
                | FinanceError::EscrowNotFound
                | FinanceError::PlanNotFound => StatusCode::NOT_FOUND,
                FinanceError::OrderNotPending | FinanceError::PlanCompleted => StatusCode::CONFLICT,
                FinanceError::Forbidden => StatusCode::FORBIDDEN,
                FinanceError::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
                FinanceError::Repository(e) => repository_status(e),
                FinanceError::InvalidTopUp | FinanceError::Ledger(_) => StatusCode::BAD_REQUEST,
            },
            Self::Chat(e) => match e {
                ChatError::NotFound | ChatError::ProductNotFound => StatusCode::NOT_FOUND,
                ChatError::NotParticipant => StatusCode::FORBIDDEN,
                ChatError::OwnProduct | ChatError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
                ChatError::Repository(e) => repository_status(e),
            },
            Self::Report(e) => match e {
                ReportError::StockNotFound => StatusCode::NOT_FOUND,
                ReportError::Payout(_) => StatusCode::BAD_REQUEST,
                ReportError::Repository(e) => repository_status(e),
            },
            Self::Newsletter(e) => match e {
                NewsletterError::NotFound => StatusCode::NOT_FOUND,
                NewsletterError::AlreadySent => StatusCode::CONFLICT,
                NewsletterError::EmailDisabled => StatusCode::SERVICE_UNAVAILABLE,
                NewsletterError::InvalidEmail(_) | NewsletterError::Invalid(_) => {
                    StatusCode::BAD_REQUEST
                }
                NewsletterError::Repository(e) => repository_status(e),
            },
            Self::Staff(e) => match e {
                StaffError::TaskNotFound
                | StaffError::PickupPointNotFound
                | StaffError::UnknownPickupCode => StatusCode::NOT_FOUND,
                StaffError::NotAssignee => StatusCode::FORBIDDEN,
                StaffError::NotReadyForPickup | StaffError::InsufficientStock => {
                    StatusCode::CONFLICT
                }
                StaffError::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
                StaffError::InvalidMovement { .. } | StaffError::Invalid(_) => {
                    StatusCode::BAD_REQUEST
                }
                StaffError::Repository(e) => repository_status(e),
            },
            Self::Support(e) => match e {
                SupportError::NotFound => StatusCode::NOT_FOUND,
                SupportError::Closed => StatusCode::CONFLICT,
                SupportError::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
                SupportError::InvalidAssignee | SupportError::Invalid(_) => {
                    StatusCode::BAD_REQUEST
                }
                SupportError::Repository(e) => repository_status(e),
            },
            Self::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client.
    fn public_message(&self) -> String {
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            return "Internal server error".to_owned();
        }
        match self {
            Self::Database(RepositoryError::Conflict(what)) => format!("{what} already exists"),
            Self::Database(RepositoryError::NotFound) => "Not found".to_owned(),
            Self::Auth(e) => match e {
                AuthError::InvalidCredentials | AuthError::UserNotFound => {
                    "Invalid credentials".to_owned()
                }
                AuthError::WeakPassword(msg) => msg.clone(),
                other => other.to_string(),
            },
            other => other.to_string(),
        }
    }
}

const fn repository_status(e: &RepositoryError) -> StatusCode {
    match e {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

const fn auth_status(e: &AuthError) -> StatusCode {
    match e {
        AuthError::InvalidCredentials
        | AuthError::UserNotFound
        | AuthError::InvalidToken
        | AuthError::WrongTokenType => StatusCode::UNAUTHORIZED,
        AuthError::AccountDisabled => StatusCode::FORBIDDEN,
        AuthError::UserAlreadyExists => StatusCode::CONFLICT,
        AuthError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
        AuthError::InvalidEmail(_)
        | AuthError::InvalidPhone(_)
        | AuthError::WeakPassword(_)
        | AuthError::WrongPassword
        | AuthError::MissingField(_)
        | AuthError::InvalidCode
        | AuthError::CodeExpired => StatusCode::BAD_REQUEST,
        AuthError::Repository(e) => repository_status(e),
        AuthError::TokenSigning(_) | AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = serde_json::json!({
            "success": false,
            "error": self.public_message(),
        });
        (status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejections use the API error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(&rejection)),
        }
    }
}

fn json_rejection(rejection: &JsonRejection) -> AppError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            AppError::BadRequest("expected a JSON body (Content-Type: application/json)".to_owned())
        }
        other => AppError::BadRequest(other.body_text()),
    }
}

/// Set the Sentry user context from a user ID.
///
/// Call this after authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product".to_string());
        assert_eq!(err.to_string(), "product not found");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(get_status(AppError::NotFound("test".to_string())), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(get_status(AppError::Forbidden("test".to_string())), StatusCode::FORBIDDEN);
        assert_eq!(get_status(AppError::BadRequest("test".to_string())), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_domain_errors_map_to_statuses() {
        assert_eq!(
            get_status(AppError::Database(RepositoryError::Conflict("email".into()))),
            StatusCode::CONFLICT
        );
        assert_eq!(get_status(AuthError::UserAlreadyExists.into()), StatusCode::CONFLICT);
        assert_eq!(get_status(AuthError::WrongTokenType.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(OrderError::ProductUnavailable.into()), StatusCode::CONFLICT);
        assert_eq!(get_status(OrderError::Forbidden.into()), StatusCode::FORBIDDEN);
        assert_eq!(
            get_status(AppError::Transition(TransitionError::Illegal {
                entity: "order",
                from: "DELIVERED",
                to: "PENDING",
            })),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(get_status(NewsletterError::AlreadySent.into()), StatusCode::CONFLICT);
        assert_eq!(get_status(SupportError::Closed.into()), StatusCode::CONFLICT);
        assert_eq!(get_status(SupportError::NotFound.into()), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_body_hides_internal_details() {
        let response = AppError::Internal("connection string leaked".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_error_body_envelope() {
        let response = AppError::BadRequest("quantity must be positive".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "error": "quantity must be positive" })
        );
    }
}
