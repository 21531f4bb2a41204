//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] vide_grenier_core::EmailError),

    /// Invalid phone number.
    #[error("invalid phone: {0}")]
    InvalidPhone(#[from] vide_grenier_core::PhoneError),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account was deactivated by an administrator.
    #[error("account disabled")]
    AccountDisabled,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// Email or phone already registered.
    #[error("an account with this email or phone already exists")]
    UserAlreadyExists,

    /// The current password given for a password change is wrong.
    #[error("current password is incorrect")]
    WrongPassword,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// A required field is blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Token is malformed, expired or signed with another key.
    #[error("invalid or expired token")]
    InvalidToken,

    /// A refresh token was used as an access token, or the reverse.
    #[error("wrong token type")]
    WrongTokenType,

    /// Token could not be signed.
    #[error("token signing failed")]
    TokenSigning(#[source] jsonwebtoken::errors::Error),

    /// No open code, or the code does not match.
    #[error("invalid verification code")]
    InvalidCode,

    /// The code is older than its validity window.
    #[error("verification code expired")]
    CodeExpired,

    /// Too many wrong guesses for the current code.
    #[error("too many attempts, request a new code")]
    TooManyAttempts,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
