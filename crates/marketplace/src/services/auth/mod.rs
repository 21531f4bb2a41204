//! Authentication service.
//!
//! Provides password registration and login, bearer tokens, password
//! reset and change, and one-time verification codes (phone verification,
//! two-factor login and password reset).

mod error;
pub mod jwt;

pub use error::AuthError;
pub use jwt::{Claims, JwtKeys, TokenPair, TokenType};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::instrument;

use vide_grenier_core::{City, Email, Phone, UserId, UserType, VerificationPurpose};

use crate::db::RepositoryError;
use crate::db::users::{NewUser, UserRepository, VerificationCodeRepository};
use crate::models::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Minutes a verification code stays valid.
pub const CODE_TTL_MINUTES: i64 = 10;

/// Wrong guesses allowed per code.
pub const MAX_CODE_ATTEMPTS: i32 = 5;

/// Registration form after JSON decoding.
#[derive(Debug, Clone, Copy)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub phone: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub city: City,
}

/// Result of a password check.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Credentials accepted, tokens can be issued.
    Authenticated(User),
    /// Credentials accepted but a second factor is required first.
    TwoFactorRequired(User),
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    codes: VerificationCodeRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
            codes: VerificationCodeRepository::new(pool),
        }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a client account.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed email, phone, name or weak
    /// password, and `AuthError::UserAlreadyExists` for a taken email or phone.
    #[instrument(skip(self, form), fields(email = form.email))]
    pub async fn register(&self, form: &Registration<'_>) -> Result<User, AuthError> {
        self.create_account(form, UserType::Client).await
    }

    /// Create an account of any type. Used by the CLI for admin and staff.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::register`].
    pub async fn create_account(
        &self,
        form: &Registration<'_>,
        user_type: UserType,
    ) -> Result<User, AuthError> {
        let email = Email::parse(form.email)?;
        let phone = Phone::parse(form.phone)?;
        let first_name = required(form.first_name, "first_name")?;
        let last_name = required(form.last_name, "last_name")?;
        validate_password(form.password)?;

        let password_hash = hash_password(form.password)?;

        self.users
            .create(&NewUser {
                email: &email,
                phone: &phone,
                password_hash: &password_hash,
                first_name,
                last_name,
                city: form.city,
                user_type,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })
    }

    /// Check a password for an email or phone identifier.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown identifier or a
    /// wrong password, and `AuthError::AccountDisabled` for inactive accounts.
    #[instrument(skip(self, password))]
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let (user, password_hash) = self
            .credentials(identifier)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, &password_hash)?;

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        if user.two_factor_enabled {
            return Ok(LoginOutcome::TwoFactorRequired(user));
        }

        self.users.touch_login(user.id).await?;
        Ok(LoginOutcome::Authenticated(user))
    }

    /// Finish a two-factor login.
    ///
    /// # Errors
    ///
    /// Returns a code error if the code is wrong, expired or exhausted.
    pub async fn complete_two_factor(
        &self,
        user_id: UserId,
        code: &str,
    ) -> Result<User, AuthError> {
        let user = self.active_user(user_id).await?;
        self.verify_code(user.id, VerificationPurpose::TwoFactor, code)
            .await?;
        self.users.touch_login(user.id).await?;
        Ok(user)
    }

    /// Account and hash for an email or phone identifier. Identifiers that
    /// are neither yield `None`.
    async fn credentials(&self, identifier: &str) -> Result<Option<(User, String)>, AuthError> {
        let identifier = identifier.trim();
        let credentials = if identifier.contains('@') {
            match Email::parse(identifier) {
                Ok(email) => self.users.get_credentials(Some(&email), None).await?,
                Err(_) => None,
            }
        } else {
            match Phone::parse(identifier) {
                Ok(phone) => self.users.get_credentials(None, Some(&phone)).await?,
                Err(_) => None,
            }
        };
        Ok(credentials)
    }

    // =========================================================================
    // Password reset and change
    // =========================================================================

    /// Issue a reset code for the account behind `identifier`. Returns the
    /// account and plain code for delivery, or `None` when there is no
    /// active account so callers can answer the same way either way.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    #[instrument(skip(self, identifier))]
    pub async fn request_password_reset(
        &self,
        identifier: &str,
    ) -> Result<Option<(User, String)>, AuthError> {
        let Some((user, _)) = self.credentials(identifier).await? else {
            return Ok(None);
        };
        if !user.is_active {
            return Ok(None);
        }
        let code = self.issue_code(user.id, VerificationPurpose::PasswordReset).await?;
        tracing::info!(user_id = %user.id, "Password reset requested");
        Ok(Some((user, code)))
    }

    /// Set a new password with a reset code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` before any lookup, then
    /// `AuthError::InvalidCode` for unknown identifiers and the code errors
    /// of [`AuthService::verify_code`].
    #[instrument(skip(self, identifier, code, new_password))]
    pub async fn reset_password(
        &self,
        identifier: &str,
        code: &str,
        new_password: &str,
    ) -> Result<User, AuthError> {
        validate_password(new_password)?;
        let (user, _) = self
            .credentials(identifier)
            .await?
            .filter(|(u, _)| u.is_active)
            .ok_or(AuthError::InvalidCode)?;
        self.verify_code(user.id, VerificationPurpose::PasswordReset, code)
            .await?;
        self.users
            .set_password_hash(user.id, &hash_password(new_password)?)
            .await?;
        tracing::info!(user_id = %user.id, "Password reset");
        Ok(user)
    }

    /// Change the password of a signed-in account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` for a weak or unchanged password and
    /// `AuthError::WrongPassword` when `current` does not match.
    #[instrument(skip(self, current, new_password))]
    pub async fn change_password(
        &self,
        user_id: UserId,
        current: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        check_new_password(current, new_password)?;
        let hash = self
            .users
            .password_hash(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        verify_password(current, &hash).map_err(|e| match e {
            AuthError::InvalidCredentials => AuthError::WrongPassword,
            other => other,
        })?;
        self.users
            .set_password_hash(user_id, &hash_password(new_password)?)
            .await?;
        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Get a user that may still sign in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` or `AuthError::AccountDisabled`.
    pub async fn active_user(&self, user_id: UserId) -> Result<User, AuthError> {
        let user = self.get_user(user_id).await?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }
        Ok(user)
    }

    // =========================================================================
    // Verification codes
    // =========================================================================

    /// Generate and store a fresh code. Earlier codes for the same purpose
    /// stop working. Returns the plain code for delivery.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn issue_code(
        &self,
        user_id: UserId,
        purpose: VerificationPurpose,
    ) -> Result<String, AuthError> {
        let code = generate_verification_code();
        let expires_at = Utc::now() + Duration::minutes(CODE_TTL_MINUTES);
        self.codes.create(user_id, purpose, &code, expires_at).await?;
        Ok(code)
    }

    /// Check a code against the latest open one for the purpose.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCode`, `AuthError::CodeExpired` or
    /// `AuthError::TooManyAttempts`.
    #[instrument(skip(self, code))]
    pub async fn verify_code(
        &self,
        user_id: UserId,
        purpose: VerificationPurpose,
        code: &str,
    ) -> Result<(), AuthError> {
        let stored = self
            .codes
            .latest_open(user_id, purpose)
            .await?
            .ok_or(AuthError::InvalidCode)?;

        if stored.attempts >= MAX_CODE_ATTEMPTS {
            return Err(AuthError::TooManyAttempts);
        }
        if stored.expires_at <= Utc::now() {
            return Err(AuthError::CodeExpired);
        }
        if stored.code != code.trim() {
            self.codes.record_attempt(stored.id).await?;
            return Err(AuthError::InvalidCode);
        }

        self.codes.consume(stored.id).await?;
        Ok(())
    }

    /// Confirm a phone number with the code sent to it.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::verify_code`].
    pub async fn confirm_phone(&self, user_id: UserId, code: &str) -> Result<(), AuthError> {
        self.verify_code(user_id, VerificationPurpose::Phone, code)
            .await?;
        self.users.mark_phone_verified(user_id).await?;
        Ok(())
    }

    /// Turn two-factor login on or off.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn set_two_factor(&self, user_id: UserId, enabled: bool) -> Result<(), AuthError> {
        self.users.set_two_factor(user_id, enabled).await?;
        Ok(())
    }
}

fn required<'s>(value: &'s str, field: &'static str) -> Result<&'s str, AuthError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::MissingField(field));
    }
    Ok(value)
}

/// Validate password meets requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if the password is too short.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn check_new_password(current: &str, new_password: &str) -> Result<(), AuthError> {
    validate_password(new_password)?;
    if current == new_password {
        return Err(AuthError::WeakPassword(
            "new password must differ from the current one".to_owned(),
        ));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` if the password doesn't match.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::PasswordHash)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Generate a 6-digit verification code.
#[must_use]
pub fn generate_verification_code() -> String {
    use rand::Rng;
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("mot-de-passe-solide").is_ok());
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("kamer-2024!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("kamer-2024!", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong-password", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_new_password_must_change_and_be_strong() {
        assert!(check_new_password("ancien-mot-de-passe", "nouveau-mot-de-passe").is_ok());
        assert!(matches!(
            check_new_password("ancien-mot-de-passe", "ancien-mot-de-passe"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            check_new_password("ancien-mot-de-passe", "court"),
            Err(AuthError::WeakPassword(_))
        ));
    }

    #[test]
    fn test_generate_verification_code_format() {
        for _ in 0..100 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().unwrap();
            assert!((100_000..1_000_000).contains(&value));
        }
    }

    #[test]
    fn test_required_trims() {
        assert_eq!(required("  Awa ", "first_name").unwrap(), "Awa");
        assert!(matches!(
            required("   ", "last_name"),
            Err(AuthError::MissingField("last_name"))
        ));
    }
}
