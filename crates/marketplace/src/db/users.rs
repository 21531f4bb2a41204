//! User and verification code repositories.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use vide_grenier_core::{
    City, Email, Phone, UserId, UserType, VerificationCodeId, VerificationPurpose, Xaf,
};

use super::{Page, RepositoryError};
use crate::models::{User, VerificationCode};

const USER_COLUMNS: &str = "id, email, phone, first_name, last_name, user_type, city, address, \
     avatar_url, is_verified, phone_verified, two_factor_enabled, trust_score, loyalty_points, \
     is_active, last_login_at, created_at";

/// Fields needed to create an account.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a Email,
    pub phone: &'a Phone,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub city: City,
    pub user_type: UserType,
}

#[derive(sqlx::FromRow)]
struct UserWithHash {
    #[sqlx(flatten)]
    user: User,
    password_hash: String,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a new account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email or phone is taken.
    #[instrument(skip(self, new), fields(email = %new.email))]
    pub async fn create(&self, new: &NewUser<'_>) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO users (id, email, phone, password_hash, first_name, last_name, city, user_type,
                                is_verified)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(UserId::generate())
            .bind(new.email)
            .bind(new.phone)
            .bind(new.password_hash)
            .bind(new.first_name)
            .bind(new.last_name)
            .bind(new.city)
            .bind(new.user_type)
            // Privileged accounts are created by operators and start verified
            .bind(new.user_type != UserType::Client)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "account with this email or phone"))
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Get a user and password hash by email or phone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get_credentials(
        &self,
        email: Option<&Email>,
        phone: Option<&Phone>,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let sql = format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users
             WHERE ($1::text IS NOT NULL AND email = $1)
                OR ($2::text IS NOT NULL AND phone = $2)
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, UserWithHash>(&sql)
            .bind(email)
            .bind(phone)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(|r| (r.user, r.password_hash)))
    }

    /// List users, newest first, optionally filtered by name, email or phone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        search: Option<&str>,
        user_type: Option<UserType>,
        page: Page,
    ) -> Result<(Vec<User>, i64), RepositoryError> {
        let pattern = search.map(|s| format!("%{}%", s.trim()));
        let filter = "($1::text IS NULL OR email ILIKE $1 OR phone ILIKE $1
                       OR first_name ILIKE $1 OR last_name ILIKE $1)
                  AND ($2::user_type IS NULL OR user_type = $2)";

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {filter}
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(pattern.as_deref())
            .bind(user_type)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {filter}"))
            .bind(pattern.as_deref())
            .bind(user_type)
            .fetch_one(self.pool)
            .await?;

        Ok((users, total))
    }

    /// IDs of active accounts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active_ids(&self) -> Result<Vec<UserId>, RepositoryError> {
        Ok(
            sqlx::query_scalar("SELECT id FROM users WHERE is_active ORDER BY created_at")
                .fetch_all(self.pool)
                .await?,
        )
    }

    /// Update editable profile fields. `None` leaves a field unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn update_profile(
        &self,
        id: UserId,
        first_name: Option<&str>,
        last_name: Option<&str>,
        city: Option<City>,
        address: Option<&str>,
    ) -> Result<User, RepositoryError> {
        let sql = format!(
            "UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                city = COALESCE($4, city),
                address = COALESCE($5, address),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(first_name)
            .bind(last_name)
            .bind(city)
            .bind(address)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Record a successful login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn touch_login(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Mark the phone number (and therefore the account) as verified.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_phone_verified(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE users SET phone_verified = TRUE, is_verified = TRUE, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// The stored Argon2 hash for an account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        Ok(sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    #[instrument(skip(self, password_hash))]
    pub async fn set_password_hash(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .execute(self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Enable or disable two-factor login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_two_factor(&self, id: UserId, enabled: bool) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET two_factor_enabled = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Activate or deactivate an account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_active(&self, id: UserId, active: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Award loyalty points for a purchase of `amount` (1 point per 100 XAF).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn award_loyalty_points<'e, E>(
        executor: E,
        id: UserId,
        amount: Xaf,
    ) -> Result<i64, RepositoryError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let points = vide_grenier_core::LoyaltyLevel::points_for_purchase(amount);
        if points > 0 {
            sqlx::query(
                "UPDATE users SET loyalty_points = loyalty_points + $2, updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(id)
            .bind(points)
            .execute(executor)
            .await?;
        }
        Ok(points)
    }
}

/// Repository for one-time verification codes.
pub struct VerificationCodeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> VerificationCodeRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a new code, invalidating earlier unused codes for the same purpose.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, code))]
    pub async fn create(
        &self,
        user_id: UserId,
        purpose: VerificationPurpose,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<VerificationCode, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE verification_codes SET consumed_at = NOW()
             WHERE user_id = $1 AND purpose = $2 AND consumed_at IS NULL",
        )
        .bind(user_id)
        .bind(purpose)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, VerificationCode>(
            "INSERT INTO verification_codes (id, user_id, purpose, code, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, user_id, purpose, code, attempts, expires_at, consumed_at",
        )
        .bind(VerificationCodeId::generate())
        .bind(user_id)
        .bind(purpose)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    /// The latest unconsumed code for a purpose, expired or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest_open(
        &self,
        user_id: UserId,
        purpose: VerificationPurpose,
    ) -> Result<Option<VerificationCode>, RepositoryError> {
        Ok(sqlx::query_as::<_, VerificationCode>(
            "SELECT id, user_id, purpose, code, attempts, expires_at, consumed_at
             FROM verification_codes
             WHERE user_id = $1 AND purpose = $2 AND consumed_at IS NULL
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(user_id)
        .bind(purpose)
        .fetch_optional(self.pool)
        .await?)
    }

    /// Count a failed attempt.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record_attempt(&self, id: VerificationCodeId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE verification_codes SET attempts = attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Mark a code as used.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn consume(&self, id: VerificationCodeId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE verification_codes SET consumed_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
