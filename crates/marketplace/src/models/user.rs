//! Accounts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vide_grenier_core::{
    City, Email, LoyaltyLevel, Phone, UserId, UserType, VerificationCodeId, VerificationPurpose,
};

/// A marketplace account. The password hash is loaded separately.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub phone: Phone,
    pub first_name: String,
    pub last_name: String,
    pub user_type: UserType,
    pub city: City,
    pub address: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub phone_verified: bool,
    pub two_factor_enabled: bool,
    pub trust_score: i32,
    pub loyalty_points: i64,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    #[must_use]
    pub const fn loyalty_level(&self) -> LoyaltyLevel {
        LoyaltyLevel::from_points(self.loyalty_points)
    }
}

/// A user as returned by the profile endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub full_name: String,
    pub loyalty_level: LoyaltyLevel,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            full_name: user.full_name(),
            loyalty_level: user.loyalty_level(),
            user,
        }
    }
}

/// A one-time code sent by SMS or email.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VerificationCode {
    pub id: VerificationCodeId,
    pub user_id: UserId,
    pub purpose: VerificationPurpose,
    pub code: String,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}
