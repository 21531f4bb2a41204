//! Account vocabularies.

use crate::labeled_enum;

labeled_enum! {
    /// Account type. Determines which back-office an account may use.
    pub enum UserType as "user_type" {
        Client => "CLIENT",
        Admin => "ADMIN",
        Staff => "STAFF",
    }
}

impl UserType {
    /// Admins and staff may use the staff back-office.
    #[must_use]
    pub const fn is_staff_or_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::Staff)
    }
}

labeled_enum! {
    /// Loyalty tier derived from accumulated points.
    pub enum LoyaltyLevel as "loyalty_level" {
        Bronze => "BRONZE",
        Argent => "ARGENT",
        Or => "OR",
        Platine => "PLATINE",
    }
}

impl LoyaltyLevel {
    /// Points needed for ARGENT.
    pub const ARGENT_POINTS: i64 = 1_000;
    /// Points needed for OR.
    pub const OR_POINTS: i64 = 5_000;
    /// Points needed for PLATINE.
    pub const PLATINE_POINTS: i64 = 20_000;

    /// Tier for a points balance.
    #[must_use]
    pub const fn from_points(points: i64) -> Self {
        if points >= Self::PLATINE_POINTS {
            Self::Platine
        } else if points >= Self::OR_POINTS {
            Self::Or
        } else if points >= Self::ARGENT_POINTS {
            Self::Argent
        } else {
            Self::Bronze
        }
    }

    /// Points earned on a purchase: one per 100 francs spent.
    #[must_use]
    pub fn points_for_purchase(amount: crate::Xaf) -> i64 {
        use rust_decimal::prelude::ToPrimitive;

        (amount.amount() / rust_decimal::Decimal::ONE_HUNDRED)
            .floor()
            .to_i64()
            .unwrap_or(0)
            .max(0)
    }
}

labeled_enum! {
    /// What a one-time code proves.
    pub enum VerificationPurpose as "verification_purpose" {
        Phone => "PHONE",
        Email => "EMAIL",
        TwoFactor => "TWO_FACTOR",
        PasswordReset => "PASSWORD_RESET",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Xaf;

    #[test]
    fn test_loyalty_thresholds() {
        assert_eq!(LoyaltyLevel::from_points(0), LoyaltyLevel::Bronze);
        assert_eq!(LoyaltyLevel::from_points(999), LoyaltyLevel::Bronze);
        assert_eq!(LoyaltyLevel::from_points(1_000), LoyaltyLevel::Argent);
        assert_eq!(LoyaltyLevel::from_points(4_999), LoyaltyLevel::Argent);
        assert_eq!(LoyaltyLevel::from_points(5_000), LoyaltyLevel::Or);
        assert_eq!(LoyaltyLevel::from_points(20_000), LoyaltyLevel::Platine);
    }

    #[test]
    fn test_points_for_purchase() {
        assert_eq!(LoyaltyLevel::points_for_purchase(Xaf::from_francs(25_050)), 250);
        assert_eq!(LoyaltyLevel::points_for_purchase(Xaf::from_francs(99)), 0);
    }

    #[test]
    fn test_staff_or_admin() {
        assert!(UserType::Admin.is_staff_or_admin());
        assert!(UserType::Staff.is_staff_or_admin());
        assert!(!UserType::Client.is_staff_or_admin());
    }

    #[test]
    fn test_password_reset_purpose_label() {
        assert_eq!(VerificationPurpose::PasswordReset.as_str(), "PASSWORD_RESET");
        assert_eq!(
            "password_reset".parse::<VerificationPurpose>(),
            Ok(VerificationPurpose::PasswordReset)
        );
    }
}
