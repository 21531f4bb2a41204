//! Stateless bearer tokens.
//!
//! Access tokens live one hour, refresh tokens seven days. Both are HS256
//! JWTs signed with `JWT_SECRET` and carry a `token_type` claim so one can
//! never stand in for the other.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use vide_grenier_core::{UserId, UserType};

use super::AuthError;
use crate::models::User;

pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub email: String,
    pub user_type: UserType,
    pub token_type: TokenType,
    pub exp: i64,
    pub iat: i64,
}

/// The token response returned by login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Signing and verification keys derived from the JWT secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys").finish_non_exhaustive()
    }
}

impl JwtKeys {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    fn sign(&self, user: &User, token_type: TokenType, ttl: i64) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user.id,
            email: user.email.as_str().to_owned(),
            user_type: user.user_type,
            token_type,
            exp: (now + Duration::seconds(ttl)).timestamp(),
            iat: now.timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::TokenSigning)
    }

    /// Issue an access and a refresh token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenSigning` if signing fails.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.sign(user, TokenType::Access, ACCESS_TOKEN_TTL_SECS)?,
            refresh_token: self.sign(user, TokenType::Refresh, REFRESH_TOKEN_TTL_SECS)?,
            token_type: "Bearer",
            expires_in: ACCESS_TOKEN_TTL_SECS,
        })
    }

    /// Verify a token and check its type.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for bad signatures, malformed or
    /// expired tokens and `AuthError::WrongTokenType` for a type mismatch.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?;
        if data.claims.token_type != expected {
            return Err(AuthError::WrongTokenType);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vide_grenier_core::{City, Email, Phone};

    use super::*;

    fn keys(secret: &str) -> JwtKeys {
        JwtKeys::new(&SecretString::from(secret.to_owned()))
    }

    fn user() -> User {
        User {
            id: UserId::generate(),
            email: Email::parse("awa@example.cm").unwrap(),
            phone: Phone::parse("+237 677 12 34 56").unwrap(),
            first_name: "Awa".to_owned(),
            last_name: "Mbarga".to_owned(),
            user_type: UserType::Client,
            city: City::Douala,
            address: None,
            avatar_url: None,
            is_verified: true,
            phone_verified: true,
            two_factor_enabled: false,
            trust_score: 100,
            loyalty_points: 0,
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pair_round_trip() {
        let keys = keys("k8#Qz!vR2m@Lw9$Xp4^Nt7&Hb3*Jd6%Fg");
        let user = user();
        let pair = keys.issue_pair(&user).unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 3600);

        let claims = keys.verify(&pair.access_token, TokenType::Access).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.user_type, UserType::Client);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_TTL_SECS);

        let refresh = keys.verify(&pair.refresh_token, TokenType::Refresh).unwrap();
        assert_eq!(refresh.exp - refresh.iat, REFRESH_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let keys = keys("k8#Qz!vR2m@Lw9$Xp4^Nt7&Hb3*Jd6%Fg");
        let pair = keys.issue_pair(&user()).unwrap();
        assert!(matches!(
            keys.verify(&pair.refresh_token, TokenType::Access),
            Err(AuthError::WrongTokenType)
        ));
        assert!(matches!(
            keys.verify(&pair.access_token, TokenType::Refresh),
            Err(AuthError::WrongTokenType)
        ));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let pair = keys("k8#Qz!vR2m@Lw9$Xp4^Nt7&Hb3*Jd6%Fg")
            .issue_pair(&user())
            .unwrap();
        let other = keys("Zt5&Wq2!Lm8@Rv4#Kc7$Pn1^Xy6*Bd3%Hs");
        assert!(matches!(
            other.verify(&pair.access_token, TokenType::Access),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            other.verify("not.a.jwt", TokenType::Access),
            Err(AuthError::InvalidToken)
        ));
    }
}
