//! Cameroon phone numbers.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input string is empty.
    #[error("phone number cannot be empty")]
    Empty,
    /// The input contains characters other than digits, separators and a leading `+`.
    #[error("phone number contains invalid characters")]
    InvalidCharacters,
    /// The number is not a 9-digit Cameroon subscriber number.
    #[error("invalid phone format, use +237XXXXXXXXX")]
    InvalidFormat,
}

/// A Cameroon phone number in canonical `+237XXXXXXXXX` form.
///
/// Accepts the international form with or without the `+`, or the bare
/// 9-digit national number. Spaces, dots and dashes are ignored.
///
/// ```
/// use vide_grenier_core::Phone;
///
/// assert_eq!(Phone::parse("+237 6 77 12 34 56").unwrap().as_str(), "+237677123456");
/// assert_eq!(Phone::parse("677123456").unwrap().as_str(), "+237677123456");
/// assert!(Phone::parse("+33 6 12 34 56 78").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Cameroon country calling code.
    pub const COUNTRY_CODE: &'static str = "237";
    /// Digits in a national subscriber number.
    pub const NATIONAL_DIGITS: usize = 9;

    /// Parse a phone number into canonical form.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, contains letters, or does not
    /// reduce to `237` followed by nine digits.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PhoneError::Empty);
        }

        let (has_plus, rest) = s
            .strip_prefix('+')
            .map_or((false, s), |rest| (true, rest));

        let mut digits = String::with_capacity(12);
        for c in rest.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '.' => {}
                _ => return Err(PhoneError::InvalidCharacters),
            }
        }

        let national = if digits.len() == Self::NATIONAL_DIGITS && !has_plus {
            digits.as_str()
        } else if digits.len() == Self::NATIONAL_DIGITS + Self::COUNTRY_CODE.len() {
            digits
                .strip_prefix(Self::COUNTRY_CODE)
                .ok_or(PhoneError::InvalidFormat)?
        } else {
            return Err(PhoneError::InvalidFormat);
        };

        Ok(Self(format!("+{}{national}", Self::COUNTRY_CODE)))
    }

    /// Returns the canonical number.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the 9-digit national part.
    #[must_use]
    pub fn national(&self) -> &str {
        self.0.get(4..).unwrap_or("")
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Phone {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Phone {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Phone {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Phone {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Phone {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_supported_forms() {
        for input in [
            "+237677123456",
            "237677123456",
            "677123456",
            "+237 677 12 34 56",
            "677-12-34-56",
        ] {
            assert_eq!(Phone::parse(input).unwrap().as_str(), "+237677123456", "{input}");
        }
    }

    #[test]
    fn test_national_part() {
        let phone = Phone::parse("699001122").unwrap();
        assert_eq!(phone.national(), "699001122");
    }

    #[test]
    fn test_rejects_other_countries() {
        assert_eq!(
            Phone::parse("+33612345678"),
            Err(PhoneError::InvalidFormat)
        );
    }

    #[test]
    fn test_rejects_plus_with_national_only() {
        assert_eq!(Phone::parse("+677123456"), Err(PhoneError::InvalidFormat));
    }

    #[test]
    fn test_rejects_letters_and_short_numbers() {
        assert_eq!(
            Phone::parse("6771234ab"),
            Err(PhoneError::InvalidCharacters)
        );
        assert_eq!(Phone::parse("67712"), Err(PhoneError::InvalidFormat));
        assert_eq!(Phone::parse(""), Err(PhoneError::Empty));
    }
}
