//! Closed vocabularies shared by the API, the database and the analytics.
//!
//! The `labeled_enum!` macro declares a fieldless enum that:
//! - serializes as `SCREAMING_SNAKE_CASE` (the wire format of the mobile API)
//! - maps to a Postgres enum type with `snake_case` labels (with `postgres` feature)
//! - implements `Display` and a case-insensitive `FromStr`
//! - lists its variants in `ALL`

/// Error returned when a label does not belong to an enum.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseLabelError {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Declare a labeled enum. See the module documentation.
#[macro_export]
macro_rules! labeled_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident as $pg:tt {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $label:tt
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[cfg_attr(feature = "postgres", derive(::sqlx::Type))]
        #[cfg_attr(feature = "postgres", sqlx(type_name = $pg, rename_all = "snake_case"))]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant
            ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The wire label (`SCREAMING_SNAKE_CASE`).
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::types::label::ParseLabelError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($label) {
                        return Ok(Self::$variant);
                    }
                )+
                Err($crate::types::label::ParseLabelError {
                    kind: stringify!($name),
                    value: s.to_owned(),
                })
            }
        }
    };
}
