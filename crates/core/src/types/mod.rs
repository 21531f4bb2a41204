//! Core types for Vide-Grenier Kamer.
//!
//! This module provides type-safe wrappers and closed vocabularies for the
//! marketplace domain.

pub mod account;
pub mod catalog;
pub mod commerce;
pub mod email;
pub mod id;
pub mod label;
pub mod money;
pub mod phone;
pub mod review;
pub mod status;

pub use account::{LoyaltyLevel, UserType, VerificationPurpose};
pub use catalog::{
    AnalyticsMetric, City, Condition, InteractionKind, ProductSource, RecommendationKind,
};
pub use commerce::{
    AdminStockStatus, DeliveryMethod, MessageKind, MovementKind, NotificationKind, PaymentMethod,
    SupportCategory, TaskKind, TaskPriority, WalletTransactionKind,
};
pub use email::{Email, EmailError};
pub use id::*;
pub use label::ParseLabelError;
pub use money::{Price, PriceError, Xaf};
pub use phone::{Phone, PhoneError};
pub use review::{Rating, RatingError, ReviewScores};
pub use status::*;
