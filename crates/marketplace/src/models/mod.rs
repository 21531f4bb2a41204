//! Domain models for the marketplace.
//!
//! Rows map one-to-one onto tables (`sqlx::FromRow`) and serialize directly
//! into API responses. Password hashes and verification codes never leave
//! the repositories.

pub mod backoffice;
pub mod cart;
pub mod catalog;
pub mod chat;
pub mod finance;
pub mod newsletter;
pub mod notification;
pub mod order;
pub mod support;
pub mod user;

pub use backoffice::{AdminStockItem, InventoryMovement, PickupPoint, StaffTask};
pub use cart::{Cart, CartItem};
pub use catalog::{Category, CategoryNode, Product, ProductImage, Wishlist, WishlistDetail};
pub use chat::{Chat, ChatSummary, Message};
pub use finance::{
    Escrow, InstallmentPayment, InstallmentPlan, WalletAccount, WalletTransaction,
};
pub use newsletter::{Newsletter, Subscriber};
pub use notification::Notification;
pub use order::{Order, Payment, Review};
pub use support::{SupportMessage, SupportThread, SupportTicket};
pub use user::{User, UserProfile, VerificationCode};
