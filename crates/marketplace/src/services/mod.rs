//! Business logic services for the marketplace.
//!
//! # Services
//!
//! - `auth` - Accounts, password login, bearer tokens, verification codes
//! - `catalog` - Listings, moderation, favorites, search and the visitor cart
//! - `email` - SMTP delivery with askama templates
//! - `sms` - SMS gateway client
//! - `notifier` - In-app notifications mirrored to email and SMS
//! - `payments` - Payment records and the Campay mobile money API
//! - `orders` - Order placement, lifecycle, guest checkout, reviews
//! - `finance` - Wallets, escrow and installment plans
//! - `newsletter` - Subscriptions and campaign delivery
//! - `recommendations` - Personalised, trending and similar products
//! - `chat` - Buyer/seller conversations and the live room hub
//! - `reports` - Stock analysis and commission reports
//! - `staff` - Warehouse tasks, inventory movements and pickups
//! - `support` - Customer support tickets answered by the back-office
//!
//! Services borrow the pool (`FooService<'a>`) and are built per request,
//! except the long-lived ones held in `AppState` (notifier, recommendations,
//! chat hub, Campay client).

pub mod auth;
pub mod catalog;
pub mod chat;
pub mod email;
pub mod finance;
pub mod newsletter;
pub mod notifier;
pub mod orders;
pub mod payments;
pub mod recommendations;
pub mod reports;
pub mod sms;
pub mod staff;
pub mod support;

pub use auth::{AuthError, AuthService};
pub use catalog::{CatalogError, CatalogService};
pub use chat::{ChatError, ChatHub, ChatService};
pub use email::{EmailError, EmailService};
pub use finance::{FinanceError, FinanceService};
pub use newsletter::{NewsletterError, NewsletterService};
pub use notifier::Notifier;
pub use orders::{OrderError, OrderService};
pub use payments::{CampayClient, PaymentError, PaymentService};
pub use recommendations::RecommendationService;
pub use reports::{ReportError, ReportService};
pub use sms::SmsClient;
pub use staff::{StaffError, StaffService};
pub use support::{SupportError, SupportService};
