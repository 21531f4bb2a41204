//! Listings, moderation, favorites, wishlists, search and the visitor cart.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use vide_grenier_core::commission::ListingCommission;
use vide_grenier_core::{
    AnalyticsMetric, CartItemId, CategoryId, City, Condition, InteractionKind, NotificationKind,
    Price, PriceError, ProductId, ProductSource, ProductStatus, StateMachine, TransitionError,
    UserId, UserType, WishlistId,
};

use super::notifier::Notifier;
use crate::db::analytics::AnalyticsRepository;
use crate::db::carts::CartRepository;
use crate::db::catalog::{
    CategoryRepository, FavoriteRepository, NewProduct, ProductChanges, ProductFilter,
    ProductRepository, WishlistRepository,
};
use crate::db::{Page, RepositoryError};
use crate::models::{Cart, CategoryNode, Product, ProductImage, Wishlist, WishlistDetail};

/// Days a listing stays online after activation.
pub const LISTING_LIFETIME_DAYS: i64 = 30;

/// Results returned by a search.
pub const SEARCH_LIMIT: i64 = 20;

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 5_000;
pub const MAX_CART_QUANTITY: i32 = 100;
pub const MAX_WISHLISTS: usize = 20;
pub const MAX_WISHLIST_NAME_LENGTH: usize = 100;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("product not found")]
    NotFound,

    #[error("category not found")]
    CategoryNotFound,

    #[error("wishlist not found")]
    WishlistNotFound,

    #[error("you do not own this product")]
    NotOwner,

    #[error("a sold product can no longer be edited")]
    NotEditable,

    #[error("product is not available")]
    Unavailable,

    #[error(transparent)]
    Price(#[from] PriceError),

    #[error("{0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A listing as submitted by a seller.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingForm {
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    pub price: Price,
    pub condition: Condition,
    pub city: City,
    /// Send straight to moderation instead of saving a draft.
    #[serde(default)]
    pub submit: bool,
}

/// Listing edits. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingChanges {
    pub category_id: Option<CategoryId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub condition: Option<Condition>,
    pub city: Option<City>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WishlistForm {
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewImage {
    pub url: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub sort_order: i32,
}

/// One page of listings.
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// A listing with its images and commission split.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub images: Vec<ProductImage>,
    pub commission: ListingCommission,
    pub is_favorite: bool,
}

/// Catalog service.
pub struct CatalogService<'a> {
    pool: &'a PgPool,
    products: ProductRepository<'a>,
    categories: CategoryRepository<'a>,
    favorites: FavoriteRepository<'a>,
    wishlists: WishlistRepository<'a>,
    analytics: AnalyticsRepository<'a>,
    carts: CartRepository<'a>,
    notifier: &'a Notifier,
    commission_rate: Decimal,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, notifier: &'a Notifier, commission_rate: Decimal) -> Self {
        Self {
            pool,
            products: ProductRepository::new(pool),
            categories: CategoryRepository::new(pool),
            favorites: FavoriteRepository::new(pool),
            wishlists: WishlistRepository::new(pool),
            analytics: AnalyticsRepository::new(pool),
            carts: CartRepository::new(pool),
            notifier,
            commission_rate,
        }
    }

    /// Active category tree with product counts.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the query fails.
    pub async fn categories(&self) -> Result<Vec<CategoryNode>, CatalogError> {
        let flat = self.categories.list_active_with_counts().await?;
        Ok(CategoryNode::tree(flat))
    }

    /// Public listing of active products.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the query fails.
    pub async fn list(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<ProductPage, CatalogError> {
        let (items, total) = self.products.list_active(filter, page).await?;
        Ok(ProductPage {
            items,
            total,
            page: page.number,
            per_page: page.limit(),
        })
    }

    /// A seller's own listings in every status.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the query fails.
    pub async fn seller_listings(&self, seller: UserId) -> Result<Vec<Product>, CatalogError> {
        Ok(self.products.list_by_seller(seller).await?)
    }

    /// Product detail for a visitor. Counts the view and, for signed-in
    /// users, records the interaction.
    ///
    /// Listings that are not public are only shown to their seller and staff.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for unknown or hidden products.
    #[instrument(skip(self))]
    pub async fn detail(
        &self,
        id: ProductId,
        viewer: Option<(UserId, UserType)>,
    ) -> Result<ProductDetail, CatalogError> {
        let product = self.products.get(id).await?.ok_or(CatalogError::NotFound)?;
        let privileged = viewer.is_some_and(|(user, user_type)| {
            user == product.seller_id || user_type.is_staff_or_admin()
        });
        let public = matches!(
            product.status,
            ProductStatus::Active | ProductStatus::Reserved | ProductStatus::Sold
        );
        if !public && !privileged {
            return Err(CatalogError::NotFound);
        }

        let product = self
            .products
            .increment_views(id)
            .await?
            .ok_or(CatalogError::NotFound)?;
        self.track_view(&product, viewer.map(|(user, _)| user)).await;

        let is_favorite = match viewer {
            Some((user, _)) => self.favorites.contains(user, id).await?,
            None => false,
        };
        Ok(ProductDetail {
            images: self.products.images(id).await?,
            commission: ListingCommission::compute(
                product.price,
                product.source,
                self.commission_rate,
            ),
            is_favorite,
            product,
        })
    }

    async fn track_view(&self, product: &Product, viewer: Option<UserId>) {
        if let Some(user) = viewer
            && let Err(e) = self
                .analytics
                .record_behavior(user, Some(product.id), InteractionKind::View, None)
                .await
        {
            tracing::warn!(error = %e, product_id = %product.id, "Failed to record view");
        }
        if let Err(e) = self
            .analytics
            .record_event(
                AnalyticsMetric::ProductView,
                viewer,
                Some(product.id),
                Decimal::ONE,
                &serde_json::json!({ "category_id": product.category_id }),
            )
            .await
        {
            tracing::warn!(error = %e, product_id = %product.id, "Failed to record analytics event");
        }
    }

    /// Create a listing. Admin listings are platform stock and carry no
    /// commission.
    ///
    /// # Errors
    ///
    /// Returns a validation error or `CatalogError::CategoryNotFound`.
    #[instrument(skip(self, form), fields(title = %form.title))]
    pub async fn create(
        &self,
        seller: UserId,
        seller_type: UserType,
        form: &ListingForm,
    ) -> Result<Product, CatalogError> {
        let title = validate_title(&form.title)?;
        let description = validate_description(&form.description)?;
        self.active_category(form.category_id).await?;

        let slug = slugify(title);
        let status = if form.submit {
            ProductStatus::Pending
        } else {
            ProductStatus::Draft
        };
        let source = if seller_type == UserType::Admin {
            ProductSource::Admin
        } else {
            ProductSource::Client
        };

        let product = self
            .products
            .create(&NewProduct {
                seller_id: seller,
                category_id: form.category_id,
                title,
                slug: &slug,
                description,
                price: form.price.amount(),
                condition: form.condition,
                city: form.city,
                status,
                source,
            })
            .await?;
        tracing::info!(product_id = %product.id, status = %product.status, "Listing created");
        Ok(product)
    }

    /// Edit a listing the caller owns.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotOwner`, `CatalogError::NotEditable` or a
    /// validation error.
    pub async fn update(
        &self,
        id: ProductId,
        seller: UserId,
        changes: &ListingChanges,
    ) -> Result<Product, CatalogError> {
        let product = self.owned(id, seller).await?;
        if !product.status.is_editable() {
            return Err(CatalogError::NotEditable);
        }
        let title = changes.title.as_deref().map(validate_title).transpose()?;
        let description = changes
            .description
            .as_deref()
            .map(validate_description)
            .transpose()?;
        if let Some(category) = changes.category_id {
            self.active_category(category).await?;
        }

        Ok(self
            .products
            .update(
                id,
                &ProductChanges {
                    category_id: changes.category_id,
                    title,
                    description,
                    price: changes.price.map(|p| p.amount()),
                    condition: changes.condition,
                    city: changes.city,
                },
            )
            .await?)
    }

    /// Send a draft, rejected or expired listing to moderation. Platform
    /// stock skips moderation and goes live immediately.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Transition` when the listing cannot be submitted.
    pub async fn submit(&self, id: ProductId, seller: UserId) -> Result<Product, CatalogError> {
        let product = self.owned(id, seller).await?;
        if product.source == ProductSource::Admin && product.status == ProductStatus::Draft {
            return self.activate(&product).await;
        }
        product.status.transition(ProductStatus::Pending)?;
        Ok(ProductRepository::set_status(
            self.pool,
            id,
            ProductStatus::Pending,
            None,
            None,
        )
        .await?)
    }

    /// Status change requested by the seller. Sellers may resubmit, mark a
    /// listing sold elsewhere or withdraw it; activation is moderation's job.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Transition` for an edge the lifecycle or the
    /// seller's role does not allow.
    pub async fn set_seller_status(
        &self,
        id: ProductId,
        seller: UserId,
        next: ProductStatus,
    ) -> Result<Product, CatalogError> {
        let product = self.owned(id, seller).await?;
        if next == ProductStatus::Pending {
            return self.submit(id, seller).await;
        }
        if !matches!(next, ProductStatus::Sold | ProductStatus::Expired) {
            return Err(CatalogError::Transition(TransitionError::Illegal {
                entity: ProductStatus::ENTITY,
                from: product.status.as_str(),
                to: next.as_str(),
            }));
        }
        product.status.transition(next)?;
        Ok(ProductRepository::set_status(self.pool, id, next, None, None).await?)
    }

    /// Attach an image to a listing the caller owns.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for a URL that is not http(s).
    pub async fn add_image(
        &self,
        id: ProductId,
        seller: UserId,
        image: &NewImage,
    ) -> Result<ProductImage, CatalogError> {
        self.owned(id, seller).await?;
        let url = url::Url::parse(image.url.trim())
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or(CatalogError::Invalid("image url must be an http(s) URL"))?;
        Ok(self
            .products
            .add_image(id, url.as_str(), image.is_primary, image.sort_order)
            .await?)
    }

    // =========================================================================
    // Moderation
    // =========================================================================

    /// Listings waiting for moderation.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the query fails.
    pub async fn pending(&self, page: Page) -> Result<Vec<Product>, CatalogError> {
        Ok(self.products.list_pending(page).await?)
    }

    /// Approve a pending listing: it goes live for [`LISTING_LIFETIME_DAYS`].
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Transition` unless the listing is pending.
    #[instrument(skip(self))]
    pub async fn approve(&self, id: ProductId) -> Result<Product, CatalogError> {
        let product = self.products.get(id).await?.ok_or(CatalogError::NotFound)?;
        product.status.transition(ProductStatus::Active)?;
        let product = self.activate(&product).await?;
        self.notifier
            .notify(
                product.seller_id,
                NotificationKind::System,
                "Annonce approuvée",
                &format!("Votre annonce « {} » est maintenant en ligne.", product.title),
                serde_json::json!({ "product_id": product.id }),
            )
            .await;
        Ok(product)
    }

    /// Reject a pending listing with a reason shown to the seller.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for an empty reason and
    /// `CatalogError::Transition` unless the listing is pending.
    #[instrument(skip(self, reason))]
    pub async fn reject(&self, id: ProductId, reason: &str) -> Result<Product, CatalogError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CatalogError::Invalid("a rejection reason is required"));
        }
        let product = self.products.get(id).await?.ok_or(CatalogError::NotFound)?;
        product.status.transition(ProductStatus::Rejected)?;
        let product = ProductRepository::set_status(
            self.pool,
            id,
            ProductStatus::Rejected,
            None,
            Some(reason),
        )
        .await?;
        self.notifier
            .notify(
                product.seller_id,
                NotificationKind::System,
                "Annonce refusée",
                &format!("Votre annonce « {} » a été refusée : {reason}", product.title),
                serde_json::json!({ "product_id": product.id, "reason": reason }),
            )
            .await;
        Ok(product)
    }

    /// Take an active listing offline.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Transition` unless the listing is active.
    #[instrument(skip(self, reason))]
    pub async fn suspend(
        &self,
        id: ProductId,
        reason: Option<&str>,
    ) -> Result<Product, CatalogError> {
        let product = self.products.get(id).await?.ok_or(CatalogError::NotFound)?;
        product.status.transition(ProductStatus::Suspended)?;
        let product =
            ProductRepository::set_status(self.pool, id, ProductStatus::Suspended, None, None)
                .await?;
        let message = reason.map_or_else(
            || format!("Votre annonce « {} » a été suspendue.", product.title),
            |r| format!("Votre annonce « {} » a été suspendue : {r}", product.title),
        );
        self.notifier
            .notify(
                product.seller_id,
                NotificationKind::System,
                "Annonce suspendue",
                &message,
                serde_json::json!({ "product_id": product.id }),
            )
            .await;
        Ok(product)
    }

    /// Mark or unmark a listing as featured.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for unknown products.
    pub async fn set_featured(&self, id: ProductId, featured: bool) -> Result<(), CatalogError> {
        self.products
            .set_featured(id, featured)
            .await
            .map_err(not_found_as(CatalogError::NotFound))
    }

    /// Expire active listings past their expiry date.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the update fails.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64, CatalogError> {
        let expired = self.products.expire_due(now).await?;
        tracing::info!(expired, "Expired overdue listings");
        Ok(expired)
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for an empty name and a conflict for a
    /// duplicate slug.
    pub async fn create_category(
        &self,
        name: &str,
        parent_id: Option<CategoryId>,
        icon: Option<&str>,
        sort_order: i32,
    ) -> Result<crate::models::Category, CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::Invalid("category name is required"));
        }
        if let Some(parent) = parent_id {
            self.active_category(parent).await?;
        }
        Ok(self
            .categories
            .create(name, &slug_base(name), parent_id, icon, sort_order)
            .await?)
    }

    // =========================================================================
    // Favorites and search
    // =========================================================================

    /// Toggle a favorite. Returns whether the product is now a favorite.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for unknown products.
    pub async fn toggle_favorite(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<bool, CatalogError> {
        self.products.get(product).await?.ok_or(CatalogError::NotFound)?;
        let added = self.favorites.toggle(user, product).await?;
        if added
            && let Err(e) = self
                .analytics
                .record_behavior(user, Some(product), InteractionKind::Like, None)
                .await
        {
            tracing::warn!(error = %e, product_id = %product, "Failed to record like");
        }
        Ok(added)
    }

    /// The user's favorite products.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the query fails.
    pub async fn favorites(&self, user: UserId) -> Result<Vec<Product>, CatalogError> {
        Ok(self.favorites.list(user).await?)
    }

    /// Full-text search over active listings.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for an empty query.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        user: Option<UserId>,
    ) -> Result<Vec<Product>, CatalogError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CatalogError::Invalid("search query is required"));
        }
        let filter = ProductFilter {
            search: Some(query.to_owned()),
            ..ProductFilter::default()
        };
        let (items, _) = self
            .products
            .list_active(&filter, Page::new(Some(1), Some(SEARCH_LIMIT)))
            .await?;

        let count = i32::try_from(items.len()).unwrap_or(i32::MAX);
        if let Err(e) = self.analytics.record_search(user, query, count).await {
            tracing::warn!(error = %e, "Failed to store search history");
        }
        if let Some(user) = user
            && let Err(e) = self
                .analytics
                .record_behavior(user, None, InteractionKind::Search, Some(query))
                .await
        {
            tracing::warn!(error = %e, "Failed to record search behavior");
        }
        Ok(items)
    }

    // =========================================================================
    // Wishlists
    // =========================================================================

    /// The user's wishlists with their products.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if a query fails.
    pub async fn wishlists(&self, user: UserId) -> Result<Vec<WishlistDetail>, CatalogError> {
        let mut details = Vec::new();
        for wishlist in self.wishlists.list(user).await? {
            details.push(self.with_items(wishlist).await?);
        }
        Ok(details)
    }

    /// A wishlist as seen by `viewer`. Private lists are only visible to
    /// their owner.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::WishlistNotFound` for unknown or hidden lists.
    pub async fn wishlist(
        &self,
        id: WishlistId,
        viewer: Option<UserId>,
    ) -> Result<WishlistDetail, CatalogError> {
        let wishlist = self
            .wishlists
            .get(id)
            .await?
            .filter(|w| visible_to(w, viewer))
            .ok_or(CatalogError::WishlistNotFound)?;
        self.with_items(wishlist).await
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for a bad name or when the user
    /// already has `MAX_WISHLISTS` lists.
    #[instrument(skip(self, form))]
    pub async fn create_wishlist(
        &self,
        user: UserId,
        form: &WishlistForm,
    ) -> Result<Wishlist, CatalogError> {
        let name = validate_wishlist_name(&form.name)?;
        if self.wishlists.list(user).await?.len() >= MAX_WISHLISTS {
            return Err(CatalogError::Invalid("too many wishlists"));
        }
        Ok(self.wishlists.create(user, name, form.is_public).await?)
    }

    /// Put a product on one of the user's wishlists.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::WishlistNotFound` unless `user` owns the list
    /// and `CatalogError::NotFound` for unknown products.
    #[instrument(skip(self))]
    pub async fn add_to_wishlist(
        &self,
        user: UserId,
        id: WishlistId,
        product: ProductId,
    ) -> Result<WishlistDetail, CatalogError> {
        let wishlist = self.owned_wishlist(id, user).await?;
        self.products.get(product).await?.ok_or(CatalogError::NotFound)?;
        self.wishlists.add_item(id, product).await?;
        if let Err(e) = self
            .analytics
            .record_behavior(user, Some(product), InteractionKind::Like, None)
            .await
        {
            tracing::warn!(error = %e, product_id = %product, "Failed to record wishlist add");
        }
        self.with_items(wishlist).await
    }

    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the product is not on the list.
    pub async fn remove_from_wishlist(
        &self,
        user: UserId,
        id: WishlistId,
        product: ProductId,
    ) -> Result<WishlistDetail, CatalogError> {
        let wishlist = self.owned_wishlist(id, user).await?;
        self.wishlists
            .remove_item(id, product)
            .await
            .map_err(not_found_as(CatalogError::NotFound))?;
        self.with_items(wishlist).await
    }

    /// # Errors
    ///
    /// Returns `CatalogError::WishlistNotFound` unless `user` owns the list.
    pub async fn delete_wishlist(&self, user: UserId, id: WishlistId) -> Result<(), CatalogError> {
        self.wishlists
            .delete(id, user)
            .await
            .map_err(not_found_as(CatalogError::WishlistNotFound))
    }

    // =========================================================================
    // Visitor cart
    // =========================================================================

    /// The cart for a session key.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for an empty key.
    pub async fn cart(&self, session_key: &str) -> Result<Cart, CatalogError> {
        Ok(self.carts.get_or_create(session_key_of(session_key)?).await?)
    }

    /// Add an active product to a cart, merging quantities.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Unavailable` unless the product is active.
    pub async fn add_to_cart(
        &self,
        session_key: &str,
        product: ProductId,
        quantity: i32,
    ) -> Result<Cart, CatalogError> {
        let session_key = session_key_of(session_key)?;
        if !(1..=MAX_CART_QUANTITY).contains(&quantity) {
            return Err(CatalogError::Invalid("quantity must be between 1 and 100"));
        }
        let product = self.products.get(product).await?.ok_or(CatalogError::NotFound)?;
        if !product.status.is_purchasable() {
            return Err(CatalogError::Unavailable);
        }
        Ok(self.carts.add_item(session_key, product.id, quantity).await?)
    }

    /// Remove a line from a cart.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the line is not in the cart.
    pub async fn remove_from_cart(
        &self,
        session_key: &str,
        item: CartItemId,
    ) -> Result<Cart, CatalogError> {
        self.carts
            .remove_item(session_key_of(session_key)?, item)
            .await
            .map_err(not_found_as(CatalogError::NotFound))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn owned(&self, id: ProductId, seller: UserId) -> Result<Product, CatalogError> {
        let product = self.products.get(id).await?.ok_or(CatalogError::NotFound)?;
        if product.seller_id != seller {
            return Err(CatalogError::NotOwner);
        }
        Ok(product)
    }

    async fn owned_wishlist(
        &self,
        id: WishlistId,
        user: UserId,
    ) -> Result<Wishlist, CatalogError> {
        self.wishlists
            .get(id)
            .await?
            .filter(|w| w.user_id == user)
            .ok_or(CatalogError::WishlistNotFound)
    }

    async fn with_items(&self, wishlist: Wishlist) -> Result<WishlistDetail, CatalogError> {
        let items = self.wishlists.items(wishlist.id).await?;
        Ok(WishlistDetail { wishlist, items })
    }

    async fn active_category(&self, id: CategoryId) -> Result<(), CatalogError> {
        match self.categories.get(id).await? {
            Some(c) if c.is_active => Ok(()),
            _ => Err(CatalogError::CategoryNotFound),
        }
    }

    async fn activate(&self, product: &Product) -> Result<Product, CatalogError> {
        let expires_at = Utc::now() + Duration::days(LISTING_LIFETIME_DAYS);
        Ok(ProductRepository::set_status(
            self.pool,
            product.id,
            ProductStatus::Active,
            Some(expires_at),
            None,
        )
        .await?)
    }
}

fn not_found_as(err: CatalogError) -> impl FnOnce(RepositoryError) -> CatalogError {
    move |e| match e {
        RepositoryError::NotFound => err,
        other => CatalogError::Repository(other),
    }
}

fn visible_to(wishlist: &Wishlist, viewer: Option<UserId>) -> bool {
    wishlist.is_public || viewer == Some(wishlist.user_id)
}

fn validate_wishlist_name(name: &str) -> Result<&str, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::Invalid("wishlist name is required"));
    }
    if name.chars().count() > MAX_WISHLIST_NAME_LENGTH {
        return Err(CatalogError::Invalid("wishlist name is too long"));
    }
    Ok(name)
}

fn session_key_of(key: &str) -> Result<&str, CatalogError> {
    let key = key.trim();
    if key.is_empty() || key.len() > 128 {
        return Err(CatalogError::Invalid("session_key is required"));
    }
    Ok(key)
}

fn validate_title(title: &str) -> Result<&str, CatalogError> {
    let title = title.trim();
    if title.chars().count() < 3 {
        return Err(CatalogError::Invalid("title must be at least 3 characters"));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(CatalogError::Invalid("title is too long"));
    }
    Ok(title)
}

fn validate_description(description: &str) -> Result<&str, CatalogError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(CatalogError::Invalid("description is required"));
    }
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(CatalogError::Invalid("description is too long"));
    }
    Ok(description)
}

/// Lower-case ASCII slug with accents folded and runs of other characters
/// collapsed to one hyphen.
#[must_use]
pub fn slug_base(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        let c = match c {
            'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        };
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("annonce");
    }
    slug
}

/// Unique listing slug: the title slug plus a random suffix.
#[must_use]
pub fn slugify(title: &str) -> String {
    use rand::Rng;
    let suffix: u32 = rand::rng().random_range(0..0x100_0000);
    let mut base = slug_base(title);
    base.truncate(80);
    format!("{}-{suffix:06x}", base.trim_end_matches('-'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_base_folds_accents() {
        assert_eq!(slug_base("Téléphone Samsung Galaxy S21"), "telephone-samsung-galaxy-s21");
        assert_eq!(slug_base("  Robe -- été!! "), "robe-ete");
        assert_eq!(slug_base("!!!"), "annonce");
    }

    #[test]
    fn test_slugify_adds_suffix() {
        let slug = slugify("Canapé d'angle");
        assert!(slug.starts_with("canape-d-angle-"));
        assert_eq!(slug.len(), "canape-d-angle-".len() + 6);
    }

    #[test]
    fn test_validate_title() {
        assert!(validate_title("  ab ").is_err());
        assert_eq!(validate_title("  Vélo  ").unwrap(), "Vélo");
        assert!(validate_title(&"x".repeat(MAX_TITLE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_wishlist_name_is_trimmed_and_bounded() {
        assert_eq!(validate_wishlist_name("  Cadeaux de Noël ").unwrap(), "Cadeaux de Noël");
        assert!(validate_wishlist_name("   ").is_err());
        assert!(validate_wishlist_name(&"é".repeat(MAX_WISHLIST_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_private_wishlist_is_owner_only() {
        let owner = UserId::generate();
        let mut wishlist = Wishlist {
            id: WishlistId::generate(),
            user_id: owner,
            name: "Maison".to_owned(),
            is_public: false,
            created_at: Utc::now(),
        };
        assert!(visible_to(&wishlist, Some(owner)));
        assert!(!visible_to(&wishlist, Some(UserId::generate())));
        assert!(!visible_to(&wishlist, None));

        wishlist.is_public = true;
        assert!(visible_to(&wishlist, None));
    }

    #[test]
    fn test_wishlist_form_defaults_to_private() {
        let form: WishlistForm =
            serde_json::from_value(serde_json::json!({ "name": "Rentrée" })).unwrap();
        assert!(!form.is_public);
    }

    #[test]
    fn test_session_key_of() {
        assert!(session_key_of("   ").is_err());
        assert_eq!(session_key_of(" abc ").unwrap(), "abc");
    }

    #[test]
    fn test_listing_form_rejects_low_price() {
        let json = serde_json::json!({
            "category_id": CategoryId::generate(),
            "title": "Frigo",
            "description": "Bon état",
            "price": 500,
            "condition": "BON",
            "city": "DOUALA",
        });
        assert!(serde_json::from_value::<ListingForm>(json).is_err());
    }
}
