//! Category, product, image, favorite and wishlist repositories.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use vide_grenier_core::{
    CategoryId, City, Condition, FavoriteId, ProductId, ProductImageId, ProductSource,
    ProductStatus, UserId, WishlistId, Xaf,
};

use super::{Page, RepositoryError};
use crate::models::{Category, Product, ProductImage, Wishlist};

pub(crate) const PRODUCT_COLUMNS: &str = "p.id, p.seller_id, p.category_id, p.title, p.slug, \
     p.description, p.price, p.condition, p.city, p.status, p.source, p.is_featured, \
     p.views_count, p.likes_count, p.rejection_reason, p.expires_at, p.published_at, \
     p.created_at, p.updated_at";

/// Filters for the public product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<CategoryId>,
    pub condition: Option<Condition>,
    pub city: Option<City>,
    pub search: Option<String>,
    pub min_price: Option<Xaf>,
    pub max_price: Option<Xaf>,
    pub seller: Option<UserId>,
}

/// Fields of a new listing.
#[derive(Debug, Clone)]
pub struct NewProduct<'a> {
    pub seller_id: UserId,
    pub category_id: CategoryId,
    pub title: &'a str,
    pub slug: &'a str,
    pub description: &'a str,
    pub price: Xaf,
    pub condition: Condition,
    pub city: City,
    pub status: ProductStatus,
    pub source: ProductSource,
}

/// Editable listing fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges<'a> {
    pub category_id: Option<CategoryId>,
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub price: Option<Xaf>,
    pub condition: Option<Condition>,
    pub city: Option<City>,
}

/// Repository for categories.
pub struct CategoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CategoryRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Active categories with their active product counts, in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active_with_counts(&self) -> Result<Vec<(Category, i64)>, RepositoryError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            #[sqlx(flatten)]
            category: Category,
            product_count: i64,
        }

        let rows = sqlx::query_as::<_, Row>(
            "SELECT c.id, c.parent_id, c.name, c.slug, c.description, c.icon, c.is_active,
                    c.sort_order,
                    (SELECT COUNT(*) FROM products p
                     WHERE p.category_id = c.id AND p.status = 'active') AS product_count
             FROM categories c
             WHERE c.is_active
             ORDER BY c.sort_order, c.name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| (r.category, r.product_count)).collect())
    }

    /// Get a category by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT id, parent_id, name, slug, description, icon, is_active, sort_order
             FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?)
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(
        &self,
        name: &str,
        slug: &str,
        parent_id: Option<CategoryId>,
        icon: Option<&str>,
        sort_order: i32,
    ) -> Result<Category, RepositoryError> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, parent_id, name, slug, icon, sort_order)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, parent_id, name, slug, description, icon, is_active, sort_order",
        )
        .bind(CategoryId::generate())
        .bind(parent_id)
        .bind(name)
        .bind(slug)
        .bind(icon)
        .bind(sort_order)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "category"))
    }
}

/// Repository for products and their images.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Active listings matching `filter`, featured first then newest.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_active(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<(Vec<Product>, i64), RepositoryError> {
        let pattern = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"));
        let predicate = "p.status = 'active'
            AND ($1::uuid IS NULL OR p.category_id = $1)
            AND ($2::product_condition IS NULL OR p.condition = $2)
            AND ($3::city IS NULL OR p.city = $3)
            AND ($4::text IS NULL OR p.title ILIKE $4 OR p.description ILIKE $4)
            AND ($5::numeric IS NULL OR p.price >= $5)
            AND ($6::numeric IS NULL OR p.price <= $6)
            AND ($7::uuid IS NULL OR p.seller_id = $7)";

        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE {predicate}
             ORDER BY p.is_featured DESC, p.created_at DESC
             LIMIT $8 OFFSET $9"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(filter.category)
            .bind(filter.condition)
            .bind(filter.city)
            .bind(pattern.as_deref())
            .bind(filter.min_price)
            .bind(filter.max_price)
            .bind(filter.seller)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products p WHERE {predicate}"))
                .bind(filter.category)
                .bind(filter.condition)
                .bind(filter.city)
                .bind(pattern.as_deref())
                .bind(filter.min_price)
                .bind(filter.max_price)
                .bind(filter.seller)
                .fetch_one(self.pool)
                .await?;

        Ok((products, total))
    }

    /// Every listing of a seller, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_seller(&self, seller: UserId) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.seller_id = $1
             ORDER BY p.created_at DESC"
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(seller)
            .fetch_all(self.pool)
            .await?)
    }

    /// Listings waiting for moderation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_pending(&self, page: Page) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.status = 'pending'
             ORDER BY p.updated_at LIMIT $1 OFFSET $2"
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?)
    }

    /// Every active listing, for the recommendation engine.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn all_active(&self) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.status = 'active'");
        Ok(sqlx::query_as::<_, Product>(&sql)
            .fetch_all(self.pool)
            .await?)
    }

    /// Load several products, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let raw: Vec<uuid::Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = ANY($1)");
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(raw)
            .fetch_all(self.pool)
            .await?)
    }

    /// Most-viewed active listings as `(id, views)`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn most_viewed(&self, limit: i64) -> Result<Vec<(ProductId, i64)>, RepositoryError> {
        Ok(sqlx::query_as::<_, (ProductId, i64)>(
            "SELECT id, views_count FROM products WHERE status = 'active'
             ORDER BY views_count DESC, created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?)
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1");
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Increment the view counter and return the updated product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn increment_views(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let sql = format!(
            "UPDATE products p SET views_count = views_count + 1 WHERE p.id = $1
             RETURNING {PRODUCT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Insert a listing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    #[instrument(skip(self, new), fields(title = new.title))]
    pub async fn create(&self, new: &NewProduct<'_>) -> Result<Product, RepositoryError> {
        let sql = format!(
            "INSERT INTO products AS p (id, seller_id, category_id, title, slug, description, price,
                                        condition, city, status, source)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(ProductId::generate())
            .bind(new.seller_id)
            .bind(new.category_id)
            .bind(new.title)
            .bind(new.slug)
            .bind(new.description)
            .bind(new.price)
            .bind(new.condition)
            .bind(new.city)
            .bind(new.status)
            .bind(new.source)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "product"))
    }

    /// Apply listing edits.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn update(
        &self,
        id: ProductId,
        changes: &ProductChanges<'_>,
    ) -> Result<Product, RepositoryError> {
        let sql = format!(
            "UPDATE products p SET
                category_id = COALESCE($2, category_id),
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                price = COALESCE($5, price),
                condition = COALESCE($6, condition),
                city = COALESCE($7, city),
                updated_at = NOW()
             WHERE p.id = $1
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(changes.category_id)
            .bind(changes.title)
            .bind(changes.description)
            .bind(changes.price)
            .bind(changes.condition)
            .bind(changes.city)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Store a status already validated by the product lifecycle.
    ///
    /// Activation stamps `published_at` and `expires_at`; a rejection stores
    /// the reason, any other status clears it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn set_status<'e, E>(
        executor: E,
        id: ProductId,
        status: ProductStatus,
        expires_at: Option<DateTime<Utc>>,
        rejection_reason: Option<&str>,
    ) -> Result<Product, RepositoryError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let sql = format!(
            "UPDATE products p SET
                status = $2,
                expires_at = COALESCE($3, expires_at),
                published_at = CASE WHEN $2 = 'active'::product_status
                                    THEN COALESCE(published_at, NOW()) ELSE published_at END,
                rejection_reason = $4,
                updated_at = NOW()
             WHERE p.id = $1
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(status)
            .bind(expires_at)
            .bind(rejection_reason)
            .fetch_optional(executor)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Move a product from one status to another only if it still has the
    /// expected status. Returns `false` when someone else changed it first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn compare_and_set_status<'e, E>(
        executor: E,
        id: ProductId,
        expected: ProductStatus,
        next: ProductStatus,
    ) -> Result<bool, RepositoryError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE products SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark active listings whose expiry has passed as expired.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE products SET status = 'expired', updated_at = NOW()
             WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark or unmark a listing as featured.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn set_featured(&self, id: ProductId, featured: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE products SET is_featured = $2 WHERE id = $1")
            .bind(id)
            .bind(featured)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Images of a product in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn images(&self, id: ProductId) -> Result<Vec<ProductImage>, RepositoryError> {
        Ok(sqlx::query_as::<_, ProductImage>(
            "SELECT id, product_id, url, is_primary, sort_order FROM product_images
             WHERE product_id = $1 ORDER BY is_primary DESC, sort_order",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?)
    }

    /// Attach an image. A new primary image demotes the previous one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add_image(
        &self,
        id: ProductId,
        url: &str,
        is_primary: bool,
        sort_order: i32,
    ) -> Result<ProductImage, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        if is_primary {
            sqlx::query("UPDATE product_images SET is_primary = FALSE WHERE product_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        let image = sqlx::query_as::<_, ProductImage>(
            "INSERT INTO product_images (id, product_id, url, is_primary, sort_order)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, product_id, url, is_primary, sort_order",
        )
        .bind(ProductImageId::generate())
        .bind(id)
        .bind(url)
        .bind(is_primary)
        .bind(sort_order)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(image)
    }

    /// Titles, descriptions and attributes of active listings for text similarity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn similarity_documents(&self) -> Result<Vec<(ProductId, String)>, RepositoryError> {
        Ok(sqlx::query_as::<_, (ProductId, String)>(
            "SELECT p.id,
                    concat_ws(' ', p.title, p.description, c.name, p.condition::text, p.city::text)
             FROM products p JOIN categories c ON c.id = p.category_id
             WHERE p.status = 'active'",
        )
        .fetch_all(self.pool)
        .await?)
    }
}

/// Repository for favorites.
pub struct FavoriteRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> FavoriteRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Add or remove a favorite, keeping `likes_count` in step.
    /// Returns whether the product is now a favorite.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn toggle(&self, user: UserId, product: ProductId) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND product_id = $2")
            .bind(user)
            .bind(product)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let favorited = if removed > 0 {
            sqlx::query(
                "UPDATE products SET likes_count = GREATEST(likes_count - 1, 0) WHERE id = $1",
            )
            .bind(product)
            .execute(&mut *tx)
            .await?;
            false
        } else {
            sqlx::query(
                "INSERT INTO favorites (id, user_id, product_id) VALUES ($1, $2, $3)
                 ON CONFLICT (user_id, product_id) DO NOTHING",
            )
            .bind(FavoriteId::generate())
            .bind(user)
            .bind(product)
            .execute(&mut *tx)
            .await?;
            sqlx::query("UPDATE products SET likes_count = likes_count + 1 WHERE id = $1")
                .bind(product)
                .execute(&mut *tx)
                .await?;
            true
        };

        tx.commit().await?;
        Ok(favorited)
    }

    /// A user's favorite products, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user: UserId) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM favorites f JOIN products p ON p.id = f.product_id
             WHERE f.user_id = $1 ORDER BY f.created_at DESC"
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(user)
            .fetch_all(self.pool)
            .await?)
    }

    /// Whether `user` has favorited `product`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn contains(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<bool, RepositoryError> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM favorites WHERE user_id = $1 AND product_id = $2)",
        )
        .bind(user)
        .bind(product)
        .fetch_one(self.pool)
        .await?)
    }
}

const WISHLIST_COLUMNS: &str = "id, user_id, name, is_public, created_at";

/// Repository for wishlists and their items.
pub struct WishlistRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WishlistRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, name))]
    pub async fn create(
        &self,
        user: UserId,
        name: &str,
        is_public: bool,
    ) -> Result<Wishlist, RepositoryError> {
        let sql = format!(
            "INSERT INTO wishlists (id, user_id, name, is_public) VALUES ($1, $2, $3, $4)
             RETURNING {WISHLIST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Wishlist>(&sql)
            .bind(WishlistId::generate())
            .bind(user)
            .bind(name)
            .bind(is_public)
            .fetch_one(self.pool)
            .await?)
    }

    /// A user's wishlists, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user: UserId) -> Result<Vec<Wishlist>, RepositoryError> {
        let sql = format!(
            "SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE user_id = $1 ORDER BY created_at"
        );
        Ok(sqlx::query_as::<_, Wishlist>(&sql)
            .bind(user)
            .fetch_all(self.pool)
            .await?)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: WishlistId) -> Result<Option<Wishlist>, RepositoryError> {
        let sql = format!("SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE id = $1");
        Ok(sqlx::query_as::<_, Wishlist>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Products on a wishlist, most recently added first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, id: WishlistId) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM wishlist_items w JOIN products p ON p.id = w.product_id
             WHERE w.wishlist_id = $1 ORDER BY w.added_at DESC"
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_all(self.pool)
            .await?)
    }

    /// Add a product. Adding it twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn add_item(
        &self,
        id: WishlistId,
        product: ProductId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO wishlist_items (wishlist_id, product_id) VALUES ($1, $2)
             ON CONFLICT (wishlist_id, product_id) DO NOTHING",
        )
        .bind(id)
        .bind(product)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not on the list.
    pub async fn remove_item(
        &self,
        id: WishlistId,
        product: ProductId,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM wishlist_items WHERE wishlist_id = $1 AND product_id = $2")
                .bind(id)
                .bind(product)
                .execute(self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete a wishlist and its items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if `user` has no such wishlist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: WishlistId, user: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM wishlists WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
