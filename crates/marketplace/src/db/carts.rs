//! Visitor cart repository.

use sqlx::PgPool;

use vide_grenier_core::{CartId, CartItemId, ProductId};

use super::RepositoryError;
use crate::models::{Cart, CartItem};

/// Repository for anonymous visitor carts.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load the cart for a session, creating an empty one on first use.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create(&self, session_key: &str) -> Result<Cart, RepositoryError> {
        let (id, updated_at) = sqlx::query_as::<_, (CartId, chrono::DateTime<chrono::Utc>)>(
            "INSERT INTO visitor_carts (id, session_key) VALUES ($1, $2)
             ON CONFLICT (session_key) DO UPDATE SET session_key = EXCLUDED.session_key
             RETURNING id, updated_at",
        )
        .bind(CartId::generate())
        .bind(session_key)
        .fetch_one(self.pool)
        .await?;

        let items = self.items(id).await?;
        Ok(Cart::new(id, session_key.to_string(), items, updated_at))
    }

    async fn items(&self, cart: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        Ok(sqlx::query_as::<_, CartItem>(
            "SELECT i.id, i.product_id, p.seller_id, p.title, p.price AS unit_price, p.status,
                    i.quantity
             FROM visitor_cart_items i JOIN products p ON p.id = i.product_id
             WHERE i.cart_id = $1
             ORDER BY i.added_at",
        )
        .bind(cart)
        .fetch_all(self.pool)
        .await?)
    }

    /// Add a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add_item(
        &self,
        session_key: &str,
        product: ProductId,
        quantity: i32,
    ) -> Result<Cart, RepositoryError> {
        let cart = self.get_or_create(session_key).await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO visitor_cart_items (id, cart_id, product_id, quantity)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (cart_id, product_id)
             DO UPDATE SET quantity = visitor_cart_items.quantity + EXCLUDED.quantity",
        )
        .bind(CartItemId::generate())
        .bind(cart.id)
        .bind(product)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;
        Self::touch(&mut tx, cart.id).await?;
        tx.commit().await?;
        self.get_or_create(session_key).await
    }

    /// Remove a line from the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in this cart.
    pub async fn remove_item(
        &self,
        session_key: &str,
        item: CartItemId,
    ) -> Result<Cart, RepositoryError> {
        let cart = self.get_or_create(session_key).await?;
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM visitor_cart_items WHERE id = $1 AND cart_id = $2")
            .bind(item)
            .bind(cart.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(RepositoryError::NotFound);
        }
        Self::touch(&mut tx, cart.id).await?;
        tx.commit().await?;
        self.get_or_create(session_key).await
    }

    /// Empty a cart after checkout.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, cart: CartId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM visitor_cart_items WHERE cart_id = $1")
            .bind(cart)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    async fn touch(
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        cart: CartId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE visitor_carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
