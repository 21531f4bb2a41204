//! Categories, products, images and wishlists.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vide_grenier_core::recommend::ProductFeatures;
use vide_grenier_core::{
    CategoryId, City, Condition, ProductId, ProductImageId, ProductSource, ProductStatus, UserId,
    WishlistId, Xaf,
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub parent_id: Option<CategoryId>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub is_active: bool,
    pub sort_order: i32,
}

/// A category with its active product count and subcategories.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub product_count: i64,
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    /// Build the tree from a flat list. Roots are categories without a
    /// parent, or whose parent is not in the list.
    #[must_use]
    pub fn tree(categories: Vec<(Category, i64)>) -> Vec<Self> {
        let ids: std::collections::HashSet<CategoryId> =
            categories.iter().map(|(c, _)| c.id).collect();
        let (roots, rest): (Vec<_>, Vec<_>) = categories
            .into_iter()
            .partition(|(c, _)| c.parent_id.is_none_or(|p| !ids.contains(&p)));
        roots
            .into_iter()
            .map(|(category, product_count)| Self::attach(category, product_count, &rest))
            .collect()
    }

    fn attach(category: Category, product_count: i64, pool: &[(Category, i64)]) -> Self {
        let children = pool
            .iter()
            .filter(|(c, _)| c.parent_id == Some(category.id))
            .map(|(c, n)| Self::attach(c.clone(), *n, pool))
            .collect();
        Self {
            category,
            product_count,
            children,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub category_id: CategoryId,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price: Xaf,
    pub condition: Condition,
    pub city: City,
    pub status: ProductStatus,
    pub source: ProductSource,
    pub is_featured: bool,
    pub views_count: i64,
    pub likes_count: i64,
    pub rejection_reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// The attributes the recommendation engine works on.
    #[must_use]
    pub const fn features(&self) -> ProductFeatures {
        ProductFeatures {
            id: self.id,
            category: self.category_id,
            seller: self.seller_id,
            condition: self.condition,
            city: self.city,
            price: self.price,
            views: self.views_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductImage {
    pub id: ProductImageId,
    pub product_id: ProductId,
    pub url: String,
    pub is_primary: bool,
    pub sort_order: i32,
}

/// A named product list. Public lists can be viewed by anyone with the id.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Wishlist {
    pub id: WishlistId,
    pub user_id: UserId,
    pub name: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WishlistDetail {
    #[serde(flatten)]
    pub wishlist: Wishlist,
    pub items: Vec<Product>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, parent: Option<CategoryId>) -> Category {
        Category {
            id: CategoryId::generate(),
            parent_id: parent,
            name: name.to_string(),
            slug: name.to_lowercase(),
            description: None,
            icon: None,
            is_active: true,
            sort_order: 0,
        }
    }

    #[test]
    fn test_category_tree() {
        let electronics = category("Electronique", None);
        let phones = category("Telephones", Some(electronics.id));
        let fashion = category("Mode", None);
        let tree = CategoryNode::tree(vec![(electronics, 4), (phones, 3), (fashion, 1)]);

        assert_eq!(tree.len(), 2);
        let root = tree.iter().find(|n| n.category.name == "Electronique");
        assert!(root.is_some_and(|n| n.children.len() == 1 && n.children[0].product_count == 3));
    }
}
