//! Pickup points, platform stock, staff tasks and inventory movements.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use vide_grenier_core::{
    AdminStockId, AdminStockStatus, City, InventoryMovementId, MovementKind, OrderId,
    PickupPointId, ProductId, StaffTaskId, TaskKind, TaskPriority, TaskStatus, UserId, Xaf,
};

use super::RepositoryError;
use crate::models::{AdminStockItem, InventoryMovement, PickupPoint, StaffTask};

const PICKUP_POINT_COLUMNS: &str = "id, name, address, city, phone, manager_id, opening_hours, \
     capacity, current_stock, is_active, created_at";
const ADMIN_STOCK_COLUMNS: &str = "s.id, s.product_id, p.title AS product_title, \
     p.price AS selling_price, s.pickup_point_id, s.sku, s.purchase_price, s.quantity, \
     s.low_stock_threshold, s.status, s.supplier, s.notes, s.created_at";
const TASK_COLUMNS: &str = "id, kind, priority, status, title, description, assigned_to, \
     created_by, pickup_point_id, order_id, due_date, started_at, completed_at, notes, created_at";
const MOVEMENT_COLUMNS: &str = "id, pickup_point_id, product_id, kind, quantity_change, \
     stock_after, reason, performed_by, created_at";

/// Fields of a new pickup point.
#[derive(Debug, Clone)]
pub struct NewPickupPoint<'a> {
    pub name: &'a str,
    pub address: &'a str,
    pub city: City,
    pub phone: Option<&'a str>,
    pub manager_id: Option<UserId>,
    pub opening_hours: Option<&'a str>,
    pub capacity: i32,
}

/// Fields of a new platform stock line.
#[derive(Debug, Clone)]
pub struct NewAdminStock<'a> {
    pub product_id: ProductId,
    pub pickup_point_id: Option<PickupPointId>,
    pub sku: &'a str,
    pub purchase_price: Xaf,
    pub quantity: i32,
    pub low_stock_threshold: i32,
    pub supplier: Option<&'a str>,
    pub notes: Option<&'a str>,
}

/// Fields of a new staff task.
#[derive(Debug, Clone)]
pub struct NewTask<'a> {
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub title: &'a str,
    pub description: &'a str,
    pub assigned_to: Option<UserId>,
    pub created_by: UserId,
    pub pickup_point_id: Option<PickupPointId>,
    pub order_id: Option<OrderId>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Repository for warehouse operations.
pub struct BackofficeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> BackofficeRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Pickup points
    // =========================================================================

    /// All pickup points, by city then name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn pickup_points(&self) -> Result<Vec<PickupPoint>, RepositoryError> {
        let sql = format!("SELECT {PICKUP_POINT_COLUMNS} FROM pickup_points ORDER BY city, name");
        Ok(sqlx::query_as::<_, PickupPoint>(&sql)
            .fetch_all(self.pool)
            .await?)
    }

    /// Get a pickup point by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn pickup_point(
        &self,
        id: PickupPointId,
    ) -> Result<Option<PickupPoint>, RepositoryError> {
        let sql = format!("SELECT {PICKUP_POINT_COLUMNS} FROM pickup_points WHERE id = $1");
        Ok(sqlx::query_as::<_, PickupPoint>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Create a pickup point.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create_pickup_point(
        &self,
        new: &NewPickupPoint<'_>,
    ) -> Result<PickupPoint, RepositoryError> {
        let sql = format!(
            "INSERT INTO pickup_points (id, name, address, city, phone, manager_id, opening_hours,
                                        capacity)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {PICKUP_POINT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, PickupPoint>(&sql)
            .bind(PickupPointId::generate())
            .bind(new.name)
            .bind(new.address)
            .bind(new.city)
            .bind(new.phone)
            .bind(new.manager_id)
            .bind(new.opening_hours)
            .bind(new.capacity)
            .fetch_one(self.pool)
            .await?)
    }

    /// Open or close a pickup point.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the pickup point does not exist.
    pub async fn set_pickup_point_active(
        &self,
        id: PickupPointId,
        active: bool,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE pickup_points SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Admin stock
    // =========================================================================

    /// Platform stock lines joined with their products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn admin_stock(
        &self,
        status: Option<AdminStockStatus>,
    ) -> Result<Vec<AdminStockItem>, RepositoryError> {
        let sql = format!(
            "SELECT {ADMIN_STOCK_COLUMNS}
             FROM admin_stock s JOIN products p ON p.id = s.product_id
             WHERE ($1::admin_stock_status IS NULL OR s.status = $1)
             ORDER BY s.created_at DESC"
        );
        Ok(sqlx::query_as::<_, AdminStockItem>(&sql)
            .bind(status)
            .fetch_all(self.pool)
            .await?)
    }

    /// Get one stock line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn admin_stock_item(
        &self,
        id: AdminStockId,
    ) -> Result<Option<AdminStockItem>, RepositoryError> {
        let sql = format!(
            "SELECT {ADMIN_STOCK_COLUMNS}
             FROM admin_stock s JOIN products p ON p.id = s.product_id
             WHERE s.id = $1"
        );
        Ok(sqlx::query_as::<_, AdminStockItem>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Register platform stock for an admin-sourced product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the SKU or product already has a line.
    #[instrument(skip(self, new), fields(sku = new.sku))]
    pub async fn create_admin_stock(
        &self,
        new: &NewAdminStock<'_>,
    ) -> Result<AdminStockItem, RepositoryError> {
        let id = AdminStockId::generate();
        sqlx::query(
            "INSERT INTO admin_stock (id, product_id, pickup_point_id, sku, purchase_price,
                                      quantity, low_stock_threshold, supplier, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(id)
        .bind(new.product_id)
        .bind(new.pickup_point_id)
        .bind(new.sku)
        .bind(new.purchase_price)
        .bind(new.quantity)
        .bind(new.low_stock_threshold)
        .bind(new.supplier)
        .bind(new.notes)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "stock line"))?;

        self.admin_stock_item(id)
            .await?
            .ok_or_else(|| RepositoryError::DataCorruption(format!("stock line {id} vanished")))
    }

    /// Update quantity and status of a stock line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line does not exist.
    pub async fn update_admin_stock(
        &self,
        id: AdminStockId,
        quantity: Option<i32>,
        status: Option<AdminStockStatus>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE admin_stock SET
                quantity = COALESCE($2, quantity),
                status = COALESCE($3, status),
                updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(quantity)
        .bind(status)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Staff tasks
    // =========================================================================

    /// Tasks, optionally only those assigned to one staff member.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn tasks(
        &self,
        assignee: Option<UserId>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<StaffTask>, RepositoryError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM staff_tasks
             WHERE ($1::uuid IS NULL OR assigned_to = $1)
               AND ($2::task_status IS NULL OR status = $2)
             ORDER BY priority DESC, due_date NULLS LAST, created_at"
        );
        Ok(sqlx::query_as::<_, StaffTask>(&sql)
            .bind(assignee)
            .bind(status)
            .fetch_all(self.pool)
            .await?)
    }

    /// Get a task by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn task(&self, id: StaffTaskId) -> Result<Option<StaffTask>, RepositoryError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM staff_tasks WHERE id = $1");
        Ok(sqlx::query_as::<_, StaffTask>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Create a task.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create_task(&self, new: &NewTask<'_>) -> Result<StaffTask, RepositoryError> {
        let sql = format!(
            "INSERT INTO staff_tasks (id, kind, priority, title, description, assigned_to,
                                      created_by, pickup_point_id, order_id, due_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {TASK_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, StaffTask>(&sql)
            .bind(StaffTaskId::generate())
            .bind(new.kind)
            .bind(new.priority)
            .bind(new.title)
            .bind(new.description)
            .bind(new.assigned_to)
            .bind(new.created_by)
            .bind(new.pickup_point_id)
            .bind(new.order_id)
            .bind(new.due_date)
            .fetch_one(self.pool)
            .await?)
    }

    /// Store a task status already validated by the task lifecycle.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the status changed concurrently.
    pub async fn set_task_status(
        &self,
        id: StaffTaskId,
        from: TaskStatus,
        to: TaskStatus,
        notes: Option<&str>,
    ) -> Result<StaffTask, RepositoryError> {
        let sql = format!(
            "UPDATE staff_tasks SET status = $3,
                started_at = CASE WHEN $3 = 'in_progress'::task_status THEN NOW()
                                  ELSE started_at END,
                completed_at = CASE WHEN $3 = 'completed'::task_status THEN NOW()
                                    ELSE completed_at END,
                notes = COALESCE($4, notes)
             WHERE id = $1 AND status = $2
             RETURNING {TASK_COLUMNS}"
        );
        sqlx::query_as::<_, StaffTask>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .bind(notes)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| RepositoryError::Conflict(format!("task {id} status changed")))
    }

    // =========================================================================
    // Inventory movements
    // =========================================================================

    /// Apply a signed stock change to a pickup point and log it, in one
    /// transaction. Returns `None` when the change would drive the stock
    /// below zero.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the pickup point does not exist.
    #[instrument(skip(self, reason))]
    pub async fn record_movement(
        &self,
        pickup_point: PickupPointId,
        product: Option<ProductId>,
        kind: MovementKind,
        quantity_change: i32,
        reason: &str,
        performed_by: UserId,
    ) -> Result<Option<InventoryMovement>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: i32 =
            sqlx::query_scalar("SELECT current_stock FROM pickup_points WHERE id = $1 FOR UPDATE")
                .bind(pickup_point)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        let Some(stock_after) = current.checked_add(quantity_change).filter(|s| *s >= 0) else {
            return Ok(None);
        };

        sqlx::query("UPDATE pickup_points SET current_stock = $2 WHERE id = $1")
            .bind(pickup_point)
            .bind(stock_after)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "INSERT INTO inventory_movements (id, pickup_point_id, product_id, kind,
                                              quantity_change, stock_after, reason, performed_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {MOVEMENT_COLUMNS}"
        );
        let movement = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(InventoryMovementId::generate())
            .bind(pickup_point)
            .bind(product)
            .bind(kind)
            .bind(quantity_change)
            .bind(stock_after)
            .bind(reason)
            .bind(performed_by)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(movement))
    }

    /// Recent movements at a pickup point, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn movements(
        &self,
        pickup_point: PickupPointId,
        limit: i64,
    ) -> Result<Vec<InventoryMovement>, RepositoryError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements
             WHERE pickup_point_id = $1 ORDER BY created_at DESC LIMIT $2"
        );
        Ok(sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(pickup_point)
            .bind(limit)
            .fetch_all(self.pool)
            .await?)
    }
}
