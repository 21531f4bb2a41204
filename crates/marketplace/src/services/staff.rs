//! Warehouse work: staff tasks, inventory movements and order pickups.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use vide_grenier_core::{
    MovementKind, NotificationKind, OrderId, OrderStatus, PickupPointId, ProductId, StaffTaskId,
    StateMachine, TaskKind, TaskPriority, TaskStatus, TransitionError, UserId, UserType,
};

use super::notifier::Notifier;
use crate::db::RepositoryError;
use crate::db::backoffice::{BackofficeRepository, NewTask};
use crate::db::orders::{OrderRepository, StatusChange};
use crate::models::{InventoryMovement, Order, StaffTask};

/// Movements listed per pickup point.
pub const MOVEMENT_HISTORY: i64 = 100;

#[derive(Debug, Error)]
pub enum StaffError {
    #[error("task not found")]
    TaskNotFound,

    #[error("pickup point not found")]
    PickupPointNotFound,

    #[error("no order is waiting for this pickup code")]
    UnknownPickupCode,

    #[error("order is not ready for pickup yet")]
    NotReadyForPickup,

    #[error("task is assigned to someone else")]
    NotAssignee,

    #[error("{kind} does not accept a quantity change of {change}")]
    InvalidMovement { kind: MovementKind, change: i32 },

    #[error("stock at a pickup point cannot go below zero")]
    InsufficientStock,

    #[error("{0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Task creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskForm {
    pub kind: TaskKind,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assigned_to: Option<UserId>,
    pub pickup_point_id: Option<PickupPointId>,
    pub order_id: Option<OrderId>,
    pub due_date: Option<DateTime<Utc>>,
}

const fn default_priority() -> TaskPriority {
    TaskPriority::Medium
}

/// Inventory movement request.
#[derive(Debug, Clone, Deserialize)]
pub struct MovementForm {
    pub pickup_point_id: PickupPointId,
    pub product_id: Option<ProductId>,
    pub kind: MovementKind,
    pub quantity_change: i32,
    pub reason: String,
}

/// Staff back-office service.
pub struct StaffService<'a> {
    backoffice: BackofficeRepository<'a>,
    orders: OrderRepository<'a>,
    notifier: &'a Notifier,
}

impl<'a> StaffService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, notifier: &'a Notifier) -> Self {
        Self {
            backoffice: BackofficeRepository::new(pool),
            orders: OrderRepository::new(pool),
            notifier,
        }
    }

    /// Tasks visible to the caller: staff see their own, admins see all.
    ///
    /// # Errors
    ///
    /// Returns `StaffError::Repository` if the query fails.
    pub async fn tasks(
        &self,
        user: UserId,
        user_type: UserType,
        status: Option<TaskStatus>,
    ) -> Result<Vec<StaffTask>, StaffError> {
        let assignee = (user_type != UserType::Admin).then_some(user);
        Ok(self.backoffice.tasks(assignee, status).await?)
    }

    /// Create a task. Admin only.
    ///
    /// # Errors
    ///
    /// Returns `StaffError::Invalid` for an empty title.
    #[instrument(skip(self, form), fields(kind = %form.kind))]
    pub async fn create_task(
        &self,
        author: UserId,
        form: &TaskForm,
    ) -> Result<StaffTask, StaffError> {
        let title = form.title.trim();
        if title.is_empty() {
            return Err(StaffError::Invalid("task title is required"));
        }
        let task = self
            .backoffice
            .create_task(&NewTask {
                kind: form.kind,
                priority: form.priority,
                title,
                description: form.description.trim(),
                assigned_to: form.assigned_to,
                created_by: author,
                pickup_point_id: form.pickup_point_id,
                order_id: form.order_id,
                due_date: form.due_date,
            })
            .await?;

        if let Some(assignee) = task.assigned_to {
            self.notifier
                .notify(
                    assignee,
                    NotificationKind::System,
                    "Nouvelle tâche",
                    &format!("Une tâche vous a été assignée : {}", task.title),
                    serde_json::json!({ "task_id": task.id }),
                )
                .await;
        }
        Ok(task)
    }

    /// Move a task along its lifecycle. Staff may only work on tasks that are
    /// unassigned or assigned to them; admins on any task.
    ///
    /// # Errors
    ///
    /// Returns `StaffError::Transition` for an illegal edge and
    /// `StaffError::NotAssignee` for someone else's task.
    #[instrument(skip(self, notes))]
    pub async fn advance_task(
        &self,
        id: StaffTaskId,
        user: UserId,
        user_type: UserType,
        next: TaskStatus,
        notes: Option<&str>,
    ) -> Result<StaffTask, StaffError> {
        let task = self.backoffice.task(id).await?.ok_or(StaffError::TaskNotFound)?;
        if user_type != UserType::Admin && task.assigned_to.is_some_and(|a| a != user) {
            return Err(StaffError::NotAssignee);
        }
        task.status.transition(next)?;
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());
        Ok(self
            .backoffice
            .set_task_status(id, task.status, next, notes)
            .await?)
    }

    /// Record a stock movement at a pickup point.
    ///
    /// # Errors
    ///
    /// Returns `StaffError::InvalidMovement` when the sign of the change does
    /// not match the movement kind and `StaffError::InsufficientStock` when
    /// the point would go below zero.
    #[instrument(skip(self, form), fields(kind = %form.kind, change = form.quantity_change))]
    pub async fn record_movement(
        &self,
        user: UserId,
        form: &MovementForm,
    ) -> Result<InventoryMovement, StaffError> {
        if !form.kind.accepts(form.quantity_change) {
            return Err(StaffError::InvalidMovement {
                kind: form.kind,
                change: form.quantity_change,
            });
        }
        let reason = form.reason.trim();
        if reason.is_empty() {
            return Err(StaffError::Invalid("a reason is required"));
        }
        self.backoffice
            .record_movement(
                form.pickup_point_id,
                form.product_id,
                form.kind,
                form.quantity_change,
                reason,
                user,
            )
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => StaffError::PickupPointNotFound,
                other => StaffError::Repository(other),
            })?
            .ok_or(StaffError::InsufficientStock)
    }

    /// Recent movements at a pickup point.
    ///
    /// # Errors
    ///
    /// Returns `StaffError::PickupPointNotFound` for unknown points.
    pub async fn movements(
        &self,
        point: PickupPointId,
    ) -> Result<Vec<InventoryMovement>, StaffError> {
        self.backoffice
            .pickup_point(point)
            .await?
            .ok_or(StaffError::PickupPointNotFound)?;
        Ok(self.backoffice.movements(point, MOVEMENT_HISTORY).await?)
    }

    /// Hand over a pickup order to the customer presenting its code. The
    /// order must have been shipped to the point; it becomes DELIVERED.
    ///
    /// # Errors
    ///
    /// Returns `StaffError::UnknownPickupCode` or `StaffError::NotReadyForPickup`.
    #[instrument(skip(self, code))]
    pub async fn confirm_pickup(&self, code: &str) -> Result<Order, StaffError> {
        let code = code.trim();
        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StaffError::Invalid("pickup code must be 6 digits"));
        }
        let order = self
            .orders
            .get_by_pickup_code(code)
            .await?
            .ok_or(StaffError::UnknownPickupCode)?;
        if order.status != OrderStatus::Shipped {
            return Err(StaffError::NotReadyForPickup);
        }

        self.orders.mark_picked_up(order.id).await?;
        let StatusChange { order, points, .. } = self
            .orders
            .apply_status(order.id, OrderStatus::Shipped, OrderStatus::Delivered)
            .await?;
        tracing::info!(order_id = %order.id, points, "Order picked up");

        if let Some(buyer) = order.buyer_id {
            self.notifier
                .notify(
                    buyer,
                    NotificationKind::Order,
                    "Commande retirée",
                    &format!("Votre commande {} a été retirée au point relais.", order.order_number),
                    serde_json::json!({ "order_id": order.id, "loyalty_points": points }),
                )
                .await;
        }
        self.notifier
            .notify(
                order.seller_id,
                NotificationKind::Order,
                "Commande livrée",
                &format!("La commande {} a été remise à l'acheteur.", order.order_number),
                serde_json::json!({ "order_id": order.id }),
            )
            .await;
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_task_form_defaults() {
        let form: TaskForm = serde_json::from_value(serde_json::json!({
            "kind": "INVENTORY_COUNT",
            "title": "Inventaire mensuel",
        }))
        .unwrap();
        assert_eq!(form.priority, TaskPriority::Medium);
        assert!(form.description.is_empty());
        assert!(form.assigned_to.is_none());
    }

    #[test]
    fn test_movement_form_parses_kind() {
        let form: MovementForm = serde_json::from_value(serde_json::json!({
            "pickup_point_id": PickupPointId::generate(),
            "kind": "DAMAGE",
            "quantity_change": -2,
            "reason": "Écran fissuré",
        }))
        .unwrap();
        assert!(form.kind.accepts(form.quantity_change));
        assert!(!MovementKind::Receive.accepts(form.quantity_change));
    }
}
