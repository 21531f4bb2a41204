//! Scheduled maintenance jobs.
//!
//! Each job is idempotent and meant to run from cron:
//!
//! ```text
//! */15 * * * *  vgk-cli escrow release-due
//! 0 * * * *     vgk-cli installments sweep
//! 5 * * * *     vgk-cli products expire
//! */10 * * * *  vgk-cli newsletter send-pending
//! 0 3 * * *     vgk-cli recommendations refresh
//! ```

use chrono::Utc;

use vide_grenier_core::{NewsletterId, UserId};
use vide_grenier_marketplace::services::{
    CatalogService, FinanceService, NewsletterService, ReportService,
};

use super::{CommandError, connect};

/// Recompute persisted recommendations for one user or every active user.
pub async fn refresh_recommendations(user: Option<UserId>) -> Result<(), CommandError> {
    let state = connect().await?;
    let recommendations = state.recommendations();
    if let Some(user) = user {
        let count = recommendations
            .refresh_user(user)
            .await
            .map_err(CommandError::failed)?;
        tracing::info!(user_id = %user, count, "Recommendations refreshed");
    } else {
        let users = recommendations
            .refresh_all()
            .await
            .map_err(CommandError::failed)?;
        tracing::info!(users, "Recommendations refreshed for all active users");
    }
    Ok(())
}

/// Expire active listings past their expiry date.
pub async fn expire_products() -> Result<(), CommandError> {
    let state = connect().await?;
    let expired = CatalogService::new(
        state.pool(),
        state.notifier(),
        state.config().commission_rate,
    )
    .expire_due(Utc::now())
    .await
    .map_err(CommandError::failed)?;
    tracing::info!(expired, "Listing expiry complete");
    Ok(())
}

/// Mark overdue installments.
pub async fn sweep_installments() -> Result<(), CommandError> {
    let state = connect().await?;
    let overdue = FinanceService::new(state.pool(), state.notifier())
        .sweep_overdue(Utc::now())
        .await
        .map_err(CommandError::failed)?;
    tracing::info!(overdue, "Installment sweep complete");
    Ok(())
}

/// Release funded escrows whose holding period is over.
pub async fn release_due_escrows() -> Result<(), CommandError> {
    let state = connect().await?;
    let released = FinanceService::new(state.pool(), state.notifier())
        .release_due(Utc::now())
        .await
        .map_err(CommandError::failed)?;
    tracing::info!(released, "Escrow release complete");
    Ok(())
}

/// Log the stock analysis of every platform stock line, most urgent first.
pub async fn stock_report() -> Result<(), CommandError> {
    let state = connect().await?;
    let mut lines = ReportService::new(state.pool())
        .stock_report(Utc::now())
        .await
        .map_err(CommandError::failed)?;
    lines.sort_by(|a, b| b.analysis.reorder.urgency.cmp(&a.analysis.reorder.urgency));

    for line in &lines {
        tracing::info!(
            sku = %line.item.sku,
            product = %line.item.product_title,
            quantity = line.item.quantity,
            status = ?line.analysis.status,
            urgency = ?line.analysis.reorder.urgency,
            reorder_quantity = line.analysis.reorder.recommended_quantity.ceil(),
            margin = %line.profit_margin,
            "Stock line"
        );
        for alert in &line.analysis.alerts {
            tracing::warn!(sku = %line.item.sku, priority = ?alert.priority, "{}", alert.message);
        }
    }
    tracing::info!(lines = lines.len(), "Stock report complete");
    Ok(())
}

/// Send one campaign now.
pub async fn send_newsletter(id: NewsletterId) -> Result<(), CommandError> {
    let state = connect().await?;
    let campaign = NewsletterService::new(state.pool(), state.email())
        .send(id)
        .await
        .map_err(CommandError::failed)?;
    tracing::info!(
        newsletter_id = %campaign.id,
        recipients = campaign.recipients_count,
        "Newsletter sent"
    );
    Ok(())
}

/// Send every scheduled campaign that is due.
pub async fn send_pending_newsletters() -> Result<(), CommandError> {
    let state = connect().await?;
    let sent = NewsletterService::new(state.pool(), state.email())
        .send_pending(Utc::now())
        .await
        .map_err(CommandError::failed)?;
    tracing::info!(campaigns = sent.len(), "Pending newsletters sent");
    Ok(())
}
