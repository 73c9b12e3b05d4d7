//! # Budget Service
//!
//! Priced lines of a request. Each write recomputes the stored total in
//! the same transaction, so `Request.budget_total_cents` always equals the
//! sum of its lines.
//!
//! Lines can be added and removed whatever the request status. A change made
//! while the request has an active invoice is flagged in the history entry,
//! since the invoice keeps the amounts it was issued with.

use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use fieldops_core::budget::{line_total, suggestions, BudgetSuggestion};
use fieldops_core::validation::validate_budget_item;
use fieldops_core::{Actor, BudgetLineItem, HistoryEntry, Money, NewBudgetItem};

use crate::collaborators::events::BUDGET_UPDATED;
use crate::context::Context;
use crate::error::{ServiceError, ServiceResult};

pub struct BudgetService {
    ctx: Arc<Context>,
}

impl BudgetService {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        BudgetService { ctx }
    }

    pub async fn add_item(
        &self,
        request_id: &str,
        input: NewBudgetItem,
        actor: &Actor,
    ) -> ServiceResult<BudgetLineItem> {
        validate_budget_item(&input)?;
        let total = line_total(input.quantity, Money::from_cents(input.unit_price_cents))?;
        self.ctx.ensure_request(request_id).await?;

        let now = self.ctx.now();
        let item = BudgetLineItem {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            description: input.description.trim().to_string(),
            quantity: input.quantity,
            unit_price_cents: input.unit_price_cents,
            total_cents: total.cents(),
            category: input.category,
            created_at: now,
        };

        let mut entry = self.ctx.history(request_id, actor, "Budget item added", now);
        entry.details = Some(format!("{} x{}", item.description, item.quantity));
        entry.after_value = Some(total.to_string());
        self.flag_invoiced(request_id, &mut entry).await?;

        let budget_total = self.ctx.db.budget().add_item(&item, &entry).await?;

        info!(request_id = %request_id, item_id = %item.id, total = budget_total, "Budget item added");
        self.publish_total(request_id, budget_total);

        Ok(item)
    }

    /// Removes one line and returns the new budget total.
    pub async fn remove_item(
        &self,
        request_id: &str,
        item_id: &str,
        actor: &Actor,
    ) -> ServiceResult<Money> {
        self.ctx.ensure_request(request_id).await?;

        let mut entry = self
            .ctx
            .history(request_id, actor, "Budget item removed", self.ctx.now());
        entry.details = Some(item_id.to_string());
        self.flag_invoiced(request_id, &mut entry).await?;

        let (removed, budget_total) = self
            .ctx
            .db
            .budget()
            .remove_item(request_id, item_id, &entry)
            .await?;

        info!(
            request_id = %request_id,
            item_id = %item_id,
            removed = removed.total_cents,
            total = budget_total,
            "Budget item removed"
        );
        self.publish_total(request_id, budget_total);

        Ok(Money::from_cents(budget_total))
    }

    /// Records the client's approval of the current budget.
    pub async fn approve(&self, request_id: &str, actor: &Actor) -> ServiceResult<()> {
        let total = self.total(request_id).await?;
        if !total.is_positive() {
            return Err(ServiceError::validation(
                "Cannot approve an empty budget",
            ));
        }

        let mut entry = self
            .ctx
            .history(request_id, actor, "Budget approved", self.ctx.now());
        entry.after_value = Some(total.to_string());

        self.ctx.db.budget().approve(request_id, &entry).await?;

        info!(request_id = %request_id, total = %total, "Budget approved");
        Ok(())
    }

    /// Lines in the order they were added.
    pub async fn items(&self, request_id: &str) -> ServiceResult<Vec<BudgetLineItem>> {
        self.ctx.ensure_request(request_id).await?;
        Ok(self.ctx.db.budget().items(request_id).await?)
    }

    /// Sum of the lines as stored right now.
    pub async fn total(&self, request_id: &str) -> ServiceResult<Money> {
        self.ctx.ensure_request(request_id).await?;
        let cents = self.ctx.db.budget().live_total(request_id).await?;
        Ok(Money::from_cents(cents))
    }

    pub fn suggestions(&self) -> Vec<BudgetSuggestion> {
        suggestions()
    }

    /// Notes on `entry` that the request already has an active invoice, whose
    /// amounts this change will not follow.
    async fn flag_invoiced(&self, request_id: &str, entry: &mut HistoryEntry) -> ServiceResult<()> {
        let Some(invoice) = self.ctx.db.invoices().active_for_request(request_id).await? else {
            return Ok(());
        };

        let reference = invoice.issued_number.as_deref().unwrap_or(&invoice.id);
        warn!(
            request_id = %request_id,
            invoice_id = %invoice.id,
            status = %invoice.status,
            "Budget changed after invoicing"
        );

        let note = format!(
            "invoice {} ({}) keeps gross {}",
            reference,
            invoice.status,
            Money::from_cents(invoice.gross_cents)
        );
        entry.details = Some(match entry.details.take() {
            Some(details) => format!("{details}; {note}"),
            None => note,
        });
        Ok(())
    }

    fn publish_total(&self, request_id: &str, total_cents: i64) {
        self.ctx.publish(
            BUDGET_UPDATED,
            json!({ "request_id": request_id, "total_cents": total_cents }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dispatcher, new_request, technician, Harness};
    use crate::ErrorCode;
    use fieldops_core::{BudgetCategory, Quantity, RequestStatus, StatusChange};

    fn line(description: &str, quantity: i64, unit_price_cents: i64) -> NewBudgetItem {
        NewBudgetItem {
            description: description.to_string(),
            quantity: Quantity::units(quantity),
            unit_price_cents,
            category: BudgetCategory::Material,
        }
    }

    async fn setup() -> (Harness, String) {
        let h = Harness::new().await.unwrap();
        let request = h
            .engine
            .requests()
            .create(new_request(), &dispatcher())
            .await
            .unwrap();
        (h, request.id)
    }

    #[tokio::test]
    async fn test_total_follows_items() {
        let (h, id) = setup().await;
        let budget = h.engine.budget();

        let filter = budget
            .add_item(&id, line("Air filter", 2, 4_550), &technician())
            .await
            .unwrap();
        assert_eq!(filter.total_cents, 9_100);
        budget
            .add_item(&id, line("Labor hour", 3, 12_000), &technician())
            .await
            .unwrap();

        assert_eq!(budget.total(&id).await.unwrap(), Money::from_cents(45_100));
        let stored = h.engine.requests().get(&id).await.unwrap();
        assert_eq!(stored.budget_total_cents, 45_100);

        let remaining = budget.remove_item(&id, &filter.id, &technician()).await.unwrap();
        assert_eq!(remaining, Money::from_cents(36_000));
        assert_eq!(budget.items(&id).await.unwrap().len(), 1);

        let event = h.events.last(BUDGET_UPDATED).unwrap();
        assert_eq!(event.payload["total_cents"], 36_000);

        let history = h.engine.requests().history(&id).await.unwrap();
        assert_eq!(history[0].action, "Budget item removed");
        assert_eq!(history[1].details.as_deref(), Some("Labor hour x3"));
    }

    #[tokio::test]
    async fn test_invalid_lines_are_rejected() {
        let (h, id) = setup().await;
        let budget = h.engine.budget();

        let err = budget
            .add_item(&id, line("Air filter", 0, 4_550), &technician())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = budget
            .add_item(&id, line("  ", 1, 4_550), &technician())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        assert!(budget.items(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_item_and_request() {
        let (h, id) = setup().await;
        let budget = h.engine.budget();

        let err = budget.remove_item(&id, "nope", &technician()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = budget
            .add_item("missing", line("Air filter", 1, 100), &technician())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_approve_needs_positive_total() {
        let (h, id) = setup().await;
        let budget = h.engine.budget();

        let err = budget.approve(&id, &dispatcher()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        budget
            .add_item(&id, line("Gas recharge", 1, 38_000), &technician())
            .await
            .unwrap();
        budget.approve(&id, &dispatcher()).await.unwrap();

        let stored = h.engine.requests().get(&id).await.unwrap();
        assert!(stored.budget_approved);
    }

    #[tokio::test]
    async fn test_terminal_request_still_accepts_lines() {
        let (h, id) = setup().await;
        h.engine
            .requests()
            .update_status(&id, StatusChange::to(RequestStatus::Cancelled), &dispatcher())
            .await
            .unwrap();

        let budget = h.engine.budget();
        let item = budget
            .add_item(&id, line("Air filter", 1, 100), &technician())
            .await
            .unwrap();
        assert_eq!(budget.total(&id).await.unwrap(), Money::from_cents(100));

        let remaining = budget.remove_item(&id, &item.id, &technician()).await.unwrap();
        assert!(remaining.is_zero());
    }

    #[tokio::test]
    async fn test_fractional_quantity() {
        let (h, id) = setup().await;
        let tubing = NewBudgetItem {
            quantity: Quantity::from_milli(2_500),
            ..line("Copper tubing (metre)", 0, 4_500)
        };

        let item = h.engine.budget().add_item(&id, tubing, &technician()).await.unwrap();
        assert_eq!(item.total_cents, 11_250);
        assert_eq!(item.quantity, Quantity::from_milli(2_500));

        let history = h.engine.requests().history(&id).await.unwrap();
        assert_eq!(history[0].details.as_deref(), Some("Copper tubing (metre) x2.5"));
    }

    #[tokio::test]
    async fn test_change_after_invoicing_is_flagged() {
        let h = Harness::new().await.unwrap().with_fiscal_config().await.unwrap();
        let id = h
            .engine
            .requests()
            .create(new_request(), &dispatcher())
            .await
            .unwrap()
            .id;
        let budget = h.engine.budget();
        budget
            .add_item(&id, line("Gas recharge", 1, 38_000), &technician())
            .await
            .unwrap();
        h.engine
            .requests()
            .assign(&id, "tech-1", "Carlos Lima", &dispatcher())
            .await
            .unwrap();
        for status in [RequestStatus::InProgress, RequestStatus::Completed] {
            h.engine
                .requests()
                .update_status(&id, StatusChange::to(status), &technician())
                .await
                .unwrap();
        }
        let issued = h.engine.invoices().issue(&id, &dispatcher()).await.unwrap();
        issued.emission.await.unwrap();

        budget
            .add_item(&id, line("Extra trip", 1, 3_000), &technician())
            .await
            .unwrap();

        let history = h.engine.requests().history(&id).await.unwrap();
        assert_eq!(history[0].action, "Budget item added");
        assert_eq!(
            history[0].details.as_deref(),
            Some("Extra trip x1; invoice 2026000001 (issued) keeps gross R$ 380,00")
        );
        assert_eq!(budget.total(&id).await.unwrap(), Money::from_cents(41_000));
    }

    #[tokio::test]
    async fn test_suggestions_are_priced() {
        let h = Harness::new().await.unwrap();
        let catalog = h.engine.budget().suggestions();
        assert!(!catalog.is_empty());
        assert!(catalog.iter().all(|s| s.suggested_price.is_positive()));
    }
}
