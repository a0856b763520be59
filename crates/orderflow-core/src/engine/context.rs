//! External facts gathered before validation.
//!
//! Schedule conflicts and stock shortages are computed by collaborators outside
//! the engine. The engine asks for them right before validating, so the
//! validator itself stays a pure function of its inputs.

use crate::validation::{OrderContext, ScheduleConflict, StockShortage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orderflow_types::Order;
use thiserror::Error;

/// Error reported by a context provider.
#[derive(Debug, Error)]
#[error("Context provider error: {0}")]
pub struct ContextError(pub String);

/// Source of facts about an order that the order itself does not hold.
#[async_trait]
pub trait OrderContextProvider: Send + Sync {
	/// Other bookings overlapping with this order's surgery or technicians.
	async fn schedule_conflicts(&self, order: &Order) -> Result<Vec<ScheduleConflict>, ContextError>;

	/// Equipment lines the stock oracle cannot supply in full.
	async fn stock_shortages(&self, order: &Order) -> Result<Vec<StockShortage>, ContextError>;
}

/// Provider that reports no conflicts and no shortages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopContextProvider;

#[async_trait]
impl OrderContextProvider for NoopContextProvider {
	async fn schedule_conflicts(&self, _order: &Order) -> Result<Vec<ScheduleConflict>, ContextError> {
		Ok(Vec::new())
	}

	async fn stock_shortages(&self, _order: &Order) -> Result<Vec<StockShortage>, ContextError> {
		Ok(Vec::new())
	}
}

/// Asks `provider` for both kinds of facts and assembles the validation context.
pub(crate) async fn gather<'a>(
	provider: &dyn OrderContextProvider,
	order: &'a Order,
	now: DateTime<Utc>,
) -> Result<OrderContext<'a>, ContextError> {
	let (conflicts, shortages) = tokio::try_join!(
		provider.schedule_conflicts(order),
		provider.stock_shortages(order)
	)?;
	Ok(OrderContext::new(order, now)
		.with_schedule_conflicts(conflicts)
		.with_stock_shortages(shortages))
}
