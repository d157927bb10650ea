//! Settlement transfer domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExpenseRecord;

/// A proposed direct payment from a debtor to a creditor.
///
/// `amount` is always a positive whole currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTransfer {
    pub from_user_name: String,
    pub to_user_name: String,
    pub amount: Decimal,
}

impl SettlementTransfer {
    pub fn new(
        from_user_name: impl Into<String>,
        to_user_name: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            from_user_name: from_user_name.into(),
            to_user_name: to_user_name.into(),
            amount,
        }
    }
}

/// An expense a plan was computed from, as it was at preview time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSource {
    pub expense_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl PlanSource {
    pub fn of(expense: &ExpenseRecord) -> Self {
        Self {
            expense_id: expense.id,
            updated_at: expense.updated_at,
        }
    }

    /// True if `expense` is this source, unchanged since the preview
    pub fn matches(&self, expense: &ExpenseRecord) -> bool {
        self.expense_id == expense.id && self.updated_at == expense.updated_at
    }
}

/// Preview of a settlement: the transfers and how many records
/// executing them would write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub transfers: Vec<SettlementTransfer>,
    pub record_count: usize,
    pub total: Decimal,
    /// Records the balances were computed from
    #[serde(default)]
    pub sources: Vec<PlanSource>,
}

impl SettlementPlan {
    pub fn new(transfers: Vec<SettlementTransfer>) -> Self {
        let total = transfers
            .iter()
            .fold(Decimal::ZERO, |acc, t| acc.saturating_add(t.amount));
        Self {
            record_count: transfers.len(),
            transfers,
            total,
            sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<PlanSource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}
