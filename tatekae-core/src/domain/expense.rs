//! Expense record domain model and its settled/unsettled lifecycle

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// Amounts must stay below 10^15 currency units
pub const MAX_AMOUNT_DIGITS: u32 = 15;

/// Fractional digits an amount may carry
pub const MAX_AMOUNT_SCALE: u32 = 10;

/// A user who owes an equal share of an expense
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub user_id: Uuid,
    /// Display name captured when the expense was recorded
    pub user_name: String,
}

impl Beneficiary {
    pub fn new(user_id: Uuid, user_name: impl Into<String>) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
        }
    }
}

/// Whether a record still counts toward outstanding balances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementState {
    Unsettled,
    Settled,
}

/// One payment fronted by a payer and split equally among beneficiaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: Uuid,
    pub payer_id: Uuid,
    pub beneficiaries: Vec<Beneficiary>,
    pub amount: Decimal,
    pub memo: Option<String>,
    pub date: NaiveDate,
    pub settled: bool,
    /// Settlement record whose source expenses are not closed out yet.
    /// It keeps counting toward balances until the close-out.
    #[serde(default)]
    pub pending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExpenseRecord {
    /// Create a new, unsettled expense
    pub fn new(
        payer_id: Uuid,
        beneficiaries: Vec<Beneficiary>,
        amount: Decimal,
        date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            payer_id,
            beneficiaries,
            amount,
            memo: None,
            date,
            settled: false,
            pending: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create the record that commits one settlement transfer.
    ///
    /// The debtor pays the creditor, so the record is born settled and is
    /// dated at write time. It stays pending until the expenses it settles
    /// are closed out.
    pub fn settlement(
        debtor_id: Uuid,
        creditor: Beneficiary,
        amount: Decimal,
        memo: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            payer_id: debtor_id,
            beneficiaries: vec![creditor],
            amount,
            memo: Some(memo.into()),
            date: now.date_naive(),
            settled: true,
            pending: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Check the record invariants: positive amount within range, at least
    /// one beneficiary, no beneficiary listed twice.
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(Error::validation(format!(
                "expense {} has non-positive amount {}",
                self.id, self.amount
            )));
        }
        if self.amount >= Decimal::from(10u64.pow(MAX_AMOUNT_DIGITS)) {
            return Err(Error::validation(format!(
                "expense {} amount {} is too large",
                self.id, self.amount
            )));
        }
        if self.amount.normalize().scale() > MAX_AMOUNT_SCALE {
            return Err(Error::validation(format!(
                "expense {} amount {} has more than {} decimal places",
                self.id, self.amount, MAX_AMOUNT_SCALE
            )));
        }
        if self.beneficiaries.is_empty() {
            return Err(Error::validation(format!(
                "expense {} has no beneficiaries",
                self.id
            )));
        }
        let mut seen = HashSet::with_capacity(self.beneficiaries.len());
        for beneficiary in &self.beneficiaries {
            if !seen.insert(beneficiary.user_id) {
                return Err(Error::validation(format!(
                    "expense {} lists beneficiary {} more than once",
                    self.id, beneficiary.user_id
                )));
            }
        }
        Ok(())
    }

    /// Exact share owed by each beneficiary (not rounded).
    ///
    /// `None` when there are no beneficiaries.
    pub fn share_per_beneficiary(&self) -> Option<Decimal> {
        self.amount
            .checked_div(Decimal::from(self.beneficiaries.len() as u64))
    }

    /// True if the user is the payer or one of the beneficiaries
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.payer_id == user_id || self.beneficiaries.iter().any(|b| b.user_id == user_id)
    }

    /// Unsettled records and pending settlement records enter the balance fold
    pub fn counts_toward_balance(&self) -> bool {
        !self.settled || self.pending
    }

    pub fn state(&self) -> SettlementState {
        if self.settled {
            SettlementState::Settled
        } else {
            SettlementState::Unsettled
        }
    }

    pub fn mark_settled(&mut self) {
        self.set_settled(true);
    }

    pub fn mark_unsettled(&mut self) {
        self.set_settled(false);
    }

    /// Flip the settled flag and return the new value
    pub fn toggle_settled(&mut self) -> bool {
        self.set_settled(!self.settled);
        self.settled
    }

    fn set_settled(&mut self, settled: bool) {
        self.settled = settled;
        self.updated_at = Utc::now();
    }
}

/// Partial update of an expense record.
///
/// `None` leaves a field untouched; `memo: Some(None)` clears the memo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beneficiaries: Option<Vec<Beneficiary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<bool>,
}

impl ExpenseUpdate {
    /// Update touching only the settled flag
    pub fn settled(settled: bool) -> Self {
        Self {
            settled: Some(settled),
            ..Self::default()
        }
    }

    /// Close-out after a settlement: settled and no longer pending
    pub fn closed() -> Self {
        Self {
            settled: Some(true),
            pending: Some(false),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.payer_id.is_none()
            && self.beneficiaries.is_none()
            && self.amount.is_none()
            && self.memo.is_none()
            && self.date.is_none()
            && self.settled.is_none()
            && self.pending.is_none()
    }

    /// Apply to a record. The record is left unchanged if the result would
    /// be invalid.
    pub fn apply_to(&self, record: &mut ExpenseRecord) -> Result<()> {
        let mut updated = record.clone();
        if let Some(payer_id) = self.payer_id {
            updated.payer_id = payer_id;
        }
        if let Some(beneficiaries) = &self.beneficiaries {
            updated.beneficiaries = beneficiaries.clone();
        }
        if let Some(amount) = self.amount {
            updated.amount = amount;
        }
        if let Some(memo) = &self.memo {
            updated.memo = memo.clone();
        }
        if let Some(date) = self.date {
            updated.date = date;
        }
        if let Some(settled) = self.settled {
            updated.settled = settled;
        }
        if let Some(pending) = self.pending {
            updated.pending = pending;
        }
        updated.validate()?;
        updated.updated_at = Utc::now();
        *record = updated;
        Ok(())
    }
}
