//! Net balance domain model

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::Error;

/// Tolerance below which an amount counts as settled (0.01 currency unit)
pub const EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Net position of one user over all unsettled expenses.
///
/// Positive means the user is owed money, negative means the user owes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: Uuid,
    pub user_name: String,
    pub net_amount: Decimal,
}

impl Balance {
    pub fn new(user_id: Uuid, user_name: impl Into<String>, net_amount: Decimal) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            net_amount,
        }
    }

    pub fn is_creditor(&self) -> bool {
        self.net_amount > EPSILON
    }

    pub fn is_debtor(&self) -> bool {
        self.net_amount < -EPSILON
    }

    pub fn is_settled(&self) -> bool {
        self.net_amount.abs() <= EPSILON
    }
}

/// Which side of an expense a dangling user id was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceRole {
    Payer,
    Beneficiary,
}

impl fmt::Display for ReferenceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceRole::Payer => write!(f, "payer"),
            ReferenceRole::Beneficiary => write!(f, "beneficiary"),
        }
    }
}

/// An expense contribution that was skipped because its user is unknown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingReference {
    pub expense_id: Uuid,
    pub user_id: Uuid,
    pub role: ReferenceRole,
    /// Amount that could not be booked
    pub amount: Decimal,
}

impl fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expense {} references unknown {} {} ({} not booked)",
            self.expense_id, self.role, self.user_id, self.amount
        )
    }
}

/// How the balance fold treats expenses pointing at unknown users
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferencePolicy {
    /// Skip the contribution and report it in the sheet
    #[default]
    Skip,
    /// Fail the whole computation
    Reject,
}

impl FromStr for ReferencePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "reject" | "strict" => Ok(Self::Reject),
            other => Err(Error::Config(format!("unknown reference policy: {other}"))),
        }
    }
}

/// Output of one balance computation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    /// Sorted by net amount, largest creditor first
    pub balances: Vec<Balance>,
    /// Contributions skipped because of unknown user ids
    pub dangling: Vec<DanglingReference>,
}

impl BalanceSheet {
    /// Sum of all net amounts; zero (within tolerance) for a consistent ledger.
    /// Saturates instead of overflowing.
    pub fn total(&self) -> Decimal {
        self.balances
            .iter()
            .fold(Decimal::ZERO, |acc, b| acc.saturating_add(b.net_amount))
    }

    pub fn is_balanced(&self) -> bool {
        self.total().abs() <= EPSILON
    }

    pub fn is_settled(&self) -> bool {
        self.balances.iter().all(Balance::is_settled)
    }

    pub fn get(&self, user_id: Uuid) -> Option<&Balance> {
        self.balances.iter().find(|b| b.user_id == user_id)
    }

    pub fn has_dangling_references(&self) -> bool {
        !self.dangling.is_empty()
    }
}
