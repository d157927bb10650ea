//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

pub mod balance;
mod expense;
mod project;
pub mod result;
mod settlement;
mod user;

pub use balance::{Balance, BalanceSheet, DanglingReference, ReferencePolicy, ReferenceRole, EPSILON};
pub use expense::{Beneficiary, ExpenseRecord, ExpenseUpdate, SettlementState};
pub use project::Project;
pub use settlement::{PlanSource, SettlementPlan, SettlementTransfer};
pub use user::{User, UserDirectory};
