//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. The balance and
//! settlement modules also expose the pure computations they are built on.

pub mod balance;
mod expense;
pub mod logging;
pub mod migration;
mod project;
pub mod settlement;
mod user;

pub use balance::{compute_balances, BalanceService};
pub use expense::{ExpenseService, NewExpense};
pub use logging::{EntryPoint, EventCount, LogEntry, LogEvent, LogFilter, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use project::ProjectService;
pub use settlement::{
    plan_settlements, GreedySettlement, SettlementBatchResult, SettlementExecutor,
    SettlementPreview, SettlementReport, SettlementService, SettlementStrategy, TransferOutcome,
    TransferResult, DEFAULT_SETTLEMENT_MEMO,
};
pub use user::UserService;
