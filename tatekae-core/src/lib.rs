//! Tatekae Core - balance and settlement engine for shared expenses
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (User, ExpenseRecord, Balance, SettlementTransfer)
//! - **ports**: Trait definitions for external dependencies (LedgerStore)
//! - **services**: Balance computation, settlement planning and execution
//! - **adapters**: Concrete implementations (DuckDB, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbLedgerStore;
use config::Config;
use ports::LedgerStore;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{
    Balance, BalanceSheet, Beneficiary, ExpenseRecord, ExpenseUpdate, PlanSource, Project,
    ReferencePolicy, SettlementPlan, SettlementTransfer, User, UserDirectory,
};
pub use services::{compute_balances, plan_settlements};

pub const LEDGER_DB_FILE: &str = "tatekae.duckdb";

/// Main context for Tatekae operations
///
/// This is the primary entry point for all business logic. It holds
/// the store, configuration, and all services.
pub struct TatekaeContext {
    pub config: Config,
    pub store: Arc<dyn LedgerStore>,
    pub project_service: ProjectService,
    pub user_service: UserService,
    pub expense_service: ExpenseService,
    pub balance_service: BalanceService,
    pub settlement_service: SettlementService,
}

impl TatekaeContext {
    /// Open the ledger database in `data_dir`, migrating it if needed
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        let store = DuckDbLedgerStore::new(&data_dir.join(LEDGER_DB_FILE))?;
        store.ensure_schema()?;

        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Build the services over any store implementation
    pub fn with_store(config: Config, store: Arc<dyn LedgerStore>) -> Self {
        let project_service = ProjectService::new(Arc::clone(&store));
        let user_service = UserService::new(Arc::clone(&store));
        let expense_service = ExpenseService::new(Arc::clone(&store));
        let balance_service = BalanceService::new(Arc::clone(&store), config.reference_policy);
        let settlement_service = SettlementService::new(
            Arc::clone(&store),
            BalanceService::new(Arc::clone(&store), config.reference_policy),
            SettlementExecutor::new(Arc::clone(&store), config.settlement_memo.clone()),
        );

        Self {
            config,
            store,
            project_service,
            user_service,
            expense_service,
            balance_service,
            settlement_service,
        }
    }
}
