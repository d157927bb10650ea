//! Ledger store port - document store abstraction

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{ExpenseRecord, ExpenseUpdate, Project, User};

/// Persistence of projects, users and expense records.
///
/// Every user and expense lives inside exactly one project. The store is
/// last-write-wins; it does not enforce referential integrity between
/// expenses and users (services do).
///
/// Every project-scoped operation on a project that does not exist fails
/// with [`Error::NotFound`](crate::domain::result::Error::NotFound), never
/// with an empty result.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // === Projects ===

    /// Create a new project
    async fn create_project(&self, project: &Project) -> Result<Uuid>;

    /// Get a project by ID
    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>>;

    /// List all projects, oldest first
    async fn list_projects(&self) -> Result<Vec<Project>>;

    // === Users ===

    /// Add a user to a project
    async fn create_user(&self, project_id: Uuid, user: &User) -> Result<Uuid>;

    /// List the users of a project, in creation order
    async fn list_users(&self, project_id: Uuid) -> Result<Vec<User>>;

    /// Remove a user from a project
    async fn delete_user(&self, project_id: Uuid, user_id: Uuid) -> Result<()>;

    // === Expenses ===

    /// List the expense records of a project (no ordering guarantee)
    async fn list_expenses(&self, project_id: Uuid) -> Result<Vec<ExpenseRecord>>;

    /// Get a single expense record
    async fn get_expense(&self, project_id: Uuid, expense_id: Uuid)
        -> Result<Option<ExpenseRecord>>;

    /// Persist a new expense record, returning its ID
    async fn create_expense(&self, project_id: Uuid, expense: &ExpenseRecord) -> Result<Uuid>;

    /// Apply a partial update; fails with NotFound if the record is missing
    async fn update_expense(
        &self,
        project_id: Uuid,
        expense_id: Uuid,
        update: &ExpenseUpdate,
    ) -> Result<ExpenseRecord>;

    /// Delete an expense record; fails with NotFound if the record is missing
    async fn delete_expense(&self, project_id: Uuid, expense_id: Uuid) -> Result<()>;
}
