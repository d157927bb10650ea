//! In-memory ledger store
//!
//! Keeps every project in a `HashMap` behind a mutex. Used by tests and by
//! callers that want to run the engine without a database file. Writes can
//! be made to fail on purpose to exercise partial-failure handling.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{ExpenseRecord, ExpenseUpdate, Project, User};
use crate::ports::LedgerStore;

#[derive(Debug, Default)]
struct ProjectData {
    project: Option<Project>,
    users: Vec<User>,
    expenses: Vec<ExpenseRecord>,
}

#[derive(Debug, Default)]
struct State {
    projects: Vec<Uuid>,
    data: HashMap<Uuid, ProjectData>,
    failing_payers: HashSet<Uuid>,
}

/// Ledger store kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `create_expense` whose payer is `payer_id` fail with a
    /// persistence error
    pub fn fail_creates_for_payer(&self, payer_id: Uuid) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_payers.insert(payer_id);
        }
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_payers.clear();
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }
}

impl State {
    fn project_mut(&mut self, project_id: Uuid) -> Result<&mut ProjectData> {
        self.data
            .get_mut(&project_id)
            .ok_or_else(|| Error::not_found(format!("Project {}", project_id)))
    }

    fn project(&self, project_id: Uuid) -> Result<&ProjectData> {
        self.data
            .get(&project_id)
            .ok_or_else(|| Error::not_found(format!("Project {}", project_id)))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_project(&self, project: &Project) -> Result<Uuid> {
        let mut state = self.lock()?;
        if state.data.contains_key(&project.id) {
            return Err(Error::validation(format!("Project {} already exists", project.id)));
        }
        state.projects.push(project.id);
        state.data.insert(
            project.id,
            ProjectData {
                project: Some(project.clone()),
                ..ProjectData::default()
            },
        );
        Ok(project.id)
    }

    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>> {
        let state = self.lock()?;
        Ok(state.data.get(&project_id).and_then(|d| d.project.clone()))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let state = self.lock()?;
        Ok(state
            .projects
            .iter()
            .filter_map(|id| state.data.get(id).and_then(|d| d.project.clone()))
            .collect())
    }

    async fn create_user(&self, project_id: Uuid, user: &User) -> Result<Uuid> {
        let mut state = self.lock()?;
        let data = state.project_mut(project_id)?;
        data.users.push(user.clone());
        Ok(user.id)
    }

    async fn list_users(&self, project_id: Uuid) -> Result<Vec<User>> {
        let state = self.lock()?;
        Ok(state.project(project_id)?.users.clone())
    }

    async fn delete_user(&self, project_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut state = self.lock()?;
        let data = state.project_mut(project_id)?;
        let before = data.users.len();
        data.users.retain(|u| u.id != user_id);
        if data.users.len() == before {
            return Err(Error::not_found(format!("User {}", user_id)));
        }
        Ok(())
    }

    async fn list_expenses(&self, project_id: Uuid) -> Result<Vec<ExpenseRecord>> {
        let state = self.lock()?;
        Ok(state.project(project_id)?.expenses.clone())
    }

    async fn get_expense(
        &self,
        project_id: Uuid,
        expense_id: Uuid,
    ) -> Result<Option<ExpenseRecord>> {
        let state = self.lock()?;
        Ok(state
            .project(project_id)?
            .expenses
            .iter()
            .find(|e| e.id == expense_id)
            .cloned())
    }

    async fn create_expense(&self, project_id: Uuid, expense: &ExpenseRecord) -> Result<Uuid> {
        let mut state = self.lock()?;
        if state.failing_payers.contains(&expense.payer_id) {
            return Err(Error::persistence(format!(
                "write rejected for expense {}",
                expense.id
            )));
        }
        let data = state.project_mut(project_id)?;
        expense.validate()?;
        data.expenses.push(expense.clone());
        Ok(expense.id)
    }

    async fn update_expense(
        &self,
        project_id: Uuid,
        expense_id: Uuid,
        update: &ExpenseUpdate,
    ) -> Result<ExpenseRecord> {
        let mut state = self.lock()?;
        let data = state.project_mut(project_id)?;
        let record = data
            .expenses
            .iter_mut()
            .find(|e| e.id == expense_id)
            .ok_or_else(|| Error::not_found(format!("Expense {}", expense_id)))?;
        update.apply_to(record)?;
        Ok(record.clone())
    }

    async fn delete_expense(&self, project_id: Uuid, expense_id: Uuid) -> Result<()> {
        let mut state = self.lock()?;
        let data = state.project_mut(project_id)?;
        let before = data.expenses.len();
        data.expenses.retain(|e| e.id != expense_id);
        if data.expenses.len() == before {
            return Err(Error::not_found(format!("Expense {}", expense_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::domain::Beneficiary;

    #[tokio::test]
    async fn test_projects_are_isolated() {
        let store = InMemoryLedgerStore::new();
        let first = Project::new("Trip");
        let second = Project::new("Flat");
        store.create_project(&first).await.unwrap();
        store.create_project(&second).await.unwrap();

        store.create_user(first.id, &User::new("Tanaka")).await.unwrap();

        assert_eq!(store.list_users(first.id).await.unwrap().len(), 1);
        assert!(store.list_users(second.id).await.unwrap().is_empty());
        assert_eq!(store.list_projects().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_project_is_not_found() {
        let store = InMemoryLedgerStore::new();
        let err = store.list_users(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = InMemoryLedgerStore::new();
        let project = Project::new("Trip");
        store.create_project(&project).await.unwrap();

        let payer = User::new("Sato");
        let expense = ExpenseRecord::new(
            payer.id,
            vec![Beneficiary::new(Uuid::new_v4(), "Tanaka")],
            Decimal::new(100, 0),
            NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(),
        );

        store.fail_creates_for_payer(payer.id);
        let err = store.create_expense(project.id, &expense).await.unwrap_err();
        assert!(err.is_storage());

        store.clear_failures();
        store.create_expense(project.id, &expense).await.unwrap();
        assert_eq!(store.list_expenses(project.id).await.unwrap().len(), 1);
    }
}
