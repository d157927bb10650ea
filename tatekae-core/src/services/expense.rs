//! Expense service - recording, editing and the settled/unsettled lifecycle

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Beneficiary, ExpenseRecord, ExpenseUpdate, User};
use crate::ports::LedgerStore;

/// Input for recording a new expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub payer_id: Uuid,
    pub beneficiary_ids: Vec<Uuid>,
    pub amount: Decimal,
    pub memo: Option<String>,
    pub date: NaiveDate,
}

/// Expense service for a project's records
pub struct ExpenseService {
    store: Arc<dyn LedgerStore>,
}

impl ExpenseService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Record a new, unsettled expense.
    ///
    /// Payer and beneficiaries must be users of the project. Beneficiary
    /// names are captured from the current user list.
    pub async fn add_expense(&self, project_id: Uuid, input: NewExpense) -> Result<ExpenseRecord> {
        let users = self.users_by_id(project_id).await?;

        ensure_user(&users, input.payer_id, "payer")?;
        let beneficiaries = to_beneficiaries(&users, &input.beneficiary_ids)?;

        let mut record = ExpenseRecord::new(input.payer_id, beneficiaries, input.amount, input.date);
        if let Some(memo) = input.memo.filter(|m| !m.trim().is_empty()) {
            record = record.with_memo(memo);
        }
        record.validate()?;

        self.store.create_expense(project_id, &record).await?;
        Ok(record)
    }

    /// List records, newest date first
    pub async fn list_expenses(&self, project_id: Uuid) -> Result<Vec<ExpenseRecord>> {
        let mut expenses = self.store.list_expenses(project_id).await?;
        expenses.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(expenses)
    }

    pub async fn get_expense(&self, project_id: Uuid, expense_id: Uuid) -> Result<ExpenseRecord> {
        self.store
            .get_expense(project_id, expense_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Expense {}", expense_id)))
    }

    /// Apply a partial edit. Changed payer or beneficiaries must be users of
    /// the project.
    pub async fn edit_expense(
        &self,
        project_id: Uuid,
        expense_id: Uuid,
        update: ExpenseUpdate,
    ) -> Result<ExpenseRecord> {
        if update.is_empty() {
            return self.get_expense(project_id, expense_id).await;
        }

        if update.payer_id.is_some() || update.beneficiaries.is_some() {
            let users = self.users_by_id(project_id).await?;
            if let Some(payer_id) = update.payer_id {
                ensure_user(&users, payer_id, "payer")?;
            }
            if let Some(beneficiaries) = &update.beneficiaries {
                for beneficiary in beneficiaries {
                    ensure_user(&users, beneficiary.user_id, "beneficiary")?;
                }
            }
        }

        self.store
            .update_expense(project_id, expense_id, &update)
            .await
    }

    pub async fn delete_expense(&self, project_id: Uuid, expense_id: Uuid) -> Result<()> {
        self.store.delete_expense(project_id, expense_id).await
    }

    /// Move a record to the given settlement state. Only `settled` and
    /// `updated_at` change.
    pub async fn set_settled(
        &self,
        project_id: Uuid,
        expense_id: Uuid,
        settled: bool,
    ) -> Result<ExpenseRecord> {
        self.store
            .update_expense(project_id, expense_id, &ExpenseUpdate::settled(settled))
            .await
    }

    /// Flip the settled flag of a single record
    pub async fn toggle_settled(&self, project_id: Uuid, expense_id: Uuid) -> Result<ExpenseRecord> {
        let current = self.get_expense(project_id, expense_id).await?;
        self.set_settled(project_id, expense_id, !current.settled)
            .await
    }

    async fn users_by_id(&self, project_id: Uuid) -> Result<HashMap<Uuid, User>> {
        Ok(self
            .store
            .list_users(project_id)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect())
    }
}

fn ensure_user(users: &HashMap<Uuid, User>, user_id: Uuid, role: &str) -> Result<()> {
    if users.contains_key(&user_id) {
        Ok(())
    } else {
        Err(Error::validation(format!("{} {} is not a member of the project", role, user_id)))
    }
}

fn to_beneficiaries(users: &HashMap<Uuid, User>, ids: &[Uuid]) -> Result<Vec<Beneficiary>> {
    ids.iter()
        .map(|id| {
            users
                .get(id)
                .map(|u| Beneficiary::new(u.id, &u.name))
                .ok_or_else(|| {
                    Error::validation(format!("beneficiary {} is not a member of the project", id))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLedgerStore;
    use crate::domain::{Project, SettlementState};

    struct Fixture {
        service: ExpenseService,
        project_id: Uuid,
        users: Vec<User>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let project = Project::new("Trip");
        store.create_project(&project).await.unwrap();
        let users = vec![User::new("Tanaka"), User::new("Sato")];
        for user in &users {
            store.create_user(project.id, user).await.unwrap();
        }
        Fixture {
            service: ExpenseService::new(store),
            project_id: project.id,
            users,
        }
    }

    fn lunch(f: &Fixture) -> NewExpense {
        NewExpense {
            payer_id: f.users[0].id,
            beneficiary_ids: vec![f.users[0].id, f.users[1].id],
            amount: Decimal::new(3000, 0),
            memo: Some("lunch".to_string()),
            date: NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_add_expense_captures_names() {
        let f = fixture().await;
        let record = f.service.add_expense(f.project_id, lunch(&f)).await.unwrap();

        assert_eq!(record.state(), SettlementState::Unsettled);
        assert_eq!(record.beneficiaries[1].user_name, "Sato");
        assert_eq!(record.memo.as_deref(), Some("lunch"));
    }

    #[tokio::test]
    async fn test_add_expense_rejects_unknown_beneficiary() {
        let f = fixture().await;
        let mut input = lunch(&f);
        input.beneficiary_ids.push(Uuid::new_v4());

        let err = f.service.add_expense(f.project_id, input).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(f.service.list_expenses(f.project_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_expense_rejects_non_positive_amount() {
        let f = fixture().await;
        let mut input = lunch(&f);
        input.amount = Decimal::ZERO;

        let err = f.service.add_expense(f.project_id, input).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_toggle_round_trip() {
        let f = fixture().await;
        let record = f.service.add_expense(f.project_id, lunch(&f)).await.unwrap();

        let settled = f.service.toggle_settled(f.project_id, record.id).await.unwrap();
        assert!(settled.settled);
        assert_eq!(settled.amount, record.amount);

        let reopened = f.service.toggle_settled(f.project_id, record.id).await.unwrap();
        assert!(!reopened.settled);
    }

    #[tokio::test]
    async fn test_edit_rejects_unknown_payer() {
        let f = fixture().await;
        let record = f.service.add_expense(f.project_id, lunch(&f)).await.unwrap();

        let update = ExpenseUpdate {
            payer_id: Some(Uuid::new_v4()),
            ..ExpenseUpdate::default()
        };
        let err = f
            .service
            .edit_expense(f.project_id, record.id, update)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let f = fixture().await;
        let mut older = lunch(&f);
        older.date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        f.service.add_expense(f.project_id, older).await.unwrap();
        let newer = f.service.add_expense(f.project_id, lunch(&f)).await.unwrap();

        let listed = f.service.list_expenses(f.project_id).await.unwrap();
        assert_eq!(listed[0].id, newer.id);
    }

    #[tokio::test]
    async fn test_delete_missing_expense_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .delete_expense(f.project_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
