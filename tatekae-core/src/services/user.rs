//! User service - project membership

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::User;
use crate::ports::LedgerStore;

pub struct UserService {
    store: Arc<dyn LedgerStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Add a user to a project.
    ///
    /// Names are trimmed and must be unique within the project, since
    /// settlement transfers refer to users by name.
    pub async fn add_user(&self, project_id: Uuid, name: &str) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("user name cannot be empty"));
        }

        let existing = self.store.list_users(project_id).await?;
        if existing.iter().any(|u| u.name == name) {
            return Err(Error::validation(format!("user '{}' already exists", name)));
        }

        let user = User::new(name);
        self.store.create_user(project_id, &user).await?;
        Ok(user)
    }

    pub async fn list_users(&self, project_id: Uuid) -> Result<Vec<User>> {
        self.store.list_users(project_id).await
    }

    /// Find a user by exact name or by id
    pub async fn find_user(&self, project_id: Uuid, selector: &str) -> Result<User> {
        let users = self.store.list_users(project_id).await?;
        let by_id = Uuid::parse_str(selector).ok();

        users
            .into_iter()
            .find(|u| u.name == selector || Some(u.id) == by_id)
            .ok_or_else(|| Error::not_found(format!("User '{}'", selector)))
    }

    /// Remove a user. Refused while any expense names them as payer or
    /// beneficiary.
    pub async fn remove_user(&self, project_id: Uuid, user_id: Uuid) -> Result<()> {
        let referencing = self
            .store
            .list_expenses(project_id)
            .await?
            .iter()
            .filter(|e| e.involves(user_id))
            .count();

        if referencing > 0 {
            return Err(Error::validation(format!(
                "user {} is referenced by {} expense(s)",
                user_id, referencing
            )));
        }

        self.store.delete_user(project_id, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::adapters::memory::InMemoryLedgerStore;
    use crate::domain::{Beneficiary, ExpenseRecord, Project};

    async fn setup() -> (Arc<InMemoryLedgerStore>, UserService, Uuid) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let project = Project::new("Trip");
        store.create_project(&project).await.unwrap();
        let service = UserService::new(store.clone());
        (store, service, project.id)
    }

    #[tokio::test]
    async fn test_add_and_find_user() {
        let (_, service, project_id) = setup().await;
        let user = service.add_user(project_id, "  Tanaka ").await.unwrap();
        assert_eq!(user.name, "Tanaka");

        let found = service.find_user(project_id, "Tanaka").await.unwrap();
        assert_eq!(found.id, user.id);
        let found = service
            .find_user(project_id, &user.id.to_string())
            .await
            .unwrap();
        assert_eq!(found.name, "Tanaka");
    }

    #[tokio::test]
    async fn test_duplicate_and_empty_names_are_rejected() {
        let (_, service, project_id) = setup().await;
        service.add_user(project_id, "Tanaka").await.unwrap();

        assert!(matches!(
            service.add_user(project_id, "Tanaka").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.add_user(project_id, "   ").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_referenced_user_cannot_be_removed() {
        let (store, service, project_id) = setup().await;
        let payer = service.add_user(project_id, "Tanaka").await.unwrap();
        let other = service.add_user(project_id, "Sato").await.unwrap();
        let idle = service.add_user(project_id, "Suzuki").await.unwrap();

        let expense = ExpenseRecord::new(
            payer.id,
            vec![Beneficiary::new(other.id, &other.name)],
            Decimal::new(1000, 0),
            NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(),
        );
        store.create_expense(project_id, &expense).await.unwrap();

        assert!(matches!(
            service.remove_user(project_id, other.id).await,
            Err(Error::Validation(_))
        ));
        service.remove_user(project_id, idle.id).await.unwrap();
        assert_eq!(service.list_users(project_id).await.unwrap().len(), 2);
    }
}
