//! Project service

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::Project;
use crate::ports::LedgerStore;

pub struct ProjectService {
    store: Arc<dyn LedgerStore>,
}

impl ProjectService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn create_project(&self, name: &str) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("project name cannot be empty"));
        }
        let project = Project::new(name);
        self.store.create_project(&project).await?;
        Ok(project)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.store.list_projects().await
    }

    pub async fn get_project(&self, project_id: Uuid) -> Result<Project> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Project {}", project_id)))
    }

    /// Resolve a project by id or by name. A name shared by several projects
    /// must be given as an id.
    pub async fn resolve(&self, selector: &str) -> Result<Project> {
        if let Ok(id) = Uuid::parse_str(selector) {
            return self.get_project(id).await;
        }

        let mut matches: Vec<Project> = self
            .store
            .list_projects()
            .await?
            .into_iter()
            .filter(|p| p.name == selector)
            .collect();

        match matches.len() {
            0 => Err(Error::not_found(format!("Project '{}'", selector))),
            1 => Ok(matches.remove(0)),
            n => Err(Error::validation(format!(
                "{} projects are named '{}'; use the project id",
                n, selector
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLedgerStore;

    #[tokio::test]
    async fn test_create_and_resolve() {
        let service = ProjectService::new(Arc::new(InMemoryLedgerStore::new()));
        let project = service.create_project("Okinawa trip").await.unwrap();

        assert_eq!(service.resolve("Okinawa trip").await.unwrap().id, project.id);
        assert_eq!(
            service.resolve(&project.id.to_string()).await.unwrap().name,
            "Okinawa trip"
        );
        assert!(matches!(
            service.resolve("Hokkaido").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ambiguous_name_needs_id() {
        let service = ProjectService::new(Arc::new(InMemoryLedgerStore::new()));
        service.create_project("Flat").await.unwrap();
        service.create_project("Flat").await.unwrap();

        assert!(matches!(
            service.resolve("Flat").await,
            Err(Error::Validation(_))
        ));
        assert_eq!(service.list_projects().await.unwrap().len(), 2);
    }
}
