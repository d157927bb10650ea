//! User domain model

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A participant of a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    pub fn with_id(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Name-to-user lookup used when turning settlement transfers into records.
///
/// A name carried by more than one user is ambiguous and never resolves.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    by_name: HashMap<String, User>,
    ambiguous: HashSet<String>,
}

impl UserDirectory {
    pub fn from_users(users: &[User]) -> Self {
        let mut directory = Self::default();
        for user in users {
            if directory.ambiguous.contains(&user.name) {
                continue;
            }
            if directory.by_name.remove(&user.name).is_some() {
                directory.ambiguous.insert(user.name.clone());
                continue;
            }
            directory.by_name.insert(user.name.clone(), user.clone());
        }
        directory
    }

    /// Look up a user by display name
    pub fn resolve(&self, name: &str) -> Option<&User> {
        self.by_name.get(name)
    }

    pub fn is_ambiguous(&self, name: &str) -> bool {
        self.ambiguous.contains(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
