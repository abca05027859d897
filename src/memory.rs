use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::{
        repo::UserRepo,
        repo_types::{NewUser, User},
    },
    error::StoreError,
    tasks::{
        repo::TaskRepo,
        repo_types::{Task, TaskFilter},
    },
};

/// In-process document store for `STORE_BACKEND=memory` and tests.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let email = email.to_lowercase();
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        let email = new.email.to_lowercase();
        if users.values().any(|u| u.email.to_lowercase() == email) {
            return Err(StoreError::Conflict("email"));
        }
        let user = User::from_new(new);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> anyhow::Result<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|u| {
            u.first_name = first_name.to_string();
            u.last_name = last_name.to_string();
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        Ok(users
            .get_mut(&id)
            .map(|u| {
                u.password_hash = password_hash.to_string();
                u.updated_at = OffsetDateTime::now_utc();
            })
            .is_some())
    }

    async fn set_status(
        &self,
        id: Uuid,
        is_active: bool,
        is_locked: bool,
    ) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        Ok(users
            .get_mut(&id)
            .map(|u| {
                u.is_active = is_active;
                u.is_locked = is_locked;
                u.updated_at = OffsetDateTime::now_utc();
            })
            .is_some())
    }

    async fn count(&self) -> anyhow::Result<i64> {
        Ok(self.users.read().await.len() as i64)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TaskRepo for MemoryStore {
    async fn list(&self, owner_id: Uuid, filter: &TaskFilter) -> anyhow::Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| t.owner_id == owner_id && filter.matches(t))
            .cloned()
            .collect();
        filter.sort(&mut out);
        Ok(out)
    }

    async fn find(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id).filter(|t| t.owner_id == owner_id).cloned())
    }

    async fn insert(&self, task: &Task) -> anyhow::Result<()> {
        let mut tasks = self.tasks.write().await;
        anyhow::ensure!(!tasks.contains_key(&task.id), "duplicate task id {}", task.id);
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn replace(&self, owner_id: Uuid, task: &Task) -> anyhow::Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(stored) if stored.owner_id == owner_id => {
                let created_at = stored.created_at;
                *stored = task.clone();
                // identity fields stay as first stored
                stored.owner_id = owner_id;
                stored.created_at = created_at;
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let mut tasks = self.tasks.write().await;
        if tasks.get(&id).is_some_and(|t| t.owner_id == owner_id) {
            tasks.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }
}
