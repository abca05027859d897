use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::repo_types::{SortKey, Task, TaskFilter, TaskRow};

/// Task storage. Every read or write of an existing record is keyed by
/// `(owner_id, id)`; there is deliberately no lookup by id alone.
#[async_trait]
pub trait TaskRepo: Send + Sync {
    async fn list(&self, owner_id: Uuid, filter: &TaskFilter) -> anyhow::Result<Vec<Task>>;
    async fn find(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<Task>>;
    async fn insert(&self, task: &Task) -> anyhow::Result<()>;
    /// Overwrites the stored record if it exists and belongs to `owner_id`.
    async fn replace(&self, owner_id: Uuid, task: &Task) -> anyhow::Result<Option<Task>>;
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<bool>;
}

const TASK_COLUMNS: &str = "id, owner_id, title, content, description, category, priority, status, due_date, extra, created_at, updated_at";

/// Escapes LIKE metacharacters so the term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn order_by(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Newest => " ORDER BY created_at DESC",
        SortKey::Oldest => " ORDER BY created_at ASC",
        SortKey::DueDate => " ORDER BY due_date ASC NULLS LAST, created_at DESC",
        SortKey::Priority => {
            " ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END, created_at DESC"
        }
        SortKey::Title => " ORDER BY lower(coalesce(title, '')) ASC",
    }
}

pub struct PgTaskRepo {
    db: PgPool,
}

impl PgTaskRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskRepo for PgTaskRepo {
    async fn list(&self, owner_id: Uuid, filter: &TaskFilter) -> anyhow::Result<Vec<Task>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = "));
        qb.push_bind(owner_id);

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(category) = filter.category {
            qb.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(priority) = filter.priority {
            qb.push(" AND priority = ").push_bind(priority.as_str());
        }
        if let Some(term) = &filter.search {
            let pattern = like_pattern(term);
            qb.push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR content ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(order_by(filter.sort));

        let rows = qb.build_query_as::<TaskRow>().fetch_all(&self.db).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn find(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn insert(&self, task: &Task) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, owner_id, title, content, description, category, priority,
                               status, due_date, extra, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(task.id)
        .bind(task.owner_id)
        .bind(&task.title)
        .bind(&task.content)
        .bind(&task.description)
        .bind(task.category.as_str())
        .bind(task.priority.as_str())
        .bind(task.status().as_str())
        .bind(task.due_date)
        .bind(sqlx::types::Json(&task.extra))
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn replace(&self, owner_id: Uuid, task: &Task) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            UPDATE tasks
               SET title = $3, content = $4, description = $5, category = $6, priority = $7,
                   status = $8, due_date = $9, extra = $10, updated_at = $11
             WHERE id = $1 AND owner_id = $2
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id)
        .bind(owner_id)
        .bind(&task.title)
        .bind(&task.content)
        .bind(&task.description)
        .bind(task.category.as_str())
        .bind(task.priority.as_str())
        .bind(task.status().as_str())
        .bind(task.due_date)
        .bind(sqlx::types::Json(&task.extra))
        .bind(task.updated_at)
        .fetch_optional(&self.db)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() == 1)
    }
}
