use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    dto::{CreateTaskRequest, TaskQuery, TaskStats, UpdateTaskRequest},
    repo_types::{sanitize_extra, Category, Priority, SortKey, Status, Task, TaskFilter},
};
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const NOT_FOUND: ApiError = ApiError::NotFound("Task");

/// A malformed id cannot name any record, so it is reported as missing.
pub fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| NOT_FOUND)
}

fn parse_opt<T>(field: &str, raw: Option<String>, errors: &mut Vec<String>) -> Option<T>
where
    T: std::str::FromStr,
{
    let raw = raw?;
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
        return None;
    }
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            errors.push(format!("{field} has an unsupported value {raw:?}"));
            None
        }
    }
}

impl TryFrom<TaskQuery> for TaskFilter {
    type Error = ApiError;

    fn try_from(q: TaskQuery) -> Result<Self, Self::Error> {
        let mut errors = Vec::new();
        let status = parse_opt::<Status>("status", q.status, &mut errors);
        let category = parse_opt::<Category>("category", q.category, &mut errors);
        let priority = parse_opt::<Priority>("priority", q.priority, &mut errors);
        let sort = match q.sort.as_deref().map(str::trim) {
            None | Some("") => SortKey::default(),
            Some(raw) => {
                serde_json::from_value(Value::String(raw.to_string())).unwrap_or_else(|_| {
                    errors.push(format!("sort has an unsupported value {raw:?}"));
                    SortKey::default()
                })
            }
        };
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        let search = q
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(TaskFilter {
            status,
            category,
            priority,
            search,
            sort,
        })
    }
}

/// `status` wins; a bare `completed` flag is read as completed/pending.
fn resolve_status(status: Option<Status>, completed: Option<bool>) -> Option<Status> {
    status.or_else(|| {
        completed.map(|done| {
            if done {
                Status::Completed
            } else {
                Status::Pending
            }
        })
    })
}

pub async fn list(state: &AppState, owner_id: Uuid, query: TaskQuery) -> ApiResult<Vec<Task>> {
    let filter = TaskFilter::try_from(query)?;
    let tasks = state.tasks.list(owner_id, &filter).await?;
    debug!(%owner_id, count = tasks.len(), ?filter, "tasks listed");
    Ok(tasks)
}

pub async fn get(state: &AppState, owner_id: Uuid, id: Uuid) -> ApiResult<Task> {
    state.tasks.find(owner_id, id).await?.ok_or(NOT_FOUND)
}

pub async fn create(state: &AppState, owner_id: Uuid, req: CreateTaskRequest) -> ApiResult<Task> {
    let mut task = Task::new(owner_id);
    task.title = req.title;
    task.content = req.content;
    task.description = req.description;
    task.category = req.category.unwrap_or_default();
    task.priority = req.priority.unwrap_or_default();
    task.set_status(resolve_status(req.status, req.completed).unwrap_or_default());
    task.due_date = req.due_date;
    task.extra = sanitize_extra(req.extra);

    state.tasks.insert(&task).await?;
    info!(%owner_id, task_id = %task.id, "task created");
    Ok(task)
}

pub async fn update(
    state: &AppState,
    owner_id: Uuid,
    id: Uuid,
    req: UpdateTaskRequest,
) -> ApiResult<Task> {
    let mut task = get(state, owner_id, id).await?;

    if let Some(title) = req.title {
        task.title = title;
    }
    if let Some(content) = req.content {
        task.content = content;
    }
    if let Some(description) = req.description {
        task.description = description;
    }
    if let Some(category) = req.category {
        task.category = category;
    }
    if let Some(priority) = req.priority {
        task.priority = priority;
    }
    if let Some(status) = resolve_status(req.status, req.completed) {
        task.set_status(status);
    }
    if let Some(due_date) = req.due_date {
        task.due_date = due_date;
    }
    for (key, value) in sanitize_extra(req.extra) {
        if value.is_null() {
            task.extra.remove(&key);
        } else {
            task.extra.insert(key, value);
        }
    }
    task.touch();

    // gone between read and write: same answer as never there
    let saved = state.tasks.replace(owner_id, &task).await?.ok_or(NOT_FOUND)?;
    info!(%owner_id, task_id = %id, "task updated");
    Ok(saved)
}

pub async fn delete(state: &AppState, owner_id: Uuid, id: Uuid) -> ApiResult<()> {
    if !state.tasks.delete(owner_id, id).await? {
        return Err(NOT_FOUND);
    }
    info!(%owner_id, task_id = %id, "task deleted");
    Ok(())
}

pub async fn toggle(state: &AppState, owner_id: Uuid, id: Uuid) -> ApiResult<Task> {
    let mut task = get(state, owner_id, id).await?;
    task.toggle();
    let saved = state.tasks.replace(owner_id, &task).await?.ok_or(NOT_FOUND)?;
    info!(%owner_id, task_id = %id, completed = saved.completed(), "task toggled");
    Ok(saved)
}

pub fn summarize(tasks: &[Task], now: OffsetDateTime) -> TaskStats {
    let by_status: HashMap<Status, usize> = Status::ALL
        .iter()
        .map(|s| (*s, tasks.iter().filter(|t| t.status() == *s).count()))
        .collect();
    let total = tasks.len();
    let completed = by_status[&Status::Completed];

    let mut by_priority: BTreeMap<&'static str, usize> =
        Priority::ALL.iter().map(|p| (p.as_str(), 0)).collect();
    let mut by_category: BTreeMap<&'static str, usize> =
        Category::ALL.iter().map(|c| (c.as_str(), 0)).collect();
    for task in tasks {
        *by_priority.entry(task.priority.as_str()).or_default() += 1;
        *by_category.entry(task.category.as_str()).or_default() += 1;
    }

    let completion_rate = if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as u32
    };

    TaskStats {
        total,
        completed,
        pending: by_status[&Status::Pending],
        in_progress: by_status[&Status::InProgress],
        overdue: tasks.iter().filter(|t| t.is_overdue(now)).count(),
        completion_rate,
        by_priority,
        by_category,
    }
}

pub async fn stats(state: &AppState, owner_id: Uuid) -> ApiResult<TaskStats> {
    let tasks = state.tasks.list(owner_id, &TaskFilter::default()).await?;
    Ok(summarize(&tasks, OffsetDateTime::now_utc()))
}
