use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

macro_rules! text_enum {
    ($name:ident { $($(#[$attr:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$attr])* #[serde(rename = $text)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => anyhow::bail!("unknown {} {:?}", stringify!($name), other),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(Category {
    Work => "work",
    Personal => "personal",
    Shopping => "shopping",
    Health => "health",
    #[default]
    Other => "other",
    Welcome => "welcome",
});

text_enum!(Priority {
    Low => "low",
    #[default]
    Medium => "medium",
    High => "high",
});

text_enum!(Status {
    #[default]
    Pending => "pending",
    InProgress => "in-progress",
    Completed => "completed",
});

impl Priority {
    /// Higher is more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }
}

/// Keys a client can never set through the open-ended attribute map.
pub const RESERVED_KEYS: &[&str] = &[
    "id",
    "_id",
    "ownerId",
    "owner_id",
    "createdAt",
    "updatedAt",
    "completed",
];

/// Drops reserved keys from client-supplied extra attributes.
pub fn sanitize_extra(mut extra: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_KEYS {
        extra.remove(*key);
    }
    extra
}

/// A task record. `completed` always mirrors `status`; change it only
/// through [`Task::set_status`] or [`Task::toggle`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: Option<String>,
    pub content: Option<String>,
    pub description: Option<String>,
    pub category: Category,
    pub priority: Priority,
    status: Status,
    completed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(owner_id: Uuid) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: None,
            content: None,
            description: None,
            category: Category::default(),
            priority: Priority::default(),
            status: Status::default(),
            completed: false,
            due_date: None,
            created_at: now,
            updated_at: now,
            extra: Map::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
        self.completed = status == Status::Completed;
    }

    /// Two-state flip: completed <-> pending. `in-progress` counts as not done.
    pub fn toggle(&mut self) {
        let next = if self.completed {
            Status::Pending
        } else {
            Status::Completed
        };
        self.set_status(next);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }

    pub fn is_overdue(&self, now: OffsetDateTime) -> bool {
        !self.completed && self.due_date.is_some_and(|d| d < now)
    }
}

/// Row shape in Postgres; enums are stored as text.
#[derive(Debug, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: Option<String>,
    pub content: Option<String>,
    pub description: Option<String>,
    pub category: String,
    pub priority: String,
    pub status: String,
    pub due_date: Option<OffsetDateTime>,
    pub extra: sqlx::types::Json<Map<String, Value>>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<TaskRow> for Task {
    type Error = anyhow::Error;

    fn try_from(r: TaskRow) -> Result<Self, Self::Error> {
        let mut task = Task {
            id: r.id,
            owner_id: r.owner_id,
            title: r.title,
            content: r.content,
            description: r.description,
            category: r.category.parse()?,
            priority: r.priority.parse()?,
            status: Status::Pending,
            completed: false,
            due_date: r.due_date,
            created_at: r.created_at,
            updated_at: r.updated_at,
            extra: r.extra.0,
        };
        task.set_status(r.status.parse()?);
        Ok(task)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    Newest,
    Oldest,
    DueDate,
    Priority,
    Title,
}

/// Caller-supplied list filters. Owner scoping is applied separately by the
/// store and is not part of this struct.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<Status>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
    pub sort: SortKey,
}

impl TaskFilter {
    /// In-process version of the list predicate.
    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|s| s != task.status) {
            return false;
        }
        if self.category.is_some_and(|c| c != task.category) {
            return false;
        }
        if self.priority.is_some_and(|p| p != task.priority) {
            return false;
        }
        match &self.search {
            Some(term) => {
                let needle = term.to_lowercase();
                [&task.title, &task.content, &task.description]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }

    pub fn sort(&self, tasks: &mut [Task]) {
        match self.sort {
            SortKey::Newest => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortKey::Oldest => tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            SortKey::DueDate => tasks.sort_by(|a, b| match (a.due_date, b.due_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => b.created_at.cmp(&a.created_at),
            }),
            SortKey::Priority => tasks.sort_by(|a, b| {
                b.priority
                    .rank()
                    .cmp(&a.priority.rank())
                    .then(b.created_at.cmp(&a.created_at))
            }),
            SortKey::Title => tasks.sort_by(|a, b| {
                let ta = a.title.as_deref().unwrap_or("").to_lowercase();
                let tb = b.title.as_deref().unwrap_or("").to_lowercase();
                ta.cmp(&tb)
            }),
        }
    }
}
