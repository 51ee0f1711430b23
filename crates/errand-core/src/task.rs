use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    #[serde(alias = "done")]
    Completed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in-progress",
            Status::Completed => "completed",
        }
    }

    /// Next step of the "progress" action. Completed tasks stay completed.
    pub fn advanced(self) -> Self {
        match self {
            Status::Pending => Status::InProgress,
            Status::InProgress | Status::Completed => Status::Completed,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "todo" => Ok(Status::Pending),
            "in-progress" | "inprogress" | "in_progress" | "started" | "active" => {
                Ok(Status::InProgress)
            }
            "completed" | "complete" | "done" => Ok(Status::Completed),
            other => Err(StoreError::Validation(format!("unknown status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Priority::Low),
            "m" | "med" | "medium" => Ok(Priority::Medium),
            "h" | "high" => Ok(Priority::High),
            "u" | "urgent" => Ok(Priority::Urgent),
            other => Err(StoreError::Validation(format!("unknown priority: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Personal,
    Study,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Work => "work",
            Category::Personal => "personal",
            Category::Study => "study",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => Ok(Category::Work),
            "personal" => Ok(Category::Personal),
            "study" => Ok(Category::Study),
            "other" => Ok(Category::Other),
            other => Err(StoreError::Validation(format!("unknown category: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub due_at: Option<DateTime<FixedOffset>>,

    #[serde(default)]
    pub priority: Priority,

    pub status: Status,

    #[serde(default)]
    pub category: Option<Category>,

    #[serde(default)]
    pub calendar_event_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn from_new(id: TaskId, new: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: new.title.trim().to_string(),
            description: new.description,
            due_at: new.due_at,
            priority: new.priority,
            status: new.status,
            category: new.category,
            calendar_event_id: new.calendar_event_id,
            created_at: now,
        }
    }

    pub fn apply_patch(&mut self, patch: &TaskPatch) -> Result<(), StoreError> {
        if let Some(title) = patch.title.as_deref() {
            validate_title(title)?;
            self.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(due_at) = patch.due_at {
            self.due_at = due_at;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        Ok(())
    }
}

/// Input record for `TaskStore::add`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_at: Option<DateTime<FixedOffset>>,
    pub priority: Priority,
    pub status: Status,
    pub category: Option<Category>,
    pub calendar_event_id: Option<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        validate_title(&self.title)
    }
}

/// Field-wise edit. `None` leaves a field untouched; `Some(None)` clears an
/// optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due_at: Option<Option<DateTime<FixedOffset>>>,
    pub priority: Option<Priority>,
    pub category: Option<Option<Category>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn validate_title(title: &str) -> Result<(), StoreError> {
    if title.trim().is_empty() {
        return Err(StoreError::Validation(
            "task title must not be empty".to_string(),
        ));
    }
    Ok(())
}
