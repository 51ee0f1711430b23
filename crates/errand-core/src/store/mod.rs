//! Task persistence behind one interface.
//!
//! Two backends implement [`TaskStore`]: [`FileStore`] keeps the collection in
//! a JSON-lines file, [`RemoteStore`] talks to a PostgREST `tasks` table. The
//! `backend` config key picks one at startup.

mod file;
mod remote;

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, anyhow};
use tracing::info;

pub use file::{FileStore, decode_tasks, encode_tasks};
pub use remote::{RemoteSettings, RemoteStore};

use crate::config::Config;
use crate::error::StoreResult;
use crate::task::{NewTask, Status, Task, TaskId, TaskPatch};

pub trait TaskStore {
    fn backend_name(&self) -> &'static str;

    fn add(&mut self, new: NewTask) -> StoreResult<Task>;

    /// Snapshot ordered by `due_at` ascending, undated tasks last, ties by id.
    fn list(&self, status: Option<Status>) -> StoreResult<Vec<Task>>;

    fn get(&self, id: TaskId) -> StoreResult<Task>;

    fn set_status(&mut self, id: TaskId, status: Status) -> StoreResult<()>;

    fn update(&mut self, id: TaskId, patch: &TaskPatch) -> StoreResult<Task>;

    fn update_calendar_event_id(&mut self, id: TaskId, event_id: Option<&str>)
    -> StoreResult<()>;

    fn delete(&mut self, id: TaskId) -> StoreResult<()>;

    /// Removes every completed task and returns the removed records.
    fn clear_completed(&mut self) -> StoreResult<Vec<Task>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    File,
    Remote,
}

impl Backend {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let raw = cfg.get("backend").unwrap_or_else(|| "file".to_string());
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" | "local" => Ok(Backend::File),
            "remote" | "supabase" | "postgrest" => Ok(Backend::Remote),
            other => Err(anyhow!("unknown backend: {other} (expected file or remote)")),
        }
    }
}

#[tracing::instrument(skip(cfg, data_dir))]
pub fn open_store(cfg: &Config, data_dir: &Path) -> anyhow::Result<Box<dyn TaskStore>> {
    let backend = Backend::from_config(cfg)?;
    info!(?backend, "opening task store");

    match backend {
        Backend::File => {
            let store = FileStore::open(data_dir).with_context(|| {
                format!("failed to open task file in {}", data_dir.display())
            })?;
            Ok(Box::new(store))
        }
        Backend::Remote => {
            let settings = RemoteSettings::from_config(cfg)?;
            let store = RemoteStore::new(settings).context("failed to set up remote store")?;
            Ok(Box::new(store))
        }
    }
}

pub fn compare_for_listing(a: &Task, b: &Task) -> Ordering {
    match (a.due_at, b.due_at) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(a.id.cmp(&b.id))
}

pub fn sort_for_listing(tasks: &mut [Task]) {
    tasks.sort_by(compare_for_listing);
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, FixedOffset, TimeZone, Utc};

    use super::*;

    fn at(day: u32) -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0)
            .single()
            .expect("valid date")
            .fixed_offset()
    }

    fn task(id: TaskId, due_at: Option<DateTime<FixedOffset>>) -> Task {
        let mut task = Task::from_new(id, NewTask::titled(format!("task {id}")), Utc::now());
        task.due_at = due_at;
        task
    }

    #[test]
    fn undated_tasks_sort_last_and_ties_break_on_id() {
        let mut tasks = vec![
            task(4, None),
            task(3, Some(at(5))),
            task(1, None),
            task(2, Some(at(2))),
            task(5, Some(at(2))),
        ];
        sort_for_listing(&mut tasks);
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 5, 3, 1, 4]);
    }

    #[test]
    fn instants_compare_across_offsets() {
        let east = FixedOffset::east_opt(5 * 3600 + 1800).expect("offset");
        let early = east
            .with_ymd_and_hms(2026, 3, 2, 10, 0, 0)
            .single()
            .expect("valid date");
        let mut tasks = vec![task(1, Some(at(2))), task(2, Some(early))];
        sort_for_listing(&mut tasks);
        assert_eq!(tasks[0].id, 2);
    }
}
