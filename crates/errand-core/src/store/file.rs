use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{TaskStore, sort_for_listing};
use crate::error::{StoreError, StoreResult};
use crate::task::{NewTask, Status, Task, TaskId, TaskPatch};

const TASKS_FILE: &str = "tasks.data";

/// JSON-lines task collection. Every operation re-reads the file and every
/// mutation rewrites it atomically, so the next `list` sees the change.
#[derive(Debug)]
pub struct FileStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|err| StoreError::persistence(&data_dir, err))?;

        let tasks_path = data_dir.join(TASKS_FILE);
        if !tasks_path.exists() {
            fs::write(&tasks_path, "").map_err(|err| StoreError::persistence(&tasks_path, err))?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            "opened file store"
        );

        Ok(Self {
            data_dir,
            tasks_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> StoreResult<Vec<Task>> {
        let file = fs::File::open(&self.tasks_path)
            .map_err(|err| StoreError::persistence(&self.tasks_path, err))?;
        read_tasks(BufReader::new(file), &self.tasks_path)
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save(&self, tasks: &[Task]) -> StoreResult<()> {
        save_jsonl_atomic(&self.tasks_path, tasks)
            .map_err(|err| StoreError::persistence(&self.tasks_path, err))
    }

    pub fn next_id(&self, tasks: &[Task]) -> TaskId {
        tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    fn modify<T>(
        &self,
        id: TaskId,
        change: impl FnOnce(&mut Task) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut tasks = self.load()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let out = change(task)?;
        self.save(&tasks)?;
        Ok(out)
    }
}

impl TaskStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    #[tracing::instrument(skip(self, new), fields(title = %new.title))]
    fn add(&mut self, new: NewTask) -> StoreResult<Task> {
        new.validate()?;

        let mut tasks = self.load()?;
        let task = Task::from_new(self.next_id(&tasks), new, Utc::now());
        tasks.push(task.clone());
        self.save(&tasks)?;

        debug!(id = task.id, count = tasks.len(), "task added");
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    fn list(&self, status: Option<Status>) -> StoreResult<Vec<Task>> {
        let mut tasks = self.load()?;
        if let Some(status) = status {
            tasks.retain(|t| t.status == status);
        }
        sort_for_listing(&mut tasks);
        Ok(tasks)
    }

    #[tracing::instrument(skip(self))]
    fn get(&self, id: TaskId) -> StoreResult<Task> {
        self.load()?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    #[tracing::instrument(skip(self))]
    fn set_status(&mut self, id: TaskId, status: Status) -> StoreResult<()> {
        self.modify(id, |task| {
            task.status = status;
            Ok(())
        })
    }

    #[tracing::instrument(skip(self, patch))]
    fn update(&mut self, id: TaskId, patch: &TaskPatch) -> StoreResult<Task> {
        self.modify(id, |task| {
            task.apply_patch(patch)?;
            Ok(task.clone())
        })
    }

    #[tracing::instrument(skip(self))]
    fn update_calendar_event_id(
        &mut self,
        id: TaskId,
        event_id: Option<&str>,
    ) -> StoreResult<()> {
        self.modify(id, |task| {
            task.calendar_event_id = event_id.map(str::to_string);
            Ok(())
        })
    }

    #[tracing::instrument(skip(self))]
    fn delete(&mut self, id: TaskId) -> StoreResult<()> {
        let mut tasks = self.load()?;
        let idx = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))?;
        tasks.remove(idx);
        self.save(&tasks)
    }

    #[tracing::instrument(skip(self))]
    fn clear_completed(&mut self) -> StoreResult<Vec<Task>> {
        let tasks = self.load()?;
        let before = tasks.len();
        let (removed, kept): (Vec<Task>, Vec<Task>) = tasks
            .into_iter()
            .partition(|t| t.status == Status::Completed);

        if !removed.is_empty() {
            self.save(&kept)?;
        }
        info!(before, after = kept.len(), "cleared completed tasks");
        Ok(removed)
    }
}

/// Serializes a collection in the on-disk line format.
pub fn encode_tasks(tasks: &[Task]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for task in tasks {
        out.push_str(&serde_json::to_string(task)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn decode_tasks(text: &str, source: &Path) -> StoreResult<Vec<Task>> {
    read_tasks(text.as_bytes(), source)
}

fn read_tasks<R: BufRead>(reader: R, source: &Path) -> StoreResult<Vec<Task>> {
    debug!(file = %source.display(), "loading jsonl");

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| StoreError::persistence(source, err))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed).map_err(|err| {
            StoreError::persistence(source, format!("line {}: {err}", idx + 1))
        })?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

// The temp file is removed on drop, so an error anywhere before `persist`
// leaves the previous collection in place.
fn save_jsonl_atomic(path: &Path, tasks: &[Task]) -> std::io::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let payload = encode_tasks(tasks)?;
    temp.write_all(payload.as_bytes())?;
    temp.flush()?;
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
