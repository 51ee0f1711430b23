//! Task operations that span the store and the calendar.
//!
//! The store is authoritative. Calendar calls never abort a store mutation:
//! a failed create is handed back as a warning, and a failed delete while
//! removing a task is logged and dropped.

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::calendar::CalendarBridge;
use crate::error::{CalendarError, StoreResult};
use crate::store::TaskStore;
use crate::task::{NewTask, Status, Task, TaskId, TaskPatch};

#[derive(Debug)]
pub struct AddOutcome {
    pub task: Task,
    pub calendar_warning: Option<CalendarError>,
}

#[derive(Debug)]
pub struct EditOutcome {
    pub task: Task,
    pub calendar_warning: Option<CalendarError>,
}

pub struct Tracker<'a> {
    store: &'a mut dyn TaskStore,
    calendar: Option<&'a dyn CalendarBridge>,
}

impl<'a> Tracker<'a> {
    pub fn new(store: &'a mut dyn TaskStore, calendar: Option<&'a dyn CalendarBridge>) -> Self {
        Self { store, calendar }
    }

    #[tracing::instrument(skip(self, new), fields(title = %new.title))]
    pub fn add(&mut self, mut new: NewTask, remind: bool) -> StoreResult<AddOutcome> {
        new.validate()?;

        let mut calendar_warning = None;
        if remind
            && let (Some(calendar), Some(due)) = (self.calendar, new.due_at)
        {
            match calendar.create(&new.title, new.description.as_deref(), due, None) {
                Ok(event_id) => new.calendar_event_id = Some(event_id),
                Err(err) => {
                    warn!(error = %err, "calendar reminder not created; storing task without it");
                    calendar_warning = Some(err);
                }
            }
        }

        let event_id = new.calendar_event_id.clone();
        match self.store.add(new) {
            Ok(task) => {
                info!(id = task.id, backend = self.store.backend_name(), "task added");
                Ok(AddOutcome {
                    task,
                    calendar_warning,
                })
            }
            Err(err) => {
                if let (Some(calendar), Some(event_id)) = (self.calendar, event_id) {
                    self.discard_event(calendar, &event_id);
                }
                Err(err)
            }
        }
    }

    pub fn list(&self, status: Option<Status>) -> StoreResult<Vec<Task>> {
        self.store.list(status)
    }

    pub fn get(&self, id: TaskId) -> StoreResult<Task> {
        self.store.get(id)
    }

    #[tracing::instrument(skip(self))]
    pub fn set_status(&mut self, id: TaskId, status: Status) -> StoreResult<()> {
        self.store.set_status(id, status)?;
        debug!(id, %status, "status updated");
        Ok(())
    }

    /// pending -> in-progress -> completed.
    #[tracing::instrument(skip(self))]
    pub fn advance(&mut self, id: TaskId) -> StoreResult<Status> {
        let current = self.store.get(id)?;
        let next = current.status.advanced();
        if next != current.status {
            self.store.set_status(id, next)?;
        }
        Ok(next)
    }

    /// Removes the task; its calendar entry is deleted on a best-effort basis.
    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, id: TaskId) -> StoreResult<Task> {
        let task = self.store.get(id)?;
        if let (Some(calendar), Some(event_id)) = (self.calendar, task.calendar_event_id.as_deref())
        {
            self.discard_event(calendar, event_id);
        }
        self.store.delete(id)?;
        info!(id, "task deleted");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch))]
    pub fn edit(&mut self, id: TaskId, patch: &TaskPatch) -> StoreResult<EditOutcome> {
        let before = self.store.get(id)?;
        let mut task = self.store.update(id, patch)?;

        let mut calendar_warning = None;
        let due_changed = task.due_at != before.due_at;
        if due_changed
            && let (Some(calendar), Some(old_event)) =
                (self.calendar, before.calendar_event_id.as_deref())
        {
            self.discard_event(calendar, old_event);

            let new_event = match task.due_at {
                Some(due) => {
                    match calendar.create(&task.title, task.description.as_deref(), due, None) {
                        Ok(event_id) => Some(event_id),
                        Err(err) => {
                            warn!(error = %err, "calendar reminder not moved");
                            calendar_warning = Some(err);
                            None
                        }
                    }
                }
                None => None,
            };
            self.store.update_calendar_event_id(id, new_event.as_deref())?;
            task.calendar_event_id = new_event;
        }

        Ok(EditOutcome {
            task,
            calendar_warning,
        })
    }

    /// Creates a calendar entry for an existing dated task and stores its id.
    #[tracing::instrument(skip(self))]
    pub fn schedule(&mut self, id: TaskId) -> anyhow::Result<Task> {
        let calendar = self
            .calendar
            .ok_or_else(|| anyhow!("calendar reminders are off (set calendar=on)"))?;
        let mut task = self.store.get(id)?;
        let due = task
            .due_at
            .ok_or_else(|| anyhow!("task {id} has no due date to schedule"))?;
        if let Some(existing) = task.calendar_event_id.as_deref() {
            return Err(anyhow!("task {id} already has calendar event {existing}"));
        }

        let event_id = calendar.create(&task.title, task.description.as_deref(), due, None)?;
        if let Err(err) = self.store.update_calendar_event_id(id, Some(&event_id)) {
            self.discard_event(calendar, &event_id);
            return Err(err.into());
        }
        task.calendar_event_id = Some(event_id);
        Ok(task)
    }

    /// Deletes the calendar entry and clears the reference. Unlike task
    /// deletion, a calendar failure here is reported.
    #[tracing::instrument(skip(self))]
    pub fn unschedule(&mut self, id: TaskId) -> anyhow::Result<Task> {
        let mut task = self.store.get(id)?;
        let Some(event_id) = task.calendar_event_id.take() else {
            return Ok(task);
        };
        if let Some(calendar) = self.calendar {
            calendar.delete(&event_id)?;
        } else {
            warn!(id, event_id = %event_id, "calendar off; clearing reference only");
        }
        self.store.update_calendar_event_id(id, None)?;
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_completed(&mut self) -> StoreResult<Vec<Task>> {
        let removed = self.store.clear_completed()?;
        if let Some(calendar) = self.calendar {
            for event_id in removed.iter().filter_map(|t| t.calendar_event_id.as_deref()) {
                self.discard_event(calendar, event_id);
            }
        }
        Ok(removed)
    }

    fn discard_event(&self, calendar: &dyn CalendarBridge, event_id: &str) {
        if let Err(err) = calendar.delete(event_id) {
            warn!(event_id, error = %err, "ignoring calendar delete failure");
        }
    }
}
