//! Due-date reminders and dashboard counts.
//!
//! Everything here is a pure function of the task list and a calendar date.
//! A task's due date is the calendar date of `due_at` in the offset it was
//! stored with, so a task due "tomorrow 09:00 +05:30" keeps that local date.

use std::fmt;

use chrono::NaiveDate;

use crate::task::{Status, Task, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Overdue,
    DueToday,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    pub task_id: TaskId,
    pub title: String,
    pub kind: ReminderKind,
    pub due_date: NaiveDate,
}

impl fmt::Display for ReminderMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReminderKind::Overdue => write!(
                f,
                "OVERDUE: {} (due {})",
                self.title,
                self.due_date.format("%Y-%m-%d")
            ),
            ReminderKind::DueToday => write!(f, "TODAY: {} (due today)", self.title),
        }
    }
}

pub fn due_date(task: &Task) -> Option<NaiveDate> {
    task.due_at.map(|due| due.date_naive())
}

pub fn is_overdue(task: &Task, today: NaiveDate) -> bool {
    task.status == Status::Pending && due_date(task).is_some_and(|due| due < today)
}

#[tracing::instrument(skip(tasks), fields(count = tasks.len()))]
pub fn evaluate(tasks: &[Task], today: NaiveDate) -> Vec<ReminderMessage> {
    tasks
        .iter()
        .filter(|task| task.status == Status::Pending)
        .filter_map(|task| {
            let due = due_date(task)?;
            let kind = if due < today {
                ReminderKind::Overdue
            } else if due == today {
                ReminderKind::DueToday
            } else {
                return None;
            };
            Some(ReminderMessage {
                task_id: task.id,
                title: task.title.clone(),
                kind,
                due_date: due,
            })
        })
        .collect()
}

/// Whole days from `today` until the due date; negative once overdue.
pub fn days_until(task: &Task, today: NaiveDate) -> Option<i64> {
    due_date(task).map(|due| (due - today).num_days())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub overdue: usize,
}

pub fn summarize(tasks: &[Task], today: NaiveDate) -> Summary {
    tasks.iter().fold(Summary::default(), |mut acc, task| {
        acc.total += 1;
        match task.status {
            Status::Pending => acc.pending += 1,
            Status::InProgress => acc.in_progress += 1,
            Status::Completed => acc.completed += 1,
        }
        if is_overdue(task, today) {
            acc.overdue += 1;
        }
        acc
    })
}
