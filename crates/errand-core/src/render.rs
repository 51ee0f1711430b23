use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_due;
use crate::reminder::{ReminderKind, ReminderMessage, Summary, due_date, is_overdue};
use crate::task::Task;

const RED: &str = "31";
const YELLOW: &str = "33";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&mut self, tasks: &[Task], today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = ["ID", "Due", "Pri", "Status", "Cat", "Title", "Cal"]
            .into_iter()
            .map(str::to_string)
            .collect();
        let rows = tasks.iter().map(|task| self.task_row(task, today)).collect();

        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        writeln!(
            out,
            "{} task{}",
            tasks.len(),
            if tasks.len() == 1 { "" } else { "s" }
        )?;
        Ok(())
    }

    fn task_row(&self, task: &Task, today: NaiveDate) -> Vec<String> {
        let due = task.due_at.map(format_due).unwrap_or_default();
        let due = if is_overdue(task, today) {
            self.paint(&due, RED)
        } else if due_date(task) == Some(today) {
            self.paint(&due, YELLOW)
        } else {
            due
        };

        vec![
            task.id.to_string(),
            due,
            task.priority.to_string(),
            task.status.to_string(),
            task.category.map(|c| c.to_string()).unwrap_or_default(),
            task.title.clone(),
            if task.calendar_event_id.is_some() {
                "yes".to_string()
            } else {
                String::new()
            },
        ]
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task, today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "status    {}", task.status)?;
        writeln!(out, "priority  {}", task.priority)?;
        if let Some(category) = task.category {
            writeln!(out, "category  {category}")?;
        }
        if let Some(description) = task.description.as_deref() {
            writeln!(out, "desc      {description}")?;
        }
        if let Some(due) = task.due_at {
            let mut line = format_due(due);
            if is_overdue(task, today) {
                line = self.paint(&format!("{line} (overdue)"), RED);
            }
            writeln!(out, "due       {line} {}", due.format("%:z"))?;
        }
        if let Some(event_id) = task.calendar_event_id.as_deref() {
            writeln!(out, "calendar  {event_id}")?;
        }
        writeln!(out, "created   {}", task.created_at.format("%Y%m%dT%H%M%SZ"))?;

        Ok(())
    }

    pub fn print_reminders(&mut self, messages: &[ReminderMessage]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for message in messages {
            let code = match message.kind {
                ReminderKind::Overdue => RED,
                ReminderKind::DueToday => YELLOW,
            };
            writeln!(out, "{}", self.paint(&message.to_string(), code))?;
        }
        if !messages.is_empty() {
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn print_summary(&mut self, summary: &Summary) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let rows = vec![
            vec!["total".to_string(), summary.total.to_string()],
            vec!["pending".to_string(), summary.pending.to_string()],
            vec!["in-progress".to_string(), summary.in_progress.to_string()],
            vec!["completed".to_string(), summary.completed.to_string()],
            vec![
                "overdue".to_string(),
                if summary.overdue > 0 {
                    self.paint(&summary.overdue.to_string(), RED)
                } else {
                    summary.overdue.to_string()
                },
            ],
        ];
        write_table(
            &mut out,
            vec!["Tasks".to_string(), "Count".to_string()],
            rows,
        )
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let last = column_count.saturating_sub(1);
    for (idx, header) in headers.iter().enumerate() {
        if idx < last {
            write!(writer, "{:width$} ", header, width = widths[idx])?;
        } else {
            write!(writer, "{header}")?;
        }
    }
    writeln!(writer)?;

    for (idx, width) in widths.iter().enumerate() {
        write!(writer, "{:-<width$}", "", width = *width)?;
        if idx < last {
            write!(writer, " ")?;
        }
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            write!(writer, "{cell}")?;
            if idx < last {
                let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
                let padding = widths[idx].saturating_sub(visible_width);
                write!(writer, "{} ", " ".repeat(padding))?;
            }
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
