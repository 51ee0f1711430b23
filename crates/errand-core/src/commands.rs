mod modifiers;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};

use crate::calendar::CalendarBridge;
use crate::cli::Invocation;
use crate::config::Config;
use crate::filter::Filter;
use crate::reminder::{days_until, evaluate, summarize};
use crate::render::Renderer;
use crate::store::TaskStore;
use crate::task::{NewTask, Status, TaskId};
use crate::tracker::Tracker;

use self::modifiers::{ModContext, apply_to_new, build_patch, parse_words_and_mods};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "info",
        "start",
        "done",
        "pending",
        "advance",
        "edit",
        "delete",
        "schedule",
        "unschedule",
        "remind",
        "stats",
        "clear",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Clock and calendar date every command in one invocation agrees on.
#[derive(Debug, Clone, Copy)]
struct Now {
    at: DateTime<Utc>,
    tz: Tz,
    today: NaiveDate,
}

impl Now {
    fn new(cfg: &Config) -> anyhow::Result<Self> {
        let at = Utc::now();
        let tz = cfg.timezone()?;
        Ok(Self {
            at,
            tz,
            today: at.with_timezone(&tz).date_naive(),
        })
    }

    fn mod_context(self) -> ModContext {
        ModContext {
            now: self.at,
            tz: self.tz,
        }
    }
}

#[instrument(skip(store, calendar, cfg, renderer, inv), fields(backend = store.backend_name()))]
pub fn dispatch(
    store: &mut dyn TaskStore,
    calendar: Option<&dyn CalendarBridge>,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Now::new(cfg)?;
    let mut tracker = Tracker::new(store, calendar);
    let command = inv.command.as_str();

    debug!(
        command,
        filter = ?inv.filter_terms,
        args = ?inv.command_args,
        "dispatching command"
    );

    match command {
        "add" => cmd_add(&mut tracker, &inv.command_args, now),
        "list" => cmd_list(&tracker, renderer, &inv, now),
        "info" => cmd_info(&tracker, renderer, &inv.ids()?, now),
        "start" => cmd_set_status(&mut tracker, &inv.ids()?, Status::InProgress),
        "done" => cmd_set_status(&mut tracker, &inv.ids()?, Status::Completed),
        "pending" => cmd_set_status(&mut tracker, &inv.ids()?, Status::Pending),
        "advance" => cmd_advance(&mut tracker, &inv.ids()?),
        "edit" => cmd_edit(&mut tracker, &inv.ids()?, &inv.command_args, now),
        "delete" => cmd_delete(&mut tracker, &inv.ids()?),
        "schedule" => cmd_schedule(&mut tracker, &inv.ids()?),
        "unschedule" => cmd_unschedule(&mut tracker, &inv.ids()?),
        "remind" => cmd_remind(&tracker, renderer, &inv.ids()?, now),
        "stats" => cmd_stats(&tracker, renderer, now),
        "clear" => cmd_clear(&mut tracker),
        "_commands" => cmd_commands(),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn require_ids(command: &str, ids: &[TaskId]) -> anyhow::Result<()> {
    if ids.is_empty() {
        return Err(anyhow!("{command} requires at least one task id"));
    }
    Ok(())
}

#[instrument(skip(tracker, args, now))]
fn cmd_add(tracker: &mut Tracker<'_>, args: &[String], now: Now) -> anyhow::Result<()> {
    info!("command add");

    let (title, mods) = parse_words_and_mods(args, now.mod_context())?;
    if title.trim().is_empty() {
        return Err(anyhow!("add: a task title is required"));
    }

    let mut new = NewTask::titled(title);
    let (remind, unresolved) = apply_to_new(&mut new, &mods);
    if let Some(text) = unresolved {
        warn!(phrase = %text, "due phrase not understood");
        eprintln!("warning: could not understand due date '{text}'; task has no due date");
    }

    let outcome = tracker.add(new, remind)?;
    if let Some(err) = &outcome.calendar_warning {
        eprintln!("warning: calendar reminder was not created: {err}");
    }

    println!("Created task {}.", outcome.task.id);
    if outcome.task.calendar_event_id.is_some() {
        println!("Calendar reminder scheduled.");
    }
    Ok(())
}

#[instrument(skip(tracker, renderer, inv, now))]
fn cmd_list(
    tracker: &Tracker<'_>,
    renderer: &mut Renderer,
    inv: &Invocation,
    now: Now,
) -> anyhow::Result<()> {
    info!("command list");

    let terms: Vec<String> = inv
        .filter_terms
        .iter()
        .chain(inv.command_args.iter())
        .cloned()
        .collect();
    let filter = Filter::parse(&terms)?;

    let pending = tracker.list(Some(Status::Pending))?;
    renderer.print_reminders(&evaluate(&pending, now.today))?;

    let shown: Vec<_> = tracker
        .list(filter.status())?
        .into_iter()
        .filter(|task| filter.matches(task, now.today))
        .collect();
    debug!(shown = shown.len(), "filtered task list");
    renderer.print_task_table(&shown, now.today)
}

#[instrument(skip(tracker, renderer, now))]
fn cmd_info(
    tracker: &Tracker<'_>,
    renderer: &mut Renderer,
    ids: &[TaskId],
    now: Now,
) -> anyhow::Result<()> {
    require_ids("info", ids)?;
    for (idx, id) in ids.iter().enumerate() {
        if idx > 0 {
            println!();
        }
        let task = tracker.get(*id)?;
        renderer.print_task_info(&task, now.today)?;
    }
    Ok(())
}

#[instrument(skip(tracker))]
fn cmd_set_status(tracker: &mut Tracker<'_>, ids: &[TaskId], status: Status) -> anyhow::Result<()> {
    info!(%status, "command set status");
    require_ids(status.as_str(), ids)?;

    for id in ids {
        tracker
            .set_status(*id, status)
            .with_context(|| format!("failed to update task {id}"))?;
    }
    println!("Marked {} task(s) {status}.", ids.len());
    Ok(())
}

#[instrument(skip(tracker))]
fn cmd_advance(tracker: &mut Tracker<'_>, ids: &[TaskId]) -> anyhow::Result<()> {
    info!("command advance");
    require_ids("advance", ids)?;

    for id in ids {
        let status = tracker.advance(*id)?;
        println!("Task {id} is now {status}.");
    }
    Ok(())
}

#[instrument(skip(tracker, args, now))]
fn cmd_edit(
    tracker: &mut Tracker<'_>,
    ids: &[TaskId],
    args: &[String],
    now: Now,
) -> anyhow::Result<()> {
    info!("command edit");
    require_ids("edit", ids)?;

    let (title, mods) = parse_words_and_mods(args, now.mod_context())?;
    let patch = build_patch(&title, &mods)?;
    if patch.is_empty() {
        return Err(anyhow!("edit: nothing to change"));
    }

    for id in ids {
        let outcome = tracker.edit(*id, &patch)?;
        if let Some(err) = &outcome.calendar_warning {
            eprintln!("warning: calendar reminder for task {id} was dropped: {err}");
        }
    }
    println!("Modified {} task(s).", ids.len());
    Ok(())
}

#[instrument(skip(tracker))]
fn cmd_delete(tracker: &mut Tracker<'_>, ids: &[TaskId]) -> anyhow::Result<()> {
    info!("command delete");
    require_ids("delete", ids)?;

    for id in ids {
        tracker.delete(*id)?;
    }
    println!("Deleted {} task(s).", ids.len());
    Ok(())
}

#[instrument(skip(tracker))]
fn cmd_schedule(tracker: &mut Tracker<'_>, ids: &[TaskId]) -> anyhow::Result<()> {
    info!("command schedule");
    require_ids("schedule", ids)?;

    for id in ids {
        tracker.schedule(*id)?;
        println!("Scheduled calendar reminder for task {id}.");
    }
    Ok(())
}

#[instrument(skip(tracker))]
fn cmd_unschedule(tracker: &mut Tracker<'_>, ids: &[TaskId]) -> anyhow::Result<()> {
    info!("command unschedule");
    require_ids("unschedule", ids)?;

    for id in ids {
        let task = tracker.unschedule(*id)?;
        if task.calendar_event_id.is_some() {
            println!("Removed calendar reminder for task {id}.");
        } else {
            println!("Task {id} had no calendar reminder.");
        }
    }
    Ok(())
}

#[instrument(skip(tracker, renderer, now))]
fn cmd_remind(
    tracker: &Tracker<'_>,
    renderer: &mut Renderer,
    ids: &[TaskId],
    now: Now,
) -> anyhow::Result<()> {
    info!("command remind");

    if ids.is_empty() {
        let messages = evaluate(&tracker.list(Some(Status::Pending))?, now.today);
        if messages.is_empty() {
            println!("Nothing overdue or due today.");
        }
        return renderer.print_reminders(&messages);
    }

    for id in ids {
        let task = tracker.get(*id)?;
        match days_until(&task, now.today) {
            None => println!("Task {id} '{}' has no due date.", task.title),
            Some(0) => println!("Task {id} '{}' is due today.", task.title),
            Some(days) if days < 0 => {
                println!("Task {id} '{}' is {} day(s) overdue.", task.title, -days)
            }
            Some(days) => println!("Task {id} '{}' is due in {days} day(s).", task.title),
        }
    }
    Ok(())
}

#[instrument(skip(tracker, renderer, now))]
fn cmd_stats(tracker: &Tracker<'_>, renderer: &mut Renderer, now: Now) -> anyhow::Result<()> {
    info!("command stats");
    let tasks = tracker.list(None)?;
    renderer.print_summary(&summarize(&tasks, now.today))
}

#[instrument(skip(tracker))]
fn cmd_clear(tracker: &mut Tracker<'_>) -> anyhow::Result<()> {
    info!("command clear");
    let removed = tracker.clear_completed()?;
    println!("Removed {} completed task(s).", removed.len());
    Ok(())
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in known_command_names() {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (k, v) in entries {
        let shown = if k.ends_with(".key") || k.ends_with(".token") {
            "********"
        } else {
            v.as_str()
        };
        println!("{k}={shown}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "usage: errand [-v|-q] [--rc key=value] [--errandrc PATH] [--data DIR] [ids...] <command> [args...]

commands:
  add <title> [due:<when>] [pri:<p>] [cat:<c>] [desc:<text>] [remind:no]
  list [status:<s>] [pri:<p>] [cat:<c>] [+OVERDUE] [+TODAY] [+DUE] [+SCHEDULED] [text]
  <ids> info | start | done | pending | advance | delete
  <ids> edit [title words] [due:<when>] [pri:<p>] [cat:<c>] [desc:<text>]
  <ids> schedule | unschedule
  remind            overdue and due-today tasks
  <ids> remind      days until each task is due
  stats | clear | help | version

due phrases: today, tonight, tomorrow at 10am, next_friday, in 3 days, +2w,
             2026-11-02, 2026-11-02 14:30"
    );
    Ok(())
}
