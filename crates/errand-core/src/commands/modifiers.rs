use chrono::{
  DateTime,
  FixedOffset,
  Utc
};
use chrono_tz::Tz;
use tracing::{
  debug,
  instrument
};

use crate::datetime::resolve_due;
use crate::task::{
  Category,
  NewTask,
  Priority,
  TaskPatch
};

/// A `key:value` token from `add` or
/// `edit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mod {
  Due(Option<DateTime<FixedOffset>>),
  UnresolvedDue(String),
  Priority(Priority),
  Category(Option<Category>),
  Description(Option<String>),
  Remind(bool)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ModContext {
  pub now: DateTime<Utc>,
  pub tz:  Tz
}

/// Splits arguments into free words
/// (the title) and modifiers. Tokens
/// after `--` are always words.
#[instrument(skip(args, ctx))]
pub(crate) fn parse_words_and_mods(
  args: &[String],
  ctx: ModContext
) -> anyhow::Result<(String, Vec<Mod>)>
{
  let mut words = Vec::new();
  let mut mods = Vec::new();

  let mut literal = false;
  for arg in args {
    if arg == "--" && !literal {
      literal = true;
      continue;
    }

    if !literal
      && let Some(one_mod) =
        parse_one_mod(arg, ctx)?
    {
      debug!(?one_mod, "parsed modifier");
      mods.push(one_mod);
      continue;
    }

    words.push(arg.clone());
  }

  Ok((words.join(" "), mods))
}

fn parse_one_mod(
  tok: &str,
  ctx: ModContext
) -> anyhow::Result<Option<Mod>> {
  let Some((key, value)) =
    tok.split_once(':')
  else {
    return Ok(None);
  };
  let value = value.trim();
  let cleared = value.is_empty()
    || value
      .eq_ignore_ascii_case("none");

  let one_mod = match key
    .to_ascii_lowercase()
    .as_str()
  {
    | "due" if cleared => {
      Mod::Due(None)
    }
    | "due" => {
      match resolve_due(
        value, ctx.now, ctx.tz
      ) {
        | Some(dt) => Mod::Due(Some(dt)),
        | None => Mod::UnresolvedDue(
          value.to_string()
        )
      }
    }
    | "pri" | "priority" => {
      Mod::Priority(value.parse()?)
    }
    | "cat" | "category" if cleared => {
      Mod::Category(None)
    }
    | "cat" | "category" => {
      Mod::Category(Some(value.parse()?))
    }
    | "desc" | "description"
      if cleared =>
    {
      Mod::Description(None)
    }
    | "desc" | "description" => {
      Mod::Description(Some(
        value.to_string()
      ))
    }
    | "remind" => Mod::Remind(
      !matches!(
        value
          .to_ascii_lowercase()
          .as_str(),
        "no" | "off" | "false" | "0"
      )
    ),
    | _ => return Ok(None)
  };

  Ok(Some(one_mod))
}

/// Applies modifiers to a new task and
/// returns whether a calendar reminder
/// is wanted, plus any due phrase that
/// could not be read.
pub(crate) fn apply_to_new(
  new: &mut NewTask,
  mods: &[Mod]
) -> (bool, Option<String>) {
  let mut remind = true;
  let mut unresolved = None;
  for one_mod in mods {
    match one_mod {
      | Mod::Due(due) => {
        new.due_at = *due;
        unresolved = None;
      }
      | Mod::UnresolvedDue(text) => {
        unresolved = Some(text.clone());
      }
      | Mod::Priority(priority) => {
        new.priority = *priority;
      }
      | Mod::Category(category) => {
        new.category = *category;
      }
      | Mod::Description(description) => {
        new.description =
          description.clone();
      }
      | Mod::Remind(flag) => {
        remind = *flag;
      }
    }
  }
  (remind, unresolved)
}

/// Builds an edit from modifiers. A due
/// phrase that cannot be read is an
/// error here, so an edit never clears
/// a date by accident.
pub(crate) fn build_patch(
  title: &str,
  mods: &[Mod]
) -> anyhow::Result<TaskPatch> {
  let mut patch = TaskPatch::default();
  if !title.trim().is_empty() {
    patch.title =
      Some(title.to_string());
  }

  for one_mod in mods {
    match one_mod {
      | Mod::Due(due) => {
        patch.due_at = Some(*due);
      }
      | Mod::UnresolvedDue(text) => {
        anyhow::bail!(
          "could not understand due \
           date: {text}"
        );
      }
      | Mod::Priority(priority) => {
        patch.priority = Some(*priority);
      }
      | Mod::Category(category) => {
        patch.category = Some(*category);
      }
      | Mod::Description(description) => {
        patch.description =
          Some(description.clone());
      }
      | Mod::Remind(_) => {}
    }
  }

  Ok(patch)
}
