use chrono::NaiveDate;
use tracing::trace;

use crate::reminder::{
  due_date,
  is_overdue
};
use crate::task::{
  Category,
  Priority,
  Status,
  Task,
  TaskId
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pred {
  Id(TaskId),
  StatusEq(Status),
  PriorityEq(Priority),
  CategoryEq(Category),
  VirtualTag(VirtualTag, bool),
  TextContains(String)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualTag {
  Overdue,
  Today,
  Dated,
  Scheduled
}

/// Conjunction of list terms such as
/// `status:pending pri:high +OVERDUE`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
  preds: Vec<Pred>
}

impl Filter {
  #[tracing::instrument(skip(terms))]
  pub fn parse(
    terms: &[String]
  ) -> anyhow::Result<Self> {
    let mut preds = Vec::new();
    for term in terms {
      match parse_id_list(term) {
        | Some(ids) => preds.extend(
          ids.into_iter().map(Pred::Id)
        ),
        | None => {
          preds.push(parse_atom(term)?)
        }
      }
    }
    Ok(Self {
      preds
    })
  }

  /// A single `status:` term, which the
  /// store can apply itself.
  pub fn status(
    &self
  ) -> Option<Status> {
    let mut statuses =
      self.preds.iter().filter_map(
        |pred| match pred {
          | Pred::StatusEq(status) => {
            Some(*status)
          }
          | _ => None
        }
      );
    let first = statuses.next()?;
    if statuses.all(|s| s == first) {
      Some(first)
    } else {
      None
    }
  }

  pub fn matches(
    &self,
    task: &Task,
    today: NaiveDate
  ) -> bool {
    let ids: Vec<TaskId> = self
      .preds
      .iter()
      .filter_map(|pred| match pred {
        | Pred::Id(id) => Some(*id),
        | _ => None
      })
      .collect();
    if !ids.is_empty()
      && !ids.contains(&task.id)
    {
      return false;
    }

    self
      .preds
      .iter()
      .filter(|pred| {
        !matches!(pred, Pred::Id(_))
      })
      .all(|pred| {
        eval_pred(pred, task, today)
      })
  }
}

/// `3` or `3,5,8`.
fn parse_id_list(
  term: &str
) -> Option<Vec<TaskId>> {
  term
    .split(',')
    .map(|part| {
      part.trim().parse::<TaskId>().ok()
    })
    .collect()
}

fn parse_atom(
  term: &str
) -> anyhow::Result<Pred> {
  if let Some(tag) =
    term.strip_prefix('+')
    && let Some(virtual_tag) =
      parse_virtual_tag(tag)
  {
    return Ok(Pred::VirtualTag(
      virtual_tag,
      true
    ));
  }
  if let Some(tag) =
    term.strip_prefix('-')
    && let Some(virtual_tag) =
      parse_virtual_tag(tag)
  {
    return Ok(Pred::VirtualTag(
      virtual_tag,
      false
    ));
  }
  if let Some((key, value)) =
    term.split_once(':')
  {
    match key
      .to_ascii_lowercase()
      .as_str()
    {
      | "status" => {
        return Ok(Pred::StatusEq(
          value.parse()?
        ));
      }
      | "pri" | "priority" => {
        return Ok(Pred::PriorityEq(
          value.parse()?
        ));
      }
      | "cat" | "category" => {
        return Ok(Pred::CategoryEq(
          value.parse()?
        ));
      }
      | _ => {}
    }
  }

  Ok(Pred::TextContains(
    term.to_string()
  ))
}

fn eval_pred(
  pred: &Pred,
  task: &Task,
  today: NaiveDate
) -> bool {
  let ok = match pred {
    | Pred::Id(id) => task.id == *id,
    | Pred::StatusEq(status) => {
      task.status == *status
    }
    | Pred::PriorityEq(priority) => {
      task.priority == *priority
    }
    | Pred::CategoryEq(category) => {
      task.category == Some(*category)
    }
    | Pred::VirtualTag(tag, wanted) => {
      eval_virtual_tag(*tag, task, today)
        == *wanted
    }
    | Pred::TextContains(text) => {
      let needle =
        text.to_ascii_lowercase();
      task
        .title
        .to_ascii_lowercase()
        .contains(&needle)
        || task
          .description
          .as_deref()
          .is_some_and(|d| {
            d.to_ascii_lowercase()
              .contains(&needle)
          })
    }
  };
  trace!(pred = ?pred, id = task.id, ok, "filter predicate evaluation");
  ok
}

fn eval_virtual_tag(
  virtual_tag: VirtualTag,
  task: &Task,
  today: NaiveDate
) -> bool {
  match virtual_tag {
    | VirtualTag::Overdue => {
      is_overdue(task, today)
    }
    | VirtualTag::Today => {
      due_date(task) == Some(today)
    }
    | VirtualTag::Dated => {
      task.due_at.is_some()
    }
    | VirtualTag::Scheduled => {
      task.calendar_event_id.is_some()
    }
  }
}

fn parse_virtual_tag(
  tag: &str
) -> Option<VirtualTag> {
  match tag {
    | "OVERDUE" => {
      Some(VirtualTag::Overdue)
    }
    | "TODAY" => Some(VirtualTag::Today),
    | "DUE" => Some(VirtualTag::Dated),
    | "SCHEDULED" => {
      Some(VirtualTag::Scheduled)
    }
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    FixedOffset,
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::*;
  use crate::task::NewTask;

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18)
      .expect("valid date")
  }

  fn sample() -> Task {
    let mut task = Task::from_new(
      3,
      NewTask {
        description: Some(
          "quarterly numbers".to_string()
        ),
        priority: Priority::High,
        category: Some(Category::Work),
        ..NewTask::titled("Submit report")
      },
      Utc::now()
    );
    task.due_at = FixedOffset::east_opt(0)
      .expect("offset")
      .with_ymd_and_hms(
        2026, 10, 17, 9, 0, 0
      )
      .single();
    task
  }

  fn terms(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn conjunction_of_fields_and_virtual_tags() {
    let filter = Filter::parse(&terms(&[
      "pri:high",
      "cat:work",
      "+OVERDUE",
      "quarterly"
    ]))
    .expect("parse filter");
    assert!(filter.matches(&sample(), today()));

    let filter = Filter::parse(&terms(&[
      "+TODAY"
    ]))
    .expect("parse filter");
    assert!(!filter.matches(&sample(), today()));

    let filter = Filter::parse(&terms(&[
      "-SCHEDULED"
    ]))
    .expect("parse filter");
    assert!(filter.matches(&sample(), today()));
  }

  #[test]
  fn ids_are_alternatives() {
    let filter =
      Filter::parse(&terms(&["1", "3"]))
        .expect("parse filter");
    assert!(filter.matches(&sample(), today()));
    let filter =
      Filter::parse(&terms(&["1"]))
        .expect("parse filter");
    assert!(!filter.matches(&sample(), today()));
  }

  #[test]
  fn comma_separated_ids_split() {
    let filter =
      Filter::parse(&terms(&["3,5"]))
        .expect("parse filter");
    assert!(filter.matches(&sample(), today()));
    let filter = Filter::parse(&terms(&[
      "1,5", "pri:high"
    ]))
    .expect("parse filter");
    assert!(!filter.matches(&sample(), today()));

    let filter =
      Filter::parse(&terms(&["3,x"]))
        .expect("parse filter");
    assert!(!filter.matches(&sample(), today()));
  }

  #[test]
  fn single_status_is_exposed_for_the_store() {
    let filter = Filter::parse(&terms(&[
      "status:done",
      "pri:low"
    ]))
    .expect("parse filter");
    assert_eq!(
      filter.status(),
      Some(Status::Completed)
    );
    assert!(
      Filter::parse(&terms(&["status:later"]))
        .is_err()
    );
  }
}
