use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  Duration,
  FixedOffset,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

pub const DEFAULT_TIMEZONE: &str =
  "UTC";

const DEFAULT_DUE_HOUR: u32 = 9;
const EVENING_HOUR: u32 = 18;

pub fn parse_timezone(
  raw: &str
) -> anyhow::Result<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(anyhow!(
      "timezone must not be empty"
    ));
  }

  trimmed.parse::<Tz>().map_err(|err| {
    anyhow!(
      "unknown timezone {trimmed}: \
       {err}"
    )
  })
}

#[must_use]
pub fn format_due(
  dt: DateTime<FixedOffset>
) -> String {
  dt.format("%Y-%m-%d %H:%M")
    .to_string()
}

/// Best-effort reading of a short due phrase such as `tomorrow at 10am`,
/// `next friday` or `2026-11-02 14:30`, interpreted in `tz`.
///
/// Returns `None` for anything outside the supported phrases; callers treat
/// that as "no due date".
#[tracing::instrument(skip(reference, tz), fields(input = text))]
pub fn resolve_due(
  text: &str,
  reference: DateTime<Utc>,
  tz: Tz
) -> Option<DateTime<FixedOffset>> {
  let trimmed = text.trim();
  if trimmed.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(trimmed)
  {
    return Some(dt);
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        trimmed, fmt
      )
    {
      return localize(ndt, tz);
    }
  }

  let phrase = trimmed
    .to_ascii_lowercase()
    .replace('_', " ");
  let phrase = phrase
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ");

  let local_now =
    reference.with_timezone(&tz);

  if phrase == "now" {
    return Some(local_now.fixed_offset());
  }

  let (day_part, clock) =
    split_clock_suffix(&phrase);

  let resolved = match day_part.as_str() {
    | "" => {
      let (hour, minute) = clock?;
      let mut day =
        local_now.date_naive();
      let candidate = day
        .and_hms_opt(hour, minute, 0)?;
      if candidate
        <= local_now.naive_local()
      {
        day = day.succ_opt()?;
      }
      day.and_hms_opt(hour, minute, 0)
    }
    | "tonight" => {
      let (hour, minute) =
        clock.unwrap_or((EVENING_HOUR, 0));
      local_now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
    }
    | day_phrase => {
      let day = resolve_day(
        day_phrase,
        local_now.date_naive()
      )?;
      let (hour, minute) =
        clock.unwrap_or((DEFAULT_DUE_HOUR, 0));
      day.and_hms_opt(hour, minute, 0)
    }
  };

  let Some(naive) = resolved else {
    tracing::debug!(
      phrase = %phrase,
      "due phrase not recognized"
    );
    return None;
  };

  localize(naive, tz)
}

fn resolve_day(
  phrase: &str,
  today: NaiveDate
) -> Option<NaiveDate> {
  match phrase {
    | "today" => return Some(today),
    | "tomorrow" | "tmrw" => {
      return today.succ_opt();
    }
    | "yesterday" => {
      return today.pred_opt();
    }
    | _ => {}
  }

  let weekday_phrase = phrase
    .strip_prefix("next ")
    .or_else(|| {
      phrase.strip_prefix("this ")
    })
    .unwrap_or(phrase);
  if let Some(target) =
    parse_weekday_name(weekday_phrase)
  {
    return Some(next_weekday_date(
      today, target
    ));
  }

  if let Some(offset) =
    parse_relative_offset(phrase)
  {
    return today
      .checked_add_signed(offset);
  }

  NaiveDate::parse_from_str(
    phrase, "%Y-%m-%d"
  )
  .ok()
}

fn localize(
  local_naive: NaiveDateTime,
  tz: Tz
) -> Option<DateTime<FixedOffset>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Some(local_dt.fixed_offset())
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Some(chosen.fixed_offset())
    }
    | LocalResult::None => {
      tracing::warn!(
        local = %local_naive,
        timezone = %tz,
        "local datetime does not exist in timezone"
      );
      None
    }
  }
}

fn split_clock_suffix(
  phrase: &str
) -> (String, Option<(u32, u32)>) {
  let Ok(clock_re) = Regex::new(
    r"^(?P<rest>.*?)\s*(?P<at>\bat\s+)?(?P<hour>\d{1,2})(?::(?P<minute>\d{2}))?\s*(?P<ampm>[ap]m)?$",
  ) else {
    return (phrase.to_string(), None);
  };

  let Some(captures) =
    clock_re.captures(phrase)
  else {
    return (phrase.to_string(), None);
  };

  let has_minute =
    captures.name("minute").is_some();
  let has_ampm =
    captures.name("ampm").is_some();
  let has_at =
    captures.name("at").is_some();
  // A bare number ("in 3", "2026") is not a clock time.
  if !has_minute && !has_ampm && !has_at
  {
    return (phrase.to_string(), None);
  }

  let rest = captures
    .name("rest")
    .map(|m| m.as_str().trim())
    .unwrap_or_default();
  // "2026-10-20" ends in digits; never split an ISO date.
  if rest.ends_with('-') {
    return (phrase.to_string(), None);
  }

  match parse_clock(
    captures.name("hour").map(|m| m.as_str()),
    captures.name("minute").map(|m| m.as_str()),
    captures.name("ampm").map(|m| m.as_str())
  ) {
    | Some(clock) => {
      (rest.to_string(), Some(clock))
    }
    | None => (phrase.to_string(), None)
  }
}

fn parse_clock(
  hour: Option<&str>,
  minute: Option<&str>,
  ampm: Option<&str>
) -> Option<(u32, u32)> {
  let raw_hour =
    hour?.parse::<u32>().ok()?;
  let minute = match minute {
    | Some(raw) => raw.parse::<u32>().ok()?,
    | None => 0
  };
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm) = ampm {
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm {
      | "am" => {
        if raw_hour == 12 {
          0
        } else {
          raw_hour
        }
      }
      | "pm" => {
        if raw_hour == 12 {
          12
        } else {
          raw_hour + 12
        }
      }
      | _ => return None
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  NaiveTime::from_hms_opt(hour, minute, 0)
    .map(|_| (hour, minute))
}

fn parse_relative_offset(
  phrase: &str
) -> Option<Duration> {
  let rel_re = Regex::new(
    r"^(?:in\s+(?P<num>\d+)\s+(?P<unit>days?|weeks?)|\+(?P<short_num>\d+)(?P<short_unit>[dw]))$",
  )
  .ok()?;
  let caps = rel_re.captures(phrase)?;

  let (num, unit) = match (
    caps.name("num"),
    caps.name("short_num")
  ) {
    | (Some(num), _) => {
      (num.as_str(), caps.name("unit")?.as_str())
    }
    | (None, Some(num)) => {
      (num.as_str(), caps.name("short_unit")?.as_str())
    }
    | (None, None) => return None
  };
  let num: i64 = num.parse().ok()?;

  if unit.starts_with('w') {
    Duration::try_weeks(num)
  } else {
    Duration::try_days(num)
  }
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    FixedOffset,
    TimeZone,
    Utc
  };
  use chrono_tz::Tz;

  use super::{
    parse_timezone,
    resolve_due
  };

  // Tuesday.
  fn reference() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn resolve(
    text: &str,
    tz: Tz
  ) -> Option<DateTime<FixedOffset>> {
    resolve_due(text, reference(), tz)
  }

  fn show(
    dt: Option<DateTime<FixedOffset>>
  ) -> String {
    dt.expect("phrase should resolve")
      .to_rfc3339()
  }

  #[test]
  fn resolves_today_and_tomorrow() {
    assert_eq!(
      show(resolve("today", Tz::UTC)),
      "2026-02-17T09:00:00+00:00"
    );
    assert_eq!(
      show(resolve(
        "Tomorrow at 10am",
        Tz::UTC
      )),
      "2026-02-18T10:00:00+00:00"
    );
  }

  #[test]
  fn today_follows_the_target_timezone() {
    let late = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 20, 0, 0
      )
      .single()
      .expect("valid now");
    let kolkata = parse_timezone(
      "Asia/Kolkata"
    )
    .expect("known timezone");
    let due =
      resolve_due("today", late, kolkata);
    assert_eq!(
      show(due),
      "2026-02-18T09:00:00+05:30"
    );
  }

  #[test]
  fn weekday_names_never_mean_today() {
    assert_eq!(
      show(resolve("friday", Tz::UTC)),
      "2026-02-20T09:00:00+00:00"
    );
    assert_eq!(
      show(resolve(
        "next tuesday",
        Tz::UTC
      )),
      "2026-02-24T09:00:00+00:00"
    );
    assert_eq!(
      show(resolve(
        "next_fri 3:15pm",
        Tz::UTC
      )),
      "2026-02-20T15:15:00+00:00"
    );
  }

  #[test]
  fn resolves_explicit_dates() {
    assert_eq!(
      show(resolve(
        "2026-03-01",
        Tz::UTC
      )),
      "2026-03-01T09:00:00+00:00"
    );
    assert_eq!(
      show(resolve(
        "2026-03-01 14:30",
        Tz::UTC
      )),
      "2026-03-01T14:30:00+00:00"
    );
    assert_eq!(
      show(resolve(
        "2026-03-01T08:00:00-05:00",
        Tz::UTC
      )),
      "2026-03-01T08:00:00-05:00"
    );
  }

  #[test]
  fn resolves_relative_offsets() {
    assert_eq!(
      show(resolve(
        "in 3 days",
        Tz::UTC
      )),
      "2026-02-20T09:00:00+00:00"
    );
    assert_eq!(
      show(resolve("+2w", Tz::UTC)),
      "2026-03-03T09:00:00+00:00"
    );
  }

  #[test]
  fn huge_offsets_are_none() {
    assert!(resolve(
      "in 200000000000 days",
      Tz::UTC
    )
    .is_none());
    assert!(resolve(
      "+99999999999999w",
      Tz::UTC
    )
    .is_none());
    assert!(resolve(
      "in 99999999 weeks",
      Tz::UTC
    )
    .is_none());
  }

  #[test]
  fn bare_clock_time_rolls_to_next_day() {
    assert_eq!(
      show(resolve("3pm", Tz::UTC)),
      "2026-02-17T15:00:00+00:00"
    );
    assert_eq!(
      show(resolve("11:00", Tz::UTC)),
      "2026-02-18T11:00:00+00:00"
    );
  }

  #[test]
  fn unrecognized_text_is_none() {
    assert!(resolve("someday", Tz::UTC)
      .is_none());
    assert!(resolve("", Tz::UTC).is_none());
    assert!(resolve(
      "friday at 25:00",
      Tz::UTC
    )
    .is_none());
  }

  #[test]
  fn nonexistent_local_time_is_none() {
    let new_york = parse_timezone(
      "America/New_York"
    )
    .expect("known timezone");
    assert!(resolve(
      "2026-03-08 02:30",
      new_york
    )
    .is_none());
  }

  #[test]
  fn rejects_unknown_timezone() {
    assert!(
      parse_timezone("Mars/Olympus")
        .is_err()
    );
  }
}
