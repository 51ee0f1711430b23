use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, FixedOffset, TimeDelta};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CalendarError, CalendarResult};

const DEFAULT_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_CALENDAR_ID: &str = "primary";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub trait CalendarBridge {
    /// Creates an entry and returns its opaque event id. `end` defaults to
    /// one hour after `start`.
    fn create(
        &self,
        title: &str,
        description: Option<&str>,
        start: DateTime<FixedOffset>,
        end: Option<DateTime<FixedOffset>>,
    ) -> CalendarResult<String>;

    fn delete(&self, event_id: &str) -> CalendarResult<()>;
}

pub fn event_window(
    start: DateTime<FixedOffset>,
    end: Option<DateTime<FixedOffset>>,
) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
    (start, end.unwrap_or(start + TimeDelta::hours(1)))
}

#[derive(Debug, Serialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: String,
}

#[derive(Debug, Serialize)]
struct EventRequest<'a> {
    summary: &'a str,
    description: &'a str,
    start: EventTime,
    end: EventTime,
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    id: Option<String>,
}

fn event_request<'a>(
    title: &'a str,
    description: Option<&'a str>,
    start: DateTime<FixedOffset>,
    end: Option<DateTime<FixedOffset>>,
) -> EventRequest<'a> {
    let (start, end) = event_window(start, end);
    EventRequest {
        summary: title,
        description: description.unwrap_or_default(),
        start: EventTime {
            date_time: start.to_rfc3339(),
        },
        end: EventTime {
            date_time: end.to_rfc3339(),
        },
    }
}

#[derive(Debug, Clone)]
pub struct GoogleCalendarSettings {
    pub api_base: String,
    pub calendar_id: String,
    pub access_token: String,
}

impl GoogleCalendarSettings {
    /// `Ok(None)` when reminders are switched off.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Option<Self>> {
        if !cfg.get_bool("calendar").unwrap_or(false) {
            return Ok(None);
        }

        let access_token = cfg
            .get("calendar.token")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                anyhow!("calendar is on but calendar.token (or ERRAND_CALENDAR_TOKEN) is unset")
            })?;

        Ok(Some(Self {
            api_base: cfg
                .get("calendar.url")
                .unwrap_or_else(|| DEFAULT_CALENDAR_API.to_string()),
            calendar_id: cfg
                .get("calendar.id")
                .unwrap_or_else(|| DEFAULT_CALENDAR_ID.to_string()),
            access_token: access_token.trim().to_string(),
        }))
    }
}

/// Google Calendar v3 events client using a bearer access token.
#[derive(Debug)]
pub struct GoogleCalendar {
    client: Client,
    settings: GoogleCalendarSettings,
}

impl GoogleCalendar {
    pub fn new(settings: GoogleCalendarSettings) -> anyhow::Result<Self> {
        events_url(&settings.api_base, &settings.calendar_id, None)?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed building HTTP client for calendar")?;

        info!(calendar_id = %settings.calendar_id, "calendar reminders enabled");
        Ok(Self { client, settings })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Option<Self>> {
        GoogleCalendarSettings::from_config(cfg)?
            .map(Self::new)
            .transpose()
    }

    fn url(&self, event_id: Option<&str>) -> CalendarResult<Url> {
        events_url(&self.settings.api_base, &self.settings.calendar_id, event_id)
            .map_err(|err| CalendarError::Config(err.to_string()))
    }
}

impl CalendarBridge for GoogleCalendar {
    #[tracing::instrument(skip(self, description))]
    fn create(
        &self,
        title: &str,
        description: Option<&str>,
        start: DateTime<FixedOffset>,
        end: Option<DateTime<FixedOffset>>,
    ) -> CalendarResult<String> {
        let body = event_request(title, description, start, end);
        let response = self
            .client
            .post(self.url(None)?)
            .bearer_auth(&self.settings.access_token)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = %status, "calendar event create failed");
            return Err(CalendarError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: EventResponse = response.json()?;
        let id = created.id.ok_or(CalendarError::Decode("event id"))?;
        debug!(event_id = %id, "calendar event created");
        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    fn delete(&self, event_id: &str) -> CalendarResult<()> {
        let response = self
            .client
            .delete(self.url(Some(event_id))?)
            .bearer_auth(&self.settings.access_token)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CalendarError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!("calendar event deleted");
        Ok(())
    }
}

fn events_url(base: &str, calendar_id: &str, event_id: Option<&str>) -> anyhow::Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("invalid calendar.url: {base}"))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| anyhow!("calendar.url cannot be a base URL: {base}"))?;
        segments
            .pop_if_empty()
            .extend(["calendars", calendar_id, "events"]);
        if let Some(event_id) = event_id {
            segments.push(event_id);
        }
    }
    Ok(url)
}
