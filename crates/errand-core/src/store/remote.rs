use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, FixedOffset};
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{TaskStore, sort_for_listing};
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::task::{Category, NewTask, Priority, Status, Task, TaskId, TaskPatch};

const DEFAULT_TABLE: &str = "tasks";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub url: String,
    pub api_key: String,
    pub table: String,
}

impl RemoteSettings {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let url = cfg
            .get("remote.url")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("remote backend needs remote.url (or ERRAND_REMOTE_URL)"))?;
        let api_key = cfg
            .get("remote.key")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("remote backend needs remote.key (or ERRAND_REMOTE_KEY)"))?;
        let table = cfg
            .get("remote.table")
            .unwrap_or_else(|| DEFAULT_TABLE.to_string());

        Ok(Self {
            url: url.trim().to_string(),
            api_key: api_key.trim().to_string(),
            table,
        })
    }
}

/// PostgREST client for the `tasks` table (the Supabase REST surface).
#[derive(Debug)]
pub struct RemoteStore {
    client: Client,
    endpoint: Url,
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    title: &'a str,
    description: Option<&'a str>,
    due_at: Option<DateTime<FixedOffset>>,
    priority: Priority,
    status: Status,
    category: Option<Category>,
    calendar_event_id: Option<&'a str>,
}

#[derive(Debug, Default, Serialize)]
struct PatchRow<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<Option<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_at: Option<Option<DateTime<FixedOffset>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<Option<Category>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    calendar_event_id: Option<Option<&'a str>>,
}

impl RemoteStore {
    pub fn new(settings: RemoteSettings) -> anyhow::Result<Self> {
        let endpoint = table_endpoint(&settings.url, &settings.table)?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&settings.api_key)
            .context("remote.key is not a valid header value")?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", settings.api_key))
            .context("remote.key is not a valid header value")?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .context("failed building HTTP client for remote store")?;

        debug!(endpoint = %endpoint, "remote store ready");
        Ok(Self { client, endpoint })
    }

    fn select_url(&self, status: Option<Status>) -> Url {
        list_url(&self.endpoint, status)
    }

    fn by_id_url(&self, id: TaskId) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{id}"))
            .append_pair("select", "*");
        url
    }

    fn patch_row(&self, id: TaskId, row: &PatchRow<'_>) -> StoreResult<Task> {
        let request = self
            .client
            .patch(self.by_id_url(id))
            .header("Prefer", "return=representation")
            .json(row);
        let rows: Vec<Task> = fetch_rows(request)?;
        rows.into_iter().next().ok_or(StoreError::NotFound(id))
    }
}

impl TaskStore for RemoteStore {
    fn backend_name(&self) -> &'static str {
        "remote"
    }

    #[tracing::instrument(skip(self, new), fields(title = %new.title))]
    fn add(&mut self, new: NewTask) -> StoreResult<Task> {
        new.validate()?;

        let row = InsertRow {
            title: new.title.trim(),
            description: new.description.as_deref(),
            due_at: new.due_at,
            priority: new.priority,
            status: new.status,
            category: new.category,
            calendar_event_id: new.calendar_event_id.as_deref(),
        };
        let request = self
            .client
            .post(self.endpoint.clone())
            .header("Prefer", "return=representation")
            .json(&row);

        let rows: Vec<Task> = fetch_rows(request)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Unavailable("insert returned no row".to_string()))
    }

    #[tracing::instrument(skip(self))]
    fn list(&self, status: Option<Status>) -> StoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = fetch_rows(self.client.get(self.select_url(status)))?;
        sort_for_listing(&mut tasks);
        Ok(tasks)
    }

    #[tracing::instrument(skip(self))]
    fn get(&self, id: TaskId) -> StoreResult<Task> {
        let rows: Vec<Task> = fetch_rows(self.client.get(self.by_id_url(id)))?;
        rows.into_iter().next().ok_or(StoreError::NotFound(id))
    }

    #[tracing::instrument(skip(self))]
    fn set_status(&mut self, id: TaskId, status: Status) -> StoreResult<()> {
        let row = PatchRow {
            status: Some(status),
            ..PatchRow::default()
        };
        self.patch_row(id, &row).map(|_| ())
    }

    #[tracing::instrument(skip(self, patch))]
    fn update(&mut self, id: TaskId, patch: &TaskPatch) -> StoreResult<Task> {
        // Validate against the current record so a blank title never reaches
        // the table.
        let mut current = self.get(id)?;
        current.apply_patch(patch)?;

        let row = PatchRow {
            title: patch.title.as_deref().map(str::trim),
            description: patch.description.as_ref().map(|d| d.as_deref()),
            due_at: patch.due_at,
            priority: patch.priority,
            category: patch.category,
            ..PatchRow::default()
        };
        self.patch_row(id, &row)
    }

    #[tracing::instrument(skip(self))]
    fn update_calendar_event_id(
        &mut self,
        id: TaskId,
        event_id: Option<&str>,
    ) -> StoreResult<()> {
        let row = PatchRow {
            calendar_event_id: Some(event_id),
            ..PatchRow::default()
        };
        self.patch_row(id, &row).map(|_| ())
    }

    #[tracing::instrument(skip(self))]
    fn delete(&mut self, id: TaskId) -> StoreResult<()> {
        let request = self
            .client
            .delete(self.by_id_url(id))
            .header("Prefer", "return=representation");
        let rows: Vec<Task> = fetch_rows(request)?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn clear_completed(&mut self) -> StoreResult<Vec<Task>> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("status", &status_filter(Status::Completed))
            .append_pair("select", "*");
        let request = self
            .client
            .delete(url)
            .header("Prefer", "return=representation");
        fetch_rows(request)
    }
}

fn table_endpoint(base: &str, table: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("invalid remote.url: {base}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("remote.url cannot be a base URL: {base}"))?
        .pop_if_empty()
        .extend(["rest", "v1", table]);
    Ok(url)
}

fn list_url(endpoint: &Url, status: Option<Status>) -> Url {
    let mut url = endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("select", "*")
            .append_pair("order", "due_at.asc.nullslast,id.asc");
        if let Some(status) = status {
            query.append_pair("status", &status_filter(status));
        }
    }
    url
}

// Rows written before the rename still carry `done`.
fn status_filter(status: Status) -> String {
    match status {
        Status::Completed => "in.(completed,done)".to_string(),
        other => format!("eq.{}", other.as_str()),
    }
}

fn fetch_rows<T: DeserializeOwned>(request: RequestBuilder) -> StoreResult<Vec<T>> {
    let response = request.send()?;
    decode_rows(check_status(response)?)
}

fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    warn!(status = %status, body = %body, "remote store rejected request");
    Err(StoreError::Unavailable(format!(
        "HTTP {}: {}",
        status.as_u16(),
        body.trim()
    )))
}

fn decode_rows<T: DeserializeOwned>(response: Response) -> StoreResult<Vec<T>> {
    let text = response.text()?;
    parse_rows(&text)
}

fn parse_rows<T: DeserializeOwned>(text: &str) -> StoreResult<Vec<T>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text)
        .map_err(|err| StoreError::Unavailable(format!("unexpected response body: {err}")))
}
