//! Google Sheets v4 REST backend.
//!
//! Uses the `values` endpoints only: one tab per worker, titled with the
//! worker id, inside a single spreadsheet. Authentication is a bearer token
//! supplied by the deployment (service account token refresh is external).

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use vqa_core::sheet::SheetHeader;

use crate::backend::{SheetBackend, SheetHandle};
use crate::error::MirrorError;

/// Public Sheets API endpoint.
pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";

/// Body of a `values.get` response. `values` is absent for an empty range.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

pub struct GoogleSheetsBackend {
    client: reqwest::Client,
    base: Url,
    spreadsheet_id: String,
    access_token: String,
}

impl GoogleSheetsBackend {
    /// * `api_base` - e.g. [`DEFAULT_API_BASE`], or a local emulator URL.
    pub fn new(
        api_base: &str,
        spreadsheet_id: String,
        access_token: String,
    ) -> Result<Self, MirrorError> {
        let base = Url::parse(api_base)
            .map_err(|e| MirrorError::Config(format!("invalid API base '{api_base}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(MirrorError::Config(format!("invalid API base '{api_base}'")));
        }
        if spreadsheet_id.trim().is_empty() {
            return Err(MirrorError::Config("spreadsheet id is empty".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            spreadsheet_id,
            access_token,
        })
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// `{base}/v4/spreadsheets/{id}/values/{range}{suffix}`
    fn values_url(&self, range: &str, suffix: &str) -> Url {
        let last = format!("{range}{suffix}");
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                last.as_str(),
            ]);
        }
        url
    }

    async fn get_values(&self, range: &str, title: &str) -> Result<Vec<Vec<String>>, MirrorError> {
        let response = self
            .client
            .get(self.values_url(range, ""))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let response = ensure_success(response, title).await?;
        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| MirrorError::MalformedResponse(e.to_string()))?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

#[async_trait]
impl SheetBackend for GoogleSheetsBackend {
    async fn open(&self, worker_id: &str) -> Result<SheetHandle, MirrorError> {
        let values = self.get_values(&format!("{}!1:1", quote_title(worker_id)), worker_id).await?;
        let header = values.into_iter().next().unwrap_or_default();
        tracing::debug!(worker_id, columns = header.len(), "Resolved worker sheet");
        Ok(SheetHandle {
            title: worker_id.to_string(),
            header: SheetHeader::new(header),
        })
    }

    async fn fetch_values(&self, sheet: &SheetHandle) -> Result<Vec<Vec<String>>, MirrorError> {
        self.get_values(&quote_title(&sheet.title), &sheet.title).await
    }

    async fn update_row(
        &self,
        sheet: &SheetHandle,
        row_number: usize,
        cells: Vec<String>,
    ) -> Result<(), MirrorError> {
        let range = format!("{}!A{row_number}", quote_title(&sheet.title));
        let mut url = self.values_url(&range, "");
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": [cells] }))
            .send()
            .await?;
        ensure_success(response, &sheet.title).await?;
        Ok(())
    }

    async fn append_row(&self, sheet: &SheetHandle, cells: Vec<String>) -> Result<(), MirrorError> {
        let range = format!("{}!A1", quote_title(&sheet.title));
        let mut url = self.values_url(&range, ":append");
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "majorDimension": "ROWS", "values": [cells] }))
            .send()
            .await?;
        ensure_success(response, &sheet.title).await?;
        Ok(())
    }
}

/// A1-notation sheet reference: `'title'`, with embedded quotes doubled.
fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Map non-2xx responses onto [`MirrorError`].
///
/// The API answers 400 "Unable to parse range" for a missing tab.
async fn ensure_success(
    response: reqwest::Response,
    title: &str,
) -> Result<reqwest::Response, MirrorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(MirrorError::RateLimited);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    if status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST && body.contains("Unable to parse range"))
    {
        return Err(MirrorError::SheetNotFound(title.to_string()));
    }
    Err(MirrorError::Api {
        status: status.as_u16(),
        body,
    })
}
