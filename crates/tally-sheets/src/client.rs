//! Google Sheets v4 implementation of [`SheetMirror`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tally_core::{Cell, Error, Result, RowLocator, SheetMirror, SheetRow, ROW_WIDTH};

use crate::auth::{ServiceAccountTokenProvider, TokenProvider};
use crate::config::SheetsConfig;
use crate::error::to_tally_error;

/// `Tab!A42:L42` → 42. Matches the first row number after the tab separator.
static RANGE_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!(?:[A-Z]+)(\d+)").expect("range row pattern to compile"));

/// Last column written by the mirror (12 columns: A..L).
const LAST_COLUMN: &str = "L";

/// Cell text is stored as sent: no formula evaluation or date/number coercion.
const VALUE_INPUT_OPTION: &str = "RAW";

/// Recover the 1-based row index from an `updatedRange` such as `Transactions!A42:L42`.
///
/// Returns `None` for any other shape.
pub fn parse_updated_range(range: &str) -> Option<RowLocator> {
    let caps = RANGE_ROW.captures(range)?;
    caps.get(1)?.as_str().parse().ok()
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    range: String,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

fn cell_from_json(value: Value) -> Cell {
    match value {
        Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or_else(|| Cell::text(n.to_string())),
        Value::String(s) => Cell::Text(s),
        Value::Bool(b) => Cell::text(if b { "TRUE" } else { "FALSE" }),
        Value::Null => Cell::text(""),
        other => Cell::text(other.to_string()),
    }
}

/// Spreadsheet mirror backed by the Google Sheets API.
pub struct GoogleSheetsClient {
    client: Client,
    config: SheetsConfig,
    tokens: Arc<dyn TokenProvider>,
    /// Numeric id of the tab, cleared when a delete suggests it went stale.
    sheet_id: Mutex<Option<i64>>,
}

impl GoogleSheetsClient {
    /// Create a client authenticating with the configured service account.
    pub fn new(config: SheetsConfig) -> Result<Self> {
        let client = Self::http_client(&config)?;
        let tokens = ServiceAccountTokenProvider::new(
            client.clone(),
            config.client_email.clone(),
            &config.private_key,
            config.token_uri.clone(),
        )?;
        Ok(Self::with_parts(client, config, Arc::new(tokens)))
    }

    /// Create a client with a caller-supplied token source.
    pub fn with_token_provider(config: SheetsConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let client = Self::http_client(&config)?;
        Ok(Self::with_parts(client, config, tokens))
    }

    fn with_parts(client: Client, config: SheetsConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        info!(
            subsystem = "sheets",
            component = "client",
            spreadsheet_id = %config.spreadsheet_id,
            tab = %config.tab,
            "Initializing spreadsheet mirror"
        );
        Self {
            client,
            config,
            tokens,
            sheet_id: Mutex::new(None),
        }
    }

    fn http_client(config: &SheetsConfig) -> Result<Client> {
        Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
    }

    pub fn config(&self) -> &SheetsConfig {
        &self.config
    }

    fn spreadsheet_url(&self) -> String {
        format!(
            "{}/spreadsheets/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.spreadsheet_id
        )
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(),
            urlencoding::encode(&format!("{}!{}", self.config.tab, range))
        )
    }

    async fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.access_token().await?;
        Ok(req.bearer_auth(token))
    }

    /// Issue a request without judging its status.
    async fn dispatch(&self, op: &'static str, req: RequestBuilder) -> Result<Response> {
        let start = Instant::now();
        let response = self
            .authorized(req)
            .await?
            .send()
            .await
            .map_err(|e| Error::Mirror(format!("{} request failed: {}", op, e)))?;

        debug!(
            subsystem = "sheets",
            component = "client",
            op,
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Sheets API call"
        );
        Ok(response)
    }

    async fn send(&self, op: &'static str, req: RequestBuilder) -> Result<Response> {
        let response = self.dispatch(op, req).await?;
        error_for_status(response).await
    }

    /// Internal numeric id of the configured tab, resolved on first use.
    async fn tab_sheet_id(&self) -> Result<i64> {
        let mut cached = self.sheet_id.lock().await;
        if let Some(id) = *cached {
            return Ok(id);
        }

        let url = format!(
            "{}?fields={}",
            self.spreadsheet_url(),
            urlencoding::encode("sheets.properties(sheetId,title)")
        );
        let meta: SpreadsheetMeta = self
            .send("resolve_tab", self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| Error::Mirror(format!("Failed to parse spreadsheet metadata: {}", e)))?;

        let id = meta
            .sheets
            .into_iter()
            .find(|s| s.properties.title == self.config.tab)
            .map(|s| s.properties.sheet_id)
            .ok_or_else(|| {
                Error::Mirror(format!(
                    "tab '{}' not found in spreadsheet {}",
                    self.config.tab, self.config.spreadsheet_id
                ))
            })?;
        debug!(subsystem = "sheets", component = "client", sheet_id = id, "Resolved tab id");
        *cached = Some(id);
        Ok(id)
    }

    async fn forget_tab_sheet_id(&self) {
        *self.sheet_id.lock().await = None;
    }

    fn delete_request(&self, sheet_id: i64, locator: RowLocator) -> RequestBuilder {
        let url = format!("{}:batchUpdate", self.spreadsheet_url());
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": locator.zero_based(),
                        "endIndex": locator.row(),
                    }
                }
            }]
        });
        self.client.post(url).json(&body)
    }
}

async fn error_for_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(to_tally_error(status.as_u16(), &body))
}

#[async_trait]
impl SheetMirror for GoogleSheetsClient {
    async fn append(&self, row: &SheetRow) -> Result<Option<RowLocator>> {
        let url = format!(
            "{}:append?valueInputOption={}",
            self.values_url(&format!("A:{}", LAST_COLUMN)),
            VALUE_INPUT_OPTION
        );
        let body = json!({ "values": [row] });

        let response: AppendResponse = self
            .send("append", self.client.post(url).json(&body))
            .await?
            .json()
            .await
            .map_err(|e| Error::Mirror(format!("Failed to parse append response: {}", e)))?;

        let locator = response
            .updates
            .and_then(|u| u.updated_range)
            .as_deref()
            .and_then(parse_updated_range);
        debug!(
            subsystem = "sheets",
            component = "client",
            op = "append",
            row_locator = ?locator.map(|l| l.row()),
            "Row appended"
        );
        Ok(locator)
    }

    async fn update(&self, locator: RowLocator, row: &SheetRow) -> Result<()> {
        let n = locator.row();
        let range = format!("A{n}:{LAST_COLUMN}{n}");
        let url = format!(
            "{}?valueInputOption={}",
            self.values_url(&range),
            VALUE_INPUT_OPTION
        );
        let body = json!({
            "range": format!("{}!{}", self.config.tab, range),
            "majorDimension": "ROWS",
            "values": [row],
        });

        self.send("update", self.client.put(url).json(&body)).await?;
        Ok(())
    }

    /// Remove the row at `locator`.
    ///
    /// A 400/404 may mean the tab was recreated under a new id, so the cached
    /// id is dropped and the next call looks it up again.
    async fn delete(&self, locator: RowLocator) -> Result<()> {
        let sheet_id = self.tab_sheet_id().await?;
        let response = self
            .dispatch("delete", self.delete_request(sheet_id, locator))
            .await?;

        if matches!(response.status(), StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND) {
            warn!(
                subsystem = "sheets",
                component = "client",
                op = "delete",
                sheet_id,
                row_locator = locator.row(),
                status = response.status().as_u16(),
                "Delete rejected, dropping cached tab id"
            );
            self.forget_tab_sheet_id().await;
        }
        error_for_status(response).await?;
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<(RowLocator, SheetRow)>> {
        let url = format!(
            "{}?majorDimension=ROWS&valueRenderOption=UNFORMATTED_VALUE&dateTimeRenderOption=FORMATTED_STRING",
            self.values_url(&format!("A:{}", LAST_COLUMN))
        );
        let values: ValueRange = self
            .send("read_all", self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| Error::Mirror(format!("Failed to parse values response: {}", e)))?;

        let first_row = parse_updated_range(&values.range)
            .map(|l| l.row())
            .unwrap_or(1);

        let mut rows = Vec::with_capacity(values.values.len());
        for (offset, raw) in values.values.into_iter().enumerate() {
            let cells: Vec<Cell> = raw.into_iter().take(ROW_WIDTH).map(cell_from_json).collect();
            if cells.iter().all(|c| c.as_text().is_empty()) {
                continue;
            }
            let locator = RowLocator::new(first_row + offset as u32)?;
            rows.push((locator, SheetRow::from_cells(cells)));
        }

        debug!(
            subsystem = "sheets",
            component = "client",
            op = "read_all",
            row_count = rows.len(),
            "Mirror rows read"
        );
        Ok(rows)
    }
}
