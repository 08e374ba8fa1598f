//! Google Sheets implementation of [ExternalStore]. One spreadsheet holds one worksheet per
//! month.

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::{
    sync::{is_header_row, ExternalStore, Segment, SyncError},
    ReportRow,
};

const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;
const NEW_SEGMENT_ROWS: u32 = 100;
const NEW_SEGMENT_COLUMNS: u32 = 10;

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Timeout
        } else if e.is_decode() {
            SyncError::MalformedResponse(e.to_string())
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

/// OAuth client with a long lived refresh token, as produced by an installed-app consent flow.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    OAUTH_TOKEN_URL.into()
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<Value>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct SheetsSettings {
    pub spreadsheet_name: String,
    pub spreadsheet_id: Option<String>,
    pub credentials: PathBuf,
    pub request_timeout: Duration,
}

pub struct GoogleSheetsStore {
    client: Client,
    settings: SheetsSettings,
    credentials: Option<OAuthCredentials>,
    token: Option<AccessToken>,
    spreadsheet_id: Option<String>,
}

impl GoogleSheetsStore {
    /// Nothing is read or requested until the first operation, so a missing credentials file
    /// only shows up as a [SyncError].
    pub fn new(settings: SheetsSettings) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(settings.request_timeout).build()?;
        Ok(Self {
            client,
            spreadsheet_id: settings.spreadsheet_id.clone(),
            settings,
            credentials: None,
            token: None,
        })
    }

    async fn credentials(&mut self) -> Result<OAuthCredentials, SyncError> {
        if let Some(credentials) = &self.credentials {
            return Ok(credentials.clone());
        }
        let path = &self.settings.credentials;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SyncError::Credentials(format!("can't read {path:?}: {e}")))?;
        let credentials = serde_json::from_slice::<OAuthCredentials>(&bytes)
            .map_err(|e| SyncError::Credentials(format!("invalid {path:?}: {e}")))?;
        self.credentials = Some(credentials.clone());
        Ok(credentials)
    }

    async fn access_token(&mut self) -> Result<String, SyncError> {
        if let Some(token) = &self.token {
            if token.expires_at - TimeDelta::seconds(TOKEN_EXPIRY_MARGIN_SECS) > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let credentials = self.credentials().await?;
        debug!("Refreshing access token");
        let response = self
            .client
            .post(&credentials.token_uri)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::Auth(format_oauth_error(status.as_u16(), &body)));
        }
        let token = serde_json::from_str::<TokenResponse>(&body)
            .map_err(|e| SyncError::MalformedResponse(format!("token response: {e}")))?;

        let value = token.access_token.clone();
        self.token = Some(AccessToken {
            value: token.access_token,
            expires_at: Utc::now() + TimeDelta::seconds(token.expires_in),
        });
        Ok(value)
    }

    async fn send<T: DeserializeOwned>(&mut self, request: RequestBuilder) -> Result<T, SyncError> {
        let token = self.access_token().await?;
        let response = check_status(request.bearer_auth(token).send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    /// Resolves the spreadsheet by name through Drive unless its id was configured.
    async fn spreadsheet_id(&mut self) -> Result<String, SyncError> {
        if let Some(id) = &self.spreadsheet_id {
            return Ok(id.clone());
        }

        let name = self.settings.spreadsheet_name.clone();
        let query = format!(
            "name = '{}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false",
            escape_query_literal(&name)
        );
        let request = self
            .client
            .get(DRIVE_FILES_API)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")]);
        let list: DriveFileList = self.send(request).await?;

        let Some(file) = list.files.into_iter().next() else {
            return Err(SyncError::Api {
                status: 404,
                message: format!(
                    "spreadsheet {name:?} doesn't exist or isn't shared with these credentials"
                ),
            });
        };
        info!("Resolved spreadsheet {name:?} to {}", file.id);
        self.spreadsheet_id = Some(file.id.clone());
        Ok(file.id)
    }

    fn spreadsheet_url(&self, id: &str, tail: &[&str]) -> Result<Url, SyncError> {
        let mut url = Url::parse(SHEETS_API).map_err(|e| SyncError::Transport(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::Transport(format!("{SHEETS_API} can't be a base")))?
            .push(id)
            .extend(tail);
        Ok(url)
    }

    async fn batch_update(&mut self, requests: Vec<Value>) -> Result<BatchUpdateResponse, SyncError> {
        let id = self.spreadsheet_id().await?;
        let url = self.spreadsheet_url(&id, &[])?;
        let url = Url::parse(&format!("{url}:batchUpdate"))
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        let request = self.client.post(url).json(&json!({ "requests": requests }));
        self.send(request).await
    }

    async fn append_values(&mut self, title: &str, values: Vec<Vec<Value>>) -> Result<(), SyncError> {
        let id = self.spreadsheet_id().await?;
        let range = format!("{}:append", segment_range(title));
        let url = self.spreadsheet_url(&id, &["values", &range])?;
        let request = self
            .client
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": values }));
        let _: Value = self.send(request).await?;
        Ok(())
    }

    /// First row of the worksheet as displayed text, empty when the worksheet has no rows.
    async fn first_row(&mut self, title: &str) -> Result<Vec<String>, SyncError> {
        let id = self.spreadsheet_id().await?;
        let url = self.spreadsheet_url(&id, &["values", &header_range(title)])?;
        let request = self.client.get(url);
        let range: ValueRange = self.send(request).await?;
        Ok(range
            .values
            .into_iter()
            .next()
            .map(|row| row.into_iter().map(cell_text).collect())
            .unwrap_or_default())
    }

    /// Makes `header` the first row of the worksheet. Data found in the first row is shifted down
    /// rather than overwritten.
    async fn restore_header(&mut self, segment: &Segment, header: &[&str]) -> Result<(), SyncError> {
        let first = self.first_row(&segment.title).await?;
        if is_header_row(&first, header) {
            return Ok(());
        }
        if first.iter().any(|v| !v.trim().is_empty()) {
            self.batch_update(vec![insert_first_row_request(segment.id)]).await?;
        }

        info!("Writing header of {:?}", segment.title);
        let id = self.spreadsheet_id().await?;
        let url = self.spreadsheet_url(&id, &["values", &header_range(&segment.title)])?;
        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "values": [header] }));
        let _: Value = self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl ExternalStore for GoogleSheetsStore {
    #[instrument(skip(self, header))]
    async fn ensure_segment(&mut self, title: &str, header: &[&str]) -> Result<Segment, SyncError> {
        let id = self.spreadsheet_id().await?;
        let url = self.spreadsheet_url(&id, &[])?;
        let request = self
            .client
            .get(url)
            .query(&[("fields", "sheets.properties(sheetId,title)")]);
        let metadata: SpreadsheetMetadata = self.send(request).await?;

        let segment = match metadata.sheets.into_iter().find(|v| v.properties.title == title) {
            Some(sheet) => Segment {
                id: sheet.properties.sheet_id,
                title: sheet.properties.title,
            },
            None => {
                info!("Creating worksheet {title:?}");
                let response = self.batch_update(vec![add_sheet_request(title)]).await?;
                let sheet_id = response
                    .replies
                    .first()
                    .and_then(|v| v.pointer("/addSheet/properties/sheetId"))
                    .and_then(Value::as_i64)
                    .ok_or_else(|| SyncError::SegmentUnavailable(title.to_string()))?;
                Segment {
                    id: sheet_id,
                    title: title.to_string(),
                }
            }
        };

        // Also covers a worksheet whose header write failed or was removed by hand.
        self.restore_header(&segment, header).await?;
        Ok(segment)
    }

    #[instrument(skip(self))]
    async fn list_rows(&mut self, segment: &Segment) -> Result<Vec<Vec<String>>, SyncError> {
        let id = self.spreadsheet_id().await?;
        let url = self.spreadsheet_url(&id, &["values", &segment_range(&segment.title)])?;
        let request = self.client.get(url);
        let range: ValueRange = self.send(request).await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    #[instrument(skip(self))]
    async fn delete_rows(&mut self, segment: &Segment, indices: &[usize]) -> Result<(), SyncError> {
        let requests = descending_runs(indices)
            .into_iter()
            .map(|(start, end)| delete_rows_request(segment.id, start, end))
            .collect::<Vec<_>>();
        if requests.is_empty() {
            return Ok(());
        }
        self.batch_update(requests).await?;
        Ok(())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn append_rows(&mut self, segment: &Segment, rows: &[ReportRow]) -> Result<(), SyncError> {
        let values = rows.iter().map(ReportRow::to_values).collect();
        self.append_values(&segment.title, values).await
    }
}

async fn check_status(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = api_error_message(&body);
    match status.as_u16() {
        401 | 403 => Err(SyncError::Auth(message)),
        code => Err(SyncError::Api {
            status: code,
            message,
        }),
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| truncate(body, 200))
}

fn format_oauth_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(TokenErrorResponse {
            error,
            error_description: Some(description),
        }) => format!("{status} {error}: {description}"),
        Ok(TokenErrorResponse { error, .. }) => format!("{status} {error}"),
        Err(_) => format!("{status} {}", truncate(body, 200)),
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Single quotes and backslashes are escaped inside Drive query string literals.
fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// A1 notation covering the four report columns of a worksheet.
fn segment_range(title: &str) -> String {
    format!("'{}'!A:D", title.replace('\'', "''"))
}

/// A1 notation of the header cells.
fn header_range(title: &str) -> String {
    format!("'{}'!A1:D1", title.replace('\'', "''"))
}

/// Formatted values come back as strings, but be lenient with anything else.
fn cell_text(value: Value) -> String {
    match value {
        Value::String(v) => v,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Collapses descending row indices into half-open `(start, end)` ranges, highest range first.
fn descending_runs(indices: &[usize]) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for &index in indices {
        match runs.last_mut() {
            Some((start, _)) if *start == index + 1 => *start = index,
            _ => runs.push((index, index + 1)),
        }
    }
    runs
}

fn add_sheet_request(title: &str) -> Value {
    json!({
        "addSheet": {
            "properties": {
                "title": title,
                "gridProperties": {
                    "rowCount": NEW_SEGMENT_ROWS,
                    "columnCount": NEW_SEGMENT_COLUMNS,
                }
            }
        }
    })
}

fn insert_first_row_request(sheet_id: i64) -> Value {
    json!({
        "insertDimension": {
            "range": {
                "sheetId": sheet_id,
                "dimension": "ROWS",
                "startIndex": 0,
                "endIndex": 1,
            },
            "inheritFromBefore": false,
        }
    })
}

fn delete_rows_request(sheet_id: i64, start: usize, end: usize) -> Value {
    json!({
        "deleteDimension": {
            "range": {
                "sheetId": sheet_id,
                "dimension": "ROWS",
                "startIndex": start,
                "endIndex": end,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        api_error_message, cell_text, delete_rows_request, descending_runs, escape_query_literal,
        format_oauth_error, header_range, insert_first_row_request, segment_range,
        OAuthCredentials, OAUTH_TOKEN_URL,
    };

    #[test]
    fn test_descending_runs() {
        assert_eq!(descending_runs(&[9, 8, 7, 4, 2, 1]), vec![(7, 10), (4, 5), (1, 3)]);
        assert_eq!(descending_runs(&[]), vec![]);
        assert_eq!(descending_runs(&[3]), vec![(3, 4)]);
    }

    #[test]
    fn test_delete_request_shape() {
        assert_eq!(
            delete_rows_request(42, 3, 5),
            json!({
                "deleteDimension": {
                    "range": { "sheetId": 42, "dimension": "ROWS", "startIndex": 3, "endIndex": 5 }
                }
            })
        );
    }

    #[test]
    fn test_segment_range_quotes_title() {
        assert_eq!(segment_range("March 2024"), "'March 2024'!A:D");
        assert_eq!(segment_range("Bob's"), "'Bob''s'!A:D");
        assert_eq!(header_range("March 2024"), "'March 2024'!A1:D1");
    }

    #[test]
    fn test_insert_first_row_request_shape() {
        assert_eq!(
            insert_first_row_request(7),
            json!({
                "insertDimension": {
                    "range": { "sheetId": 7, "dimension": "ROWS", "startIndex": 0, "endIndex": 1 },
                    "inheritFromBefore": false
                }
            })
        );
    }

    #[test]
    fn test_query_literal_escaping() {
        assert_eq!(escape_query_literal("Activity Tracker"), "Activity Tracker");
        assert_eq!(escape_query_literal("Bob's"), "Bob\\'s");
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(json!("2024-03-15")), "2024-03-15");
        assert_eq!(cell_text(json!(125.5)), "125.5");
        assert_eq!(cell_text(json!(null)), "");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            api_error_message(r#"{"error": {"code": 429, "message": "Quota exceeded"}}"#),
            "Quota exceeded"
        );
        assert_eq!(api_error_message("Bad gateway"), "Bad gateway");
        assert_eq!(
            format_oauth_error(400, r#"{"error": "invalid_grant", "error_description": "Token has been expired or revoked."}"#),
            "400 invalid_grant: Token has been expired or revoked."
        );
    }

    #[test]
    fn test_credentials_default_token_uri() {
        let credentials: OAuthCredentials = serde_json::from_value(json!({
            "client_id": "id",
            "client_secret": "secret",
            "refresh_token": "refresh",
        }))
        .unwrap();
        assert_eq!(credentials.token_uri, OAUTH_TOKEN_URL);
    }
}
