//! BigQuery REST v2 client.
//!
//! Covers the handful of endpoints the adapter needs: dataset metadata,
//! table listing and metadata, and synchronous queries with job polling.

use super::auth::{ServiceAccountKey, TokenSource};
use crate::Result;
use crate::error::DatafrostError;
use crate::models::{QueryResult, TableInfo, TableKind, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use url::Url;

const API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2/";
/// How long the server may hold a query or poll request open.
const POLL_WAIT_MS: u64 = 10_000;

/// Column definition from a table or query schema
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub default_value_expression: Option<String>,
}

impl FieldSchema {
    pub fn is_repeated(&self) -> bool {
        self.mode.as_deref() == Some("REPEATED")
    }

    pub fn is_required(&self) -> bool {
        self.mode.as_deref() == Some("REQUIRED")
    }

    pub fn is_record(&self) -> bool {
        matches!(self.field_type.as_str(), "RECORD" | "STRUCT")
    }

    /// Type as shown to users, `ARRAY<...>` for repeated fields.
    pub fn display_type(&self) -> String {
        if self.is_repeated() {
            format!("ARRAY<{}>", self.field_type)
        } else {
            self.field_type.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub dataset_id: String,
    pub table_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKey {
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnReference {
    pub referencing_column: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    #[serde(default)]
    pub name: Option<String>,
    pub referenced_table: TableReference,
    #[serde(default)]
    pub column_references: Vec<ColumnReference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConstraints {
    #[serde(default)]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

/// Table resource from `tables.get`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResource {
    #[serde(default)]
    pub schema: Schema,
    #[serde(default)]
    pub table_constraints: Option<TableConstraints>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListEntry {
    table_reference: TableReference,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableListEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameter_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    query_parameters: Vec<QueryParameter>,
    default_dataset: DatasetReference<'a>,
    format_options: FormatOptions,
    timeout_ms: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FormatOptions {
    use_int64_timestamp: bool,
}

/// Positional STRING parameter
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameter {
    parameter_type: ParameterType,
    parameter_value: ParameterValue,
}

impl QueryParameter {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            parameter_type: ParameterType { kind: "STRING" },
            parameter_value: ParameterValue {
                value: value.into(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ParameterType {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ParameterValue {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    schema: Option<Schema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: JsonValue,
}

/// Authenticated client bound to one project and dataset.
pub struct BigQueryClient {
    http: reqwest::Client,
    tokens: TokenSource,
    base: Url,
    project_id: String,
    dataset: String,
}

impl std::fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("project_id", &self.project_id)
            .field("dataset", &self.dataset)
            .finish_non_exhaustive()
    }
}

impl BigQueryClient {
    /// Creates a client; no request is issued until the first call.
    pub fn new(project_id: &str, dataset: &str, key: ServiceAccountKey) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("datafrost/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DatafrostError::connection_failed("Failed to build HTTP client", e))?;
        let base = Url::parse(API_BASE)
            .map_err(|e| DatafrostError::configuration(format!("Invalid BigQuery API base: {}", e)))?;

        Ok(Self {
            tokens: TokenSource::new(http.clone(), key),
            http,
            base,
            project_id: project_id.to_string(),
            dataset: dataset.to_string(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| DatafrostError::configuration("BigQuery API base cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let token = self.tokens.token().await?;
        let response = request
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| DatafrostError::query_failed(context, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatafrostError::query_message(
                format!("{} (HTTP {})", context, status),
                google_error(&body),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| DatafrostError::query_failed(format!("{}: invalid response", context), e))
    }

    /// Fetches dataset metadata; fails when the dataset is missing or hidden.
    pub async fn dataset_metadata(&self) -> Result<()> {
        let url = self.endpoint(&["projects", &self.project_id, "datasets", &self.dataset])?;
        let _: JsonValue = self
            .send(self.http.get(url), "Dataset not found or no access")
            .await?;
        Ok(())
    }

    /// Lists every table in the dataset, following page tokens.
    pub async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let url = self.endpoint(&[
            "projects",
            &self.project_id,
            "datasets",
            &self.dataset,
            "tables",
        ])?;

        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.http.get(url.clone()).query(&[("maxResults", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: TableList = self.send(request, "Failed to list BigQuery tables").await?;

            tables.extend(page.tables.into_iter().map(|entry| {
                TableInfo::new(entry.table_reference.table_id, TableKind::from_catalog(&entry.kind))
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    /// Fetches the table resource (schema and constraints).
    pub async fn get_table(&self, table: &str) -> Result<TableResource> {
        let url = self.endpoint(&[
            "projects",
            &self.project_id,
            "datasets",
            &self.dataset,
            "tables",
            table,
        ])?;
        self.send(
            self.http.get(url),
            &format!("Failed to get BigQuery table '{}'", table),
        )
        .await
    }

    /// Runs a standard-SQL query with positional STRING parameters and
    /// collects every result page.
    pub async fn query(&self, sql: &str, args: &[String]) -> Result<QueryResult> {
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            parameter_mode: (!args.is_empty()).then_some("POSITIONAL"),
            query_parameters: args.iter().map(QueryParameter::string).collect(),
            default_dataset: DatasetReference {
                project_id: &self.project_id,
                dataset_id: &self.dataset,
            },
            format_options: FormatOptions {
                use_int64_timestamp: true,
            },
            timeout_ms: POLL_WAIT_MS,
        };
        let url = self.endpoint(&["projects", &self.project_id, "queries"])?;
        let mut response: QueryResponse = self
            .send(self.http.post(url).json(&request), "BigQuery query failed")
            .await?;

        let mut schema: Option<Schema> = None;
        let mut rows = Vec::new();
        loop {
            if response.job_complete {
                if schema.is_none() {
                    schema = response.schema.take();
                }
                let fields = schema.as_ref().map(|s| s.fields.as_slice()).unwrap_or_default();
                rows.extend(response.rows.iter().map(|row| convert_row(fields, row)));

                match response.page_token.take() {
                    Some(token) if !token.is_empty() => {
                        response = self.poll(&response, Some(token.as_str())).await?;
                    }
                    _ => break,
                }
            } else {
                tracing::debug!("BigQuery job still running, polling");
                response = self.poll(&response, None).await?;
            }
        }

        let columns = schema
            .map(|s| s.fields.into_iter().map(|f| f.name).collect())
            .unwrap_or_default();
        Ok(QueryResult::from_rows(columns, rows))
    }

    async fn poll(&self, previous: &QueryResponse, page_token: Option<&str>) -> Result<QueryResponse> {
        let job = previous.job_reference.as_ref().ok_or_else(|| {
            DatafrostError::query_message("BigQuery query failed", "response has no job reference")
        })?;
        let url = self.endpoint(&["projects", &job.project_id, "queries", &job.job_id])?;

        let wait = POLL_WAIT_MS.to_string();
        let mut request = self.http.get(url).query(&[
            ("timeoutMs", wait.as_str()),
            ("formatOptions.useInt64Timestamp", "true"),
        ]);
        if let Some(location) = &job.location {
            request = request.query(&[("location", location.as_str())]);
        }
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let mut next: QueryResponse = self
            .send(request, "Failed to fetch BigQuery query results")
            .await?;
        // getQueryResults may omit the job reference
        if next.job_reference.is_none() {
            next.job_reference = Some(JobReference {
                project_id: job.project_id.clone(),
                job_id: job.job_id.clone(),
                location: job.location.clone(),
            });
        }
        Ok(next)
    }
}

fn convert_row(fields: &[FieldSchema], row: &TableRow) -> Vec<Value> {
    row.f
        .iter()
        .enumerate()
        .map(|(i, cell)| match fields.get(i) {
            Some(field) => cell_value(field, &cell.v),
            None => Value::from_json(cell.v.clone()),
        })
        .collect()
}

/// Converts one REST cell into a canonical value using its field schema.
///
/// Scalars arrive as strings; repeated and record fields are rendered as
/// JSON text.
pub fn cell_value(field: &FieldSchema, raw: &JsonValue) -> Value {
    if raw.is_null() {
        return Value::Null;
    }
    if field.is_repeated() || field.is_record() {
        return Value::String(plain_json(field, raw).to_string());
    }

    let Some(text) = raw.as_str() else {
        return Value::from_json(raw.clone());
    };
    match field.field_type.as_str() {
        "INTEGER" | "INT64" => text
            .parse()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        "FLOAT" | "FLOAT64" => text
            .parse()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        "BOOLEAN" | "BOOL" => match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        "TIMESTAMP" => text
            .parse::<i64>()
            .ok()
            .and_then(chrono::DateTime::from_timestamp_micros)
            .map(|ts| Value::String(ts.to_rfc3339()))
            .unwrap_or_else(|| Value::String(text.to_string())),
        _ => Value::String(text.to_string()),
    }
}

/// Strips the `{"f": [{"v": ...}]}` / `[{"v": ...}]` envelopes from nested values.
fn plain_json(field: &FieldSchema, raw: &JsonValue) -> JsonValue {
    if field.is_repeated() {
        let element = FieldSchema {
            mode: None,
            ..field.clone()
        };
        let items = raw
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| plain_json(&element, item.get("v").unwrap_or(item)))
                    .collect()
            })
            .unwrap_or_default();
        return JsonValue::Array(items);
    }

    if field.is_record() {
        let cells = raw.get("f").and_then(JsonValue::as_array);
        let object = field
            .fields
            .iter()
            .enumerate()
            .map(|(i, child)| {
                let value = cells
                    .and_then(|cells| cells.get(i))
                    .and_then(|cell| cell.get("v"))
                    .map(|v| plain_json(child, v))
                    .unwrap_or(JsonValue::Null);
                (child.name.clone(), value)
            })
            .collect();
        return JsonValue::Object(object);
    }

    match cell_value(field, raw) {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(b),
        Value::Integer(n) => JsonValue::from(n),
        Value::Float(x) => JsonValue::from(x),
        Value::String(s) => JsonValue::String(s),
    }
}

/// Extracts `error.message` from a Google API error body.
fn google_error(body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
