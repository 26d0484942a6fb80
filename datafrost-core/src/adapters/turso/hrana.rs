//! Minimal Hrana-over-HTTP client for libSQL/Turso.
//!
//! Each statement is sent as a self-contained `/v2/pipeline` request
//! (`execute` followed by `close`), so no server-side stream outlives a
//! call and the client carries no baton between requests.

use crate::Result;
use crate::adapters::config::Secret;
use crate::error::DatafrostError;
use crate::models::{QueryResult, Value};
use base64::Engine;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use serde::{Deserialize, Serialize};
use url::Url;

/// Reads blob payloads whether or not the server padded them.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One Hrana value as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HranaValue {
    Null,
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

impl HranaValue {
    /// Converts into a canonical cell value.
    pub fn into_value(self) -> Value {
        match self {
            HranaValue::Null => Value::Null,
            HranaValue::Integer { value } => value
                .parse()
                .map(Value::Integer)
                .unwrap_or(Value::String(value)),
            HranaValue::Float { value } => Value::Float(value),
            HranaValue::Text { value } => Value::String(value),
            HranaValue::Blob { base64 } => match LENIENT_BASE64.decode(&base64) {
                Ok(bytes) => Value::String(STANDARD.encode(bytes)),
                Err(e) => {
                    tracing::debug!("Keeping undecodable Turso blob as sent: {}", e);
                    Value::String(base64)
                }
            },
        }
    }
}

#[derive(Serialize)]
struct PipelineRequest<'a> {
    baton: Option<String>,
    requests: Vec<StreamRequest<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamRequest<'a> {
    Execute { stmt: Statement<'a> },
    Close,
}

#[derive(Serialize)]
struct Statement<'a> {
    sql: &'a str,
    args: Vec<HranaValue>,
    want_rows: bool,
}

#[derive(Deserialize)]
struct PipelineResponse {
    #[serde(default)]
    results: Vec<StreamResult>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: HranaError },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamResponse {
    Execute { result: StatementResult },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct StatementResult {
    #[serde(default)]
    cols: Vec<ResultColumn>,
    #[serde(default)]
    rows: Vec<Vec<HranaValue>>,
}

#[derive(Deserialize)]
struct ResultColumn {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HranaError {
    message: String,
}

/// Resolves a database URL to its HTTP pipeline endpoint.
///
/// `libsql://` and `wss://` map to `https://`, `ws://` to `http://`;
/// query parameters are dropped since the token travels as a header.
pub fn pipeline_url(database_url: &str) -> Result<Url> {
    let mut url = Url::parse(database_url).map_err(|e| {
        DatafrostError::invalid_credentials(format!("url is not a valid database URL: {}", e))
    })?;

    let scheme = match url.scheme() {
        "libsql" | "wss" | "https" => "https",
        "ws" | "http" => "http",
        other => {
            return Err(DatafrostError::invalid_credentials(format!(
                "unsupported url scheme '{}'",
                other
            )));
        }
    };
    // Url::set_scheme refuses special ↔ non-special changes, so rebuild
    let rebuilt = format!(
        "{}://{}{}",
        scheme,
        url.host_str().unwrap_or_default(),
        url.port().map(|p| format!(":{}", p)).unwrap_or_default()
    );
    let path = url.path().trim_end_matches('/').to_string();
    url = Url::parse(&format!("{}{}/v2/pipeline", rebuilt, path)).map_err(|e| {
        DatafrostError::invalid_credentials(format!("url is not a valid database URL: {}", e))
    })?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(DatafrostError::invalid_credentials("url has no host"));
    }
    Ok(url)
}

/// HTTP client bound to one database.
#[derive(Clone)]
pub struct HranaClient {
    http: reqwest::Client,
    endpoint: Url,
    token: Secret,
}

impl std::fmt::Debug for HranaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HranaClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl HranaClient {
    /// Creates a client for `database_url` authenticated by `token`.
    pub fn new(database_url: &str, token: Secret) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("datafrost/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DatafrostError::connection_failed("Failed to build HTTP client", e))?;

        Ok(Self {
            http,
            endpoint: pipeline_url(database_url)?,
            token,
        })
    }

    /// Executes one statement with positional text arguments.
    pub async fn execute(&self, sql: &str, args: &[String]) -> Result<QueryResult> {
        let request = PipelineRequest {
            baton: None,
            requests: vec![
                StreamRequest::Execute {
                    stmt: Statement {
                        sql,
                        args: args
                            .iter()
                            .map(|value| HranaValue::Text {
                                value: value.clone(),
                            })
                            .collect(),
                        want_rows: true,
                    },
                },
                StreamRequest::Close,
            ],
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(self.token.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| DatafrostError::query_failed("Turso request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatafrostError::query_message(
                format!("Turso returned HTTP {}", status),
                error_message(&body),
            ));
        }

        let pipeline: PipelineResponse = response
            .json()
            .await
            .map_err(|e| DatafrostError::query_failed("Invalid Turso response", e))?;

        match pipeline.results.into_iter().next() {
            Some(StreamResult::Ok {
                response: StreamResponse::Execute { result },
            }) => Ok(into_query_result(result)),
            Some(StreamResult::Error { error }) => {
                Err(DatafrostError::query_message("Turso query failed", error.message))
            }
            Some(StreamResult::Ok { .. }) | None => Err(DatafrostError::query_message(
                "Invalid Turso response",
                "pipeline returned no execute result",
            )),
        }
    }
}

fn into_query_result(result: StatementResult) -> QueryResult {
    let columns = result
        .cols
        .into_iter()
        .enumerate()
        .map(|(i, col)| col.name.unwrap_or_else(|| format!("column{}", i)))
        .collect();
    let rows = result
        .rows
        .into_iter()
        .map(|row| row.into_iter().map(HranaValue::into_value).collect())
        .collect();
    QueryResult::from_rows(columns, rows)
}

/// Extracts `message` from a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_url_from_libsql() {
        let url = pipeline_url("libsql://my-db-acme.turso.io").unwrap();
        assert_eq!(url.as_str(), "https://my-db-acme.turso.io/v2/pipeline");

        let url = pipeline_url("libsql://my-db.turso.io?authToken=abc").unwrap();
        assert_eq!(url.as_str(), "https://my-db.turso.io/v2/pipeline");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_pipeline_url_local_sqld() {
        let url = pipeline_url("http://127.0.0.1:8080").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/v2/pipeline");
        let url = pipeline_url("ws://localhost:8080/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v2/pipeline");
    }

    #[test]
    fn test_pipeline_url_rejects_bad_input() {
        assert!(pipeline_url("not a url").is_err());
        assert!(pipeline_url("postgres://host/db").is_err());
    }

    #[test]
    fn test_statement_wire_format() {
        let request = PipelineRequest {
            baton: None,
            requests: vec![
                StreamRequest::Execute {
                    stmt: Statement {
                        sql: "SELECT * FROM \"t\" WHERE \"a\" = ?",
                        args: vec![HranaValue::Text {
                            value: "x".to_string(),
                        }],
                        want_rows: true,
                    },
                },
                StreamRequest::Close,
            ],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["requests"][0]["type"], "execute");
        assert_eq!(json["requests"][0]["stmt"]["args"][0]["type"], "text");
        assert_eq!(json["requests"][0]["stmt"]["args"][0]["value"], "x");
        assert_eq!(json["requests"][1]["type"], "close");
    }

    #[test]
    fn test_response_decoding() {
        let body = r#"{
            "baton": null,
            "base_url": null,
            "results": [
                {"type": "ok", "response": {"type": "execute", "result": {
                    "cols": [{"name": "id", "decltype": "INTEGER"}, {"name": "data", "decltype": "BLOB"}, {"name": "score", "decltype": "REAL"}],
                    "rows": [[{"type": "integer", "value": "1"}, {"type": "blob", "base64": "3q2+7w"}, {"type": "float", "value": 2.5}],
                             [{"type": "integer", "value": "2"}, {"type": "null"}, {"type": "text", "value": "n/a"}]],
                    "affected_row_count": 0,
                    "last_insert_rowid": null
                }}},
                {"type": "ok", "response": {"type": "close"}}
            ]
        }"#;
        let response: PipelineResponse = serde_json::from_str(body).unwrap();
        let Some(StreamResult::Ok {
            response: StreamResponse::Execute { result },
        }) = response.results.into_iter().next()
        else {
            panic!("expected execute result");
        };
        let result = into_query_result(result);
        assert_eq!(result.columns, vec!["id", "data", "score"]);
        assert_eq!(result.count, 2);
        assert_eq!(result.rows[0][0], Value::Integer(1));
        // Re-padded to match the SQLite adapter's encoding
        assert_eq!(result.rows[0][1], Value::String("3q2+7w==".to_string()));
        assert_eq!(result.rows[0][2], Value::Float(2.5));
        assert_eq!(result.rows[1][1], Value::Null);
    }

    #[test]
    fn test_blob_values_use_padded_base64() {
        let unpadded = HranaValue::Blob {
            base64: "3q0".to_string(),
        };
        assert_eq!(unpadded.into_value(), Value::String("3q0=".to_string()));

        let padded = HranaValue::Blob {
            base64: "3q0=".to_string(),
        };
        assert_eq!(padded.into_value(), Value::String("3q0=".to_string()));

        let empty = HranaValue::Blob {
            base64: String::new(),
        };
        assert_eq!(empty.into_value(), Value::String(String::new()));
    }

    #[test]
    fn test_error_response_decoding() {
        let body = r#"{"results": [{"type": "error", "error": {"message": "no such table: nope", "code": "SQLITE_ERROR"}}]}"#;
        let response: PipelineResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            response.results.first(),
            Some(StreamResult::Error { error }) if error.message.contains("no such table")
        ));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"Unauthorized"}"#), "Unauthorized");
        assert_eq!(error_message("plain failure\n"), "plain failure");
    }
}
