//! Snowflake session REST client.
//!
//! Speaks the same session protocol as the official drivers: a login
//! request exchanges a key-pair JWT or an SSO token for a session token,
//! which then authorizes `query-request` calls. Results are requested as
//! JSON; every cell arrives as a string and is converted using the
//! column's `rowtype`.

use super::auth::{BrowserCallback, KeyPairSigner, account_identifier};
use crate::Result;
use crate::adapters::config::{Secret, SnowflakeAuth, SnowflakeCredentials};
use crate::error::{BackendMessage, DatafrostError};
use crate::models::{QueryResult, Value};
use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

const CLIENT_APP_ID: &str = "datafrost";
const CLIENT_APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Query still running; poll `getResultUrl`.
const QUERY_IN_PROGRESS: &[&str] = &["333333", "333334"];
/// Session token expired; log in again.
const SESSION_EXPIRED: &str = "390112";

/// Result chunks fetched at once.
const CHUNK_DOWNLOADS: usize = 4;

/// Generic `{data, success, message, code}` response envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: JsonValue,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl Envelope {
    fn code(&self) -> &str {
        self.code.as_deref().unwrap_or_default()
    }

    fn message(&self) -> String {
        match (&self.message, &self.code) {
            (Some(message), Some(code)) => format!("{} ({})", message, code),
            (Some(message), None) => message.clone(),
            (None, Some(code)) => format!("error code {}", code),
            (None, None) => "request was not successful".to_string(),
        }
    }

    fn into_data<T: DeserializeOwned>(self, context: &str) -> Result<T> {
        serde_json::from_value(self.data).map_err(|e| DatafrostError::serialization(context, e))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    #[serde(default)]
    session_info: SessionInfo,
}

/// Current context reported by the login response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default)]
    pub warehouse_name: Option<String>,
    #[serde(default)]
    pub role_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SsoResponse {
    sso_url: String,
    proof_key: String,
}

/// Column description in a query response
#[derive(Debug, Clone, Deserialize)]
pub struct RowType {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub scale: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Chunk {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[serde(default)]
    rowtype: Vec<RowType>,
    #[serde(default)]
    rowset: Vec<Vec<Option<String>>>,
    #[serde(default)]
    chunks: Vec<Chunk>,
    #[serde(default)]
    chunk_headers: HashMap<String, String>,
    #[serde(default)]
    qrmk: Option<String>,
    #[serde(default)]
    query_result_format: Option<String>,
}

#[derive(Debug, Serialize)]
struct Binding<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    sql_text: &'a str,
    async_exec: bool,
    sequence_id: u64,
    query_submission_time: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    bindings: BTreeMap<String, Binding<'a>>,
}

impl<'a> QueryRequest<'a> {
    fn new(sql: &'a str, args: &'a [String], sequence_id: u64) -> Self {
        let bindings = args
            .iter()
            .enumerate()
            .map(|(index, value)| {
                (
                    index.saturating_add(1).to_string(),
                    Binding {
                        kind: "TEXT",
                        value,
                    },
                )
            })
            .collect();
        Self {
            sql_text: sql,
            async_exec: false,
            sequence_id,
            query_submission_time: Utc::now().timestamp_millis(),
            bindings,
        }
    }
}

enum LoginMethod {
    KeyPair(KeyPairSigner),
    Browser,
}

/// Authenticated Snowflake session, logging in on first use.
///
/// Concurrent callers share one session; the first request performs the
/// login (and, for SSO, the single browser round trip) while the others
/// wait on the session lock.
pub struct SnowflakeClient {
    http: reqwest::Client,
    base: Url,
    account: String,
    user: String,
    login: LoginMethod,
    warehouse: Option<String>,
    database: Option<String>,
    schema: Option<String>,
    role: Option<String>,
    session: tokio::sync::Mutex<Option<Secret>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for SnowflakeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeClient")
            .field("base", &self.base.as_str())
            .field("user", &self.user)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// `https://{account}.snowflakecomputing.com/`, tolerating a pasted host name.
pub fn account_url(account: &str) -> Result<Url> {
    let account = account
        .trim()
        .trim_start_matches("https://")
        .trim_end_matches('/')
        .trim_end_matches(".snowflakecomputing.com");
    if account.is_empty() || account.contains(['/', ':', '@', ' ']) {
        return Err(DatafrostError::invalid_credentials(format!(
            "invalid Snowflake account identifier '{}'",
            account
        )));
    }
    Url::parse(&format!("https://{}.snowflakecomputing.com/", account))
        .map_err(|e| DatafrostError::invalid_credentials(format!("invalid Snowflake account: {}", e)))
}

impl SnowflakeClient {
    /// Prepares a client; no request is made until the first statement.
    ///
    /// # Errors
    /// `InvalidCredentialShape` for an unusable account or private key.
    pub fn new(credentials: &SnowflakeCredentials) -> Result<Self> {
        let login = match &credentials.auth {
            SnowflakeAuth::Browser => LoginMethod::Browser,
            SnowflakeAuth::PrivateKey { pem, passphrase } => {
                let key = super::auth::parse_private_key(pem.expose(), passphrase.as_ref())?;
                LoginMethod::KeyPair(KeyPairSigner::new(
                    &credentials.account,
                    &credentials.user,
                    &key,
                )?)
            }
        };

        let http = reqwest::Client::builder()
            .user_agent(concat!("datafrost/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DatafrostError::connection_failed("Failed to build HTTP client", e))?;

        Ok(Self {
            http,
            base: account_url(&credentials.account)?,
            account: credentials.account.clone(),
            user: credentials.user.clone(),
            login,
            warehouse: credentials.warehouse.clone(),
            database: credentials.database.clone(),
            schema: credentials.schema.clone(),
            role: credentials.role.clone(),
            session: tokio::sync::Mutex::new(None),
            sequence: AtomicU64::new(0),
        })
    }

    /// Sends every request to `base` instead of the account host.
    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| DatafrostError::configuration(format!("Invalid Snowflake URL: {}", e)))
    }

    async fn post_envelope(&self, request: reqwest::RequestBuilder, context: &str) -> Result<Envelope> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| DatafrostError::connection_failed(context, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DatafrostError::connection_failed(context, e))?;
        if !status.is_success() {
            let message = serde_json::from_str::<Envelope>(&body)
                .map(|envelope| envelope.message())
                .unwrap_or_else(|_| format!("HTTP {}", status));
            return Err(DatafrostError::connection_failed(
                context,
                BackendMessage::new(message),
            ));
        }
        serde_json::from_str(&body).map_err(|e| DatafrostError::serialization(context, e))
    }

    fn login_url(&self) -> Result<Url> {
        let mut url = self.url("session/v1/login-request")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(database) = &self.database {
                query.append_pair("databaseName", database);
            }
            if let Some(schema) = &self.schema {
                query.append_pair("schemaName", schema);
            }
            if let Some(warehouse) = &self.warehouse {
                query.append_pair("warehouse", warehouse);
            }
            if let Some(role) = &self.role {
                query.append_pair("roleName", role);
            }
            query.append_pair("requestId", &uuid::Uuid::new_v4().to_string());
        }
        Ok(url)
    }

    fn login_body(&self, authenticator: &str, token: &str, proof_key: Option<&str>) -> JsonValue {
        let mut data = json!({
            "CLIENT_APP_ID": CLIENT_APP_ID,
            "CLIENT_APP_VERSION": CLIENT_APP_VERSION,
            "ACCOUNT_NAME": account_identifier(&self.account),
            "LOGIN_NAME": self.user,
            "AUTHENTICATOR": authenticator,
            "TOKEN": token,
            "SESSION_PARAMETERS": {
                "QUERY_RESULT_FORMAT": "JSON",
            },
        });
        if let Some(proof_key) = proof_key {
            data["PROOF_KEY"] = JsonValue::from(proof_key);
        }
        json!({ "data": data })
    }

    async fn login(&self) -> Result<Secret> {
        let body = match &self.login {
            LoginMethod::KeyPair(signer) => {
                tracing::debug!("Logging in to Snowflake with key pair as {}", signer.issuer());
                let jwt = signer.token(Utc::now().timestamp())?;
                self.login_body("SNOWFLAKE_JWT", jwt.expose(), None)
            }
            LoginMethod::Browser => {
                let (token, proof_key) = self.browser_token().await?;
                self.login_body("EXTERNALBROWSER", token.expose(), Some(&proof_key))
            }
        };

        let envelope = self
            .post_envelope(
                self.http.post(self.login_url()?).json(&body),
                "Snowflake login failed",
            )
            .await?;
        if !envelope.success {
            return Err(DatafrostError::connection_failed(
                "Snowflake login failed",
                BackendMessage::new(envelope.message()),
            ));
        }

        let login: LoginResponse = envelope.into_data("Failed to decode Snowflake login response")?;
        tracing::info!(
            "Snowflake session opened (database: {}, schema: {}, warehouse: {}, role: {})",
            login.session_info.database_name.as_deref().unwrap_or("-"),
            login.session_info.schema_name.as_deref().unwrap_or("-"),
            login.session_info.warehouse_name.as_deref().unwrap_or("-"),
            login.session_info.role_name.as_deref().unwrap_or("-"),
        );
        Ok(Secret::new(login.token))
    }

    /// Runs the external-browser round trip, returning the SSO token and
    /// the proof key that binds it to this login.
    async fn browser_token(&self) -> Result<(Secret, String)> {
        let callback = BrowserCallback::bind().await?;
        let port = callback.port()?;

        let body = json!({
            "data": {
                "CLIENT_APP_ID": CLIENT_APP_ID,
                "CLIENT_APP_VERSION": CLIENT_APP_VERSION,
                "ACCOUNT_NAME": account_identifier(&self.account),
                "LOGIN_NAME": self.user,
                "AUTHENTICATOR": "EXTERNALBROWSER",
                "BROWSER_MODE_REDIRECT_PORT": port.to_string(),
            }
        });
        let envelope = self
            .post_envelope(
                self.http
                    .post(self.url("session/authenticator-request")?)
                    .json(&body),
                "Snowflake SSO request failed",
            )
            .await?;
        if !envelope.success {
            return Err(DatafrostError::connection_failed(
                "Snowflake SSO request failed",
                BackendMessage::new(envelope.message()),
            ));
        }
        let sso: SsoResponse = envelope.into_data("Failed to decode Snowflake SSO response")?;

        tracing::info!("Opening browser for Snowflake single sign-on");
        if let Err(e) = open::that_detached(&sso.sso_url) {
            tracing::warn!(
                "Could not open a browser ({}); complete sign-on at {}",
                e,
                sso.sso_url
            );
        }

        let token = callback.wait_for_token().await?;
        Ok((token, sso.proof_key))
    }

    async fn session_token(&self) -> Result<Secret> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *session = Some(token.clone());
        Ok(token)
    }

    async fn forget_session(&self) {
        *self.session.lock().await = None;
    }

    fn authorization(token: &Secret) -> String {
        format!("Snowflake Token=\"{}\"", token.expose())
    }

    /// Logs in if needed.
    pub async fn ensure_session(&self) -> Result<()> {
        self.session_token().await.map(|_| ())
    }

    /// Runs one statement with `?` placeholders bound to `args` as text.
    pub async fn query(&self, sql: &str, args: &[String]) -> Result<QueryResult> {
        let mut relogged = false;
        loop {
            let token = self.session_token().await?;
            let envelope = self.submit(&token, sql, args).await?;

            if envelope.code() == SESSION_EXPIRED && !relogged {
                tracing::debug!("Snowflake session expired, logging in again");
                self.forget_session().await;
                relogged = true;
                continue;
            }
            if !envelope.success {
                return Err(DatafrostError::query_message(
                    "Snowflake query failed",
                    envelope.message(),
                ));
            }

            let data: QueryData = envelope.into_data("Failed to decode Snowflake query response")?;
            return self.collect(data).await;
        }
    }

    async fn submit(&self, token: &Secret, sql: &str, args: &[String]) -> Result<Envelope> {
        let sequence_id = self.sequence.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        let mut url = self.url("queries/v1/query-request")?;
        url.query_pairs_mut()
            .append_pair("requestId", &uuid::Uuid::new_v4().to_string());

        let mut envelope = self
            .post_envelope(
                self.http
                    .post(url)
                    .header(reqwest::header::AUTHORIZATION, Self::authorization(token))
                    .json(&QueryRequest::new(sql, args, sequence_id)),
                "Snowflake query request failed",
            )
            .await?;

        while QUERY_IN_PROGRESS.contains(&envelope.code()) {
            let result_url = envelope
                .data
                .get("getResultUrl")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| {
                    DatafrostError::query_message(
                        "Snowflake query failed",
                        "query is still running but no result URL was returned",
                    )
                })?;
            tracing::debug!("Waiting for Snowflake query result");
            envelope = self
                .post_envelope(
                    self.http
                        .get(self.url(result_url)?)
                        .header(reqwest::header::AUTHORIZATION, Self::authorization(token)),
                    "Snowflake result request failed",
                )
                .await?;
        }
        Ok(envelope)
    }

    async fn collect(&self, data: QueryData) -> Result<QueryResult> {
        if let Some(format) = &data.query_result_format
            && !format.eq_ignore_ascii_case("json")
        {
            return Err(DatafrostError::unsupported_feature(
                format!("{} query result format", format),
                "snowflake",
            ));
        }
        let columns = data.rowtype.iter().map(|c| c.name.clone()).collect();
        let mut rows: Vec<Vec<Value>> = data
            .rowset
            .iter()
            .map(|row| convert_row(&data.rowtype, row))
            .collect();

        // Chunks download concurrently but are appended in order
        let downloads: Vec<_> = data
            .chunks
            .iter()
            .map(|chunk| self.download_chunk(&data, chunk))
            .collect();
        let mut chunks = stream::iter(downloads).buffered(CHUNK_DOWNLOADS);
        while let Some(chunk) = chunks.try_next().await? {
            rows.extend(chunk.iter().map(|row| convert_row(&data.rowtype, row)));
        }

        Ok(QueryResult::from_rows(columns, rows))
    }

    /// Fetches a result chunk from cloud storage.
    async fn download_chunk(&self, data: &QueryData, chunk: &Chunk) -> Result<Vec<Vec<Option<String>>>> {
        let mut request = self.http.get(&chunk.url);
        if data.chunk_headers.is_empty() {
            if let Some(qrmk) = &data.qrmk {
                request = request
                    .header("x-amz-server-side-encryption-customer-algorithm", "AES256")
                    .header("x-amz-server-side-encryption-customer-key", qrmk);
            }
        } else {
            for (name, value) in &data.chunk_headers {
                request = request.header(name, value);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| DatafrostError::query_failed("Failed to download Snowflake result chunk", e))?;
        if !response.status().is_success() {
            return Err(DatafrostError::query_message(
                "Failed to download Snowflake result chunk",
                format!("HTTP {}", response.status()),
            ));
        }
        let body = response
            .text()
            .await
            .map_err(|e| DatafrostError::query_failed("Failed to read Snowflake result chunk", e))?;

        parse_chunk(&body)
    }

    /// Ends the session server-side if one was opened.
    pub async fn close(&self) -> Result<()> {
        let Some(token) = self.session.lock().await.take() else {
            return Ok(());
        };
        let mut url = self.url("session")?;
        url.query_pairs_mut().append_pair("delete", "true");

        self.http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, Self::authorization(&token))
            .send()
            .await
            .map_err(|e| DatafrostError::connection_failed("Failed to end Snowflake session", e))?;
        tracing::info!("Snowflake session closed");
        Ok(())
    }
}

/// Chunks hold comma-separated row arrays without the enclosing brackets.
fn parse_chunk(body: &str) -> Result<Vec<Vec<Option<String>>>> {
    serde_json::from_str(&format!("[{}]", body.trim()))
        .map_err(|e| DatafrostError::serialization("Failed to decode Snowflake result chunk", e))
}

fn convert_row(rowtype: &[RowType], row: &[Option<String>]) -> Vec<Value> {
    rowtype
        .iter()
        .zip(row.iter())
        .map(|(column, raw)| cell_value(column, raw.as_deref()))
        .collect()
}

/// Converts one JSON-format result cell using its column type.
pub fn cell_value(column: &RowType, raw: Option<&str>) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };
    let text = || Value::String(raw.to_string());

    match column.kind.as_str() {
        "fixed" if column.scale.unwrap_or(0) == 0 => raw.parse().map_or_else(|_| text(), Value::Integer),
        "real" => raw.parse().map_or_else(|_| text(), Value::Float),
        "boolean" => match raw {
            "1" | "true" | "TRUE" => Value::Bool(true),
            "0" | "false" | "FALSE" => Value::Bool(false),
            _ => text(),
        },
        "date" => raw
            .parse::<i64>()
            .ok()
            .and_then(|days| NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(TimeDelta::try_days(days)?))
            .map_or_else(text, |date| Value::String(date.format("%Y-%m-%d").to_string())),
        "time" => epoch_parts(raw)
            .and_then(|(secs, nanos)| {
                NaiveTime::from_num_seconds_from_midnight_opt(u32::try_from(secs).ok()?, nanos)
            })
            .map_or_else(text, |time| Value::String(time.format("%H:%M:%S%.f").to_string())),
        "timestamp_ntz" => epoch_parts(raw)
            .and_then(|(secs, nanos)| DateTime::from_timestamp(secs, nanos))
            .map_or_else(text, |ts| {
                Value::String(ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }),
        "timestamp_ltz" => epoch_parts(raw)
            .and_then(|(secs, nanos)| DateTime::from_timestamp(secs, nanos))
            .map_or_else(text, |ts| Value::String(ts.to_rfc3339())),
        "timestamp_tz" => timestamp_tz(raw).map_or_else(text, |ts| Value::String(ts.to_rfc3339())),
        "binary" => decode_hex(raw).map_or_else(text, |bytes| {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }),
        _ => text(),
    }
}

/// Splits `seconds.fraction` into whole seconds (floored) and nanoseconds.
fn epoch_parts(raw: &str) -> Option<(i64, u32)> {
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    let secs: i64 = whole.parse().ok()?;
    let digits: String = fraction.chars().chain(std::iter::repeat('0')).take(9).collect();
    let nanos: u32 = digits.parse().ok()?;

    if raw.starts_with('-') && nanos > 0 {
        Some((secs.checked_sub(1)?, 1_000_000_000_u32.checked_sub(nanos)?))
    } else {
        Some((secs, nanos))
    }
}

/// `seconds.fraction offset`, where offset is minutes east of UTC plus 1440.
fn timestamp_tz(raw: &str) -> Option<DateTime<FixedOffset>> {
    let (epoch, offset) = raw.split_once(' ')?;
    let (secs, nanos) = epoch_parts(epoch)?;
    let minutes = offset.parse::<i32>().ok()?.checked_sub(1440)?;
    let offset = FixedOffset::east_opt(minutes.checked_mul(60)?)?;
    Some(DateTime::from_timestamp(secs, nanos)?.with_timezone(&offset))
}

fn decode_hex(raw: &str) -> Option<Vec<u8>> {
    if raw.len() % 2 != 0 {
        return None;
    }
    raw.as_bytes()
        .chunks(2)
        .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).ok()?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(kind: &str, scale: Option<i64>) -> RowType {
        RowType {
            name: "c".to_string(),
            kind: kind.to_string(),
            scale,
        }
    }

    #[test]
    fn test_account_url() {
        assert_eq!(
            account_url("myorg-myaccount").unwrap().as_str(),
            "https://myorg-myaccount.snowflakecomputing.com/"
        );
        assert_eq!(
            account_url("https://xy12345.us-east-1.snowflakecomputing.com/")
                .unwrap()
                .as_str(),
            "https://xy12345.us-east-1.snowflakecomputing.com/"
        );
        assert!(account_url("").is_err());
        assert!(account_url("evil.com/path").is_err());
    }

    #[test]
    fn test_numeric_cells() {
        assert_eq!(cell_value(&column("fixed", Some(0)), Some("42")), Value::Integer(42));
        assert_eq!(
            cell_value(&column("fixed", Some(0)), Some("99999999999999999999999")),
            Value::String("99999999999999999999999".to_string())
        );
        assert_eq!(
            cell_value(&column("fixed", Some(2)), Some("12.50")),
            Value::String("12.50".to_string())
        );
        assert_eq!(cell_value(&column("real", None), Some("1.5")), Value::Float(1.5));
        assert_eq!(cell_value(&column("boolean", None), Some("1")), Value::Bool(true));
        assert_eq!(cell_value(&column("text", None), None), Value::Null);
    }

    #[test]
    fn test_temporal_cells() {
        assert_eq!(
            cell_value(&column("date", None), Some("19723")),
            Value::String("2024-01-01".to_string())
        );
        assert_eq!(
            cell_value(&column("time", Some(9)), Some("3723.500000000")),
            Value::String("01:02:03.500".to_string())
        );
        assert_eq!(
            cell_value(&column("timestamp_ntz", Some(9)), Some("1704067200.000000000")),
            Value::String("2024-01-01 00:00:00".to_string())
        );
        assert_eq!(
            cell_value(&column("timestamp_ltz", Some(9)), Some("1704067200.000000000")),
            Value::String("2024-01-01T00:00:00+00:00".to_string())
        );
        assert_eq!(
            cell_value(&column("timestamp_tz", Some(9)), Some("1704067200.000000000 1500")),
            Value::String("2024-01-01T01:00:00+01:00".to_string())
        );
    }

    #[test]
    fn test_negative_epoch_fraction() {
        assert_eq!(epoch_parts("-1.500000000"), Some((-2, 500_000_000)));
        assert_eq!(epoch_parts("12"), Some((12, 0)));
        assert_eq!(epoch_parts("x"), None);
    }

    #[test]
    fn test_binary_cells_are_base64() {
        assert_eq!(
            cell_value(&column("binary", None), Some("48656C6C6F")),
            Value::String("SGVsbG8=".to_string())
        );
    }

    #[test]
    fn test_query_request_bindings() {
        let args = vec!["21".to_string(), "ada".to_string()];
        let request = QueryRequest::new("SELECT * FROM t WHERE a > ? AND b = ?", &args, 7);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["sequenceId"], 7);
        assert_eq!(body["asyncExec"], false);
        assert_eq!(body["bindings"]["1"], json!({"type": "TEXT", "value": "21"}));
        assert_eq!(body["bindings"]["2"]["value"], "ada");

        let plain = serde_json::to_value(QueryRequest::new("SELECT 1", &[], 1)).unwrap();
        assert!(plain.get("bindings").is_none());
    }

    #[test]
    fn test_query_envelope_decoding() {
        let body = r#"{
            "data": {
                "rowtype": [{"name": "ID", "type": "fixed", "scale": 0}, {"name": "NAME", "type": "text"}],
                "rowset": [["1", "ada"], ["2", null]],
                "total": 2,
                "queryResultFormat": "json"
            },
            "code": null,
            "message": null,
            "success": true
        }"#;
        let envelope: Envelope = serde_json::from_str(body).unwrap();
        assert!(envelope.success);
        let data: QueryData = envelope.into_data("test").unwrap();
        let rows: Vec<_> = data.rowset.iter().map(|r| convert_row(&data.rowtype, r)).collect();
        assert_eq!(rows[1], vec![Value::Integer(2), Value::Null]);
    }

    #[test]
    fn test_error_envelope_message() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"data": null, "code": "002003", "message": "Object 'NOPE' does not exist", "success": false}"#,
        )
        .unwrap();
        assert_eq!(envelope.message(), "Object 'NOPE' does not exist (002003)");
    }

    #[test]
    fn test_chunk_parsing() {
        let rows = parse_chunk("[\"1\",\"a\"],\n[\"2\",null]").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], None);
    }
}
