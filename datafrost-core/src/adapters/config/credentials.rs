//! Typed credential configuration for every backend.
//!
//! Connection records store credentials as an open JSON object. They are
//! parsed exactly once, at the adapter boundary, into [`Credentials`] so
//! that each adapter's `connect` receives an already shape-checked value.
//!
//! # Security
//! Passwords, tokens, service-account documents and private keys are held
//! in [`Secret`], which zeroes its memory on drop and never prints its
//! contents through `Debug`.

use crate::error::DatafrostError;
use crate::Result;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Credentials as stored on a connection record
pub type CredentialMap = serde_json::Map<String, JsonValue>;

/// Backend family an adapter talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Sqlite,
    Turso,
    Postgres,
    BigQuery,
    Snowflake,
}

impl BackendKind {
    /// Default registry type tag for the backend.
    pub fn type_tag(self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Turso => "turso",
            BackendKind::Postgres => "postgres",
            BackendKind::BigQuery => "bigquery",
            BackendKind::Snowflake => "snowflake",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "SQLite"),
            BackendKind::Turso => write!(f, "Turso"),
            BackendKind::Postgres => write!(f, "PostgreSQL"),
            BackendKind::BigQuery => write!(f, "BigQuery"),
            BackendKind::Snowflake => write!(f, "Snowflake"),
        }
    }
}

/// Secret string that is zeroed on drop and redacted in debug output.
#[derive(Clone, Default)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wraps a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Exposes the secret for handing to a driver.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl<'de> serde::Deserialize<'de> for Secret {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret::new)
    }
}

/// Validated credentials, one variant per backend family.
#[derive(Debug, Clone)]
pub enum Credentials {
    Sqlite(SqliteCredentials),
    Turso(TursoCredentials),
    Postgres(PostgresCredentials),
    BigQuery(BigQueryCredentials),
    Snowflake(SnowflakeCredentials),
}

/// `sqlite:{path}`
#[derive(Debug, Clone)]
pub struct SqliteCredentials {
    pub path: PathBuf,
}

/// `turso:{url, token}`
#[derive(Debug, Clone)]
pub struct TursoCredentials {
    pub url: String,
    pub token: Secret,
}

/// PostgreSQL credentials, selected by the `mode` discriminator.
#[derive(Debug, Clone)]
pub enum PostgresCredentials {
    /// `mode = "url"`: a complete connection URL (may embed a password)
    Url(Secret),
    /// Any other mode: individual fields
    Fields(PostgresFields),
}

/// Individual PostgreSQL connection fields
#[derive(Debug, Clone)]
pub struct PostgresFields {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<Secret>,
    pub ssl_mode: String,
}

/// `bigquery:{project_id, dataset, credentials}`
#[derive(Debug, Clone)]
pub struct BigQueryCredentials {
    pub project_id: String,
    pub dataset: String,
    /// Service-account key document (JSON text)
    pub service_account: Secret,
}

/// Snowflake credentials
#[derive(Debug, Clone)]
pub struct SnowflakeCredentials {
    pub account: String,
    pub user: String,
    pub auth: SnowflakeAuth,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
}

/// Snowflake authentication mode
#[derive(Debug, Clone)]
pub enum SnowflakeAuth {
    /// External-browser SSO (`mode = "browser"`, the default)
    Browser,
    /// Key-pair JWT (`mode = "private_key"`)
    PrivateKey {
        pem: Secret,
        passphrase: Option<Secret>,
    },
}

pub(crate) const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub(crate) const DEFAULT_SSL_MODE: &str = "prefer";

impl Credentials {
    /// Validates an open credential map against the backend's shape.
    ///
    /// # Errors
    /// - `MissingCredentialField` when a required key is absent or blank
    /// - `InvalidCredentialShape` when a value has the wrong type or an
    ///   unsupported mode is requested
    pub fn parse(kind: BackendKind, map: &CredentialMap) -> Result<Self> {
        let fields = Fields(map);
        match kind {
            BackendKind::Sqlite => Ok(Credentials::Sqlite(SqliteCredentials {
                path: PathBuf::from(fields.required("path")?),
            })),
            BackendKind::Turso => Ok(Credentials::Turso(TursoCredentials {
                url: fields.required("url")?,
                token: Secret::new(fields.required("token")?),
            })),
            BackendKind::Postgres => parse_postgres(&fields).map(Credentials::Postgres),
            BackendKind::BigQuery => Ok(Credentials::BigQuery(BigQueryCredentials {
                project_id: fields.required("project_id")?,
                dataset: fields.required("dataset")?,
                service_account: Secret::new(fields.required_document("credentials")?),
            })),
            BackendKind::Snowflake => parse_snowflake(&fields).map(Credentials::Snowflake),
        }
    }

    /// Backend family these credentials belong to.
    pub fn kind(&self) -> BackendKind {
        match self {
            Credentials::Sqlite(_) => BackendKind::Sqlite,
            Credentials::Turso(_) => BackendKind::Turso,
            Credentials::Postgres(_) => BackendKind::Postgres,
            Credentials::BigQuery(_) => BackendKind::BigQuery,
            Credentials::Snowflake(_) => BackendKind::Snowflake,
        }
    }

    /// Error for an adapter handed another backend's credentials.
    pub(crate) fn mismatch(&self, expected: BackendKind) -> DatafrostError {
        DatafrostError::invalid_credentials(format!(
            "expected {} credentials, got {}",
            expected,
            self.kind()
        ))
    }
}

fn parse_postgres(fields: &Fields<'_>) -> Result<PostgresCredentials> {
    if fields.optional("mode")?.as_deref() == Some("url") {
        return Ok(PostgresCredentials::Url(Secret::new(fields.required("url")?)));
    }

    let port = match fields.0.get("port") {
        None | Some(JsonValue::Null) => DEFAULT_POSTGRES_PORT,
        Some(JsonValue::String(s)) if s.trim().is_empty() => DEFAULT_POSTGRES_PORT,
        Some(JsonValue::String(s)) => s.trim().parse().map_err(|_| {
            DatafrostError::invalid_credentials(format!("port '{}' is not a valid port", s))
        })?,
        Some(JsonValue::Number(n)) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| {
                DatafrostError::invalid_credentials(format!("port {} is out of range", n))
            })?,
        Some(_) => {
            return Err(DatafrostError::invalid_credentials(
                "port must be a string or a number",
            ));
        }
    };

    Ok(PostgresCredentials::Fields(PostgresFields {
        host: fields.required("host")?,
        port,
        database: fields.required("database")?,
        username: fields.required("username")?,
        password: fields.optional("password")?.map(Secret::new),
        ssl_mode: fields
            .optional("ssl_mode")?
            .unwrap_or_else(|| DEFAULT_SSL_MODE.to_string()),
    }))
}

fn parse_snowflake(fields: &Fields<'_>) -> Result<SnowflakeCredentials> {
    let account = fields.required("account")?;
    let user = fields.required("user")?;

    let auth = match fields.optional("mode")?.as_deref() {
        None | Some("browser") => SnowflakeAuth::Browser,
        Some("private_key") => SnowflakeAuth::PrivateKey {
            pem: Secret::new(fields.required("private_key_pem")?),
            passphrase: fields.optional("private_key_passphrase")?.map(Secret::new),
        },
        Some(other) => {
            return Err(DatafrostError::invalid_credentials(format!(
                "unsupported snowflake mode '{}'",
                other
            )));
        }
    };

    Ok(SnowflakeCredentials {
        account,
        user,
        auth,
        warehouse: fields.optional("warehouse")?,
        database: fields.optional("database")?,
        schema: fields.optional("schema")?,
        role: fields.optional("role")?,
    })
}

/// Read-only view over a credential map with presence/type checks.
struct Fields<'a>(&'a CredentialMap);

impl Fields<'_> {
    /// A non-empty string value; blank and null count as missing.
    fn optional(&self, key: &str) -> Result<Option<String>> {
        match self.0.get(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
            Some(JsonValue::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(DatafrostError::invalid_credentials(format!(
                "{} must be a string",
                key
            ))),
        }
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)?
            .ok_or_else(|| DatafrostError::missing_field(key))
    }

    /// A JSON document supplied either as text or as an embedded object.
    fn required_document(&self, key: &str) -> Result<String> {
        match self.0.get(key) {
            Some(JsonValue::Object(obj)) if !obj.is_empty() => {
                serde_json::to_string(obj).map_err(|e| {
                    DatafrostError::serialization(format!("Failed to encode {}", key), e)
                })
            }
            Some(JsonValue::Object(_)) => Err(DatafrostError::missing_field(key)),
            _ => self.required(key),
        }
    }
}

/// Parses the JSON text stored on a connection record.
pub fn deserialize_credentials(text: &str) -> Result<CredentialMap> {
    serde_json::from_str(text)
        .map_err(|e| DatafrostError::serialization("Failed to parse stored credentials", e))
}

/// Encodes credentials for storage on a connection record.
pub fn serialize_credentials(map: &CredentialMap) -> Result<String> {
    serde_json::to_string(map)
        .map_err(|e| DatafrostError::serialization("Failed to encode credentials", e))
}
