//! Service-account OAuth for the BigQuery REST API.
//!
//! A signed JWT assertion (RS256) is exchanged for an access token at the
//! key's `token_uri`; the token is reused until shortly before it expires.

use crate::Result;
use crate::adapters::config::Secret;
use crate::error::DatafrostError;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// OAuth scope granting BigQuery access.
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Fields of a service-account key document that signing needs
#[derive(Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    private_key: Secret,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Parses a key document.
    ///
    /// # Errors
    /// `InvalidCredentialShape` when the document is not a service-account key.
    pub fn parse(document: &str) -> Result<Self> {
        let key: ServiceAccountKey = serde_json::from_str(document).map_err(|_| {
            DatafrostError::invalid_credentials(
                "credentials must be a service account key (JSON with client_email and private_key)",
            )
        })?;
        if key.client_email.trim().is_empty() {
            return Err(DatafrostError::missing_field("credentials.client_email"));
        }
        Ok(key)
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    /// Signs the JWT bearer assertion for `scope`.
    pub fn assertion(&self, scope: &str, now: i64) -> Result<String> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope,
            aud: self.token_uri(),
            iat: now,
            exp: now.saturating_add(ASSERTION_LIFETIME_SECS),
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.private_key.expose().as_bytes()).map_err(|e| {
            DatafrostError::connection_failed("Service account private key is not valid RSA PEM", e)
        })?;
        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| DatafrostError::connection_failed("Failed to sign service account assertion", e))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct AccessToken {
    token: Secret,
    refresh_at: Instant,
}

/// Access-token source bound to one service account.
pub struct TokenSource {
    http: reqwest::Client,
    key: ServiceAccountKey,
    cached: Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSource")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl TokenSource {
    pub fn new(http: reqwest::Client, key: ServiceAccountKey) -> Self {
        Self {
            http,
            key,
            cached: Mutex::new(None),
        }
    }

    /// Returns a valid bearer token, exchanging a new assertion when needed.
    pub async fn token(&self) -> Result<Secret> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.token.clone());
        }

        let assertion = self
            .key
            .assertion(BIGQUERY_SCOPE, chrono::Utc::now().timestamp())?;
        let response = self
            .http
            .post(self.key.token_uri())
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| DatafrostError::connection_failed("Token exchange request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatafrostError::connection_failed(
                format!("Token exchange returned HTTP {}", status),
                crate::error::BackendMessage::new(oauth_error(&body)),
            ));
        }

        let granted: TokenResponse = response
            .json()
            .await
            .map_err(|e| DatafrostError::connection_failed("Invalid token response", e))?;
        let lifetime = Duration::from_secs(granted.expires_in).saturating_sub(EXPIRY_MARGIN);
        let token = Secret::new(granted.access_token);

        tracing::debug!("Obtained BigQuery access token for {}", self.key.client_email);
        *cached = Some(AccessToken {
            token: token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token)
    }
}

/// Extracts `error_description` (or `error`) from an OAuth error body.
fn oauth_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error_description")
                .or_else(|| json.get("error"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
