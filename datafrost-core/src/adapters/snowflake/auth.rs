//! Snowflake authentication: key-pair JWT and external-browser SSO.
//!
//! Key-pair login signs a short-lived RS256 JWT whose issuer embeds the
//! SHA-256 fingerprint of the public key. Browser login hands the user an
//! identity-provider URL and waits for the redirect carrying the SAML token
//! on a loopback port.

use crate::Result;
use crate::adapters::config::Secret;
use crate::error::DatafrostError;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pkcs8::DecodePrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::EncodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Snowflake rejects key-pair tokens living longer than an hour.
const JWT_LIFETIME_SECS: i64 = 59 * 60;

/// How long to wait for the identity provider to redirect back.
pub const BROWSER_LOGIN_WAIT: Duration = Duration::from_secs(120);

const CALLBACK_RESPONSE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body>Datafrost: authentication complete. You can close this window.</body></html>";

/// Parses an RSA private key from PEM.
///
/// Accepts PKCS#8 (`PRIVATE KEY`), PKCS#1 (`RSA PRIVATE KEY`) and
/// passphrase-protected PKCS#8 (`ENCRYPTED PRIVATE KEY`).
///
/// # Errors
/// `InvalidCredentialShape` for unreadable keys, non-RSA keys, or an
/// encrypted key without a passphrase.
pub fn parse_private_key(pem: &str, passphrase: Option<&Secret>) -> Result<RsaPrivateKey> {
    let pem = pem.trim();
    if pem.contains("ENCRYPTED PRIVATE KEY") {
        let passphrase = passphrase.ok_or_else(|| {
            DatafrostError::invalid_credentials(
                "private key is encrypted but no passphrase was provided",
            )
        })?;
        return RsaPrivateKey::from_pkcs8_encrypted_pem(pem, passphrase.expose().as_bytes())
            .map_err(|_| DatafrostError::invalid_credentials("failed to decrypt private key"));
    }
    if pem.contains("Proc-Type: 4,ENCRYPTED") {
        return Err(DatafrostError::invalid_credentials(
            "legacy encrypted PEM keys are not supported; convert the key to encrypted PKCS#8",
        ));
    }

    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|_| DatafrostError::invalid_credentials("failed to parse RSA private key PEM"))
}

/// `SHA256:<base64>` fingerprint of the public half of `key`.
pub fn public_key_fingerprint(key: &RsaPrivateKey) -> Result<String> {
    let der = RsaPublicKey::from(key)
        .to_public_key_der()
        .map_err(|e| DatafrostError::configuration(format!("Failed to encode public key: {}", e)))?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(format!(
        "SHA256:{}",
        base64::engine::general_purpose::STANDARD.encode(digest)
    ))
}

/// Account locator as used in JWT claims: uppercased, without region or
/// cloud suffix.
pub fn account_identifier(account: &str) -> String {
    account
        .split('.')
        .next()
        .unwrap_or(account)
        .to_uppercase()
}

#[derive(Serialize)]
struct KeyPairClaims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

/// Signer for key-pair login tokens.
pub struct KeyPairSigner {
    subject: String,
    issuer: String,
    key: EncodingKey,
}

impl std::fmt::Debug for KeyPairSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairSigner")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl KeyPairSigner {
    pub fn new(account: &str, user: &str, key: &RsaPrivateKey) -> Result<Self> {
        let subject = format!("{}.{}", account_identifier(account), user.to_uppercase());
        let issuer = format!("{}.{}", subject, public_key_fingerprint(key)?);
        let der = key
            .to_pkcs1_der()
            .map_err(|e| DatafrostError::configuration(format!("Failed to encode private key: {}", e)))?;

        Ok(Self {
            subject,
            issuer,
            key: EncodingKey::from_rsa_der(der.as_bytes()),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Signs a login token valid from `now`.
    pub fn token(&self, now: i64) -> Result<Secret> {
        let claims = KeyPairClaims {
            iss: self.issuer.clone(),
            sub: self.subject.clone(),
            iat: now,
            exp: now.saturating_add(JWT_LIFETIME_SECS),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map(Secret::new)
            .map_err(|e| DatafrostError::connection_failed("Failed to sign Snowflake login token", e))
    }
}

/// Loopback listener receiving the identity provider's redirect.
pub struct BrowserCallback {
    listener: TcpListener,
}

impl BrowserCallback {
    /// Binds an ephemeral loopback port.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.map_err(|e| {
            DatafrostError::connection_failed("Failed to open browser login callback port", e)
        })?;
        Ok(Self { listener })
    }

    pub fn port(&self) -> Result<u16> {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|e| DatafrostError::connection_failed("Failed to read callback port", e))
    }

    /// Waits for the redirect and returns its `token` parameter.
    pub async fn wait_for_token(self) -> Result<Secret> {
        let accept = async {
            loop {
                let (mut stream, _) = self.listener.accept().await.map_err(|e| {
                    DatafrostError::connection_failed("Browser login callback failed", e)
                })?;

                let mut buffer = vec![0_u8; 16 * 1024];
                let read = stream.read(&mut buffer).await.map_err(|e| {
                    DatafrostError::connection_failed("Failed to read browser callback", e)
                })?;
                let request = String::from_utf8_lossy(&buffer[..read]).to_string();

                if let Some(token) = callback_token(&request) {
                    // The browser only gets a courtesy page; failures here are irrelevant
                    let _ = stream.write_all(CALLBACK_RESPONSE.as_bytes()).await;
                    return Ok(token);
                }
                tracing::debug!("Ignoring browser request without a token");
            }
        };

        tokio::time::timeout(BROWSER_LOGIN_WAIT, accept)
            .await
            .map_err(|e| DatafrostError::connection_failed("Browser login was not completed", e))?
    }
}

/// Extracts `token` from a GET query string or a form-encoded POST body.
pub fn callback_token(request: &str) -> Option<Secret> {
    let mut lines = request.lines();
    let target = lines.next()?.split_whitespace().nth(1)?;

    let from_query = url::Url::parse(&format!("http://localhost{}", target))
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "token")
                .map(|(_, value)| value.into_owned())
        });

    let from_body = || {
        let body = request.split("\r\n\r\n").nth(1)?;
        url::form_urlencoded::parse(body.as_bytes())
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
    };

    from_query
        .or_else(from_body)
        .filter(|token| !token.is_empty())
        .map(Secret::new)
}
