//! Storage credentials.
//!
//! The run treats credentials as an opaque handle: load the material once,
//! then turn it into a bearer token for the storage API. A service-account
//! key goes through Google's signed-JWT grant; a bare token is used as is.

use std::fmt;
use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::{CredentialError, SyncError};

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Deserialize)]
struct ServiceAccountFile {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Clone)]
pub struct ServiceAccount {
    pub client_email: String,
    pub token_uri: String,
    key: EncodingKey,
}

impl ServiceAccount {
    pub fn from_json(json: &str) -> Result<Self, CredentialError> {
        let raw: ServiceAccountFile =
            serde_json::from_str(json).map_err(|e| CredentialError::InvalidKey(e.to_string()))?;
        let key = EncodingKey::from_rsa_pem(raw.private_key.as_bytes())
            .map_err(|e| CredentialError::InvalidKey(format!("private_key: {e}")))?;
        Ok(Self {
            client_email: raw.client_email,
            token_uri: raw
                .token_uri
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            key,
        })
    }

    /// Override where the signed assertion is exchanged.
    pub fn with_token_uri(mut self, uri: impl Into<String>) -> Self {
        self.token_uri = uri.into();
        self
    }

    fn assertion(&self, scope: &str) -> Result<String, SyncError> {
        #[derive(Serialize)]
        struct Claims<'a> {
            iss: &'a str,
            scope: &'a str,
            aud: &'a str,
            iat: i64,
            exp: i64,
        }

        let iat = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            iat,
            exp: iat + 3600,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| SyncError::Auth(format!("sign assertion: {e}")))
    }
}

/// Bearer token for the storage API.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<{} bytes>)", self.0.len())
    }
}

#[derive(Clone)]
pub enum Credential {
    ServiceAccount(ServiceAccount),
    Token(AccessToken),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ServiceAccount(sa) => {
                write!(f, "ServiceAccount({})", sa.client_email)
            }
            Credential::Token(t) => write!(f, "Token({t:?})"),
        }
    }
}

impl Credential {
    /// Load credential material from the first configured source.
    pub fn acquire(s: &Settings) -> Result<Self, CredentialError> {
        Self::load(
            s.credential_path.as_deref(),
            s.gdrive_sa_json.as_deref(),
            s.gdrive_access_token.as_deref(),
        )
    }

    pub fn load(
        path: Option<&Path>,
        inline_sa_json: Option<&str>,
        inline_token: Option<&str>,
    ) -> Result<Self, CredentialError> {
        let non_empty = |s: &str| !s.trim().is_empty();

        if let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) {
            let body = std::fs::read_to_string(path).map_err(|e| CredentialError::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            return Self::parse(&body);
        }
        if let Some(json) = inline_sa_json.filter(|s| non_empty(s)) {
            return Ok(Credential::ServiceAccount(ServiceAccount::from_json(json)?));
        }
        if let Some(tok) = inline_token.filter(|s| non_empty(s)) {
            return Ok(Credential::Token(AccessToken::new(tok.trim())));
        }
        Err(CredentialError::Missing)
    }

    /// A file holds either a service-account JSON document or a bare token.
    fn parse(body: &str) -> Result<Self, CredentialError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(CredentialError::Missing);
        }
        if body.starts_with('{') {
            Ok(Credential::ServiceAccount(ServiceAccount::from_json(body)?))
        } else {
            Ok(Credential::Token(AccessToken::new(body)))
        }
    }

    /// Turn the credential into a bearer token for `scope`.
    pub async fn access_token(&self, http: &reqwest::Client, scope: &str) -> Result<AccessToken, SyncError> {
        let sa = match self {
            Credential::Token(t) => return Ok(t.clone()),
            Credential::ServiceAccount(sa) => sa,
        };

        let assertion = sa.assertion(scope)?;
        tracing::debug!(client_email = %sa.client_email, token_uri = %sa.token_uri, "exchanging service account assertion");

        let resp = http
            .post(&sa.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| format!("{}: {}", e.error, e.error_description.unwrap_or_default()))
                .unwrap_or_else(|_| body.chars().take(256).collect());
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => SyncError::Quota(format!("token endpoint: {reason}")),
                s if s.is_server_error() => SyncError::Network(format!("token endpoint {s}: {reason}")),
                s => SyncError::Auth(format!("token endpoint {s}: {reason}")),
            });
        }

        let tok: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| SyncError::Auth(format!("decode token response failed: {e}")))?;
        tracing::debug!(expires_in = tok.expires_in.unwrap_or_default(), "access token issued");
        Ok(AccessToken::new(tok.access_token))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}
