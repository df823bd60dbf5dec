//! OAuth2 access tokens for the Drive API.
//!
//! The token file is produced once by the interactive consent flow
//! ([`ClientSecrets::consent_url`] then [`exchange_code`]); the server only
//! reads it, refreshes it and writes it back.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use postwatch_core::RemoteError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
/// Read-only access is all the service needs: it lists, downloads and watches.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
/// Redirect used when the client registration lists none; the code is shown in the browser.
const OUT_OF_BAND_REDIRECT: &str = "urn:ietf:wg:oauth:2.0:oob";
/// Refresh this long before the recorded expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, RemoteError>;
}

/// Fixed bearer token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, RemoteError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

impl ClientSecrets {
    pub async fn from_file(path: &Path) -> Result<Self, RemoteError> {
        let credentials: CredentialsFile = read_json(path).await?;
        credentials.into_secrets().ok_or_else(|| {
            RemoteError::Credentials(format!(
                "{} has neither an 'installed' nor a 'web' client",
                path.display()
            ))
        })
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(OUT_OF_BAND_REDIRECT)
    }

    /// Browser URL asking the user for offline read-only Drive access.
    pub fn consent_url(&self, state: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.auth_uri).map_err(|err| {
            RemoteError::Credentials(format!("invalid auth_uri '{}': {err}", self.auth_uri))
        })?;
        url.query_pairs_mut()
            .append_pair("access_type", "offline")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_uri())
            .append_pair("response_type", "code")
            .append_pair("scope", DRIVE_READONLY_SCOPE)
            .append_pair("state", state);
        Ok(url)
    }
}

/// `credentials.json` as downloaded from the cloud console.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl CredentialsFile {
    fn into_secrets(self) -> Option<ClientSecrets> {
        self.installed.or(self.web)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredToken {
    /// A zero-year expiry is how the token file spells "never".
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            None => true,
            Some(expiry) if expiry.year() <= 1 => true,
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) > now,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    /// Fields the endpoint omits are carried over from `previous`.
    fn into_stored(self, previous: Option<&StoredToken>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            token_type: self
                .token_type
                .or_else(|| previous.map(|p| p.token_type.clone()))
                .unwrap_or_else(default_token_type),
            refresh_token: self
                .refresh_token
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            expiry: self
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

/// POST a grant to the token endpoint and decode the answer.
async fn request_token(
    http: &reqwest::Client,
    secrets: &ClientSecrets,
    grant: &[(&str, &str)],
) -> Result<TokenResponse, RemoteError> {
    let mut form = grant.to_vec();
    form.push(("client_id", secrets.client_id.as_str()));
    form.push(("client_secret", secrets.client_secret.as_str()));

    let response = http
        .post(&secrets.token_uri)
        .form(&form)
        .send()
        .await
        .map_err(|err| RemoteError::Transport(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteError::Credentials(format!(
            "token endpoint answered {status}: {}",
            body.trim()
        )));
    }

    response
        .json()
        .await
        .map_err(|err| RemoteError::Malformed(err.to_string()))
}

/// Trade the code the user pasted back from the consent page for a token.
pub async fn exchange_code(
    http: &reqwest::Client,
    secrets: &ClientSecrets,
    code: &str,
) -> Result<StoredToken, RemoteError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(RemoteError::Credentials("authorization code is empty".into()));
    }
    let response = request_token(
        http,
        secrets,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", secrets.redirect_uri()),
        ],
    )
    .await?;
    Ok(response.into_stored(None))
}

/// Write the token file, readable by the owner only on unix.
pub async fn save_token(path: &Path, token: &StoredToken) -> Result<(), RemoteError> {
    let json = serde_json::to_vec_pretty(token)
        .map_err(|err| RemoteError::Malformed(err.to_string()))?;
    let io_error = |err: std::io::Error| {
        RemoteError::Credentials(format!("unable to write {}: {err}", path.display()))
    };

    tokio::fs::write(path, json).await.map_err(io_error)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(io_error)?;
    }
    Ok(())
}

/// Token file backed provider that refreshes against the client's token URI.
pub struct OAuthTokenSource {
    http: reqwest::Client,
    secrets: ClientSecrets,
    token_path: PathBuf,
    token: Mutex<StoredToken>,
}

impl std::fmt::Debug for OAuthTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenSource")
            .field("client_id", &self.secrets.client_id)
            .field("token_uri", &self.secrets.token_uri)
            .field("token_path", &self.token_path)
            .finish_non_exhaustive()
    }
}

impl OAuthTokenSource {
    pub fn new(
        http: reqwest::Client,
        secrets: ClientSecrets,
        token_path: PathBuf,
        token: StoredToken,
    ) -> Self {
        Self {
            http,
            secrets,
            token_path,
            token: Mutex::new(token),
        }
    }

    pub async fn from_files(
        http: reqwest::Client,
        credentials_path: &Path,
        token_path: &Path,
    ) -> Result<Self, RemoteError> {
        let secrets = ClientSecrets::from_file(credentials_path).await?;
        if !tokio::fs::try_exists(token_path).await.unwrap_or(false) {
            return Err(RemoteError::Credentials(format!(
                "{} does not exist; run `postwatch-server auth` first",
                token_path.display()
            )));
        }
        let token: StoredToken = read_json(token_path).await?;

        info!(
            client_id = %secrets.client_id,
            token_path = %token_path.display(),
            "loaded drive credentials"
        );
        Ok(Self::new(http, secrets, token_path.to_path_buf(), token))
    }

    async fn refresh(&self, current: &StoredToken) -> Result<StoredToken, RemoteError> {
        let refresh_token = current.refresh_token.as_deref().ok_or_else(|| {
            RemoteError::Credentials("access token expired and no refresh token is stored".into())
        })?;

        let refreshed = request_token(
            &self.http,
            &self.secrets,
            &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
        )
        .await?;
        Ok(refreshed.into_stored(Some(current)))
    }

    async fn persist(&self, token: &StoredToken) {
        if let Err(err) = save_token(&self.token_path, token).await {
            warn!(
                token_path = %self.token_path.display(),
                error = %err,
                "failed to save refreshed token"
            );
        }
    }
}

#[async_trait]
impl AccessTokenProvider for OAuthTokenSource {
    async fn access_token(&self) -> Result<String, RemoteError> {
        let mut token = self.token.lock().await;
        if token.is_fresh(Utc::now()) {
            return Ok(token.access_token.clone());
        }

        debug!("drive access token expired, refreshing");
        let refreshed = self.refresh(&token).await?;
        self.persist(&refreshed).await;
        *token = refreshed;
        Ok(token.access_token.clone())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, RemoteError> {
    let raw = tokio::fs::read(path).await.map_err(|err| {
        RemoteError::Credentials(format!("unable to read {}: {err}", path.display()))
    })?;
    serde_json::from_slice(&raw).map_err(|err| {
        RemoteError::Credentials(format!("unable to parse {}: {err}", path.display()))
    })
}
