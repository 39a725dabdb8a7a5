//! OAuth credentials for the Drive API.
//!
//! The client secrets come from the JSON file downloaded from the Google Cloud
//! console. The user's tokens are cached in a separate JSON file that is
//! created by the first interactive authorization and rewritten on every
//! refresh.

use crate::error::{DriveError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Full read/write access to the user's Drive.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Redirect URI used when the secrets file lists none.
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Refresh this long before the recorded expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Source of bearer tokens for Drive requests.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A currently valid access token.
    async fn access_token(&self) -> Result<String>;
}

/// A fixed access token, for callers that manage tokens themselves.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap an access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticToken").field(&"[REDACTED]").finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// OAuth client registration from the Google Cloud console.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientSecrets {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Consent page URL
    pub auth_uri: String,
    /// Token endpoint URL
    pub token_uri: String,
    /// Registered redirect URIs
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct SecretsDocument {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a client secrets document (`installed` or `web` application).
    pub fn from_json(json: &str) -> std::result::Result<Self, String> {
        let doc: SecretsDocument = serde_json::from_str(json).map_err(|e| e.to_string())?;
        doc.installed
            .or(doc.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" section".to_string())
    }

    /// Read and parse a client secrets file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DriveError::Credentials {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|message| DriveError::Credentials {
            path: path.display().to_string(),
            message,
        })
    }

    /// Redirect URI sent with the authorization request.
    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(OOB_REDIRECT_URI)
    }

    /// Consent page URL requesting offline Drive access.
    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?access_type=offline&client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.auth_uri,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(self.redirect_uri()),
            urlencoding::encode(DRIVE_SCOPE),
            urlencoding::encode(state),
        )
    }
}

/// A user's OAuth token as stored in the token file.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// Bearer token for API requests
    pub access_token: String,
    /// Token type, normally `Bearer`
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Long-lived token used to mint new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When `access_token` stops working
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    /// Whether the access token is expired or about to expire at `now`.
    ///
    /// A missing expiry, or the zero time `0001-01-01T00:00:00Z`, means the
    /// token never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) if expiry.year() > 1 => {
                now + ChronoDuration::seconds(EXPIRY_SKEW_SECS) >= expiry
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Token endpoint response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self, previous_refresh: Option<String>) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(default_token_type),
            refresh_token: self.refresh_token.or(previous_refresh),
            expiry: self
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        }
    }
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// JSON token file on disk.
///
/// Written with `0o600` permissions on unix.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Cache stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached token. Returns `None` if there is no token file.
    pub fn load(&self) -> Result<Option<Token>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let token = serde_json::from_str(&content).map_err(|e| {
            DriveError::Token(format!("unreadable token file {}: {}", self.path.display(), e))
        })?;
        Ok(Some(token))
    }

    /// Write `token`, replacing any previous one.
    pub fn save(&self, token: &Token) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(token)?;
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }
}

/// Installed-application OAuth credentials with a cached, refreshable token.
pub struct OAuthCredentials {
    http: reqwest::Client,
    secrets: ClientSecrets,
    cache: TokenCache,
    token: Mutex<Option<Token>>,
}

impl OAuthCredentials {
    /// Credentials backed by `cache`. The cached token, if any, is loaded.
    pub fn new(http: reqwest::Client, secrets: ClientSecrets, cache: TokenCache) -> Result<Self> {
        let token = cache.load()?;
        Ok(Self {
            http,
            secrets,
            cache,
            token: Mutex::new(token),
        })
    }

    /// Whether a token is available without user interaction.
    pub async fn has_token(&self) -> bool {
        self.token.lock().await.is_some()
    }

    /// Make sure a token is available, running the interactive flow on the
    /// terminal if the cache was empty.
    pub async fn ensure_authorized(&self) -> Result<()> {
        if self.has_token().await {
            return Ok(());
        }
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.authorize_interactive(stdin).await
    }

    /// Print the consent URL, read the authorization code from `input`,
    /// exchange it and save the resulting token.
    pub async fn authorize_interactive<R>(&self, mut input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let url = self.secrets.authorization_url("state-token");
        println!(
            "Go to the following link in your browser then type the authorization code: \n{}",
            url
        );

        let mut line = String::new();
        input.read_line(&mut line).await?;
        let code = line.trim();
        if code.is_empty() {
            return Err(DriveError::Token("no authorization code entered".to_string()));
        }

        let token = self.exchange_code(code).await?;
        info!(path = %self.cache.path().display(), "Saving credential file");
        self.cache.save(&token)?;
        *self.token.lock().await = Some(token);
        Ok(())
    }

    /// Exchange an authorization code for a token.
    pub async fn exchange_code(&self, code: &str) -> Result<Token> {
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.secrets.client_id),
                ("client_secret", &self.secrets.client_secret),
                ("redirect_uri", self.secrets.redirect_uri()),
            ])
            .await?;
        Ok(response.into_token(None))
    }

    /// Mint a new access token from `refresh_token`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token> {
        debug!("Refreshing access token");
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.secrets.client_id),
                ("client_secret", &self.secrets.client_secret),
            ])
            .await?;
        Ok(response.into_token(Some(refresh_token.to_string())))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.secrets.token_uri)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = match serde_json::from_str::<TokenErrorResponse>(&text) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => format!("token endpoint returned {}", status.as_u16()),
            };
            return Err(DriveError::Token(message));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentials {
    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        let Some(token) = guard.as_ref() else {
            return Err(DriveError::Token(
                "no cached token; authorization has not been completed".to_string(),
            ));
        };

        if !token.is_expired_at(Utc::now()) {
            return Ok(token.access_token.clone());
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(DriveError::Token(
                "access token expired and no refresh token is cached".to_string(),
            ));
        };
        let refreshed = self.refresh(&refresh_token).await?;
        self.cache.save(&refreshed)?;
        let access = refreshed.access_token.clone();
        *guard = Some(refreshed);
        Ok(access)
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.secrets.client_id)
            .field("token_file", &self.cache.path())
            .finish()
    }
}
