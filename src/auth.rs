//! OAuth2 credential lifecycle for the YouTube Data API
//!
//! State machine: Unconfigured -> AwaitingConsent -> Authorized <-> Expired -> Revoked.
//! A failed refresh clears the in-memory tokens and the persisted credential,
//! so the next run goes back through interactive consent.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::OAuthConfig;
use crate::error::{GuardError, Result};
use crate::oauth::{build_authorization_url, ClientSecrets, RedirectListener, TokenEndpoint, TokenResponse};

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unconfigured,
    AwaitingConsent,
    Authorized,
    Expired,
    Revoked,
}

/// Persisted OAuth2 credential
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub client_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl Credential {
    pub fn from_token_response(client_id: &str, response: TokenResponse, now: DateTime<Utc>) -> Self {
        let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Self {
            client_id: client_id.to_string(),
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: now + ChronoDuration::seconds(lifetime),
            scope: response.scope,
        }
    }

    /// Apply a refresh response; Google usually omits the refresh token, keep ours then
    pub fn refreshed(&self, response: TokenResponse, now: DateTime<Utc>) -> Self {
        let mut next = Self::from_token_response(&self.client_id, response, now);
        if next.refresh_token.is_none() {
            next.refresh_token = self.refresh_token.clone();
        }
        if next.scope.is_none() {
            next.scope = self.scope.clone();
        }
        next
    }

    pub fn is_expired(&self, now: DateTime<Utc>, skew: ChronoDuration) -> bool {
        self.expires_at - skew <= now
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Durable storage for the credential
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>>;
    async fn save(&self, credential: &Credential) -> Result<()>;
    async fn remove(&self) -> Result<()>;
}

/// JSON credential file readable by the owner only
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(credential)?;
        tokio::fs::write(&self.path, content).await?;
        secure_token_file(&self.path).await?;
        debug!("Saved credential to {:?}", self.path);
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Removed stored credential {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, nothing survives a restart
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: std::sync::Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: std::sync::Mutex::new(Some(credential)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Credential>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> Option<Credential> {
        self.lock().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        Ok(self.lock().clone())
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        *self.lock() = Some(credential.clone());
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        *self.lock() = None;
        Ok(())
    }
}

/// Opens the consent page for the user
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Launches the platform's default browser
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(windows) {
            let mut command = Command::new("cmd");
            command.args(["/C", "start", ""]);
            command
        } else {
            Command::new("xdg-open")
        };

        command
            .arg(url)
            .spawn()
            .map(|_| ())
            .map_err(|e| GuardError::Unknown(format!("Failed to launch browser: {}", e)))
    }
}

/// Source of bearer tokens for API calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

struct AuthInner {
    state: AuthState,
    secrets: Option<ClientSecrets>,
    credential: Option<Credential>,
    /// Redirect URI sent with the last consent request
    consent_redirect_uri: Option<String>,
}

/// Owns the OAuth2 credential and keeps it fresh.
///
/// All token reads go through an internal lock so concurrent callers never
/// trigger more than one refresh.
pub struct CredentialManager {
    settings: OAuthConfig,
    store: Arc<dyn CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    browser: Arc<dyn BrowserLauncher>,
    inner: Mutex<AuthInner>,
}

impl CredentialManager {
    pub fn new(
        settings: OAuthConfig,
        store: Arc<dyn CredentialStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        browser: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            settings,
            store,
            endpoint,
            browser,
            inner: Mutex::new(AuthInner {
                state: AuthState::Unconfigured,
                secrets: None,
                credential: None,
                consent_redirect_uri: None,
            }),
        }
    }

    pub async fn state(&self) -> AuthState {
        self.inner.lock().await.state
    }

    pub async fn credential(&self) -> Option<Credential> {
        self.inner.lock().await.credential.clone()
    }

    /// Register the OAuth client. Fails with `ConfigError` on blank values.
    pub async fn configure(&self, secrets: ClientSecrets) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let same_client = inner
            .credential
            .as_ref()
            .is_some_and(|c| c.client_id == secrets.client_id);
        if !same_client {
            inner.credential = None;
        }

        info!(client_id = %secrets.client_id, "OAuth client configured");
        inner.secrets = Some(secrets);
        inner.state = if same_client {
            AuthState::Authorized
        } else {
            AuthState::AwaitingConsent
        };
        Ok(())
    }

    fn configured_secrets(inner: &AuthInner) -> Result<ClientSecrets> {
        inner.secrets.clone().ok_or_else(|| {
            GuardError::ConfigError("OAuth client id and secret have not been configured".to_string())
        })
    }

    /// Load a stored credential and make sure it still works.
    ///
    /// Returns `Ok(false)` when nothing usable is stored; a credential that
    /// cannot be refreshed is deleted. Network trouble during the refresh is
    /// returned as an error and the stored credential is kept.
    pub async fn load_persisted(&self) -> Result<bool> {
        {
            let mut inner = self.inner.lock().await;
            let secrets = Self::configured_secrets(&inner)?;

            let stored = match self.store.load().await {
                Ok(stored) => stored,
                Err(e) => {
                    warn!("Stored credential is unreadable, discarding it: {}", e);
                    self.remove_stored().await;
                    return Ok(false);
                }
            };

            let Some(credential) = stored else {
                debug!("No stored credential");
                return Ok(false);
            };

            if credential.client_id != secrets.client_id {
                warn!("Stored credential belongs to a different OAuth client, discarding it");
                self.remove_stored().await;
                return Ok(false);
            }

            inner.credential = Some(credential);
            inner.state = AuthState::Authorized;
        }

        match self.ensure_valid_access_token().await {
            Ok(_) => {
                info!("Restored stored credential");
                Ok(true)
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                warn!("Stored credential is no longer valid: {}", e);
                let mut inner = self.inner.lock().await;
                inner.credential = None;
                inner.state = AuthState::AwaitingConsent;
                Ok(false)
            }
        }
    }

    /// Return a usable access token, refreshing it if it is close to expiry
    pub async fn ensure_valid_access_token(&self) -> Result<String> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            AuthState::Unconfigured => {
                return Err(GuardError::ConfigError(
                    "OAuth client id and secret have not been configured".to_string(),
                ))
            }
            AuthState::Revoked => {
                return Err(GuardError::AuthError(
                    "Credential was revoked, interactive authorization required".to_string(),
                ))
            }
            _ => {}
        }

        let Some(credential) = inner.credential.clone() else {
            return Err(GuardError::AuthError(
                "No credential available, interactive authorization required".to_string(),
            ));
        };

        let now = Utc::now();
        if !credential.is_expired(now, self.settings.expiry_skew()) {
            inner.state = AuthState::Authorized;
            return Ok(credential.access_token);
        }

        inner.state = AuthState::Expired;
        let Some(refresh_token) = credential.refresh_token.clone() else {
            self.revoke(&mut inner).await;
            return Err(GuardError::AuthError(
                "Access token expired and no refresh token is available".to_string(),
            ));
        };
        let secrets = Self::configured_secrets(&inner)?;

        debug!("Access token expired, refreshing");
        match self.endpoint.refresh(&secrets, &refresh_token).await {
            Ok(response) => {
                let refreshed = credential.refreshed(response, Utc::now());
                if let Err(e) = self.store.save(&refreshed).await {
                    warn!("Failed to persist refreshed credential: {}", e);
                }
                let token = refreshed.access_token.clone();
                inner.credential = Some(refreshed);
                inner.state = AuthState::Authorized;
                info!("Access token refreshed");
                Ok(token)
            }
            Err(e) if e.is_transient() => {
                warn!("Token refresh failed, will retry later: {}", e);
                Err(e)
            }
            Err(e) => {
                self.revoke(&mut inner).await;
                Err(GuardError::AuthError(format!("Token refresh rejected: {}", e)))
            }
        }
    }

    async fn revoke(&self, inner: &mut AuthInner) {
        warn!("Discarding credential, re-authorization required");
        inner.credential = None;
        inner.state = AuthState::Revoked;
        self.remove_stored().await;
    }

    async fn remove_stored(&self) {
        if let Err(e) = self.store.remove().await {
            warn!("Failed to remove stored credential: {}", e);
        }
    }

    /// Open the consent page and wait for the redirect; returns the authorization code
    pub async fn begin_interactive_authorization(&self) -> Result<String> {
        let secrets = {
            let mut inner = self.inner.lock().await;
            let secrets = Self::configured_secrets(&inner)?;
            inner.state = AuthState::AwaitingConsent;
            secrets
        };

        let listener = RedirectListener::bind(self.settings.redirect_port).await?;
        // The browser must come back to the port actually bound, whatever the registration says
        let redirect_uri = listener.redirect_uri()?;
        if redirect_uri != secrets.redirect_uri {
            debug!(configured = %secrets.redirect_uri, %redirect_uri, "Using listener address as redirect URI");
        }
        let secrets = ClientSecrets {
            redirect_uri: redirect_uri.clone(),
            ..secrets
        };
        self.inner.lock().await.consent_redirect_uri = Some(redirect_uri);

        let csrf_state = uuid::Uuid::new_v4().to_string();
        let url = build_authorization_url(
            &self.settings.auth_uri,
            &secrets,
            &self.settings.scopes,
            &csrf_state,
        )?;

        info!("Opening browser for YouTube authorization");
        if let Err(e) = self.browser.open(url.as_str()) {
            warn!("{}. Open this URL manually: {}", e, url);
        }

        listener
            .wait_for_code(self.settings.consent_timeout(), &csrf_state)
            .await
    }

    /// Trade an authorization code for tokens and persist them
    pub async fn exchange_code_for_tokens(&self, code: &str) -> Result<Credential> {
        let mut inner = self.inner.lock().await;
        let mut secrets = Self::configured_secrets(&inner)?;
        if let Some(redirect_uri) = &inner.consent_redirect_uri {
            secrets.redirect_uri = redirect_uri.clone();
        }

        let response = self.endpoint.exchange_code(&secrets, code).await?;
        let credential = Credential::from_token_response(&secrets.client_id, response, Utc::now());
        if credential.refresh_token.is_none() {
            warn!("Token endpoint returned no refresh token; access will lapse at {}", credential.expires_at);
        }

        self.store.save(&credential).await?;
        inner.credential = Some(credential.clone());
        inner.consent_redirect_uri = None;
        inner.state = AuthState::Authorized;
        info!("Authorization complete");
        Ok(credential)
    }

    /// Reuse a stored credential when possible, otherwise run the consent flow
    pub async fn authorize(&self) -> Result<Credential> {
        if self.load_persisted().await? {
            if let Some(credential) = self.credential().await {
                return Ok(credential);
            }
        }

        let code = self.begin_interactive_authorization().await?;
        self.exchange_code_for_tokens(&code).await
    }

    /// Forget the credential everywhere
    pub async fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.credential = None;
        inner.consent_redirect_uri = None;
        inner.state = if inner.secrets.is_some() {
            AuthState::AwaitingConsent
        } else {
            AuthState::Unconfigured
        };
        self.store.remove().await
    }
}

#[async_trait]
impl TokenProvider for CredentialManager {
    async fn access_token(&self) -> Result<String> {
        self.ensure_valid_access_token().await
    }
}

/// Read client secrets from a Google "installed app" JSON file
pub async fn load_client_secrets_from_file(path: &Path) -> Result<ClientSecrets> {
    let secret = yup_oauth2::read_application_secret(path)
        .await
        .map_err(|e| GuardError::ConfigError(format!("Failed to read client secrets {:?}: {}", path, e)))?;

    let redirect_uri = secret
        .redirect_uris
        .first()
        .cloned()
        .ok_or_else(|| GuardError::ConfigError("Client secrets file has no redirect URI".to_string()))?;

    ClientSecrets::new(secret.client_id, secret.client_secret, redirect_uri)
}

/// Read client secrets from the environment
///
/// # Environment Variables
/// - `YT_CLIENT_ID`: OAuth2 client ID
/// - `YT_CLIENT_SECRET`: OAuth2 client secret
/// - `GOOGLE_REDIRECT_URI`: optional, defaults to `http://localhost:<redirect_port>`
pub fn load_client_secrets_from_env(redirect_port: u16) -> Result<ClientSecrets> {
    let client_id = env::var("YT_CLIENT_ID")
        .map_err(|_| GuardError::ConfigError("YT_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("YT_CLIENT_SECRET")
        .map_err(|_| GuardError::ConfigError("YT_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("GOOGLE_REDIRECT_URI")
        .unwrap_or_else(|_| format!("http://localhost:{}", redirect_port));

    ClientSecrets::new(client_id, client_secret, redirect_uri)
}

/// Restrict a token file to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    // ACL-based; the user profile directory is already private
    Ok(())
}
