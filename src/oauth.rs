//! OAuth2 authorization-code flow plumbing
//!
//! - authorization URL construction (offline access, explicit scopes, forced consent)
//! - token endpoint calls (code exchange and refresh)
//! - one-shot local listener that captures the redirect

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Router,
};
use serde::Deserialize;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{GuardError, Result};

/// OAuth2 client registration
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl ClientSecrets {
    /// Build secrets, rejecting blank fields
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self> {
        let secrets = Self {
            client_id: client_id.into().trim().to_string(),
            client_secret: client_secret.into().trim().to_string(),
            redirect_uri: redirect_uri.into().trim().to_string(),
        };

        for (name, value) in [
            ("client id", &secrets.client_id),
            ("client secret", &secrets.client_secret),
            ("redirect URI", &secrets.redirect_uri),
        ] {
            if value.is_empty() {
                return Err(GuardError::ConfigError(format!("OAuth {} is empty", name)));
            }
        }

        Url::parse(&secrets.redirect_uri).map_err(|e| {
            GuardError::ConfigError(format!(
                "Redirect URI {:?} is not a valid URL: {}",
                secrets.redirect_uri, e
            ))
        })?;

        Ok(secrets)
    }
}

impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Build the consent URL the user is sent to
pub fn build_authorization_url(
    auth_uri: &str,
    secrets: &ClientSecrets,
    scopes: &[String],
    state: &str,
) -> Result<Url> {
    let mut url = Url::parse(auth_uri)
        .map_err(|e| GuardError::ConfigError(format!("Invalid authorization URI: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("client_id", &secrets.client_id)
        .append_pair("redirect_uri", &secrets.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &scopes.join(" "))
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("state", state);

    Ok(url)
}

/// Successful token endpoint response
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Token endpoint operations used by the credential manager
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code for access and refresh tokens
    async fn exchange_code(&self, secrets: &ClientSecrets, code: &str) -> Result<TokenResponse>;

    /// Obtain a fresh access token from a refresh token
    async fn refresh(&self, secrets: &ClientSecrets, refresh_token: &str) -> Result<TokenResponse>;
}

/// Token endpoint speaking Google's OAuth2 form protocol
pub struct GoogleTokenEndpoint {
    http: reqwest::Client,
    token_uri: String,
}

impl GoogleTokenEndpoint {
    pub fn new(token_uri: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token_uri: token_uri.into(),
        })
    }

    async fn post(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        debug!(uri = %self.token_uri, "POST token endpoint");
        let response = self.http.post(&self.token_uri).form(form).send().await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenResponse>()
                .await
                .map_err(|e| GuardError::InvalidResponse(format!("Malformed token response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<TokenErrorBody>(&body) {
            Ok(err) => match err.error_description {
                Some(description) => format!("{}: {}", err.error, description),
                None => err.error,
            },
            Err(_) => format!("HTTP {}", status.as_u16()),
        };

        Err(match status.as_u16() {
            400 | 401 | 403 => GuardError::AuthError(detail),
            429 => GuardError::RateLimitExceeded { retry_after: 5 },
            code @ 500..=599 => GuardError::ServerError {
                status: code,
                message: detail,
            },
            _ => GuardError::ApiError(detail),
        })
    }
}

#[async_trait]
impl TokenEndpoint for GoogleTokenEndpoint {
    async fn exchange_code(&self, secrets: &ClientSecrets, code: &str) -> Result<TokenResponse> {
        self.post(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &secrets.client_id),
            ("client_secret", &secrets.client_secret),
            ("redirect_uri", &secrets.redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, secrets: &ClientSecrets, refresh_token: &str) -> Result<TokenResponse> {
        self.post(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &secrets.client_id),
            ("client_secret", &secrets.client_secret),
        ])
        .await
    }
}

#[derive(Debug, Deserialize)]
struct RedirectParams {
    code: Option<String>,
    error: Option<String>,
    state: Option<String>,
}

type RedirectOutcome = std::result::Result<String, String>;

#[derive(Clone)]
struct RedirectState {
    expected_state: Arc<String>,
    result_tx: Arc<Mutex<Option<oneshot::Sender<RedirectOutcome>>>>,
}

async fn handle_redirect(
    State(state): State<RedirectState>,
    Query(params): Query<RedirectParams>,
) -> (StatusCode, &'static str) {
    let outcome = match (params.code, params.error) {
        (_, Some(error)) => Err(error),
        (Some(code), None) => Ok(code),
        (None, None) => return (StatusCode::OK, "No code received."),
    };

    // Codes and errors alike must carry the state this flow issued
    if params.state.as_deref() != Some(state.expected_state.as_str()) {
        warn!("Ignoring redirect with mismatched state parameter");
        return (StatusCode::BAD_REQUEST, "State mismatch. Please retry the authorization.");
    }

    let Some(tx) = state.result_tx.lock().await.take() else {
        return (StatusCode::OK, "Authorization already handled. You may close this window.");
    };

    let page = if outcome.is_ok() {
        (StatusCode::OK, "Authorization successful! You may now close this window.")
    } else {
        (StatusCode::OK, "Authorization failed. You may now close this window.")
    };
    let _ = tx.send(outcome);
    page
}

/// Aborts the redirect server if the waiting future is dropped
struct ServerTask(Option<JoinHandle<std::io::Result<()>>>);

impl ServerTask {
    async fn finish(mut self, grace: Duration) {
        if let Some(handle) = self.0.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(grace, handle).await.is_err() {
                abort.abort();
            }
        }
    }
}

impl Drop for ServerTask {
    fn drop(&mut self) {
        if let Some(handle) = &self.0 {
            handle.abort();
        }
    }
}

/// One-shot HTTP listener for the OAuth redirect
pub struct RedirectListener {
    listener: TcpListener,
}

impl RedirectListener {
    /// Bind on the loopback interface; port 0 picks a free port
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            GuardError::AuthError(format!("Cannot listen for OAuth redirect on {}: {}", addr, e))
        })?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The loopback URI this listener answers on, port included
    pub fn redirect_uri(&self) -> Result<String> {
        Ok(format!("http://{}", self.local_addr()?))
    }

    /// Serve until a redirect carrying `code` or `error` arrives, or `timeout` elapses
    pub async fn wait_for_code(self, timeout: Duration, expected_state: &str) -> Result<String> {
        let addr = self.local_addr()?;
        let (result_tx, result_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let app = Router::new().fallback(handle_redirect).with_state(RedirectState {
            expected_state: Arc::new(expected_state.to_string()),
            result_tx: Arc::new(Mutex::new(Some(result_tx))),
        });

        let server = axum::serve(self.listener, app).with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        });
        let task = ServerTask(Some(tokio::spawn(async move { server.await })));
        info!("Listening for OAuth redirect on http://{}", addr);

        let received = tokio::time::timeout(timeout, result_rx).await;
        let _ = stop_tx.send(());
        task.finish(Duration::from_secs(2)).await;

        match received {
            Err(_) => Err(GuardError::AuthError(format!(
                "No authorization redirect received within {:?}",
                timeout
            ))),
            Ok(Err(_)) => Err(GuardError::AuthError(
                "Redirect listener closed before a response arrived".to_string(),
            )),
            Ok(Ok(Ok(code))) => Ok(code),
            Ok(Ok(Err(error))) => Err(GuardError::AuthError(format!(
                "Authorization was denied: {}",
                error
            ))),
        }
    }
}
