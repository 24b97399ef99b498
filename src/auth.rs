//! OAuth2 installed-app authorization for Google Photos.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore as _;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::callback::CallbackListener;
use crate::error::{PhotosError, Result};
use crate::models::{ClientSecretsFile, ClientSecrets, TokenResponse};
use crate::token_store::{StoredToken, TokenStore};

/// Google OAuth2 authorization endpoint.
const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google OAuth2 token endpoint.
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Read access to items the user picks in the Photos Picker.
pub const PICKER_SCOPE: &str = "https://www.googleapis.com/auth/photospicker.mediaitems.readonly";

/// Read access to the Photos Library (search).
pub const LIBRARY_SCOPE: &str = "https://www.googleapis.com/auth/photoslibrary.readonly";

/// OAuth client identity, endpoints and the scope to request.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub scope: String,
}

impl OAuthConfig {
    /// Load the client from a Google `credentials.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P, scope: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let file: ClientSecretsFile = serde_json::from_str(&content)?;
        let secrets = file
            .installed
            .or(file.web)
            .ok_or(PhotosError::MissingClientSecrets)?;
        Ok(Self::from_secrets(secrets, scope))
    }

    pub fn from_secrets(secrets: ClientSecrets, scope: &str) -> Self {
        Self {
            client_id: secrets.client_id,
            client_secret: secrets.client_secret,
            auth_uri: secrets.auth_uri.unwrap_or_else(|| AUTH_URI.to_string()),
            token_uri: secrets.token_uri.unwrap_or_else(|| TOKEN_URI.to_string()),
            scope: scope.to_string(),
        }
    }

    /// Consent page URL. `access_type=offline` asks for a refresh token.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url> {
        let url = Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", self.scope.as_str()),
                ("access_type", "offline"),
                ("state", state),
            ],
        )?;
        Ok(url)
    }

    /// Exchange an authorization code for a token.
    pub async fn exchange_code(
        &self,
        http: &Client,
        code: &str,
        redirect_uri: &str,
    ) -> Result<StoredToken> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ];

        let response = http.post(&self.token_uri).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PhotosError::AuthorizationError(format!(
                "token exchange returned {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        let mut token = StoredToken::from_response(token_response);
        if token.scope.is_none() {
            token.scope = Some(self.scope.clone());
        }
        Ok(token)
    }

    /// Refresh `previous`, keeping its refresh token and scope when the
    /// response omits them.
    pub async fn refresh(&self, http: &Client, previous: &StoredToken) -> Result<StoredToken> {
        let refresh_token = previous
            .refresh_token
            .as_deref()
            .ok_or_else(|| PhotosError::TokenRefreshError("no refresh token".to_string()))?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = http.post(&self.token_uri).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PhotosError::TokenRefreshError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        let mut token = StoredToken::from_response(token_response);
        if token.refresh_token.is_none() {
            token.refresh_token = previous.refresh_token.clone();
        }
        if token.scope.is_none() {
            token.scope = previous.scope.clone();
        }
        Ok(token)
    }
}

/// Random anti-forgery value for the authorization request.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Source of bearer tokens for API calls.
#[derive(Clone)]
pub struct Authenticator {
    config: Arc<OAuthConfig>,
    client: Client,
    token: Arc<RwLock<StoredToken>>,
    store: Option<TokenStore>,
}

impl Authenticator {
    /// Wrap an existing token. Refreshed tokens are written to `store` if given.
    pub fn with_token(config: OAuthConfig, token: StoredToken, store: Option<TokenStore>) -> Self {
        Self {
            config: Arc::new(config),
            client: Client::new(),
            token: Arc::new(RwLock::new(token)),
            store,
        }
    }

    /// Obtain a usable token: cached, refreshed, or from the browser flow.
    pub async fn login(
        config: OAuthConfig,
        store: TokenStore,
        callback_addr: SocketAddr,
    ) -> Result<Self> {
        let client = Client::new();

        match store.load() {
            Ok(Some(cached)) if cached.covers(&config.scope) => {
                if !cached.is_expired() {
                    info!(path = %store.path().display(), "using cached token");
                    return Ok(Self::with_token(config, cached, Some(store)));
                }
                if cached.refresh_token.is_some() {
                    match config.refresh(&client, &cached).await {
                        Ok(token) => {
                            info!("refreshed cached token");
                            if let Err(e) = store.save(&token) {
                                warn!(
                                    error = %e,
                                    path = %store.path().display(),
                                    "failed to save refreshed token"
                                );
                            }
                            return Ok(Self::with_token(config, token, Some(store)));
                        }
                        Err(e) => warn!(error = %e, "token refresh failed, re-authorizing"),
                    }
                } else {
                    info!("cached token expired without a refresh token");
                }
            }
            Ok(Some(_)) => info!(scope = %config.scope, "cached token lacks scope, re-authorizing"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "ignoring unreadable token cache"),
        }

        let token = authorize_in_browser(&client, &config, callback_addr).await?;
        println!("Saving token to {}", store.path().display());
        store.save(&token)?;
        Ok(Self::with_token(config, token, Some(store)))
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        let mut token = self.token.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if token.is_expired() {
            let refreshed = self.config.refresh(&self.client, &token).await?;
            if let Some(store) = &self.store {
                if let Err(e) = store.save(&refreshed) {
                    warn!(
                        error = %e,
                        path = %store.path().display(),
                        "failed to save refreshed token"
                    );
                }
            }
            *token = refreshed;
        }
        Ok(token.access_token.clone())
    }
}

/// Run the browser consent flow and exchange the resulting code.
async fn authorize_in_browser(
    client: &Client,
    config: &OAuthConfig,
    callback_addr: SocketAddr,
) -> Result<StoredToken> {
    let listener = CallbackListener::bind(callback_addr).await?;
    let redirect_uri = listener.redirect_uri();
    let state = generate_state();
    let url = config.authorization_url(&redirect_uri, &state)?;

    println!("Open the following link in your browser to authorize access:");
    println!("{}", url);
    info!(%redirect_uri, "waiting for OAuth callback");

    let code = listener.wait_for_code(&state).await?;
    config.exchange_code(client, &code, &redirect_uri).await
}
