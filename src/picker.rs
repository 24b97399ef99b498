//! Google Photos Picker API client.
//!
//! The picker is a two-phase protocol: a session is created and its
//! `pickerUri` shown to the user, who selects media in a browser. The session
//! is then polled at the server's suggested interval until `mediaItemsSet`
//! flips to true, after which the picked items are paged out.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::error::{ensure_success, PhotosError, Result};
use crate::models::{MediaRef, PickedMediaItemsResponse, PickingSession};

/// Base URL for the Photos Picker API v1.
const PICKER_API_BASE: &str = "https://photospicker.googleapis.com/v1";

/// Items requested per `mediaItems.list` page (the API maximum).
const PAGE_SIZE: u32 = 100;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Client for picker sessions.
pub struct PickerClient {
    base_url: String,
    auth: Authenticator,
    http: Client,
}

impl PickerClient {
    pub fn new(auth: Authenticator) -> Self {
        Self::with_base_url(auth, PICKER_API_BASE)
    }

    /// Point the client at a different API root, e.g. a mock server.
    pub fn with_base_url(auth: Authenticator, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            http: Client::new(),
        }
    }

    /// Create a new picking session.
    pub async fn create_session(&self) -> Result<PickingSession> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .post(format!("{}/sessions", self.base_url))
            .bearer_auth(&token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let session: PickingSession = ensure_success(response).await?.json().await?;
        debug!(session_id = %session.id, "created picker session");
        Ok(session)
    }

    /// Fetch the current state of a session.
    pub async fn get_session(&self, session_id: &str) -> Result<PickingSession> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .get(format!("{}/sessions/{}", self.base_url, session_id))
            .bearer_auth(&token)
            .send()
            .await?;

        let session: PickingSession = ensure_success(response).await?.json().await?;
        Ok(session)
    }

    /// Delete a session. Deleting one that is already gone is not an error.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .delete(format!("{}/sessions/{}", self.base_url, session_id))
            .bearer_auth(&token)
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }

    /// Poll `session` until the user has finished picking.
    ///
    /// The interval follows the latest `pollInterval` the server sent; the
    /// overall deadline is the first session's `timeoutIn`, counted from now,
    /// and never runs past the session's `expireTime`.
    pub async fn wait_for_selection(&self, session: PickingSession) -> Result<PickingSession> {
        let polling = session.polling_config.clone().unwrap_or_default();
        let timeout_at = Instant::now() + polling.timeout_in.unwrap_or(DEFAULT_TIMEOUT);
        let mut interval = polling.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL);
        let mut current = session;

        loop {
            if current.media_items_set {
                info!(session_id = %current.id, "media selection complete");
                return Ok(current);
            }

            let now = Instant::now();
            let expires_at = expiry_instant(&current, now);
            if expires_at.is_some_and(|at| now >= at) {
                return Err(PhotosError::SessionExpired {
                    session_id: current.id,
                });
            }
            if now >= timeout_at {
                return Err(PhotosError::PickerTimeout {
                    session_id: current.id,
                });
            }

            let deadline = expires_at.map_or(timeout_at, |at| at.min(timeout_at));
            sleep(interval.min(deadline - now)).await;
            current = self.get_session(&current.id).await?;

            if let Some(next) = current
                .polling_config
                .as_ref()
                .and_then(|config| config.poll_interval)
            {
                interval = next;
            }
            debug!(
                session_id = %current.id,
                media_items_set = current.media_items_set,
                ?interval,
                "polled picker session"
            );
        }
    }

    /// List every item picked in a completed session, in server order.
    pub async fn list_picked_items(&self, session_id: &str) -> Result<Vec<MediaRef>> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;
        let page_size = PAGE_SIZE.to_string();

        loop {
            let token = self.auth.get_access_token().await?;
            let mut request = self
                .http
                .get(format!("{}/mediaItems", self.base_url))
                .bearer_auth(&token)
                .query(&[("sessionId", session_id), ("pageSize", page_size.as_str())]);

            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = ensure_success(request.send().await?).await?;
            let page: PickedMediaItemsResponse = response.json().await?;
            debug!(count = page.media_items.len(), "fetched picked items page");
            all_items.extend(page.media_items.into_iter().map(MediaRef::from));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_items)
    }

    /// Run a full picker negotiation and return the picked media.
    ///
    /// The session is deleted afterwards whether or not picking succeeded.
    pub async fn pick(&self) -> Result<Vec<MediaRef>> {
        let session = self.create_session().await?;
        let session_id = session.id.clone();

        match session.picker_uri.as_deref() {
            Some(uri) => {
                println!("Open the following link to select photos, then press Done:");
                println!("{}", uri);
            }
            None => warn!(%session_id, "picker session has no pickerUri"),
        }

        let result = match self.wait_for_selection(session).await {
            Ok(ready) => self.list_picked_items(&ready.id).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.delete_session(&session_id).await {
            warn!(%session_id, error = %e, "failed to delete picker session");
        }

        result
    }
}

/// Map the session's wall-clock `expireTime` onto the monotonic clock.
fn expiry_instant(session: &PickingSession, now: Instant) -> Option<Instant> {
    let remaining = session.expire_time? - Utc::now();
    // A negative remainder fails the conversion: already expired.
    Some(remaining.to_std().map_or(now, |left| now + left))
}
