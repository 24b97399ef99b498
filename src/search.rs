//! Google Photos Library API search client.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::auth::Authenticator;
use crate::error::{ensure_success, Result};
use crate::models::{MediaItemsResponse, MediaRef};

/// Base URL for the Photos Library API v1.
const LIBRARY_API_BASE: &str = "https://photoslibrary.googleapis.com/v1";

/// Items requested per search page (the API maximum).
const PAGE_SIZE: u32 = 100;

/// Pause between pages to stay clear of rate limits.
const PAGE_DELAY: Duration = Duration::from_millis(100);

/// Library features that can be filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feature {
    Favorites,
}

/// Media types that can be filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Photo,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFilter {
    pub included_features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTypeFilter {
    pub media_types: Vec<MediaType>,
}

/// The `filters` object of a search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_filter: Option<FeatureFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type_filter: Option<MediaTypeFilter>,
}

impl SearchFilter {
    /// Only items the user marked as favorite.
    pub fn favorites() -> Self {
        Self::default().with_feature(Feature::Favorites)
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.feature_filter
            .get_or_insert_with(|| FeatureFilter {
                included_features: Vec::new(),
            })
            .included_features
            .push(feature);
        self
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type_filter
            .get_or_insert_with(|| MediaTypeFilter {
                media_types: Vec::new(),
            })
            .media_types
            .push(media_type);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.feature_filter.is_none() && self.media_type_filter.is_none()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<&'a SearchFilter>,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

/// Client for the `mediaItems:search` endpoint.
pub struct SearchClient {
    base_url: String,
    auth: Authenticator,
    http: Client,
}

impl SearchClient {
    pub fn new(auth: Authenticator) -> Self {
        Self::with_base_url(auth, LIBRARY_API_BASE)
    }

    pub fn with_base_url(auth: Authenticator, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            http: Client::new(),
        }
    }

    /// Search the library, following continuation tokens to the last page.
    pub async fn search(&self, filter: &SearchFilter) -> Result<Vec<MediaRef>> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;
        let filters = (!filter.is_empty()).then_some(filter);

        loop {
            let token = self.auth.get_access_token().await?;
            let body = SearchRequest {
                filters,
                page_size: PAGE_SIZE,
                page_token: page_token.as_deref(),
            };

            let response = self
                .http
                .post(format!("{}/mediaItems:search", self.base_url))
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await?;

            let page: MediaItemsResponse = ensure_success(response).await?.json().await?;
            debug!(count = page.media_items.len(), "fetched search page");
            all_items.extend(page.media_items.into_iter().map(MediaRef::from));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }

            tokio::time::sleep(PAGE_DELAY).await;
        }

        Ok(all_items)
    }
}
