//! photo_fetch - download Google Photos media to a local folder.
//!
//! This library provides functionality to:
//! - Authorize against Google with the installed-app OAuth2 flow, caching the token on disk
//! - Let the user pick media in a browser through a Photos Picker session
//! - Search the Photos Library with filters such as favorites
//! - Download media, skipping files that already exist locally
//!
//! # Example
//!
//! ```no_run
//! use photo_fetch::{Authenticator, Downloader, OAuthConfig, PickerClient, TokenStore, PICKER_SCOPE};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = OAuthConfig::from_file("credentials.json", PICKER_SCOPE)?;
//!     let store = TokenStore::new("token.json");
//!     let auth = Authenticator::login(config, store, "127.0.0.1:8080".parse()?).await?;
//!
//!     let picked = PickerClient::new(auth.clone()).pick().await?;
//!     let summary = Downloader::new(auth)
//!         .download_all(&picked, std::path::Path::new("photos"))
//!         .await;
//!     println!("{}", summary);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod callback;
pub mod download;
pub mod error;
pub mod models;
pub mod picker;
pub mod search;
pub mod token_store;

// Re-exports for convenience
pub use auth::{Authenticator, OAuthConfig, LIBRARY_SCOPE, PICKER_SCOPE};
pub use download::{DownloadOutcome, DownloadSummary, Downloader};
pub use error::{PhotosError, Result};
pub use models::{MediaKind, MediaRef};
pub use picker::PickerClient;
pub use search::{SearchClient, SearchFilter};
pub use token_store::{StoredToken, TokenStore};
