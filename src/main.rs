//! photo_fetch CLI - Download Google Photos media to a local folder.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use photo_fetch::search::{Feature, MediaType};
use photo_fetch::{
    Authenticator, Downloader, OAuthConfig, PickerClient, SearchClient, SearchFilter, TokenStore,
    LIBRARY_SCOPE, PICKER_SCOPE,
};

/// Download photos from Google Photos, skipping ones already saved.
#[derive(Parser)]
#[command(name = "photo_fetch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Folder where photos will be saved (created if missing).
    #[arg(long, short = 'f')]
    folder: PathBuf,

    /// Path to the OAuth client credentials JSON file.
    #[arg(long, env = "PHOTO_FETCH_CREDENTIALS", default_value = "credentials.json")]
    credentials: PathBuf,

    /// Path of the cached OAuth token.
    #[arg(long, env = "PHOTO_FETCH_TOKEN", default_value = "token.json")]
    token_file: PathBuf,

    /// Address the OAuth callback listener binds to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select photos in the browser with the Google Photos picker.
    Pick,

    /// Download library items matching a filter.
    Search {
        /// Library feature to filter on.
        #[arg(long, value_enum, default_value_t = FeatureArg::Favorites)]
        feature: FeatureArg,

        /// Restrict results to one media type.
        #[arg(long, value_enum, default_value_t = MediaTypeArg::All)]
        media_type: MediaTypeArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FeatureArg {
    Favorites,
    None,
}

#[derive(Clone, Copy, ValueEnum)]
enum MediaTypeArg {
    All,
    Photo,
    Video,
}

impl Commands {
    fn scope(&self) -> &'static str {
        match self {
            Commands::Pick => PICKER_SCOPE,
            Commands::Search { .. } => LIBRARY_SCOPE,
        }
    }
}

fn build_filter(feature: FeatureArg, media_type: MediaTypeArg) -> SearchFilter {
    let mut filter = SearchFilter::default();
    if let FeatureArg::Favorites = feature {
        filter = filter.with_feature(Feature::Favorites);
    }
    match media_type {
        MediaTypeArg::All => filter,
        MediaTypeArg::Photo => filter.with_media_type(MediaType::Photo),
        MediaTypeArg::Video => filter.with_media_type(MediaType::Video),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "photo_fetch=info".into()))
        .init();

    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.folder)
        .with_context(|| format!("Failed to create directory: {:?}", cli.folder))?;

    let config = OAuthConfig::from_file(&cli.credentials, cli.command.scope())
        .with_context(|| format!("Failed to load credentials from {:?}", cli.credentials))?;

    let auth = Authenticator::login(config, TokenStore::new(&cli.token_file), cli.listen)
        .await
        .context("Unable to obtain an OAuth token")?;

    let items = match cli.command {
        Commands::Pick => PickerClient::new(auth.clone())
            .pick()
            .await
            .context("Failed to retrieve picked photos")?,
        Commands::Search {
            feature,
            media_type,
        } => {
            println!("Searching Google Photos...");
            SearchClient::new(auth.clone())
                .search(&build_filter(feature, media_type))
                .await
                .context("Failed to search photos")?
        }
    };

    println!("Found {} item(s). Saving to {:?}...", items.len(), cli.folder);
    info!(count = items.len(), "starting downloads");

    let summary = Downloader::new(auth).download_all(&items, &cli.folder).await;
    println!("Finished: {}", summary);

    if summary.failed > 0 {
        anyhow::bail!("{} download(s) failed", summary.failed);
    }
    Ok(())
}
