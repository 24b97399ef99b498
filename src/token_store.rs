//! On-disk cache for the OAuth2 token.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::models::TokenResponse;

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Longest lifetime accepted from a token endpoint (one year).
const MAX_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// A cached OAuth2 token.
///
/// Field names match the JSON written by Go's `oauth2.Token`, so token files
/// produced by other Google tooling load unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn lifetime(expires_in: u64) -> Duration {
    let secs = i64::try_from(expires_in).map_or(MAX_LIFETIME_SECS, |s| s.min(MAX_LIFETIME_SECS));
    Duration::seconds(secs)
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredToken {
    /// Build a token from a token endpoint response received now.
    pub fn from_response(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token,
            expiry: Utc::now() + lifetime(response.expires_in),
            scope: response.scope,
        }
    }

    /// Whether the token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.expiry <= Utc::now() + Duration::seconds(EXPIRY_BUFFER_SECS)
    }

    /// Whether the token was granted `scope`. Tokens without a recorded
    /// scope are assumed to cover it.
    pub fn covers(&self, scope: &str) -> bool {
        match &self.scope {
            Some(granted) => granted.split_whitespace().any(|s| s == scope),
            None => true,
        }
    }
}

/// JSON file holding a single [`StoredToken`].
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached token. A missing file is not an error.
    pub fn load(&self) -> Result<Option<StoredToken>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cached token");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let token: StoredToken = serde_json::from_str(&content)?;
        Ok(Some(token))
    }

    /// Write the token, replacing any previous one.
    ///
    /// The JSON goes to a sibling `.tmp` file first and is renamed over the
    /// cache, so a failed write leaves the previous token intact.
    pub fn save(&self, token: &StoredToken) -> Result<()> {
        let json = serde_json::to_string_pretty(token)?;
        let temp = self.temp_path();

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let written = options.open(&temp).and_then(|mut file| {
            file.write_all(json.as_bytes())?;
            file.flush()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&temp, &self.path)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), "saved token");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
