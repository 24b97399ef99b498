//! One-shot loopback HTTP listener for the OAuth redirect.

use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{PhotosError, Result};

const SUCCESS_PAGE: &str =
    "<html><body><h3>Authorization code received. You can close this window.</h3></body></html>";
const FAILURE_PAGE: &str =
    "<html><body><h3>Authorization was not granted. You can close this window.</h3></body></html>";
const MISSING_CODE_PAGE: &str = "<html><body><h3>Missing authorization code.</h3></body></html>";

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// A bound listener waiting for exactly one OAuth redirect.
pub struct CallbackListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl CallbackListener {
    /// Bind the listener. Port 0 picks any free port.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Redirect URI to register with the authorization request.
    pub fn redirect_uri(&self) -> String {
        if self.local_addr.ip().is_unspecified() {
            format!("http://localhost:{}/", self.local_addr.port())
        } else {
            format!("http://{}/", self.local_addr)
        }
    }

    /// Serve until the first redirect arrives, then shut down and return its code.
    pub async fn wait_for_code(self, expected_state: &str) -> Result<String> {
        let (code_tx, mut code_rx) = mpsc::channel::<CallbackParams>(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = Router::new()
            .route("/", get(handle_callback))
            .with_state(code_tx);

        let listener = self.listener;
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let params = code_rx.recv().await;
        let _ = shutdown_tx.send(());
        match server.await {
            Ok(Ok(())) => debug!("callback listener stopped"),
            Ok(Err(e)) => warn!(error = %e, "callback listener failed"),
            Err(e) => warn!(error = %e, "callback listener task panicked"),
        }

        let params = params.ok_or_else(|| {
            PhotosError::AuthorizationError("callback listener closed before a redirect arrived".to_string())
        })?;
        validate_callback(params, expected_state)
    }
}

/// Check a redirect against the state we sent and extract the code.
pub fn validate_callback(params: CallbackParams, expected_state: &str) -> Result<String> {
    if let Some(error) = params.error {
        return Err(PhotosError::AuthorizationError(error));
    }
    if params.state.as_deref() != Some(expected_state) {
        return Err(PhotosError::StateMismatch);
    }
    params
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| PhotosError::AuthorizationError("redirect carried no code".to_string()))
}

async fn handle_callback(
    State(code_tx): State<mpsc::Sender<CallbackParams>>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<&'static str>) {
    if params.code.is_none() && params.error.is_none() {
        return (StatusCode::BAD_REQUEST, Html(MISSING_CODE_PAGE));
    }

    let page = if params.error.is_some() {
        FAILURE_PAGE
    } else {
        SUCCESS_PAGE
    };

    // Only the first redirect is handed over; later ones find the slot taken.
    if code_tx.try_send(params).is_err() {
        debug!("ignoring duplicate OAuth callback");
    }
    (StatusCode::OK, Html(page))
}
