//! Local HTTP endpoint that opens URLs on the user's desktop
//!
//! Processes inside the remote container cannot reach the desktop. The client
//! runs this listener on loopback and ssh relays a Unix socket on the server
//! to it, so `xdg-open` inside the container becomes `POST /open`.

use crate::Result;
use axum::extract::rejection::FormRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Router};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

pub const OPEN_PATH: &str = "/open";

const MAX_BODY_BYTES: usize = 4096;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OpenUrlError {
    #[error("missing url")]
    Missing,
    #[error("url contains control characters")]
    ControlCharacters,
    #[error("invalid url")]
    Invalid,
    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),
}

/// Accept only absolute http(s) URLs without control characters
pub fn validate_open_url(raw: &str) -> std::result::Result<String, OpenUrlError> {
    if raw.chars().any(|c| c.is_control()) {
        return Err(OpenUrlError::ControlCharacters);
    }
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(OpenUrlError::Missing);
    }
    let url = Url::parse(raw).map_err(|_| OpenUrlError::Invalid)?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(OpenUrlError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(OpenUrlError::Invalid);
    }
    Ok(raw.to_string())
}

/// Dispatches a validated URL to something that can show it
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Platform desktop opener (`open`, `xdg-open`, `rundll32`)
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopOpener;

impl DesktopOpener {
    fn command(url: &str) -> std::io::Result<tokio::process::Command> {
        if cfg!(target_os = "windows") {
            let mut cmd = tokio::process::Command::new("rundll32");
            cmd.args(["url.dll,FileProtocolHandler", url]);
            return Ok(cmd);
        }

        let candidates: &[&str] = if cfg!(target_os = "macos") {
            &["open"]
        } else {
            &["xdg-open", "open"]
        };
        let program = candidates
            .iter()
            .find_map(|p| which::which(p).ok())
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no URL opener found in PATH")
            })?;
        let mut cmd = tokio::process::Command::new(program);
        cmd.arg(url);
        Ok(cmd)
    }
}

impl UrlOpener for DesktopOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        tracing::debug!("Opening {}", url);
        // not awaited; the opener detaches from us
        Self::command(url)?
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct OpenRequest {
    #[serde(default)]
    url: String,
}

type SharedOpener = Arc<dyn UrlOpener>;

async fn handle_open(
    State(opener): State<SharedOpener>,
    form: std::result::Result<Form<OpenRequest>, FormRejection>,
) -> Response {
    let Ok(Form(request)) = form else {
        return (StatusCode::BAD_REQUEST, "invalid form body").into_response();
    };

    let url = match validate_open_url(&request.url) {
        Ok(url) => url,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match opener.open(&url) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::warn!("failed to open {}: {}", url, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to open url").into_response()
        }
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// `POST /open`; every other method or path is 404
pub fn router(opener: SharedOpener) -> Router {
    Router::new()
        .route(OPEN_PATH, post(handle_open).fallback(not_found))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(opener)
}

/// A running bridge listener. Stops on [`OpenBridge::shutdown`] or drop.
pub struct OpenBridge {
    port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OpenBridge {
    /// Bind an ephemeral loopback port and start serving
    pub async fn start(opener: SharedOpener) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(opener);

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                tracing::warn!("open bridge stopped: {}", e);
            }
        });

        tracing::debug!("Open bridge listening on 127.0.0.1:{}", port);
        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting, give in-flight requests a moment, then abort
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        tracing::debug!("Open bridge on port {} closed", self.port);
    }
}

impl Drop for OpenBridge {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Fresh path for the relayed socket on the remote host
pub fn new_socket_path() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("/tmp/vibehost-open-{}.sock", &id[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingOpener {
        opened: Mutex<Vec<String>>,
        fail: bool,
    }

    impl UrlOpener for RecordingOpener {
        fn open(&self, url: &str) -> std::io::Result<()> {
            if self.fail {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "no display"));
            }
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    fn form_request(method: Method, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_validate_accepts_http_and_https() {
        assert_eq!(validate_open_url("http://x/y").unwrap(), "http://x/y");
        assert_eq!(validate_open_url("https://x/y").unwrap(), "https://x/y");
        assert_eq!(
            validate_open_url("  https://example.com/a?b=c  ").unwrap(),
            "https://example.com/a?b=c"
        );
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        assert_eq!(validate_open_url(""), Err(OpenUrlError::Missing));
        assert_eq!(
            validate_open_url("javascript:alert(1)"),
            Err(OpenUrlError::UnsupportedScheme("javascript".to_string()))
        );
        assert_eq!(
            validate_open_url("http://x/y\r\nInjected: 1"),
            Err(OpenUrlError::ControlCharacters)
        );
        assert_eq!(validate_open_url("http://x/\ny"), Err(OpenUrlError::ControlCharacters));
        assert!(validate_open_url("file:///etc/passwd").is_err());
        assert!(validate_open_url("/relative/path").is_err());
        assert!(validate_open_url("example.com").is_err());
    }

    #[tokio::test]
    async fn test_post_open_dispatches_url() {
        let opener = Arc::new(RecordingOpener::default());
        let app = router(opener.clone());

        let response = app
            .oneshot(form_request(
                Method::POST,
                "/open",
                "url=https%3A%2F%2Fexample.com%2Fdocs",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            *opener.opened.lock().unwrap(),
            vec!["https://example.com/docs".to_string()]
        );
    }

    #[tokio::test]
    async fn test_post_open_rejects_invalid_url() {
        let opener = Arc::new(RecordingOpener::default());

        for body in ["url=javascript%3Aalert(1)", "url=", "other=1", "url=http%3A%2F%2Fx%0D%0A"] {
            let response = router(opener.clone())
                .oneshot(form_request(Method::POST, "/open", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
        }
        assert!(opener.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_methods_and_paths_are_not_found() {
        let opener: SharedOpener = Arc::new(RecordingOpener::default());

        let response = router(opener.clone())
            .oneshot(form_request(Method::GET, "/open", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router(opener)
            .oneshot(form_request(Method::POST, "/close", "url=http%3A%2F%2Fx%2F"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_opener_failure_is_server_error() {
        let opener = Arc::new(RecordingOpener {
            fail: true,
            ..Default::default()
        });

        let response = router(opener)
            .oneshot(form_request(Method::POST, "/open", "url=http%3A%2F%2Fx%2Fy"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_bridge_serves_until_shutdown() {
        let opener = Arc::new(RecordingOpener::default());
        let bridge = OpenBridge::start(opener.clone()).await.unwrap();
        let port = bridge.port();
        assert_ne!(port, 0);

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://127.0.0.1:{}/open", port))
            .form(&[("url", "http://localhost:3000/")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 204);
        assert_eq!(opener.opened.lock().unwrap().len(), 1);

        bridge.shutdown().await;
        let after = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/open", port))
            .form(&[("url", "http://localhost:3000/")])
            .send()
            .await;
        assert!(after.is_err());
    }

    #[test]
    fn test_socket_paths_are_unique() {
        let a = new_socket_path();
        let b = new_socket_path();
        assert!(a.starts_with("/tmp/vibehost-open-"));
        assert!(a.ends_with(".sock"));
        assert_ne!(a, b);
    }
}
