//! Loopback callback listener.
//!
//! A short-lived HTTP endpoint that receives the authorization server's
//! redirect during interactive login. It accepts connections on a loopback
//! port, answers the configured callback path with a static HTML page, and
//! delivers the parsed query parameters to the waiting flow through a
//! one-shot channel. Any other path gets a 404 and the listener keeps
//! serving until the callback arrives or the flow gives up.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error};

use crate::error::{AuthError, AuthResult};

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization Successful</h1>\
    <p>You can close this window and return to the application.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h1>Authorization Failed</h1>\
    <p>You can close this window.</p></body></html>";

const NOT_FOUND_PAGE: &str = "<html><body><h1>Not Found</h1></body></html>";

/// Query parameters captured from the authorization redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackResult {
    /// The authorization code, when the user granted access.
    pub code: Option<String>,
    /// The OAuth error string, when the server reported one.
    pub error: Option<String>,
    /// The CSRF state echoed back by the server.
    pub state: Option<String>,
}

/// A running loopback listener bound for one authorization attempt.
///
/// Dropping the listener tears down the accept loop; [`wait`] consumes the
/// listener, so teardown happens on every exit path.
///
/// [`wait`]: CallbackListener::wait
#[derive(Debug)]
pub struct CallbackListener {
    addr: SocketAddr,
    result_rx: Option<oneshot::Receiver<CallbackResult>>,
    task: JoinHandle<()>,
}

impl CallbackListener {
    /// Binds the listener on the loopback interface.
    ///
    /// A port of `0` binds an ephemeral port; check [`local_addr`] for the
    /// actual one.
    ///
    /// [`local_addr`]: CallbackListener::local_addr
    pub async fn bind(port: u16, callback_path: &str) -> AuthResult<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
            AuthError::configuration(format!("failed to bind callback port {port}: {e}"))
                .with_operation("authorize")
        })?;
        let addr = listener.local_addr().map_err(|e| {
            AuthError::internal(format!("failed to read listener address: {e}"))
        })?;

        debug!(%addr, "callback listener bound");

        let (tx, rx) = oneshot::channel();
        let path = callback_path.to_string();
        let task = tokio::spawn(accept_loop(listener, path, tx));

        Ok(Self {
            addr,
            result_rx: Some(rx),
            task,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Waits for the callback, tearing the listener down afterwards.
    ///
    /// # Errors
    ///
    /// Returns a `CallbackTimeout` error when nothing arrives before the
    /// deadline; the listener is torn down in that case too.
    pub async fn wait(mut self, timeout: Duration) -> AuthResult<CallbackResult> {
        let Some(rx) = self.result_rx.take() else {
            return Err(AuthError::internal("callback listener already consumed"));
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(AuthError::internal(
                "callback listener stopped before delivering a result",
            )
            .with_operation("authorize")),
            Err(_) => Err(AuthError::callback_timeout(format!(
                "no authorization callback within {}s",
                timeout.as_secs()
            ))
            .with_operation("authorize")),
        }
        // Drop tears down the accept loop.
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    callback_path: String,
    tx: oneshot::Sender<CallbackResult>,
) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _peer)) => stream,
            Err(e) => {
                error!(error = %e, "failed to accept callback connection");
                continue;
            }
        };

        match handle_connection(stream, &callback_path).await {
            Ok(Some(result)) => {
                let _ = tx.send(result);
                return;
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "callback connection error"),
        }
    }
}

/// Handles one incoming connection.
///
/// Returns `Ok(Some(..))` once the callback path was hit; anything else is
/// answered and ignored.
async fn handle_connection(
    mut stream: TcpStream,
    callback_path: &str,
) -> std::io::Result<Option<CallbackResult>> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Request line: GET /path?code=...&state=... HTTP/1.1
    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(m), Some(t)) => (m, t),
        _ => return Ok(None),
    };

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if method != "GET" || path != callback_path {
        write_response(&mut write_half, "404 Not Found", NOT_FOUND_PAGE).await?;
        return Ok(None);
    }

    let result = parse_query(query);
    if result.error.is_some() || result.code.is_none() {
        write_response(&mut write_half, "400 Bad Request", FAILURE_PAGE).await?;
    } else {
        write_response(&mut write_half, "200 OK", SUCCESS_PAGE).await?;
    }

    Ok(Some(result))
}

async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    status: &str,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

/// Parses `code`, `error` and `state` out of the redirect query string.
fn parse_query(query: &str) -> CallbackResult {
    let mut result = CallbackResult::default();
    for param in query.split('&') {
        let mut kv = param.splitn(2, '=');
        if let (Some(key), Some(value)) = (kv.next(), kv.next()) {
            let value = urlencoding::decode(value).unwrap_or_default().into_owned();
            match key {
                "code" => result.code = Some(value),
                "error" => result.error = Some(value),
                "state" => result.state = Some(value),
                _ => {}
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut response = String::new();
        let mut reader = BufReader::new(stream);
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            response.push_str(&line);
        }
        response
    }

    #[test]
    fn query_parsing() {
        let result = parse_query("code=abc&state=xyz");
        assert_eq!(result.code, Some("abc".to_string()));
        assert_eq!(result.state, Some("xyz".to_string()));
        assert!(result.error.is_none());

        let result = parse_query("error=access_denied&state=xyz");
        assert_eq!(result.error, Some("access_denied".to_string()));
        assert!(result.code.is_none());

        let result = parse_query("");
        assert_eq!(result, CallbackResult::default());
    }

    #[test]
    fn query_parsing_decodes_values() {
        let result = parse_query("code=a%2Fb&state=x%20y");
        assert_eq!(result.code, Some("a/b".to_string()));
        assert_eq!(result.state, Some("x y".to_string()));
    }

    #[tokio::test]
    async fn delivers_callback_result() {
        let listener = CallbackListener::bind(0, "/oauth/callback").await.unwrap();
        let addr = listener.local_addr();

        let request = tokio::spawn(async move {
            get(addr, "/oauth/callback?code=abc&state=xyz").await
        });

        let result = listener.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.code, Some("abc".to_string()));
        assert_eq!(result.state, Some("xyz".to_string()));

        let response = request.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("Authorization Successful"));
    }

    #[tokio::test]
    async fn denial_gets_failure_page() {
        let listener = CallbackListener::bind(0, "/oauth/callback").await.unwrap();
        let addr = listener.local_addr();

        let request =
            tokio::spawn(async move { get(addr, "/oauth/callback?error=access_denied").await });

        let result = listener.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.error, Some("access_denied".to_string()));

        let response = request.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(response.contains("Authorization Failed"));
    }

    #[tokio::test]
    async fn other_paths_get_404_and_listener_keeps_serving() {
        let listener = CallbackListener::bind(0, "/oauth/callback").await.unwrap();
        let addr = listener.local_addr();

        let response = get(addr, "/favicon.ico").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        // Still serving: the real callback is delivered afterwards.
        let request =
            tokio::spawn(async move { get(addr, "/oauth/callback?code=late&state=s").await });
        let result = listener.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.code, Some("late".to_string()));
        request.await.unwrap();
    }

    #[tokio::test]
    async fn timeout_produces_typed_error_and_tears_down() {
        let listener = CallbackListener::bind(0, "/oauth/callback").await.unwrap();
        let addr = listener.local_addr();

        let err = listener.wait(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err.code(), crate::error::AuthErrorCode::CallbackTimeout);

        // The accept loop is gone; new connections are not served.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let refused = TcpStream::connect(addr).await;
        assert!(refused.is_err());
    }
}
