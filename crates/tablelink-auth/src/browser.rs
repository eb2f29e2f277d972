//! Browser handoff.
//!
//! The interactive flow needs to put an authorization URL in front of the
//! user. [`BrowserLauncher`] abstracts how: the system default browser in
//! normal operation, a no-op in headless environments and tests. A launch
//! failure is never fatal; the flow falls back to printing the URL.

use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// Capability to present an authorization URL to the user.
pub trait BrowserLauncher: Send + Sync {
    /// Opens the given URL.
    fn open(&self, url: &str) -> AuthResult<()>;
}

/// Opens the system default browser.
#[derive(Debug, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        open::that(url)
            .map_err(|e| AuthError::internal(format!("failed to open browser: {e}")))
    }
}

/// Logs the URL instead of opening anything.
///
/// For headless environments where the operator copies the URL from the
/// logs, and for tests.
#[derive(Debug, Default)]
pub struct NoopBrowser;

impl BrowserLauncher for NoopBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        debug!(url, "browser launch skipped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_browser_always_succeeds() {
        let browser = NoopBrowser;
        assert!(browser.open("https://example.com/authorize").is_ok());
    }
}
