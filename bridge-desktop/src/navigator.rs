//! In-memory navigator for hosts without a browser

use bridge_traits::navigation::Navigator;
use parking_lot::Mutex;
use tracing::debug;

/// Tracks a current location and records every navigation request.
///
/// Native apps and CLIs use this to observe where the session manager wants
/// to send the user (e.g. to open the authorization URL in a system browser).
#[derive(Debug)]
pub struct InMemoryNavigator {
    current: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl InMemoryNavigator {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(initial.into()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Every URL passed to `navigate_to`, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }

    /// Most recent navigation target, if any.
    pub fn last_navigation(&self) -> Option<String> {
        self.history.lock().last().cloned()
    }
}

impl Default for InMemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for InMemoryNavigator {
    fn current_location(&self) -> String {
        self.current.lock().clone()
    }

    fn navigate_to(&self, url: &str) {
        debug!(url = url, "Navigating");
        *self.current.lock() = url.to_string();
        self.history.lock().push(url.to_string());
    }
}
