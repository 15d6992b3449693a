//! Navigation Abstraction
//!
//! Models the host's notion of "where the user currently is" and lets the core
//! request full-page navigations (authorization redirects, expired-session
//! redirects) without touching any global window/location object.

use url::Url;

/// Host navigation port
///
/// Locations are opaque strings: either absolute URLs
/// (`https://app.example.com/dashboard?tab=1`) or host-relative paths
/// (`/dashboard`).
///
/// Implementations must not block; `navigate_to` schedules the navigation
/// and returns immediately.
pub trait Navigator: Send + Sync {
    /// The location currently displayed by the host.
    fn current_location(&self) -> String;

    /// Perform a full-page navigation to `url`.
    fn navigate_to(&self, url: &str);

    /// Whether the host is currently displaying `page`.
    ///
    /// Only the path component is compared, so query strings and fragments
    /// on either side are ignored.
    fn is_at(&self, page: &str) -> bool {
        location_path(&self.current_location()) == location_path(page)
    }
}

/// Extract the path component of a location string.
///
/// Absolute URLs are parsed; relative locations are cut at the first `?`
/// or `#`. A trailing slash is dropped (except for the root path).
pub fn location_path(location: &str) -> String {
    let path = match Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location
            .split(&['?', '#'][..])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedNavigator {
        location: Mutex<String>,
    }

    impl Navigator for FixedNavigator {
        fn current_location(&self) -> String {
            self.location.lock().unwrap().clone()
        }

        fn navigate_to(&self, url: &str) {
            *self.location.lock().unwrap() = url.to_string();
        }
    }

    #[test]
    fn test_location_path() {
        assert_eq!(location_path("/login"), "/login");
        assert_eq!(location_path("/login/"), "/login");
        assert_eq!(location_path("/login?next=/dashboard"), "/login");
        assert_eq!(location_path("https://app.example.com/login#top"), "/login");
        assert_eq!(location_path("https://app.example.com"), "/");
        assert_eq!(location_path(""), "/");
    }

    #[test]
    fn test_is_at_compares_paths() {
        let navigator = FixedNavigator {
            location: Mutex::new("https://app.example.com/login?reason=expired".to_string()),
        };
        assert!(navigator.is_at("/login"));
        assert!(!navigator.is_at("/dashboard"));

        navigator.navigate_to("/dashboard");
        assert!(navigator.is_at("https://app.example.com/dashboard"));
    }
}
