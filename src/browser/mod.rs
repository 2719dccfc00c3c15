//! Page contexts the controller can target, and how agents get into them.

mod contexts;
mod page;

pub use contexts::BrowserContexts;
pub use page::PageSurface;

use async_trait::async_trait;

use crate::models::ContextId;

const RESTRICTED_SCHEMES: &[&str] = &[
    "chrome:",
    "chrome-extension:",
    "chrome-search:",
    "chrome-untrusted:",
    "edge:",
    "about:",
    "devtools:",
    "view-source:",
    "moz-extension:",
    "file:",
];

const RESTRICTED_HOSTS: &[&str] = &[
    "chrome.google.com/webstore",
    "chromewebstore.google.com",
    "microsoftedge.microsoft.com/addons",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub id: ContextId,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InjectionError {
    #[error("no such context {0}")]
    NoSuchContext(ContextId),
    #[error("injection blocked on restricted page {0}")]
    Restricted(String),
}

/// Browser-side surface the controller uses to find and prepare contexts.
#[async_trait]
pub trait ContextHost: Send + Sync {
    async fn active_context(&self) -> Option<PageInfo>;

    /// Loads the capture agent into `context`.
    async fn inject_agent(&self, context: ContextId) -> Result<(), InjectionError>;
}

/// Privileged pages where no capture agent may run.
pub fn is_restricted_url(url: &str) -> bool {
    let url = url.trim().to_ascii_lowercase();
    if url.is_empty() {
        return true;
    }
    if RESTRICTED_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
        return true;
    }

    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(&url);
    RESTRICTED_HOSTS
        .iter()
        .any(|host| without_scheme.starts_with(host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privileged_pages_are_restricted() {
        assert!(is_restricted_url("chrome://extensions"));
        assert!(is_restricted_url("edge://settings"));
        assert!(is_restricted_url("about:blank"));
        assert!(is_restricted_url("chrome-extension://abc/popup.html"));
        assert!(is_restricted_url("https://chromewebstore.google.com/detail/x"));
        assert!(is_restricted_url("https://chrome.google.com/webstore/category"));
        assert!(is_restricted_url("  "));
    }

    #[test]
    fn ordinary_pages_are_allowed() {
        assert!(!is_restricted_url("https://example.com"));
        assert!(!is_restricted_url("http://localhost:3000/dashboard"));
        assert!(!is_restricted_url("https://google.com/search?q=chrome://"));
    }
}
