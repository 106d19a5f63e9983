//! Page identity.
//!
//! A page object knows which URL paths belong to it. Whether the browser is
//! *currently* on that page is always asked of the session, never remembered:
//! any click may navigate away.

use std::collections::HashMap;

use crate::result::StorefrontResult;

/// A named screen of the storefront.
///
/// # Example
///
/// ```
/// use storefront::{Config, FakeSession, LoginPage, PageObject, Session};
///
/// let mut session = FakeSession::new();
/// session.navigate("http://dev-ecommerce.example.com/login").unwrap();
/// let config = Config::default();
/// let login = LoginPage::new(&mut session, &config);
/// assert_eq!(login.url_pattern(), "/login");
/// assert!(login.is_current().unwrap());
/// ```
pub trait PageObject {
    /// URL path pattern of this page (e.g., "/login", "/product/:id")
    fn url_pattern(&self) -> &str;

    /// Get the page name for logging/debugging
    fn page_name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        let path = full.split('<').next().unwrap_or(full);
        path.rsplit("::").next().unwrap_or(path)
    }

    /// Path of the document the session currently shows
    fn current_path(&self) -> StorefrontResult<String>;

    /// Whether the session currently shows this page
    fn is_current(&self) -> StorefrontResult<bool> {
        let path = self.current_path()?;
        Ok(UrlMatcher::new(self.url_pattern()).matches(&path))
    }
}

/// Path part of a URL: no origin, query or fragment
#[must_use]
pub fn url_path(url: &str) -> &str {
    let without_origin = match url.find("://") {
        Some(scheme) => {
            let rest = &url[scheme + 3..];
            rest.find('/').map_or("/", |slash| &rest[slash..])
        }
        None => url,
    };
    let end = without_origin
        .find(['?', '#'])
        .unwrap_or(without_origin.len());
    &without_origin[..end]
}

/// URL path matcher for page objects
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    pattern: String,
    segments: Vec<UrlSegment>,
}

#[derive(Debug, Clone)]
enum UrlSegment {
    Literal(String),
    Wildcard,
    Parameter(String),
}

impl UrlMatcher {
    /// Create a matcher from a pattern
    ///
    /// Patterns support:
    /// - Literal segments: `/cart`
    /// - Wildcards: `/product/*`
    /// - Named parameters: `/product/:id`
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" {
                    UrlSegment::Wildcard
                } else if let Some(name) = s.strip_prefix(':') {
                    UrlSegment::Parameter(name.to_string())
                } else {
                    UrlSegment::Literal(s.to_string())
                }
            })
            .collect();

        Self {
            pattern: pattern.to_string(),
            segments,
        }
    }

    /// Check whether a path matches; each wildcard or parameter consumes one segment
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        path_segments.len() == self.segments.len()
            && self
                .segments
                .iter()
                .zip(&path_segments)
                .all(|(segment, actual)| match segment {
                    UrlSegment::Literal(lit) => lit == actual,
                    UrlSegment::Wildcard | UrlSegment::Parameter(_) => true,
                })
    }

    /// Named parameters of a matching path
    #[must_use]
    pub fn extract_params(&self, path: &str) -> HashMap<String, String> {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.segments
            .iter()
            .zip(path_segments)
            .filter_map(|(segment, value)| match segment {
                UrlSegment::Parameter(name) => Some((name.clone(), value.to_string())),
                _ => None,
            })
            .collect()
    }

    /// Get the original pattern
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
