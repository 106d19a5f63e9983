//! Locator abstraction for element selection.
//!
//! A [`Locator`] is an immutable (strategy, selector) pair. Page objects
//! declare their locators as `const` items so every screen's structure is
//! visible in one place:
//!
//! ```
//! use storefront::Locator;
//!
//! const EMAIL_INPUT: Locator = Locator::id("email");
//! const LOGIN_BUTTON: Locator = Locator::css("button[type='submit']");
//!
//! assert_eq!(EMAIL_INPUT.to_string(), "id \"email\"");
//! assert_eq!(LOGIN_BUTTON.value(), "button[type='submit']");
//! ```

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::ElementHandle;

/// Strategy used to resolve a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// `id` attribute
    Id,
    /// CSS selector (e.g., "button.primary")
    CssSelector,
    /// XPath expression
    XPath,
    /// Exact visible text of a link
    LinkText,
    /// Substring of the visible text of a link
    PartialLinkText,
    /// `name` attribute
    Name,
    /// Single class name
    ClassName,
    /// Tag name
    TagName,
}

impl Strategy {
    /// WebDriver name of this strategy
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::CssSelector => "css selector",
            Self::XPath => "xpath",
            Self::LinkText => "link text",
            Self::PartialLinkText => "partial link text",
            Self::Name => "name",
            Self::ClassName => "class name",
            Self::TagName => "tag name",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable (strategy, selector) pair identifying zero or more elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    strategy: Strategy,
    value: Cow<'static, str>,
}

impl Locator {
    /// Create a locator from a strategy and a static selector
    #[must_use]
    pub const fn new(strategy: Strategy, value: &'static str) -> Self {
        Self {
            strategy,
            value: Cow::Borrowed(value),
        }
    }

    /// Create a locator with a selector built at runtime
    #[must_use]
    pub fn dynamic(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: Cow::Owned(value.into()),
        }
    }

    /// Locate by `id` attribute
    #[must_use]
    pub const fn id(value: &'static str) -> Self {
        Self::new(Strategy::Id, value)
    }

    /// Locate by CSS selector
    #[must_use]
    pub const fn css(value: &'static str) -> Self {
        Self::new(Strategy::CssSelector, value)
    }

    /// Locate by XPath expression
    #[must_use]
    pub const fn xpath(value: &'static str) -> Self {
        Self::new(Strategy::XPath, value)
    }

    /// Locate a link by its exact visible text
    #[must_use]
    pub const fn link_text(value: &'static str) -> Self {
        Self::new(Strategy::LinkText, value)
    }

    /// Locate a link by part of its visible text
    #[must_use]
    pub const fn partial_link_text(value: &'static str) -> Self {
        Self::new(Strategy::PartialLinkText, value)
    }

    /// Locate by `name` attribute
    #[must_use]
    pub const fn name(value: &'static str) -> Self {
        Self::new(Strategy::Name, value)
    }

    /// Locate by a single class name
    #[must_use]
    pub const fn class_name(value: &'static str) -> Self {
        Self::new(Strategy::ClassName, value)
    }

    /// Locate by tag name
    #[must_use]
    pub const fn tag_name(value: &'static str) -> Self {
        Self::new(Strategy::TagName, value)
    }

    /// Get the strategy
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Get the selector string
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Name safe for use in file names and attachment titles
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}_{}", self.strategy.as_str(), self.value)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    /// JavaScript expression evaluating to an array of all matches under `root`.
    ///
    /// `root` must be a JavaScript expression yielding a `Document` or an
    /// `Element`.
    #[must_use]
    pub fn to_query_all(&self, root: &str) -> String {
        let v = js_string(&self.value);
        match self.strategy {
            Strategy::Id => {
                format!("Array.from({root}.querySelectorAll('#' + CSS.escape({v})))")
            }
            Strategy::CssSelector | Strategy::TagName => {
                format!("Array.from({root}.querySelectorAll({v}))")
            }
            Strategy::XPath => format!(
                "(() => {{ const r = ({root}.ownerDocument || {root}).evaluate({v}, {root}, null, \
                 XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); const out = []; \
                 for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); \
                 return out; }})()"
            ),
            Strategy::LinkText => format!(
                "Array.from({root}.querySelectorAll('a')).filter(a => a.innerText.trim() === {v})"
            ),
            Strategy::PartialLinkText => format!(
                "Array.from({root}.querySelectorAll('a')).filter(a => a.innerText.includes({v}))"
            ),
            Strategy::Name => format!(
                "Array.from({root}.querySelectorAll('[name=\"' + CSS.escape({v}) + '\"]'))"
            ),
            Strategy::ClassName => {
                format!("Array.from({root}.querySelectorAll('.' + CSS.escape({v})))")
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.strategy, self.value)
    }
}

/// Quote a string as a JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// What a primitive acts on: a locator still to be resolved, or an element
/// that was already resolved (e.g., a row inside a list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Resolve through the wait engine
    Locator(Locator),
    /// Use this element directly
    Element(ElementHandle),
}

impl Target {
    /// The locator, if this target still needs resolving
    #[must_use]
    pub const fn locator(&self) -> Option<&Locator> {
        match self {
            Self::Locator(locator) => Some(locator),
            Self::Element(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locator(locator) => locator.fmt(f),
            Self::Element(element) => write!(f, "element {}", element.id()),
        }
    }
}

impl From<Locator> for Target {
    fn from(locator: Locator) -> Self {
        Self::Locator(locator)
    }
}

impl From<&Locator> for Target {
    fn from(locator: &Locator) -> Self {
        Self::Locator(locator.clone())
    }
}

impl From<ElementHandle> for Target {
    fn from(element: ElementHandle) -> Self {
        Self::Element(element)
    }
}

impl From<&ElementHandle> for Target {
    fn from(element: &ElementHandle) -> Self {
        Self::Element(element.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod locator_tests {
        use super::*;

        #[test]
        fn test_const_constructors() {
            const SEARCH: Locator = Locator::id("search-input");
            assert_eq!(SEARCH.strategy(), Strategy::Id);
            assert_eq!(SEARCH.value(), "search-input");
            assert_eq!(Locator::link_text("Register").strategy(), Strategy::LinkText);
            assert_eq!(Locator::xpath("//button").strategy(), Strategy::XPath);
        }

        #[test]
        fn test_dynamic_equals_static() {
            let dynamic = Locator::dynamic(Strategy::CssSelector, String::from(".product-item"));
            assert_eq!(dynamic, Locator::css(".product-item"));
        }

        #[test]
        fn test_display_uses_webdriver_names() {
            assert_eq!(
                Locator::css(".cart-item").to_string(),
                "css selector \".cart-item\""
            );
            assert_eq!(
                Locator::link_text("Forgot Password?").to_string(),
                "link text \"Forgot Password?\""
            );
        }

        #[test]
        fn test_slug_is_file_safe() {
            let slug = Locator::css("button[type='submit']").slug();
            assert_eq!(slug, "css_selector_button_type__submit__");
            assert!(slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn test_css_query_is_json_quoted() {
            let query = Locator::css("a[href='#reviews']").to_query_all("document");
            assert_eq!(
                query,
                "Array.from(document.querySelectorAll(\"a[href='#reviews']\"))"
            );
        }

        #[test]
        fn test_id_query_escapes() {
            let query = Locator::id("search-input").to_query_all("root");
            assert!(query.contains("CSS.escape(\"search-input\")"));
            assert!(query.starts_with("Array.from(root.querySelectorAll"));
        }

        #[test]
        fn test_xpath_query_uses_snapshot() {
            let query = Locator::xpath("//button[contains(text(), 'Category')]").to_query_all("document");
            assert!(query.contains("ORDERED_NODE_SNAPSHOT_TYPE"));
            assert!(query.contains("//button[contains(text(), 'Category')]"));
        }

        #[test]
        fn test_quotes_in_selector_cannot_break_out() {
            let query = Locator::link_text("Say \"hi\"").to_query_all("document");
            assert!(query.contains(r#""Say \"hi\"""#));
        }
    }

    mod target_tests {
        use super::*;

        #[test]
        fn test_target_from_locator() {
            let target = Target::from(&Locator::id("email"));
            assert_eq!(target.locator(), Some(&Locator::id("email")));
            assert_eq!(target.to_string(), "id \"email\"");
        }

        #[test]
        fn test_target_from_element() {
            let target = Target::from(ElementHandle::new("3:17"));
            assert!(target.locator().is_none());
            assert_eq!(target.to_string(), "element 3:17");
        }
    }
}
