//! Browser session abstraction.
//!
//! Page objects never talk to a browser directly. They drive a [`Session`],
//! which is the narrow interface a browser-automation backend has to provide:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Session (trait)                                              │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────┐        ┌──────────────────────────┐  │
//! │  │  ChromiumSession    │        │  FakeSession             │  │
//! │  │  (feature browser)  │        │  (in-memory document)    │  │
//! │  │  CDP via            │        │  scripted pages, used by │  │
//! │  │  chromiumoxide      │        │  unit and scenario tests │  │
//! │  └─────────────────────┘        └──────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups are always relative to the session's *current document*: the top
//! document, or the frame most recently entered with
//! [`Session::enter_frame`].

#[cfg(feature = "browser")]
mod chromium;
mod fake;

#[cfg(feature = "browser")]
pub use chromium::ChromiumSession;
pub use fake::{FakeDom, FakeElement, FakeSession, NodeId};

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{BrowserKind, Config};
use crate::locator::Locator;
use crate::result::{StorefrontError, StorefrontResult};

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors reported by a session backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Handle refers to a node from a previous document or a removed node
    #[error("Stale element reference: {id}")]
    StaleElement {
        /// Handle id
        id: String,
    },

    /// Native click landed on another element
    #[error("Element click intercepted: {message}")]
    ClickIntercepted {
        /// Error message
        message: String,
    },

    /// Element cannot receive the requested input
    #[error("Element not interactable: {message}")]
    NotInteractable {
        /// Error message
        message: String,
    },

    /// No JavaScript dialog is open
    #[error("No alert open")]
    NoAlert,

    /// Element is not a frame, or its document is not reachable
    #[error("No such frame: {message}")]
    NoSuchFrame {
        /// Error message
        message: String,
    },

    /// Script evaluation failed
    #[error("Script error: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// Browser navigation failed
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Protocol or transport failure talking to the browser
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },

    /// Session was already quit
    #[error("Session closed")]
    Closed,
}

impl SessionError {
    /// Whether a wait may keep polling after this error
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StaleElement { .. })
    }
}

/// Opaque reference to a live DOM node.
///
/// Only valid for the document it was resolved in; backends report
/// [`SessionError::StaleElement`] once the node is gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    id: String,
}

impl ElementHandle {
    /// Create a handle from a backend-specific id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Backend-specific id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Rendering state of an element
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementState {
    /// Not hidden by `display`, `visibility`, or the `hidden` attribute
    pub displayed: bool,
    /// Not disabled
    pub enabled: bool,
    /// Rendered width in CSS pixels
    pub width: f64,
    /// Rendered height in CSS pixels
    pub height: f64,
}

impl ElementState {
    /// Displayed with a non-zero size
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.displayed && self.width > 0.0 && self.height > 0.0
    }

    /// Visible and enabled
    #[must_use]
    pub fn is_clickable(&self) -> bool {
        self.is_visible() && self.enabled
    }
}

/// Argument passed to [`Session::execute_script`]
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArg {
    /// Element, available to the script as a DOM node
    Element(ElementHandle),
    /// Plain JSON value
    Value(serde_json::Value),
}

impl From<&ElementHandle> for ScriptArg {
    fn from(element: &ElementHandle) -> Self {
        Self::Element(element.clone())
    }
}

impl From<serde_json::Value> for ScriptArg {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

/// Scripts the interaction layer runs through [`Session::execute_script`].
///
/// Element arguments are reachable as `arguments[0]`, `arguments[1]`, ...
pub mod scripts {
    /// Script-driven click, used when a native click is intercepted
    pub const CLICK: &str = "arguments[0].click();";

    /// Scroll an element into the viewport
    pub const SCROLL_INTO_VIEW: &str = "arguments[0].scrollIntoView(true);";

    /// Select an `<option>` and notify its `<select>`
    pub const SELECT_OPTION: &str = "const o = arguments[0]; o.selected = true; \
         const s = o.closest('select'); \
         if (s) { s.dispatchEvent(new Event('input', { bubbles: true })); \
         s.dispatchEvent(new Event('change', { bubbles: true })); }";
}

/// A live browser-automation connection.
///
/// Reads take `&self`; anything that can change the document takes
/// `&mut self`. `scope` restricts lookups to descendants of an element in the
/// current document; `None` searches the whole current document.
pub trait Session {
    /// Load `url` in the top-level browsing context
    fn navigate(&mut self, url: &str) -> SessionResult<()>;

    /// URL of the top-level document
    fn current_url(&self) -> SessionResult<String>;

    /// Title of the top-level document
    fn title(&self) -> SessionResult<String>;

    /// All elements matching `locator`, in document order
    fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> SessionResult<Vec<ElementHandle>>;

    /// First element matching `locator`
    fn find(
        &self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> SessionResult<Option<ElementHandle>> {
        Ok(self.find_all(scope, locator)?.into_iter().next())
    }

    /// Rendering state of an element
    fn element_state(&self, element: &ElementHandle) -> SessionResult<ElementState>;

    /// Rendered text of an element (empty for hidden elements)
    fn text(&self, element: &ElementHandle) -> SessionResult<String>;

    /// Attribute or property value (`value` reads the live form value)
    fn attribute(&self, element: &ElementHandle, name: &str) -> SessionResult<Option<String>>;

    /// Native pointer click at the element's center
    fn click(&mut self, element: &ElementHandle) -> SessionResult<()>;

    /// Clear a form control
    fn clear(&mut self, element: &ElementHandle) -> SessionResult<()>;

    /// Type text into a form control
    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> SessionResult<()>;

    /// Press Enter with focus on the element
    fn press_enter(&mut self, element: &ElementHandle) -> SessionResult<()>;

    /// Move the pointer over the element
    fn hover(&mut self, element: &ElementHandle) -> SessionResult<()>;

    /// Run JavaScript in the current document and return its JSON result
    fn execute_script(&mut self, code: &str, args: &[ScriptArg])
        -> SessionResult<serde_json::Value>;

    /// PNG screenshot of the viewport
    fn screenshot(&self) -> SessionResult<Vec<u8>>;

    /// Text of the open JavaScript dialog, if any
    fn alert_text(&self) -> SessionResult<Option<String>>;

    /// Accept the open JavaScript dialog
    fn accept_alert(&mut self) -> SessionResult<()>;

    /// Dismiss the open JavaScript dialog
    fn dismiss_alert(&mut self) -> SessionResult<()>;

    /// Make the frame element's document the current document
    fn enter_frame(&mut self, frame: &ElementHandle) -> SessionResult<()>;

    /// Return to the parent of the current document
    fn leave_frame(&mut self) -> SessionResult<()>;

    /// Return to the top-level document
    fn leave_all_frames(&mut self) -> SessionResult<()>;

    /// Release the browser
    fn quit(&mut self) -> SessionResult<()>;
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn navigate(&mut self, url: &str) -> SessionResult<()> {
        (**self).navigate(url)
    }

    fn current_url(&self) -> SessionResult<String> {
        (**self).current_url()
    }

    fn title(&self) -> SessionResult<String> {
        (**self).title()
    }

    fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> SessionResult<Vec<ElementHandle>> {
        (**self).find_all(scope, locator)
    }

    fn find(
        &self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> SessionResult<Option<ElementHandle>> {
        (**self).find(scope, locator)
    }

    fn element_state(&self, element: &ElementHandle) -> SessionResult<ElementState> {
        (**self).element_state(element)
    }

    fn text(&self, element: &ElementHandle) -> SessionResult<String> {
        (**self).text(element)
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> SessionResult<Option<String>> {
        (**self).attribute(element, name)
    }

    fn click(&mut self, element: &ElementHandle) -> SessionResult<()> {
        (**self).click(element)
    }

    fn clear(&mut self, element: &ElementHandle) -> SessionResult<()> {
        (**self).clear(element)
    }

    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> SessionResult<()> {
        (**self).send_keys(element, text)
    }

    fn press_enter(&mut self, element: &ElementHandle) -> SessionResult<()> {
        (**self).press_enter(element)
    }

    fn hover(&mut self, element: &ElementHandle) -> SessionResult<()> {
        (**self).hover(element)
    }

    fn execute_script(
        &mut self,
        code: &str,
        args: &[ScriptArg],
    ) -> SessionResult<serde_json::Value> {
        (**self).execute_script(code, args)
    }

    fn screenshot(&self) -> SessionResult<Vec<u8>> {
        (**self).screenshot()
    }

    fn alert_text(&self) -> SessionResult<Option<String>> {
        (**self).alert_text()
    }

    fn accept_alert(&mut self) -> SessionResult<()> {
        (**self).accept_alert()
    }

    fn dismiss_alert(&mut self) -> SessionResult<()> {
        (**self).dismiss_alert()
    }

    fn enter_frame(&mut self, frame: &ElementHandle) -> SessionResult<()> {
        (**self).enter_frame(frame)
    }

    fn leave_frame(&mut self) -> SessionResult<()> {
        (**self).leave_frame()
    }

    fn leave_all_frames(&mut self) -> SessionResult<()> {
        (**self).leave_all_frames()
    }

    fn quit(&mut self) -> SessionResult<()> {
        (**self).quit()
    }
}

/// Owns a session for one test and quits it on every exit path.
///
/// Dereferences to the session so page objects can borrow it:
///
/// ```
/// use storefront::{Config, FakeSession, LoginPage, SessionGuard};
///
/// let mut session = SessionGuard::new(FakeSession::new());
/// let config = Config::default();
/// let login = LoginPage::new(&mut *session, &config);
/// drop(login);
/// // `session` quits here, even if the test had failed
/// ```
#[derive(Debug)]
pub struct SessionGuard<S: Session> {
    session: Option<S>,
}

impl<S: Session> SessionGuard<S> {
    /// Take ownership of a session
    pub const fn new(session: S) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Quit now and report the result instead of logging it
    pub fn close(mut self) -> SessionResult<()> {
        match self.session.take() {
            Some(mut session) => session.quit(),
            None => Ok(()),
        }
    }
}

impl<S: Session> Deref for SessionGuard<S> {
    type Target = S;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &S {
        self.session.as_ref().expect("session taken before drop")
    }
}

impl<S: Session> DerefMut for SessionGuard<S> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut S {
        self.session.as_mut().expect("session taken before drop")
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.quit() {
                tracing::warn!(error = %err, "failed to quit browser session");
            }
        }
    }
}

/// Start a browser session for the configured browser kind.
///
/// # Errors
///
/// `UnsupportedConfiguration` for browsers without a backend, or when the
/// crate was built without the `browser` feature.
pub fn launch(config: &Config) -> StorefrontResult<Box<dyn Session>> {
    match config.browser() {
        BrowserKind::Chrome | BrowserKind::Chromium => launch_chromium(config),
        other => Err(StorefrontError::UnsupportedConfiguration {
            message: format!("Browser {other} is not supported"),
        }),
    }
}

#[cfg(feature = "browser")]
fn launch_chromium(config: &Config) -> StorefrontResult<Box<dyn Session>> {
    Ok(Box::new(ChromiumSession::launch(config)?))
}

#[cfg(not(feature = "browser"))]
fn launch_chromium(_config: &Config) -> StorefrontResult<Box<dyn Session>> {
    Err(StorefrontError::UnsupportedConfiguration {
        message: "built without the `browser` feature; no Chromium backend available"
            .to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod element_state_tests {
        use super::*;

        #[test]
        fn test_zero_size_is_not_visible() {
            let state = ElementState {
                displayed: true,
                enabled: true,
                width: 0.0,
                height: 20.0,
            };
            assert!(!state.is_visible());
            assert!(!state.is_clickable());
        }

        #[test]
        fn test_disabled_is_visible_but_not_clickable() {
            let state = ElementState {
                displayed: true,
                enabled: false,
                width: 80.0,
                height: 20.0,
            };
            assert!(state.is_visible());
            assert!(!state.is_clickable());
        }

        #[test]
        fn test_default_is_hidden() {
            assert!(!ElementState::default().is_visible());
        }
    }

    mod session_error_tests {
        use super::*;

        #[test]
        fn test_only_stale_is_transient() {
            assert!(SessionError::StaleElement { id: "1:2".into() }.is_transient());
            assert!(!SessionError::Closed.is_transient());
            assert!(!SessionError::ClickIntercepted {
                message: "overlay".into()
            }
            .is_transient());
        }
    }

    mod guard_tests {
        use super::*;

        #[test]
        fn test_guard_quits_on_drop() {
            let mut guard = SessionGuard::new(FakeSession::new());
            guard.navigate("http://shop.test/").unwrap();
            let log = guard.call_log();
            drop(guard);
            assert!(log.borrow().iter().any(|c| c == "quit"));
        }

        #[test]
        fn test_guard_quits_when_test_body_panics() {
            let session = FakeSession::new();
            let log = session.call_log();
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
                let _guard = SessionGuard::new(session);
                panic!("assertion failed in test body");
            }));
            assert!(outcome.is_err());
            assert!(log.borrow().iter().any(|c| c == "quit"));
        }

        #[test]
        fn test_guard_over_boxed_session() {
            let boxed: Box<dyn Session> = Box::new(FakeSession::new());
            let mut guard = SessionGuard::new(boxed);
            guard.navigate("http://shop.test/").unwrap();
            assert_eq!(guard.current_url().unwrap(), "http://shop.test/");
            assert!(guard.close().is_ok());
        }

        #[test]
        fn test_close_reports_result() {
            let guard = SessionGuard::new(FakeSession::new());
            assert!(guard.close().is_ok());
        }
    }

    mod launch_tests {
        use super::*;

        #[test]
        fn test_firefox_is_unsupported() {
            let config = Config::default().with_browser(BrowserKind::Firefox);
            let err = launch(&config).err().unwrap();
            assert!(matches!(err, StorefrontError::UnsupportedConfiguration { .. }));
            assert!(err.to_string().contains("firefox"));
        }

        #[cfg(not(feature = "browser"))]
        #[test]
        fn test_chrome_without_feature_is_unsupported() {
            let err = launch(&Config::default()).err().unwrap();
            assert!(matches!(err, StorefrontError::UnsupportedConfiguration { .. }));
        }
    }
}
