//! Storefront: page objects for end-to-end tests of the e-commerce web app
//!
//! Tests drive a browser session through page objects. Every element lookup
//! waits for a bounded time, and every failure is reported with a
//! screenshot before a typed error reaches the test.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    STOREFRONT Architecture                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Page       │    │ BasePage   │    │ Waiter     │            │
//! │   │ objects    │───►│ primitives │───►│ (poll)     │            │
//! │   └────────────┘    └─────┬──────┘    └─────┬──────┘            │
//! │                           │                 │                   │
//! │                           ▼                 ▼                   │
//! │                  ┌────────────────┐  ┌──────────────────┐       │
//! │                  │ Interaction    │  │ Session          │       │
//! │                  │ observer/sink  │  │ (chromium, fake) │       │
//! │                  └────────────────┘  └──────────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use storefront::{Config, FakeElement, FakeSession, LoginPage};
//!
//! let mut session = FakeSession::new().with_route("http://qa-ecommerce.example.com/login", |dom| {
//!     dom.append(FakeElement::new("input").id("email"));
//!     dom.append(FakeElement::new("input").id("password"));
//!     dom.append(FakeElement::new("button").attr("type", "submit").on_click(|dom| {
//!         dom.navigate("http://qa-ecommerce.example.com/account");
//!     }));
//! });
//! let config = Config::default();
//! let mut login = LoginPage::new(&mut session, &config);
//! login.open()?.login("admin@example.com", "admin123")?;
//! assert!(login.is_logged_in()?);
//! # Ok::<(), storefront::StorefrontError>(())
//! ```

// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod catalog;
mod config;
mod locator;
pub mod logging;
mod page;
mod page_object;
mod pages;
mod report;
mod result;
pub mod session;
pub mod wait;

pub use catalog::{JsonCatalog, Product, ProductCatalog};
pub use config::{
    BrowserKind, Config, ConfigFile, Credentials, EnvironmentUrls, Timeouts, BROWSER_VAR,
    CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH, ENVIRONMENT_VAR, SCREENSHOT_DIR_VAR,
};
pub use locator::{Locator, Strategy, Target};
pub use page::{resolve_url, BasePage, HasSearchBar, SEARCH_INPUT};
pub use page_object::{url_path, PageObject, UrlMatcher};
pub use pages::{
    parse_price, CartPage, HomePage, LoginPage, ProductPage, SearchResultItem, SearchResultsPage,
    NO_RESULTS_TIMEOUT,
};
pub use report::{
    Attachment, AttachmentBody, AttachmentObserver, DirectorySink, FailureReport,
    InteractionObserver, MemorySink, NoopObserver, ObservedEvent, RecordingObserver, ReportSink,
    StepRecord,
};
pub use result::{StorefrontError, StorefrontResult};
#[cfg(feature = "browser")]
pub use session::ChromiumSession;
pub use session::{
    launch, ElementHandle, ElementState, FakeDom, FakeElement, FakeSession, ScriptArg, Session,
    SessionError, SessionGuard, SessionResult,
};
pub use wait::{Condition, WaitOptions, WaitOutcome, Waiter};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        BasePage, CartPage, Config, FakeElement, FakeSession, HasSearchBar, HomePage, Locator,
        LoginPage, PageObject, ProductCatalog, ProductPage, SearchResultsPage, Session,
        SessionGuard, StorefrontError, StorefrontResult, Target,
    };
}
