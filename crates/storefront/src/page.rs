//! Element interaction primitives shared by every page object.
//!
//! [`BasePage`] borrows the session exclusively for as long as the page is
//! alive. Every primitive that resolves a [`Locator`] applies exactly one
//! timeout (the explicit one, or the page default) through the wait engine,
//! then either returns a defined empty result (probes, `find_all`) or raises
//! a typed error after handing a [`FailureReport`] to the observer.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::Config;
use crate::locator::{Locator, Target};
use crate::page_object::url_path;
use crate::pages::SearchResultsPage;
use crate::report::{FailureReport, InteractionObserver, NoopObserver, StepRecord};
use crate::result::{StorefrontError, StorefrontResult};
use crate::session::{scripts, ElementHandle, ElementState, ScriptArg, Session, SessionError};
use crate::wait::{Condition, WaitOutcome, Waiter};

/// Global search input present in the storefront header
pub const SEARCH_INPUT: Locator = Locator::id("search-input");

/// URL for `path`: absolute `http…` URLs unchanged, anything else appended
/// to `base_url` verbatim.
#[must_use]
pub fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http") {
        path.to_string()
    } else {
        format!("{base_url}{path}")
    }
}

/// What an element must be before an action proceeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Present,
    Visible,
    Clickable,
}

impl Readiness {
    fn condition(self, locator: &Locator) -> Condition {
        match self {
            Self::Present => Condition::Present(locator.clone()),
            Self::Visible => Condition::Visible(locator.clone()),
            Self::Clickable => Condition::Clickable(locator.clone()),
        }
    }

    fn accepts(self, state: &ElementState) -> bool {
        match self {
            Self::Present => true,
            Self::Visible => state.is_visible(),
            Self::Clickable => state.is_clickable(),
        }
    }
}

// =============================================================================
// BASE PAGE
// =============================================================================

/// Session borrow plus the primitives built on it.
///
/// Page objects wrap a `BasePage` and dereference to it, so every primitive
/// is available on every page.
pub struct BasePage<'s> {
    session: &'s mut dyn Session,
    config: &'s Config,
    observer: Arc<dyn InteractionObserver>,
    timeout: Duration,
}

impl fmt::Debug for BasePage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasePage")
            .field("base_url", &self.config.base_url())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<'s> BasePage<'s> {
    /// Page over `session` using the configured default timeout
    pub fn new(session: &'s mut dyn Session, config: &'s Config) -> Self {
        Self {
            session,
            config,
            observer: Arc::new(NoopObserver),
            timeout: config.default_timeout(),
        }
    }

    /// Report steps and failures to `observer`
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn InteractionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Override the default timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configuration the page was built with
    #[must_use]
    pub const fn config(&self) -> &'s Config {
        self.config
    }

    /// Default timeout applied when a primitive gets `None`
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Observer receiving steps and failures
    #[must_use]
    pub fn observer(&self) -> &Arc<dyn InteractionObserver> {
        &self.observer
    }

    /// Direct access to the session for calls no primitive covers
    pub fn session(&mut self) -> &mut dyn Session {
        &mut *self.session
    }

    /// A second page over the same session, valid while `self` is borrowed
    pub(crate) fn reborrow(&mut self) -> BasePage<'_> {
        BasePage {
            session: &mut *self.session,
            config: self.config,
            observer: Arc::clone(&self.observer),
            timeout: self.timeout,
        }
    }

    fn waiter(&self, timeout: Duration) -> Waiter {
        Waiter::for_timeout(timeout, self.config.poll_interval())
    }

    fn timeout_or_default(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or(self.timeout)
    }

    // -------------------------------------------------------------------------
    // Reporting
    // -------------------------------------------------------------------------

    fn step(&self, action: &str, target: &dyn fmt::Display, started: Instant) {
        let record = StepRecord::new(action, target.to_string(), started.elapsed());
        tracing::debug!(
            action,
            target = %record.target,
            elapsed_ms = record.duration.as_millis() as u64,
            "step"
        );
        self.observer.on_step(&record);
    }

    /// Capture context for `error` and hand it to the observer; returns `error`
    pub(crate) fn fail(
        &self,
        action: &str,
        locator: Option<&Locator>,
        target: &dyn fmt::Display,
        timeout: Option<Duration>,
        error: StorefrontError,
    ) -> StorefrontError {
        let mut report = FailureReport::new(action, target.to_string(), error.to_string())
            .with_locator(locator.cloned())
            .with_timeout(timeout);
        report.url = self.session.current_url().ok();
        match self.session.screenshot() {
            Ok(png) => report.screenshot = Some(png),
            Err(err) => {
                tracing::warn!(action, error = %err, "failure screenshot unavailable");
                report.capture_error = Some(err.to_string());
            }
        }
        tracing::debug!(action, target = %report.target, error = %error, "interaction failed");
        self.observer.on_failure(&report);
        error
    }

    fn fail_on(
        &self,
        action: &str,
        target: &Target,
        timeout: Option<Duration>,
        error: StorefrontError,
    ) -> StorefrontError {
        self.fail(action, target.locator(), target, timeout, error)
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    /// Wait until `target` meets `readiness`; `Ok(None)` on timeout
    fn await_target(
        &mut self,
        action: &str,
        target: &Target,
        readiness: Readiness,
        timeout: Duration,
    ) -> StorefrontResult<Option<ElementHandle>> {
        let waiter = self.waiter(timeout);
        let resolved = match target {
            Target::Locator(locator) => waiter
                .until(&mut *self.session, &readiness.condition(locator))
                .map(WaitOutcome::into_element),
            Target::Element(element) => self.await_element(&waiter, element, readiness),
        };
        resolved.map_err(|err| self.fail_on(action, target, Some(timeout), err.into()))
    }

    fn await_element(
        &mut self,
        waiter: &Waiter,
        element: &ElementHandle,
        readiness: Readiness,
    ) -> Result<Option<ElementHandle>, SessionError> {
        // A stale handle never recovers, so check it outside the poll loop.
        let state = self.session.element_state(element)?;
        if readiness.accepts(&state) {
            return Ok(Some(element.clone()));
        }
        waiter.poll(&mut *self.session, |session| {
            let state = session.element_state(element)?;
            Ok(readiness.accepts(&state).then(|| element.clone()))
        })
    }

    /// Resolve a target that only has to exist; `NotFound` on timeout
    fn present(
        &mut self,
        action: &str,
        target: &Target,
        timeout: Duration,
    ) -> StorefrontResult<ElementHandle> {
        match self.await_target(action, target, Readiness::Present, timeout)? {
            Some(element) => Ok(element),
            None => Err(self.fail_on(action, target, Some(timeout), not_found(target, timeout))),
        }
    }

    fn session_call<T>(
        &mut self,
        action: &str,
        target: &Target,
        call: impl FnOnce(&mut dyn Session) -> Result<T, SessionError>,
    ) -> StorefrontResult<T> {
        call(&mut *self.session).map_err(|err| self.fail_on(action, target, None, err.into()))
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// First element matching `locator`; `NotFound` after the full timeout
    pub fn find_one(
        &mut self,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> StorefrontResult<ElementHandle> {
        let timeout = self.timeout_or_default(timeout);
        self.present("find_one", &Target::from(locator), timeout)
    }

    /// Every element matching `locator`; empty if none appear within the timeout
    pub fn find_all(
        &mut self,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> StorefrontResult<Vec<ElementHandle>> {
        let timeout = self.timeout_or_default(timeout);
        let condition = Condition::AllPresent(locator.clone());
        let outcome = self
            .waiter(timeout)
            .until(&mut *self.session, &condition)
            .map_err(|err| self.fail("find_all", Some(locator), locator, Some(timeout), err.into()))?;
        if outcome.is_timed_out() {
            tracing::debug!(locator = %locator, "no elements found");
        }
        Ok(outcome.into_elements())
    }

    /// First element matching `locator` under `parent`
    pub fn find_one_within(
        &mut self,
        parent: &ElementHandle,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> StorefrontResult<ElementHandle> {
        let timeout = self.timeout_or_default(timeout);
        let target = Target::from(locator);
        let waiter = self.waiter(timeout);
        let found = self
            .session
            .element_state(parent)
            .and_then(|_| waiter.poll(&mut *self.session, |session| session.find(Some(parent), locator)))
            .map_err(|err| self.fail_on("find_one_within", &target, Some(timeout), err.into()))?;
        found.ok_or_else(|| {
            self.fail_on("find_one_within", &target, Some(timeout), not_found(&target, timeout))
        })
    }

    /// First element matching `locator` under `parent` right now, without
    /// waiting; `Ok(None)` when there is none
    pub fn find_present_within(
        &mut self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> StorefrontResult<Option<ElementHandle>> {
        self.session
            .find(Some(parent), locator)
            .map_err(|err| self.fail("find_present_within", Some(locator), locator, None, err.into()))
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// Wait until `target` is clickable and click it.
    ///
    /// A native click intercepted by an overlapping element is retried once
    /// as a script click.
    pub fn click(
        &mut self,
        target: impl Into<Target>,
        timeout: Option<Duration>,
    ) -> StorefrontResult<()> {
        let target = target.into();
        let timeout = self.timeout_or_default(timeout);
        let started = Instant::now();
        let Some(element) = self.await_target("click", &target, Readiness::Clickable, timeout)?
        else {
            let error = StorefrontError::NotInteractable {
                target: target.to_string(),
                timeout,
                reason: "element did not become visible and enabled".to_string(),
            };
            return Err(self.fail_on("click", &target, Some(timeout), error));
        };
        match self.session.click(&element) {
            Ok(()) => {}
            Err(SessionError::ClickIntercepted { message }) => {
                tracing::warn!(target = %target, %message, "click intercepted, retrying as script click");
                let args = [ScriptArg::from(&element)];
                if let Err(err) = self.session.execute_script(scripts::CLICK, &args) {
                    let error = StorefrontError::NotInteractable {
                        target: target.to_string(),
                        timeout,
                        reason: format!("click intercepted ({message}) and script click failed: {err}"),
                    };
                    return Err(self.fail_on("click", &target, Some(timeout), error));
                }
            }
            Err(SessionError::NotInteractable { message }) => {
                let error = StorefrontError::NotInteractable {
                    target: target.to_string(),
                    timeout,
                    reason: message,
                };
                return Err(self.fail_on("click", &target, Some(timeout), error));
            }
            Err(err) => return Err(self.fail_on("click", &target, Some(timeout), err.into())),
        }
        self.step("click", &target, started);
        Ok(())
    }

    /// Clear the element and type `text` into it
    pub fn type_text(
        &mut self,
        target: impl Into<Target>,
        text: &str,
        timeout: Option<Duration>,
    ) -> StorefrontResult<()> {
        let target = target.into();
        let timeout = self.timeout_or_default(timeout);
        let started = Instant::now();
        let element = self.present("type_text", &target, timeout)?;
        self.session_call("type_text", &target, |session| {
            session.clear(&element)?;
            session.send_keys(&element, text)
        })?;
        self.step("type_text", &target, started);
        Ok(())
    }

    /// Trimmed visible text, or the `value` of a form control without text
    pub fn read_text(
        &mut self,
        target: impl Into<Target>,
        timeout: Option<Duration>,
    ) -> StorefrontResult<String> {
        let target = target.into();
        let timeout = self.timeout_or_default(timeout);
        let element = self.present("read_text", &target, timeout)?;
        let text = self.session_call("read_text", &target, |session| {
            let text = session.text(&element)?;
            if text.trim().is_empty() {
                Ok(session.attribute(&element, "value")?.unwrap_or(text))
            } else {
                Ok(text)
            }
        })?;
        let text = text.trim().to_string();
        tracing::debug!(target = %target, text = %text, "read text");
        Ok(text)
    }

    /// Attribute `name` of the element
    pub fn attribute(
        &mut self,
        target: impl Into<Target>,
        name: &str,
        timeout: Option<Duration>,
    ) -> StorefrontResult<Option<String>> {
        let target = target.into();
        let timeout = self.timeout_or_default(timeout);
        let element = self.present("attribute", &target, timeout)?;
        self.session_call("attribute", &target, |session| session.attribute(&element, name))
    }

    /// Send the Enter key to the element
    pub fn press_enter(
        &mut self,
        target: impl Into<Target>,
        timeout: Option<Duration>,
    ) -> StorefrontResult<()> {
        let target = target.into();
        let timeout = self.timeout_or_default(timeout);
        let started = Instant::now();
        let element = self.present("press_enter", &target, timeout)?;
        self.session_call("press_enter", &target, |session| session.press_enter(&element))?;
        self.step("press_enter", &target, started);
        Ok(())
    }

    /// Move the pointer over the element once it is visible
    pub fn hover(
        &mut self,
        target: impl Into<Target>,
        timeout: Option<Duration>,
    ) -> StorefrontResult<()> {
        let target = target.into();
        let timeout = self.timeout_or_default(timeout);
        let started = Instant::now();
        let Some(element) = self.await_target("hover", &target, Readiness::Visible, timeout)? else {
            let error = StorefrontError::NotInteractable {
                target: target.to_string(),
                timeout,
                reason: "element did not become visible".to_string(),
            };
            return Err(self.fail_on("hover", &target, Some(timeout), error));
        };
        self.session_call("hover", &target, |session| session.hover(&element))?;
        self.step("hover", &target, started);
        Ok(())
    }

    /// Scroll the element to the top of the viewport
    pub fn scroll_into_view(
        &mut self,
        target: impl Into<Target>,
        timeout: Option<Duration>,
    ) -> StorefrontResult<()> {
        self.run_on_element("scroll_into_view", target.into(), timeout, scripts::SCROLL_INTO_VIEW)
    }

    /// Click through script, bypassing hit testing
    pub fn programmatic_click(
        &mut self,
        target: impl Into<Target>,
        timeout: Option<Duration>,
    ) -> StorefrontResult<()> {
        self.run_on_element("programmatic_click", target.into(), timeout, scripts::CLICK)
    }

    fn run_on_element(
        &mut self,
        action: &str,
        target: Target,
        timeout: Option<Duration>,
        code: &str,
    ) -> StorefrontResult<()> {
        let timeout = self.timeout_or_default(timeout);
        let started = Instant::now();
        let element = self.present(action, &target, timeout)?;
        self.session_call(action, &target, |session| {
            session.execute_script(code, &[ScriptArg::from(&element)])
        })?;
        self.step(action, &target, started);
        Ok(())
    }

    /// Choose the `<option>` whose visible text is `text`
    pub fn select_option_by_text(
        &mut self,
        locator: &Locator,
        text: &str,
        timeout: Option<Duration>,
    ) -> StorefrontResult<()> {
        self.select_option(locator, text, timeout, |session, option| {
            Ok(session.text(option)?.trim() == text)
        })
    }

    /// Choose the `<option>` whose `value` attribute is `value`
    pub fn select_option_by_value(
        &mut self,
        locator: &Locator,
        value: &str,
        timeout: Option<Duration>,
    ) -> StorefrontResult<()> {
        self.select_option(locator, value, timeout, |session, option| {
            Ok(session.attribute(option, "value")?.as_deref() == Some(value))
        })
    }

    fn select_option(
        &mut self,
        locator: &Locator,
        wanted: &str,
        timeout: Option<Duration>,
        matches: impl Fn(&dyn Session, &ElementHandle) -> Result<bool, SessionError>,
    ) -> StorefrontResult<()> {
        let target = Target::from(locator);
        let timeout = self.timeout_or_default(timeout);
        let started = Instant::now();
        let select = self.present("select_option", &target, timeout)?;
        let option = self.session_call("select_option", &target, |session| {
            for option in session.find_all(Some(&select), &Locator::tag_name("option"))? {
                if matches(&*session, &option)? {
                    return Ok(Some(option));
                }
            }
            Ok(None)
        })?;
        let Some(option) = option else {
            let error = StorefrontError::OptionNotFound {
                locator: locator.clone(),
                option: wanted.to_string(),
            };
            return Err(self.fail_on("select_option", &target, Some(timeout), error));
        };
        self.session_call("select_option", &target, |session| {
            session.execute_script(scripts::SELECT_OPTION, &[ScriptArg::from(&option)])
        })?;
        self.step("select_option", &target, started);
        Ok(())
    }

    /// Run `code` in the current document
    pub fn execute_script(&mut self, code: &str, args: &[ScriptArg]) -> StorefrontResult<Value> {
        self.session
            .execute_script(code, args)
            .map_err(|err| self.fail("execute_script", None, &"script", None, err.into()))
    }

    // -------------------------------------------------------------------------
    // Probes
    // -------------------------------------------------------------------------

    fn probe(&mut self, name: &str, condition: &Condition, timeout: Option<Duration>) -> bool {
        let timeout = self.timeout_or_default(timeout);
        match self.waiter(timeout).until(&mut *self.session, condition) {
            Ok(outcome) => !outcome.is_timed_out(),
            Err(err) => {
                tracing::warn!(probe = name, condition = %condition, error = %err, "probe failed");
                false
            }
        }
    }

    /// Whether an element matching `locator` becomes visible
    pub fn is_visible(&mut self, locator: &Locator, timeout: Option<Duration>) -> bool {
        self.probe("is_visible", &Condition::Visible(locator.clone()), timeout)
    }

    /// Whether an element matching `locator` appears in the document
    pub fn is_present(&mut self, locator: &Locator, timeout: Option<Duration>) -> bool {
        self.probe("is_present", &Condition::Present(locator.clone()), timeout)
    }

    /// Whether matches of `locator` disappear or become hidden
    pub fn wait_until_gone(&mut self, locator: &Locator, timeout: Option<Duration>) -> bool {
        self.probe("wait_until_gone", &Condition::Invisible(locator.clone()), timeout)
    }

    // -------------------------------------------------------------------------
    // Alerts and frames
    // -------------------------------------------------------------------------

    /// Accept the next JavaScript dialog and return its text
    pub fn accept_alert(&mut self, timeout: Option<Duration>) -> StorefrontResult<String> {
        self.handle_alert("accept_alert", timeout, |session| session.accept_alert())
    }

    /// Dismiss the next JavaScript dialog and return its text
    pub fn dismiss_alert(&mut self, timeout: Option<Duration>) -> StorefrontResult<String> {
        self.handle_alert("dismiss_alert", timeout, |session| session.dismiss_alert())
    }

    fn handle_alert(
        &mut self,
        action: &str,
        timeout: Option<Duration>,
        close: impl FnOnce(&mut dyn Session) -> Result<(), SessionError>,
    ) -> StorefrontResult<String> {
        let timeout = self.timeout_or_default(timeout);
        let started = Instant::now();
        let waiter = self.waiter(timeout);
        let text = waiter
            .poll(&mut *self.session, |session| session.alert_text())
            .map_err(|err| self.fail(action, None, &"alert", Some(timeout), err.into()))?;
        let Some(text) = text else {
            let error = StorefrontError::AlertAbsent { timeout };
            return Err(self.fail(action, None, &"alert", Some(timeout), error));
        };
        close(&mut *self.session)
            .map_err(|err| self.fail(action, None, &"alert", None, err.into()))?;
        self.step(action, &"alert", started);
        Ok(text)
    }

    /// Make the frame matching `locator` the current document
    pub fn enter_frame(&mut self, locator: &Locator, timeout: Option<Duration>) -> StorefrontResult<()> {
        let timeout = self.timeout_or_default(timeout);
        let started = Instant::now();
        let entered = self
            .waiter(timeout)
            .poll(&mut *self.session, |session| {
                let Some(frame) = session.find(None, locator)? else {
                    return Ok(None);
                };
                match session.enter_frame(&frame) {
                    Ok(()) => Ok(Some(())),
                    Err(SessionError::NoSuchFrame { .. }) => Ok(None),
                    Err(err) => Err(err),
                }
            })
            .map_err(|err| self.fail("enter_frame", Some(locator), locator, Some(timeout), err.into()))?;
        if entered.is_none() {
            let error = StorefrontError::FrameNotFound {
                locator: locator.clone(),
                timeout,
            };
            return Err(self.fail("enter_frame", Some(locator), locator, Some(timeout), error));
        }
        self.step("enter_frame", locator, started);
        Ok(())
    }

    /// Return to the document containing the current frame
    pub fn leave_frame(&mut self) -> StorefrontResult<()> {
        if let Err(err) = self.session.leave_frame() {
            return Err(self.fail("leave_frame", None, &"current frame", None, err.into()));
        }
        tracing::debug!("left frame");
        Ok(())
    }

    /// Return to the top-level document
    pub fn leave_all_frames(&mut self) -> StorefrontResult<()> {
        if let Err(err) = self.session.leave_all_frames() {
            return Err(self.fail("leave_all_frames", None, &"current frame", None, err.into()));
        }
        tracing::debug!("left all frames");
        Ok(())
    }

    /// Run `f` inside the frame matching `locator`, leaving it afterwards
    /// whether `f` succeeded or not.
    pub fn within_frame<T>(
        &mut self,
        locator: &Locator,
        timeout: Option<Duration>,
        f: impl FnOnce(&mut Self) -> StorefrontResult<T>,
    ) -> StorefrontResult<T> {
        self.enter_frame(locator, timeout)?;
        let result = f(self);
        let left = self.leave_frame();
        match (result, left) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), left) => {
                if let Err(leave_err) = left {
                    tracing::warn!(error = %leave_err, "could not leave frame after failure");
                }
                Err(err)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Open `path` relative to the base URL, or an absolute `http…` URL as is
    pub fn navigate(&mut self, path: &str) -> StorefrontResult<&mut Self> {
        let url = resolve_url(self.config.base_url(), path);
        self.navigate_to_url(&url)
    }

    /// Open `url` unchanged
    pub fn navigate_to_url(&mut self, url: &str) -> StorefrontResult<&mut Self> {
        let started = Instant::now();
        if let Err(err) = self.session.navigate(url) {
            let error = StorefrontError::NavigationError {
                url: url.to_string(),
                message: err.to_string(),
            };
            return Err(self.fail("navigate", None, &url, None, error));
        }
        self.step("navigate", &url, started);
        Ok(self)
    }

    /// URL of the current document
    pub fn current_url(&self) -> StorefrontResult<String> {
        self.session
            .current_url()
            .map_err(|err| self.fail("current_url", None, &"current document", None, err.into()))
    }

    /// Title of the current document
    pub fn title(&self) -> StorefrontResult<String> {
        self.session
            .title()
            .map_err(|err| self.fail("title", None, &"current document", None, err.into()))
    }

    /// Path of the current URL
    pub fn current_path(&self) -> StorefrontResult<String> {
        Ok(url_path(&self.current_url()?).to_string())
    }

    /// Screenshot of the viewport, forwarded to the observer; `None` if the
    /// browser could not take one
    pub fn capture_screenshot(&self, name: &str) -> Option<Vec<u8>> {
        match self.session.screenshot() {
            Ok(png) => {
                self.observer.on_screenshot(name, &png);
                Some(png)
            }
            Err(err) => {
                tracing::warn!(name, error = %err, "screenshot failed");
                None
            }
        }
    }

    /// Type `term` into the header search and submit it with Enter
    pub(crate) fn submit_search(&mut self, term: &str) -> StorefrontResult<SearchResultsPage<'_>> {
        self.type_text(&SEARCH_INPUT, term, None)?;
        self.press_enter(&SEARCH_INPUT, None)?;
        tracing::debug!(term, "search submitted");
        Ok(SearchResultsPage::from_base(self.reborrow()))
    }
}

fn not_found(target: &Target, timeout: Duration) -> StorefrontError {
    match target.locator() {
        Some(locator) => StorefrontError::NotFound {
            locator: locator.clone(),
            timeout,
        },
        None => StorefrontError::NotInteractable {
            target: target.to_string(),
            timeout,
            reason: "element is no longer usable".to_string(),
        },
    }
}

/// Pages whose layout carries the global search bar
pub trait HasSearchBar<'s> {
    /// The page's primitives
    fn base_page(&mut self) -> &mut BasePage<'s>;

    /// Search for `term` and return the results page on the same session.
    ///
    /// An empty `term` is submitted as is.
    fn search<'a>(&'a mut self, term: &str) -> StorefrontResult<SearchResultsPage<'a>>
    where
        's: 'a,
    {
        self.base_page().submit_search(term)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::report::RecordingObserver;
    use crate::session::{FakeDom, FakeElement, FakeSession};

    const SHORT: Option<Duration> = Some(Duration::from_millis(120));

    fn config() -> Config {
        Config::default()
            .with_base_url("http://shop.test")
            .with_default_timeout(Duration::from_millis(300))
            .with_poll_interval(Duration::from_millis(10))
    }

    fn loaded(build: impl Fn(&mut FakeDom) + 'static) -> FakeSession {
        let mut session = FakeSession::new().with_route("http://shop.test/page", build);
        session.navigate("http://shop.test/page").unwrap();
        session
    }

    mod navigation_tests {
        use super::*;

        #[test]
        fn test_relative_path_appended_to_base() {
            let mut session = FakeSession::new();
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            page.navigate("/login").unwrap();
            assert_eq!(page.current_url().unwrap(), "http://shop.test/login");
            assert_eq!(page.current_path().unwrap(), "/login");
        }

        #[test]
        fn test_absolute_url_ignores_base() {
            let mut session = FakeSession::new();
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            page.navigate("https://other.test/x").unwrap();
            assert_eq!(page.current_url().unwrap(), "https://other.test/x");
        }

        #[test]
        fn test_duplicate_slashes_preserved() {
            assert_eq!(resolve_url("http://shop.test/", "/cart"), "http://shop.test//cart");
            assert_eq!(resolve_url("http://shop.test", "cart"), "http://shop.testcart");
        }

        #[test]
        fn test_navigation_failure_is_typed_and_reported() {
            let mut session = FakeSession::new().with_failing_navigation("http://shop.test/down");
            let config = config();
            let observer = Arc::new(RecordingObserver::new());
            let mut page = BasePage::new(&mut session, &config).with_observer(observer.clone());
            let err = page.navigate("/down").unwrap_err();
            assert!(matches!(err, StorefrontError::NavigationError { ref url, .. } if url == "http://shop.test/down"));
            assert_eq!(observer.failures().len(), 1);
        }

        #[test]
        fn test_navigate_is_chainable() {
            let mut session = FakeSession::new()
                .with_route("http://shop.test/login", |dom| dom.set_title("Login"));
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            let title = page.navigate("/login").unwrap().title().unwrap();
            assert_eq!(title, "Login");
        }
    }

    mod lookup_tests {
        use super::*;

        #[test]
        fn test_find_one_waits_full_timeout_then_not_found() {
            let mut session = loaded(|_| {});
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            let started = Instant::now();
            let err = page.find_one(&Locator::id("missing"), SHORT).unwrap_err();
            assert!(started.elapsed() >= Duration::from_millis(120));
            assert!(matches!(err, StorefrontError::NotFound { timeout, .. } if timeout == Duration::from_millis(120)));
        }

        #[test]
        fn test_find_all_empty_is_not_an_error() {
            let mut session = loaded(|_| {});
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            assert!(page.find_all(&Locator::css(".row"), SHORT).unwrap().is_empty());
        }

        #[test]
        fn test_find_one_sees_late_element() {
            let mut session = loaded(|dom| {
                dom.append(
                    FakeElement::new("div")
                        .id("late")
                        .appear_after(Duration::from_millis(40)),
                );
            });
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            assert!(page.find_one(&Locator::id("late"), None).is_ok());
        }

        #[test]
        fn test_find_one_within_is_scoped() {
            let mut session = loaded(|dom| {
                dom.append(FakeElement::new("div").class("row").child(FakeElement::new("span").class("name").text("A")));
                dom.append(FakeElement::new("div").class("row").child(FakeElement::new("span").class("name").text("B")));
            });
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            let rows = page.find_all(&Locator::css(".row"), None).unwrap();
            let name = page.find_one_within(&rows[1], &Locator::css(".name"), None).unwrap();
            assert_eq!(page.read_text(name, None).unwrap(), "B");
        }
    }

    mod click_tests {
        use super::*;

        fn obscured_button() -> impl Fn(&mut FakeDom) + 'static {
            |dom: &mut FakeDom| {
                dom.append(
                    FakeElement::new("button")
                        .id("buy")
                        .obscured()
                        .on_click(|dom| {
                            dom.append(FakeElement::new("p").id("done"));
                        }),
                );
            }
        }

        #[test]
        fn test_intercepted_click_falls_back_to_script() {
            let mut session = loaded(obscured_button());
            let config = config();
            let observer = Arc::new(RecordingObserver::new());
            let mut page = BasePage::new(&mut session, &config).with_observer(observer.clone());
            page.click(Locator::id("buy"), SHORT).unwrap();
            assert!(page.is_present(&Locator::id("done"), SHORT));
            assert_eq!(observer.steps()[0].action, "click");
            drop(page);
            assert!(session.was_called("execute_script"));
        }

        #[test]
        fn test_failed_fallback_is_not_interactable() {
            let mut session = loaded(obscured_button()).with_failing_script_clicks();
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            let err = page.click(Locator::id("buy"), SHORT).unwrap_err();
            assert!(matches!(err, StorefrontError::NotInteractable { .. }));
        }

        #[test]
        fn test_disabled_button_times_out() {
            let mut session = loaded(|dom| {
                dom.append(FakeElement::new("button").id("buy").disabled());
            });
            let config = config();
            let observer = Arc::new(RecordingObserver::new());
            let mut page = BasePage::new(&mut session, &config).with_observer(observer.clone());
            let err = page.click(Locator::id("buy"), SHORT).unwrap_err();
            assert!(matches!(err, StorefrontError::NotInteractable { .. }));
            let failures = observer.failures();
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].locator, Some(Locator::id("buy")));
            assert_eq!(failures[0].timeout, SHORT);
            assert!(failures[0].screenshot.is_some());
        }

        #[test]
        fn test_native_not_interactable_is_reported_with_context() {
            let mut session = loaded(|dom| {
                dom.append(FakeElement::new("button").id("buy").inert());
            });
            let config = config();
            let observer = Arc::new(RecordingObserver::new());
            let mut page = BasePage::new(&mut session, &config).with_observer(observer.clone());
            let err = page.click(Locator::id("buy"), SHORT).unwrap_err();
            match err {
                StorefrontError::NotInteractable { target, reason, .. } => {
                    assert!(target.contains("buy"));
                    assert!(reason.contains("pointer input"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
            let failures = observer.failures();
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].action, "click");
            assert_eq!(failures[0].locator, Some(Locator::id("buy")));
            drop(page);
            assert!(!session.was_called("execute_script"));
        }

        #[test]
        fn test_stale_element_target_is_reported() {
            let mut session = loaded(|dom| {
                dom.append(FakeElement::new("button").id("buy"));
            });
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            let button = page.find_one(&Locator::id("buy"), None).unwrap();
            page.navigate("/page").unwrap();
            let err = page.click(button, SHORT).unwrap_err();
            assert!(matches!(err, StorefrontError::Session(SessionError::StaleElement { .. })));
        }
    }

    mod text_tests {
        use super::*;

        #[test]
        fn test_type_then_read_round_trips() {
            let mut session = loaded(|dom| {
                dom.append(FakeElement::new("input").id("q").value("old"));
            });
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            page.type_text(&Locator::id("q"), "lamp", None).unwrap();
            assert_eq!(page.read_text(&Locator::id("q"), None).unwrap(), "lamp");
        }

        #[test]
        fn test_read_text_trims() {
            let mut session = loaded(|dom| {
                dom.append(FakeElement::new("h1").id("title").text("  Lamp \n"));
            });
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            assert_eq!(page.read_text(&Locator::id("title"), None).unwrap(), "Lamp");
            assert_eq!(page.attribute(&Locator::id("title"), "id", None).unwrap().as_deref(), Some("title"));
        }

        #[test]
        fn test_type_into_missing_field_is_not_found() {
            let mut session = loaded(|_| {});
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            let err = page.type_text(&Locator::id("q"), "x", SHORT).unwrap_err();
            assert!(matches!(err, StorefrontError::NotFound { .. }));
        }
    }

    mod presence_tests {
        use super::*;

        #[test]
        fn test_hidden_element_is_not_visible() {
            let mut session = loaded(|dom| {
                dom.append(FakeElement::new("div").id("msg").hidden());
            });
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            assert!(!page.is_visible(&Locator::id("msg"), SHORT));
            assert!(page.is_present(&Locator::id("msg"), SHORT));
            assert!(page.wait_until_gone(&Locator::id("msg"), SHORT));
        }

        #[test]
        fn test_presence_checks_swallow_session_errors() {
            let mut session = loaded(|_| {});
            session.quit().unwrap();
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            assert!(!page.is_visible(&Locator::id("msg"), SHORT));
            assert!(!page.is_present(&Locator::id("msg"), SHORT));
        }

        #[test]
        fn test_spinner_disappears() {
            let mut session = loaded(|dom| {
                dom.append(
                    FakeElement::new("div")
                        .class("spinner")
                        .remove_after(Duration::from_millis(30)),
                );
            });
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            assert!(page.wait_until_gone(&Locator::css(".spinner"), None));
        }
    }

    mod select_tests {
        use super::*;

        fn sizes(dom: &mut FakeDom) {
            dom.append(FakeElement::new("select").id("size").children([
                FakeElement::new("option").value("s").text("Small"),
                FakeElement::new("option").value("m").text("Medium"),
            ]));
        }

        #[test]
        fn test_select_by_text_and_value() {
            let mut session = loaded(sizes);
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            page.select_option_by_text(&Locator::id("size"), "Medium", None).unwrap();
            drop(page);
            assert_eq!(session.dom().value(&Locator::id("size")).as_deref(), Some("m"));

            let mut page = BasePage::new(&mut session, &config);
            page.select_option_by_value(&Locator::id("size"), "s", None).unwrap();
            drop(page);
            assert_eq!(session.dom().value(&Locator::id("size")).as_deref(), Some("s"));
        }

        #[test]
        fn test_missing_option() {
            let mut session = loaded(sizes);
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            let err = page.select_option_by_text(&Locator::id("size"), "Huge", None).unwrap_err();
            assert!(matches!(err, StorefrontError::OptionNotFound { ref option, .. } if option == "Huge"));
        }
    }

    mod alert_tests {
        use super::*;

        #[test]
        fn test_accept_returns_text() {
            let mut session = loaded(|dom| dom.open_alert_after("Saved", Duration::from_millis(30)));
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            assert_eq!(page.accept_alert(None).unwrap(), "Saved");
            assert!(matches!(
                page.dismiss_alert(SHORT).unwrap_err(),
                StorefrontError::AlertAbsent { .. }
            ));
        }
    }

    mod frame_tests {
        use super::*;

        fn payment(dom: &mut FakeDom) {
            dom.append(
                FakeElement::new("iframe")
                    .id("payment")
                    .child(FakeElement::new("input").id("card-number")),
            );
        }

        #[test]
        fn test_within_frame_leaves_on_success_and_failure() {
            let mut session = loaded(payment);
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            page.within_frame(&Locator::id("payment"), None, |frame| {
                frame.type_text(&Locator::id("card-number"), "4242", None)
            })
            .unwrap();
            let err = page
                .within_frame(&Locator::id("payment"), None, |frame| {
                    frame.find_one(&Locator::id("nope"), SHORT).map(drop)
                })
                .unwrap_err();
            assert!(matches!(err, StorefrontError::NotFound { .. }));
            drop(page);
            assert_eq!(session.frame_depth(), 0);
        }

        #[test]
        fn test_missing_frame() {
            let mut session = loaded(|_| {});
            let config = config();
            let mut page = BasePage::new(&mut session, &config);
            let err = page.enter_frame(&Locator::id("payment"), SHORT).unwrap_err();
            assert!(matches!(err, StorefrontError::FrameNotFound { .. }));
        }
    }

    mod failure_capture_tests {
        use super::*;

        #[test]
        fn test_screenshot_failure_does_not_mask_error() {
            let mut session = loaded(|_| {}).with_failing_screenshots();
            let config = config();
            let observer = Arc::new(RecordingObserver::new());
            let mut page = BasePage::new(&mut session, &config).with_observer(observer.clone());
            let err = page.find_one(&Locator::id("gone"), SHORT).unwrap_err();
            assert!(matches!(err, StorefrontError::NotFound { .. }));
            let failures = observer.failures();
            assert!(failures[0].screenshot.is_none());
            assert!(failures[0].capture_error.is_some());
            assert_eq!(failures[0].url.as_deref(), Some("http://shop.test/page"));
        }

        #[test]
        fn test_document_queries_on_closed_session_are_captured() {
            let mut session = loaded(|_| {});
            session.quit().unwrap();
            let config = config();
            let observer = Arc::new(RecordingObserver::new());
            let page = BasePage::new(&mut session, &config).with_observer(observer.clone());
            let err = page.current_url().unwrap_err();
            assert!(matches!(err, StorefrontError::Session(SessionError::Closed)));
            assert!(page.title().is_err());
            let failures = observer.failures();
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].action, "current_url");
            assert_eq!(failures[1].action, "title");
            assert!(failures[0].capture_error.is_some());
        }

        #[test]
        fn test_leaving_frames_on_closed_session_is_captured() {
            let mut session = loaded(|_| {});
            session.quit().unwrap();
            let config = config();
            let observer = Arc::new(RecordingObserver::new());
            let mut page = BasePage::new(&mut session, &config).with_observer(observer.clone());
            assert!(page.leave_frame().is_err());
            assert!(page.leave_all_frames().is_err());
            let actions: Vec<_> = observer.failures().into_iter().map(|f| f.action).collect();
            assert_eq!(actions, vec!["leave_frame".to_string(), "leave_all_frames".to_string()]);
        }

        #[test]
        fn test_present_within_returns_none_without_waiting() {
            let mut session = loaded(|dom| {
                dom.append(FakeElement::new("div").class("card").child(FakeElement::new("h3").text("Lamp")));
            });
            let config = config();
            let observer = Arc::new(RecordingObserver::new());
            let mut page = BasePage::new(&mut session, &config).with_observer(observer.clone());
            let card = page.find_one(&Locator::css(".card"), None).unwrap();
            let started = Instant::now();
            assert!(page.find_present_within(&card, &Locator::css(".price")).unwrap().is_none());
            assert!(started.elapsed() < Duration::from_millis(100));
            assert!(page.find_present_within(&card, &Locator::css("h3")).unwrap().is_some());
            assert!(observer.failures().is_empty());
        }

        #[test]
        fn test_capture_screenshot_forwards_to_observer() {
            let mut session = loaded(|_| {});
            let config = config();
            let observer = Arc::new(RecordingObserver::new());
            let page = BasePage::new(&mut session, &config).with_observer(observer.clone());
            assert!(page.capture_screenshot("checkout").is_some());
            assert_eq!(observer.screenshots(), vec!["checkout".to_string()]);
        }
    }
}
