//! Interaction reporting.
//!
//! Primitives report what they did to an [`InteractionObserver`] instead of
//! writing reports themselves:
//!
//! ```text
//! ┌──────────────┐  on_step / on_failure / on_screenshot  ┌──────────────────────┐
//! │  BasePage    │ ─────────────────────────────────────▶ │ InteractionObserver  │
//! │  primitives  │                                        ├──────────────────────┤
//! └──────────────┘                                        │ NoopObserver         │
//!                                                         │ RecordingObserver    │
//!                                                         │ AttachmentObserver ──┼──▶ ReportSink
//!                                                         └──────────────────────┘    (DirectorySink,
//!                                                                                      MemorySink)
//! ```
//!
//! Observers must never fail the interaction they observe: sink errors are
//! logged and dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::locator::Locator;
use crate::result::StorefrontResult;

// =============================================================================
// EVENTS
// =============================================================================

/// A completed interaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// Primitive that ran (e.g., "click", "type_text")
    pub action: String,
    /// Locator or element the action targeted
    pub target: String,
    /// Time spent, waits included
    pub duration: Duration,
    /// When the step finished
    pub timestamp: SystemTime,
}

impl StepRecord {
    /// Record a step finishing now
    #[must_use]
    pub fn new(action: impl Into<String>, target: impl Into<String>, duration: Duration) -> Self {
        Self {
            action: action.into(),
            target: target.into(),
            duration,
            timestamp: SystemTime::now(),
        }
    }
}

/// Diagnostic bundle captured when a primitive fails
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    /// Primitive that failed
    pub action: String,
    /// Locator involved, if the target was a locator
    pub locator: Option<Locator>,
    /// Description of the target
    pub target: String,
    /// Timeout that was applied, if the failure followed a wait
    pub timeout: Option<Duration>,
    /// The error that is propagated to the test
    pub message: String,
    /// URL shown when the failure happened
    pub url: Option<String>,
    /// PNG of the viewport
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
    /// Why the screenshot is missing
    pub capture_error: Option<String>,
    /// When the failure happened
    pub timestamp: SystemTime,
}

impl FailureReport {
    /// Report without captured context
    #[must_use]
    pub fn new(action: impl Into<String>, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            locator: None,
            target: target.into(),
            timeout: None,
            message: message.into(),
            url: None,
            screenshot: None,
            capture_error: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Attach the locator
    #[must_use]
    pub fn with_locator(mut self, locator: Option<Locator>) -> Self {
        self.locator = locator;
        self
    }

    /// Attach the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Short name for attachment titles
    #[must_use]
    pub fn slug(&self) -> String {
        match &self.locator {
            Some(locator) => format!("{}_{}", self.action, locator.slug()),
            None => self.action.clone(),
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Action: {}", self.action)?;
        writeln!(f, "Target: {}", self.target)?;
        if let Some(timeout) = self.timeout {
            writeln!(f, "Timeout: {}ms", timeout.as_millis())?;
        }
        if let Some(url) = &self.url {
            writeln!(f, "URL: {url}")?;
        }
        write!(f, "Error: {}", self.message)?;
        if let Some(capture_error) = &self.capture_error {
            write!(f, "\nScreenshot unavailable: {capture_error}")?;
        }
        Ok(())
    }
}

// =============================================================================
// OBSERVERS
// =============================================================================

/// Receives interaction events from page objects
pub trait InteractionObserver: Send + Sync {
    /// A primitive completed
    fn on_step(&self, _step: &StepRecord) {}

    /// A primitive failed; the error propagates after this returns
    fn on_failure(&self, _report: &FailureReport) {}

    /// A screenshot was taken on request
    fn on_screenshot(&self, _name: &str, _png: &[u8]) {}
}

/// Ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl InteractionObserver for NoopObserver {}

/// Event seen by a [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    /// Completed step
    Step(StepRecord),
    /// Failure with its diagnostics
    Failure(FailureReport),
    /// Requested screenshot
    Screenshot {
        /// Name given to the screenshot
        name: String,
        /// Image bytes
        png: Vec<u8>,
    },
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ObservedEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All events in arrival order
    #[must_use]
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.lock().clone()
    }

    /// Completed steps
    #[must_use]
    pub fn steps(&self) -> Vec<StepRecord> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::Step(step) => Some(step.clone()),
                _ => None,
            })
            .collect()
    }

    /// Failure reports
    #[must_use]
    pub fn failures(&self) -> Vec<FailureReport> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::Failure(report) => Some(report.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of requested screenshots
    #[must_use]
    pub fn screenshots(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::Screenshot { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

impl InteractionObserver for RecordingObserver {
    fn on_step(&self, step: &StepRecord) {
        self.lock().push(ObservedEvent::Step(step.clone()));
    }

    fn on_failure(&self, report: &FailureReport) {
        self.lock().push(ObservedEvent::Failure(report.clone()));
    }

    fn on_screenshot(&self, name: &str, png: &[u8]) {
        self.lock().push(ObservedEvent::Screenshot {
            name: name.to_string(),
            png: png.to_vec(),
        });
    }
}

/// Turns events into report attachments
#[derive(Debug)]
pub struct AttachmentObserver<S: ReportSink> {
    sink: S,
    attach_steps: bool,
}

impl<S: ReportSink> AttachmentObserver<S> {
    /// Attach failures and requested screenshots to `sink`
    #[must_use]
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            attach_steps: false,
        }
    }

    /// Also attach a line of text per completed step
    #[must_use]
    pub const fn with_steps(mut self) -> Self {
        self.attach_steps = true;
        self
    }

    /// The sink events are attached to
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    fn attach(&self, attachment: Attachment) {
        let name = attachment.name.clone();
        if let Err(err) = self.sink.attach(attachment) {
            tracing::warn!(attachment = %name, error = %err, "failed to attach to report");
        }
    }
}

impl<S: ReportSink> InteractionObserver for AttachmentObserver<S> {
    fn on_step(&self, step: &StepRecord) {
        if self.attach_steps {
            self.attach(Attachment::text(
                format!("step_{}", step.action),
                format!(
                    "{} {} ({}ms)",
                    step.action,
                    step.target,
                    step.duration.as_millis()
                ),
            ));
        }
    }

    fn on_failure(&self, report: &FailureReport) {
        let slug = report.slug();
        if let Some(png) = &report.screenshot {
            self.attach(Attachment::png(format!("failure_{slug}"), png.clone()));
        }
        self.attach(Attachment::text(format!("error_{slug}"), report.to_string()));
    }

    fn on_screenshot(&self, name: &str, png: &[u8]) {
        self.attach(Attachment::png(name, png.to_vec()));
    }
}

// =============================================================================
// ATTACHMENTS AND SINKS
// =============================================================================

/// Content of an attachment
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentBody {
    /// PNG image
    Png(Vec<u8>),
    /// Plain text
    Text(String),
    /// JSON document
    Json(serde_json::Value),
}

/// A named piece of evidence for the test report
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Attachment title
    pub name: String,
    /// Content
    pub body: AttachmentBody,
}

impl Attachment {
    /// PNG attachment
    #[must_use]
    pub fn png(name: impl Into<String>, png: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            body: AttachmentBody::Png(png),
        }
    }

    /// Text attachment
    #[must_use]
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: AttachmentBody::Text(text.into()),
        }
    }

    /// JSON attachment
    #[must_use]
    pub fn json(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            body: AttachmentBody::Json(value),
        }
    }

    /// MIME type of the body
    #[must_use]
    pub const fn media_type(&self) -> &'static str {
        match self.body {
            AttachmentBody::Png(_) => "image/png",
            AttachmentBody::Text(_) => "text/plain",
            AttachmentBody::Json(_) => "application/json",
        }
    }

    /// File extension for the body
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self.body {
            AttachmentBody::Png(_) => "png",
            AttachmentBody::Text(_) => "txt",
            AttachmentBody::Json(_) => "json",
        }
    }

    fn bytes(&self) -> StorefrontResult<Vec<u8>> {
        Ok(match &self.body {
            AttachmentBody::Png(png) => png.clone(),
            AttachmentBody::Text(text) => text.as_bytes().to_vec(),
            AttachmentBody::Json(value) => serde_json::to_vec_pretty(value)?,
        })
    }
}

/// Destination for report attachments
pub trait ReportSink: Send + Sync {
    /// Store one attachment
    fn attach(&self, attachment: Attachment) -> StorefrontResult<()>;
}

/// Writes attachments as timestamped files into a directory
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    sequence: AtomicUsize,
}

impl DirectorySink {
    /// Create the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> StorefrontResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            sequence: AtomicUsize::new(0),
        })
    }

    /// Directory attachments are written to
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(&self, attachment: &Attachment) -> String {
        let stem: String = attachment
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{stem}_{timestamp}_{sequence:03}.{}", attachment.extension())
    }
}

impl ReportSink for DirectorySink {
    fn attach(&self, attachment: Attachment) -> StorefrontResult<()> {
        let path = self.dir.join(self.file_name(&attachment));
        std::fs::write(&path, attachment.bytes()?)?;
        tracing::info!(path = %path.display(), media_type = attachment.media_type(), "attachment written");
        Ok(())
    }
}

/// Keeps attachments in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    attachments: Mutex<Vec<Attachment>>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attachments received so far
    #[must_use]
    pub fn attachments(&self) -> Vec<Attachment> {
        self.attachments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of attachments received so far
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.attachments()
            .into_iter()
            .map(|attachment| attachment.name)
            .collect()
    }
}

impl ReportSink for MemorySink {
    fn attach(&self, attachment: Attachment) -> StorefrontResult<()> {
        self.attachments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(attachment);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn failure() -> FailureReport {
        FailureReport::new(
            "click",
            "css selector \".checkout-btn\"",
            "Element css selector \".checkout-btn\" not interactable within 500ms",
        )
        .with_locator(Some(Locator::css(".checkout-btn")))
        .with_timeout(Some(Duration::from_millis(500)))
    }

    mod failure_report_tests {
        use super::*;

        #[test]
        fn test_display_lists_context() {
            let mut report = failure();
            report.url = Some("http://shop.test/cart".into());
            report.capture_error = Some("screenshot capture failed".into());
            let text = report.to_string();
            assert!(text.contains("Action: click"));
            assert!(text.contains("Timeout: 500ms"));
            assert!(text.contains("URL: http://shop.test/cart"));
            assert!(text.contains("Screenshot unavailable: screenshot capture failed"));
        }

        #[test]
        fn test_slug_uses_locator() {
            assert_eq!(failure().slug(), "click_css_selector__checkout_btn");
            assert_eq!(FailureReport::new("accept_alert", "alert", "none").slug(), "accept_alert");
        }
    }

    mod observer_tests {
        use super::*;

        #[test]
        fn test_recording_observer_keeps_order() {
            let observer = RecordingObserver::new();
            observer.on_step(&StepRecord::new("navigate", "/login", Duration::ZERO));
            observer.on_failure(&failure());
            observer.on_screenshot("cart", &[1, 2, 3]);
            assert_eq!(observer.events().len(), 3);
            assert_eq!(observer.steps()[0].action, "navigate");
            assert_eq!(observer.failures()[0].action, "click");
            assert_eq!(observer.screenshots(), vec!["cart".to_string()]);
        }

        #[test]
        fn test_attachment_observer_attaches_failure() {
            let observer = AttachmentObserver::new(MemorySink::new());
            let mut report = failure();
            report.screenshot = Some(vec![0x89, b'P', b'N', b'G']);
            observer.on_step(&StepRecord::new("click", "x", Duration::ZERO));
            observer.on_failure(&report);
            let attachments = observer.sink().attachments();
            assert_eq!(attachments.len(), 2);
            assert_eq!(attachments[0].media_type(), "image/png");
            assert_eq!(attachments[0].name, "failure_click_css_selector__checkout_btn");
            assert_eq!(attachments[1].media_type(), "text/plain");
        }

        #[test]
        fn test_attachment_observer_without_screenshot() {
            let observer = AttachmentObserver::new(MemorySink::new());
            observer.on_failure(&failure());
            assert_eq!(
                observer.sink().names(),
                vec!["error_click_css_selector__checkout_btn".to_string()]
            );
        }

        #[test]
        fn test_step_attachments_are_opt_in() {
            let observer = AttachmentObserver::new(MemorySink::new()).with_steps();
            observer.on_step(&StepRecord::new("type_text", "id \"email\"", Duration::from_millis(12)));
            let attachments = observer.sink().attachments();
            assert_eq!(
                attachments[0].body,
                AttachmentBody::Text("type_text id \"email\" (12ms)".into())
            );
        }
    }

    mod sink_tests {
        use super::*;

        #[test]
        fn test_directory_sink_writes_timestamped_files() {
            let dir = tempfile::tempdir().unwrap();
            let sink = DirectorySink::new(dir.path().join("screenshots")).unwrap();
            sink.attach(Attachment::png("login page", vec![1, 2, 3])).unwrap();
            sink.attach(Attachment::json("product", serde_json::json!({"id": "1"})))
                .unwrap();

            let mut names: Vec<String> = std::fs::read_dir(sink.dir())
                .unwrap()
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            assert_eq!(names.len(), 2);
            assert!(names[0].starts_with("login_page_"));
            assert!(names[0].ends_with("_000.png"));
            assert!(names[1].starts_with("product_"));
            assert!(names[1].ends_with("_001.json"));
        }

        #[test]
        fn test_attachment_media_types() {
            assert_eq!(Attachment::text("a", "b").extension(), "txt");
            assert_eq!(
                Attachment::json("a", serde_json::Value::Null).media_type(),
                "application/json"
            );
        }
    }
}
