//! Test-run configuration.
//!
//! Values come from three layers, later layers winning:
//!
//! 1. built-in defaults (dev / qa / prod environments, 10s / 30s / 30s timeouts,
//!    an `admin_user` account)
//! 2. a JSON file, `$STOREFRONT_CONFIG` or `./config.json`, ignored when missing
//! 3. environment variables (`BASE_URL`, `API_URL`, `IMPLICIT_WAIT`,
//!    `PAGE_LOAD_TIMEOUT`, `SCRIPT_TIMEOUT`, `HEADLESS`, `<ROLE>_USERNAME`,
//!    `<ROLE>_PASSWORD`)
//!
//! The environment and browser are chosen with `STOREFRONT_ENV` (default
//! `qa`) and `STOREFRONT_BROWSER` (default `chrome`).
//!
//! ```json
//! {
//!   "environments": {
//!     "qa": { "base_url": "http://qa-ecommerce.example.com", "api_url": "http://qa-api.example.com" }
//!   },
//!   "timeouts": { "implicit_wait": 10, "page_load": 30, "script": 30 },
//!   "test_data": {
//!     "admin_user": { "username": "admin@example.com", "password": "admin123" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::result::{StorefrontError, StorefrontResult};
use crate::wait::DEFAULT_POLL_INTERVAL_MS;

/// Variable naming the configuration file
pub const CONFIG_PATH_VAR: &str = "STOREFRONT_CONFIG";
/// Configuration file used when [`CONFIG_PATH_VAR`] is unset
pub const DEFAULT_CONFIG_PATH: &str = "config.json";
/// Variable selecting the environment
pub const ENVIRONMENT_VAR: &str = "STOREFRONT_ENV";
/// Variable selecting the browser
pub const BROWSER_VAR: &str = "STOREFRONT_BROWSER";
/// Variable naming the screenshot directory
pub const SCREENSHOT_DIR_VAR: &str = "STOREFRONT_SCREENSHOT_DIR";

const DEFAULT_ENVIRONMENT: &str = "qa";
const DEFAULT_SCREENSHOT_DIR: &str = "reports/screenshots";

// =============================================================================
// FILE FORMAT
// =============================================================================

/// URLs of one deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentUrls {
    /// Storefront root, without trailing slash
    pub base_url: String,
    /// Backend API root
    pub api_url: String,
}

/// Timeouts in whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Default wait for element lookups
    pub implicit_wait: u64,
    /// Page load timeout
    pub page_load: u64,
    /// Script timeout
    pub script: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            implicit_wait: 10,
            page_load: 30,
            script: 30,
        }
    }
}

/// Account used to sign in
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login e-mail
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Contents of the JSON configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Deployments by name
    pub environments: BTreeMap<String, EnvironmentUrls>,
    /// Timeouts
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Accounts by role
    #[serde(default)]
    pub test_data: BTreeMap<String, Credentials>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let environments = [
            ("dev", "http://dev-ecommerce.example.com", "http://dev-api.example.com"),
            ("qa", "http://qa-ecommerce.example.com", "http://qa-api.example.com"),
            ("prod", "http://ecommerce.example.com", "http://api.example.com"),
        ]
        .into_iter()
        .map(|(name, base_url, api_url)| {
            (
                name.to_string(),
                EnvironmentUrls {
                    base_url: base_url.to_string(),
                    api_url: api_url.to_string(),
                },
            )
        })
        .collect();
        let mut test_data = BTreeMap::new();
        test_data.insert(
            "admin_user".to_string(),
            Credentials::new("admin@example.com", "admin123"),
        );
        Self {
            environments,
            timeouts: Timeouts::default(),
            test_data,
        }
    }
}

impl ConfigFile {
    /// Read `path`, or the built-in defaults if it does not exist
    pub fn read_or_default(path: &Path) -> StorefrontResult<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw).map_err(|err| StorefrontError::Config {
            message: format!("{}: {err}", path.display()),
        })
    }
}

// =============================================================================
// BROWSER KIND
// =============================================================================

/// Browser to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    /// Google Chrome
    #[default]
    Chrome,
    /// Chromium
    Chromium,
    /// Mozilla Firefox
    Firefox,
}

impl BrowserKind {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserKind {
    type Err = StorefrontError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" => Ok(Self::Chrome),
            "chromium" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            other => Err(StorefrontError::UnsupportedConfiguration {
                message: format!("Browser {other} is not supported"),
            }),
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Resolved configuration for one test run
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    browser: BrowserKind,
    environment: String,
    base_url: String,
    api_url: String,
    default_timeout: Duration,
    page_load_timeout: Duration,
    script_timeout: Duration,
    poll_interval: Duration,
    headless: bool,
    screenshot_dir: PathBuf,
    credentials: BTreeMap<String, Credentials>,
}

impl Default for Config {
    /// Built-in defaults for the `qa` environment, no overrides
    fn default() -> Self {
        let file = ConfigFile::default();
        Self {
            browser: BrowserKind::Chrome,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            base_url: "http://qa-ecommerce.example.com".to_string(),
            api_url: "http://qa-api.example.com".to_string(),
            default_timeout: Duration::from_secs(file.timeouts.implicit_wait),
            page_load_timeout: Duration::from_secs(file.timeouts.page_load),
            script_timeout: Duration::from_secs(file.timeouts.script),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            headless: true,
            screenshot_dir: PathBuf::from(DEFAULT_SCREENSHOT_DIR),
            credentials: file.test_data,
        }
    }
}

impl Config {
    /// Load from the process environment
    pub fn load() -> StorefrontResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `env` to look up variables
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> StorefrontResult<Self> {
        let lookup = |key: &str| env(key).filter(|value| !value.is_empty());
        let path = lookup(CONFIG_PATH_VAR)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        let file = ConfigFile::read_or_default(&path)?;
        let environment =
            lookup(ENVIRONMENT_VAR).unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        let browser = lookup(BROWSER_VAR)
            .map(|name| name.parse::<BrowserKind>())
            .transpose()?
            .unwrap_or_default();
        let config = Self::resolve(file, &environment, browser, lookup)?;
        tracing::info!(
            environment = %config.environment,
            browser = %config.browser,
            base_url = %config.base_url,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Select `environment` from `file` and apply overrides from `env`
    pub fn resolve(
        mut file: ConfigFile,
        environment: &str,
        browser: BrowserKind,
        env: impl Fn(&str) -> Option<String>,
    ) -> StorefrontResult<Self> {
        let urls = file.environments.remove(environment).ok_or_else(|| {
            StorefrontError::UnsupportedConfiguration {
                message: format!("Environment {environment} is not configured"),
            }
        })?;
        let seconds = |key: &str, fallback: u64| -> StorefrontResult<Duration> {
            match env(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| StorefrontError::Config {
                        message: format!("{key} must be a whole number of seconds, got '{raw}'"),
                    }),
                None => Ok(Duration::from_secs(fallback)),
            }
        };
        let headless = match env("HEADLESS") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| StorefrontError::Config {
                message: format!("HEADLESS must be true or false, got '{raw}'"),
            })?,
            None => true,
        };
        let credentials = file
            .test_data
            .into_iter()
            .map(|(role, stored)| {
                let prefix = role.to_ascii_uppercase();
                let username = env(&format!("{prefix}_USERNAME")).unwrap_or(stored.username);
                let password = env(&format!("{prefix}_PASSWORD")).unwrap_or(stored.password);
                (role, Credentials { username, password })
            })
            .collect();

        Ok(Self {
            browser,
            environment: environment.to_string(),
            base_url: env("BASE_URL").unwrap_or(urls.base_url),
            api_url: env("API_URL").unwrap_or(urls.api_url),
            default_timeout: seconds("IMPLICIT_WAIT", file.timeouts.implicit_wait)?,
            page_load_timeout: seconds("PAGE_LOAD_TIMEOUT", file.timeouts.page_load)?,
            script_timeout: seconds("SCRIPT_TIMEOUT", file.timeouts.script)?,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            headless,
            screenshot_dir: env(SCREENSHOT_DIR_VAR)
                .map_or_else(|| PathBuf::from(DEFAULT_SCREENSHOT_DIR), PathBuf::from),
            credentials,
        })
    }

    /// Storefront root URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Backend API root URL
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Wait applied when a primitive gets no explicit timeout
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Page load timeout
    #[must_use]
    pub const fn page_load_timeout(&self) -> Duration {
        self.page_load_timeout
    }

    /// Script timeout
    #[must_use]
    pub const fn script_timeout(&self) -> Duration {
        self.script_timeout
    }

    /// Interval between wait polls
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Browser to launch
    #[must_use]
    pub const fn browser(&self) -> BrowserKind {
        self.browser
    }

    /// Environment name
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Run without a visible window
    #[must_use]
    pub const fn headless(&self) -> bool {
        self.headless
    }

    /// Where screenshots are written
    #[must_use]
    pub fn screenshot_dir(&self) -> &Path {
        &self.screenshot_dir
    }

    /// Account for `role` (e.g., "admin_user")
    pub fn credentials(&self, role: &str) -> StorefrontResult<Credentials> {
        self.credentials
            .get(role)
            .cloned()
            .ok_or_else(|| StorefrontError::Config {
                message: format!("No credentials configured for role '{role}'"),
            })
    }

    /// Override the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the default wait
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Override the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the browser
    #[must_use]
    pub const fn with_browser(mut self, browser: BrowserKind) -> Self {
        self.browser = browser;
        self
    }

    /// Override headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Add or replace the account for `role`
    #[must_use]
    pub fn with_credentials(mut self, role: impl Into<String>, credentials: Credentials) -> Self {
        self.credentials.insert(role.into(), credentials);
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
