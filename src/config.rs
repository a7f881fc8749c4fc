//! Configuration document consumed by the sentinel binary and library.
//!
//! The document is a YAML file holding the GitHub credentials, the check
//! frequency, notification settings and the list of subscriptions. Every
//! section is optional and falls back to documented defaults, so a freshly
//! created file only needs a token and subscriptions to become useful.
//! Components receive the parsed [`SentinelConfig`] explicitly; nothing reads
//! ambient global state.

use std::{fs, path::Path, time::Duration};

use chrono::{TimeDelta, Weekday};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{self, Error},
    subscription::Subscription,
};

/// Environment variable that overrides `github_token`.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
/// Public GitHub REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
/// Public GitHub web root used for repository links.
pub const DEFAULT_WEB_BASE_URL: &str = "https://github.com";
/// Largest page size accepted by the GitHub list endpoints.
pub const MAX_PAGE_SIZE: u8 = 100;
/// Upper bound on concurrently fetched repositories.
pub const MAX_CONCURRENCY: usize = 64;
const TOKEN_PLACEHOLDER: &str = "YOUR_GITHUB_PERSONAL_ACCESS_TOKEN";
const DEFAULT_CHANNEL: &str = "console";

/// Root configuration document.
///
/// # Examples
///
/// ```
/// use repo_sentinel::{CheckFrequency, parse_config};
///
/// let yaml = r#"
/// github_token: ghp_example
/// check_frequency: weekly
/// subscriptions:
///   - owner: octocat
///     repo: hello-world
///     watch_events: [commits, releases]
/// "#;
/// let config = parse_config(yaml,).expect("valid configuration",);
/// assert_eq!(config.check_frequency, CheckFrequency::Weekly);
/// assert_eq!(config.subscriptions.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize,)]
pub struct SentinelConfig
{
    /// Personal access token used for every API request.
    #[serde(default)]
    pub github_token: String,

    /// REST API root, overridable for GitHub Enterprise installations.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Web root used to build repository links in reports.
    #[serde(default = "default_web_base_url")]
    pub web_base_url: String,

    /// How often reports are produced and how far back each fetch looks.
    #[serde(default)]
    pub check_frequency: CheckFrequency,

    /// Time of day (and weekday for weekly checks) of recurring runs.
    #[serde(default)]
    pub schedule: ScheduleSettings,

    /// Limits applied to remote API requests.
    #[serde(default)]
    pub fetch: FetchSettings,

    /// Delivery channel settings.
    #[serde(default)]
    pub notification: NotificationSettings,

    /// Watched repositories.
    #[serde(default)]
    pub subscriptions: Vec<Subscription,>,
}

impl Default for SentinelConfig
{
    fn default() -> Self
    {
        Self {
            github_token:    String::new(),
            api_base_url:    default_api_base_url(),
            web_base_url:    default_web_base_url(),
            check_frequency: CheckFrequency::default(),
            schedule:        ScheduleSettings::default(),
            fetch:           FetchSettings::default(),
            notification:    NotificationSettings::default(),
            subscriptions:   Vec::new(),
        }
    }
}

impl SentinelConfig
{
    /// Resolves the token to authenticate with.
    ///
    /// A non-blank `override_token` (typically read from [`GITHUB_TOKEN_ENV`])
    /// wins over the configured value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when neither source provides a usable
    /// token or the configured value is still the placeholder.
    pub fn resolve_token(&self, override_token: Option<&str,>,) -> Result<String, Error,>
    {
        if let Some(token,) = override_token.map(str::trim,).filter(|value| !value.is_empty(),) {
            return Ok(token.to_owned(),);
        }

        let configured = self.github_token.trim();
        if configured.is_empty() {
            return Err(Error::validation(format!(
                "github_token is not set; add it to the configuration or export {GITHUB_TOKEN_ENV}"
            ),),);
        }
        if configured == TOKEN_PLACEHOLDER {
            return Err(Error::validation("github_token still holds the placeholder value",),);
        }
        Ok(configured.to_owned(),)
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] describing the first violated invariant.
    pub fn validate(&self,) -> Result<(), Error,>
    {
        validate_url(&self.api_base_url, "api_base_url",)?;
        validate_url(&self.web_base_url, "web_base_url",)?;

        if self.schedule.hour > 23 {
            return Err(Error::validation("schedule.hour must be between 0 and 23",),);
        }
        if self.schedule.minute > 59 {
            return Err(Error::validation("schedule.minute must be between 0 and 59",),);
        }
        if self.fetch.page_size == 0 || self.fetch.page_size > MAX_PAGE_SIZE {
            return Err(Error::validation(format!(
                "fetch.page_size must be between 1 and {MAX_PAGE_SIZE}"
            ),),);
        }
        if self.fetch.timeout_secs == 0 {
            return Err(Error::validation("fetch.timeout_secs must be positive",),);
        }
        if self.fetch.max_concurrency == 0 || self.fetch.max_concurrency > MAX_CONCURRENCY {
            return Err(Error::validation(format!(
                "fetch.max_concurrency must be between 1 and {MAX_CONCURRENCY}"
            ),),);
        }
        if self.notification.timeout_secs == 0 {
            return Err(Error::validation("notification.timeout_secs must be positive",),);
        }

        for subscription in &self.subscriptions {
            subscription.validate()?;
        }

        Ok((),)
    }
}

/// Check frequency, which doubles as the length of the fetch window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize,)]
#[serde(rename_all = "snake_case")]
pub enum CheckFrequency
{
    /// One report per day covering the last 24 hours.
    #[default]
    Daily,
    /// One report per week covering the last 7 days.
    Weekly,
}

impl CheckFrequency
{
    /// Length of the check window.
    pub fn period(self,) -> TimeDelta
    {
        match self {
            Self::Daily => TimeDelta::days(1,),
            Self::Weekly => TimeDelta::weeks(1,),
        }
    }

    /// Name used in configuration files and webhook payloads.
    pub const fn as_str(self,) -> &'static str
    {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    /// Monitoring period as shown in report headers.
    pub const fn period_label(self,) -> &'static str
    {
        match self {
            Self::Daily => "last 24 hours",
            Self::Weekly => "last 7 days",
        }
    }
}

/// Wall-clock placement of recurring runs, interpreted in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize,)]
pub struct ScheduleSettings
{
    #[serde(default = "default_schedule_hour")]
    pub hour:    u32,
    #[serde(default)]
    pub minute:  u32,
    /// Weekday of weekly runs; ignored for daily checks.
    #[serde(default = "default_schedule_weekday")]
    pub weekday: Weekday,
}

impl Default for ScheduleSettings
{
    fn default() -> Self
    {
        Self {
            hour: default_schedule_hour(), minute: 0, weekday: default_schedule_weekday(),
        }
    }
}

/// Limits applied to remote API requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize,)]
pub struct FetchSettings
{
    /// Items requested per event kind; a single page is fetched.
    #[serde(default = "default_page_size")]
    pub page_size:       u8,
    /// Timeout applied to every individual request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs:    u64,
    /// Repositories fetched concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl FetchSettings
{
    /// Per-request timeout as a [`Duration`].
    pub fn timeout(&self,) -> Duration
    {
        Duration::from_secs(self.timeout_secs,)
    }
}

impl Default for FetchSettings
{
    fn default() -> Self
    {
        Self {
            page_size:       default_page_size(),
            timeout_secs:    default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Notification channel selection and per-channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize,)]
pub struct NotificationSettings
{
    /// Primary channel: `console`, `email` or `webhook`. Other values fall
    /// back to the console at dispatch time.
    #[serde(rename = "type", default = "default_channel")]
    pub channel:      String,
    /// Timeout applied to SMTP sessions and webhook requests.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub email:        EmailSettings,
    #[serde(default)]
    pub webhook:      WebhookSettings,
}

impl NotificationSettings
{
    /// Channel timeout as a [`Duration`].
    pub fn timeout(&self,) -> Duration
    {
        Duration::from_secs(self.timeout_secs,)
    }
}

impl Default for NotificationSettings
{
    fn default() -> Self
    {
        Self {
            channel:      default_channel(),
            timeout_secs: default_timeout_secs(),
            email:        EmailSettings::default(),
            webhook:      WebhookSettings::default(),
        }
    }
}

/// SMTP settings. Every field is required for email delivery; missing ones
/// are reported when a send is attempted rather than at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize,)]
pub struct EmailSettings
{
    #[serde(default)]
    pub sender:        Option<String,>,
    #[serde(default)]
    pub recipient:     Option<String,>,
    #[serde(default)]
    pub smtp_server:   Option<String,>,
    #[serde(default)]
    pub smtp_port:     Option<u16,>,
    #[serde(default)]
    pub smtp_user:     Option<String,>,
    #[serde(default)]
    pub smtp_password: Option<String,>,
}

/// Outbound webhook settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize,)]
pub struct WebhookSettings
{
    #[serde(default)]
    pub url: Option<String,>,
}

/// Loads the configuration from `path`, creating a default document first
/// when the file does not exist.
///
/// # Errors
///
/// Returns [`Error::Io`] when the file cannot be read or created,
/// [`Error::Parse`] when the YAML cannot be decoded and
/// [`Error::Validation`] when invariants are violated.
pub fn load_config(path: &Path,) -> Result<SentinelConfig, Error,>
{
    if !path.exists() {
        save_config(path, &SentinelConfig::default(),)?;
        info!(
            "Created default configuration at {}; set github_token and subscriptions before \
             starting",
            path.display()
        );
    }

    let contents = fs::read_to_string(path,).map_err(|source| error::io_error(path, source,),)?;
    parse_config(&contents,)
}

/// Parses and validates a configuration document.
///
/// # Errors
///
/// Propagates [`Error::Parse`] and [`Error::Validation`].
pub fn parse_config(contents: &str,) -> Result<SentinelConfig, Error,>
{
    let config: SentinelConfig = serde_yaml::from_str(contents,)?;
    config.validate()?;
    Ok(config,)
}

/// Validates and writes the configuration to `path`, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns [`Error::Validation`] for invalid documents and [`Error::Io`] when
/// writing fails.
pub fn save_config(path: &Path, config: &SentinelConfig,) -> Result<(), Error,>
{
    config.validate()?;
    let yaml = serde_yaml::to_string(config,)?;

    if let Some(parent,) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent,).map_err(|source| error::io_error(path, source,),)?;
    }

    fs::write(path, yaml,).map_err(|source| error::io_error(path, source,),)
}

fn validate_url(value: &str, field: &str,) -> Result<(), Error,>
{
    let trimmed = value.trim();
    if !(trimmed.starts_with("https://",) || trimmed.starts_with("http://",)) {
        return Err(Error::validation(format!("{field} must be an http(s) URL"),),);
    }
    Ok((),)
}

fn default_api_base_url() -> String
{
    DEFAULT_API_BASE_URL.to_owned()
}

fn default_web_base_url() -> String
{
    DEFAULT_WEB_BASE_URL.to_owned()
}

fn default_channel() -> String
{
    DEFAULT_CHANNEL.to_owned()
}

const fn default_schedule_hour() -> u32
{
    9
}

const fn default_schedule_weekday() -> Weekday
{
    Weekday::Mon
}

const fn default_page_size() -> u8
{
    MAX_PAGE_SIZE
}

const fn default_timeout_secs() -> u64
{
    30
}

const fn default_max_concurrency() -> usize
{
    4
}
