use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::error::PipelineError;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Discard everything (windows are still shown on the dashboard)
    #[serde(rename = "none")]
    None,

    /// Bounded in-memory history, lost on restart
    Memory,

    /// SQLite database file
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days (outcomes and windows older than this are deleted)
        retention_days: Option<u32>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./monitor.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub websites: Vec<WebsiteConfig>,

    #[serde(default)]
    pub alerting: AlertConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Storage configuration (optional - defaults to in-memory)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// HTTP API (disabled when absent)
    pub api: Option<ApiConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebsiteConfig {
    pub url: String,
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub method: HttpMethod,

    /// Overrides `alerting.failure_threshold` for this website
    pub failure_threshold: Option<usize>,

    /// Overrides `alerting.min_alert_interval_secs` for this website
    pub min_alert_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    /// Emit a warning once this many consecutive failures are seen (must be
    /// below `failure_threshold`)
    pub warning_threshold: Option<usize>,

    /// Minimum time between two delivered critical notifications for a target
    #[serde(default)]
    pub min_alert_interval_secs: u64,

    /// Delivery transport (alerts are only logged when absent)
    pub notify: Option<Alert>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            warning_threshold: None,
            min_alert_interval_secs: 0,
            notify: None,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_stale_after_intervals")]
    pub stale_after_intervals: u32,

    /// Interval of the log renderer, 0 disables it
    ///
    /// Only used when no `views` are configured.
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,

    /// Rendered views, each rolling up its own timeframe
    #[serde(default)]
    pub views: Vec<ViewConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ViewConfig {
    pub timeframe_secs: u64,
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            stale_after_intervals: default_stale_after_intervals(),
            refresh_secs: default_refresh_secs(),
            views: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

fn default_check_interval_ms() -> u64 {
    5_000
}

fn default_timeout_ms() -> u64 {
    3_000
}

fn default_failure_threshold() -> usize {
    3
}

fn default_window_secs() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_stale_after_intervals() -> u32 {
    3
}

fn default_refresh_secs() -> u64 {
    10
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_enable_cors() -> bool {
    true
}

/// Alert thresholds resolved for a single target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub failure_threshold: usize,
    pub warning_threshold: Option<usize>,
    pub min_alert_interval: Option<Duration>,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            warning_threshold: None,
            min_alert_interval: None,
        }
    }
}

/// A monitored URL, immutable once resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    pub check_interval: Duration,
    pub timeout: Duration,
    pub method: HttpMethod,
    pub policy: AlertPolicy,
}

impl Target {
    pub fn new(url: impl Into<String>, check_interval: Duration) -> Self {
        Self {
            url: url.into(),
            check_interval,
            timeout: Duration::from_millis(default_timeout_ms()),
            method: HttpMethod::Get,
            policy: AlertPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: AlertPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Runtime settings of the pipeline components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub window: Duration,
    pub retry: RetryPolicy,
    pub stale_after_intervals: u32,
    pub retention: Option<Duration>,
    pub bus_capacity: usize,

    /// How far back the dashboard keeps completed windows
    pub history: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(default_window_secs()),
            retry: RetryPolicy::default(),
            stale_after_intervals: default_stale_after_intervals(),
            retention: None,
            bus_capacity: 1024,
            history: Duration::from_secs(default_window_secs()),
        }
    }
}

/// A dashboard view rendered every `refresh` over the last `timeframe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardView {
    pub timeframe: Duration,
    pub refresh: Duration,
}

/// Bounded retry for persistence writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            backoff: Duration::from_millis(default_retry_backoff_ms()),
        }
    }
}

impl Config {
    /// Validate the configuration and resolve it into runtime targets
    pub fn resolve_targets(&self) -> Result<Vec<Target>, PipelineError> {
        if self.websites.is_empty() {
            return Err(PipelineError::Config("no websites configured".to_string()));
        }

        if self.alerting.failure_threshold == 0 {
            return Err(PipelineError::Config(
                "alerting.failure_threshold must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(self.websites.len());

        for website in &self.websites {
            let url = reqwest::Url::parse(&website.url).map_err(|e| {
                PipelineError::Config(format!("invalid url '{}': {e}", website.url))
            })?;

            if !matches!(url.scheme(), "http" | "https") {
                return Err(PipelineError::Config(format!(
                    "unsupported scheme for '{}'",
                    website.url
                )));
            }

            if !seen.insert(website.url.clone()) {
                return Err(PipelineError::Config(format!(
                    "duplicate website '{}'",
                    website.url
                )));
            }

            if website.check_interval_ms == 0 || website.timeout_ms == 0 {
                return Err(PipelineError::Config(format!(
                    "check interval and timeout of '{}' must be positive",
                    website.url
                )));
            }

            let failure_threshold = website
                .failure_threshold
                .unwrap_or(self.alerting.failure_threshold);
            if failure_threshold == 0 {
                return Err(PipelineError::Config(format!(
                    "failure threshold of '{}' must be at least 1",
                    website.url
                )));
            }

            let warning_threshold = self.alerting.warning_threshold;
            if let Some(warning) = warning_threshold {
                if warning == 0 || warning >= failure_threshold {
                    return Err(PipelineError::Config(format!(
                        "alerting.warning_threshold ({warning}) must be between 1 and the failure threshold of '{}' ({failure_threshold})",
                        website.url
                    )));
                }
            }

            let min_alert_interval = website
                .min_alert_interval_secs
                .unwrap_or(self.alerting.min_alert_interval_secs);

            targets.push(Target {
                url: website.url.clone(),
                check_interval: Duration::from_millis(website.check_interval_ms),
                timeout: Duration::from_millis(website.timeout_ms),
                method: website.method,
                policy: AlertPolicy {
                    failure_threshold,
                    warning_threshold,
                    min_alert_interval: (min_alert_interval > 0)
                        .then(|| Duration::from_secs(min_alert_interval)),
                },
            });
        }

        Ok(targets)
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings, PipelineError> {
        if self.aggregation.window_secs == 0 {
            return Err(PipelineError::Config(
                "aggregation.window_secs must be positive".to_string(),
            ));
        }

        let window = Duration::from_secs(self.aggregation.window_secs);
        let history = self
            .dashboard_views()?
            .iter()
            .map(|view| view.timeframe)
            .max()
            .unwrap_or(window)
            .max(window);

        let retention = match &self.storage {
            Some(StorageConfig::Sqlite {
                retention_days: Some(days),
                ..
            }) => Some(Duration::from_secs(u64::from(*days) * 24 * 60 * 60)),
            _ => None,
        };

        Ok(PipelineSettings {
            window,
            retry: RetryPolicy {
                max_attempts: self.aggregation.retry_attempts.max(1),
                backoff: Duration::from_millis(self.aggregation.retry_backoff_ms),
            },
            stale_after_intervals: self.dashboard.stale_after_intervals.max(1),
            retention,
            history,
            ..PipelineSettings::default()
        })
    }

    /// Resolve the rendered dashboard views
    ///
    /// Without explicit views, a single view over one aggregation window is
    /// rendered every `refresh_secs` (none when that is 0).
    pub fn dashboard_views(&self) -> Result<Vec<DashboardView>, PipelineError> {
        if self.dashboard.views.is_empty() {
            if self.dashboard.refresh_secs == 0 {
                return Ok(Vec::new());
            }
            return Ok(vec![DashboardView {
                timeframe: Duration::from_secs(self.aggregation.window_secs),
                refresh: Duration::from_secs(self.dashboard.refresh_secs),
            }]);
        }

        self.dashboard
            .views
            .iter()
            .map(|view| {
                if view.timeframe_secs == 0 || view.refresh_secs == 0 {
                    return Err(PipelineError::Config(
                        "dashboard views need a positive timeframe_secs and refresh_secs".to_string(),
                    ));
                }
                Ok(DashboardView {
                    timeframe: Duration::from_secs(view.timeframe_secs),
                    refresh: Duration::from_secs(view.refresh_secs),
                })
            })
            .collect()
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content).inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
}
