use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `FUNNEL__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub capi: CapiConfig,
    #[serde(default)]
    pub sales: SalesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            matcher: MatcherConfig::default(),
            retention: RetentionConfig::default(),
            capi: CapiConfig::default(),
            sales: SalesConfig::default(),
        }
    }
}

// ─── Matcher Config ─────────────────────────────────────────────────────────

/// Scoring weights and thresholds for sale-to-visitor attribution.
///
/// Points are additive; the final confidence is capped at 100.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_time_window_minutes")]
    pub time_window_minutes: i64,
    #[serde(default = "default_window_points")]
    pub window_points: u32,
    #[serde(default = "default_country_points")]
    pub country_points: u32,
    #[serde(default = "default_state_points")]
    pub state_points: u32,
    #[serde(default = "default_city_points")]
    pub city_points: u32,
    #[serde(default = "default_very_close_minutes")]
    pub very_close_minutes: i64,
    #[serde(default = "default_very_close_points")]
    pub very_close_points: u32,
    #[serde(default = "default_close_minutes")]
    pub close_minutes: i64,
    #[serde(default = "default_close_points")]
    pub close_points: u32,
    #[serde(default = "default_reasonable_minutes")]
    pub reasonable_minutes: i64,
    #[serde(default = "default_reasonable_points")]
    pub reasonable_points: u32,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: u32,
    #[serde(default = "default_match_log_capacity")]
    pub match_log_capacity: usize,
}

fn default_time_window_minutes() -> i64 {
    60
}
fn default_window_points() -> u32 {
    40
}
fn default_country_points() -> u32 {
    25
}
fn default_state_points() -> u32 {
    20
}
fn default_city_points() -> u32 {
    15
}
fn default_very_close_minutes() -> i64 {
    5
}
fn default_very_close_points() -> u32 {
    15
}
fn default_close_minutes() -> i64 {
    15
}
fn default_close_points() -> u32 {
    10
}
fn default_reasonable_minutes() -> i64 {
    30
}
fn default_reasonable_points() -> u32 {
    5
}
fn default_match_threshold() -> u32 {
    60
}
fn default_match_log_capacity() -> usize {
    10_000
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            time_window_minutes: default_time_window_minutes(),
            window_points: default_window_points(),
            country_points: default_country_points(),
            state_points: default_state_points(),
            city_points: default_city_points(),
            very_close_minutes: default_very_close_minutes(),
            very_close_points: default_very_close_points(),
            close_minutes: default_close_minutes(),
            close_points: default_close_points(),
            reasonable_minutes: default_reasonable_minutes(),
            reasonable_points: default_reasonable_points(),
            match_threshold: default_match_threshold(),
            match_log_capacity: default_match_log_capacity(),
        }
    }
}

// ─── Retention Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_horizon_hours")]
    pub horizon_hours: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_on_ingest")]
    pub sweep_on_ingest: bool,
}

fn default_horizon_hours() -> i64 {
    24
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_sweep_on_ingest() -> bool {
    true
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            horizon_hours: default_horizon_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_on_ingest: default_sweep_on_ingest(),
        }
    }
}

// ─── Conversions API Config ─────────────────────────────────────────────────

/// Placeholder token shipped in sample env files; treated as unconfigured.
pub const PLACEHOLDER_ACCESS_TOKEN: &str = "YOUR_ACCESS_TOKEN_HERE";

#[derive(Debug, Clone, Deserialize)]
pub struct CapiConfig {
    #[serde(default)]
    pub pixel_id: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_capi_api_version")]
    pub api_version: String,
    #[serde(default = "default_capi_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub test_event_code: Option<String>,
    #[serde(default = "default_capi_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_capi_max_logs")]
    pub max_logs: usize,
}

fn default_capi_api_version() -> String {
    "v21.0".to_string()
}
fn default_capi_base_url() -> String {
    "https://graph.facebook.com".to_string()
}
fn default_capi_timeout_ms() -> u64 {
    5000
}
fn default_capi_max_logs() -> usize {
    100
}

impl CapiConfig {
    /// True when a usable (non-empty, non-placeholder) access token is set.
    pub fn token_configured(&self) -> bool {
        !self.access_token.trim().is_empty() && self.access_token != PLACEHOLDER_ACCESS_TOKEN
    }
}

impl Default for CapiConfig {
    fn default() -> Self {
        Self {
            pixel_id: String::new(),
            access_token: String::new(),
            api_version: default_capi_api_version(),
            base_url: default_capi_base_url(),
            test_event_code: None,
            timeout_ms: default_capi_timeout_ms(),
            max_logs: default_capi_max_logs(),
        }
    }
}

// ─── Sales Platform Config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SalesConfig {
    #[serde(default = "default_sales_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub poll_enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_sales_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_sales_api_base_url() -> String {
    "https://developers.hotmart.com/payments/api/v1".to_string()
}
fn default_poll_interval_secs() -> u64 {
    300
}
fn default_lookback_hours() -> i64 {
    4
}
fn default_max_results() -> u32 {
    100
}
fn default_sales_timeout_ms() -> u64 {
    10_000
}

impl Default for SalesConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_sales_api_base_url(),
            access_token: String::new(),
            poll_enabled: false,
            poll_interval_secs: default_poll_interval_secs(),
            lookback_hours: default_lookback_hours(),
            max_results: default_max_results(),
            timeout_ms: default_sales_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("FUNNEL")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
