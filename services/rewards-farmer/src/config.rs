//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The CAPTCHA api key is loaded from CAPTCHA_API_KEY env var or
//! api_key_file, never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use rewards_api::RetryPolicy;
use rewards_api::headers::EXTENSION_ORIGIN;
use rewards_pool::{SchedulerConfig, SessionSettings, concurrency_limit};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub files: FilesConfig,
    pub api: ApiConfig,
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Farming behaviour
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub use_proxy: bool,
    pub max_threads: usize,
    pub max_threads_no_proxy: usize,
    /// Minutes between passes
    pub time_sleep_mins: u64,
    /// Delay before replaying a failed request
    pub delay_between_requests_secs: u64,
    /// Random start delay range `[min, max]` in seconds, used when proxying
    pub delay_start_bot: [u64; 2],
    pub auto_task: bool,
    pub skip_tasks: Vec<String>,
    pub enable_debug: bool,
    pub account_timeout_secs: u64,
    /// Extra attempts after the first for non-auth calls
    pub max_retries: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            use_proxy: true,
            max_threads: 10,
            max_threads_no_proxy: 10,
            time_sleep_mins: 1440,
            delay_between_requests_secs: 1,
            delay_start_bot: [1, 15],
            auto_task: true,
            skip_tasks: Vec::new(),
            enable_debug: false,
            account_timeout_secs: 24 * 60 * 60,
            max_retries: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub step_delay_ms: u64,
    pub batch_cooldown_secs: u64,
    pub pass_settle_secs: u64,
    pub rate_limit_cooldown_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 1000,
            batch_cooldown_secs: 3,
            pass_settle_secs: 3,
            rate_limit_cooldown_secs: 60,
            request_timeout_secs: 30,
        }
    }
}

/// Input and state files
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub accounts: PathBuf,
    pub proxies: PathBuf,
    pub tokens: PathBuf,
    pub user_agents: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            accounts: PathBuf::from("accounts.txt"),
            proxies: PathBuf::from("proxy.txt"),
            tokens: PathBuf::from("tokens.json"),
            user_agents: PathBuf::from("session_user_agents.json"),
        }
    }
}

/// Remote API location. Exactly one of `base_url` or `discovery_url` is used;
/// `base_url` wins when both are set.
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub discovery_url: Option<String>,
    #[serde(default = "default_ping_origin")]
    pub ping_origin: String,
}

#[derive(Debug, Deserialize)]
pub struct CaptchaConfig {
    pub solver_url: String,
    pub website_url: String,
    pub website_key: String,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_solve_timeout")]
    pub timeout_secs: u64,
    #[serde(skip)]
    pub api_key: Option<Secret<String>>,
    /// Path to a file containing the api key (alternative to CAPTCHA_API_KEY env var)
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,
}

/// Fingerprint pool override. Empty means the built-in user agents.
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub user_agents: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Optional status listener. Disabled unless `listen_addr` is set.
#[derive(Debug, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen_addr: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_ping_origin() -> String {
    EXTENSION_ORIGIN.to_owned()
}

fn default_task_type() -> String {
    "TurnstileTaskProxyless".to_owned()
}

fn default_poll_interval() -> u64 {
    3
}

fn default_solve_timeout() -> u64 {
    120
}

fn default_max_connections() -> usize {
    64
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn check_url(field: &str, url: &str) -> common::Result<()> {
    if is_http_url(url) {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {url}"
        )))
    }
}

fn check_non_zero(field: &str, value: u64) -> common::Result<()> {
    if value == 0 {
        return Err(common::Error::Config(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Api key resolution order:
    /// 1. CAPTCHA_API_KEY env var
    /// 2. api_key_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(key) = std::env::var("CAPTCHA_API_KEY") {
            config.captcha.api_key = Some(Secret::new(key));
        } else if let Some(ref key_file) = config.captcha.api_key_file {
            let key = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read api_key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            let key = key.trim().to_owned();
            if !key.is_empty() {
                config.captcha.api_key = Some(Secret::new(key));
            }
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        check_non_zero("bot.max_threads", self.bot.max_threads as u64)?;
        check_non_zero(
            "bot.max_threads_no_proxy",
            self.bot.max_threads_no_proxy as u64,
        )?;
        check_non_zero("bot.account_timeout_secs", self.bot.account_timeout_secs)?;
        check_non_zero(
            "timing.request_timeout_secs",
            self.timing.request_timeout_secs,
        )?;
        check_non_zero("captcha.poll_interval_secs", self.captcha.poll_interval_secs)?;
        check_non_zero("admin.max_connections", self.admin.max_connections as u64)?;

        let [min, max] = self.bot.delay_start_bot;
        if min > max {
            return Err(common::Error::Config(format!(
                "bot.delay_start_bot must be [min, max] with min <= max, got: [{min}, {max}]"
            )));
        }

        match (&self.api.base_url, &self.api.discovery_url) {
            (None, None) => {
                return Err(common::Error::Config(
                    "api.base_url or api.discovery_url must be set".into(),
                ));
            }
            (Some(url), _) => check_url("api.base_url", url)?,
            (None, Some(url)) => check_url("api.discovery_url", url)?,
        }
        check_url("captcha.solver_url", &self.captcha.solver_url)?;

        if self.session.user_agents.iter().any(|ua| ua.trim().is_empty()) {
            return Err(common::Error::Config(
                "session.user_agents must not contain empty entries".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("rewards-farmer.toml")
    }

    pub fn concurrency(&self) -> usize {
        concurrency_limit(
            self.bot.use_proxy,
            self.bot.max_threads,
            self.bot.max_threads_no_proxy,
        )
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.concurrency(),
            batch_cooldown: Duration::from_secs(self.timing.batch_cooldown_secs),
            pass_settle: Duration::from_secs(self.timing.pass_settle_secs),
            pass_interval: Duration::from_secs(self.bot.time_sleep_mins * 60),
            account_timeout: Duration::from_secs(self.bot.account_timeout_secs),
            debug_reports: self.bot.enable_debug,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            auto_task: self.bot.auto_task,
            skip_tasks: self.bot.skip_tasks.iter().cloned().collect(),
            ping_origin: self.api.ping_origin.clone(),
            step_delay: Duration::from_millis(self.timing.step_delay_ms),
            max_retries: self.bot.max_retries,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            rate_limit_cooldown: Duration::from_secs(self.timing.rate_limit_cooldown_secs),
            retry_delay: Duration::from_secs(self.bot.delay_between_requests_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[api]
base_url = "https://api.rewards.example"

[captcha]
solver_url = "https://api.solver.example"
website_url = "https://dashboard.rewards.example"
website_key = "0x4AAAAAAA"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn load_str(contents: &str) -> common::Result<Config> {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, contents);
        Config::load(&path)
    }

    #[test]
    fn test_load_valid_config_applies_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CAPTCHA_API_KEY") };

        let config = load_str(valid_toml()).unwrap();
        assert!(config.bot.use_proxy);
        assert_eq!(config.bot.max_threads, 10);
        assert_eq!(config.bot.delay_start_bot, [1, 15]);
        assert_eq!(config.timing.batch_cooldown_secs, 3);
        assert_eq!(config.timing.rate_limit_cooldown_secs, 60);
        assert_eq!(config.files.accounts, PathBuf::from("accounts.txt"));
        assert_eq!(config.api.ping_origin, EXTENSION_ORIGIN);
        assert_eq!(config.captcha.task_type, "TurnstileTaskProxyless");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.admin.listen_addr.is_none());
        assert!(config.captcha.api_key.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let toml = r#"
[bot]
use_proxy = false
max_threads = 4
max_threads_no_proxy = 2
time_sleep_mins = 30
delay_start_bot = [5, 5]
auto_task = false
skip_tasks = ["t1", "t2"]
enable_debug = true

[timing]
step_delay_ms = 0
batch_cooldown_secs = 7

[files]
accounts = "data/accounts.txt"

[api]
discovery_url = "https://config.rewards.example/endpoint"
ping_origin = "chrome-extension://abc"

[captcha]
solver_url = "http://127.0.0.1:9000"
website_url = "https://dashboard.rewards.example"
website_key = "key"
task_type = "AntiTurnstileTaskProxyLess"

[session]
user_agents = ["Mozilla/5.0 (iPhone)"]

[logging]
format = "pretty"

[admin]
listen_addr = "127.0.0.1:9090"
"#;
        let config = load_str(toml).unwrap();
        assert_eq!(config.concurrency(), 2, "no-proxy mode uses max_threads_no_proxy");
        assert_eq!(config.api.discovery_url.as_deref(), Some("https://config.rewards.example/endpoint"));
        assert_eq!(config.files.accounts, PathBuf::from("data/accounts.txt"));
        assert_eq!(config.files.proxies, PathBuf::from("proxy.txt"));
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.admin.listen_addr, Some("127.0.0.1:9090".parse().unwrap()));
        assert_eq!(config.session.user_agents, vec!["Mozilla/5.0 (iPhone)".to_owned()]);

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.batch_cooldown, Duration::from_secs(7));
        assert_eq!(scheduler.pass_interval, Duration::from_secs(30 * 60));
        assert!(scheduler.debug_reports);

        let settings = config.session_settings();
        assert!(!settings.auto_task);
        assert!(settings.skip_tasks.contains("t2"));
        assert_eq!(settings.ping_origin, "chrome-extension://abc");
        assert_eq!(settings.step_delay, Duration::ZERO);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = load_str("not valid {{{{ toml");
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_rejects_zero_threads() {
        let toml = format!("[bot]\nmax_threads = 0\n{}", valid_toml());
        let err = load_str(&toml).unwrap_err();
        assert!(
            err.to_string().contains("bot.max_threads"),
            "error should name the field, got: {err}"
        );
    }

    #[test]
    fn test_rejects_inverted_delay_range() {
        let toml = format!("[bot]\ndelay_start_bot = [10, 2]\n{}", valid_toml());
        let err = load_str(&toml).unwrap_err();
        assert!(err.to_string().contains("delay_start_bot"), "got: {err}");
    }

    #[test]
    fn test_rejects_missing_api_location() {
        let toml = r#"
[api]

[captcha]
solver_url = "https://api.solver.example"
website_url = "https://dashboard.rewards.example"
website_key = "k"
"#;
        let err = load_str(toml).unwrap_err();
        assert!(err.to_string().contains("api.base_url or api.discovery_url"), "got: {err}");
    }

    #[test]
    fn test_rejects_non_http_urls() {
        let toml = valid_toml().replace("https://api.rewards.example", "ftp://api.rewards.example");
        let err = load_str(&toml).unwrap_err();
        assert!(err.to_string().contains("api.base_url"), "got: {err}");

        let toml = valid_toml().replace("https://api.solver.example", "api.solver.example");
        let err = load_str(&toml).unwrap_err();
        assert!(err.to_string().contains("captcha.solver_url"), "got: {err}");
    }

    #[test]
    fn test_api_key_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CAPTCHA_API_KEY", "env-key-123") };
        let config = load_str(valid_toml()).unwrap();
        assert_eq!(
            config.captcha.api_key.as_ref().unwrap().expose(),
            "env-key-123"
        );
        unsafe { remove_env("CAPTCHA_API_KEY") };
    }

    #[test]
    fn test_api_key_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CAPTCHA_API_KEY") };
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("api_key");
        std::fs::write(&key_path, "file-key-456\n").unwrap();

        let toml = format!(
            "{}api_key_file = \"{}\"\n",
            valid_toml(),
            key_path.display()
        );
        let path = write_config(&dir, &toml);
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.captcha.api_key.as_ref().unwrap().expose(),
            "file-key-456"
        );
    }

    #[test]
    fn test_api_key_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("api_key");
        std::fs::write(&key_path, "from-file").unwrap();
        let toml = format!(
            "{}api_key_file = \"{}\"\n",
            valid_toml(),
            key_path.display()
        );
        let path = write_config(&dir, &toml);

        unsafe { set_env("CAPTCHA_API_KEY", "from-env") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("CAPTCHA_API_KEY") };
        assert_eq!(
            config.captcha.api_key.as_ref().unwrap().expose(),
            "from-env",
            "CAPTCHA_API_KEY must take precedence over api_key_file"
        );
    }

    #[test]
    fn test_empty_api_key_file_yields_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CAPTCHA_API_KEY") };
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("api_key");
        std::fs::write(&key_path, "  \n").unwrap();
        let toml = format!(
            "{}api_key_file = \"{}\"\n",
            valid_toml(),
            key_path.display()
        );
        let path = write_config(&dir, &toml);

        let config = Config::load(&path).unwrap();
        assert!(config.captcha.api_key.is_none());
    }

    #[test]
    fn test_missing_api_key_file_is_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CAPTCHA_API_KEY") };
        let toml = format!("{}api_key_file = \"/nonexistent/api_key\"\n", valid_toml());
        let err = load_str(&toml).unwrap_err();
        assert!(err.to_string().contains("api_key_file"), "got: {err}");
    }

    #[test]
    fn test_resolve_path_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/etc/rewards/env.toml") };
        assert_eq!(
            Config::resolve_path(Some("/cli.toml")),
            PathBuf::from("/cli.toml")
        );
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("/etc/rewards/env.toml")
        );
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("rewards-farmer.toml")
        );
    }
}
