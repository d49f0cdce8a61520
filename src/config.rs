use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Placeholder in [`Config::feed_url_template`] replaced by the newsletter name.
pub const USERNAME_PLACEHOLDER: &str = "{username}";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address the HTTP server listens on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Feed-to-JSON proxy endpoint
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    /// Feed URL for a newsletter, with `{username}` in place of its name
    #[serde(default = "default_feed_url_template")]
    pub feed_url_template: String,
    /// Minimum spacing between renders caused by resizes, in milliseconds
    #[serde(default = "default_resize_debounce_ms")]
    pub resize_debounce_ms: u64,
    /// Ignore fetch results that belong to a navigation the user already left
    #[serde(default)]
    pub discard_stale_fetches: bool,
    /// Proxy request timeout in seconds; unset means wait indefinitely
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Rendered pages whose settled view is kept until their live socket connects
    #[serde(default = "default_live_sessions")]
    pub live_sessions: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_proxy_url() -> String {
    "https://api.rss2json.com/v1/api.json".to_string()
}

fn default_feed_url_template() -> String {
    "https://{username}.substack.com/feed".to_string()
}

fn default_resize_debounce_ms() -> u64 {
    500
}

fn default_live_sessions() -> usize {
    256
}

fn default_user_agent() -> String {
    "SubstackClassic/1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            proxy_url: default_proxy_url(),
            feed_url_template: default_feed_url_template(),
            resize_debounce_ms: default_resize_debounce_ms(),
            discard_stale_fetches: false,
            request_timeout_secs: None,
            user_agent: default_user_agent(),
            live_sessions: default_live_sessions(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !self.feed_url_template.contains(USERNAME_PLACEHOLDER) {
            anyhow::bail!(
                "feed_url_template must contain {}: {}",
                USERNAME_PLACEHOLDER,
                self.feed_url_template
            );
        }
        Ok(())
    }

    /// The feed URL for a newsletter.
    pub fn feed_url_for(&self, username: &str) -> String {
        self.feed_url_template.replace(USERNAME_PLACEHOLDER, username)
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
