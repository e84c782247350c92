// src/config.rs
use log::warn;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PERSONA_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub(crate) const API_KEY_FALLBACK_VAR: &str = "API_KEY";

/// Runtime settings. Flags beat environment variables, which beat the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub persona_model: String,
    pub video_model: String,
    pub aspect_ratio: String,
    pub poll_interval: Duration,
    /// Cap on total polling time; `None` polls until the job ends.
    pub max_wait: Option<Duration>,
    pub request_timeout: Duration,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            persona_model: DEFAULT_PERSONA_MODEL.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: Some(DEFAULT_MAX_WAIT),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable numbers are
    /// reported and replaced by the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        config.api_key = var(API_KEY_VAR).or_else(|| var(API_KEY_FALLBACK_VAR));
        if let Some(url) = var("GEMINI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = var("ANIMASNAP_PERSONA_MODEL") {
            config.persona_model = model;
        }
        if let Some(model) = var("ANIMASNAP_VIDEO_MODEL") {
            config.video_model = model;
        }
        let poll_secs = var("ANIMASNAP_POLL_SECS")
            .and_then(|v| parse_secs("ANIMASNAP_POLL_SECS", &v))
            .and_then(|secs| poll_interval_from_secs("ANIMASNAP_POLL_SECS", secs));
        if let Some(interval) = poll_secs {
            config.poll_interval = interval;
        }
        if let Some(secs) = var("ANIMASNAP_MAX_WAIT_SECS")
            .and_then(|v| parse_secs("ANIMASNAP_MAX_WAIT_SECS", &v))
        {
            config.max_wait = max_wait_from_secs(secs);
        }

        config
    }

    pub fn with_base_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_persona_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model {
            self.persona_model = model;
        }
        self
    }

    pub fn with_video_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model {
            self.video_model = model;
        }
        self
    }

    /// Zero is rejected with a warning and leaves the interval as it was.
    pub fn with_poll_secs(mut self, secs: Option<u64>) -> Self {
        if let Some(interval) = secs.and_then(|s| poll_interval_from_secs("--poll-secs", s)) {
            self.poll_interval = interval;
        }
        self
    }

    /// `Some(0)` removes the cap.
    pub fn with_max_wait_secs(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.max_wait = max_wait_from_secs(secs);
        }
        self
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.output_dir = dir;
        }
        self
    }

    pub fn require_api_key(&self) -> anyhow::Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "No API key selected. Set {} or run `animasnap check-key`.",
                API_KEY_VAR
            )
        })
    }
}

fn parse_secs(name: &str, value: &str) -> Option<u64> {
    match value.parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(_) => {
            warn!("Ignoring {}={:?}: expected a whole number of seconds", name, value);
            None
        }
    }
}

fn poll_interval_from_secs(name: &str, secs: u64) -> Option<Duration> {
    if secs == 0 {
        warn!("Ignoring {}=0: polling needs at least one second between checks", name);
        return None;
    }
    Some(Duration::from_secs(secs))
}

fn max_wait_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.max_wait, Some(DEFAULT_MAX_WAIT));
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("API_KEY", "fallback"),
            ("GEMINI_BASE_URL", "http://localhost:8080/v1beta/"),
            ("ANIMASNAP_VIDEO_MODEL", "veo-2.0-generate-001"),
            ("ANIMASNAP_POLL_SECS", "2"),
            ("ANIMASNAP_MAX_WAIT_SECS", "0"),
        ]));

        assert_eq!(config.require_api_key().unwrap(), "fallback");
        assert_eq!(config.base_url, "http://localhost:8080/v1beta");
        assert_eq!(config.video_model, "veo-2.0-generate-001");
        assert_eq!(config.persona_model, DEFAULT_PERSONA_MODEL);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_wait, None);
    }

    #[test]
    fn test_primary_key_wins_and_blank_values_are_ignored() {
        let config = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "primary"),
            ("API_KEY", "fallback"),
            ("ANIMASNAP_PERSONA_MODEL", "   "),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("primary"));
        assert_eq!(config.persona_model, DEFAULT_PERSONA_MODEL);
    }

    #[test]
    fn test_bad_numbers_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("ANIMASNAP_POLL_SECS", "soon"),
            ("ANIMASNAP_MAX_WAIT_SECS", "-5"),
        ]));
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.max_wait, Some(DEFAULT_MAX_WAIT));
    }

    #[test]
    fn test_flags_override_environment() {
        let config = Config::from_lookup(lookup(&[("ANIMASNAP_POLL_SECS", "30")]))
            .with_poll_secs(Some(5))
            .with_max_wait_secs(Some(90))
            .with_video_model(None)
            .with_output_dir(Some(PathBuf::from("clips")));

        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_wait, Some(Duration::from_secs(90)));
        assert_eq!(config.video_model, DEFAULT_VIDEO_MODEL);
        assert_eq!(config.output_dir, PathBuf::from("clips"));
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let config = Config::from_lookup(lookup(&[("ANIMASNAP_POLL_SECS", "0")]));
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);

        let config = config.with_poll_secs(Some(0));
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_huge_poll_interval_is_kept() {
        let config = Config::default().with_poll_secs(Some(u64::MAX));
        assert_eq!(config.poll_interval, Duration::from_secs(u64::MAX));
    }
}
