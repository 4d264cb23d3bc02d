//! Load config from file and environment.

use kenar_core::config::{DEFAULT_CONNECT_DELAY_MS, DEFAULT_MESSAGE_TTL_MS};
use kenar_core::SessionConfig;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

/// Host configuration. File: ~/.config/kenar/config.toml or /etc/kenar/config.toml.
/// Env overrides: KENAR_MESSAGE_TTL_MS, KENAR_CONNECT_DELAY_MS, KENAR_TICK_MS,
/// KENAR_CAPTION_ENDPOINT, KENAR_CAPTION_MODEL. The API key only comes from KENAR_API_KEY.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Message lifetime in ms (default 10000).
    #[serde(default = "default_message_ttl_ms")]
    pub message_ttl_ms: u64,
    /// Simulated pairing delay in ms (default 1500).
    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u64,
    /// How often the session clock ticks, in ms (default 250).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Base URL of the generateContent API.
    #[serde(default = "default_caption_endpoint")]
    pub caption_endpoint: String,
    #[serde(default = "default_caption_model")]
    pub caption_model: String,
    /// Give up on a caption request after this long (default 15000).
    #[serde(default = "default_caption_timeout_ms")]
    pub caption_timeout_ms: u64,
    /// Whether this host offers a peer chooser at all.
    #[serde(default = "default_discovery_enabled")]
    pub discovery_enabled: bool,
    /// Captions offered when suggestion fails.
    #[serde(default)]
    pub fallback_captions: Vec<String>,
    /// Whether this host can share an invite (prints it to the terminal).
    #[serde(default = "default_sharing_enabled")]
    pub sharing_enabled: bool,
    /// Link included in shared invites.
    #[serde(default)]
    pub invite_url: Option<String>,
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_message_ttl_ms() -> u64 {
    DEFAULT_MESSAGE_TTL_MS
}
fn default_connect_delay_ms() -> u64 {
    DEFAULT_CONNECT_DELAY_MS
}
fn default_tick_ms() -> u64 {
    250
}
fn default_caption_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}
fn default_caption_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_caption_timeout_ms() -> u64 {
    15_000
}
fn default_discovery_enabled() -> bool {
    true
}
fn default_sharing_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            message_ttl_ms: default_message_ttl_ms(),
            connect_delay_ms: default_connect_delay_ms(),
            tick_ms: default_tick_ms(),
            caption_endpoint: default_caption_endpoint(),
            caption_model: default_caption_model(),
            caption_timeout_ms: default_caption_timeout_ms(),
            discovery_enabled: default_discovery_enabled(),
            fallback_captions: Vec::new(),
            sharing_enabled: default_sharing_enabled(),
            invite_url: None,
            api_key: None,
        }
    }
}

impl Config {
    /// Core tunables derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        let mut c = SessionConfig {
            message_ttl_ms: self.message_ttl_ms,
            connect_delay_ms: self.connect_delay_ms,
            invite_url: self.invite_url.clone(),
            ..SessionConfig::default()
        };
        if !self.fallback_captions.is_empty() {
            c.fallback_captions = self.fallback_captions.clone();
        }
        c
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        override_u64(&var, "KENAR_MESSAGE_TTL_MS", &mut self.message_ttl_ms);
        override_u64(&var, "KENAR_CONNECT_DELAY_MS", &mut self.connect_delay_ms);
        override_u64(&var, "KENAR_TICK_MS", &mut self.tick_ms);
        if let Some(s) = var("KENAR_CAPTION_ENDPOINT") {
            self.caption_endpoint = s;
        }
        if let Some(s) = var("KENAR_CAPTION_MODEL") {
            self.caption_model = s;
        }
        self.api_key = var("KENAR_API_KEY").filter(|k| !k.trim().is_empty());
        if self.tick_ms == 0 {
            warn!("tick_ms must be positive; using default");
            self.tick_ms = default_tick_ms();
        }
    }
}

fn override_u64(var: &impl Fn(&str) -> Option<String>, name: &str, slot: &mut u64) {
    if let Some(s) = var(name) {
        match s.parse::<u64>() {
            Ok(v) => *slot = v,
            Err(_) => warn!(var = name, value = %s, "Ignoring invalid env override"),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    c.apply_env(|name| std::env::var(name).ok());
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/kenar/config.toml"));
    }
    out.push(PathBuf::from("/etc/kenar/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p) {
                Ok(s) => match parse(&s) {
                    Ok(c) => return Some(c),
                    Err(e) => warn!(path = %p.display(), error = %e, "Invalid config file"),
                },
                Err(e) => warn!(path = %p.display(), error = %e, "Unreadable config file"),
            }
            break;
        }
    }
    None
}

fn parse(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_gives_defaults() {
        let c = parse("").unwrap();
        assert_eq!(c.message_ttl_ms, 10_000);
        assert_eq!(c.connect_delay_ms, 1_500);
        assert_eq!(c.tick_ms, 250);
        assert!(c.discovery_enabled);
        assert_eq!(c.caption_model, "gemini-2.5-flash");
    }

    #[test]
    fn file_values_and_unknown_keys() {
        let c = parse("message_ttl_ms = 3000\nfallback_captions = [\"x\"]\n").unwrap();
        assert_eq!(c.message_ttl_ms, 3_000);
        assert_eq!(c.session_config().fallback_captions, vec!["x".to_string()]);
        let c = parse("sharing_enabled = false\ninvite_url = \"https://example.org/kenar\"\n").unwrap();
        assert!(!c.sharing_enabled);
        assert_eq!(
            c.session_config().invite_url.as_deref(),
            Some("https://example.org/kenar")
        );
        assert!(parse("proxy_port = 1").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("KENAR_CONNECT_DELAY_MS", "10"),
            ("KENAR_TICK_MS", "nope"),
            ("KENAR_API_KEY", "secret"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        c.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.connect_delay_ms, 10);
        assert_eq!(c.tick_ms, 250);
        assert_eq!(c.api_key.as_deref(), Some("secret"));
        assert_eq!(c.session_config().connect_delay_ms, 10);
    }

    #[test]
    fn zero_tick_is_rejected() {
        let mut c = Config::default();
        c.apply_env(|k| (k == "KENAR_TICK_MS").then(|| "0".to_string()));
        assert_eq!(c.tick_ms, 250);
    }
}
