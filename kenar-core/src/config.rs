//! Session tunables. Host builds one and hands it to `SessionController::new`.

/// Host-supplied wall-clock time in milliseconds. The core never reads a clock itself.
pub type Millis = u64;

/// Default lifetime of every message, measured from its creation.
pub const DEFAULT_MESSAGE_TTL_MS: Millis = 10_000;

/// Default simulated pairing delay between `Connecting` and `Connected`.
pub const DEFAULT_CONNECT_DELAY_MS: Millis = 1_500;

/// Captions offered when the suggester fails or returns nothing.
pub const DEFAULT_FALLBACK_CAPTIONS: [&str; 3] =
    ["Couldn't suggest captions", "Try again", "A great shot"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a message lives after it is created.
    pub message_ttl_ms: Millis,
    /// Delay before a connect request completes.
    pub connect_delay_ms: Millis,
    /// Non-empty list used when caption suggestion fails.
    pub fallback_captions: Vec<String>,
    /// Link put into shared invites.
    pub invite_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            message_ttl_ms: DEFAULT_MESSAGE_TTL_MS,
            connect_delay_ms: DEFAULT_CONNECT_DELAY_MS,
            fallback_captions: DEFAULT_FALLBACK_CAPTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            invite_url: None,
        }
    }
}

impl SessionConfig {
    /// Fallback captions, never empty even if the host configured an empty list.
    pub fn fallback_captions(&self) -> Vec<String> {
        if self.fallback_captions.is_empty() {
            DEFAULT_FALLBACK_CAPTIONS
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.fallback_captions.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_and_connect_delay() {
        let c = SessionConfig::default();
        assert_eq!(c.message_ttl_ms, 10_000);
        assert_eq!(c.connect_delay_ms, 1_500);
        assert_eq!(c.fallback_captions.len(), 3);
    }

    #[test]
    fn empty_fallback_list_is_replaced() {
        let c = SessionConfig {
            fallback_captions: vec![],
            ..SessionConfig::default()
        };
        assert!(!c.fallback_captions().is_empty());
    }
}
