//! Relay engine tunables

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Timing and presentation settings for the session relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Upper bound on every synchronous read of target output
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,

    /// Upper bound on establishing the outbound SSH session
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// How long the login banner is forwarded before tty resolution
    #[serde(with = "duration_millis")]
    pub banner_window: Duration,

    /// Pause between submitting a command and probing the foreground process
    #[serde(with = "duration_millis")]
    pub probe_settle: Duration,

    /// Prompt written after every local interaction
    pub prompt: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(300),
            connect_timeout: Duration::from_secs(10),
            banner_window: Duration::from_millis(100),
            probe_settle: Duration::from_millis(100),
            prompt: "[Host]>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_table_keeps_defaults() {
        let settings: RelaySettings =
            toml::from_str("read_timeout = 50\nprompt = \"jb>\"").unwrap();
        assert_eq!(settings.read_timeout, Duration::from_millis(50));
        assert_eq!(settings.prompt, "jb>");
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.probe_settle, Duration::from_millis(100));
    }
}
