use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// When fetched messages get the `\Seen` flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeenPolicy {
    /// Flag during the fetch itself (`BODY[]`).
    OnFetch,
    /// Fetch with `BODY.PEEK[]` and flag once the reply has been applied.
    #[default]
    AfterApply,
}

impl SeenPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeenPolicy::OnFetch => "on_fetch",
            SeenPolicy::AfterApply => "after_apply",
        }
    }
}

impl fmt::Display for SeenPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeenPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_fetch" => Ok(SeenPolicy::OnFetch),
            "after_apply" => Ok(SeenPolicy::AfterApply),
            other => Err(format!(
                "expected 'on_fetch' or 'after_apply', got '{}'",
                other
            )),
        }
    }
}

/// Tunables of the monitor loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSettings {
    /// Minutes between two scheduled checks.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    /// How many days back the `UNSEEN SINCE` search reaches.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// How many days back the sender/subject fallback looks for originals.
    #[serde(default = "default_match_window_days")]
    pub match_window_days: u32,
    /// Time budget for the mailbox phase of one tick.
    #[serde(default = "default_tick_timeout_secs")]
    pub tick_timeout_secs: u64,
    #[serde(default)]
    pub seen_policy: SeenPolicy,
    #[serde(default = "default_folder")]
    pub folder: String,
}

fn default_interval_minutes() -> u32 {
    5
}

fn default_window_days() -> u32 {
    7
}

fn default_match_window_days() -> u32 {
    30
}

fn default_tick_timeout_secs() -> u64 {
    60
}

fn default_folder() -> String {
    "INBOX".to_string()
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            window_days: default_window_days(),
            match_window_days: default_match_window_days(),
            tick_timeout_secs: default_tick_timeout_secs(),
            seen_policy: SeenPolicy::default(),
            folder: default_folder(),
        }
    }
}
