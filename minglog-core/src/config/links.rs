//! Link graph configuration types.
//!
//! These are the resolved (non-optional) settings used by `minglog-links`.
//! They are created from the user-facing TOML structs via `From<&Settings>`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::settings::{CheckerToml, Settings, SyncToml};

/// Resolved link graph settings (all values filled with defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkGraphSettings {
    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub checker: CheckerSettings,
}

impl Default for LinkGraphSettings {
    fn default() -> Self {
        Self {
            bidirectional: default_bidirectional(),
            cache_capacity: default_cache_capacity(),
            sync: SyncSettings::default(),
            checker: CheckerSettings::default(),
        }
    }
}

/// Resolved orchestrator knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_true")]
    pub auto_fix: bool,
    #[serde(default = "default_true")]
    pub auto_link_enabled: bool,
    #[serde(default = "default_auto_link_min_strength")]
    pub auto_link_min_strength: f64,
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            auto_fix: true,
            auto_link_enabled: true,
            auto_link_min_strength: default_auto_link_min_strength(),
        }
    }
}

/// Resolved consistency checker knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerSettings {
    /// Minimum normalized title similarity for a `replace` suggestion.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Baseline confidence of a `remove` suggestion.
    #[serde(default = "default_remove_confidence")]
    pub remove_confidence: f64,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            remove_confidence: default_remove_confidence(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bidirectional() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    500
}

fn default_interval_seconds() -> u64 {
    30
}

fn default_auto_link_min_strength() -> f64 {
    0.6
}

fn default_similarity_threshold() -> f64 {
    0.6
}

fn default_remove_confidence() -> f64 {
    0.5
}

fn default_max_suggestions() -> usize {
    3
}

impl From<&Settings> for LinkGraphSettings {
    fn from(value: &Settings) -> Self {
        let mut settings = LinkGraphSettings::default();
        if let Some(bidirectional) = value.links.bidirectional {
            settings.bidirectional = bidirectional;
        }
        if let Some(capacity) = value.links.cache_capacity {
            settings.cache_capacity = capacity;
        }
        apply_sync_overrides(&mut settings.sync, &value.sync);
        apply_checker_overrides(&mut settings.checker, &value.checker);
        settings
    }
}

fn apply_sync_overrides(sync: &mut SyncSettings, overrides: &SyncToml) {
    if let Some(seconds) = overrides.interval_seconds {
        sync.interval_seconds = seconds;
    }
    if let Some(auto_fix) = overrides.auto_fix {
        sync.auto_fix = auto_fix;
    }
    if let Some(enabled) = overrides.auto_link_enabled {
        sync.auto_link_enabled = enabled;
    }
    if let Some(strength) = overrides.auto_link_min_strength {
        sync.auto_link_min_strength = strength.clamp(0.0, 1.0);
    }
}

fn apply_checker_overrides(checker: &mut CheckerSettings, overrides: &CheckerToml) {
    if let Some(threshold) = overrides.similarity_threshold {
        checker.similarity_threshold = threshold.clamp(0.0, 1.0);
    }
    if let Some(confidence) = overrides.remove_confidence {
        checker.remove_confidence = confidence.clamp(0.0, 1.0);
    }
    if let Some(max) = overrides.max_suggestions {
        checker.max_suggestions = max.max(1);
    }
}
