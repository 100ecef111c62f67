// src/config.rs
//! Learning configuration: defaults, file loading (TOML or JSON), and the
//! partial-update merge used by `FeedbackLearner::update_config`.
//!
//! Out-of-range values in a patch are clamped into range (and logged), never
//! rejected. Non-finite learning rates are ignored.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::adjustment::default_affected_factors;

pub const ENV_CONFIG_PATH: &str = "LEARNING_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/learning.toml";
pub const DEFAULT_JSON_PATH: &str = "config/learning.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningConfig {
    pub enabled: bool,
    #[serde(alias = "explicit_feedback_enabled")]
    pub explicit_feedback_enabled: bool,
    #[serde(alias = "implicit_feedback_enabled")]
    pub implicit_feedback_enabled: bool,
    #[serde(alias = "auto_adjust_enabled")]
    pub auto_adjust_enabled: bool,
    #[serde(alias = "learning_rate")]
    pub learning_rate: f64,
    #[serde(alias = "min_feedbacks_for_adjustment")]
    pub min_feedbacks_for_adjustment: usize,
    #[serde(alias = "persistence_enabled")]
    pub persistence_enabled: bool,
    #[serde(alias = "evaluation_interval_ms")]
    pub evaluation_interval_ms: u64,
    /// Upper bound for a single store call.
    #[serde(alias = "persist_timeout_ms")]
    pub persist_timeout_ms: u64,
    /// Factors moved by every adjustment.
    #[serde(alias = "affected_factors")]
    pub affected_factors: Vec<String>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            explicit_feedback_enabled: true,
            implicit_feedback_enabled: true,
            auto_adjust_enabled: true,
            learning_rate: 0.1,
            min_feedbacks_for_adjustment: 3,
            persistence_enabled: true,
            evaluation_interval_ms: 30_000,
            persist_timeout_ms: 2_000,
            affected_factors: default_affected_factors(),
        }
    }
}

impl LearningConfig {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_millis(self.evaluation_interval_ms.max(1))
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms.max(1))
    }

    /// Merge a partial update, clamping out-of-range values.
    pub fn apply(&mut self, patch: ConfigPatch) -> ConfigChange {
        let before_interval = self.evaluation_interval_ms;

        if let Some(v) = patch.enabled {
            self.enabled = v;
        }
        if let Some(v) = patch.explicit_feedback_enabled {
            self.explicit_feedback_enabled = v;
        }
        if let Some(v) = patch.implicit_feedback_enabled {
            self.implicit_feedback_enabled = v;
        }
        if let Some(v) = patch.auto_adjust_enabled {
            self.auto_adjust_enabled = v;
        }
        if let Some(v) = patch.persistence_enabled {
            self.persistence_enabled = v;
        }
        if let Some(v) = patch.learning_rate {
            if !v.is_finite() {
                warn!(target: "learning", value = v, "ignoring non-finite learningRate");
            } else {
                let c = v.clamp(0.0, 1.0);
                if c != v {
                    warn!(target: "learning", value = v, clamped = c, "learningRate clamped");
                }
                self.learning_rate = c;
            }
        }
        if let Some(v) = patch.min_feedbacks_for_adjustment {
            if v < 1 {
                warn!(target: "learning", value = v, "minFeedbacksForAdjustment clamped to 1");
            }
            self.min_feedbacks_for_adjustment = v.max(1);
        }
        if let Some(v) = patch.evaluation_interval_ms {
            if v == 0 {
                warn!(target: "learning", "evaluationIntervalMs clamped to 1");
            }
            self.evaluation_interval_ms = v.max(1);
        }
        if let Some(v) = patch.persist_timeout_ms {
            self.persist_timeout_ms = v.max(1);
        }
        let factors_changed = if let Some(v) = patch.affected_factors {
            let cleaned = clean_list(v);
            let changed = cleaned != self.affected_factors;
            self.affected_factors = cleaned;
            changed
        } else {
            false
        };

        ConfigChange {
            interval_changed: before_interval != self.evaluation_interval_ms,
            factors_changed,
        }
    }

    /// Same clamping as [`LearningConfig::apply`], for freshly loaded files.
    pub fn sanitized(self) -> Self {
        let mut out = LearningConfig::default();
        out.apply(ConfigPatch::from(self));
        out
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub explicit_feedback_enabled: Option<bool>,
    #[serde(default)]
    pub implicit_feedback_enabled: Option<bool>,
    #[serde(default)]
    pub auto_adjust_enabled: Option<bool>,
    #[serde(default)]
    pub learning_rate: Option<f64>,
    #[serde(default)]
    pub min_feedbacks_for_adjustment: Option<usize>,
    #[serde(default)]
    pub persistence_enabled: Option<bool>,
    #[serde(default)]
    pub evaluation_interval_ms: Option<u64>,
    #[serde(default)]
    pub persist_timeout_ms: Option<u64>,
    #[serde(default)]
    pub affected_factors: Option<Vec<String>>,
}

impl From<LearningConfig> for ConfigPatch {
    fn from(c: LearningConfig) -> Self {
        Self {
            enabled: Some(c.enabled),
            explicit_feedback_enabled: Some(c.explicit_feedback_enabled),
            implicit_feedback_enabled: Some(c.implicit_feedback_enabled),
            auto_adjust_enabled: Some(c.auto_adjust_enabled),
            learning_rate: Some(c.learning_rate),
            min_feedbacks_for_adjustment: Some(c.min_feedbacks_for_adjustment),
            persistence_enabled: Some(c.persistence_enabled),
            evaluation_interval_ms: Some(c.evaluation_interval_ms),
            persist_timeout_ms: Some(c.persist_timeout_ms),
            affected_factors: Some(c.affected_factors),
        }
    }
}

/// What a patch changed that the engine must react to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChange {
    pub interval_changed: bool,
    pub factors_changed: bool,
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_from(path: &Path) -> Result<LearningConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading learning config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str()).map(LearningConfig::sanitized)
}

/// Load config using env var + fallbacks:
/// 1) $LEARNING_CONFIG_PATH
/// 2) config/learning.toml
/// 3) config/learning.json
/// 4) built-in defaults
pub fn load_default() -> Result<LearningConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
    if toml_p.exists() {
        return load_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_JSON_PATH);
    if json_p.exists() {
        return load_from(&json_p);
    }
    Ok(LearningConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<LearningConfig> {
    match hint_ext {
        "toml" => toml::from_str(s).context("parsing TOML learning config"),
        "json" => serde_json::from_str(s).context("parsing JSON learning config"),
        _ => serde_json::from_str(s)
            .or_else(|_| toml::from_str(s))
            .map_err(|_| anyhow!("unsupported learning config format")),
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = LearningConfig::default();
        assert!(c.enabled && c.explicit_feedback_enabled && c.implicit_feedback_enabled);
        assert!(c.auto_adjust_enabled && c.persistence_enabled);
        assert_eq!(c.learning_rate, 0.1);
        assert_eq!(c.min_feedbacks_for_adjustment, 3);
        assert_eq!(c.evaluation_interval_ms, 30_000);
        assert_eq!(c.affected_factors.len(), 3);
    }

    #[test]
    fn patch_clamps_out_of_range_values() {
        let mut c = LearningConfig::default();
        let change = c.apply(ConfigPatch {
            learning_rate: Some(4.2),
            min_feedbacks_for_adjustment: Some(0),
            evaluation_interval_ms: Some(0),
            ..Default::default()
        });
        assert_eq!(c.learning_rate, 1.0);
        assert_eq!(c.min_feedbacks_for_adjustment, 1);
        assert_eq!(c.evaluation_interval_ms, 1);
        assert!(change.interval_changed);

        c.apply(ConfigPatch {
            learning_rate: Some(-0.5),
            ..Default::default()
        });
        assert_eq!(c.learning_rate, 0.0);

        c.apply(ConfigPatch {
            learning_rate: Some(f64::NAN),
            ..Default::default()
        });
        assert_eq!(c.learning_rate, 0.0);
    }

    #[test]
    fn patch_reports_interval_change_only_when_different() {
        let mut c = LearningConfig::default();
        let same = c.apply(ConfigPatch {
            evaluation_interval_ms: Some(30_000),
            auto_adjust_enabled: Some(false),
            ..Default::default()
        });
        assert!(!same.interval_changed);
        assert!(!c.auto_adjust_enabled);
    }

    #[test]
    fn parses_camel_and_snake_case() {
        let json = r#"{"learningRate": 0.25, "minFeedbacksForAdjustment": 5}"#;
        let c = parse_config(json, "json").unwrap();
        assert_eq!(c.learning_rate, 0.25);
        assert_eq!(c.min_feedbacks_for_adjustment, 5);
        assert!(c.enabled);

        let toml = "learning_rate = 0.5\nevaluation_interval_ms = 1000\naffected_factors = [\" risk_weight \", \"\", \"risk_weight\"]\n";
        let c = parse_config(toml, "toml").unwrap().sanitized();
        assert_eq!(c.learning_rate, 0.5);
        assert_eq!(c.evaluation_interval_ms, 1000);
        assert_eq!(c.affected_factors, vec!["risk_weight".to_string()]);
    }

    #[test]
    fn unknown_extension_tries_json_then_toml() {
        assert!(parse_config("learningRate = 0.2", "").is_ok());
        assert!(parse_config("{\"enabled\": false}", "").is_ok());
        assert!(parse_config("<<<", "").is_err());
    }
}
