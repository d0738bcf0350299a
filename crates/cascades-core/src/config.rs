//! Run configuration.
//!
//! One `OptimizerConfig` is built per optimization run and handed to the components that
//! need it: the rule registry reads [`RuleConfig`], the cost model reads [`CostWeights`]
//! and the scheduler reads the budgets. Nothing in the core consults global state.
//!
//! Callers that keep settings as session variables can layer them on top of a base
//! configuration with [`OptimizerConfig::apply_session_vars`].

use crate::error::{OptimizerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Tasks the scheduler may execute before stopping with a partial result.
    pub max_tasks: usize,
    /// Wall-clock budget in milliseconds. `None` disables the deadline.
    pub timeout_ms: Option<u64>,
    /// Upper bound on live memo groups.
    pub max_memo_groups: usize,
    /// Upper bound on bindings enumerated for one rule on one expression.
    pub max_bindings_per_rule: usize,
    pub rules: RuleConfig,
    pub cost: CostWeights,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_tasks: 1_000_000,
            timeout_ms: Some(5_000),
            max_memo_groups: 100_000,
            max_bindings_per_rule: 256,
            rules: RuleConfig::default(),
            cost: CostWeights::default(),
        }
    }
}

/// Which rules take part in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// When set, only these rules are eligible.
    pub enabled: Option<BTreeSet<String>>,
    /// Rules removed from the eligible set.
    pub disabled: BTreeSet<String>,
    /// Selects connector-specific rule sets.
    pub source_type: Option<String>,
}

impl RuleConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        if self.disabled.contains(name) {
            return false;
        }
        self.enabled.as_ref().map_or(true, |allowed| allowed.contains(name))
    }

    pub fn disable(mut self, name: impl Into<String>) -> Self {
        self.disabled.insert(name.into());
        self
    }

    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Every rule name the configuration mentions.
    pub fn mentioned(&self) -> impl Iterator<Item = &String> {
        self.disabled.iter().chain(self.enabled.iter().flatten())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub cpu_weight: f64,
    pub memory_weight: f64,
    pub network_weight: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cpu_weight: 1.0,
            memory_weight: 1.0,
            network_weight: 10.0,
        }
    }
}

impl OptimizerConfig {
    pub fn from_json(doc: &str) -> Result<Self> {
        Ok(serde_json::from_str(doc)?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Override fields from string-valued session variables. Unknown keys are ignored.
    pub fn apply_session_vars(mut self, vars: &HashMap<String, String>) -> Result<Self> {
        let mut keys: Vec<&String> = vars.keys().collect();
        keys.sort();
        for key in keys {
            let value = &vars[key];
            match key.as_str() {
                "disable_rules" => self.rules.disabled.extend(split_names(value)),
                "enable_rules" => self.rules.enabled = Some(split_names(value).collect()),
                "source_type" => {
                    self.rules.source_type = Some(value.trim().to_string()).filter(|s| !s.is_empty())
                }
                "optimizer_max_tasks" => self.max_tasks = parse(key, value)?,
                "optimizer_timeout_ms" => {
                    let ms: u64 = parse(key, value)?;
                    self.timeout_ms = (ms > 0).then_some(ms);
                }
                "optimizer_max_memo_groups" => self.max_memo_groups = parse(key, value)?,
                "cpu_weight" => self.cost.cpu_weight = parse_weight(key, value)?,
                "memory_weight" => self.cost.memory_weight = parse_weight(key, value)?,
                "network_weight" => self.cost.network_weight = parse_weight(key, value)?,
                other => debug!(key = other, "ignoring unrelated session variable"),
            }
        }
        Ok(self)
    }
}

fn split_names(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| OptimizerError::InvalidConfig {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Weights must be finite and non-negative or cost stops being monotone.
fn parse_weight(key: &str, value: &str) -> Result<f64> {
    let w: f64 = parse(key, value)?;
    if !w.is_finite() || w < 0.0 {
        return Err(OptimizerError::InvalidConfig {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(w)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = OptimizerConfig::default();
        assert_eq!(config.max_tasks, 1_000_000);
        assert_eq!(config.max_memo_groups, 100_000);
        assert_eq!(config.cost.network_weight, 10.0);
        assert!(config.rules.source_type.is_none());
    }

    #[test]
    fn session_vars_override_fields() {
        let config = OptimizerConfig::default()
            .apply_session_vars(&vars(&[
                ("disable_rules", "JoinAssociativity, PredicatePushdown"),
                ("optimizer_max_tasks", "42"),
                ("optimizer_timeout_ms", "0"),
                ("network_weight", "2.5"),
                ("time_zone", "UTC"),
            ]))
            .expect("valid session vars");
        assert_eq!(config.max_tasks, 42);
        assert_eq!(config.timeout_ms, None);
        assert_eq!(config.cost.network_weight, 2.5);
        assert!(!config.rules.is_enabled("JoinAssociativity"));
        assert!(!config.rules.is_enabled("PredicatePushdown"));
        assert!(config.rules.is_enabled("JoinCommutativity"));
    }

    #[test]
    fn allow_list_restricts_rules() {
        let rules = RuleConfig::default().only(["ImplSeqScan"]);
        assert!(rules.is_enabled("ImplSeqScan"));
        assert!(!rules.is_enabled("ImplHashJoin"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = OptimizerConfig::default()
            .apply_session_vars(&vars(&[("cpu_weight", "-1")]))
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidConfig { ref key, .. } if key == "cpu_weight"));

        let err = OptimizerConfig::default()
            .apply_session_vars(&vars(&[("optimizer_max_tasks", "lots")]))
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidConfig { .. }));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = OptimizerConfig::from_json(r#"{"max_tasks": 10, "rules": {"disabled": ["ImplMergeJoin"]}}"#)
            .expect("valid json");
        assert_eq!(config.max_tasks, 10);
        assert_eq!(config.max_memo_groups, 100_000);
        assert!(!config.rules.is_enabled("ImplMergeJoin"));
    }
}
