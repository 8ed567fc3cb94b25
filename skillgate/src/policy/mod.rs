// SPDX-License-Identifier: Apache-2.0

//! The policy model: what is tolerated, what is suppressed, and where the
//! decision thresholds sit.

pub mod engine;
pub mod load;

use crate::analysis::finding::Severity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default decision thresholds.
pub const DEFAULT_BLOCK_THRESHOLD: u32 = 40;
pub const DEFAULT_WARN_THRESHOLD: u32 = 70;

/// Score thresholds separating allow, quarantine, and block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
	/// Scores at or below this block.
	pub block: u32,
	/// Scores at or below this (but above `block`) quarantine.
	pub warn: u32,
}

impl Default for Thresholds {
	fn default() -> Thresholds {
		Thresholds {
			block: DEFAULT_BLOCK_THRESHOLD,
			warn: DEFAULT_WARN_THRESHOLD,
		}
	}
}

/// Scoring directives for one rule id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
	pub severity: Severity,
	/// Score delta applied once per triggered rule, typically negative.
	pub weight: i64,
	pub message: String,
	/// Disabled rules drop their findings entirely.
	#[serde(default = "default_true")]
	pub enabled: bool,
}

fn default_true() -> bool {
	true
}

/// Suppression directive: the named rules are ignored for files matching
/// the glob pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Exception {
	/// Glob over root-relative paths; `*` stays within a path segment,
	/// `**` crosses segments.
	pub pattern: String,
	/// Rule ids suppressed under the pattern.
	pub ignore: BTreeSet<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

/// A fully resolved policy (inheritance already merged).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
	pub version: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default)]
	pub thresholds: Thresholds,
	/// Rule ids that force a block when triggered, regardless of score.
	#[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
	pub critical_block: BTreeSet<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub rules: BTreeMap<String, RuleDefinition>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub exceptions: Vec<Exception>,
}

impl Policy {
	/// The built-in policy used when the caller provides none: default
	/// thresholds, no custom rules, nothing suppressed.
	pub fn builtin_default() -> Policy {
		Policy {
			version: "1.0".to_string(),
			name: "default".to_string(),
			description: Some("built-in default policy".to_string()),
			thresholds: Thresholds::default(),
			critical_block: BTreeSet::new(),
			rules: BTreeMap::new(),
			exceptions: Vec::new(),
		}
	}

	/// Check the model invariants that types alone cannot enforce.
	///
	/// Returns one `path.to.field: reason` entry per violation.
	pub fn validate(&self) -> Vec<String> {
		let mut problems = Vec::new();

		if self.name.is_empty() || self.name.len() > 50 {
			problems.push(format!(
				"name: must be 1-50 characters, got {}",
				self.name.len()
			));
		}

		if !version_shape_ok(&self.version) {
			problems.push(format!(
				"version: must look like MAJOR.MINOR or MAJOR.MINOR.PATCH, got '{}'",
				self.version
			));
		}

		if self.thresholds.block > self.thresholds.warn {
			problems.push(format!(
				"thresholds.block: must not exceed thresholds.warn ({} > {})",
				self.thresholds.block, self.thresholds.warn
			));
		}

		if self.thresholds.warn > 100 {
			problems.push(format!(
				"thresholds.warn: must not exceed 100, got {}",
				self.thresholds.warn
			));
		}

		for (rule_id, rule) in &self.rules {
			if rule.message.is_empty() {
				problems.push(format!("rules.{}.message: must not be empty", rule_id));
			}
		}

		for (index, exception) in self.exceptions.iter().enumerate() {
			if exception.pattern.is_empty() {
				problems.push(format!("exceptions[{}].pattern: must not be empty", index));
			}
			if exception.ignore.is_empty() {
				problems.push(format!(
					"exceptions[{}].ignore: must name at least one rule id",
					index
				));
			}
			if glob::Pattern::new(&exception.pattern).is_err() {
				problems.push(format!(
					"exceptions[{}].pattern: invalid glob '{}'",
					index, exception.pattern
				));
			}
		}

		problems
	}
}

/// `MAJOR.MINOR` with an optional `.PATCH`.
fn version_shape_ok(version: &str) -> bool {
	let mut parts = version.split('.');
	let count = version.split('.').count();

	(2..=3).contains(&count) && parts.all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builtin_default_is_valid() {
		assert!(Policy::builtin_default().validate().is_empty());
	}

	#[test]
	fn version_shapes() {
		assert!(version_shape_ok("1.0"));
		assert!(version_shape_ok("1.2.3"));
		assert!(!version_shape_ok("1"));
		assert!(!version_shape_ok("1.2.3.4"));
		assert!(!version_shape_ok("1.x"));
		assert!(!version_shape_ok(""));
	}

	#[test]
	fn validation_catches_threshold_inversion() {
		let mut policy = Policy::builtin_default();
		policy.thresholds = Thresholds { block: 80, warn: 20 };

		let problems = policy.validate();
		assert!(problems.iter().any(|p| p.starts_with("thresholds.block")));
	}

	#[test]
	fn validation_catches_empty_exception() {
		let mut policy = Policy::builtin_default();
		policy.exceptions.push(Exception {
			pattern: String::new(),
			ignore: BTreeSet::new(),
			reason: None,
		});

		let problems = policy.validate();
		assert!(problems.iter().any(|p| p.contains("exceptions[0].pattern")));
		assert!(problems.iter().any(|p| p.contains("exceptions[0].ignore")));
	}

	#[test]
	fn validation_catches_long_name() {
		let mut policy = Policy::builtin_default();
		policy.name = "x".repeat(51);

		assert!(!policy.validate().is_empty());
	}

	#[test]
	fn policy_round_trips_through_yaml() {
		let mut policy = Policy::builtin_default();
		policy.critical_block.insert("secret_aws_access_key".to_string());
		policy.rules.insert(
			"static_eval_usage".to_string(),
			RuleDefinition {
				severity: Severity::High,
				weight: -25,
				message: "eval is forbidden".to_string(),
				enabled: true,
			},
		);
		policy.exceptions.push(Exception {
			pattern: "test/**".to_string(),
			ignore: ["static_eval_usage".to_string()].into(),
			reason: Some("test fixtures".to_string()),
		});

		let serialized = serde_yaml::to_string(&policy).unwrap();
		let reloaded: Policy = serde_yaml::from_str(&serialized).unwrap();

		assert_eq!(policy, reloaded);
	}
}
