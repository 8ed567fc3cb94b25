// SPDX-License-Identifier: Apache-2.0

//! Policy evaluation: suppression, dedup-by-rule scoring, and critical-block
//! detection. A pure function of (policy, findings); it cannot fail.

use crate::{
	analysis::finding::{Finding, Severity},
	policy::Policy,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// One rule that fired, with every finding that contributed to it. The
/// score is charged once per rule regardless of `count`.
#[derive(Debug, Clone, Serialize)]
pub struct TriggeredRule {
	pub rule_id: String,
	pub severity: Severity,
	pub weight: i64,
	pub message: String,
	pub count: usize,
	pub findings: Vec<Finding>,
}

/// The result of evaluating findings against a policy.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
	/// Final score, clamped to 0..=100.
	pub score: u32,
	/// Rules that fired, in first-trigger order.
	pub triggered: Vec<TriggeredRule>,
	pub has_critical_block: bool,
	/// Critical-block rule ids that fired, deduplicated, in trigger order.
	pub critical_block_hit: Vec<String>,
	/// Findings suppressed by policy exceptions; never scored.
	pub suppressed: Vec<Finding>,
}

/// The effective scoring directives for one finding.
struct EffectiveRule {
	severity: Severity,
	weight: i64,
	message: String,
	enabled: bool,
}

/// Evaluate `findings` (in input order) against `policy`.
pub fn evaluate(policy: &Policy, findings: &[Finding]) -> Evaluation {
	// Compile exception globs once. Invalid patterns were rejected at policy
	// load; an invalid pattern reaching here simply never matches.
	let exceptions: Vec<_> = policy
		.exceptions
		.iter()
		.filter_map(|exception| {
			glob::Pattern::new(&exception.pattern)
				.ok()
				.map(|pattern| (pattern, &exception.ignore))
		})
		.collect();

	let mut score: i64 = 100;
	let mut triggered: Vec<TriggeredRule> = Vec::new();
	let mut triggered_index: HashMap<String, usize> = HashMap::new();
	let mut critical_block_hit: Vec<String> = Vec::new();
	let mut critical_seen: HashSet<String> = HashSet::new();
	let mut suppressed: Vec<Finding> = Vec::new();

	for finding in findings {
		let file = finding.location.file.to_string_lossy();
		let is_suppressed = exceptions.iter().any(|(pattern, ignored)| {
			pattern.matches(&file) && ignored.contains(&finding.rule_id)
		});

		if is_suppressed {
			suppressed.push(finding.clone());
			continue;
		}

		let effective = match policy.rules.get(&finding.rule_id) {
			Some(rule) => EffectiveRule {
				severity: rule.severity,
				weight: rule.weight,
				message: rule.message.clone(),
				enabled: rule.enabled,
			},
			// Unknown rules score by the finding's own severity.
			None => EffectiveRule {
				severity: finding.severity,
				weight: finding.severity.default_weight(),
				message: finding.message.clone(),
				enabled: true,
			},
		};

		// A disabled rule drops its findings: not scored, not counted, not
		// suppressed.
		if !effective.enabled {
			continue;
		}

		if policy.critical_block.contains(&finding.rule_id)
			&& critical_seen.insert(finding.rule_id.clone())
		{
			critical_block_hit.push(finding.rule_id.clone());
		}

		match triggered_index.get(&finding.rule_id) {
			Some(&index) => {
				triggered[index].count += 1;
				triggered[index].findings.push(finding.clone());
			}
			None => {
				// The score moves exactly once per rule id.
				score += effective.weight;
				triggered_index.insert(finding.rule_id.clone(), triggered.len());
				triggered.push(TriggeredRule {
					rule_id: finding.rule_id.clone(),
					severity: effective.severity,
					weight: effective.weight,
					message: effective.message,
					count: 1,
					findings: vec![finding.clone()],
				});
			}
		}
	}

	Evaluation {
		score: score.clamp(0, 100) as u32,
		has_critical_block: !critical_block_hit.is_empty(),
		critical_block_hit,
		triggered,
		suppressed,
	}
}
