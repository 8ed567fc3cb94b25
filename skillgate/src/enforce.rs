// SPDX-License-Identifier: Apache-2.0

//! Mapping an evaluation onto a terminal decision and a process exit code.

use crate::policy::{engine::Evaluation, Policy, Thresholds};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Exit code for a scan that never reached a decision.
pub const EXIT_SCAN_FAILED: u8 = 3;

/// The terminal decision for a scanned source.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display, strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
	Allow,
	Block,
	Quarantine,
}

impl Decision {
	/// The process exit code contract: 0 allow, 1 block, 2 quarantine.
	pub fn exit_code(self) -> u8 {
		match self {
			Decision::Allow => 0,
			Decision::Block => 1,
			Decision::Quarantine => 2,
		}
	}
}

/// Map an evaluation to a decision under the policy thresholds.
///
/// A critical-block hit always blocks; otherwise the score is compared
/// against the block and warn thresholds in that order.
pub fn decide(evaluation: &Evaluation, thresholds: Thresholds) -> Decision {
	if evaluation.has_critical_block {
		Decision::Block
	} else if evaluation.score <= thresholds.block {
		Decision::Block
	} else if evaluation.score <= thresholds.warn {
		Decision::Quarantine
	} else {
		Decision::Allow
	}
}

/// The terminal result of the enforcement stage.
#[derive(Debug)]
pub struct Enforcement {
	pub decision: Decision,
	pub exit_code: u8,
	pub evaluation: Evaluation,
	/// One-line human summary. Derived text only.
	pub summary: String,
	/// Human-readable reasons behind the decision. Derived text only.
	pub reasons: Vec<String>,
	pub policy_name: String,
	pub timestamp: DateTime<Utc>,
}

/// Apply the decision mapping and derive the reason text.
pub fn enforce(policy: &Policy, evaluation: Evaluation) -> Enforcement {
	let decision = decide(&evaluation, policy.thresholds);

	let mut reasons = Vec::new();

	for rule_id in &evaluation.critical_block_hit {
		reasons.push(format!("critical-block rule '{}' triggered", rule_id));
	}

	match decision {
		Decision::Allow => {}
		Decision::Block if evaluation.has_critical_block => {}
		Decision::Block => reasons.push(format!(
			"score {} is at or below the block threshold {}",
			evaluation.score, policy.thresholds.block
		)),
		Decision::Quarantine => reasons.push(format!(
			"score {} is at or below the warn threshold {}",
			evaluation.score, policy.thresholds.warn
		)),
	}

	for rule in &evaluation.triggered {
		reasons.push(format!(
			"{} ({}, {} finding{})",
			rule.rule_id,
			rule.severity,
			rule.count,
			if rule.count == 1 { "" } else { "s" }
		));
	}

	let summary = format!(
		"{}: score {}/100, {} rule{} triggered, {} finding{} suppressed",
		decision,
		evaluation.score,
		evaluation.triggered.len(),
		if evaluation.triggered.len() == 1 { "" } else { "s" },
		evaluation.suppressed.len(),
		if evaluation.suppressed.len() == 1 { "" } else { "s" },
	);

	log::info!(
		"enforcement decided [decision='{}', score={}, policy='{}']",
		decision,
		evaluation.score,
		policy.name
	);

	Enforcement {
		decision,
		exit_code: decision.exit_code(),
		evaluation,
		summary,
		reasons,
		policy_name: policy.name.clone(),
		timestamp: Utc::now(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::policy::engine::evaluate;
	use crate::analysis::finding::{AnalyzerKind, Finding, Location, Severity};

	fn finding(rule_id: &str, severity: Severity) -> Finding {
		Finding::new(
			AnalyzerKind::Secret,
			severity,
			rule_id,
			"test finding",
			Location::line("a.ts", 1),
		)
	}

	fn evaluation_with_score(severities: &[Severity]) -> Evaluation {
		let findings: Vec<_> = severities
			.iter()
			.enumerate()
			.map(|(i, severity)| finding(&format!("secret_rule_{}", i), *severity))
			.collect();
		evaluate(&Policy::builtin_default(), &findings)
	}

	#[test]
	fn exit_codes_follow_the_contract() {
		assert_eq!(Decision::Allow.exit_code(), 0);
		assert_eq!(Decision::Block.exit_code(), 1);
		assert_eq!(Decision::Quarantine.exit_code(), 2);
		assert_eq!(EXIT_SCAN_FAILED, 3);
	}

	#[test]
	fn clean_evaluation_allows() {
		let evaluation = evaluation_with_score(&[]);
		assert_eq!(decide(&evaluation, Thresholds::default()), Decision::Allow);
	}

	#[test]
	fn score_at_warn_threshold_quarantines() {
		// Three high findings: 100 - 3*20 = 40 ... actually use medium mix.
		let evaluation = evaluation_with_score(&[Severity::High, Severity::Medium]);
		// 100 - 20 - 10 = 70 == warn threshold.
		assert_eq!(evaluation.score, 70);
		assert_eq!(
			decide(&evaluation, Thresholds::default()),
			Decision::Quarantine
		);
	}

	#[test]
	fn score_at_block_threshold_blocks() {
		let evaluation = evaluation_with_score(&[
			Severity::High,
			Severity::High,
			Severity::High,
		]);
		// 100 - 60 = 40 == block threshold.
		assert_eq!(evaluation.score, 40);
		assert_eq!(decide(&evaluation, Thresholds::default()), Decision::Block);
	}

	#[test]
	fn critical_block_overrides_good_score() {
		let mut policy = Policy::builtin_default();
		policy.rules.insert(
			"secret_aws_access_key".to_string(),
			crate::policy::RuleDefinition {
				severity: Severity::Critical,
				weight: 0,
				message: "aws key".to_string(),
				enabled: true,
			},
		);
		policy
			.critical_block
			.insert("secret_aws_access_key".to_string());

		let evaluation = evaluate(&policy, &[finding("secret_aws_access_key", Severity::Critical)]);
		assert_eq!(evaluation.score, 100);

		let enforcement = enforce(&policy, evaluation);
		assert_eq!(enforcement.decision, Decision::Block);
		assert_eq!(enforcement.exit_code, 1);
		assert!(enforcement
			.reasons
			.iter()
			.any(|reason| reason.contains("critical-block")));
	}

	#[test]
	fn enforcement_carries_policy_name_and_summary() {
		let enforcement = enforce(&Policy::builtin_default(), evaluation_with_score(&[]));

		assert_eq!(enforcement.policy_name, "default");
		assert!(enforcement.summary.starts_with("allow: score 100/100"));
		assert!(enforcement.reasons.is_empty());
	}
}
