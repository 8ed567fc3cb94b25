// SPDX-License-Identifier: Apache-2.0

//! The decision artifact.
//!
//! The artifact is both the machine-readable contract with CI systems and
//! the record of how the decision was reached. Key order is fixed by field
//! declaration order; the schema version is independent of the crate
//! version.

pub mod report_builder;

use crate::{
	analysis::finding::{Finding, Severity},
	enforce::Decision,
	source::SourceKind,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Version of the artifact schema itself.
pub const REPORT_VERSION: &str = "1.0.0";

/// Where the scanned content came from.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
	/// How the source was acquired.
	#[serde(rename = "type")]
	pub kind: SourceKind,
	/// Filesystem root that was scanned.
	pub path: String,
	/// Remote location, for VCS sources.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	/// Resolved commit id, for VCS sources.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub commit: Option<String>,
	/// Deterministic content hash of the file set.
	pub hash: String,
}

/// Count of findings by severity.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SeveritySummary {
	pub critical: usize,
	pub high: usize,
	pub medium: usize,
	pub low: usize,
	pub info: usize,
}

impl SeveritySummary {
	pub fn tally(findings: &[Finding]) -> SeveritySummary {
		let mut summary = SeveritySummary::default();
		for finding in findings {
			match finding.severity {
				Severity::Critical => summary.critical += 1,
				Severity::High => summary.high += 1,
				Severity::Medium => summary.medium += 1,
				Severity::Low => summary.low += 1,
				Severity::Info => summary.info += 1,
			}
		}
		summary
	}
}

/// The decision artifact emitted at the end of every completed scan.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
	/// Artifact schema version, fixed at [`REPORT_VERSION`].
	pub version: String,
	/// When the report was assembled, UTC.
	pub timestamp: DateTime<Utc>,
	pub source: SourceInfo,
	pub decision: Decision,
	pub score: u32,
	/// Scored findings, masked, in analyzer order.
	pub findings: Vec<Finding>,
	pub summary: SeveritySummary,
	/// Critical-block rule ids that fired.
	#[serde(rename = "criticalBlockRules")]
	pub critical_block_rules: Vec<String>,
	/// Wall-clock pipeline duration in milliseconds.
	pub duration: u64,
	#[serde(rename = "policyName")]
	pub policy_name: String,
	/// Per-analyzer failure messages; empty on a clean run.
	pub errors: Vec<String>,
}
