// SPDX-License-Identifier: Apache-2.0

//! Dependency vulnerability oracle.
//!
//! The dependency analyzer holds an oracle by reference and asks it about
//! each pinned dependency. The network-backed implementation talks to an
//! OSV-compatible endpoint, one request per dependency; every failure mode
//! (network error, timeout, non-success status, undecodable body) collapses
//! to "no known vulnerabilities" and never aborts the analyzer.

use serde::Deserialize;
use std::time::Duration;

/// One known vulnerability for a dependency version.
#[derive(Debug, Clone)]
pub struct Vulnerability {
	pub id: String,
	pub summary: Option<String>,
	pub cvss_v3_score: Option<f64>,
}

/// Out-of-process vulnerability lookup.
pub trait VulnOracle: Send + Sync {
	/// Known vulnerabilities for `name@version` in `ecosystem`. Lookup
	/// failures are indistinguishable from an empty answer.
	fn lookup(&self, ecosystem: &str, name: &str, version: &str) -> Vec<Vulnerability>;

	/// Whether this oracle ever answers. The dependency analyzer skips the
	/// probe step entirely for an offline oracle.
	fn enabled(&self) -> bool {
		true
	}
}

/// The offline oracle: no lookups, no findings.
pub struct NullOracle;

impl VulnOracle for NullOracle {
	fn lookup(&self, _ecosystem: &str, _name: &str, _version: &str) -> Vec<Vulnerability> {
		Vec::new()
	}

	fn enabled(&self) -> bool {
		false
	}
}

/// Default OSV API endpoint.
pub const OSV_ENDPOINT: &str = "https://api.osv.dev/v1/query";

/// Network-backed oracle speaking the OSV query protocol.
pub struct OsvOracle {
	endpoint: String,
	agent: ureq::Agent,
}

impl OsvOracle {
	pub fn new() -> OsvOracle {
		OsvOracle::with_endpoint(OSV_ENDPOINT)
	}

	pub fn with_endpoint(endpoint: impl Into<String>) -> OsvOracle {
		OsvOracle {
			endpoint: endpoint.into(),
			agent: ureq::AgentBuilder::new()
				.timeout(Duration::from_secs(10))
				.build(),
		}
	}
}

impl Default for OsvOracle {
	fn default() -> OsvOracle {
		OsvOracle::new()
	}
}

impl VulnOracle for OsvOracle {
	fn lookup(&self, ecosystem: &str, name: &str, version: &str) -> Vec<Vulnerability> {
		let request = serde_json::json!({
			"package": {
				"name": name,
				"ecosystem": ecosystem,
			},
			"version": version,
		});

		let response = match self.agent.post(&self.endpoint).send_json(request) {
			Ok(response) => response,
			Err(err) => {
				log::debug!(
					"vulnerability lookup failed [package='{}@{}', err='{}']",
					name,
					version,
					err
				);
				return Vec::new();
			}
		};

		let body: QueryResponse = match response.into_json() {
			Ok(body) => body,
			Err(err) => {
				log::debug!(
					"vulnerability response undecodable [package='{}@{}', err='{}']",
					name,
					version,
					err
				);
				return Vec::new();
			}
		};

		body.vulns
			.into_iter()
			.map(|vuln| {
				let cvss_v3_score = vuln.score();
				Vulnerability {
					id: vuln.id,
					summary: vuln.summary,
					cvss_v3_score,
				}
			})
			.collect()
	}
}

/// Wire model for the OSV query response, parsed leniently: fields we don't
/// understand are ignored, scores we can't read become "no score".
#[derive(Debug, Deserialize)]
struct QueryResponse {
	#[serde(default)]
	vulns: Vec<OsvVuln>,
}

#[derive(Debug, Deserialize)]
struct OsvVuln {
	id: String,
	summary: Option<String>,
	#[serde(default)]
	severity: Vec<OsvSeverity>,
	#[serde(default)]
	database_specific: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OsvSeverity {
	#[serde(rename = "type")]
	kind: String,
	score: String,
}

impl OsvVuln {
	/// Best-effort numeric CVSS v3 score.
	fn score(&self) -> Option<f64> {
		for severity in &self.severity {
			if severity.kind.starts_with("CVSS_V3") {
				if let Ok(score) = severity.score.parse::<f64>() {
					return Some(score);
				}
			}
		}

		self.database_specific
			.as_ref()
			.and_then(|extra| extra.get("cvss_base_score"))
			.and_then(serde_json::Value::as_f64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn null_oracle_is_disabled_and_empty() {
		let oracle = NullOracle;
		assert!(!oracle.enabled());
		assert!(oracle.lookup("npm", "lodash", "4.17.21").is_empty());
	}

	#[test]
	fn score_prefers_cvss_v3_entries() {
		let vuln: OsvVuln = serde_json::from_value(serde_json::json!({
			"id": "GHSA-test",
			"summary": "test",
			"severity": [{"type": "CVSS_V3", "score": "9.8"}],
		}))
		.unwrap();

		assert_eq!(vuln.score(), Some(9.8));
	}

	#[test]
	fn score_falls_back_to_database_specific() {
		let vuln: OsvVuln = serde_json::from_value(serde_json::json!({
			"id": "GHSA-test",
			"database_specific": {"cvss_base_score": 7.5},
		}))
		.unwrap();

		assert_eq!(vuln.score(), Some(7.5));
	}

	#[test]
	fn unreadable_score_is_none() {
		let vuln: OsvVuln = serde_json::from_value(serde_json::json!({
			"id": "GHSA-test",
			"severity": [{"type": "CVSS_V3", "score": "CVSS:3.1/AV:N"}],
		}))
		.unwrap();

		assert_eq!(vuln.score(), None);
	}
}
