// SPDX-License-Identifier: Apache-2.0

//! Dependency manifest analysis: lock-file hygiene and known-vulnerability
//! lookups through the oracle.

use crate::{
	analysis::{
		finding::{AnalyzerKind, Finding, Location, Severity},
		load_files,
		osv::VulnOracle,
		ScanInput,
	},
	error::Result,
};
use regex::Regex;
use std::{
	collections::HashSet,
	path::Path,
	sync::{Arc, LazyLock},
};

/// The manifest formats the analyzer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManifestKind {
	Npm,
	PyRequirements,
	GoMod,
	Cargo,
}

impl ManifestKind {
	fn for_file(name: &str) -> Option<ManifestKind> {
		match name {
			"package.json" => Some(ManifestKind::Npm),
			"requirements.txt" => Some(ManifestKind::PyRequirements),
			"go.mod" => Some(ManifestKind::GoMod),
			"Cargo.toml" => Some(ManifestKind::Cargo),
			_ => None,
		}
	}

	/// The ecosystem name used in oracle queries.
	fn ecosystem(self) -> &'static str {
		match self {
			ManifestKind::Npm => "npm",
			ManifestKind::PyRequirements => "PyPI",
			ManifestKind::GoMod => "Go",
			ManifestKind::Cargo => "crates.io",
		}
	}

	/// The lock file expected next to this manifest, if the format has one.
	fn lockfile(self) -> Option<&'static str> {
		match self {
			ManifestKind::Npm => Some("package-lock.json"),
			ManifestKind::PyRequirements => None,
			ManifestKind::GoMod => Some("go.sum"),
			ManifestKind::Cargo => Some("Cargo.lock"),
		}
	}
}

/// One declared dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Dependency {
	name: String,
	version: Option<String>,
}

pub struct DependencyAnalyzer {
	oracle: Arc<dyn VulnOracle>,
}

impl DependencyAnalyzer {
	pub fn new(oracle: Arc<dyn VulnOracle>) -> DependencyAnalyzer {
		DependencyAnalyzer { oracle }
	}

	pub async fn scan(&self, input: &ScanInput) -> Result<Vec<Finding>> {
		let manifests: Vec<_> = input
			.files
			.iter()
			.filter(|path| {
				path.file_name()
					.and_then(|name| name.to_str())
					.and_then(ManifestKind::for_file)
					.is_some()
			})
			.cloned()
			.collect();
		let contents = load_files(manifests, None).await;

		let mut findings = Vec::new();
		for (path, content) in &contents {
			let relative = input.relative(path);
			let kind = path
				.file_name()
				.and_then(|name| name.to_str())
				.and_then(ManifestKind::for_file)
				.expect("only matched manifests reach here");

			let dependencies = match parse_manifest(kind, content) {
				Ok(dependencies) => dependencies,
				Err(reason) => {
					findings.push(
						Finding::new(
							AnalyzerKind::Dependency,
							Severity::Info,
							"dependency_parse_error",
							format!("could not parse dependency manifest: {}", reason),
							Location::file(relative),
						)
						.with_meta("category", "dependency"),
					);
					continue;
				}
			};

			if let Some(lockfile) = kind.lockfile() {
				let present = path
					.parent()
					.map(|dir| dir.join(lockfile).is_file())
					.unwrap_or(false);
				if !present {
					findings.push(
						Finding::new(
							AnalyzerKind::Dependency,
							Severity::Medium,
							"dependency_no_lockfile",
							format!("dependency manifest without {}", lockfile),
							Location::file(relative),
						)
						.with_meta("category", "dependency"),
					);
				}
			}

			if self.oracle.enabled() {
				findings
					.extend(self.probe_vulnerabilities(kind, relative, &dependencies).await);
			}
		}

		Ok(findings)
	}

	/// Ask the oracle about every dependency pinned to a concrete version.
	async fn probe_vulnerabilities(
		&self,
		kind: ManifestKind,
		relative: &Path,
		dependencies: &[Dependency],
	) -> Vec<Finding> {
		let pinned: Vec<(String, String)> = dependencies
			.iter()
			.filter_map(|dep| {
				let version = normalize_version(dep.version.as_deref()?)?;
				Some((dep.name.clone(), version))
			})
			.collect();

		if pinned.is_empty() {
			return Vec::new();
		}

		// Lookups are blocking HTTP; keep them off the async workers.
		let oracle = Arc::clone(&self.oracle);
		let ecosystem = kind.ecosystem();
		let looked_up = tokio::task::spawn_blocking(move || {
			pinned
				.into_iter()
				.map(|(name, version)| {
					let vulns = oracle.lookup(ecosystem, &name, &version);
					(name, version, vulns)
				})
				.collect::<Vec<_>>()
		})
		.await
		.unwrap_or_default();

		let mut findings = Vec::new();
		for (name, version, vulns) in looked_up {
			for vuln in vulns {
				let severity = severity_for(vuln.cvss_v3_score);
				let message = vuln
					.summary
					.unwrap_or_else(|| format!("known vulnerability in {}", name));

				findings.push(
					Finding::new(
						AnalyzerKind::Dependency,
						severity,
						format!("dependency_vuln_{}", sanitize_id(&vuln.id)),
						message,
						Location::file(relative),
					)
					.with_meta("category", "vulnerability")
					.with_meta("advisory", vuln.id)
					.with_evidence(&format!("{}@{}", name, version)),
				);
			}
		}

		findings
	}
}

/// Map a CVSS v3 base score to a finding severity. No score means the
/// advisory gives us nothing to rank by.
fn severity_for(score: Option<f64>) -> Severity {
	match score {
		Some(score) if score >= 9.0 => Severity::Critical,
		Some(score) if score >= 7.0 => Severity::High,
		Some(score) if score >= 4.0 => Severity::Medium,
		Some(_) => Severity::Low,
		None => Severity::Info,
	}
}

/// Normalize a version spec to a concrete version, or `None` when the spec
/// is a range or wildcard that cannot be queried as an exact version.
///
/// Range operators are stripped rather than rejected, so `^4.17.0` queries
/// `4.17.0`; suppressing that behavior is a policy decision, not a parser
/// one.
fn normalize_version(spec: &str) -> Option<String> {
	let stripped = spec
		.trim()
		.trim_start_matches(['^', '~', '=', '>', '<', '!', ' '])
		.trim_start_matches('v');

	if stripped.is_empty() || stripped.contains(['*', 'x', 'X']) {
		return None;
	}

	semver::Version::parse(stripped)
		.ok()
		.map(|version| version.to_string())
}

/// Lowercase an advisory id into rule-id shape.
fn sanitize_id(id: &str) -> String {
	id.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() {
				c.to_ascii_lowercase()
			} else {
				'_'
			}
		})
		.collect()
}

fn parse_manifest(kind: ManifestKind, content: &str) -> std::result::Result<Vec<Dependency>, String> {
	match kind {
		ManifestKind::Npm => parse_npm(content),
		ManifestKind::PyRequirements => Ok(parse_requirements(content)),
		ManifestKind::GoMod => Ok(parse_go_mod(content)),
		ManifestKind::Cargo => parse_cargo(content),
	}
}

fn parse_npm(content: &str) -> std::result::Result<Vec<Dependency>, String> {
	let manifest: serde_json::Value =
		serde_json::from_str(content).map_err(|err| err.to_string())?;

	let mut dependencies = Vec::new();
	for section in ["dependencies", "devDependencies"] {
		let Some(map) = manifest.get(section).and_then(|value| value.as_object()) else {
			continue;
		};
		for (name, version) in map {
			dependencies.push(Dependency {
				name: name.clone(),
				version: version.as_str().map(str::to_string),
			});
		}
	}

	Ok(dependencies)
}

static REQUIREMENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^([A-Za-z0-9._-]+)\s*(?:(?:==|>=|<=|~=|!=|>|<)\s*([A-Za-z0-9.*+!-]+))?").unwrap()
});

fn parse_requirements(content: &str) -> Vec<Dependency> {
	content
		.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
		.filter_map(|line| {
			let caps = REQUIREMENT_LINE.captures(line)?;
			Some(Dependency {
				name: caps.get(1)?.as_str().to_string(),
				version: caps.get(2).map(|m| m.as_str().to_string()),
			})
		})
		.collect()
}

static GO_REQUIRE_SINGLE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?m)^require\s+(\S+)\s+(v\S+)").unwrap());
static GO_REQUIRE_BLOCK: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?ms)^require\s*\((.*?)^\)").unwrap());
static GO_BLOCK_LINE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?m)^\s*(\S+)\s+(v\S+)").unwrap());

fn parse_go_mod(content: &str) -> Vec<Dependency> {
	let mut dependencies = Vec::new();
	let mut seen = HashSet::new();

	let mut push = |name: &str, version: &str| {
		let key = format!("{}@{}", name, version);
		if seen.insert(key) {
			dependencies.push(Dependency {
				name: name.to_string(),
				version: Some(version.to_string()),
			});
		}
	};

	for caps in GO_REQUIRE_SINGLE.captures_iter(content) {
		push(&caps[1], &caps[2]);
	}

	for block in GO_REQUIRE_BLOCK.captures_iter(content) {
		for caps in GO_BLOCK_LINE.captures_iter(&block[1]) {
			push(&caps[1], &caps[2]);
		}
	}

	dependencies
}

fn parse_cargo(content: &str) -> std::result::Result<Vec<Dependency>, String> {
	let manifest: toml::Value = toml::from_str(content).map_err(|err| err.to_string())?;

	let Some(table) = manifest.get("dependencies").and_then(|value| value.as_table()) else {
		return Ok(Vec::new());
	};

	let mut dependencies = Vec::new();
	for (name, value) in table {
		let version = match value {
			toml::Value::String(version) => Some(version.clone()),
			toml::Value::Table(details) => details
				.get("version")
				.and_then(|version| version.as_str())
				.map(str::to_string),
			_ => None,
		};

		dependencies.push(Dependency {
			name: name.clone(),
			version,
		});
	}

	Ok(dependencies)
}
