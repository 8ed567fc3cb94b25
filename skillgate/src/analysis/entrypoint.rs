// SPDX-License-Identifier: Apache-2.0

//! Analysis of installation entrypoints: the hooks a package uses to run
//! code at install time, plus install-script piping detected anywhere.

use crate::{
	analysis::{
		finding::{AnalyzerKind, Finding, Location, Severity},
		pattern::{scan_content, PatternRule},
		load_files, ScanInput,
	},
	error::Result,
};
use std::{ops::Not as _, path::Path, sync::LazyLock};

/// npm lifecycle scripts that execute at install time, with the severity of
/// their presence.
const NPM_LIFECYCLE: &[(&str, Severity)] = &[
	("postinstall", Severity::High),
	("preinstall", Severity::High),
	("prepare", Severity::Medium),
	("prepublish", Severity::Medium),
];

/// Shell script names that conventionally run at setup time.
const INSTALL_SCRIPTS: &[&str] = &["install.sh", "setup.sh", "bootstrap.sh"];

/// Rules applied to every file regardless of its path.
static UNIVERSAL_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
	vec![
		PatternRule::new(
			"entrypoint_curl_pipe_shell",
			Severity::Critical,
			"remote script piped to a shell via curl",
			r"curl[^\n|]*\|\s*(bash|sh|zsh)\b",
		)
		.category("install-hook"),
		PatternRule::new(
			"entrypoint_wget_pipe_shell",
			Severity::Critical,
			"remote script piped to a shell via wget",
			r"wget[^\n|]*\|\s*(bash|sh|zsh)\b",
		)
		.category("install-hook"),
		PatternRule::new(
			"entrypoint_python_inline_exec",
			Severity::Critical,
			"inline python downloading and executing code",
			r#"python3?\s+-c\s+['"][^\n]*(urllib|requests)[^\n]*exec"#,
		)
		.category("install-hook"),
	]
});

static SETUP_PY_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
	vec![
		PatternRule::new(
			"entrypoint_setup_py",
			Severity::Medium,
			"python package with setup-time execution",
			r"setup\s*\(|install_requires",
		)
		.category("install-hook"),
		PatternRule::new(
			"entrypoint_setup_cmdclass",
			Severity::High,
			"custom setup command class",
			r"cmdclass\s*=\s*\{",
		)
		.category("install-hook"),
	]
});

static MAKEFILE_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
	vec![
		PatternRule::new(
			"entrypoint_makefile_install",
			Severity::Medium,
			"make install target",
			r"(?m)^install\s*:",
		)
		.category("install-hook"),
		PatternRule::new(
			"entrypoint_makefile_all",
			Severity::Low,
			"make all target",
			r"(?m)^all\s*:",
		)
		.category("install-hook"),
	]
});

static DOCKERFILE_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
	vec![
		PatternRule::new(
			"entrypoint_dockerfile_run",
			Severity::Medium,
			"Dockerfile RUN instruction",
			r"(?m)^RUN ",
		)
		.category("install-hook"),
		PatternRule::new(
			"entrypoint_dockerfile_entrypoint",
			Severity::Medium,
			"Dockerfile ENTRYPOINT instruction",
			r"(?m)^ENTRYPOINT ",
		)
		.category("install-hook"),
	]
});

fn file_name(path: &Path) -> &str {
	path.file_name().and_then(|name| name.to_str()).unwrap_or("")
}

pub struct EntrypointAnalyzer;

impl EntrypointAnalyzer {
	pub async fn scan(&self, input: &ScanInput) -> Result<Vec<Finding>> {
		let contents = load_files(input.files.clone(), None).await;

		let mut findings = Vec::new();
		for (path, content) in &contents {
			let relative = input.relative(path);
			let name = file_name(relative);

			if name == "package.json" {
				findings.extend(npm_lifecycle_findings(relative, content));
			} else if name == "setup.py" {
				findings.extend(scan_content(
					AnalyzerKind::Entrypoint,
					&SETUP_PY_RULES,
					relative,
					content,
				));
			} else if name.eq_ignore_ascii_case("makefile") {
				findings.extend(scan_content(
					AnalyzerKind::Entrypoint,
					&MAKEFILE_RULES,
					relative,
					content,
				));
			} else if name == "Dockerfile" {
				findings.extend(scan_content(
					AnalyzerKind::Entrypoint,
					&DOCKERFILE_RULES,
					relative,
					content,
				));
			} else if INSTALL_SCRIPTS
				.iter()
				.any(|script| name.eq_ignore_ascii_case(script))
				&& content.trim().is_empty().not()
			{
				findings.push(
					Finding::new(
						AnalyzerKind::Entrypoint,
						Severity::High,
						"entrypoint_install_script",
						"installation shell script present",
						Location::file(relative),
					)
					.with_meta("category", "install-hook")
					.with_evidence(content.trim().lines().next().unwrap_or("")),
				);
			}

			// Every file gets the piping rules, path match or not.
			findings.extend(scan_content(
				AnalyzerKind::Entrypoint,
				&UNIVERSAL_RULES,
				relative,
				content,
			));
		}

		Ok(findings)
	}
}

/// Findings for install-time npm lifecycle scripts. Each script fires at
/// most once per manifest; the evidence is the script's command line.
fn npm_lifecycle_findings(relative: &Path, content: &str) -> Vec<Finding> {
	let manifest: serde_json::Value = match serde_json::from_str(content) {
		Ok(manifest) => manifest,
		// Malformed manifests are the dependency analyzer's concern.
		Err(_) => return Vec::new(),
	};

	let Some(scripts) = manifest.get("scripts").and_then(|s| s.as_object()) else {
		return Vec::new();
	};

	let mut findings = Vec::new();
	for (script, severity) in NPM_LIFECYCLE {
		if let Some(command) = scripts.get(*script).and_then(|value| value.as_str()) {
			findings.push(
				Finding::new(
					AnalyzerKind::Entrypoint,
					*severity,
					format!("entrypoint_{}", script),
					format!("npm {} lifecycle script", script),
					Location::file(relative),
				)
				.with_meta("category", "install-hook")
				.with_evidence(command),
			);
		}
	}

	findings
}
