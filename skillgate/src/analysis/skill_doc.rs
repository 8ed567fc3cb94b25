// SPDX-License-Identifier: Apache-2.0

//! Analysis of skill documentation files.
//!
//! Markdown is the instruction surface of a skill: commands an agent is told
//! to run, URLs it is told to fetch, and permissions it is told to assume all
//! live here.

use crate::{
	analysis::{
		finding::{AnalyzerKind, Finding, Severity},
		pattern::{scan_content, PatternRule},
		load_files, ScanInput,
	},
	error::Result,
};
use regex::Regex;
use std::{path::Path, sync::LazyLock};

fn in_scope(path: &Path) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.map(|ext| ext.eq_ignore_ascii_case("md"))
		.unwrap_or(false)
}

/// Hosts considered ordinary download sources.
const ALLOWED_HOSTS: &[&str] = &[
	"github.com",
	"githubusercontent.com",
	"npmjs.org",
	"pypi.org",
];

static DOWNLOAD_HOST: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r#"https?://([^/\s'"]+)"#).unwrap());

/// Keep download matches whose host is outside the allowlist.
fn host_not_allowed(matched: &str) -> bool {
	let Some(caps) = DOWNLOAD_HOST.captures(matched) else {
		return false;
	};
	let host = caps.get(1).unwrap().as_str();
	let host = host.split(':').next().unwrap_or(host);

	ALLOWED_HOSTS
		.iter()
		.all(|allowed| host != *allowed && !host.ends_with(&format!(".{}", allowed)))
}

static RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
	vec![
		// Dangerous shell commands.
		PatternRule::new(
			"skill_rm_rf_root",
			Severity::Critical,
			"recursive removal of a root path",
			r"(?m)rm\s+-[rfRF]+\s+(/|~|\$HOME)(\s|$)",
		)
		.category("dangerous-command"),
		PatternRule::new(
			"skill_rm_recursive",
			Severity::High,
			"recursive file removal",
			r"rm\s+-[a-zA-Z]*[rR][a-zA-Z]*\b",
		)
		.category("dangerous-command"),
		PatternRule::new(
			"skill_sudo_usage",
			Severity::Medium,
			"privilege escalation via sudo",
			r"\bsudo\s+\S",
		)
		.category("dangerous-command"),
		PatternRule::new(
			"skill_chmod_world_writable",
			Severity::High,
			"world-writable permission change",
			r"chmod\s+(777|a\+rwx)\b",
		)
		.category("dangerous-command"),
		PatternRule::new(
			"skill_curl_pipe_shell",
			Severity::Critical,
			"remote script piped to a shell via curl",
			r"curl[^\n|]*\|\s*(bash|sh|zsh)\b",
		)
		.category("dangerous-command"),
		PatternRule::new(
			"skill_wget_pipe_shell",
			Severity::Critical,
			"remote script piped to a shell via wget",
			r"wget[^\n|]*\|\s*(bash|sh|zsh)\b",
		)
		.category("dangerous-command"),
		PatternRule::new(
			"skill_shell_dash_c",
			Severity::Medium,
			"inline shell -c invocation",
			r"\b(bash|sh|zsh)\s+-c\s+\S",
		)
		.category("dangerous-command"),
		PatternRule::new(
			"skill_dd_usage",
			Severity::High,
			"raw disk write via dd",
			r"\bdd\s+(if|of)=",
		)
		.category("dangerous-command"),
		PatternRule::new(
			"skill_mkfs_usage",
			Severity::Critical,
			"filesystem format command",
			r"\bmkfs(\.[a-z0-9]+)?\b",
		)
		.category("dangerous-command"),
		// Suspect URLs.
		PatternRule::new(
			"skill_unknown_download_host",
			Severity::Medium,
			"download from a non-allowlisted host",
			r#"(curl|wget)\s+[^\n]*https?://[^/\s'"]+"#,
		)
		.filter(host_not_allowed)
		.category("suspect-url"),
		PatternRule::new(
			"skill_url_shortener",
			Severity::High,
			"URL shortener hides the destination",
			r"https?://(bit\.ly|tinyurl\.com|goo\.gl|t\.co|is\.gd|ow\.ly|buff\.ly|rb\.gy)/",
		)
		.category("suspect-url"),
		PatternRule::new(
			"skill_ip_literal_url",
			Severity::High,
			"URL addressed by raw IPv4 literal",
			r"https?://\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}",
		)
		.category("suspect-url"),
		PatternRule::new(
			"skill_base64_host_url",
			Severity::High,
			"URL with base64-like host",
			r"https?://[A-Za-z0-9+/=]{50,}",
		)
		.category("suspect-url"),
		// Permission signals.
		PatternRule::new(
			"skill_home_dir_access",
			Severity::Medium,
			"home directory access",
			r"\$HOME\b|~/",
		)
		.category("permission"),
		PatternRule::new(
			"skill_network_listen",
			Severity::Medium,
			"network listener construct",
			r"(?i)\b(listen|bind|port)\b[^\n]{0,20}\b\d{2,5}\b",
		)
		.category("permission"),
		PatternRule::new(
			"skill_env_secret_ref",
			Severity::High,
			"reference to a secret environment variable",
			r"\$(API_KEY|SECRET|TOKEN|PASSWORD|CREDENTIAL|AUTH)\b",
		)
		.category("permission"),
		PatternRule::new(
			"skill_sensitive_path",
			Severity::High,
			"reference to a sensitive system path",
			r"/etc/passwd|/etc/shadow|/var/log|/proc/",
		)
		.category("permission"),
	]
});

pub struct SkillDocAnalyzer;

impl SkillDocAnalyzer {
	pub async fn scan(&self, input: &ScanInput) -> Result<Vec<Finding>> {
		let scoped: Vec<_> = input
			.files
			.iter()
			.filter(|path| in_scope(path))
			.cloned()
			.collect();
		let contents = load_files(scoped, None).await;

		let mut findings = Vec::new();
		for (path, content) in &contents {
			findings.extend(scan_content(
				AnalyzerKind::Skill,
				&RULES,
				input.relative(path),
				content,
			));
		}

		Ok(findings)
	}
}
