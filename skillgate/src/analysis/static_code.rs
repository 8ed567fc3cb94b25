// SPDX-License-Identifier: Apache-2.0

//! Static pattern analysis of code files: dangerous APIs, obfuscation
//! signals, and credential access.

use crate::{
	analysis::{
		finding::{AnalyzerKind, Finding, Severity},
		pattern::{scan_content, PatternRule},
		load_files, ScanInput,
	},
	error::Result,
};
use std::{path::Path, sync::LazyLock};

/// File extensions in scope.
const EXTENSIONS: &[&str] = &["js", "ts", "jsx", "tsx", "py", "rb", "sh", "bash", "go", "rs"];

fn in_scope(path: &Path) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.map(|ext| EXTENSIONS.contains(&ext))
		.unwrap_or(false)
}

static RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
	vec![
		// Dangerous APIs. The eval pattern is deliberately broad and also
		// fires on identifiers ending in `eval`; the policy layer is the
		// knob for narrowing.
		PatternRule::new(
			"static_eval_usage",
			Severity::High,
			"dynamic code evaluation via eval",
			r"eval\s*\(",
		)
		.category("dangerous-api"),
		PatternRule::new(
			"static_exec_usage",
			Severity::High,
			"dynamic command execution via exec",
			r"exec\s*\(",
		)
		.category("dangerous-api"),
		PatternRule::new(
			"static_child_process",
			Severity::High,
			"child_process module usage",
			r#"require\s*\(\s*['"]child_process['"]\s*\)|from\s+['"]child_process['"]|import\s+['"]child_process['"]"#,
		)
		.category("dangerous-api"),
		PatternRule::new(
			"static_process_spawn",
			Severity::High,
			"subprocess spawn call",
			r"\b(spawn|execSync|execFileSync|spawnSync)\s*\(",
		)
		.category("dangerous-api"),
		PatternRule::new(
			"static_fs_destructive",
			Severity::Medium,
			"destructive filesystem call",
			r"\b(writeFileSync|unlinkSync|rmSync|rmdirSync|truncateSync)\s*\(",
		)
		.category("dangerous-api"),
		PatternRule::new(
			"static_network_fetch",
			Severity::Low,
			"network fetch call",
			r#"\bfetch\s*\(|\baxios\.(get|post|put|delete|request)\b|XMLHttpRequest|urllib\.request|\brequests\.(get|post|put|delete)\s*\(|\bhttp\.Get\s*\(|\bnet\.Dial\s*\("#,
		)
		.category("dangerous-api"),
		// Obfuscation signals.
		PatternRule::new(
			"static_base64_decode",
			Severity::Medium,
			"base64 decode primitive",
			r#"\batob\s*\(|Buffer\.from\s*\([^)]*,\s*['"]base64['"]|\bb64decode\s*\(|base64\s+(-d|--decode)\b"#,
		)
		.category("obfuscation"),
		PatternRule::new(
			"static_char_code_obfuscation",
			Severity::High,
			"character-code string construction",
			r"String\.fromCharCode\s*\((\s*\d+\s*,){5,}",
		)
		.category("obfuscation"),
		PatternRule::new(
			"static_hex_escape_runs",
			Severity::Medium,
			"long run of hex escapes",
			r"(\\x[0-9a-fA-F]{2}){11,}",
		)
		.category("obfuscation"),
		PatternRule::new(
			"static_long_line",
			Severity::Low,
			"unusually long line",
			r"(?m)^.{500,}$",
		)
		.category("obfuscation"),
		// Credential access. Evidence from these rules may quote material
		// next to real credentials, so it is masked.
		PatternRule::new(
			"static_ssh_access",
			Severity::Critical,
			"SSH key material access",
			r"~/\.ssh|id_rsa|authorized_keys",
		)
		.category("credential-access")
		.sensitive(),
		PatternRule::new(
			"static_aws_credentials_access",
			Severity::Critical,
			"AWS credentials access",
			r"~/\.aws\b",
		)
		.category("credential-access")
		.sensitive(),
		PatternRule::new(
			"static_env_file_access",
			Severity::High,
			"environment file access",
			r#"[\s'"(,=/]\.env\b"#,
		)
		.category("credential-access")
		.sensitive(),
		PatternRule::new(
			"static_browser_storage",
			Severity::High,
			"browser credential storage access",
			r"\blocalStorage\b|\bsessionStorage\b|document\.cookie",
		)
		.category("credential-access")
		.sensitive(),
		PatternRule::new(
			"static_keychain_access",
			Severity::High,
			"OS keychain access",
			r"\b[Kk]eychain\b|\bkeyring\b|\blibsecret\b|security find-generic-password",
		)
		.category("credential-access")
		.sensitive(),
	]
});

pub struct StaticCodeAnalyzer;

impl StaticCodeAnalyzer {
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
				AnalyzerKind::Static,
				&RULES,
				input.relative(path),
				content,
			));
		}

		Ok(findings)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;

	async fn scan_file(name: &str, content: &str) -> Vec<Finding> {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join(name), content).unwrap();
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
		StaticCodeAnalyzer.scan(&input).await.unwrap()
	}

	fn ids(findings: &[Finding]) -> Vec<&str> {
		findings.iter().map(|f| f.rule_id.as_str()).collect()
	}

	#[test]
	fn scope_is_extension_based() {
		assert!(in_scope(Path::new("a/b.ts")));
		assert!(in_scope(Path::new("run.bash")));
		assert!(!in_scope(Path::new("README.md")));
		assert!(!in_scope(Path::new("Makefile")));
	}

	#[tokio::test]
	async fn detects_eval_and_reports_line() {
		let findings = scan_file("index.js", "const x = 1;\neval(payload);\n").await;
		let finding = findings
			.iter()
			.find(|f| f.rule_id == "static_eval_usage")
			.unwrap();
		assert_eq!(finding.location.line, Some(2));
		assert_eq!(
			finding.location.file.to_string_lossy(),
			"index.js"
		);
	}

	#[tokio::test]
	async fn eval_pattern_is_deliberately_broad() {
		let findings = scan_file("index.js", "retrieval(query)").await;
		assert!(ids(&findings).contains(&"static_eval_usage"));
	}

	#[tokio::test]
	async fn detects_child_process_and_spawn() {
		let content = "const cp = require('child_process');\ncp.spawnSync('ls');\n";
		let findings = scan_file("run.js", content).await;
		let ids = ids(&findings);
		assert!(ids.contains(&"static_child_process"));
		assert!(ids.contains(&"static_process_spawn"));
	}

	#[tokio::test]
	async fn detects_obfuscation_signals() {
		let hex = r"\x41".repeat(12);
		let content = format!(
			"atob(data)\nString.fromCharCode(104, 101, 108, 108, 111, 33)\nconst h = \"{}\";\n",
			hex
		);
		let findings = scan_file("obf.js", &content).await;
		let ids = ids(&findings);
		assert!(ids.contains(&"static_base64_decode"));
		assert!(ids.contains(&"static_char_code_obfuscation"));
		assert!(ids.contains(&"static_hex_escape_runs"));
	}

	#[tokio::test]
	async fn detects_long_line() {
		let content = format!("short\n{}\n", "a".repeat(600));
		let findings = scan_file("gen.js", &content).await;
		let finding = findings
			.iter()
			.find(|f| f.rule_id == "static_long_line")
			.unwrap();
		assert_eq!(finding.location.line, Some(2));
		assert_eq!(finding.severity, Severity::Low);
	}

	#[tokio::test]
	async fn detects_credential_access() {
		let content = "cat ~/.ssh/id_rsa\nopen('.env')\nlocalStorage.getItem('token')\n";
		let findings = scan_file("steal.py", content).await;
		let ids = ids(&findings);
		assert!(ids.contains(&"static_ssh_access"));
		assert!(ids.contains(&"static_env_file_access"));
		assert!(ids.contains(&"static_browser_storage"));
	}

	#[tokio::test]
	async fn process_env_is_not_env_file_access() {
		let findings = scan_file("conf.js", "const key = process.env.API_KEY;\n").await;
		assert!(!ids(&findings).contains(&"static_env_file_access"));
	}

	#[tokio::test]
	async fn markdown_is_out_of_scope() {
		let findings = scan_file("README.md", "eval(payload)").await;
		assert!(findings.is_empty());
	}
}
