// SPDX-License-Identifier: Apache-2.0

//! Data structures for the skillgate CLI.

use std::path::PathBuf;

/// Audit an agent skill package for security risk before installation
#[derive(Debug, clap::Parser)]
#[command(name = "sgate", about, version)]
pub struct Args {
	/// skill source: a directory, VCS URL, or archive file
	#[arg(value_name = "SOURCE")]
	pub source: String,

	/// path to a YAML policy file
	#[arg(short, long, value_name = "FILE")]
	pub policy: Option<PathBuf>,

	/// write the decision artifact to a file instead of standard output
	#[arg(short, long, value_name = "FILE")]
	pub output: Option<PathBuf>,

	/// emit compact JSON instead of pretty-printed
	#[arg(long)]
	pub compact: bool,

	/// VCS ref (branch, tag, or commit) to check out
	#[arg(long = "ref", value_name = "REF")]
	pub vcs_ref: Option<String>,

	/// parent directory for scratch directories
	#[arg(long, value_name = "DIR")]
	pub work_dir: Option<PathBuf>,

	/// ingest timeout in seconds
	#[arg(long, value_name = "SECS", default_value_t = 60)]
	pub timeout: u64,

	/// query the vulnerability database for dependency advisories
	#[arg(long)]
	pub online: bool,
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser as _;

	#[test]
	fn parses_minimal_invocation() {
		let args = Args::parse_from(["sgate", "./skill"]);
		assert_eq!(args.source, "./skill");
		assert!(args.policy.is_none());
		assert!(!args.online);
		assert_eq!(args.timeout, 60);
	}

	#[test]
	fn parses_full_invocation() {
		let args = Args::parse_from([
			"sgate",
			"https://github.com/acme/skill",
			"--policy",
			"strict.yml",
			"--output",
			"report.json",
			"--compact",
			"--ref",
			"v1.2.3",
			"--timeout",
			"120",
			"--online",
		]);

		assert_eq!(args.policy, Some(PathBuf::from("strict.yml")));
		assert_eq!(args.output, Some(PathBuf::from("report.json")));
		assert!(args.compact);
		assert_eq!(args.vcs_ref.as_deref(), Some("v1.2.3"));
		assert_eq!(args.timeout, 120);
		assert!(args.online);
	}
}
