// SPDX-License-Identifier: Apache-2.0

//! Policy file loading: YAML parsing, schema validation, `extends`
//! inheritance with cycle detection, and per-run caching.

use crate::policy::{Exception, Policy, RuleDefinition, Thresholds};
use serde::Deserialize;
use std::{
	collections::{BTreeMap, BTreeSet, HashMap, HashSet},
	path::{Path, PathBuf},
};

/// The distinct ways loading a policy can fail. All are fatal: the pipeline
/// never observes a partially loaded policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyFileError {
	#[error("policy file not found: '{}'", path.display())]
	NotFound { path: PathBuf },

	#[error("policy file '{}' is not valid YAML: {reason}", path.display())]
	Yaml { path: PathBuf, reason: String },

	#[error("policy file '{}' violates the schema: {}", path.display(), problems.join("; "))]
	Schema {
		path: PathBuf,
		problems: Vec<String>,
	},

	#[error("policy inheritance cycle through '{}'", path.display())]
	ExtendsCycle { path: PathBuf },
}

pub type LoadResult<T> = std::result::Result<T, PolicyFileError>;

/// The on-disk policy shape. Unlike the resolved [`Policy`], thresholds are
/// optional (a child may override just one field of its parent) and
/// `extends` is present. Unknown top-level fields are rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyFile {
	version: String,
	name: String,
	#[serde(default)]
	description: Option<String>,
	#[serde(default)]
	extends: Option<String>,
	#[serde(default)]
	thresholds: Option<FileThresholds>,
	#[serde(default)]
	critical_block: BTreeSet<String>,
	#[serde(default)]
	rules: BTreeMap<String, RuleDefinition>,
	#[serde(default)]
	exceptions: Vec<Exception>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileThresholds {
	#[serde(default)]
	block: Option<u32>,
	#[serde(default)]
	warn: Option<u32>,
}

/// Loads policy files, resolving inheritance and caching resolved policies
/// by canonical path for the duration of one run.
pub struct PolicyLoader {
	cache: HashMap<PathBuf, Policy>,
}

impl PolicyLoader {
	pub fn new() -> PolicyLoader {
		PolicyLoader {
			cache: HashMap::new(),
		}
	}

	/// Load and fully resolve the policy at `path`.
	pub fn load(&mut self, path: &Path) -> LoadResult<Policy> {
		let mut visiting = HashSet::new();
		let policy = self.load_inner(path, &mut visiting)?;

		let problems = policy.validate();
		if !problems.is_empty() {
			return Err(PolicyFileError::Schema {
				path: path.to_path_buf(),
				problems,
			});
		}

		Ok(policy)
	}

	fn load_inner(&mut self, path: &Path, visiting: &mut HashSet<PathBuf>) -> LoadResult<Policy> {
		let canonical = std::fs::canonicalize(path).map_err(|_| PolicyFileError::NotFound {
			path: path.to_path_buf(),
		})?;

		if let Some(cached) = self.cache.get(&canonical) {
			log::trace!("policy cache hit [path='{}']", canonical.display());
			return Ok(cached.clone());
		}

		// Cycle detection must be explicit: the cache never holds a policy
		// that is still being resolved.
		if !visiting.insert(canonical.clone()) {
			return Err(PolicyFileError::ExtendsCycle { path: canonical });
		}

		let contents =
			std::fs::read_to_string(&canonical).map_err(|_| PolicyFileError::NotFound {
				path: canonical.clone(),
			})?;

		let file: PolicyFile =
			serde_yaml::from_str(&contents).map_err(|err| to_schema_or_yaml(&canonical, err))?;

		let policy = match file.extends.clone() {
			Some(parent_ref) => {
				// `extends` resolves relative to this policy file's directory.
				let parent_path = canonical
					.parent()
					.map(|dir| dir.join(&parent_ref))
					.unwrap_or_else(|| PathBuf::from(&parent_ref));

				let parent = self.load_inner(&parent_path, visiting)?;
				merge(parent, file)
			}
			None => resolve(file),
		};

		visiting.remove(&canonical);
		self.cache.insert(canonical, policy.clone());

		Ok(policy)
	}
}

impl Default for PolicyLoader {
	fn default() -> PolicyLoader {
		PolicyLoader::new()
	}
}

/// serde_yaml reports unknown fields and type mismatches through the same
/// error type as syntax problems; split them back apart so callers can tell
/// a schema violation from unparseable YAML.
fn to_schema_or_yaml(path: &Path, err: serde_yaml::Error) -> PolicyFileError {
	let reason = err.to_string();

	if reason.contains("unknown field") || reason.contains("missing field") {
		PolicyFileError::Schema {
			path: path.to_path_buf(),
			problems: vec![reason],
		}
	} else {
		PolicyFileError::Yaml {
			path: path.to_path_buf(),
			reason,
		}
	}
}

/// Resolve a parentless policy file.
fn resolve(file: PolicyFile) -> Policy {
	let defaults = Thresholds::default();
	let thresholds = file.thresholds.unwrap_or_default();

	Policy {
		version: file.version,
		name: file.name,
		description: file.description,
		thresholds: Thresholds {
			block: thresholds.block.unwrap_or(defaults.block),
			warn: thresholds.warn.unwrap_or(defaults.warn),
		},
		critical_block: file.critical_block,
		rules: file.rules,
		exceptions: file.exceptions,
	}
}

/// Merge a child file over its resolved parent: child scalars win,
/// thresholds merge field-by-field, `critical_block` unions, `rules` unions
/// with child entries overriding, exceptions concatenate parent-first.
fn merge(parent: Policy, child: PolicyFile) -> Policy {
	let child_thresholds = child.thresholds.unwrap_or_default();

	let mut rules = parent.rules;
	rules.extend(child.rules);

	let mut critical_block = parent.critical_block;
	critical_block.extend(child.critical_block);

	let mut exceptions = parent.exceptions;
	exceptions.extend(child.exceptions);

	Policy {
		version: child.version,
		name: child.name,
		description: child.description.or(parent.description),
		thresholds: Thresholds {
			block: child_thresholds.block.unwrap_or(parent.thresholds.block),
			warn: child_thresholds.warn.unwrap_or(parent.thresholds.warn),
		},
		critical_block,
		rules,
		exceptions,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::analysis::finding::Severity;

	fn write_policy(dir: &Path, name: &str, contents: &str) -> PathBuf {
		let path = dir.join(name);
		std::fs::write(&path, contents).unwrap();
		path
	}

	#[test]
	fn loads_minimal_policy_with_default_thresholds() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_policy(dir.path(), "policy.yml", "version: '1.0'\nname: minimal\n");

		let policy = PolicyLoader::new().load(&path).unwrap();

		assert_eq!(policy.name, "minimal");
		assert_eq!(policy.thresholds, Thresholds { block: 40, warn: 70 });
	}

	#[test]
	fn loads_full_policy() {
		let dir = tempfile::tempdir().unwrap();
		let yaml = [
			"version: '1.2'",
			"name: strict",
			"description: strict gate",
			"thresholds:",
			"  block: 60",
			"  warn: 90",
			"critical_block: [secret_aws_access_key]",
			"rules:",
			"  static_eval_usage:",
			"    severity: high",
			"    weight: -25",
			"    message: eval is forbidden",
			"exceptions:",
			"  - pattern: 'test/**'",
			"    ignore: [static_eval_usage]",
			"    reason: test fixtures",
		]
		.join("\n");
		let path = write_policy(dir.path(), "policy.yml", &yaml);

		let policy = PolicyLoader::new().load(&path).unwrap();

		assert_eq!(policy.thresholds, Thresholds { block: 60, warn: 90 });
		assert!(policy.critical_block.contains("secret_aws_access_key"));
		let rule = &policy.rules["static_eval_usage"];
		assert_eq!(rule.severity, Severity::High);
		assert_eq!(rule.weight, -25);
		assert!(rule.enabled);
		assert_eq!(policy.exceptions[0].pattern, "test/**");
	}

	#[test]
	fn missing_file_is_not_found() {
		let err = PolicyLoader::new()
			.load(Path::new("/no/such/policy.yml"))
			.unwrap_err();
		assert!(matches!(err, PolicyFileError::NotFound { .. }));
	}

	#[test]
	fn bad_yaml_is_a_yaml_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_policy(dir.path(), "policy.yml", "version: [unclosed\n");

		let err = PolicyLoader::new().load(&path).unwrap_err();
		assert!(matches!(err, PolicyFileError::Yaml { .. }));
	}

	#[test]
	fn unknown_top_level_field_is_a_schema_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_policy(
			dir.path(),
			"policy.yml",
			"version: '1.0'\nname: x\nsurprise: true\n",
		);

		let err = PolicyLoader::new().load(&path).unwrap_err();
		assert!(matches!(err, PolicyFileError::Schema { .. }), "{:?}", err);
	}

	#[test]
	fn invalid_thresholds_are_a_schema_error() {
		let dir = tempfile::tempdir().unwrap();
		let yaml = [
			"version: '1.0'",
			"name: x",
			"thresholds:",
			"  block: 90",
			"  warn: 10",
		]
		.join("\n");
		let path = write_policy(dir.path(), "policy.yml", &yaml);

		let err = PolicyLoader::new().load(&path).unwrap_err();
		match err {
			PolicyFileError::Schema { problems, .. } => {
				assert!(problems.iter().any(|p| p.contains("thresholds.block")));
			}
			other => panic!("expected schema error, got {:?}", other),
		}
	}

	#[test]
	fn extends_merges_parent_and_child() {
		let dir = tempfile::tempdir().unwrap();
		let base = [
			"version: '1.0'",
			"name: base",
			"thresholds:",
			"  block: 30",
			"  warn: 80",
			"critical_block: [secret_aws_access_key]",
			"rules:",
			"  static_eval_usage:",
			"    severity: high",
			"    weight: -20",
			"    message: from base",
			"  skill_sudo_usage:",
			"    severity: medium",
			"    weight: -10",
			"    message: sudo",
			"exceptions:",
			"  - pattern: 'vendor/**'",
			"    ignore: [static_eval_usage]",
		]
		.join("\n");
		write_policy(dir.path(), "base.yml", &base);

		let child_yaml = [
			"version: '2.0'",
			"name: child",
			"extends: base.yml",
			"thresholds:",
			"  warn: 95",
			"critical_block: [secret_private_key]",
			"rules:",
			"  static_eval_usage:",
			"    severity: critical",
			"    weight: -50",
			"    message: from child",
			"exceptions:",
			"  - pattern: 'test/**'",
			"    ignore: [skill_sudo_usage]",
		]
		.join("\n");
		let child = write_policy(dir.path(), "child.yml", &child_yaml);

		let policy = PolicyLoader::new().load(&child).unwrap();

		// Child scalars win.
		assert_eq!(policy.name, "child");
		assert_eq!(policy.version, "2.0");
		// Thresholds merge field-by-field.
		assert_eq!(policy.thresholds, Thresholds { block: 30, warn: 95 });
		// critical_block is the union.
		assert!(policy.critical_block.contains("secret_aws_access_key"));
		assert!(policy.critical_block.contains("secret_private_key"));
		// Rules union with child override.
		assert_eq!(policy.rules["static_eval_usage"].message, "from child");
		assert_eq!(policy.rules["skill_sudo_usage"].message, "sudo");
		// Exceptions concatenate parent-first.
		assert_eq!(policy.exceptions[0].pattern, "vendor/**");
		assert_eq!(policy.exceptions[1].pattern, "test/**");
	}

	#[test]
	fn extends_cycle_is_fatal() {
		let dir = tempfile::tempdir().unwrap();
		write_policy(
			dir.path(),
			"a.yml",
			"version: '1.0'\nname: a\nextends: b.yml\n",
		);
		let path = write_policy(
			dir.path(),
			"b.yml",
			"version: '1.0'\nname: b\nextends: a.yml\n",
		);

		let err = PolicyLoader::new().load(&path).unwrap_err();
		assert!(matches!(err, PolicyFileError::ExtendsCycle { .. }));
	}

	#[test]
	fn self_extends_is_a_cycle() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_policy(
			dir.path(),
			"loop.yml",
			"version: '1.0'\nname: loop\nextends: loop.yml\n",
		);

		let err = PolicyLoader::new().load(&path).unwrap_err();
		assert!(matches!(err, PolicyFileError::ExtendsCycle { .. }));
	}

	#[test]
	fn cache_returns_identical_policy() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_policy(dir.path(), "policy.yml", "version: '1.0'\nname: cached\n");

		let mut loader = PolicyLoader::new();
		let first = loader.load(&path).unwrap();

		// Rewrite the file; the cached resolution must win within a run.
		write_policy(dir.path(), "policy.yml", "version: '9.9'\nname: changed\n");
		let second = loader.load(&path).unwrap();

		assert_eq!(first, second);
	}

	#[test]
	fn round_trip_preserves_model() {
		let dir = tempfile::tempdir().unwrap();
		let yaml = [
			"version: '1.0'",
			"name: rt",
			"thresholds:",
			"  block: 20",
			"  warn: 50",
			"rules:",
			"  skill_sudo_usage:",
			"    severity: medium",
			"    weight: -10",
			"    message: sudo",
		]
		.join("\n");
		let path = write_policy(dir.path(), "policy.yml", &yaml);

		let policy = PolicyLoader::new().load(&path).unwrap();
		let reserialized = serde_yaml::to_string(&policy).unwrap();
		let reloaded_path = write_policy(dir.path(), "round.yml", &reserialized);
		let reloaded = PolicyLoader::new().load(&reloaded_path).unwrap();

		assert_eq!(policy, reloaded);
	}
}
