// SPDX-License-Identifier: Apache-2.0

//! The analyzer framework: a closed set of independent pattern analyzers and
//! the orchestrator that runs them concurrently with per-analyzer failure
//! isolation.

pub mod ci_risk;
pub mod dependency;
pub mod entrypoint;
pub mod finding;
pub mod osv;
pub mod pattern;
pub mod secret;
pub mod skill_doc;
pub mod static_code;

use crate::{
	analysis::finding::{AnalyzerKind, Finding},
	error::Result,
	policy::Policy,
};
use std::{
	path::{Path, PathBuf},
	sync::Arc,
	time::Instant,
};

/// The read-only input handed to every analyzer.
#[derive(Debug)]
pub struct ScanInput {
	/// Root directory relative paths resolve against.
	pub root_dir: PathBuf,
	/// Absolute paths of every file in the set, walker order. Analyzers
	/// apply their own scope predicates; the orchestrator does not filter.
	pub files: Vec<PathBuf>,
	/// The active policy, for analyzers that want it.
	pub policy: Option<Policy>,
}

impl ScanInput {
	/// A file's path relative to the source root.
	pub fn relative<'p>(&self, path: &'p Path) -> &'p Path {
		path.strip_prefix(&self.root_dir).unwrap_or(path)
	}
}

/// The closed set of analyzers.
///
/// A closed variant is preferable to trait objects here: the set is fixed,
/// each case is known at compile time, and dispatch stays monomorphized.
pub enum Analyzer {
	Secret(secret::SecretAnalyzer),
	Static(static_code::StaticCodeAnalyzer),
	Skill(skill_doc::SkillDocAnalyzer),
	Entrypoint(entrypoint::EntrypointAnalyzer),
	Dependency(dependency::DependencyAnalyzer),
	CiRisk(ci_risk::CiRiskAnalyzer),
}

impl Analyzer {
	/// The stable kind tag carried by this analyzer's findings.
	pub fn kind(&self) -> AnalyzerKind {
		match self {
			Analyzer::Secret(_) => AnalyzerKind::Secret,
			Analyzer::Static(_) => AnalyzerKind::Static,
			Analyzer::Skill(_) => AnalyzerKind::Skill,
			Analyzer::Entrypoint(_) => AnalyzerKind::Entrypoint,
			Analyzer::Dependency(_) => AnalyzerKind::Dependency,
			Analyzer::CiRisk(_) => AnalyzerKind::CiRisk,
		}
	}

	/// Human-readable analyzer name.
	pub fn name(&self) -> &'static str {
		match self {
			Analyzer::Secret(_) => "secret scanning",
			Analyzer::Static(_) => "static code analysis",
			Analyzer::Skill(_) => "skill document analysis",
			Analyzer::Entrypoint(_) => "entrypoint analysis",
			Analyzer::Dependency(_) => "dependency analysis",
			Analyzer::CiRisk(_) => "CI configuration analysis",
		}
	}

	/// Run this analyzer over the file set.
	pub async fn scan(&self, input: &ScanInput) -> Result<Vec<Finding>> {
		match self {
			Analyzer::Secret(inner) => inner.scan(input).await,
			Analyzer::Static(inner) => inner.scan(input).await,
			Analyzer::Skill(inner) => inner.scan(input).await,
			Analyzer::Entrypoint(inner) => inner.scan(input).await,
			Analyzer::Dependency(inner) => inner.scan(input).await,
			Analyzer::CiRisk(inner) => inner.scan(input).await,
		}
	}
}

/// The per-analyzer result record the orchestrator returns. Failure is data
/// here, not an error: one analyzer failing never aborts the pipeline.
#[derive(Debug)]
pub struct AnalyzerOutcome {
	pub kind: AnalyzerKind,
	pub name: &'static str,
	pub findings: Vec<Finding>,
	pub duration_ms: u64,
	pub error: Option<String>,
}

/// Runs registered analyzers concurrently and collects their outcomes in
/// registration order.
pub struct Orchestrator {
	analyzers: Vec<Arc<Analyzer>>,
}

impl Orchestrator {
	pub fn new() -> Orchestrator {
		Orchestrator {
			analyzers: Vec::new(),
		}
	}

	/// The canonical analyzer set in canonical registration order.
	pub fn standard(oracle: Arc<dyn osv::VulnOracle>) -> Orchestrator {
		let mut orchestrator = Orchestrator::new();
		orchestrator.register(Analyzer::Secret(secret::SecretAnalyzer));
		orchestrator.register(Analyzer::Static(static_code::StaticCodeAnalyzer));
		orchestrator.register(Analyzer::Skill(skill_doc::SkillDocAnalyzer));
		orchestrator.register(Analyzer::Entrypoint(entrypoint::EntrypointAnalyzer));
		orchestrator.register(Analyzer::Dependency(dependency::DependencyAnalyzer::new(
			oracle,
		)));
		orchestrator.register(Analyzer::CiRisk(ci_risk::CiRiskAnalyzer));
		orchestrator
	}

	pub fn register(&mut self, analyzer: Analyzer) {
		self.analyzers.push(Arc::new(analyzer));
	}

	/// Run every analyzer concurrently over the same input and await all.
	///
	/// Outcomes come back in registration order regardless of finish order.
	/// A failing or panicking analyzer contributes an empty finding list and
	/// an error message; the others are unaffected.
	pub async fn scan(&self, input: ScanInput) -> Vec<AnalyzerOutcome> {
		if let Some(policy) = &input.policy {
			log::debug!(
				"analyzers running under policy [name='{}', files={}]",
				policy.name,
				input.files.len()
			);
		}

		let input = Arc::new(input);
		let overall = Instant::now();

		let handles: Vec<_> = self
			.analyzers
			.iter()
			.map(|analyzer| {
				let analyzer = Arc::clone(analyzer);
				let input = Arc::clone(&input);
				tokio::spawn(async move {
					let started = Instant::now();
					let result = analyzer.scan(&input).await;
					(started.elapsed().as_millis() as u64, result)
				})
			})
			.collect();

		let mut outcomes = Vec::with_capacity(handles.len());

		for (analyzer, handle) in self.analyzers.iter().zip(handles) {
			let outcome = match handle.await {
				Ok((duration_ms, Ok(findings))) => AnalyzerOutcome {
					kind: analyzer.kind(),
					name: analyzer.name(),
					findings,
					duration_ms,
					error: None,
				},
				Ok((duration_ms, Err(err))) => {
					log::warn!(
						"analyzer failed [name='{}', err='{}']",
						analyzer.name(),
						err
					);
					AnalyzerOutcome {
						kind: analyzer.kind(),
						name: analyzer.name(),
						findings: Vec::new(),
						duration_ms,
						error: Some(err.to_string()),
					}
				}
				Err(join_err) => {
					log::warn!(
						"analyzer panicked [name='{}', err='{}']",
						analyzer.name(),
						join_err
					);
					AnalyzerOutcome {
						kind: analyzer.kind(),
						name: analyzer.name(),
						findings: Vec::new(),
						duration_ms: overall.elapsed().as_millis() as u64,
						error: Some(format!("analyzer task failed: {}", join_err)),
					}
				}
			};

			outcomes.push(outcome);
		}

		outcomes
	}

	/// Flatten per-analyzer outcomes into the finding list handed to the
	/// policy engine, preserving registration order.
	pub fn flatten(outcomes: &[AnalyzerOutcome]) -> Vec<Finding> {
		outcomes
			.iter()
			.flat_map(|outcome| outcome.findings.iter().cloned())
			.collect()
	}
}

impl Default for Orchestrator {
	fn default() -> Orchestrator {
		Orchestrator::new()
	}
}

/// Read many files concurrently, in input order, dropping unreadable ones.
///
/// Contents are decoded lossily; `cap` bounds how many bytes of each file are
/// decoded.
pub(crate) async fn load_files(
	paths: Vec<PathBuf>,
	cap: Option<usize>,
) -> Vec<(PathBuf, String)> {
	let reads = paths.into_iter().map(|path| async move {
		match tokio::fs::read(&path).await {
			Ok(bytes) => {
				let take = cap.map(|cap| cap.min(bytes.len())).unwrap_or(bytes.len());
				let content = String::from_utf8_lossy(&bytes[..take]).into_owned();
				Some((path, content))
			}
			Err(err) => {
				log::debug!(
					"skipping unreadable file [path='{}', err='{}']",
					path.display(),
					err
				);
				None
			}
		}
	});

	futures::future::join_all(reads)
		.await
		.into_iter()
		.flatten()
		.collect()
}
