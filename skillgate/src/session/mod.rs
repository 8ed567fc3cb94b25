// SPDX-License-Identifier: Apache-2.0

//! The scan session: one source, one policy, one decision.
//!
//! Stages run strictly in order — ingest, analyze, evaluate, enforce,
//! assemble — and each stage completes before the next begins. Ingest and
//! policy-load failures are fatal; everything downstream is recovered into
//! the artifact.

use crate::{
	analysis::{osv, Orchestrator, ScanInput},
	enforce,
	error::{Context as _, Result},
	policy::{engine, load::PolicyLoader, Policy},
	report::{report_builder, Report},
	source::{self, IngestOptions},
};
use std::{
	path::PathBuf,
	sync::Arc,
	time::{Duration, Instant},
};

/// Everything a scan needs from the caller.
#[derive(Debug, Clone)]
pub struct ScanArgs {
	/// Source descriptor: directory, VCS URL, or archive path.
	pub source: String,
	/// Policy file; the built-in default policy when absent.
	pub policy: Option<PathBuf>,
	/// VCS ref to check out, if any.
	pub vcs_ref: Option<String>,
	/// Scratch parent directory; the OS temp dir when absent.
	pub work_dir: Option<PathBuf>,
	/// Ingest-stage timeout.
	pub timeout: Duration,
	/// Use the network-backed vulnerability oracle.
	pub online: bool,
}

impl Default for ScanArgs {
	fn default() -> ScanArgs {
		ScanArgs {
			source: String::new(),
			policy: None,
			vcs_ref: None,
			work_dir: None,
			timeout: Duration::from_secs(60),
			online: false,
		}
	}
}

/// A completed scan, decision made, artifact assembled.
#[derive(Debug)]
pub struct ScanOutcome {
	pub report: Report,
	/// One-line human summary of the decision.
	pub summary: String,
	/// Human-readable reasons behind the decision.
	pub reasons: Vec<String>,
	/// Process exit code for the decision.
	pub exit_code: u8,
}

/// Run the full pipeline for one source.
pub async fn run_scan(args: ScanArgs) -> Result<ScanOutcome> {
	let started = Instant::now();

	// Policy load is fatal before any acquisition happens.
	let policy = match &args.policy {
		Some(path) => PolicyLoader::new()
			.load(path)
			.context("failed to load policy")?,
		None => Policy::builtin_default(),
	};

	log::debug!(
		"scan starting [source='{}', policy='{}']",
		args.source,
		policy.name
	);

	let ingest_opts = IngestOptions {
		work_dir: args.work_dir.clone().unwrap_or_else(std::env::temp_dir),
		timeout: args.timeout,
		vcs_ref: args.vcs_ref.clone(),
	};

	let ingest = source::ingest(&args.source, &ingest_opts)
		.await
		.context("failed to ingest source")?;
	log::debug!(
		"ingest complete [files={}, duration_ms={}]",
		ingest.context.file_count,
		ingest.duration_ms
	);
	let context = ingest.context;

	let oracle: Arc<dyn osv::VulnOracle> = if args.online {
		Arc::new(osv::OsvOracle::new())
	} else {
		Arc::new(osv::NullOracle)
	};

	let orchestrator = Orchestrator::standard(oracle);
	let input = ScanInput {
		root_dir: context.root_dir.clone(),
		files: context.absolute_paths(),
		policy: Some(policy.clone()),
	};

	let outcomes = orchestrator.scan(input).await;
	let findings = Orchestrator::flatten(&outcomes);

	log::debug!(
		"analysis complete [findings={}, analyzers={}]",
		findings.len(),
		outcomes.len()
	);

	let evaluation = engine::evaluate(&policy, &findings);
	let enforcement = enforce::enforce(&policy, evaluation);

	let duration_ms = started.elapsed().as_millis() as u64;
	let report = report_builder::build_report(
		&context,
		&outcomes,
		&policy,
		&enforcement,
		duration_ms,
	);

	// `context` drops here, releasing any scratch directory now that the
	// report no longer needs the files.
	Ok(ScanOutcome {
		summary: enforcement.summary,
		reasons: enforcement.reasons,
		exit_code: enforcement.exit_code,
		report,
	})
}
