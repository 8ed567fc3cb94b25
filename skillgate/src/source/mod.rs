// SPDX-License-Identifier: Apache-2.0

//! Source acquisition: turning a source descriptor into a normalized,
//! content-addressed file set ready for analysis.
//!
//! Three ingestor variants (local directory, remote VCS, archive file) share
//! one exit contract: an [`IngestContext`]. Scratch directories created for
//! clones and extractions are owned by the context and removed when it is
//! dropped, after the report has been emitted or on any error path.

pub mod archive;
pub mod git;
pub mod local;
pub mod walk;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
	path::{Path, PathBuf},
	time::{Duration, Instant},
};
use tempfile::TempDir;

/// How a source was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceKind {
	Local,
	Git,
	Archive,
}

/// Provenance of an ingested source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMetadata {
	/// Which ingestor produced the file set.
	pub kind: SourceKind,
	/// The descriptor string the caller provided.
	pub original_location: String,
	/// When ingestion completed, UTC.
	pub ingested_at: DateTime<Utc>,
	/// Resolved commit id, for VCS sources.
	pub vcs_commit: Option<String>,
	/// The ref that was checked out, if one was requested.
	pub vcs_ref: Option<String>,
	/// Archive format, for archive sources.
	pub archive_format: Option<archive::ArchiveFormat>,
}

/// One file in a normalized source.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
	/// Path relative to the source root.
	pub path: PathBuf,
	/// Absolute path on disk.
	pub absolute_path: PathBuf,
	/// Size in bytes.
	pub size_bytes: u64,
	/// SHA-256 of the raw file bytes, hex-encoded.
	pub content_hash: String,
}

/// The normalized, content-addressed view of a scan source.
#[derive(Debug)]
pub struct IngestContext {
	/// Root directory the relative paths in `files` resolve against.
	pub root_dir: PathBuf,
	/// Deterministic SHA-256 over the sorted (path, content hash) pairs.
	pub source_hash: String,
	/// File entries in walker order.
	pub files: Vec<FileEntry>,
	/// Provenance of the source.
	pub metadata: SourceMetadata,
	/// Sum of all admitted file sizes.
	pub total_size: u64,
	/// Number of admitted files.
	pub file_count: usize,
	/// Scratch directory backing clone/extraction sources. Removal happens
	/// on drop; removal errors are swallowed by `TempDir`.
	scratch: Option<TempDir>,
}

impl IngestContext {
	/// Build a context by walking `root_dir`, taking ownership of an optional
	/// scratch directory.
	pub(crate) fn build(
		root_dir: PathBuf,
		metadata: SourceMetadata,
		scratch: Option<TempDir>,
	) -> Result<IngestContext> {
		let files = walk::walk(&root_dir)?;
		let source_hash = walk::source_hash(&files);
		let total_size = files.iter().map(|f| f.size_bytes).sum();
		let file_count = files.len();

		log::debug!(
			"ingested source [kind='{}', files={}, bytes={}, hash='{}']",
			metadata.kind,
			file_count,
			total_size,
			source_hash
		);

		Ok(IngestContext {
			root_dir,
			source_hash,
			files,
			metadata,
			total_size,
			file_count,
			scratch,
		})
	}

	/// Absolute paths of every file in the set, in walker order.
	pub fn absolute_paths(&self) -> Vec<PathBuf> {
		self.files.iter().map(|f| f.absolute_path.clone()).collect()
	}
}

/// Where a source descriptor points, decided by string shape alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpecifier {
	/// A local directory path.
	Local(PathBuf),
	/// A remote VCS URL.
	Git(String),
	/// An archive file path.
	Archive(PathBuf),
}

/// Dispatch a raw descriptor string to an ingestor variant.
///
/// VCS URLs are recognized first, then archive suffixes, with local paths as
/// the fallback.
pub fn detect_source(descriptor: &str) -> SourceSpecifier {
	const VCS_PREFIXES: &[&str] = &[
		"https://github.com/",
		"https://gitlab.com/",
		"https://bitbucket.org/",
		"git@",
	];

	if VCS_PREFIXES.iter().any(|p| descriptor.starts_with(p)) || descriptor.ends_with(".git") {
		return SourceSpecifier::Git(descriptor.to_string());
	}

	const ARCHIVE_SUFFIXES: &[&str] = &[".zip", ".tar", ".tar.gz", ".tgz"];

	if ARCHIVE_SUFFIXES.iter().any(|s| descriptor.ends_with(s)) {
		return SourceSpecifier::Archive(PathBuf::from(descriptor));
	}

	SourceSpecifier::Local(PathBuf::from(descriptor))
}

/// Knobs shared by the acquiring ingestors.
#[derive(Debug, Clone)]
pub struct IngestOptions {
	/// Parent directory for scratch directories.
	pub work_dir: PathBuf,
	/// Overall timeout for acquisition (clone or extraction).
	pub timeout: Duration,
	/// VCS ref to check out, if any.
	pub vcs_ref: Option<String>,
}

impl Default for IngestOptions {
	fn default() -> IngestOptions {
		IngestOptions {
			work_dir: std::env::temp_dir(),
			timeout: Duration::from_secs(60),
			vcs_ref: None,
		}
	}
}

/// A completed ingestion with its wall-clock duration.
#[derive(Debug)]
pub struct Ingest {
	pub context: IngestContext,
	pub duration_ms: u64,
}

/// Acquire a source and normalize it to a file set.
///
/// Fatal on unreachable remotes, unknown refs, corrupt or escaping archives,
/// missing local paths, and acquisition timeout.
pub async fn ingest(descriptor: &str, opts: &IngestOptions) -> Result<Ingest> {
	let started = Instant::now();

	let context = match detect_source(descriptor) {
		SourceSpecifier::Local(path) => local::ingest(&path)?,
		SourceSpecifier::Git(url) => {
			git::ingest(&url, opts.vcs_ref.as_deref(), &opts.work_dir, opts.timeout).await?
		}
		SourceSpecifier::Archive(path) => {
			archive::ingest(&path, &opts.work_dir, opts.timeout).await?
		}
	};

	Ok(Ingest {
		context,
		duration_ms: started.elapsed().as_millis() as u64,
	})
}

/// Helper for the ingestors: current UTC time.
pub(crate) fn now() -> DateTime<Utc> {
	Utc::now()
}

/// Helper for the ingestors: a fresh scratch directory under `work_dir`.
pub(crate) fn scratch_dir(work_dir: &Path) -> Result<TempDir> {
	use crate::error::Context as _;

	tempfile::Builder::new()
		.prefix("sgate-")
		.tempdir_in(work_dir)
		.with_context(|| {
			format!(
				"failed to create scratch directory under '{}'",
				work_dir.display()
			)
		})
}
