// SPDX-License-Identifier: Apache-2.0

//! Ingestor for archive files.
//!
//! The format is detected from the file suffix and the archive is unpacked
//! into a fresh scratch directory. Extraction refuses any entry whose
//! normalized path would escape the scratch directory.

use crate::{
	error::{Context as _, Result},
	sg_error,
	source::{IngestContext, SourceKind, SourceMetadata},
};
use flate2::read::GzDecoder;
use pathbuf::pathbuf;
use serde::Serialize;
use std::{
	fs::File,
	io::Read,
	ops::Not as _,
	path::{Component, Path},
	time::Duration,
};

/// Supported archive families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ArchiveFormat {
	Zip,
	Tar,
	TarGz,
}

/// Detect the archive format from the file name suffix.
pub fn detect_format(path: &Path) -> Result<ArchiveFormat> {
	let name = path.to_string_lossy();

	// `.tar.gz` must be checked before `.tar`.
	if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
		Ok(ArchiveFormat::TarGz)
	} else if name.ends_with(".tar") {
		Ok(ArchiveFormat::Tar)
	} else if name.ends_with(".zip") {
		Ok(ArchiveFormat::Zip)
	} else {
		Err(sg_error!(
			"unsupported archive suffix on '{}'",
			path.display()
		))
	}
}

/// Ingest an archive file, subject to `timeout` for the extraction.
pub async fn ingest(
	path: &Path,
	work_dir: &Path,
	timeout: Duration,
) -> Result<IngestContext> {
	if path.is_file().not() {
		return Err(sg_error!("archive '{}' not found", path.display()));
	}

	let format = detect_format(path)?;
	let scratch = crate::source::scratch_dir(work_dir)?;
	let dest = pathbuf![scratch.path(), "unpacked"];
	crate::util::fs::create_dir_all(&dest)?;

	// Extraction is blocking I/O; run it off the async worker threads so the
	// stage timeout stays responsive.
	let archive_path = path.to_path_buf();
	let extract_dest = dest.clone();
	let extract =
		tokio::task::spawn_blocking(move || extract(format, &archive_path, &extract_dest));

	match tokio::time::timeout(timeout, extract).await {
		Err(_) => {
			return Err(sg_error!(
				"timed out extracting '{}' after {:?}",
				path.display(),
				timeout
			))
		}
		Ok(joined) => joined.context("extraction task failed")??,
	}

	let metadata = SourceMetadata {
		kind: SourceKind::Archive,
		original_location: path.display().to_string(),
		ingested_at: crate::source::now(),
		vcs_commit: None,
		vcs_ref: None,
		archive_format: Some(format),
	};

	IngestContext::build(dest, metadata, Some(scratch))
}

/// Unpack `path` into `dest` according to `format`.
fn extract(format: ArchiveFormat, path: &Path, dest: &Path) -> Result<()> {
	log::debug!(
		"extracting archive [path='{}', format='{}']",
		path.display(),
		format
	);

	match format {
		ArchiveFormat::Zip => extract_zip(path, dest),
		ArchiveFormat::Tar => {
			let file =
				File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
			extract_tar(file, dest)
		}
		ArchiveFormat::TarGz => {
			let file =
				File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
			extract_tar(GzDecoder::new(file), dest)
		}
	}
}

fn extract_zip(path: &Path, dest: &Path) -> Result<()> {
	let file = File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
	let mut archive = zip::ZipArchive::new(file)
		.with_context(|| format!("corrupt zip archive '{}'", path.display()))?;

	for index in 0..archive.len() {
		let mut entry = archive
			.by_index(index)
			.with_context(|| format!("corrupt zip archive '{}'", path.display()))?;

		// `enclosed_name` rejects absolute paths and `..` components.
		let relative = entry.enclosed_name().ok_or_else(|| {
			sg_error!(
				"zip entry '{}' escapes the extraction root",
				entry.name()
			)
		})?;
		let out = dest.join(relative);

		if entry.is_dir() {
			crate::util::fs::create_dir_all(&out)?;
			continue;
		}

		if let Some(parent) = out.parent() {
			crate::util::fs::create_dir_all(parent)?;
		}

		let mut target = File::create(&out)
			.with_context(|| format!("failed to create '{}'", out.display()))?;
		std::io::copy(&mut entry, &mut target)
			.with_context(|| format!("failed to write '{}'", out.display()))?;
	}

	Ok(())
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
	let mut archive = tar::Archive::new(reader);

	for entry in archive.entries().context("corrupt tar archive")? {
		let mut entry = entry.context("corrupt tar archive")?;
		let entry_path = entry
			.path()
			.context("tar entry has an invalid path")?
			.into_owned();

		if escapes(&entry_path) {
			return Err(sg_error!(
				"tar entry '{}' escapes the extraction root",
				entry_path.display()
			));
		}

		entry
			.unpack_in(dest)
			.with_context(|| format!("failed to unpack '{}'", entry_path.display()))?;
	}

	Ok(())
}

/// Whether a normalized archive entry path would land outside the
/// extraction root.
fn escapes(path: &Path) -> bool {
	path.is_absolute()
		|| path
			.components()
			.any(|component| matches!(component, Component::ParentDir))
}
