// SPDX-License-Identifier: Apache-2.0

//! Ingestor for local directories: no acquisition step, the provided path is
//! the source root.

use crate::{
	error::Result,
	sg_error,
	source::{IngestContext, SourceKind, SourceMetadata},
};
use std::{ops::Not as _, path::Path};

/// Ingest a local directory.
pub fn ingest(path: &Path) -> Result<IngestContext> {
	if path.exists().not() {
		return Err(sg_error!("source path '{}' not found", path.display()));
	}

	if path.is_dir().not() {
		return Err(sg_error!(
			"source path '{}' is not a directory",
			path.display()
		));
	}

	let metadata = SourceMetadata {
		kind: SourceKind::Local,
		original_location: path.display().to_string(),
		ingested_at: crate::source::now(),
		vcs_commit: None,
		vcs_ref: None,
		archive_format: None,
	};

	IngestContext::build(path.to_path_buf(), metadata, None)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ingests_directory() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("README.md"), "# hi").unwrap();

		let context = ingest(dir.path()).unwrap();

		assert_eq!(context.file_count, 1);
		assert_eq!(context.metadata.kind, SourceKind::Local);
		assert_eq!(context.root_dir, dir.path());
	}

	#[test]
	fn rejects_missing_path() {
		assert!(ingest(Path::new("/no/such/source")).is_err());
	}

	#[test]
	fn rejects_file_path() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("file.txt");
		std::fs::write(&file, "x").unwrap();

		assert!(ingest(&file).is_err());
	}
}
