// SPDX-License-Identifier: Apache-2.0

//! Deterministic file-set enumeration and content hashing.
//!
//! The walk is depth-first with directory entries sorted by name, so two
//! walks of identical trees produce identical file lists regardless of
//! file-system enumeration order. Symbolic links are not followed.

use crate::{
	error::Result,
	sg_error,
	source::FileEntry,
};
use std::{ops::Not as _, path::Path};
use walkdir::{DirEntry, WalkDir};

/// Files larger than this are silently skipped. A file of exactly this size
/// is admitted.
pub const MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Directory names never descended into.
const EXCLUDED_DIRS: &[&str] = &[
	"node_modules",
	".git",
	"__pycache__",
	".pytest_cache",
	"dist",
	"build",
	".next",
	"coverage",
];

/// Dot-entries that are admitted despite the hidden-entry rule: CI
/// configuration is exactly what the CI-risk analyzer needs to see.
const HIDDEN_ALLOWED: &[&str] = &[".github", ".gitlab-ci.yml"];

/// Whether the walk should descend into / admit this entry.
fn admit(entry: &DirEntry) -> bool {
	let name = match entry.file_name().to_str() {
		Some(name) => name,
		// Non-UTF-8 names can't match any analyzer scope; skip them.
		None => return false,
	};

	if EXCLUDED_DIRS.contains(&name) {
		return false;
	}

	if name.starts_with('.') && HIDDEN_ALLOWED.contains(&name).not() {
		return false;
	}

	true
}

/// Whether a file of `len` bytes is admitted into the file set.
fn admits_size(len: u64) -> bool {
	len <= MAX_FILE_BYTES
}

/// Enumerate the file set under `root`.
///
/// Per-file I/O errors drop the file; a missing or non-directory root is
/// fatal.
pub fn walk(root: &Path) -> Result<Vec<FileEntry>> {
	if root.is_dir().not() {
		return Err(sg_error!(
			"source root '{}' is not a directory",
			root.display()
		));
	}

	let mut entries = Vec::new();

	let walker = WalkDir::new(root)
		.follow_links(false)
		.sort_by_file_name()
		.into_iter()
		.filter_entry(|entry| entry.depth() == 0 || admit(entry));

	for entry in walker {
		let entry = match entry {
			Ok(entry) => entry,
			Err(err) => {
				log::debug!("skipping unreadable entry [err='{}']", err);
				continue;
			}
		};

		// Symlinks are not followed and not treated as files.
		if entry.file_type().is_file().not() {
			continue;
		}

		let metadata = match entry.metadata() {
			Ok(metadata) => metadata,
			Err(err) => {
				log::debug!(
					"skipping file without metadata [path='{}', err='{}']",
					entry.path().display(),
					err
				);
				continue;
			}
		};

		if admits_size(metadata.len()).not() {
			log::debug!(
				"skipping oversized file [path='{}', bytes={}]",
				entry.path().display(),
				metadata.len()
			);
			continue;
		}

		let bytes = match crate::util::fs::read_bytes(entry.path()) {
			Ok(bytes) => bytes,
			Err(err) => {
				log::debug!("skipping unreadable file [err='{}']", err);
				continue;
			}
		};

		let relative = entry
			.path()
			.strip_prefix(root)
			.expect("walked path is always under the root")
			.to_path_buf();

		entries.push(FileEntry {
			path: relative,
			absolute_path: entry.path().to_path_buf(),
			size_bytes: metadata.len(),
			content_hash: sha256::digest(&bytes[..]),
		});
	}

	Ok(entries)
}

/// The aggregate source hash: SHA-256 over the (relative path, content hash)
/// pairs in sorted path order. A pure function of the file set's contents,
/// independent of walk order and timestamps.
pub fn source_hash(files: &[FileEntry]) -> String {
	let mut pairs: Vec<(String, &str)> = files
		.iter()
		.map(|f| (f.path.to_string_lossy().into_owned(), f.content_hash.as_str()))
		.collect();
	pairs.sort();

	let mut buffer = Vec::new();
	for (path, hash) in &pairs {
		buffer.extend_from_slice(path.as_bytes());
		buffer.extend_from_slice(hash.as_bytes());
	}

	sha256::digest(&buffer[..])
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;

	fn touch(root: &Path, rel: &str, contents: &str) {
		let path = root.join(rel);
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, contents).unwrap();
	}

	#[test]
	fn walks_sorted_and_relative() {
		let dir = tempfile::tempdir().unwrap();
		touch(dir.path(), "b.txt", "two");
		touch(dir.path(), "a.txt", "one");
		touch(dir.path(), "sub/c.txt", "three");

		let files = walk(dir.path()).unwrap();
		let paths: Vec<_> = files
			.iter()
			.map(|f| f.path.to_string_lossy().into_owned())
			.collect();

		assert_eq!(paths, vec!["a.txt", "b.txt", "sub/c.txt"]);
	}

	#[test]
	fn excludes_default_dirs_and_hidden_entries() {
		let dir = tempfile::tempdir().unwrap();
		touch(dir.path(), "keep.txt", "keep");
		touch(dir.path(), "node_modules/lib.js", "skip");
		touch(dir.path(), ".git/config", "skip");
		touch(dir.path(), ".hidden/file.txt", "skip");
		touch(dir.path(), ".secret.txt", "skip");

		let files = walk(dir.path()).unwrap();
		let paths: Vec<_> = files
			.iter()
			.map(|f| f.path.to_string_lossy().into_owned())
			.collect();

		assert_eq!(paths, vec!["keep.txt"]);
	}

	#[test]
	fn admits_github_workflows_and_gitlab_ci() {
		let dir = tempfile::tempdir().unwrap();
		touch(dir.path(), ".github/workflows/ci.yml", "on: push");
		touch(dir.path(), ".gitlab-ci.yml", "stages: [test]");

		let files = walk(dir.path()).unwrap();
		let paths: Vec<_> = files
			.iter()
			.map(|f| f.path.to_string_lossy().into_owned())
			.collect();

		assert_eq!(paths, vec![".github/workflows/ci.yml", ".gitlab-ci.yml"]);
	}

	#[test]
	fn missing_root_is_fatal() {
		assert!(walk(Path::new("/no/such/root")).is_err());
	}

	#[test]
	fn size_boundary_is_inclusive() {
		assert!(admits_size(MAX_FILE_BYTES));
		assert!(!admits_size(MAX_FILE_BYTES + 1));
	}

	#[test]
	fn source_hash_ignores_list_order() {
		let dir = tempfile::tempdir().unwrap();
		touch(dir.path(), "a.txt", "one");
		touch(dir.path(), "b.txt", "two");

		let mut files = walk(dir.path()).unwrap();
		let forward = source_hash(&files);
		files.reverse();
		let backward = source_hash(&files);

		assert_eq!(forward, backward);
	}

	#[test]
	fn source_hash_tracks_content() {
		let dir = tempfile::tempdir().unwrap();
		touch(dir.path(), "a.txt", "one");
		let before = source_hash(&walk(dir.path()).unwrap());

		touch(dir.path(), "a.txt", "changed");
		let after = source_hash(&walk(dir.path()).unwrap());

		assert_ne!(before, after);
	}

	#[test]
	fn per_file_hash_is_sha256_of_bytes() {
		let dir = tempfile::tempdir().unwrap();
		touch(dir.path(), "a.txt", "hello");

		let files = walk(dir.path()).unwrap();
		assert_eq!(files[0].content_hash, sha256::digest("hello"));
		assert_eq!(files[0].size_bytes, 5);
	}
}
