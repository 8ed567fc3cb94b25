// SPDX-License-Identifier: Apache-2.0

use crate::error::{Context as _, Result};
use std::{fs, path::Path};

/// Read file to a byte buffer.
pub fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
	fn inner(path: &Path) -> Result<Vec<u8>> {
		fs::read(path).with_context(|| format!("failed to read as bytes '{}'", path.display()))
	}

	inner(path.as_ref())
}

/// Create a directory and missing parents.
pub fn create_dir_all<P: AsRef<Path>>(path: P) -> Result<()> {
	fn inner(path: &Path) -> Result<()> {
		fs::create_dir_all(path)
			.with_context(|| format!("failed to create directory '{}'", path.display()))
	}

	inner(path.as_ref())
}
