// SPDX-License-Identifier: Apache-2.0

//! Ingestor for remote VCS sources.
//!
//! The repository is cloned into a fresh scratch directory with the external
//! `git` client. Without a requested ref a shallow clone of the default
//! branch suffices; with one, a full clone is made and the ref checked out.
//! The concrete commit id is resolved afterward and recorded in metadata.

use crate::{
	error::{Context as _, Result},
	sg_error,
	source::{IngestContext, SourceKind, SourceMetadata},
	util::command::GitCommand,
};
use pathbuf::pathbuf;
use std::{path::Path, time::Duration};

/// Ingest a remote repository, subject to `timeout` for the clone/checkout.
pub async fn ingest(
	url: &str,
	vcs_ref: Option<&str>,
	work_dir: &Path,
	timeout: Duration,
) -> Result<IngestContext> {
	let scratch = crate::source::scratch_dir(work_dir)?;
	let checkout = pathbuf![scratch.path(), "repo"];
	let checkout_str = checkout
		.to_str()
		.ok_or_else(|| sg_error!("scratch path is not valid UTF-8"))?
		.to_string();

	let acquire = acquire(url, vcs_ref, &checkout_str, &checkout);
	let commit = tokio::time::timeout(timeout, acquire)
		.await
		.map_err(|_| sg_error!("timed out cloning '{}' after {:?}", url, timeout))??;

	log::debug!("cloned source [url='{}', commit='{}']", url, commit);

	let metadata = SourceMetadata {
		kind: SourceKind::Git,
		original_location: url.to_string(),
		ingested_at: crate::source::now(),
		vcs_commit: Some(commit),
		vcs_ref: vcs_ref.map(str::to_string),
		archive_format: None,
	};

	IngestContext::build(checkout, metadata, Some(scratch))
}

/// Clone, optionally check out a ref, and resolve the HEAD commit id.
async fn acquire(
	url: &str,
	vcs_ref: Option<&str>,
	checkout_str: &str,
	checkout: &Path,
) -> Result<String> {
	match vcs_ref {
		// A specific ref may be outside a shallow history, so clone in full.
		Some(vcs_ref) => {
			GitCommand::new_repo(["clone", url, checkout_str])?
				.output()
				.await
				.with_context(|| format!("failed to clone '{}'", url))?;

			GitCommand::for_repo(checkout, ["checkout", "--detach", vcs_ref])?
				.output()
				.await
				.with_context(|| format!("failed to check out ref '{}'", vcs_ref))?;
		}
		None => {
			GitCommand::new_repo(["clone", "--depth", "1", url, checkout_str])?
				.output()
				.await
				.with_context(|| format!("failed to clone '{}'", url))?;
		}
	}

	let head = GitCommand::for_repo(checkout, ["rev-parse", "HEAD"])?
		.output()
		.await
		.context("failed to resolve HEAD commit")?;

	Ok(head.trim().to_string())
}
