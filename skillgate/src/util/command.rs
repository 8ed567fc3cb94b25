// SPDX-License-Identifier: Apache-2.0

//! Wrapper for invoking the external `git` client.
//!
//! The version-control client is an external collaborator: skillgate does not
//! embed a git implementation. Commands run with a cleared environment and
//! their stderr is folded into the error message on failure.

use crate::{
	error::{Context as _, Result},
	sg_error,
};
use std::{convert::AsRef, ffi::OsStr, iter::IntoIterator, ops::Not as _, path::Path};
use tokio::process::Command;

#[derive(Debug)]
pub struct GitCommand {
	command: Command,
}

impl GitCommand {
	/// A git command run inside an existing repository.
	pub fn for_repo<I, S>(repo_path: &Path, args: I) -> Result<GitCommand>
	where
		I: IntoIterator<Item = S> + Copy,
		S: AsRef<OsStr>,
	{
		GitCommand::internal(Some(repo_path), args)
	}

	/// A git command run outside any repository (e.g. `clone`).
	pub fn new_repo<I, S>(args: I) -> Result<GitCommand>
	where
		I: IntoIterator<Item = S> + Copy,
		S: AsRef<OsStr>,
	{
		GitCommand::internal(None, args)
	}

	fn internal<I, S>(repo_path: Option<&Path>, args: I) -> Result<GitCommand>
	where
		I: IntoIterator<Item = S> + Copy,
		S: AsRef<OsStr>,
	{
		// Init the command.
		let git_path = which::which("git").context("can't find git command")?;
		log::debug!(
			"running git [path='{}', repo='{}']",
			git_path.display(),
			repo_path.unwrap_or(Path::new("-")).display()
		);

		let mut command = Command::new(&git_path);
		command.args(args);

		// Set the working directory if necessary.
		if let Some(repo_path) = repo_path {
			command.current_dir(repo_path);
		}

		if cfg!(windows) {
			// this method is broken on Windows. See: https://github.com/rust-lang/rust/issues/31259
			//command.env_clear()
		} else {
			command.env_clear();
		};

		Ok(GitCommand { command })
	}

	/// Run the command to completion, returning its standard output.
	pub async fn output(&mut self) -> Result<String> {
		let output = self.command.output().await?;

		if output.status.success() {
			let output_text = String::from_utf8_lossy(&output.stdout).to_string();
			return Ok(output_text);
		}

		match String::from_utf8(output.stderr) {
			Ok(msg) if msg.is_empty().not() => {
				Err(sg_error!("(from git) {} [{}]", msg.trim(), output.status))
			}
			_ => Err(sg_error!("git failed [{}]", output.status)),
		}
	}
}
