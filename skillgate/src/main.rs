// SPDX-License-Identifier: Apache-2.0

mod analysis;
mod cli;
mod context;
mod enforce;
mod error;
mod mask;
mod policy;
mod report;
mod session;
mod source;
mod util;

#[cfg(test)]
mod tests;

use crate::{
	enforce::EXIT_SCAN_FAILED,
	error::Result,
	report::report_builder,
	session::{run_scan, ScanArgs, ScanOutcome},
};
use clap::Parser as _;
use env_logger::Env;
use std::{process::ExitCode, time::Duration};

fn init_logging() {
	let env = Env::new()
		.filter("SGATE_LOG")
		.write_style("SGATE_LOG_STYLE");

	env_logger::Builder::from_env(env).init();
}

/// Entry point for skillgate.
fn main() -> ExitCode {
	init_logging();

	let args = cli::Args::parse();

	let runtime = match tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
	{
		Ok(runtime) => runtime,
		Err(err) => {
			eprintln!("error: failed to start async runtime: {}", err);
			return ExitCode::from(EXIT_SCAN_FAILED);
		}
	};

	match runtime.block_on(run(&args)) {
		Ok(outcome) => {
			eprintln!("{}", outcome.summary);
			for reason in &outcome.reasons {
				eprintln!("  - {}", reason);
			}
			ExitCode::from(outcome.exit_code)
		}
		Err(err) => {
			eprintln!("error: {:?}", err);
			ExitCode::from(EXIT_SCAN_FAILED)
		}
	}
}

/// Run the scan and emit the artifact.
async fn run(args: &cli::Args) -> Result<ScanOutcome> {
	let outcome = run_scan(ScanArgs {
		source: args.source.clone(),
		policy: args.policy.clone(),
		vcs_ref: args.vcs_ref.clone(),
		work_dir: args.work_dir.clone(),
		timeout: Duration::from_secs(args.timeout),
		online: args.online,
	})
	.await?;

	report_builder::write_report(&outcome.report, args.output.as_deref(), !args.compact)?;

	Ok(outcome)
}
