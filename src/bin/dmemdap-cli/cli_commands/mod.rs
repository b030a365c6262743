// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

use clap::Subcommand;
use color_eyre::eyre::{Context, Result};
use dmemdap::{DapAccess, DmemConfig, DmemDap};
use log::debug;

use crate::cli_commands::memory::{ReadArguments, WriteArguments};
use crate::{CliArguments, CompletionArguments};

pub mod dap;
pub mod memory;

#[derive(Subcommand)]
pub enum ToplevelCommmands
{
	/// Print information about the debug port and access ports behind the dmem device
	Info,
	/// Read words from target memory through an access port
	Read(ReadArguments),
	/// Write words to target memory through an access port
	Write(WriteArguments),
	/// Generate completions data for the shell
	Complete(CompletionArguments),
}

/// Open and connect a DAP session on the device the invocation selects
fn connect(cli_args: &CliArguments) -> Result<DmemDap>
{
	let config = DmemConfig::from_params(cli_args);
	debug!("Using {:?}", config);
	let device = config.device.clone();

	let mut dap = DmemDap::new(config);
	dap.connect()
		.wrap_err_with(|| format!("Failed to connect to dmem device {}", device.display()))?;
	Ok(dap)
}
