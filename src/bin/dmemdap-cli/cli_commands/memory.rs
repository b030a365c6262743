// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

use std::str::FromStr;

use clap::Args;
use color_eyre::eyre::{Context, Result};
use dmemdap::DapAccess;
use dmemdap::mem_ap::MemoryAccessPort;
use log::info;

use crate::cli_commands::connect;
use crate::{CliArguments, NumberParser};

#[derive(Args)]
pub struct ReadArguments
{
	#[arg(value_parser = NumberParser::<u32>::new())]
	/// Address to start reading at
	address: u32,
	#[arg(short = 'c', long = "count", value_parser = usize::from_str, default_value_t = 1)]
	/// Number of words to read
	count: usize,
	#[arg(long = "ap", value_parser = NumberParser::<u8>::new(), default_value_t = 0)]
	/// Index of the access port to read through
	ap: u8,
}

#[derive(Args)]
pub struct WriteArguments
{
	#[arg(value_parser = NumberParser::<u32>::new())]
	/// Address to start writing at
	address: u32,
	#[arg(required = true, num_args = 1.., value_parser = NumberParser::<u32>::new())]
	/// Words to write to consecutive addresses
	values: Vec<u32>,
	#[arg(long = "ap", value_parser = NumberParser::<u8>::new(), default_value_t = 0)]
	/// Index of the access port to write through
	ap: u8,
}

impl ReadArguments
{
	pub fn run(&self, cli_args: &CliArguments) -> Result<()>
	{
		let mut dap = connect(cli_args)?;
		let values = MemoryAccessPort::new(&mut dap, self.ap)
			.read_words(self.address, self.count)
			.wrap_err_with(|| format!("Failed to read {} word(s) from {:#010x}", self.count, self.address))?;
		dap.disconnect();

		let start = self.address & !0x3;
		for (index, value) in values.iter().enumerate() {
			let address = start.wrapping_add((index as u32).wrapping_mul(4));
			println!("{:#010x}: {:#010x}", address, value);
		}
		Ok(())
	}
}

impl WriteArguments
{
	pub fn run(&self, cli_args: &CliArguments) -> Result<()>
	{
		let mut dap = connect(cli_args)?;
		MemoryAccessPort::new(&mut dap, self.ap)
			.write_words(self.address, &self.values)
			.wrap_err_with(|| format!("Failed to write {} word(s) to {:#010x}", self.values.len(), self.address))?;
		dap.disconnect();

		info!("Wrote {} word(s) to {:#010x}", self.values.len(), self.address & !0x3);
		Ok(())
	}
}
