// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

use color_eyre::eyre::{Context, Result};
use dmemdap::DapAccess;
use dmemdap::adi::{CtrlStat, dp};
use dmemdap::mem_ap::MemoryAccessPort;
use log::{info, warn};

use crate::CliArguments;
use crate::cli_commands::connect;

pub fn info_command(cli_args: &CliArguments) -> Result<()>
{
	let mut dap = connect(cli_args)?;

	let dpidr = dap.queue_dp_read(dp::DPIDR)?;
	let ctrl_stat = CtrlStat(dap.queue_dp_read(dp::CTRL_STAT)?);
	dap.run()?;
	info!("DPIDR: {:#010x}", dpidr);
	info!(
		"CTRL/STAT: {:#010x} (debug power {}, system power {})",
		ctrl_stat.0,
		if ctrl_stat.cdbgpwrupack() { "up" } else { "down" },
		if ctrl_stat.csyspwrupack() { "up" } else { "down" },
	);

	for index in 0..dap.config().max_aps {
		let mut memory_ap = MemoryAccessPort::new(&mut dap, index);
		let idr = memory_ap
			.idr()
			.wrap_err_with(|| format!("Failed to read the IDR of AP {}", index))?;
		if idr == 0 {
			warn!("AP {}: not present", index);
			continue;
		}
		let base = memory_ap.base()?;
		info!("AP {}: IDR {:#010x}, ROM table at {:#010x}", index, idr, base);
	}

	dap.disconnect();
	Ok(())
}
