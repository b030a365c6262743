// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

//! Module for error handling code.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced while talking to a target through the dmem CoreSight channel.
///
/// This is [`Clone`] so the DAP can keep a copy of the most recent failure latched for a later
/// [`crate::dap::DapAccess::run`] while still handing the error itself back to the caller.
#[derive(Debug, Clone, Error)]
pub enum DapError
{
	#[error("The dmem DAP is not connected")]
	NotConnected,

	#[error("The dmem DAP is already connected, disconnect it first")]
	AlreadyConnected,

	#[error("Unable to open dmem device {}", path.display())]
	Open
	{
		path: PathBuf,
		#[source]
		source: Arc<io::Error>,
	},

	#[error("Failed to {operation} dmem channel {channel} at offset {offset:#06x}")]
	Transport
	{
		/// The channel operation that failed (e.g. `"read"`).
		operation: &'static str,
		channel: u8,
		offset: u16,
		#[source]
		source: Arc<io::Error>,
	},

	#[error("CoreSight access to tile {tile} offset {offset:#010x} reported a bus error")]
	BusFault
	{
		tile: u32,
		offset: u32,
	},

	#[error("CoreSight access to tile {tile} offset {offset:#010x} did not complete within {polls} polls")]
	PollTimeout
	{
		tile: u32,
		offset: u32,
		polls: u32,
	},

	#[error("ADIv6 DAPs are not supported by dmem dap-direct mode")]
	UnsupportedAdiV6,

	#[error("AP register bank {bank} selected, only bank 0 is supported")]
	BankNotSupported
	{
		bank: u8,
	},

	#[error("Invalid AP register {register:#04x}")]
	InvalidRegister
	{
		register: u8,
	},

	#[error("Unsupported AP register read {register:#04x}")]
	UnsupportedRegister
	{
		register: u8,
	},

	#[error("AP {index} is out of range, only {max_aps} AP(s) configured")]
	AccessPortOutOfRange
	{
		index: u8,
		max_aps: u8,
	},
}

impl DapError
{
	pub(crate) fn open(path: PathBuf, source: io::Error) -> Self
	{
		Self::Open {
			path,
			source: Arc::new(source),
		}
	}

	pub(crate) fn transport(operation: &'static str, channel: u8, offset: u16, source: io::Error) -> Self
	{
		Self::Transport {
			operation,
			channel,
			offset,
			source: Arc::new(source),
		}
	}
}

#[macro_export]
macro_rules! log_and_return
{
	($err:expr) => {
		let err = $err;
		log::error!("{}", err);
		return Err(err);
	};
}
