// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

use std::num::NonZeroU32;
use std::path::PathBuf;

use crate::coresight::{CoreSightTopology, RSH_CS_ROM_BASE};

/// Default dmem device
pub const DMEM_DEV_PATH_DEFAULT: &str = "/dev/mem";

/// Types implementing this trait can supply the settings of a dmem DAP session
/// (usually, this is the command line arguments of a tool)
pub trait DmemParams
{
	fn device(&self) -> Option<&std::path::Path>;
	fn base_address(&self) -> Option<u64>;
	fn max_aps(&self) -> Option<u8>;
	fn ap_address_offset(&self) -> Option<u32>;
	fn idcode(&self) -> Option<u32>;
	fn poll_limit(&self) -> Option<NonZeroU32>;
}

/// Settings of a dmem DAP session, fixed for as long as it is connected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmemConfig
{
	/// The device file the rshim channels are accessed through
	pub device: PathBuf,
	/// Bus address of the CoreSight ROM table; the low 32 bits are what the APB-AP sees
	pub base_address: u64,
	/// Number of APs to model, AP indices at or past this are rejected
	pub max_aps: u8,
	/// Address stride between consecutive APs' windows
	pub ap_address_offset: u32,
	/// Value DPIDR reads as
	pub idcode: u32,
	/// Give up on a CoreSight access after this many polls instead of waiting forever
	pub poll_limit: Option<NonZeroU32>,
}

impl Default for DmemConfig
{
	fn default() -> Self
	{
		Self {
			device: PathBuf::from(DMEM_DEV_PATH_DEFAULT),
			base_address: u64::from(RSH_CS_ROM_BASE),
			max_aps: 1,
			ap_address_offset: 0,
			idcode: 0,
			poll_limit: None,
		}
	}
}

impl DmemConfig
{
	/// Build a configuration from `params`, taking the defaults for anything not given
	pub fn from_params<Params>(params: &Params) -> Self
	where
		Params: DmemParams,
	{
		let defaults = Self::default();
		Self {
			device: params.device().map(PathBuf::from).unwrap_or(defaults.device),
			base_address: params.base_address().unwrap_or(defaults.base_address),
			max_aps: params.max_aps().unwrap_or(defaults.max_aps),
			ap_address_offset: params.ap_address_offset().unwrap_or(defaults.ap_address_offset),
			idcode: params.idcode().unwrap_or(defaults.idcode),
			poll_limit: params.poll_limit().or(defaults.poll_limit),
		}
	}

	/// The APB bus layout this configuration describes
	pub fn topology(&self) -> CoreSightTopology
	{
		CoreSightTopology {
			rom_base: self.base_address as u32,
			..CoreSightTopology::default()
		}
	}
}

#[cfg(test)]
mod tests
{
	use std::path::Path;

	use super::*;

	#[derive(Default)]
	struct Params
	{
		device: Option<PathBuf>,
		max_aps: Option<u8>,
	}

	impl DmemParams for Params
	{
		fn device(&self) -> Option<&Path>
		{
			self.device.as_deref()
		}

		fn base_address(&self) -> Option<u64>
		{
			None
		}

		fn max_aps(&self) -> Option<u8>
		{
			self.max_aps
		}

		fn ap_address_offset(&self) -> Option<u32>
		{
			None
		}

		fn idcode(&self) -> Option<u32>
		{
			None
		}

		fn poll_limit(&self) -> Option<NonZeroU32>
		{
			None
		}
	}

	#[test]
	fn defaults()
	{
		let config = DmemConfig::from_params(&Params::default());
		assert_eq!(config, DmemConfig::default());
		assert_eq!(config.device, Path::new("/dev/mem"));
		assert_eq!(config.topology(), CoreSightTopology::default());
	}

	#[test]
	fn params_override_defaults()
	{
		let params = Params {
			device: Some(PathBuf::from("/dev/rshim0/rshim")),
			max_aps: Some(4),
		};
		let config = DmemConfig::from_params(&params);
		assert_eq!(config.device, Path::new("/dev/rshim0/rshim"));
		assert_eq!(config.max_aps, 4);
		assert_eq!(config.base_address, 0x8000_0000);
	}

	#[test]
	fn topology_uses_low_base_address_bits()
	{
		let config = DmemConfig {
			base_address: 0x1_9000_0000,
			..DmemConfig::default()
		};
		assert_eq!(config.topology().rom_base, 0x9000_0000);
	}
}
