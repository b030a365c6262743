// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

//! DAP emulation on top of the CoreSight control channel.
//!
//! There is no physical DP or AP behind a dmem device. The DP, and the APB-AP's CSW and TAR, are
//! shadowed locally; only banked data and DRW accesses turn into APB bus transactions. Operations
//! are "queued" in name only: each runs to completion immediately, and any failure is latched so
//! that [`DapAccess::run`] reports it the way a real queued DAP would.

use log::{debug, error, info};

use crate::adi::{APB_AP_IDR, ApAddress, ApRegister, Csw, CtrlStat, Select, dp};
use crate::channel::DmemChannel;
use crate::config::DmemConfig;
use crate::coresight::{CoreSightEngine, TileAddress};
use crate::error::DapError;
use crate::log_and_return;

/// The DP/AP register level operations a debug host performs on a DAP
pub trait DapAccess
{
	fn connect(&mut self) -> Result<(), DapError>;
	fn disconnect(&mut self);

	fn queue_dp_read(&mut self, register: u8) -> Result<u32, DapError>;
	fn queue_dp_write(&mut self, register: u8, value: u32) -> Result<(), DapError>;
	fn queue_ap_read(&mut self, ap: ApAddress, register: u8) -> Result<u32, DapError>;
	fn queue_ap_write(&mut self, ap: ApAddress, register: u8, value: u32) -> Result<(), DapError>;
	fn queue_ap_abort(&mut self) -> Result<(), DapError>;

	/// Complete the queued operations, reporting the most recent failure among them
	fn run(&mut self) -> Result<(), DapError>;
}

/// Shadow of the debug port registers
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DpShadow
{
	pub ctrl_stat: u32,
	pub ap_select: u8,
	pub ap_bank: u8,
	pub id_code: u32,
}

/// Shadow of one access port's registers
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApShadow
{
	pub csw: u32,
	pub tar: u32,
	/// Bytes DRW accesses have auto-incremented past TAR since it was last written
	pub tar_increment: u32,
	pub drw: u32,
}

/// A DAP session over a dmem device
pub struct DmemDap
{
	config: DmemConfig,
	/// Present exactly while connected
	engine: Option<CoreSightEngine>,
	dp: DpShadow,
	aps: Vec<ApShadow>,
	/// The most recent AP operation failure, waiting to be collected by `run()`
	pending: Option<DapError>,
	adiv6_warned: bool,
}

impl DmemDap
{
	pub fn new(config: DmemConfig) -> Self
	{
		Self {
			config,
			engine: None,
			dp: DpShadow::default(),
			aps: Vec::new(),
			pending: None,
			adiv6_warned: false,
		}
	}

	pub fn config(&self) -> &DmemConfig
	{
		&self.config
	}

	/// Replace the session configuration, which is only allowed while disconnected
	pub fn reconfigure(&mut self, config: DmemConfig) -> Result<(), DapError>
	{
		if self.is_connected() {
			return Err(DapError::AlreadyConnected);
		}
		self.config = config;
		Ok(())
	}

	pub fn is_connected(&self) -> bool
	{
		self.engine.is_some()
	}

	pub fn dp_shadow(&self) -> &DpShadow
	{
		&self.dp
	}

	pub fn ap_shadow(&self, index: u8) -> Option<&ApShadow>
	{
		self.aps.get(usize::from(index))
	}

	/// Connect using an already set up channel rather than opening the configured device
	pub fn connect_with(&mut self, channel: Box<dyn DmemChannel>) -> Result<(), DapError>
	{
		if self.is_connected() {
			return Err(DapError::AlreadyConnected);
		}

		self.engine = Some(CoreSightEngine::new(channel, self.config.poll_limit));
		self.dp = DpShadow {
			id_code: self.config.idcode,
			..DpShadow::default()
		};
		self.aps = vec![ApShadow::default(); usize::from(self.config.max_aps)];
		self.pending = None;
		self.adiv6_warned = false;
		debug!("dmem DAP connected with {} AP(s)", self.config.max_aps);
		Ok(())
	}

	/// Map an AP access to the ADIv5 AP index it addresses
	fn ap_index(&mut self, ap: ApAddress) -> Result<u8, DapError>
	{
		match ap {
			ApAddress::V1(index) => Ok(index),
			ApAddress::V2(_) => {
				if !self.adiv6_warned {
					error!("ADIv6 dap not supported by dmem dap-direct mode");
					self.adiv6_warned = true;
				}
				Err(DapError::UnsupportedAdiV6)
			},
		}
	}

	fn engine(&mut self) -> Result<&mut CoreSightEngine, DapError>
	{
		self.engine.as_mut().ok_or(DapError::NotConnected)
	}

	fn check_ap_range(&self, index: u8) -> Result<(), DapError>
	{
		if index >= self.config.max_aps {
			Err(DapError::AccessPortOutOfRange {
				index,
				max_aps: self.config.max_aps,
			})
		} else {
			Ok(())
		}
	}

	/// Translate an address in AP `index`'s window into its tile-local form
	fn tile_address(&self, index: u8, address: u32) -> TileAddress
	{
		let address = address.wrapping_add(u32::from(index).wrapping_mul(self.config.ap_address_offset));
		TileAddress::from_flat(address, &self.config.topology())
	}

	/// Flat address of banked data register `bank_offset` for AP `index`
	fn banked_address(&self, index: u8, bank_offset: u8) -> TileAddress
	{
		let tar = self.aps[usize::from(index)].tar;
		self.tile_address(index, (tar & !0xf) + u32::from(bank_offset))
	}

	/// Flat address the next DRW access of AP `index` goes to
	fn drw_address(&self, index: u8) -> TileAddress
	{
		let ap = &self.aps[usize::from(index)];
		self.tile_address(index, (ap.tar & !0x3).wrapping_add(ap.tar_increment))
	}

	/// Advance TAR past a completed DRW access as CSW dictates
	fn auto_increment(&mut self, index: u8)
	{
		let ap = &mut self.aps[usize::from(index)];
		let increment = Csw(ap.csw).increment();
		ap.tar_increment = ap.tar_increment.wrapping_add(increment);
	}

	fn ap_read(&mut self, ap: ApAddress, register: u8) -> Result<u32, DapError>
	{
		let index = self.ap_index(ap)?;
		if !self.is_connected() {
			return Err(DapError::NotConnected);
		}

		let register = match ApRegister::try_from(register) {
			Ok(register) => register,
			Err(register) => {
				log_and_return!(DapError::UnsupportedRegister {
					register
				});
			},
		};

		// IDR is readable on every AP index, but only AP 0 identifies as present
		if register == ApRegister::Idr {
			return Ok(if index == 0 { APB_AP_IDR } else { 0 });
		}
		self.check_ap_range(index)?;

		match register {
			ApRegister::Csw => Ok(self.aps[usize::from(index)].csw),
			ApRegister::Tar => Ok(self.aps[usize::from(index)].tar),
			ApRegister::Cfg => Ok(0),
			ApRegister::Base => Ok(self.config.topology().rom_base),
			ApRegister::Idr => Ok(APB_AP_IDR),
			ApRegister::BankedData(bank_offset) => {
				let address = self.banked_address(index, bank_offset);
				self.engine()?.read(address)
			},
			ApRegister::Drw => {
				let address = self.drw_address(index);
				let value = self.engine()?.read(address)?;
				self.aps[usize::from(index)].drw = value;
				self.auto_increment(index);
				Ok(value)
			},
		}
	}

	fn ap_write(&mut self, ap: ApAddress, register: u8, value: u32) -> Result<(), DapError>
	{
		let index = self.ap_index(ap)?;
		if !self.is_connected() {
			return Err(DapError::NotConnected);
		}
		if self.dp.ap_bank != 0 {
			return Err(DapError::BankNotSupported {
				bank: self.dp.ap_bank,
			});
		}

		let register = ApRegister::try_from(register).map_err(|register| DapError::InvalidRegister {
			register,
		})?;
		self.check_ap_range(index)?;

		match register {
			ApRegister::Csw => self.aps[usize::from(index)].csw = value,
			ApRegister::Tar => {
				let ap = &mut self.aps[usize::from(index)];
				ap.tar = value;
				ap.tar_increment = 0;
			},
			ApRegister::BankedData(bank_offset) => {
				let address = self.banked_address(index, bank_offset);
				self.engine()?.write(address, value)?;
			},
			ApRegister::Drw => {
				self.aps[usize::from(index)].drw = value;
				let address = self.drw_address(index);
				self.engine()?.write(address, value)?;
				self.auto_increment(index);
			},
			ApRegister::Cfg | ApRegister::Base | ApRegister::Idr => {
				return Err(DapError::InvalidRegister {
					register: register.address(),
				});
			},
		}
		Ok(())
	}

	/// Keep hold of a failed AP operation's error for `run()`
	fn latch<T>(&mut self, result: Result<T, DapError>) -> Result<T, DapError>
	{
		if let Err(error) = &result {
			self.pending = Some(error.clone());
		}
		result
	}
}

impl DapAccess for DmemDap
{
	#[cfg(unix)]
	fn connect(&mut self) -> Result<(), DapError>
	{
		if self.is_connected() {
			return Err(DapError::AlreadyConnected);
		}
		let channel = crate::channel::open_device(&self.config.device).inspect_err(|err| error!("{}", err))?;
		self.connect_with(channel)
	}

	#[cfg(not(unix))]
	fn connect(&mut self) -> Result<(), DapError>
	{
		Err(DapError::open(
			self.config.device.clone(),
			std::io::Error::from(std::io::ErrorKind::Unsupported),
		))
	}

	fn disconnect(&mut self)
	{
		if self.engine.take().is_some() {
			debug!("dmem DAP disconnected");
		}
	}

	fn queue_dp_read(&mut self, register: u8) -> Result<u32, DapError>
	{
		if !self.is_connected() {
			return Err(DapError::NotConnected);
		}

		Ok(match register {
			dp::DPIDR => self.dp.id_code,
			dp::CTRL_STAT => CtrlStat::powered_up().0,
			_ => 0,
		})
	}

	fn queue_dp_write(&mut self, register: u8, value: u32) -> Result<(), DapError>
	{
		if !self.is_connected() {
			return Err(DapError::NotConnected);
		}

		match register {
			dp::CTRL_STAT => self.dp.ctrl_stat = value,
			dp::SELECT => {
				let select = Select(value);
				self.dp.ap_select = select.ap_sel();
				self.dp.ap_bank = select.ap_bank_sel();
			},
			_ => info!("Unknown DP register write {:#04x}", register),
		}
		Ok(())
	}

	fn queue_ap_read(&mut self, ap: ApAddress, register: u8) -> Result<u32, DapError>
	{
		let result = self.ap_read(ap, register);
		self.latch(result)
	}

	fn queue_ap_write(&mut self, ap: ApAddress, register: u8, value: u32) -> Result<(), DapError>
	{
		let result = self.ap_write(ap, register, value);
		self.latch(result)
	}

	fn queue_ap_abort(&mut self) -> Result<(), DapError>
	{
		if !self.is_connected() {
			return Err(DapError::NotConnected);
		}
		Ok(())
	}

	fn run(&mut self) -> Result<(), DapError>
	{
		if !self.is_connected() {
			return Err(DapError::NotConnected);
		}
		match self.pending.take() {
			Some(error) => Err(error),
			None => Ok(()),
		}
	}
}
