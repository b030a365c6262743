// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

use log::debug;

use crate::adi::{ApAddress, Csw, addr_inc, ap, size};
use crate::dap::DapAccess;
use crate::error::DapError;

/// A memory access port reached through a [`DapAccess`], driven in 32-bit auto-incrementing
/// transfers
pub struct MemoryAccessPort<'a, Dap>
where
	Dap: DapAccess + ?Sized,
{
	dap: &'a mut Dap,
	/// The AP's index on the DP
	index: u8,
}

impl<'a, Dap> MemoryAccessPort<'a, Dap>
where
	Dap: DapAccess + ?Sized,
{
	pub fn new(dap: &'a mut Dap, index: u8) -> Self
	{
		Self {
			dap,
			index,
		}
	}

	fn address(&self) -> ApAddress
	{
		ApAddress::V1(self.index)
	}

	/// Read the AP's identification register
	pub fn idr(&mut self) -> Result<u32, DapError>
	{
		let address = self.address();
		let idr = self.dap.queue_ap_read(address, ap::IDR)?;
		self.dap.run()?;
		Ok(idr)
	}

	/// Read the base address of the ROM table behind this AP
	pub fn base(&mut self) -> Result<u32, DapError>
	{
		let address = self.address();
		let base = self.dap.queue_ap_read(address, ap::BASE)?;
		self.dap.run()?;
		Ok(base)
	}

	/// Set the AP up for word sized, single auto-incrementing transfers starting at `address`
	fn begin_transfer(&mut self, address: u32) -> Result<(), DapError>
	{
		let port = self.address();
		let mut csw = Csw(self.dap.queue_ap_read(port, ap::CSW)?);
		csw.set_size(size::WORD);
		csw.set_addr_inc(addr_inc::SINGLE);
		self.dap.queue_ap_write(port, ap::CSW, csw.0)?;
		self.dap.queue_ap_write(port, ap::TAR, address & !0x3)
	}

	/// Read `count` consecutive words starting at `address`
	pub fn read_words(&mut self, address: u32, count: usize) -> Result<Vec<u32>, DapError>
	{
		debug!("Reading {} word(s) from {:#010x} on AP {}", count, address, self.index);
		self.begin_transfer(address)?;
		let port = self.address();
		let values = (0..count)
			.map(|_| self.dap.queue_ap_read(port, ap::DRW))
			.collect::<Result<Vec<_>, _>>()?;
		self.dap.run()?;
		Ok(values)
	}

	/// Write `values` to consecutive words starting at `address`
	pub fn write_words(&mut self, address: u32, values: &[u32]) -> Result<(), DapError>
	{
		debug!("Writing {} word(s) to {:#010x} on AP {}", values.len(), address, self.index);
		self.begin_transfer(address)?;
		let port = self.address();
		for &value in values {
			self.dap.queue_ap_write(port, ap::DRW, value)?;
		}
		self.dap.run()
	}
}

#[cfg(test)]
mod tests
{
	use std::collections::HashMap;

	use super::*;

	/// A DAP with one flat word addressed memory behind AP 0, modelling DRW auto-increment only
	#[derive(Default)]
	struct FlatDap
	{
		csw: u32,
		tar: u32,
		memory: HashMap<u32, u32>,
		runs: usize,
	}

	impl DapAccess for FlatDap
	{
		fn connect(&mut self) -> Result<(), DapError>
		{
			Ok(())
		}

		fn disconnect(&mut self) {}

		fn queue_dp_read(&mut self, _register: u8) -> Result<u32, DapError>
		{
			Ok(0)
		}

		fn queue_dp_write(&mut self, _register: u8, _value: u32) -> Result<(), DapError>
		{
			Ok(())
		}

		fn queue_ap_read(&mut self, port: ApAddress, register: u8) -> Result<u32, DapError>
		{
			assert_eq!(port, ApAddress::V1(0));
			match register {
				ap::CSW => Ok(self.csw),
				ap::TAR => Ok(self.tar),
				ap::DRW => {
					let value = self.memory.get(&self.tar).copied().unwrap_or(0);
					self.tar += Csw(self.csw).increment();
					Ok(value)
				},
				register => Err(DapError::UnsupportedRegister {
					register,
				}),
			}
		}

		fn queue_ap_write(&mut self, port: ApAddress, register: u8, value: u32) -> Result<(), DapError>
		{
			assert_eq!(port, ApAddress::V1(0));
			match register {
				ap::CSW => self.csw = value,
				ap::TAR => self.tar = value,
				ap::DRW => {
					self.memory.insert(self.tar, value);
					self.tar += Csw(self.csw).increment();
				},
				register => {
					return Err(DapError::InvalidRegister {
						register,
					});
				},
			}
			Ok(())
		}

		fn queue_ap_abort(&mut self) -> Result<(), DapError>
		{
			Ok(())
		}

		fn run(&mut self) -> Result<(), DapError>
		{
			self.runs += 1;
			Ok(())
		}
	}

	#[test]
	fn write_then_read_back()
	{
		let mut dap = FlatDap {
			csw: 0x2300_0000,
			..FlatDap::default()
		};
		let mut memory_ap = MemoryAccessPort::new(&mut dap, 0);
		memory_ap.write_words(0x8000_1000, &[1, 2, 3]).unwrap();
		assert_eq!(memory_ap.read_words(0x8000_1000, 4).unwrap(), vec![1, 2, 3, 0]);

		// The transfer setup keeps the other CSW bits
		assert_eq!(dap.csw, 0x2300_0012);
		assert_eq!(dap.memory.get(&0x8000_1008), Some(&3));
		assert_eq!(dap.runs, 2);
	}

	#[test]
	fn unaligned_start_is_rounded_down()
	{
		let mut dap = FlatDap::default();
		MemoryAccessPort::new(&mut dap, 0).write_words(0x8000_0006, &[0xaa]).unwrap();
		assert_eq!(dap.memory.get(&0x8000_0004), Some(&0xaa));
	}

	#[test]
	fn errors_propagate()
	{
		let mut dap = FlatDap::default();
		let mut memory_ap = MemoryAccessPort::new(&mut dap, 0);
		assert!(matches!(memory_ap.idr(), Err(DapError::UnsupportedRegister { register: ap::IDR })));
	}
}
