// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

//! The CoreSight control register protocol.
//!
//! Every APB access made on behalf of the DAP is a single 64-bit control word written to the
//! rshim channel: the word carries a tile-encoded word address, the access direction, the write
//! data and a go bit. The device clears go once the access has completed, leaving any read data
//! and an error flag behind in the same register.

use std::num::NonZeroU32;

use bitfield::bitfield;
use log::{error, trace};

use crate::channel::{DmemChannel, RSH_MMIO_CHANNEL_RSHIM};
use crate::error::DapError;

/// Offset of the CoreSight control register in the rshim channel
pub const RSH_CORESIGHT_CTL: u16 = 0x0e00;

/// Base of the root CoreSight ROM table on the APB bus
pub const RSH_CS_ROM_BASE: u32 = 0x8000_0000;
/// Offset from the ROM base at which the per-cluster tile windows start
pub const RSH_CS_TILE_BASE: u32 = 0x4400_0000;
/// Size of each cluster tile's window
pub const RSH_CS_TILE_SIZE: u32 = 0x0400_0000;

/// ADDR[27:24] of the control word carry the linear tile ID
const TILE_SHIFT: u32 = 24;
/// ADDR[28] must be set for any cluster tile access due to the CoreSight IP
const CLUSTER_SELECT: u32 = 1 << 28;

bitfield! {
	/// The CoreSight control register
	#[derive(Copy, Clone, Default, PartialEq, Eq)]
	pub struct ControlWord(u64);
	impl Debug;
	pub go, set_go: 0;
	pub read, set_read: 1;
	pub u32, addr, set_addr: 30, 2;
	pub error, set_error: 31;
	pub u32, data, set_data: 63, 32;
}

impl ControlWord
{
	/// Build the word that starts a write of `data` to `address`
	pub fn start_write(address: TileAddress, data: u32) -> Self
	{
		let mut word = Self(0);
		word.set_addr(address.encode());
		word.set_read(false);
		word.set_data(data);
		word.set_go(true);
		word
	}

	/// Build the word that starts a read from `address`
	pub fn start_read(address: TileAddress) -> Self
	{
		let mut word = Self(0);
		word.set_addr(address.encode());
		word.set_read(true);
		word.set_go(true);
		word
	}
}

/// The layout of the APB bus address space as seen through the dmem CoreSight bridge
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CoreSightTopology
{
	pub rom_base: u32,
	pub tile_base: u32,
	pub tile_size: u32,
}

impl Default for CoreSightTopology
{
	fn default() -> Self
	{
		Self {
			rom_base: RSH_CS_ROM_BASE,
			tile_base: RSH_CS_TILE_BASE,
			tile_size: RSH_CS_TILE_SIZE,
		}
	}
}

/// A tile-local APB address.
///
/// Tile 0 is the root CoreSight ROM table, tile N > 0 is the ROM table of cluster N - 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TileAddress
{
	pub tile: u32,
	pub offset: u32,
}

impl TileAddress
{
	/// Convert a flat AP address into a tile-local one.
	///
	/// `address` must be at or above the topology's ROM base. Addresses below it wrap around into the
	/// top of the tile windows and address nothing meaningful.
	pub fn from_flat(address: u32, topology: &CoreSightTopology) -> Self
	{
		let remainder = address.wrapping_sub(topology.rom_base);

		if remainder < topology.tile_base {
			Self {
				tile: 0,
				offset: remainder,
			}
		} else {
			let remainder = remainder - topology.tile_base;
			Self {
				tile: remainder / topology.tile_size + 1,
				offset: remainder % topology.tile_size,
			}
		}
	}

	/// Convert back to the flat AP address this tile-local address came from
	pub fn to_flat(&self, topology: &CoreSightTopology) -> u32
	{
		if self.tile == 0 {
			topology.rom_base.wrapping_add(self.offset)
		} else {
			topology
				.rom_base
				.wrapping_add(topology.tile_base)
				.wrapping_add((self.tile - 1).wrapping_mul(topology.tile_size))
				.wrapping_add(self.offset)
		}
	}

	/// Encode into the ADDR field of the control word
	fn encode(&self) -> u32
	{
		let address = (self.offset >> 2) | (self.tile << TILE_SHIFT);
		if self.tile != 0 {
			address | CLUSTER_SELECT
		} else {
			address
		}
	}
}

/// Drives APB accesses through the CoreSight control register of a dmem channel
pub struct CoreSightEngine
{
	channel: Box<dyn DmemChannel>,
	/// How many times to poll for completion before giving up, or forever if `None`
	poll_limit: Option<NonZeroU32>,
}

impl CoreSightEngine
{
	pub fn new(channel: Box<dyn DmemChannel>, poll_limit: Option<NonZeroU32>) -> Self
	{
		Self {
			channel,
			poll_limit,
		}
	}

	/// Write 4 bytes on the APB bus
	pub fn write(&mut self, address: TileAddress, data: u32) -> Result<(), DapError>
	{
		trace!("CoreSight write tile {} offset {:#010x} <- {:#010x}", address.tile, address.offset, data);
		self.execute(address, ControlWord::start_write(address, data))?;
		Ok(())
	}

	/// Read 4 bytes from the APB bus
	pub fn read(&mut self, address: TileAddress) -> Result<u32, DapError>
	{
		let word = self.execute(address, ControlWord::start_read(address))?;
		trace!("CoreSight read tile {} offset {:#010x} -> {:#010x}", address.tile, address.offset, word.data());
		Ok(word.data())
	}

	/// Kick off the access described by `request` and wait for the device to finish with it
	fn execute(&mut self, address: TileAddress, request: ControlWord) -> Result<ControlWord, DapError>
	{
		self.channel
			.write(RSH_MMIO_CHANNEL_RSHIM, RSH_CORESIGHT_CTL, request.0)
			.map_err(|error| DapError::transport("write", RSH_MMIO_CHANNEL_RSHIM, RSH_CORESIGHT_CTL, error))?;

		let word = self.poll(address)?;
		if word.error() {
			return Err(DapError::BusFault {
				tile: address.tile,
				offset: address.offset,
			});
		}
		Ok(word)
	}

	/// Read the control register back until the device clears go
	fn poll(&mut self, address: TileAddress) -> Result<ControlWord, DapError>
	{
		let mut polls = 0u32;
		loop {
			let word = match self.channel.read(RSH_MMIO_CHANNEL_RSHIM, RSH_CORESIGHT_CTL) {
				Ok(value) => ControlWord(value),
				Err(err) => {
					error!("Failed to read dmem: {}", err);
					return Err(DapError::transport("read", RSH_MMIO_CHANNEL_RSHIM, RSH_CORESIGHT_CTL, err));
				},
			};
			if !word.go() {
				return Ok(word);
			}

			polls += 1;
			if let Some(limit) = self.poll_limit {
				if polls >= limit.get() {
					return Err(DapError::PollTimeout {
						tile: address.tile,
						offset: address.offset,
						polls,
					});
				}
			}
		}
	}
}

#[cfg(test)]
mod tests
{
	use std::cell::RefCell;
	use std::collections::VecDeque;
	use std::io;
	use std::rc::Rc;

	use super::*;

	#[derive(Default)]
	struct ControlLog
	{
		written: Vec<u64>,
		reads: usize,
	}

	/// A control register that answers polls from a script
	struct ScriptedControl
	{
		log: Rc<RefCell<ControlLog>>,
		responses: VecDeque<io::Result<u64>>,
	}

	impl DmemChannel for ScriptedControl
	{
		fn read(&mut self, channel: u8, offset: u16) -> io::Result<u64>
		{
			assert_eq!((channel, offset), (RSH_MMIO_CHANNEL_RSHIM, RSH_CORESIGHT_CTL));
			self.log.borrow_mut().reads += 1;
			self.responses.pop_front().expect("polled more often than scripted")
		}

		fn write(&mut self, channel: u8, offset: u16, value: u64) -> io::Result<()>
		{
			assert_eq!((channel, offset), (RSH_MMIO_CHANNEL_RSHIM, RSH_CORESIGHT_CTL));
			self.log.borrow_mut().written.push(value);
			Ok(())
		}
	}

	fn engine(responses: Vec<io::Result<u64>>, poll_limit: Option<u32>) -> (CoreSightEngine, Rc<RefCell<ControlLog>>)
	{
		let log = Rc::new(RefCell::new(ControlLog::default()));
		let control = ScriptedControl {
			log: log.clone(),
			responses: responses.into(),
		};
		(CoreSightEngine::new(Box::new(control), poll_limit.and_then(NonZeroU32::new)), log)
	}

	fn busy() -> io::Result<u64>
	{
		Ok(0x1)
	}

	fn done(data: u32) -> io::Result<u64>
	{
		Ok(u64::from(data) << 32)
	}

	#[test]
	fn control_word_layout()
	{
		let word = ControlWord::start_write(
			TileAddress {
				tile: 0,
				offset: 0x100,
			},
			0xdead_beef,
		);
		assert_eq!(word.0, 0xdead_beef_0000_0101);

		let word = ControlWord::start_read(TileAddress {
			tile: 1,
			offset: 0x0010_0000,
		});
		// ADDR = (0x100000 >> 2) | (1 << 24) | (1 << 28), shifted up by 2, plus action and go
		assert_eq!(word.0, ((0x0004_0000u64 | 0x0100_0000 | 0x1000_0000) << 2) | 0x3);
		assert!(word.read());
		assert!(word.go());
		assert!(!word.error());
	}

	#[test]
	fn translate_examples()
	{
		let topology = CoreSightTopology::default();
		// Everything below the tile windows belongs to the root table
		assert_eq!(
			TileAddress::from_flat(0x8400_0100, &topology),
			TileAddress {
				tile: 0,
				offset: 0x0400_0100
			}
		);
		assert_eq!(
			TileAddress::from_flat(0xc400_0040, &topology),
			TileAddress {
				tile: 1,
				offset: 0x0000_0040
			}
		);
		assert_eq!(
			TileAddress::from_flat(0xc810_0000, &topology),
			TileAddress {
				tile: 2,
				offset: 0x0010_0000
			}
		);
	}

	#[test]
	fn translation_round_trips()
	{
		let topology = CoreSightTopology::default();
		let mut address = topology.rom_base;
		while let Some(next) = address.checked_add(0x0123_4567) {
			let tile = TileAddress::from_flat(address, &topology);
			if tile.tile == 0 {
				assert!(tile.offset < topology.tile_base);
			} else {
				assert!(tile.offset < topology.tile_size);
			}
			assert_eq!(tile.to_flat(&topology), address);
			address = next;
		}
		for address in [topology.rom_base, topology.rom_base + topology.tile_base - 4, u32::MAX] {
			assert_eq!(TileAddress::from_flat(address, &topology).to_flat(&topology), address);
		}
	}

	#[test]
	fn read_completes_when_go_clears()
	{
		let (mut engine, log) = engine(vec![busy(), busy(), busy(), done(0x1234_5678)], None);
		let address = TileAddress {
			tile: 0,
			offset: 0x100,
		};
		assert_eq!(engine.read(address).unwrap(), 0x1234_5678);
		assert_eq!(log.borrow().reads, 4);
		assert_eq!(log.borrow().written, vec![ControlWord::start_read(address).0]);
	}

	#[test]
	fn read_failure_stops_polling()
	{
		let (mut engine, log) = engine(vec![busy(), Err(io::Error::from_raw_os_error(libc::EIO)), done(0)], None);
		let address = TileAddress {
			tile: 3,
			offset: 0x40,
		};
		let result = engine.read(address);
		assert!(matches!(result, Err(DapError::Transport { operation: "read", .. })));
		assert_eq!(log.borrow().reads, 2);
	}

	#[test]
	fn write_waits_for_completion()
	{
		let (mut engine, log) = engine(vec![busy(), done(0)], None);
		let address = TileAddress {
			tile: 0,
			offset: 0x0fb0,
		};
		assert!(engine.write(address, 0xc5ac_ce55).is_ok());
		assert_eq!(log.borrow().reads, 2);
		assert_eq!(log.borrow().written, vec![ControlWord::start_write(address, 0xc5ac_ce55).0]);
	}

	#[test]
	fn device_error_flag_is_reported()
	{
		let (mut engine, _) = engine(vec![Ok(1 << 31)], None);
		let address = TileAddress {
			tile: 0,
			offset: 0,
		};
		assert!(matches!(engine.read(address), Err(DapError::BusFault { tile: 0, offset: 0 })));
	}

	#[test]
	fn poll_limit_gives_up()
	{
		let (mut engine, log) = engine(vec![busy(), busy(), busy(), done(0)], Some(2));
		let address = TileAddress {
			tile: 0,
			offset: 0,
		};
		assert!(matches!(engine.read(address), Err(DapError::PollTimeout { polls: 2, .. })));
		assert_eq!(log.borrow().reads, 2);
	}
}
