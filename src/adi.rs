// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

//! ADIv5 debug port and access port register model, as much of it as the dmem DAP understands.

use bitfield::bitfield;

/// Register addresses on the ADIv5 debug port (bank 0)
pub mod dp
{
	pub const DPIDR: u8 = 0x00;
	pub const CTRL_STAT: u8 = 0x04;
	pub const SELECT: u8 = 0x08;
	pub const RDBUFF: u8 = 0x0c;
}

/// Register addresses on an ADIv5 memory access port
pub mod ap
{
	pub const CSW: u8 = 0x00;
	pub const TAR: u8 = 0x04;
	pub const DRW: u8 = 0x0c;
	pub const BD0: u8 = 0x10;
	pub const BD1: u8 = 0x14;
	pub const BD2: u8 = 0x18;
	pub const BD3: u8 = 0x1c;
	pub const CFG: u8 = 0xf4;
	pub const BASE: u8 = 0xf8;
	pub const IDR: u8 = 0xfc;
}

/// APB-AP Identification Register value, as given in the APB-AP register summary of
/// "CoreSight on-chip trace and debug (Revision: r1p0)", section 3.16.5
pub const APB_AP_IDR: u32 = 0x4477_0002;

/// How an access port is addressed on the debug port
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ApAddress
{
	/// ADIv5 APSEL style index
	V1(u8),
	/// ADIv6 style base address into the DP's AP address space
	V2(u64),
}

impl Default for ApAddress
{
	fn default() -> Self
	{
		Self::V1(0)
	}
}

/// Decoded form of the AP registers the dmem DAP knows about
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ApRegister
{
	Csw,
	Tar,
	Drw,
	/// Banked data register 0-3, carrying the byte offset of the register within the bank
	BankedData(u8),
	Cfg,
	Base,
	Idr,
}

impl TryFrom<u8> for ApRegister
{
	type Error = u8;

	fn try_from(register: u8) -> Result<Self, Self::Error>
	{
		match register {
			ap::CSW => Ok(Self::Csw),
			ap::TAR => Ok(Self::Tar),
			ap::DRW => Ok(Self::Drw),
			ap::BD0 | ap::BD1 | ap::BD2 | ap::BD3 => Ok(Self::BankedData(register & 0x0c)),
			ap::CFG => Ok(Self::Cfg),
			ap::BASE => Ok(Self::Base),
			ap::IDR => Ok(Self::Idr),
			_ => Err(register),
		}
	}
}

impl ApRegister
{
	/// The register's address on the AP
	pub fn address(&self) -> u8
	{
		match self {
			Self::Csw => ap::CSW,
			Self::Tar => ap::TAR,
			Self::Drw => ap::DRW,
			Self::BankedData(bank_offset) => ap::BD0 + bank_offset,
			Self::Cfg => ap::CFG,
			Self::Base => ap::BASE,
			Self::Idr => ap::IDR,
		}
	}
}

bitfield! {
	/// DP CTRL/STAT
	#[derive(Copy, Clone, Default, PartialEq, Eq)]
	pub struct CtrlStat(u32);
	impl Debug;
	pub csyspwrupack, set_csyspwrupack: 31;
	pub csyspwrupreq, set_csyspwrupreq: 30;
	pub cdbgpwrupack, set_cdbgpwrupack: 29;
	pub cdbgpwrupreq, set_cdbgpwrupreq: 28;
}

impl CtrlStat
{
	/// The value the dmem DAP always reports: both power domains up
	pub fn powered_up() -> Self
	{
		let mut ctrl_stat = Self(0);
		ctrl_stat.set_cdbgpwrupack(true);
		ctrl_stat.set_csyspwrupack(true);
		ctrl_stat
	}
}

bitfield! {
	/// DP SELECT (ADIv5 layout)
	#[derive(Copy, Clone, Default, PartialEq, Eq)]
	pub struct Select(u32);
	impl Debug;
	pub u8, ap_sel, set_ap_sel: 31, 24;
	pub u8, ap_bank_sel, set_ap_bank_sel: 7, 4;
	pub u8, dp_bank_sel, set_dp_bank_sel: 3, 0;
}

bitfield! {
	/// MEM-AP Control/Status Word
	#[derive(Copy, Clone, Default, PartialEq, Eq)]
	pub struct Csw(u32);
	impl Debug;
	pub u8, addr_inc, set_addr_inc: 5, 4;
	pub u8, size, set_size: 2, 0;
}

/// Auto-increment modes of the CSW AddrInc field
pub mod addr_inc
{
	pub const OFF: u8 = 0b00;
	pub const SINGLE: u8 = 0b01;
	pub const PACKED: u8 = 0b10;
}

/// Access sizes of the CSW Size field
pub mod size
{
	pub const BYTE: u8 = 0b000;
	pub const HALFWORD: u8 = 0b001;
	pub const WORD: u8 = 0b010;
}

impl Csw
{
	/// Bytes to advance TAR by after a successful DRW access on this transport.
	///
	/// The dmem CoreSight bridge counts the stride in 16-bit units of the Size field rather than
	/// in access-size bytes, so a word access advances by 4, a halfword by 2 and a byte access by 0.
	pub fn increment(&self) -> u32
	{
		if self.addr_inc() == addr_inc::OFF {
			0
		} else {
			// Only the low 2 bits of Size take part in the stride
			u32::from(self.size() & 0x3) * 2
		}
	}
}
