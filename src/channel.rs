// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

//! Raw 8-byte register access to the rshim dmem device.
//!
//! The device exposes each rshim channel as a 64KiB aperture of the device file, selected by the
//! channel number sitting above a 16-bit register offset. Kernels whose driver does not implement
//! positional I/O on the file instead take a small request record through `ioctl()`. Which of
//! the two a device needs is decided once, when it is opened, by [`open_device`].

use std::io;

/// Rshim channel where the CoreSight control register resides
pub const RSH_MMIO_CHANNEL_RSHIM: u8 = 0x1;

/// Types implementing this trait can perform addressed 8-byte transactions on a dmem channel
pub trait DmemChannel
{
	/// Read the 64-bit register at `offset` in the aperture of `channel`
	fn read(&mut self, channel: u8, offset: u16) -> io::Result<u64>;
	/// Write `value` to the 64-bit register at `offset` in the aperture of `channel`
	fn write(&mut self, channel: u8, offset: u16, value: u64) -> io::Result<()>;
}

impl<T: DmemChannel + ?Sized> DmemChannel for Box<T>
{
	fn read(&mut self, channel: u8, offset: u16) -> io::Result<u64>
	{
		(**self).read(channel, offset)
	}

	fn write(&mut self, channel: u8, offset: u16, value: u64) -> io::Result<()>
	{
		(**self).write(channel, offset, value)
	}
}

/// Compute the device file position of a register in a channel's aperture
pub const fn aperture_address(channel: u8, offset: u16) -> u32
{
	((channel as u32) << 16) | offset as u32
}

#[cfg(unix)]
pub use self::device::{DeviceFile, IoctlChannel, PositionalChannel, open_device, select_channel};

#[cfg(unix)]
mod device
{
	use std::fs::File;
	use std::io;
	use std::os::unix::fs::{FileExt, OpenOptionsExt};
	use std::os::unix::io::AsRawFd;
	use std::path::{Path, PathBuf};

	use log::{debug, warn};

	use super::{DmemChannel, RSH_MMIO_CHANNEL_RSHIM, aperture_address};
	use crate::coresight::RSH_CORESIGHT_CTL;
	use crate::error::DapError;

	/// Message used to program dmem via `ioctl()`
	#[repr(C, packed)]
	#[derive(Debug, Copy, Clone)]
	struct DmemIoctlMsg
	{
		addr: u32,
		data: u64,
	}

	mod ioctls
	{
		use std::os::raw::c_ulong;

		const IOC_READ_WRITE: c_ulong = 3;

		/// Helper to create an ioctl number: _IOWR(type, nr, size)
		///
		/// This is the generic Linux layout. powerpc, mips and sparc use a 3-bit direction field at
		/// bit 29 with read and write as 0b110, which encodes the same top bits, and their 13-bit size
		/// field holds any request record below 8KiB, so for those the numbers come out identical.
		const fn iowr(ty: u8, nr: u8, size: usize) -> c_ulong
		{
			(IOC_READ_WRITE << 30) | ((size as c_ulong) << 16) | ((ty as c_ulong) << 8) | (nr as c_ulong)
		}

		const MSG_SIZE: usize = std::mem::size_of::<super::DmemIoctlMsg>();

		pub const RSH_IOC_READ: c_ulong = iowr(b'R', 0, MSG_SIZE);
		pub const RSH_IOC_WRITE: c_ulong = iowr(b'R', 1, MSG_SIZE);
	}

	/// An open handle on a dmem device file
	#[derive(Debug)]
	pub struct DeviceFile
	{
		handle: File,
		path: PathBuf,
	}

	impl DeviceFile
	{
		/// Open the device read-write with synchronous I/O semantics
		pub fn open(path: &Path) -> Result<Self, DapError>
		{
			let handle = File::options()
				.read(true)
				.write(true)
				.custom_flags(libc::O_SYNC)
				.open(path)
				.map_err(|error| DapError::open(path.to_path_buf(), error))?;
			debug!("Opened dmem device {}", path.display());

			Ok(Self {
				handle,
				path: path.to_path_buf(),
			})
		}

		pub fn path(&self) -> &Path
		{
			&self.path
		}
	}

	/// Channel access through `pread()`/`pwrite()` on the device file
	#[derive(Debug)]
	pub struct PositionalChannel(DeviceFile);

	impl From<DeviceFile> for PositionalChannel
	{
		fn from(device: DeviceFile) -> Self
		{
			Self(device)
		}
	}

	impl DmemChannel for PositionalChannel
	{
		fn read(&mut self, channel: u8, offset: u16) -> io::Result<u64>
		{
			let mut buffer = [0u8; 8];
			self.0
				.handle
				.read_exact_at(&mut buffer, aperture_address(channel, offset).into())?;
			Ok(u64::from_ne_bytes(buffer))
		}

		fn write(&mut self, channel: u8, offset: u16, value: u64) -> io::Result<()>
		{
			self.0
				.handle
				.write_all_at(&value.to_ne_bytes(), aperture_address(channel, offset).into())
		}
	}

	/// Channel access through the driver's read/write request `ioctl()`s, for drivers that do not
	/// implement positional I/O
	#[derive(Debug)]
	pub struct IoctlChannel(DeviceFile);

	impl From<DeviceFile> for IoctlChannel
	{
		fn from(device: DeviceFile) -> Self
		{
			Self(device)
		}
	}

	impl IoctlChannel
	{
		fn request(&self, request: libc::c_ulong, message: &mut DmemIoctlMsg) -> io::Result<()>
		{
			// SAFETY: the request numbers are _IOWR with the size of DmemIoctlMsg, which matches the
			// driver's packed layout, and `message` is a valid exclusive reference for the call.
			let result = unsafe { libc::ioctl(self.0.handle.as_raw_fd(), request as _, message as *mut DmemIoctlMsg) };
			if result < 0 {
				Err(io::Error::last_os_error())
			} else {
				Ok(())
			}
		}
	}

	impl DmemChannel for IoctlChannel
	{
		fn read(&mut self, channel: u8, offset: u16) -> io::Result<u64>
		{
			let mut message = DmemIoctlMsg {
				addr: aperture_address(channel, offset),
				data: 0,
			};
			self.request(ioctls::RSH_IOC_READ, &mut message)?;
			Ok(message.data)
		}

		fn write(&mut self, channel: u8, offset: u16, value: u64) -> io::Result<()>
		{
			let mut message = DmemIoctlMsg {
				addr: aperture_address(channel, offset),
				data: value,
			};
			self.request(ioctls::RSH_IOC_WRITE, &mut message)
		}
	}

	fn is_unsupported(error: &io::Error) -> bool
	{
		error.raw_os_error() == Some(libc::ENOSYS)
	}

	/// Pick between two ways of reaching the same device by reading the CoreSight control register,
	/// which has no side effects.
	///
	/// `primary` is used if that read succeeds. If it fails with `ENOSYS`, `primary` is turned into
	/// the fallback channel, which must then pass the same read. Any other failure is returned.
	pub fn select_channel<Primary, Fallback>(
		mut primary: Primary,
		into_fallback: impl FnOnce(Primary) -> Fallback,
	) -> Result<Box<dyn DmemChannel>, DapError>
	where
		Primary: DmemChannel + 'static,
		Fallback: DmemChannel + 'static,
	{
		match primary.read(RSH_MMIO_CHANNEL_RSHIM, RSH_CORESIGHT_CTL) {
			Ok(_) => Ok(Box::new(primary)),
			Err(error) if is_unsupported(&error) => {
				let mut fallback = into_fallback(primary);
				fallback.read(RSH_MMIO_CHANNEL_RSHIM, RSH_CORESIGHT_CTL).map_err(|error| {
					DapError::transport("read", RSH_MMIO_CHANNEL_RSHIM, RSH_CORESIGHT_CTL, error)
				})?;
				warn!("Positional I/O is not supported, falling back to ioctl() requests");
				Ok(Box::new(fallback))
			},
			Err(error) => Err(DapError::transport("read", RSH_MMIO_CHANNEL_RSHIM, RSH_CORESIGHT_CTL, error)),
		}
	}

	/// Open the dmem device at `path` and work out which form of channel access it supports.
	///
	/// On any failure the device handle is closed again before returning.
	pub fn open_device(path: &Path) -> Result<Box<dyn DmemChannel>, DapError>
	{
		let device = DeviceFile::open(path)?;
		let channel = select_channel(PositionalChannel::from(device), |positional| IoctlChannel::from(positional.0))?;
		debug!("Opened dmem channel on {}", path.display());
		Ok(channel)
	}

}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn coresight_control_aperture()
	{
		// The control register sits in the rshim channel's aperture, above the 16-bit offset
		assert_eq!(aperture_address(RSH_MMIO_CHANNEL_RSHIM, 0x0e00), 0x0001_0e00);
		assert_eq!(aperture_address(0, 0xffff), 0x0000_ffff);
	}
}
