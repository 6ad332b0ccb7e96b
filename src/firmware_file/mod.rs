// SPDX-License-Identifier: MIT OR Apache-2.0
//! Firmware image parsing: the two image formats upstream fx2lafw's loader helper accepts.
//! fx2lafw firmware is never an ELF, so only the raw-binary and Intel HEX formats are supported
//! here.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

mod ihex;
mod raw;

use self::ihex::IntelHexFirmwareFile;
use self::raw::RawFirmwareFile;
use crate::error::{Error, ErrorKind};

trait FirmwareStorage
{
	fn load_address(&self) -> Option<u32>;
	fn firmware_data(&self) -> &[u8];
}

/// A parsed firmware image, flattened into one contiguous byte buffer ready to be chunked and
/// written into an FX2's external RAM by the firmware-upload helper.
pub struct FirmwareFile
{
	inner: Box<dyn FirmwareStorage>,
}

impl FirmwareFile
{
	/// Construct a FirmwareFile from a path to a file. The format (raw binary vs Intel HEX) is
	/// sniffed from the first byte: Intel HEX records always start with `:`.
	pub fn from_path(file_name: &Path) -> Result<Self, Error>
	{
		let map_io = |filename: &Path| {
			move |_: std::io::Error| ErrorKind::FirmwareFileIo(Some(filename.display().to_string())).error()
		};

		let mut file = File::open(file_name).map_err(map_io(file_name))?;

		let mut signature = [0u8; 1];
		let _ = file.read(&mut signature).map_err(map_io(file_name))?;
		file.rewind().map_err(map_io(file_name))?;

		let storage: Box<dyn FirmwareStorage> = if signature == *b":" {
			Box::new(IntelHexFirmwareFile::try_from(file).map_err(|e| ErrorKind::InvalidFirmware(e.to_string()).error())?)
		} else {
			Box::new(RawFirmwareFile::try_from(file).map_err(|e| ErrorKind::InvalidFirmware(e.to_string()).error())?)
		};

		Ok(Self {
			inner: storage,
		})
	}

	pub fn load_address(&self) -> Option<u32>
	{
		self.inner.load_address()
	}

	/// Provides the firmware data this file holds, flattened and ready to be written into device
	/// memory starting at [`Self::load_address`] (or address 0 if `None`).
	pub fn firmware_data(&self) -> &[u8]
	{
		self.inner.firmware_data()
	}
}
