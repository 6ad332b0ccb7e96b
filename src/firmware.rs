// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cypress FX2 firmware upload: a black-box `upload(device, image) -> ok|err` helper.
//!
//! Implements the FX2 bootloader vendor-request protocol commonly called "fxload": hold the
//! on-chip 8051 core in reset via its CPUCS register, write the firmware image into external RAM
//! in chunks via vendor request 0xA0, then release the core from reset.

use futures_lite::future::block_on;
use log::{debug, info};
use nusb::transfer::{ControlOut, ControlType, Recipient};

use crate::error::{Error, ErrorKind};
use crate::firmware_file::FirmwareFile;

/// Address of the FX2's CPU control & status register; writing 1 holds the 8051 in reset,
/// writing 0 releases it.
const CPUCS_ADDRESS: u16 = 0xE600;

/// The vendor request implementing the external-RAM write, per the FX2 bootloader convention.
const VENDOR_REQUEST_ANCHOR_LOAD: u8 = 0xA0;

/// Maximum payload per control transfer chunk while loading firmware.
const CHUNK_LEN: usize = 4096;

/// Uploads a parsed firmware image into a device sitting in its bootloader/un-programmed state.
///
/// The device is expected to disconnect and re-enumerate under its post-firmware VID/PID shortly
/// after this returns; the caller does not wait for that here — the re-enumeration wait happens
/// in `open`, not `init`.
pub fn upload(device: &nusb::Device, image: &FirmwareFile) -> Result<(), Error>
{
	let interface = device.claim_interface(0)?;
	let load_address = image.load_address().unwrap_or(0);
	let data = image.firmware_data();

	debug!("holding FX2 core in reset");
	write_ram(&interface, CPUCS_ADDRESS, &[0x01])?;

	info!("uploading {} bytes of firmware at 0x{load_address:04x}", data.len());
	for (chunk_index, chunk) in data.chunks(CHUNK_LEN).enumerate() {
		let address = load_address.wrapping_add((chunk_index * CHUNK_LEN) as u32);
		let address = u16::try_from(address).map_err(|_| {
			ErrorKind::InvalidFirmware(format!(
				"firmware image address 0x{address:08x} exceeds the FX2's 16-bit address space"
			))
			.error()
		})?;
		write_ram(&interface, address, chunk)?;
	}

	debug!("releasing FX2 core from reset");
	write_ram(&interface, CPUCS_ADDRESS, &[0x00])?;

	Ok(())
}

fn write_ram(interface: &nusb::Interface, address: u16, data: &[u8]) -> Result<(), Error>
{
	let completion = block_on(interface.control_out(ControlOut {
		control_type: ControlType::Vendor,
		recipient: Recipient::Device,
		request: VENDOR_REQUEST_ANCHOR_LOAD,
		value: address,
		index: 0,
		data,
	}));
	completion.status?;
	Ok(())
}
