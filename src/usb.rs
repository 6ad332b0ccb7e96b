// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::{self, Display};

use nusb::DeviceInfo;
use nusb::transfer::Direction;

use crate::error::Error;

/// Simple newtype struct for some clarity in function arguments and whatnot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vid(pub u16);

/// Simple newtype struct for some clarity in function arguments and whatnot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u16);

/// The bulk OUT endpoint the sample-rate/divider command is written to.
pub const EP_COMMAND_OUT: u8 = 0x01;

/// The bulk IN endpoint the sample stream is read from.
pub const EP_SAMPLES_IN: u8 = 0x82;

/// Which generation of firmware a device is running.
///
/// Legacy firmware exposes 2 endpoints and uses an arithmetic divider and command byte 0x01;
/// new firmware exposes 4 endpoints and uses a lookup-table divider and command byte 0xD5. This
/// is a per-device flag rather than a process-wide one — see DESIGN.md for why the upstream
/// driver's single global flag is a known bug when devices of both generations are attached at
/// once.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FirmwareGeneration
{
	Legacy,
	New,
}

impl FirmwareGeneration
{
	/// The command byte written before the divider byte on [`EP_COMMAND_OUT`].
	pub fn rate_command_byte(self) -> u8
	{
		match self {
			FirmwareGeneration::Legacy => 0x01,
			FirmwareGeneration::New => 0xD5,
		}
	}
}

/// Implements the firmware-presence predicate this driver uses to decide whether a candidate
/// device already has firmware loaded.
///
/// A device "already has firmware" iff its active configuration has exactly one interface with
/// exactly one altsetting, whose endpoint count is 2 (legacy) or 4 (new), and whose first two
/// endpoints are bulk OUT #1 and bulk IN #2 respectively (modulo the direction bit, masked with
/// `0x8F`). Returns `None` if the device does not look like it has firmware yet (i.e. it should
/// be a candidate for firmware upload instead).
pub fn detect_firmware_generation(device: &nusb::Device) -> Result<Option<FirmwareGeneration>, Error>
{
	let configurations: Vec<_> = device.configurations().collect();
	if configurations.len() != 1 {
		return Ok(None);
	}
	let configuration = &configurations[0];

	let interfaces: Vec<_> = configuration.interfaces().collect();
	if interfaces.len() != 1 {
		return Ok(None);
	}

	let alt_settings: Vec<_> = interfaces[0].alt_settings().collect();
	if alt_settings.len() != 1 {
		return Ok(None);
	}
	let alt_setting = &alt_settings[0];

	let endpoints: Vec<_> = alt_setting.endpoints().collect();
	let generation = match endpoints.len() {
		2 => FirmwareGeneration::Legacy,
		4 => FirmwareGeneration::New,
		_ => return Ok(None),
	};

	// bEndpointAddress masked with 0x8F: low nibble is the endpoint number, bit 7 is direction.
	let ep0_matches = (endpoints[0].address() & 0x8F) == (0x01 | direction_bit(Direction::Out));
	let ep1_matches = (endpoints[1].address() & 0x8F) == (0x02 | direction_bit(Direction::In));

	if ep0_matches && ep1_matches {
		Ok(Some(generation))
	} else {
		Ok(None)
	}
}

fn direction_bit(direction: Direction) -> u8
{
	match direction {
		Direction::Out => 0x00,
		Direction::In => 0x80,
	}
}

/// Abstraction of an arbitrary nusb device's location on the host system, used to re-locate a
/// device across renumeration — waiting for a device that just received firmware to re-appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortId
{
	pub bus_number: u8,
	pub device_address: u8,
}

impl PortId
{
	pub fn new(device: &DeviceInfo) -> Self
	{
		Self {
			bus_number: device.bus_number(),
			device_address: device.device_address(),
		}
	}
}

impl Display for PortId
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		write!(f, "{}-{}", self.bus_number, self.device_address)
	}
}
