// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pure sample-rate -> clock-divider translation.

use crate::error::{Error, ErrorKind};
use crate::usb::FirmwareGeneration;

/// The exact set of sample rates this driver (and the firmware it talks to) supports.
pub const SUPPORTED_RATES_HZ: &[u64] = &[
	200_000,
	250_000,
	500_000,
	1_000_000,
	2_000_000,
	4_000_000,
	8_000_000,
	12_000_000,
	16_000_000,
	24_000_000,
];

/// New-firmware divider lookup table.
fn new_firmware_divider(rate_hz: u64) -> Option<u8>
{
	Some(match rate_hz {
		24_000_000 => 0xE0,
		16_000_000 => 0xD5,
		12_000_000 => 0xE2,
		8_000_000 => 0xD4,
		4_000_000 => 0xDA,
		2_000_000 => 0xE6,
		1_000_000 => 0x8E,
		500_000 => 0xFE,
		250_000 => 0x9E,
		200_000 => 0x4E,
		_ => return None,
	})
}

/// Legacy-firmware divider: `floor(48 / rate_MHz) - 1`.
fn legacy_firmware_divider(rate_hz: u64) -> Option<u8>
{
	if !SUPPORTED_RATES_HZ.contains(&rate_hz) {
		return None;
	}

	// Do the division in units of 1/1_000_000 MHz to stay exact for the sub-MHz rates
	// (200 kHz, 250 kHz, 500 kHz) without resorting to floating point.
	let divider = (48_000_000 / rate_hz) - 1;
	u8::try_from(divider).ok()
}

/// Translate a requested sample rate into the one-byte clock divider for the given firmware
/// generation. Fails with [`ErrorKind::UnsupportedSampleRate`] for any rate not in
/// [`SUPPORTED_RATES_HZ`].
pub fn divider(rate_hz: u64, generation: FirmwareGeneration) -> Result<u8, Error>
{
	let divider = match generation {
		FirmwareGeneration::Legacy => legacy_firmware_divider(rate_hz),
		FirmwareGeneration::New => new_firmware_divider(rate_hz),
	};

	divider.ok_or_else(|| ErrorKind::UnsupportedSampleRate(rate_hz).error())
}

/// The slowest sample rate this driver supports, used as the default once a device is opened
/// and no rate has been configured yet.
pub fn slowest_supported_rate() -> u64
{
	*SUPPORTED_RATES_HZ.iter().min().expect("SUPPORTED_RATES_HZ is never empty")
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn new_firmware_matches_table_exactly()
	{
		assert_eq!(divider(24_000_000, FirmwareGeneration::New).unwrap(), 0xE0);
		assert_eq!(divider(200_000, FirmwareGeneration::New).unwrap(), 0x4E);
		assert_eq!(divider(16_000_000, FirmwareGeneration::New).unwrap(), 0xD5);
		assert_eq!(divider(1_000_000, FirmwareGeneration::New).unwrap(), 0x8E);
	}

	#[test]
	fn legacy_firmware_follows_arithmetic_rule()
	{
		// 48/24 - 1 = 1, 48/0.2 - 1 = 239.
		assert_eq!(divider(24_000_000, FirmwareGeneration::Legacy).unwrap(), 0x01);
		assert_eq!(divider(200_000, FirmwareGeneration::Legacy).unwrap(), 0xEF);

		for &rate in SUPPORTED_RATES_HZ {
			let expected = (48_000_000u64 / rate) - 1;
			assert_eq!(divider(rate, FirmwareGeneration::Legacy).unwrap(), expected as u8);
		}
	}

	#[test]
	fn rejects_unsupported_rate()
	{
		let err = divider(3_000_000, FirmwareGeneration::New).unwrap_err();
		assert!(matches!(err.kind, ErrorKind::UnsupportedSampleRate(3_000_000)));

		let err = divider(3_000_000, FirmwareGeneration::Legacy).unwrap_err();
		assert!(matches!(err.kind, ErrorKind::UnsupportedSampleRate(3_000_000)));
	}

	#[test]
	fn is_total_on_supported_set()
	{
		for &rate in SUPPORTED_RATES_HZ {
			assert!(divider(rate, FirmwareGeneration::New).is_ok());
			assert!(divider(rate, FirmwareGeneration::Legacy).is_ok());
		}
	}
}
