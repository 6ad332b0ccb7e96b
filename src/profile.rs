// SPDX-License-Identifier: MIT OR Apache-2.0
//! The static table of supported device profiles.

use crate::usb::{Pid, Vid};

/// Immutable descriptor identifying a supported device model and its USB identifiers before and
/// after firmware upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile
{
	/// VID presented before firmware has been loaded.
	pub orig_vid: Vid,
	/// PID presented before firmware has been loaded.
	pub orig_pid: Pid,
	/// VID presented once firmware is running.
	pub fw_vid: Vid,
	/// PID presented once firmware is running.
	pub fw_pid: Pid,
	pub vendor: &'static str,
	pub model: &'static str,
	pub version: &'static str,
	pub num_probes: u8,
}

/// The built-in table of supported Cypress FX2-based logic analyzers.
///
/// This mirrors the `fx2lafw` upstream device list: the Saleae Logic (and Logic16, restricted
/// here to its 8 lowest probes — no 16-channel support, since the Saleae firmware this driver
/// talks to is 8-channel), and a couple of well-known bare Cypress FX2 development boards that
/// the same firmware image also targets.
pub const PROFILES: &[Profile] = &[
	Profile {
		orig_vid: Vid(0x0925),
		orig_pid: Pid(0x3881),
		fw_vid: Vid(0x0925),
		fw_pid: Pid(0x3881),
		vendor: "Saleae",
		model: "Logic",
		version: "1.0",
		num_probes: 8,
	},
	Profile {
		orig_vid: Vid(0x21a9),
		orig_pid: Pid(0x1001),
		fw_vid: Vid(0x21a9),
		fw_pid: Pid(0x1001),
		vendor: "Saleae",
		model: "Logic16",
		version: "1.0",
		num_probes: 8,
	},
	Profile {
		orig_vid: Vid(0x04b4),
		orig_pid: Pid(0x8613),
		fw_vid: Vid(0x08a9),
		fw_pid: Pid(0x0008),
		vendor: "Cypress",
		model: "FX2",
		version: "1.0",
		num_probes: 8,
	},
];

impl Profile
{
	/// Look up a profile by the VID/PID a not-yet-firmware-loaded device presents.
	pub fn match_unprogrammed(vid: Vid, pid: Pid) -> Option<&'static Profile>
	{
		PROFILES.iter().find(|p| p.orig_vid == vid && p.orig_pid == pid)
	}

	/// Look up a profile by the VID/PID a firmware-loaded device presents.
	pub fn match_programmed(vid: Vid, pid: Pid) -> Option<&'static Profile>
	{
		PROFILES.iter().find(|p| p.fw_vid == vid && p.fw_pid == pid)
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn matches_known_unprogrammed_device()
	{
		let profile = Profile::match_unprogrammed(Vid(0x0925), Pid(0x3881)).expect("should match Saleae Logic");
		assert_eq!(profile.vendor, "Saleae");
		assert_eq!(profile.num_probes, 8);
	}

	#[test]
	fn rejects_unknown_device()
	{
		assert!(Profile::match_unprogrammed(Vid(0xdead), Pid(0xbeef)).is_none());
		assert!(Profile::match_programmed(Vid(0xdead), Pid(0xbeef)).is_none());
	}

	#[test]
	fn no_profile_exceeds_eight_probes()
	{
		// No support for more than eight probes even when the Cypress descriptor would allow
		// sixteen: the Saleae firmware this driver talks to is 8-channel.
		for profile in PROFILES {
			assert!(profile.num_probes <= 8);
		}
	}
}
