// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tunable constants for the Device Registry and Acquisition Engine.

use std::time::Duration;

/// Host-supplied tunables for the Device Registry and Acquisition Engine.
///
/// There is no file-based config layer here: the driver core is a library embedded by a host
/// application (a sigrok session, a CLI, a GUI), and that host is expected to supply an
/// `EngineOptions` the way it already supplies USB configuration/interface numbers and a
/// firmware path.
#[derive(Debug, Clone)]
pub struct EngineOptions
{
	/// Maximum trigger-pattern depth. Exceeding it is `ERR_ARG` (`ErrorKind::TriggerTooLong`).
	pub num_trigger_stages: usize,

	/// Size of the in-flight bulk IN transfer pool.
	pub num_simul_transfers: usize,

	/// Consecutive zero-length completions tolerated before the empty-transfer watchdog trips
	/// and auto-stops the acquisition.
	pub max_empty_transfers: u32,

	/// Upper bound on waiting for USB re-enumeration after firmware upload.
	pub max_renum_delay: Duration,

	/// USB configuration number to select when claiming the device.
	pub usb_configuration: u8,

	/// USB interface number to claim.
	pub usb_interface: u8,

	/// Per-transfer timeout for bulk IN reads.
	///
	/// Not currently enforced: `nusb`'s transfer queue has no per-transfer timeout knob to hand
	/// this to (see DESIGN.md's Open Question decisions). Kept on `EngineOptions` for a future
	/// software-timeout implementation rather than removed.
	pub transfer_timeout: Duration,
}

impl Default for EngineOptions
{
	fn default() -> Self
	{
		Self {
			num_trigger_stages: 4,
			num_simul_transfers: 8,
			max_empty_transfers: 3,
			max_renum_delay: Duration::from_millis(2500),
			usb_configuration: 1,
			usb_interface: 0,
			transfer_timeout: Duration::from_millis(40),
		}
	}
}

impl EngineOptions
{
	#[must_use]
	pub fn num_trigger_stages(mut self, stages: usize) -> Self
	{
		self.num_trigger_stages = stages;
		self
	}

	#[must_use]
	pub fn num_simul_transfers(mut self, count: usize) -> Self
	{
		self.num_simul_transfers = count;
		self
	}

	#[must_use]
	pub fn max_empty_transfers(mut self, count: u32) -> Self
	{
		self.max_empty_transfers = count;
		self
	}

	#[must_use]
	pub fn max_renum_delay(mut self, delay: Duration) -> Self
	{
		self.max_renum_delay = delay;
		self
	}
}
