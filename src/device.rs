// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-device state owned by the [`crate::registry::Driver`].

use std::time::Instant;

use crate::acquisition::AcquisitionEngine;
use crate::error::{Error, ErrorKind};
use crate::profile::Profile;
use crate::usb::{FirmwareGeneration, PortId};

/// Lifecycle status of a [`DeviceInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus
{
	/// Just discovered; firmware was uploaded and we're waiting for it to re-enumerate.
	Initializing,
	/// Firmware is present but the device hasn't been opened/claimed yet.
	Inactive,
	/// Device is open, claimed, and (possibly) acquiring.
	Active,
	/// Device vanished (e.g. failed to come back after firmware upload).
	NotFound,
}

/// One enabled-or-not, optionally-triggered probe, as supplied to [`DeviceInstance::configure_probes`].
#[derive(Debug, Clone)]
pub struct ProbeConfig
{
	/// 1-based probe index, `1..=profile.num_probes`.
	pub index: u8,
	pub enabled: bool,
	/// A string over `{'0', '1', '.'}`, one character per trigger stage, or `None`.
	pub trigger: Option<String>,
}

/// USB location/handle state for a [`DeviceInstance`].
#[derive(Debug, Default)]
pub struct UsbState
{
	pub bus_number: u8,
	/// `0xFF` means "not yet known, pre-renumeration".
	pub device_address: u8,
	pub device_info: Option<nusb::DeviceInfo>,
	pub device: Option<nusb::Device>,
	pub interface: Option<nusb::Interface>,
}

impl UsbState
{
	pub const ADDRESS_UNKNOWN: u8 = 0xFF;

	pub fn port_id(&self) -> Option<PortId>
	{
		self.device_info.as_ref().map(PortId::new)
	}
}

/// One discovered candidate device.
pub struct DeviceInstance
{
	pub index: usize,
	pub status: DeviceStatus,
	pub profile: &'static Profile,
	pub usb: UsbState,
	pub firmware_generation: Option<FirmwareGeneration>,
	/// `None` if firmware was already present when discovered.
	pub firmware_upload_time: Option<Instant>,
	pub current_samplerate: Option<u64>,
	/// `None` = unbounded.
	pub sample_limit: Option<u64>,
	pub probe_mask: u8,
	/// Per-stage trigger masks/values; empty means no trigger is configured and acquisitions
	/// start with an already-fired matcher.
	pub trigger_mask: Vec<u8>,
	pub trigger_value: Vec<u8>,
	/// Live acquisition state, present only between `acquisition_start` and full drain after
	/// `acquisition_stop`.
	pub engine: Option<AcquisitionEngine>,
}

impl DeviceInstance
{
	pub fn new(index: usize, profile: &'static Profile) -> Self
	{
		Self {
			index,
			status: DeviceStatus::Initializing,
			profile,
			usb: UsbState::default(),
			firmware_generation: None,
			firmware_upload_time: None,
			current_samplerate: None,
			sample_limit: None,
			probe_mask: 0,
			trigger_mask: Vec::new(),
			trigger_value: Vec::new(),
			engine: None,
		}
	}

	pub fn is_active(&self) -> bool
	{
		matches!(self.status, DeviceStatus::Active)
	}

	/// Builds `probe_mask` and the trigger stage masks/values from a probe list.
	///
	/// Fails with [`ErrorKind::TriggerTooLong`] if any trigger string is longer than
	/// `num_trigger_stages`, and with [`ErrorKind::InvalidArgument`] if a probe index is out of
	/// range. On error, no field on `self` is modified: `config_set` must not have side effects
	/// on device state when it fails.
	pub fn configure_probes(&mut self, probes: &[ProbeConfig], num_trigger_stages: usize) -> Result<(), Error>
	{
		let (probe_mask, mask, value) = build_trigger_state(probes, self.profile.num_probes, num_trigger_stages)?;

		self.probe_mask = probe_mask;
		self.trigger_mask = mask;
		self.trigger_value = value;

		Ok(())
	}

	/// Builds a fresh [`crate::trigger::TriggerMatcher`] from this device's currently-configured
	/// trigger stages, or one that has already fired if no trigger is configured.
	pub fn build_trigger_matcher(&self) -> crate::trigger::TriggerMatcher
	{
		if self.trigger_mask.is_empty() {
			crate::trigger::TriggerMatcher::already_fired()
		} else {
			crate::trigger::TriggerMatcher::new(self.trigger_mask.clone(), self.trigger_value.clone())
		}
	}
}

/// Pure helper behind [`DeviceInstance::configure_probes`], factored out so it can be unit
/// tested without any USB state.
fn build_trigger_state(
	probes: &[ProbeConfig],
	num_probes: u8,
	num_trigger_stages: usize,
) -> Result<(u8, Vec<u8>, Vec<u8>), Error>
{
	let mut probe_mask = 0u8;
	let mut mask = vec![0u8; num_trigger_stages];
	let mut value = vec![0u8; num_trigger_stages];
	let mut any_trigger = false;

	for probe in probes {
		if probe.index == 0 || probe.index > num_probes {
			return Err(ErrorKind::InvalidArgument(format!(
				"probe index {} out of range 1..={num_probes}",
				probe.index
			))
			.error());
		}
		if !probe.enabled {
			continue;
		}
		probe_mask |= 1 << (probe.index - 1);

		let Some(trigger) = &probe.trigger else {
			continue;
		};
		if trigger.len() > num_trigger_stages {
			return Err(ErrorKind::TriggerTooLong.error());
		}

		any_trigger = true;
		let bit = 1u8 << (probe.index - 1);
		for (stage, ch) in trigger.chars().enumerate() {
			match ch {
				'0' | '1' => {
					mask[stage] |= bit;
					if ch == '1' {
						value[stage] |= bit;
					}
				},
				'.' => {},
				other => {
					return Err(ErrorKind::InvalidArgument(format!("invalid trigger character '{other}'")).error());
				},
			}
		}
	}

	if !any_trigger {
		mask.clear();
		value.clear();
	} else {
		// Trim trailing all-zero stages so the matcher's "no more active stages" exhaustion
		// check (`trigger_mask[stage] == 0`) kicks in at the right point.
		while matches!(mask.last(), Some(0)) {
			mask.pop();
			value.pop();
		}
	}

	Ok((probe_mask, mask, value))
}

#[cfg(test)]
mod tests
{
	use super::*;

	fn probe(index: u8, enabled: bool, trigger: Option<&str>) -> ProbeConfig
	{
		ProbeConfig {
			index,
			enabled,
			trigger: trigger.map(String::from),
		}
	}

	#[test]
	fn probe_mask_counts_only_enabled_probes()
	{
		let probes = vec![probe(1, true, None), probe(2, false, None), probe(3, true, None)];
		let (mask, trigger_mask, _) = build_trigger_state(&probes, 8, 4).unwrap();
		assert_eq!(mask, 0b0000_0101);
		assert!(trigger_mask.is_empty());
	}

	#[test]
	fn no_trigger_strings_means_pass_through()
	{
		let probes = vec![probe(1, true, None)];
		let (_, mask, value) = build_trigger_state(&probes, 8, 4).unwrap();
		assert!(mask.is_empty());
		assert!(value.is_empty());
	}

	#[test]
	fn builds_stage_masks_from_trigger_string()
	{
		let probes = vec![probe(1, true, Some("01"))];
		let (_, mask, value) = build_trigger_state(&probes, 8, 4).unwrap();
		assert_eq!(mask, vec![0x01, 0x01]);
		assert_eq!(value, vec![0x00, 0x01]);
	}

	#[test]
	fn rejects_trigger_longer_than_stage_count()
	{
		let probes = vec![probe(1, true, Some("01010"))];
		let err = build_trigger_state(&probes, 8, 4).unwrap_err();
		assert!(matches!(err.kind, ErrorKind::TriggerTooLong));
	}

	#[test]
	fn rejects_out_of_range_probe_index()
	{
		let probes = vec![probe(9, true, None)];
		let err = build_trigger_state(&probes, 8, 4).unwrap_err();
		assert!(matches!(err.kind, ErrorKind::InvalidArgument(_)));
	}
}
