// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Device Registry: owns every discovered [`DeviceInstance`] and exposes the host-facing
//! lifecycle API.
//!
//! This replaces the upstream driver's process-wide `dev_insts` list and `new_saleae_logic_firmware`
//! flag with a plain owned struct.

use std::thread::sleep;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::acquisition::{AcquisitionEngine, PumpOutcome};
use crate::config::EngineOptions;
use crate::device::{DeviceInstance, DeviceStatus, ProbeConfig, UsbState};
use crate::error::{Error, ErrorKind};
use crate::firmware;
use crate::firmware_file::FirmwareFile;
use crate::packet::SessionSink;
use crate::profile::Profile;
use crate::rate;
use crate::usb::{FirmwareGeneration, Pid, PortId, Vid, detect_firmware_generation};

/// Keys recognized by [`Driver::info_get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKey
{
	Instance,
	NumProbes,
	ProbeNames,
	Samplerates,
	TriggerTypes,
	CurSamplerate,
}

/// The value returned by [`Driver::info_get`], tagged by the [`InfoKey`] that was asked for.
#[derive(Debug, Clone)]
pub enum Info
{
	Instance(usize),
	NumProbes(u8),
	ProbeNames(Vec<String>),
	Samplerates(&'static [u64]),
	TriggerTypes(&'static str),
	CurSamplerate(u64),
}

/// Values accepted by [`Driver::config_set`].
#[derive(Debug, Clone)]
pub enum ConfigValue
{
	SampleRate(u64),
	ProbeConfig(Vec<ProbeConfig>),
	LimitSamples(u64),
}

/// The static capability set this driver reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability
{
	LogicAnalyzer,
	Samplerate,
	LimitSamples,
	Continuous,
}

/// The full, fixed capability set this driver supports.
pub const HWCAPS: &[Capability] =
	&[Capability::LogicAnalyzer, Capability::Samplerate, Capability::LimitSamples, Capability::Continuous];

/// The characters recognized in a per-probe trigger string.
pub const TRIGGER_TYPES: &str = "01.";

/// Owns every discovered candidate device and drives their acquisitions.
pub struct Driver
{
	devices: Vec<DeviceInstance>,
	options: EngineOptions,
}

impl Driver
{
	pub fn new(options: EngineOptions) -> Self
	{
		Self {
			devices: Vec::new(),
			options,
		}
	}

	/// Scans the USB bus for candidate devices, uploading `firmware` into any that need it.
	/// Never aborts on a per-device failure — logs and continues. Returns the number of
	/// candidates registered.
	pub fn init(&mut self, firmware_image: Option<&FirmwareFile>) -> Result<usize, Error>
	{
		self.devices.clear();

		for info in nusb::list_devices()? {
			let vid = Vid(info.vendor_id());
			let pid = Pid(info.product_id());
			let Some(profile) = Profile::match_unprogrammed(vid, pid).or_else(|| Profile::match_programmed(vid, pid))
			else {
				continue;
			};

			let port = PortId::new(&info);
			match Self::probe_candidate(&info, firmware_image, self.options.usb_configuration) {
				Ok((status, generation)) => {
					let index = self.devices.len();
					let mut instance = DeviceInstance::new(index, profile);
					instance.usb.device_info = Some(info);
					instance.firmware_generation = generation;
					instance.status = status;

					if status == DeviceStatus::Initializing {
						instance.usb.bus_number = port.bus_number;
						instance.usb.device_address = UsbState::ADDRESS_UNKNOWN;
						instance.firmware_upload_time = Some(Instant::now());
						debug!("{port}: firmware uploaded, awaiting re-enumeration");
					} else {
						instance.usb.bus_number = port.bus_number;
						instance.usb.device_address = port.device_address;
						debug!("{port}: firmware already present ({generation:?})");
					}

					info!("registered candidate device {index} at {port} ({} {})", profile.vendor, profile.model);
					self.devices.push(instance);
				},
				Err(err) => {
					warn!("skipping candidate device at {port}: {err}");
				},
			}
		}

		Ok(self.devices.len())
	}

	fn probe_candidate(
		info: &nusb::DeviceInfo,
		firmware_image: Option<&FirmwareFile>,
		usb_configuration: u8,
	) -> Result<(DeviceStatus, Option<FirmwareGeneration>), Error>
	{
		let device = info.open()?;

		if let Some(generation) = detect_firmware_generation(&device)? {
			return Ok((DeviceStatus::Inactive, Some(generation)));
		}

		device.set_configuration(usb_configuration)?;

		let image = firmware_image.ok_or_else(|| {
			ErrorKind::DeviceSeemsInvalid("no firmware present and no firmware image was supplied to init".into())
				.error()
		})?;
		firmware::upload(&device, image)?;

		Ok((DeviceStatus::Initializing, None))
	}

	/// Opens a device for acquisition: waits for re-enumeration if the device just received
	/// firmware, claims the interface, and defaults the sample rate.
	pub fn open(&mut self, index: usize) -> Result<(), Error>
	{
		let was_initializing = self.device(index)?.status == DeviceStatus::Initializing;

		let port = if was_initializing {
			self.wait_for_renumeration(index)?
		} else {
			self.device(index)?.usb.port_id().ok_or_else(|| ErrorKind::DeviceNotFound.error())?
		};

		let info = nusb::list_devices()?
			.find(|candidate| PortId::new(candidate) == port)
			.ok_or_else(|| ErrorKind::DeviceDisconnected.error())?;

		let device = info.open()?;
		device.set_configuration(self.options.usb_configuration)?;
		let interface = device.claim_interface(self.options.usb_interface)?;

		let instance = &mut self.devices[index];
		instance.usb.bus_number = port.bus_number;
		instance.usb.device_address = port.device_address;
		instance.usb.device_info = Some(info);
		instance.usb.device = Some(device);
		instance.usb.interface = Some(interface);
		instance.status = DeviceStatus::Active;
		if instance.current_samplerate.is_none() {
			instance.current_samplerate = Some(rate::slowest_supported_rate());
		}

		info!("device {index} opened at {port}");
		Ok(())
	}

	/// Sleeps 300 ms, then polls every 100 ms up to `max_renum_delay`, looking for a device
	/// presenting the profile's post-firmware VID/PID that isn't already claimed by another
	/// instance in this registry.
	fn wait_for_renumeration(&self, index: usize) -> Result<PortId, Error>
	{
		let profile = self.device(index)?.profile;
		let claimed: Vec<PortId> =
			self.devices.iter().filter(|d| d.status == DeviceStatus::Active).filter_map(|d| d.usb.port_id()).collect();

		let deadline = Instant::now() + self.options.max_renum_delay;
		sleep(Duration::from_millis(300));

		loop {
			let found = nusb::list_devices()?
				.filter(|info| Vid(info.vendor_id()) == profile.fw_vid && Pid(info.product_id()) == profile.fw_pid)
				.map(|info| PortId::new(&info))
				.find(|port| !claimed.contains(port));

			if let Some(port) = found {
				return Ok(port);
			}

			if Instant::now() >= deadline {
				return Err(ErrorKind::RenumerationTimedOut.error());
			}
			sleep(Duration::from_millis(100));
		}
	}

	/// Releases the interface and USB handle, returning the device to INACTIVE.
	pub fn close(&mut self, index: usize) -> Result<(), Error>
	{
		let instance = self.device_mut(index)?;
		if instance.engine.is_some() {
			return Err(ErrorKind::AcquisitionAlreadyRunning.error());
		}

		instance.usb.interface = None;
		instance.usb.device = None;
		instance.status = DeviceStatus::Inactive;
		debug!("device {index} closed");
		Ok(())
	}

	/// Closes every device, frees its descriptor, and clears the registry.
	pub fn cleanup(&mut self)
	{
		for instance in &mut self.devices {
			instance.engine = None;
			instance.usb.interface = None;
			instance.usb.device = None;
		}
		self.devices.clear();
		info!("registry cleaned up");
	}

	pub fn status_get(&self, index: usize) -> DeviceStatus
	{
		self.devices.get(index).map_or(DeviceStatus::NotFound, |d| d.status)
	}

	/// True while an acquisition engine is live on `index` — i.e. between `acquisition_start`
	/// and the poll that observes it fully drain (or an explicit `acquisition_stop` followed by
	/// drain). Unlike [`Self::status_get`], this reflects whether streaming is actually running,
	/// not just whether the device is open and claimed.
	pub fn is_acquiring(&self, index: usize) -> bool
	{
		self.devices.get(index).is_some_and(|d| d.engine.is_some())
	}

	pub fn hwcap_get_all(&self) -> &'static [Capability]
	{
		HWCAPS
	}

	pub fn info_get(&self, index: usize, key: InfoKey) -> Result<Info, Error>
	{
		let instance = self.device(index)?;
		Ok(match key {
			InfoKey::Instance => Info::Instance(instance.index),
			InfoKey::NumProbes => Info::NumProbes(instance.profile.num_probes),
			InfoKey::ProbeNames => {
				Info::ProbeNames((0..instance.profile.num_probes).map(|n| format!("D{n}")).collect())
			},
			InfoKey::Samplerates => Info::Samplerates(rate::SUPPORTED_RATES_HZ),
			InfoKey::TriggerTypes => Info::TriggerTypes(TRIGGER_TYPES),
			InfoKey::CurSamplerate => Info::CurSamplerate(instance.current_samplerate.unwrap_or(0)),
		})
	}

	/// Applies one configuration change. On error, no field on the device is modified.
	pub fn config_set(&mut self, index: usize, value: ConfigValue) -> Result<(), Error>
	{
		match value {
			ConfigValue::SampleRate(rate_hz) => {
				let instance = self.device(index)?;
				let generation = instance.firmware_generation.unwrap_or(FirmwareGeneration::New);
				rate::divider(rate_hz, generation)?;
				self.device_mut(index)?.current_samplerate = Some(rate_hz);
			},
			ConfigValue::ProbeConfig(probes) => {
				let num_trigger_stages = self.options.num_trigger_stages;
				self.device_mut(index)?.configure_probes(&probes, num_trigger_stages)?;
			},
			ConfigValue::LimitSamples(limit) => {
				self.device_mut(index)?.sample_limit = if limit == 0 { None } else { Some(limit) };
			},
		}
		Ok(())
	}

	/// Writes the configured sample rate's clock divider to the device, using the sample rate
	/// and firmware generation already recorded on the device.
	pub fn apply_samplerate(&mut self, index: usize) -> Result<(), Error>
	{
		use futures_lite::future::block_on;

		use crate::usb::EP_COMMAND_OUT;

		let instance = self.device(index)?;
		let rate_hz = instance.current_samplerate.unwrap_or_else(rate::slowest_supported_rate);
		let generation = instance.firmware_generation.ok_or_else(|| ErrorKind::DeviceNotFound.error())?;
		let divider = rate::divider(rate_hz, generation)?;
		let interface = instance.usb.interface.as_ref().ok_or_else(|| ErrorKind::DeviceNotFound.error())?;

		let mut queue = interface.bulk_out_queue(EP_COMMAND_OUT);
		queue.submit(vec![generation.rate_command_byte(), divider]);
		let completion = block_on(queue.next_complete());
		completion.status?;

		Ok(())
	}

	/// Starts streaming on `index`. Fails with [`ErrorKind::AcquisitionAlreadyRunning`] if an
	/// acquisition is already in progress on this device — tracked per-device, lifting the
	/// upstream single-active-acquisition assumption.
	pub fn acquisition_start(&mut self, index: usize, sink: &mut dyn SessionSink) -> Result<(), Error>
	{
		let Self { devices, options } = self;
		let instance = devices.get_mut(index).ok_or_else(|| ErrorKind::DeviceNotFound.error())?;

		if instance.engine.is_some() {
			return Err(ErrorKind::AcquisitionAlreadyRunning.error());
		}
		if !instance.is_active() {
			return Err(ErrorKind::DeviceNotFound.error());
		}

		let trigger = instance.build_trigger_matcher();
		let samplerate = instance.current_samplerate.unwrap_or_else(rate::slowest_supported_rate);
		let sample_limit = instance.sample_limit;
		let num_logic_probes = instance.profile.num_probes;
		let interface = instance.usb.interface.as_ref().ok_or_else(|| ErrorKind::DeviceNotFound.error())?;

		let engine = AcquisitionEngine::start(interface, options, trigger, samplerate, sample_limit, num_logic_probes, sink);
		instance.engine = Some(engine);

		info!("acquisition started on device {index}");
		Ok(())
	}

	/// Stops streaming on `index`. Tracked per-device, not global. Idempotent.
	pub fn acquisition_stop(&mut self, index: usize, sink: &mut dyn SessionSink) -> Result<(), Error>
	{
		let instance = self.device_mut(index)?;
		if let Some(engine) = instance.engine.as_mut() {
			engine.request_stop(sink);
		}
		Ok(())
	}

	/// Performs exactly one non-blocking poll of every active device's transfer queue — the
	/// translation of `libusb_handle_events_timeout` with a zero timeout. The caller is expected
	/// to call this repeatedly from its own event loop.
	pub fn poll_events(&mut self, sink: &mut dyn SessionSink)
	{
		for instance in &mut self.devices {
			let Some(engine) = instance.engine.as_mut() else {
				continue;
			};

			if engine.pump(sink) == PumpOutcome::Stopped {
				instance.engine = None;
			}
		}
	}

	fn device(&self, index: usize) -> Result<&DeviceInstance, Error>
	{
		self.devices.get(index).ok_or_else(|| ErrorKind::DeviceNotFound.error())
	}

	fn device_mut(&mut self, index: usize) -> Result<&mut DeviceInstance, Error>
	{
		self.devices.get_mut(index).ok_or_else(|| ErrorKind::DeviceNotFound.error())
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn device_not_found_on_empty_registry()
	{
		let mut driver = Driver::new(EngineOptions::default());
		assert!(matches!(driver.status_get(0), DeviceStatus::NotFound));
		assert!(matches!(driver.close(0).unwrap_err().kind, ErrorKind::DeviceNotFound));
	}

	#[test]
	fn hwcap_get_all_reports_the_static_set()
	{
		let driver = Driver::new(EngineOptions::default());
		let caps = driver.hwcap_get_all();
		assert!(caps.contains(&Capability::LogicAnalyzer));
		assert!(caps.contains(&Capability::Samplerate));
		assert!(caps.contains(&Capability::LimitSamples));
		assert!(caps.contains(&Capability::Continuous));
	}
}
