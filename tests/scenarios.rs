//! Exercises the public API against the worked scenarios used to design this driver: rate
//! rejection, trigger matching (including the backtracking case), and probe/trigger
//! configuration, all without needing a real USB device attached.

use fx2lafw::device::{DeviceInstance, ProbeConfig};
use fx2lafw::error::ErrorKind;
use fx2lafw::packet::{Packet, RecordingSink, SessionSink};
use fx2lafw::profile::Profile;
use fx2lafw::rate::{self, SUPPORTED_RATES_HZ};
use fx2lafw::trigger::{MatchOutcome, TriggerMatcher};
use fx2lafw::usb::{FirmwareGeneration, Pid, Vid};

fn saleae_logic_profile() -> &'static Profile
{
	Profile::match_unprogrammed(Vid(0x0925), Pid(0x3881)).expect("Saleae Logic profile should be in the table")
}

#[test]
fn rate_rejection_leaves_supported_rates_untouched()
{
	// 3 MHz is not one of the rates this driver supports on either firmware generation.
	assert!(!SUPPORTED_RATES_HZ.contains(&3_000_000));

	let err = rate::divider(3_000_000, FirmwareGeneration::New).unwrap_err();
	assert!(matches!(err.kind, ErrorKind::UnsupportedSampleRate(3_000_000)));

	let err = rate::divider(3_000_000, FirmwareGeneration::Legacy).unwrap_err();
	assert!(matches!(err.kind, ErrorKind::UnsupportedSampleRate(3_000_000)));
}

#[test]
fn configuring_probes_rejects_out_of_range_index_without_side_effects()
{
	let mut device = DeviceInstance::new(0, saleae_logic_profile());

	let bad = vec![ProbeConfig { index: 9, enabled: true, trigger: None }];
	let err = device.configure_probes(&bad, 4).unwrap_err();
	assert!(matches!(err.kind, ErrorKind::InvalidArgument(_)));

	// Failure must not have perturbed the device's configured state.
	assert_eq!(device.probe_mask, 0);
	assert!(device.trigger_mask.is_empty());
}

#[test]
fn configuring_a_trigger_then_building_a_matcher_reproduces_the_fire()
{
	// Probe 1, trigger "01", built through the public configuration API rather than constructed
	// by hand.
	let mut device = DeviceInstance::new(0, saleae_logic_profile());
	let probes = vec![ProbeConfig { index: 1, enabled: true, trigger: Some("01".into()) }];
	device.configure_probes(&probes, 4).unwrap();

	let mut matcher = device.build_trigger_matcher();
	let outcome = matcher.process(&[0x00, 0x00, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);

	match outcome {
		MatchOutcome::Fired { trigger_buffer, offset } => {
			assert_eq!(trigger_buffer, vec![0x00, 0x01]);
			assert_eq!(offset, 3);
		},
		other => panic!("expected a fire, got {other:?}"),
	}
	assert!(matcher.has_fired());
}

#[test]
fn no_trigger_configured_yields_an_already_fired_matcher()
{
	let mut device = DeviceInstance::new(0, saleae_logic_profile());
	let probes = vec![ProbeConfig { index: 1, enabled: true, trigger: None }];
	device.configure_probes(&probes, 4).unwrap();

	let mut matcher = device.build_trigger_matcher();
	assert!(matcher.has_fired());
	assert_eq!(matcher.process(&[0x11, 0x22]), MatchOutcome::AlreadyFired);
}

#[test]
fn trigger_backtrack_scenario_c()
{
	// Backtracking case: pattern "0001" against input "00001...".
	let mut matcher = TriggerMatcher::new(vec![1, 1, 1, 1], vec![0, 0, 0, 1]);
	let outcome = matcher.process(&[0, 0, 0, 0, 1, 0xAA]);

	assert_eq!(outcome, MatchOutcome::Fired { trigger_buffer: vec![0, 0, 0, 1], offset: 5 });
}

#[test]
fn untriggered_capture_produces_header_logic_logic_end()
{
	// Driven through the public Packet/SessionSink surface a host embeds.
	let mut sink = RecordingSink::new();
	let mut matcher = TriggerMatcher::already_fired();

	sink.send(Packet::Header { feed_version: 2, start_time: std::time::SystemTime::now(), samplerate: 1_000_000, num_logic_probes: 8 });

	for _ in 0..2 {
		let chunk = vec![0u8; 4096];
		match matcher.process(&chunk) {
			MatchOutcome::AlreadyFired => sink.send(Packet::logic(chunk)),
			other => panic!("expected pass-through, got {other:?}"),
		}
	}
	sink.send(Packet::End);

	assert_eq!(sink.packets.len(), 4);
	assert!(matches!(sink.packets[0], Packet::Header { samplerate: 1_000_000, num_logic_probes: 8, .. }));
	assert_eq!(sink.packets[1].logic_len(), 4096);
	assert_eq!(sink.packets[2].logic_len(), 4096);
	assert!(matches!(sink.packets[3], Packet::End));
	assert!(!sink.packets.iter().any(|p| matches!(p, Packet::Trigger)));
	assert_eq!(sink.total_logic_bytes(), 8192);
}
