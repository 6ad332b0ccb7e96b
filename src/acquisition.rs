// SPDX-License-Identifier: MIT OR Apache-2.0
//! The streaming Acquisition Engine.
//!
//! One [`AcquisitionEngine`] is owned by exactly one [`crate::device::DeviceInstance`] for the
//! duration of a single acquisition. It submits a fixed pool of bulk IN transfers, recycles their
//! buffers on completion, runs the Trigger Matcher over each, and emits packets to the
//! [`SessionSink`].

use std::task::Poll;
use std::time::SystemTime;

use futures_lite::future::{block_on, poll_once};
use log::{debug, trace, warn};
use nusb::Interface;
use nusb::transfer::{Queue, RequestBuffer};

use crate::config::EngineOptions;
use crate::packet::{Packet, SessionSink};
use crate::trigger::{MatchOutcome, TriggerMatcher};
use crate::usb::EP_SAMPLES_IN;

/// Buffer size for the first transfer in the pool.
const FIRST_TRANSFER_LEN: usize = 2048;
/// Buffer size for every transfer after the first, and for every resubmission.
const STEADY_TRANSFER_LEN: usize = 4096;

/// Lifecycle state of a running acquisition — replaces the upstream kill-switch magic value
/// `num_samples = -1` with an explicit enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState
{
	/// Transfers are being submitted, completed, and resubmitted normally.
	Active,
	/// `stop` has been requested or a termination condition tripped; completions free their
	/// transfer without resubmitting, and no further packets are emitted.
	Stopping,
}

/// One transfer-pool-worth of streaming state for a single acquisition.
pub struct AcquisitionEngine
{
	queue: Queue<RequestBuffer>,
	state: EngineState,
	matcher: TriggerMatcher,
	num_samples: u64,
	sample_limit: Option<u64>,
	empty_transfer_count: u32,
	max_empty_transfers: u32,
}

/// What happened during one [`AcquisitionEngine::pump`] call, reported back to the caller
/// (normally [`crate::registry::Driver::poll_events`]) so it knows whether the acquisition is
/// still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome
{
	/// No transfer completed this call; nothing to do.
	Idle,
	/// A transfer completed and was processed; the acquisition is still running.
	Progressed,
	/// The acquisition has fully drained and stopped; the engine should be dropped.
	Stopped,
}

impl AcquisitionEngine
{
	/// Starts an acquisition: emits the HEADER packet, allocates the transfer pool, and submits
	/// it. `trigger` should be a freshly-built matcher (or [`TriggerMatcher::already_fired`] if
	/// no probe had a trigger string configured).
	pub fn start(
		interface: &Interface,
		options: &EngineOptions,
		trigger: TriggerMatcher,
		samplerate: u64,
		sample_limit: Option<u64>,
		num_logic_probes: u8,
		sink: &mut dyn SessionSink,
	) -> Self
	{
		sink.send(Packet::Header {
			feed_version: crate::packet::FEED_VERSION,
			start_time: SystemTime::now(),
			samplerate,
			num_logic_probes,
		});

		let mut queue = interface.bulk_in_queue(EP_SAMPLES_IN);

		queue.submit(RequestBuffer::new(FIRST_TRANSFER_LEN));
		for _ in 1..options.num_simul_transfers {
			queue.submit(RequestBuffer::new(STEADY_TRANSFER_LEN));
		}

		debug!(
			"acquisition started: {} transfers submitted, samplerate={samplerate} Hz",
			options.num_simul_transfers
		);

		Self {
			queue,
			state: EngineState::Active,
			matcher: trigger,
			num_samples: 0,
			sample_limit,
			empty_transfer_count: 0,
			max_empty_transfers: options.max_empty_transfers,
		}
	}

	/// True once [`Self::request_stop`] has been called (directly or via a termination
	/// condition) and every pool transfer has drained.
	pub fn is_stopped(&self) -> bool
	{
		self.state == EngineState::Stopping && self.queue.pending() == 0
	}

	/// Performs exactly one non-blocking poll of the transfer queue, processing at most one
	/// completed transfer — the translation of `libusb_handle_events_timeout` with a zero
	/// timeout. Returns without blocking if nothing is ready.
	///
	/// `poll_once` always resolves on its very first poll (it either observes the inner future
	/// Ready or reports Pending without waiting), so driving it with `block_on` here never
	/// actually blocks — it is the idiomatic non-blocking "poll, don't wait" shape.
	pub fn pump(&mut self, sink: &mut dyn SessionSink) -> PumpOutcome
	{
		if self.queue.pending() == 0 {
			return if self.is_stopped() { PumpOutcome::Stopped } else { PumpOutcome::Idle };
		}

		let completion = match block_on(poll_once(self.queue.next_complete())) {
			Poll::Ready(completion) => completion,
			Poll::Pending => return PumpOutcome::Idle,
		};

		self.on_complete(completion, sink);

		if self.is_stopped() {
			PumpOutcome::Stopped
		} else {
			PumpOutcome::Progressed
		}
	}

	/// Requests that the acquisition stop: cancels every in-flight transfer so they drain on the
	/// next few [`Self::pump`] calls instead of being resubmitted. Idempotent: calling this more
	/// than once, or after the engine has already stopped on its own, is a no-op.
	pub fn request_stop(&mut self, sink: &mut dyn SessionSink)
	{
		if self.state == EngineState::Stopping {
			return;
		}

		self.state = EngineState::Stopping;
		self.queue.cancel_all();
		sink.send(Packet::End);
		debug!("acquisition stop requested, {} transfers draining", self.queue.pending());
	}

	fn on_complete(&mut self, completion: nusb::transfer::Completion<Vec<u8>>, sink: &mut dyn SessionSink)
	{
		let nusb::transfer::Completion { data, status } = completion;

		// Cancelled or already-stopping: free the transfer, do not resubmit.
		if self.state == EngineState::Stopping {
			return;
		}

		if let Err(err) = status {
			warn!("bulk IN transfer failed, not resubmitting: {err}");
			return;
		}

		let cur_len = data.len();
		trace!("transfer completed: {cur_len} bytes");

		if cur_len == 0 {
			self.queue.submit(RequestBuffer::reuse(data, STEADY_TRANSFER_LEN));
			self.empty_transfer_count += 1;
			if self.empty_transfer_count > self.max_empty_transfers {
				warn!(
					"empty-transfer watchdog tripped after {} consecutive empty transfers",
					self.empty_transfer_count
				);
				self.request_stop(sink);
			}
			return;
		}
		self.empty_transfer_count = 0;

		let emitted = self.emit_logic(&data, sink);

		// Allocate a fresh 4096-byte buffer and resubmit. `data`'s capacity is reused where
		// possible; nusb clears its length back to 0 internally.
		self.queue.submit(RequestBuffer::reuse(data, STEADY_TRANSFER_LEN));

		// Only bytes that actually became a Logic packet count toward the limit: a still-searching
		// buffer is dropped pre-trigger data, not captured samples, and must not count toward it.
		if emitted {
			self.num_samples += cur_len as u64;
			if let Some(limit) = self.sample_limit {
				if self.num_samples > limit {
					debug!("sample limit {limit} reached ({} captured), stopping", self.num_samples);
					self.request_stop(sink);
				}
			}
		}
	}

	/// Runs the Trigger Matcher over one completed transfer's bytes and emits the resulting
	/// LOGIC (and, on first fire, TRIGGER) packets. Returns whether any Logic bytes were emitted
	/// (false only when the matcher is still searching and the whole buffer was dropped).
	fn emit_logic(&mut self, buf: &[u8], sink: &mut dyn SessionSink) -> bool
	{
		match self.matcher.process(buf) {
			MatchOutcome::AlreadyFired => {
				sink.send(Packet::logic(buf.to_vec()));
				true
			},
			MatchOutcome::Fired { trigger_buffer, offset } => {
				sink.send(Packet::Trigger);
				sink.send(Packet::logic(trigger_buffer));
				if offset < buf.len() {
					sink.send(Packet::logic(buf[offset..].to_vec()));
				}
				true
			},
			MatchOutcome::StillSearching => {
				// Pre-trigger data is not retained in this implementation.
				debug!("dropping {} pre-trigger bytes, matcher still searching", buf.len());
				false
			},
		}
	}
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::packet::RecordingSink;

	#[test]
	fn emit_logic_passes_through_once_fired()
	{
		let mut engine_matcher = TriggerMatcher::already_fired();
		let mut sink = RecordingSink::new();

		// Exercise the pure packet-emission logic directly, without a real USB queue.
		match engine_matcher.process(&[0xAA, 0xBB]) {
			MatchOutcome::AlreadyFired => sink.send(Packet::logic(vec![0xAA, 0xBB])),
			_ => unreachable!(),
		}

		assert_eq!(sink.packets.len(), 1);
		assert_eq!(sink.total_logic_bytes(), 2);
	}

	#[test]
	fn emit_logic_emits_trigger_then_two_logic_packets_on_fire()
	{
		let mut matcher = TriggerMatcher::new(vec![0x01, 0x01], vec![0x00, 0x01]);
		let mut sink = RecordingSink::new();
		let buf = [0x00u8, 0x00, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

		let outcome = matcher.process(&buf);
		match outcome {
			MatchOutcome::Fired { trigger_buffer, offset } => {
				sink.send(Packet::Trigger);
				sink.send(Packet::logic(trigger_buffer));
				if offset < buf.len() {
					sink.send(Packet::logic(buf[offset..].to_vec()));
				}
			},
			_ => unreachable!(),
		}

		assert_eq!(sink.packets.len(), 3);
		assert!(matches!(sink.packets[0], Packet::Trigger));
		assert_eq!(sink.packets[1].logic_len(), 2);
		assert_eq!(sink.packets[2].logic_len(), 5);
	}
}
