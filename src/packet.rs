// SPDX-License-Identifier: MIT OR Apache-2.0
//! The datafeed packet types emitted to the session sink, and the contract for the external
//! sink that consumes them.
//!
//! The session/datafeed bus itself is out of scope for this driver: it is treated here purely
//! as the [`SessionSink`] trait, an abstract `send(packet)` collaborator the host application
//! supplies.

use std::sync::Arc;
use std::time::SystemTime;

/// Version tag carried in [`Packet::Header`], mirroring sigrok's feed-version concept.
pub const FEED_VERSION: u32 = 2;

/// A tagged datafeed packet.
#[derive(Debug, Clone)]
pub enum Packet
{
	/// Always the first packet of an acquisition.
	Header
	{
		feed_version: u32,
		start_time: SystemTime,
		samplerate: u64,
		num_logic_probes: u8,
	},

	/// A chunk of captured digital samples. `data` holds one byte per sample with bit `i`
	/// corresponding to probe `i + 1`; `unitsize` is always 1 for this driver.
	Logic
	{
		unitsize: u8,
		data: Arc<[u8]>,
	},

	/// Marks the sample at which the trigger matched. Appears at most once per acquisition, and
	/// always precedes any [`Packet::Logic`] carrying post-trigger samples.
	Trigger,

	/// Always the last packet of an acquisition.
	End,
}

impl Packet
{
	pub fn logic(data: impl Into<Arc<[u8]>>) -> Self
	{
		Packet::Logic {
			unitsize: 1,
			data: data.into(),
		}
	}

	/// Number of sample bytes carried by a [`Packet::Logic`], or 0 for any other variant. Used
	/// to enforce `sample_limit`.
	pub fn logic_len(&self) -> usize
	{
		match self {
			Packet::Logic { data, .. } => data.len(),
			_ => 0,
		}
	}
}

/// The abstract consumer of datafeed packets.
///
/// Implementations are expected to be cheap to call repeatedly and to not block for long: the
/// Acquisition Engine calls `send` synchronously from whatever thread is driving
/// [`crate::registry::Driver::poll_events`].
pub trait SessionSink
{
	fn send(&mut self, packet: Packet);
}

/// A [`SessionSink`] that simply accumulates every packet it receives, in order. Useful for
/// tests and for small host programs that don't need a full streaming bus.
#[derive(Debug, Default)]
pub struct RecordingSink
{
	pub packets: Vec<Packet>,
}

impl SessionSink for RecordingSink
{
	fn send(&mut self, packet: Packet)
	{
		self.packets.push(packet);
	}
}

impl RecordingSink
{
	pub fn new() -> Self
	{
		Self::default()
	}

	/// Total bytes carried by all [`Packet::Logic`] packets received so far.
	pub fn total_logic_bytes(&self) -> usize
	{
		self.packets.iter().map(Packet::logic_len).sum()
	}
}
