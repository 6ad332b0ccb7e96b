// SPDX-License-Identifier: MIT OR Apache-2.0
//! A small demonstration CLI for the `fx2lafw` driver core: enumerate candidate devices, and run
//! a single capture to a raw packet dump.

use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand, crate_description, crate_version};
use clap_complete::{Shell, generate};
use color_eyre::eyre::{Result, WrapErr};
use fx2lafw::config::EngineOptions;
use fx2lafw::device::ProbeConfig;
use fx2lafw::firmware_file::FirmwareFile;
use fx2lafw::packet::{Packet, SessionSink};
use fx2lafw::registry::{ConfigValue, Driver, InfoKey};
use log::{info, warn};
use owo_colors::OwoColorize;

#[derive(Parser)]
#[command(version, about = format!("{} v{}", crate_description!(), crate_version!()), arg_required_else_help(true))]
struct CliArguments
{
	#[command(subcommand)]
	command: ToplevelCommand,
}

#[derive(Subcommand)]
enum ToplevelCommand
{
	/// Enumerate candidate devices and print their status
	List(ListArguments),
	/// Capture samples from one device into a raw packet dump
	Capture(CaptureArguments),
	/// Generate shell completions for this tool
	Complete(CompletionArguments),
}

#[derive(clap::Args)]
struct ListArguments
{
	/// Path to the firmware image to upload into devices that don't have it yet
	#[arg(long = "firmware")]
	firmware: Option<PathBuf>,
}

#[derive(clap::Args)]
struct CaptureArguments
{
	/// Path to the firmware image to upload into devices that don't have it yet
	#[arg(long = "firmware")]
	firmware: Option<PathBuf>,
	/// Index of the device to capture from, as reported by `list`
	#[arg(long = "device", default_value_t = 0)]
	device: usize,
	/// Sample rate in Hz (must be one of the supported rates)
	#[arg(long = "samplerate", default_value_t = 1_000_000)]
	samplerate: u64,
	/// Comma-separated 1-based probe indices to enable (defaults to all probes)
	#[arg(long = "probes")]
	probes: Option<String>,
	/// Per-probe trigger string (applies to probe 1 only, in this demo CLI)
	#[arg(long = "trigger")]
	trigger: Option<String>,
	/// Stop after this many sample bytes have been captured (0 = unbounded)
	#[arg(long = "limit", default_value_t = 0)]
	limit: u64,
	/// Where to write the raw packet dump; defaults to stdout
	#[arg(long = "output")]
	output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct CompletionArguments
{
	shell: Shell,
}

/// A [`SessionSink`] that writes a human-readable trace line per HEADER/TRIGGER/END packet and
/// the raw sample bytes for each LOGIC packet, to whatever [`Write`] the caller supplied.
struct DumpSink<W: Write>
{
	out: W,
	logic_bytes: u64,
}

impl<W: Write> SessionSink for DumpSink<W>
{
	fn send(&mut self, packet: Packet)
	{
		match packet {
			Packet::Header { samplerate, num_logic_probes, .. } => {
				let _ = writeln!(self.out, "; HEADER samplerate={samplerate} probes={num_logic_probes}");
			},
			Packet::Trigger => {
				let _ = writeln!(self.out, "; TRIGGER at byte {}", self.logic_bytes);
			},
			Packet::Logic { data, .. } => {
				self.logic_bytes += data.len() as u64;
				let _ = self.out.write_all(&data);
			},
			Packet::End => {
				let _ = writeln!(self.out, "; END total_samples={}", self.logic_bytes);
			},
		}
	}
}

fn list_command(args: &ListArguments) -> Result<()>
{
	let firmware = load_firmware(args.firmware.as_deref())?;
	let mut driver = Driver::new(EngineOptions::default());
	let count = driver.init(firmware.as_ref()).wrap_err("scanning USB bus for candidate devices")?;

	println!("Found {count} candidate device(s):");
	for index in 0..count {
		let status = driver.status_get(index);
		let num_probes = match driver.info_get(index, InfoKey::NumProbes)? {
			fx2lafw::registry::Info::NumProbes(n) => n,
			_ => unreachable!(),
		};
		println!("{}", format!("  [{index}] {status:?} ({num_probes} probes)").green());
	}

	Ok(())
}

fn capture_command(args: &CaptureArguments) -> Result<()>
{
	let firmware = load_firmware(args.firmware.as_deref())?;
	let mut driver = Driver::new(EngineOptions::default());
	driver.init(firmware.as_ref()).wrap_err("scanning USB bus for candidate devices")?;

	driver.open(args.device).wrap_err("opening device")?;

	driver
		.config_set(args.device, ConfigValue::SampleRate(args.samplerate))
		.wrap_err("configuring sample rate")?;
	driver.apply_samplerate(args.device).wrap_err("writing sample rate to device")?;

	let num_probes = match driver.info_get(args.device, InfoKey::NumProbes)? {
		fx2lafw::registry::Info::NumProbes(n) => n,
		_ => unreachable!(),
	};
	let probe_indices: Vec<u8> = match &args.probes {
		Some(list) => list.split(',').map(|s| s.trim().parse()).collect::<Result<_, _>>().wrap_err("parsing --probes")?,
		None => (1..=num_probes).collect(),
	};
	let probes: Vec<ProbeConfig> = (1..=num_probes)
		.map(|index| ProbeConfig {
			index,
			enabled: probe_indices.contains(&index),
			trigger: if index == 1 { args.trigger.clone() } else { None },
		})
		.collect();
	driver.config_set(args.device, ConfigValue::ProbeConfig(probes)).wrap_err("configuring probes")?;
	driver.config_set(args.device, ConfigValue::LimitSamples(args.limit)).wrap_err("configuring sample limit")?;

	let mut sink: DumpSink<Box<dyn Write>> = DumpSink {
		out: match &args.output {
			Some(path) => Box::new(BufWriter::new(File::create(path).wrap_err("creating output file")?)),
			None => Box::new(stdout()),
		},
		logic_bytes: 0,
	};

	driver.acquisition_start(args.device, &mut sink).wrap_err("starting acquisition")?;
	if args.limit > 0 {
		info!("capturing up to {} sample bytes", args.limit);
	} else {
		info!("capturing until the device stops on its own (no --limit given)");
	}

	while driver.is_acquiring(args.device) {
		driver.poll_events(&mut sink);
		sleep(Duration::from_millis(10));

		if args.limit > 0 && sink.logic_bytes >= args.limit {
			break;
		}
	}
	driver.acquisition_stop(args.device, &mut sink).wrap_err("stopping acquisition")?;
	// Drain remaining completions so every pool transfer is freed before we exit.
	for _ in 0..64 {
		driver.poll_events(&mut sink);
	}

	sink.out.flush().wrap_err("flushing output")?;
	Ok(())
}

fn load_firmware(path: Option<&std::path::Path>) -> Result<Option<FirmwareFile>>
{
	match path {
		Some(path) => Ok(Some(FirmwareFile::from_path(path).map_err(|e| color_eyre::eyre::eyre!("{e}"))?)),
		None => {
			warn!("no --firmware given; devices without firmware already loaded will be skipped");
			Ok(None)
		},
	}
}

fn main() -> Result<()>
{
	color_eyre::install()?;
	env_logger::Builder::new().filter_level(log::LevelFilter::Info).parse_default_env().init();

	let cli_args = CliArguments::parse();
	match &cli_args.command {
		ToplevelCommand::List(args) => list_command(args),
		ToplevelCommand::Capture(args) => capture_command(args),
		ToplevelCommand::Complete(args) => {
			let mut cmd = <CliArguments as clap::CommandFactory>::command();
			generate(args.shell, &mut cmd, "fx2lafw-cli", &mut stdout());
			Ok(())
		},
	}
}
