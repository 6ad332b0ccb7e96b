// SPDX-License-Identifier: MIT OR Apache-2.0
//! Module for error handling code.

use std::fmt::{Display, Formatter};
#[cfg(feature = "backtrace")]
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;

use thiserror::Error;

/// More convenient alias for `Box<dyn StdError + Send + Sync>`, which shows up in a few
/// signatures and structs.
type BoxedError = Box<dyn StdError + Send + Sync>;

/// Kinds of errors for [Error]. Use [ErrorKind::error] and [ErrorKind::error_from] to generate
/// the [Error] value for this ErrorKind.
///
/// Variant names deliberately echo the status-code taxonomy a sigrok driver core reports to its
/// host (`ERR`, `ERR_ARG`, `ERR_SAMPLERATE`, ...) so callers can match on kind without having to
/// invent their own mapping.
#[derive(Debug)]
pub enum ErrorKind
{
	/// A sample rate outside the supported set was requested.
	UnsupportedSampleRate(/** requested Hz **/ u64),

	/// A trigger pattern was longer than `NUM_TRIGGER_STAGES`.
	TriggerTooLong,

	/// A probe index fell outside `[1, probe_count]`.
	InvalidArgument(/** what **/ String),

	/// `index` did not name a known device.
	DeviceNotFound,

	/// More than one device claimed operations that only support one.
	TooManyDevices,

	/// Device descriptor data did not look like a supported profile at all.
	DeviceSeemsInvalid(/** what was wrong **/ String),

	/// Device disappeared mid-operation (unplugged, failed renumeration, etc).
	DeviceDisconnected,

	/// Device did not re-enumerate within `MAX_RENUM_DELAY` after firmware upload.
	RenumerationTimedOut,

	/// Failed to read or parse a firmware image file.
	FirmwareFileIo(/** filename **/ Option<String>),

	/// Firmware image was read but rejected as malformed.
	InvalidFirmware(/** why **/ String),

	/// An acquisition is already running on this device.
	AcquisitionAlreadyRunning,

	/// An internal invariant was violated. Reaching this indicates a bug in this driver.
	Bug(&'static str),

	/// Unhandled external error.
	External(ErrorSource),
}

impl ErrorKind
{
	/// Creates a new [Error] from this error kind.
	#[inline(always)]
	pub fn error(self) -> Error
	{
		Error::new(self, None)
	}

	/// Creates a new [Error] from this error kind, with the passed error as the source.
	#[inline(always)]
	pub fn error_from<E: StdError + Send + Sync + 'static>(self, source: E) -> Error
	{
		Error::new(self, Some(Box::new(source)))
	}
}

impl From<ErrorKind> for Error
{
	fn from(other: ErrorKind) -> Self
	{
		other.error()
	}
}

impl Display for ErrorKind
{
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result
	{
		use ErrorKind::*;
		match self {
			UnsupportedSampleRate(rate) => write!(f, "sample rate {rate} Hz is not supported by this device"),
			TriggerTooLong => write!(f, "trigger pattern is longer than the number of trigger stages supported"),
			InvalidArgument(what) => write!(f, "invalid argument: {what}"),
			DeviceNotFound => write!(f, "device not found (check connection?)"),
			TooManyDevices => write!(f, "operation only supports one device but more than one matched"),
			DeviceSeemsInvalid(thing) => write!(f, "device descriptor looks wrong ({thing}); is this really a supported device?"),
			DeviceDisconnected => write!(f, "device disconnected during an ongoing operation"),
			RenumerationTimedOut => write!(f, "device did not re-enumerate after firmware upload"),
			FirmwareFileIo(None) => write!(f, "failed to read firmware file"),
			FirmwareFileIo(Some(filename)) => write!(f, "failed to read firmware file {filename}"),
			InvalidFirmware(why) => write!(f, "firmware image is invalid: {why}"),
			AcquisitionAlreadyRunning => write!(f, "an acquisition is already running on this device"),
			Bug(what) => write!(f, "internal invariant violated: {what}"),
			External(source) => {
				use ErrorSource::*;
				match source {
					StdIo(e) => write!(f, "unhandled I/O error: {e}"),
					Usb(e) => write!(f, "unhandled USB error: {e}"),
				}
			},
		}
	}
}

#[derive(Debug)]
/// Error type for fx2lafw driver operations. Easily constructed from [ErrorKind].
pub struct Error
{
	pub kind: ErrorKind,
	pub source: Option<BoxedError>,

	/// Stores the backtrace for this error.
	#[cfg(feature = "backtrace")]
	pub backtrace: Box<Backtrace>,

	/// A string for additional context about what was being attempted when this error occurred.
	///
	/// Example: "opening device for acquisition".
	pub context: Option<String>,
}

impl Error
{
	#[inline(always)]
	pub fn new(kind: ErrorKind, source: Option<BoxedError>) -> Self
	{
		Self {
			kind,
			source,
			context: None,
			#[cfg(feature = "backtrace")]
			backtrace: Box::new(Backtrace::capture()),
		}
	}

	/// Add additional context about what was being attempted when this error occurred.
	#[allow(dead_code)]
	pub fn with_ctx(mut self, ctx: &str) -> Self
	{
		self.context = Some(ctx.to_string());
		self
	}
}

impl Display for Error
{
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result
	{
		if let Some(ctx) = &self.context {
			write!(f, "(while {}): {}", ctx, self.kind)?;
		} else {
			write!(f, "{}", self.kind)?;
		}

		#[cfg(feature = "backtrace")]
		{
			if self.backtrace.status() == BacktraceStatus::Captured {
				write!(f, "\nBacktrace:\n{}", self.backtrace)?;
			}
		}

		if let Some(source) = &self.source {
			write!(f, "\nCaused by: {source}")?;
		}

		Ok(())
	}
}

impl StdError for Error
{
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)>
	{
		self.source.as_deref().map(|e| e as &dyn StdError)
	}
}

impl From<nusb::transfer::TransferError> for Error
{
	fn from(other: nusb::transfer::TransferError) -> Self
	{
		use nusb::transfer::TransferError;
		match other {
			TransferError::Disconnected => ErrorKind::DeviceDisconnected.error_from(other),
			other => ErrorKind::External(ErrorSource::Usb(other)).error(),
		}
	}
}

impl From<std::io::Error> for Error
{
	fn from(other: std::io::Error) -> Self
	{
		ErrorKind::External(ErrorSource::StdIo(other)).error()
	}
}

/// Sources of external error in this library.
#[derive(Debug, Error)]
pub enum ErrorSource
{
	#[error(transparent)]
	StdIo(#[from] std::io::Error),

	#[error(transparent)]
	Usb(#[from] nusb::transfer::TransferError),
}

/// Extension trait to enable getting the error kind from a Result<T, Error> with one method.
pub trait ResErrorKind<T>
{
	fn err_kind(&self) -> Result<&T, &ErrorKind>;
}

impl<T> ResErrorKind<T> for Result<T, Error>
{
	fn err_kind(&self) -> Result<&T, &ErrorKind>
	{
		self.as_ref().map_err(|e| &e.kind)
	}
}
