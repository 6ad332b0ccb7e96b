// SPDX-License-Identifier: MIT OR Apache-2.0
//! Acquisition driver core for Cypress FX2-based USB logic analyzers (Saleae Logic and
//! compatible boards).
//!
//! Five cooperating components (leaves first): the Profile Table ([`profile`]), the Rate Encoder
//! ([`rate`]), the Trigger Matcher ([`trigger`]), the Device Registry ([`registry`], backed by
//! per-device state in [`device`]), and the Acquisition Engine ([`acquisition`]). [`registry::Driver`]
//! is the entry point a host application embeds.

pub mod acquisition;
pub mod config;
pub mod device;
pub mod error;
pub mod firmware;
pub mod firmware_file;
pub mod packet;
pub mod profile;
pub mod rate;
pub mod registry;
pub mod trigger;
pub mod usb;
