//! `brinewire`: a BLE protocol engine for residential water-softener controllers.
//!
//! The controller exposes a single notify/write characteristic pair. Everything it
//! sends arrives as arbitrarily fragmented notifications; everything it accepts is
//! a 20-byte command. This crate turns that byte stream into typed readings and
//! drives the request/response cycle that keeps them fresh.
//!
//! ## Core Concepts
//!
//! - **[`SoftenerEngine`]**: Owns one connection. Feed it notifications, connection
//!   events and periodic ticks; it answers the handshake, polls the controller and
//!   publishes [`Reading`]s.
//! - **Framing**: Notifications are buffered in a fixed [`RingBuffer`] and split into
//!   packets by [`packets::dispatch_next`], which also handles the headerless
//!   daily-usage history fragments and resynchronises after garbage.
//! - **Authentication**: Older firmware requires a CRC8-obfuscated password reply,
//!   built by [`auth::build_auth_packet`].
//! - **Validation**: Decoded values pass range and step guards in [`validator`];
//!   implausible readings fall back to the last accepted value.
//! - **Capabilities**: The engine writes through a [`Transport`] and publishes to
//!   [`ReadingSink`]s registered per [`ReadingKind`].
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use brinewire::time::SystemClock;
//! use brinewire::{
//!     CommandFrame, EngineConfig, Reading, ReadingKind, SoftenerEngine, Transport,
//!     TransportError,
//! };
//!
//! struct Radio;
//!
//! impl Transport for Radio {
//!     fn write(&mut self, _frame: &CommandFrame) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = SoftenerEngine::new(EngineConfig::default(), Arc::new(SystemClock))?;
//!     engine.register_sink(ReadingKind::SaltRemaining, |r: &Reading| {
//!         println!("salt: {:?}", r.as_number());
//!     });
//!
//!     let mut radio = Radio;
//!     engine.connected(&mut radio);
//!     // On every notification:
//!     let _readings = engine.handle_notification(b"xx\x01\x00", &mut radio);
//!     // Periodically:
//!     engine.tick(&mut radio);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod commands;
pub mod config;
pub mod constants;
pub mod crc;
pub mod engine;
pub mod error;
pub mod fuzz_harnesses;
pub mod history;
pub mod metrics;
pub mod packets;
pub mod peripheral;
pub mod readings;
pub mod ring_buffer;
pub mod sequencer;
pub mod session;
pub mod time;
pub mod traits;
pub mod types;
pub mod validator;

pub use commands::{Command, CommandFrame};
pub use config::EngineConfig;
pub use engine::{EngineStats, SoftenerEngine};
pub use error::{BrinewireError, CommandError, ConfigError, DecodeError, TransportError};
pub use readings::{Reading, ReadingKind, ReadingValue};
pub use ring_buffer::RingBuffer;
pub use session::{BrineTankConfig, Session};
pub use time::mock_clock::MockClock;
pub use traits::{ReadingSink, Transport};
pub use types::{ConnectionCounter, FirmwareVersion, Password};
