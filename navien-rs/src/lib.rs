//! # navien-rs
//!
//! Link engine for the RS-485 bus of Navien tankless water heaters.
//!
//! The heater, an optional NaviLink gateway and this engine share one
//! half-duplex serial line (19200 baud, 8N1). The engine recovers frames from
//! the byte stream, validates their checksums, decodes water, gas, command and
//! announce packets into a [`DeviceState`], and puts control commands on the
//! line when it is quiet.
//!
//! ## Layout
//!
//! - [`checksum`]: the bus's rolling checksum
//! - [`frame`]: frame layout, header parsing, [`RawFrame`]
//! - [`decode`]: per-packet field extraction and dispatch
//! - [`command`]: outbound command frames
//! - [`queue`]: send queue and idle-gap arbitration
//! - [`datalink`]: the [`Transport`] seam and an in-memory implementation
//! - [`event`]: listener notifications
//! - [`link`]: [`NavienLink`], the poll-driven state machine tying it together
//!
//! ## Example
//!
//! ```
//! use navien_rs::{MemoryTransport, NavienLink};
//!
//! let mut link = NavienLink::new(MemoryTransport::new());
//! link.on_water(|event: &navien_rs::Event<'_>| {
//!     if let Some(water) = event.water() {
//!         println!("device {} set point {} C", water.device_index, water.set_temp);
//!     }
//! });
//!
//! link.transport_mut().push(&[
//!     0xF7, 0x01, 0x50, 0x52, 0x10, 0x11, 0x42, 0x00, 0x20, 0x05, 0x37, 0x5E, 0x5C, 0x1E,
//!     0x00, 0x00, 0x00, 0x3C, 0x2D, 0x00, 0x88, 0xC2, 0x00, 0x22,
//! ]);
//! assert_eq!(link.poll().unwrap(), 1);
//! assert_eq!(link.state().water[2].set_temp, 47.0);
//!
//! // Commands are queued and sent once the bus is idle
//! link.power(true).unwrap();
//! ```

pub mod checksum;
pub mod command;
pub mod datalink;
pub mod decode;
pub mod error;
pub mod event;
pub mod frame;
pub mod link;
pub mod queue;
pub mod state;

pub use checksum::{checksum, CONTROL_SEED, STATUS_SEED};
pub use datalink::{MemoryTransport, Transport};
pub use error::{ControlError, LinkError, Result};
pub use event::{Event, EventKind, Listener};
pub use frame::{Direction, Header, PacketKind, RawFrame};
pub use link::{EngineConfig, LinkState, LinkStats, NavienLink};
pub use state::{AnnounceState, CommandState, DeviceState, GasState, WaterState};
