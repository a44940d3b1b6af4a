//! Captured frames and a recording harness shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use navien_rs::{Event, EventKind, MemoryTransport, NavienLink};

/// Water status, sub-device 2, short 17-byte payload
pub const WATER_SHORT: [u8; 24] = [
    0xF7, 0x01, 0x50, 0x52, 0x10, 0x11, 0x42, 0x00, 0x20, 0x05, 0x37, 0x5E, 0x5C, 0x1E, 0x00, 0x00,
    0x00, 0x3C, 0x2D, 0x00, 0x88, 0xC2, 0x00, 0x22,
];

/// Gateway announce
pub const ANNOUNCE: [u8; 10] = [0xF7, 0x05, 0x0F, 0x50, 0x10, 0x03, 0x4A, 0x00, 0x01, 0x55];

/// Cascaded unit status sharing the water type range
pub const CASCADE: [u8; 10] = [0xF7, 0x13, 0x50, 0x52, 0x10, 0x03, 0x40, 0x00, 0x04, 0xA6];

/// Control frame with an unassigned cmd_type
pub const UNKNOWN_CONTROL: [u8; 10] = [0xF7, 0x05, 0x0F, 0x50, 0x10, 0x03, 0x55, 0x00, 0x01, 0x29];

/// Announce-shaped frame with direction 0x33
pub const UNKNOWN_DIRECTION: [u8; 10] = [0xF7, 0x05, 0x33, 0x50, 0x10, 0x03, 0x4A, 0x00, 0x01, 0x01];

/// Gas status with a 3-byte payload
pub const SHORT_GAS: [u8; 10] = [0xF7, 0x05, 0x50, 0x0F, 0x90, 0x03, 0x45, 0x00, 0x01, 0xD9];

/// Water status of sub-device 0 with a full 34-byte payload
pub fn water_full() -> Vec<u8> {
    let mut w = [0u8; 34];
    w[0] = 0x42;
    w[2] = 0x08;
    w[3] = 0x05;
    w[4] = 0x37;
    w[5] = 0x78;
    w[6] = 0x76;
    w[7] = 0x20;
    w[11] = 0x1F;
    w[12] = 0x0C;
    w[18] = 0x0A;
    w[27] = 0x02;

    let mut frame = vec![0xF7, 0x05, 0x50, 0x50, 0x90, 0x22];
    frame.extend_from_slice(&w);
    frame.push(0x0F);
    frame
}

/// Gas status with a 42-byte payload
pub fn gas_full() -> Vec<u8> {
    let mut g = [0u8; 42];
    g[0] = 0x45;
    g[2] = 0x01;
    g[3] = 0x01;
    g[4] = 5;
    g[5] = 2;
    g[6] = 12;
    g[7] = 1;
    g[8] = 0x78;
    g[9] = 0x76;
    g[10] = 0x20;
    g[16] = 0x2C;
    g[17] = 0x01;
    g[18] = 0x34;
    g[19] = 0x12;
    g[24] = 0xE8;
    g[25] = 0x03;
    g[30] = 0xFF;
    g[31] = 0xFF;

    let mut frame = vec![0xF7, 0x05, 0x50, 0x0F, 0x90, 0x2A];
    frame.extend_from_slice(&g);
    frame.push(0xA5);
    frame
}

/// One delivered event, detached from the engine's buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub kind: EventKind,
    /// Frame bytes, or the error message for error events
    pub detail: String,
}

pub type Log = Rc<RefCell<Vec<Seen>>>;

/// Engine over a memory transport with a listener recording every event.
pub fn recording_link() -> (NavienLink<MemoryTransport>, Log) {
    // RUST_LOG=debug shows the engine's view of each scenario
    let _ = env_logger::builder().is_test(true).try_init();

    let mut link = NavienLink::new(MemoryTransport::new());
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    link.add_listener(move |event: &Event<'_>| {
        let detail = match (event.frame(), event.error()) {
            (Some(frame), _) => frame.to_hex(),
            (None, Some(err)) => err.to_string(),
            (None, None) => String::new(),
        };
        sink.borrow_mut().push(Seen {
            kind: event.kind(),
            detail,
        });
    });
    (link, log)
}

pub fn kinds(log: &Log) -> Vec<EventKind> {
    log.borrow().iter().map(|seen| seen.kind).collect()
}
