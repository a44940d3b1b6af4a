//! Poll-driven link engine for the Navien RS-485 bus.
//!
//! [`NavienLink`] owns the transport, the device state and the send queue.
//! The host calls [`NavienLink::poll`] often and regularly; each call reads
//! whatever the transport has buffered, decodes every complete frame, notifies
//! listeners and, when the bus has been quiet long enough, puts at most one
//! queued command on the wire. A call never blocks: if a frame is only partly
//! received it returns and picks up where it left off next time.
//!
//! # Receive state machine
//!
//! ```text
//!            marker found              header read, length valid
//! Scanning ---------------> HeaderAcquired -----------------------> PayloadPending
//!    ^                           |                                       |
//!    |      invalid length       |     payload + checksum read,          |
//!    +---------------------------+     frame verified and dispatched     |
//!    +-------------------------------------------------------------------+
//! ```
//!
//! # Transmit arbitration
//!
//! Queued frames are sent only from `Scanning`, when nothing is waiting on
//! the receive side and no byte has been seen for [`EngineConfig::idle_gap`].
//! With [`EngineConfig::flush_after_frame`] one frame may also go out right
//! after a received frame completes, provided no further bytes are buffered.
//! Every frame we transmit is fed back through the command decoder, so our own
//! commands reach listeners the same way a peer's do.
//!
//! Once a gateway announces itself the engine stops transmitting for good:
//! new requests fail with [`ControlError::GatewayPresent`] and frames already
//! queued are dropped and reported as [`LinkError::SendSuppressed`].

use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
#[cfg(feature = "serde")]
use serde::Serialize;

use crate::command;
use crate::datalink::Transport;
use crate::decode;
use crate::error::{ControlError, LinkError, Result};
use crate::event::{emit, Event, EventKind, Listener, Subscription};
use crate::frame::{Header, PacketKind, RawFrame, HEADER_SIZE, PACKET_MARKER};
use crate::queue::{Arbiter, SendQueue, DEFAULT_IDLE_GAP};
use crate::state::DeviceState;

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Minimum receive-side silence before a queued frame may be sent.
    pub idle_gap: Duration,
    /// Also send right after a received frame completes.
    pub flush_after_frame: bool,
    /// Start without a physical bus: control calls act on the state directly.
    /// Left automatically when the first byte is received.
    pub simulation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_gap: DEFAULT_IDLE_GAP,
            flush_after_frame: false,
            simulation: false,
        }
    }
}

impl EngineConfig {
    pub fn with_idle_gap(mut self, idle_gap: Duration) -> Self {
        self.idle_gap = idle_gap;
        self
    }

    pub fn with_flush_after_frame(mut self, enabled: bool) -> Self {
        self.flush_after_frame = enabled;
        self
    }

    pub fn with_simulation(mut self, enabled: bool) -> Self {
        self.simulation = enabled;
        self
    }
}

/// Receive state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Discarding bytes until a frame marker
    Scanning,
    /// Marker seen, waiting for the full header
    HeaderAcquired,
    /// Header accepted, waiting for payload and checksum
    PayloadPending,
}

impl LinkState {
    pub fn name(&self) -> &'static str {
        match self {
            LinkState::Scanning => "Scanning",
            LinkState::HeaderAcquired => "HeaderAcquired",
            LinkState::PayloadPending => "PayloadPending",
        }
    }
}

/// Link counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct LinkStats {
    /// Frames that passed the checksum
    pub rx_frames: u64,
    /// Frames fully written to the bus
    pub tx_frames: u64,
    pub checksum_errors: u64,
    /// Headers with the 0xFF or an oversized length
    pub framing_errors: u64,
    /// Frames with an unknown direction, packet type or sub-type
    pub unknown_packets: u64,
    /// Known frames whose payload was too short to decode
    pub decode_errors: u64,
    /// Bytes dropped while looking for a marker
    pub discarded_bytes: u64,
    /// Queued frames dropped because a gateway is present
    pub suppressed_frames: u64,
    /// Current send queue depth
    pub send_queue_len: usize,
}

/// The protocol engine.
///
/// Single owner of all link state; not meant to be polled from more than one
/// thread. Take a copy with [`current_state`](Self::current_state) to hand
/// the state elsewhere.
pub struct NavienLink<T: Transport> {
    transport: T,
    config: EngineConfig,

    link_state: LinkState,
    rx_frame: RawFrame,
    rx_header: Option<Header>,

    state: DeviceState,
    queue: SendQueue,
    arbiter: Arbiter,
    simulation: bool,

    stats: LinkStats,
    subscriptions: Vec<Subscription>,
}

impl<T: Transport> NavienLink<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, EngineConfig::default())
    }

    pub fn with_config(transport: T, config: EngineConfig) -> Self {
        if config.simulation {
            info!("Starting in simulation mode until the bus is heard");
        }
        Self {
            transport,
            link_state: LinkState::Scanning,
            rx_frame: RawFrame::new(),
            rx_header: None,
            state: DeviceState::default(),
            queue: SendQueue::new(),
            arbiter: Arbiter::new(config.idle_gap),
            simulation: config.simulation,
            stats: LinkStats::default(),
            subscriptions: Vec::new(),
            config,
        }
    }

    /// Run one polling cycle against the wall clock.
    ///
    /// Returns the number of complete frames taken off the bus. Only transport
    /// failures are returned as errors; bus faults go to the error listeners.
    pub fn poll(&mut self) -> Result<usize> {
        self.poll_at(Instant::now())
    }

    /// Run one polling cycle as if the current time were `now`.
    pub fn poll_at(&mut self, now: Instant) -> Result<usize> {
        let available = self.transport.available()?;

        if available > 0 {
            self.arbiter.note_activity(now);
            if self.simulation {
                info!("Bus traffic detected, leaving simulation mode");
                self.simulation = false;
            }
        } else if self.link_state == LinkState::Scanning && self.arbiter.is_idle(now) {
            self.flush_one(now)?;
        }

        let mut frames = 0;
        loop {
            match self.link_state {
                LinkState::Scanning => {
                    if !self.seek_marker()? {
                        return Ok(frames);
                    }
                    self.link_state = LinkState::HeaderAcquired;
                }
                LinkState::HeaderAcquired => {
                    if self.transport.available()? < HEADER_SIZE {
                        return Ok(frames);
                    }
                    self.read_header()?;
                }
                LinkState::PayloadPending => {
                    let Some(header) = self.rx_header else {
                        self.link_state = LinkState::Scanning;
                        continue;
                    };
                    if self.transport.available()? < header.remaining_len() {
                        return Ok(frames);
                    }
                    self.read_payload(&header)?;
                    frames += 1;
                    self.handle_frame();

                    if self.config.flush_after_frame && self.transport.available()? == 0 {
                        self.flush_one(now)?;
                    }
                }
            }
        }
    }

    /// Drop bytes up to the next marker, leaving the marker in place.
    fn seek_marker(&mut self) -> Result<bool> {
        loop {
            match self.transport.peek()? {
                Some(PACKET_MARKER) => return Ok(true),
                Some(byte) => {
                    trace!("RX_DISCARD: 0x{:02X}", byte);
                    self.transport.discard()?;
                    self.stats.discarded_bytes += 1;
                }
                None => return Ok(false),
            }
        }
    }

    fn read_header(&mut self) -> Result<()> {
        self.rx_frame.clear();
        self.rx_header = None;
        // Any outcome other than an accepted header restarts the scan
        self.link_state = LinkState::Scanning;

        let dst = self.rx_frame.region_mut(0, HEADER_SIZE)?;
        self.transport.read_exact(dst)?;

        let Some(header) = self.rx_frame.header() else {
            return Ok(());
        };
        trace!("RX header: {:02X?}", self.rx_frame.as_bytes());

        if let Err(err) = header.validate() {
            self.stats.framing_errors += 1;
            self.report(err);
            return Ok(());
        }

        self.rx_header = Some(header);
        self.link_state = LinkState::PayloadPending;
        Ok(())
    }

    fn read_payload(&mut self, header: &Header) -> Result<()> {
        self.link_state = LinkState::Scanning;
        self.rx_header = None;

        let dst = self.rx_frame.region_mut(HEADER_SIZE, header.remaining_len())?;
        self.transport.read_exact(dst)?;
        trace!("RX frame: {:02X?}", self.rx_frame.as_bytes());
        Ok(())
    }

    /// Verify and dispatch the frame in the receive buffer.
    fn handle_frame(&mut self) {
        if let Err(err) = self.rx_frame.verify() {
            match err {
                LinkError::Checksum { .. } => self.stats.checksum_errors += 1,
                _ => self.stats.unknown_packets += 1,
            }
            self.report(err);
            return;
        }
        self.stats.rx_frames += 1;

        let gateway_before = self.state.announce.navilink_present;
        match decode::dispatch(&self.rx_frame, &mut self.state) {
            Ok(kind) => {
                if kind == PacketKind::Announce && !gateway_before {
                    info!("NaviLink gateway detected on the bus, control disabled");
                }
                notify(&mut self.subscriptions, &self.state, &self.rx_frame, kind);
            }
            Err(err) => {
                match err {
                    LinkError::ShortPayload { .. } => self.stats.decode_errors += 1,
                    _ => self.stats.unknown_packets += 1,
                }
                self.report(err);
            }
        }
    }

    /// Send the head of the queue, if any.
    ///
    /// Returns the number of bytes written.
    fn flush_one(&mut self, now: Instant) -> Result<Option<usize>> {
        let Some(frame) = self.queue.pop() else {
            return Ok(None);
        };

        if self.state.announce.navilink_present {
            self.stats.suppressed_frames += 1;
            self.report(LinkError::SendSuppressed {
                raw: frame.as_bytes().to_vec(),
            });
            return Ok(None);
        }

        let sent = self.transport.write(frame.as_bytes())?;
        self.arbiter.note_activity(now);

        if sent != frame.len() {
            warn!("TX: short write, {} of {} bytes", sent, frame.len());
            return Ok(Some(sent));
        }

        self.stats.tx_frames += 1;
        debug!(
            "TX: {} bytes, queue remaining {}: {:02X?}",
            sent,
            self.queue.len(),
            frame.as_bytes()
        );

        // Echo our own command through the receive path
        match decode::dispatch(&frame, &mut self.state) {
            Ok(kind) => {
                debug!("TX: echoed as {}", kind.name());
                notify(&mut self.subscriptions, &self.state, &frame, kind)
            }
            Err(err) => self.report(err),
        }
        Ok(Some(sent))
    }

    fn report(&mut self, err: LinkError) {
        warn!("{}", err);
        emit(&mut self.subscriptions, &Event::Error(&err));
    }

    fn enqueue(&mut self, frames: &[RawFrame]) -> std::result::Result<usize, ControlError> {
        if self.state.announce.navilink_present {
            return Err(ControlError::GatewayPresent);
        }
        self.queue.push_all(frames)
    }

    // ---- Control API ----

    /// Turn the heater on or off.
    ///
    /// Returns the number of bytes queued.
    pub fn power(&mut self, on: bool) -> std::result::Result<usize, ControlError> {
        let frame = command::power(on);
        if self.simulation {
            debug!("SIM: power {}", if on { "on" } else { "off" });
            self.state.water[0].system_power = on;
            return Ok(frame.len());
        }
        self.enqueue(&[frame])
    }

    /// Change the set point, rounded to the nearest 0.5 °C.
    pub fn set_temperature(&mut self, celsius: f32) -> std::result::Result<usize, ControlError> {
        let raw = command::encode_temperature(celsius)?;
        let frame = command::set_temperature(raw);
        if self.simulation {
            let set_temp = raw as f32 / 2.0;
            debug!("SIM: set temperature {}", set_temp);
            self.state.water[0].set_temp = set_temp;
            self.state.gas.set_temp = set_temp;
            return Ok(frame.len());
        }
        self.enqueue(&[frame])
    }

    /// Momentary hot-button press.
    ///
    /// Queues two frames back to back: the press, then the release. Both are
    /// queued or neither is.
    pub fn press_hot_button(&mut self) -> std::result::Result<usize, ControlError> {
        let frames = [command::hot_button_press(), command::button_release()];
        if self.simulation {
            debug!("SIM: hot button");
            return Ok(frames.iter().map(RawFrame::len).sum());
        }
        self.enqueue(&frames)
    }

    /// Switch recirculation on or off.
    ///
    /// Like the hot button this is a press followed by a release, so two
    /// frames are queued.
    pub fn set_recirculation(&mut self, on: bool) -> std::result::Result<usize, ControlError> {
        let frames = [command::recirculation(on), command::button_release()];
        if self.simulation {
            debug!("SIM: recirculation {}", if on { "on" } else { "off" });
            let water = &mut self.state.water[0];
            water.recirculation_active = on;
            water.recirculation_running = on;
            water.operating_capacity = if on { 15.0 } else { 0.0 };
            self.state.gas.current_gas_usage = if on { 200 } else { 0 };
            return Ok(frames.iter().map(RawFrame::len).sum());
        }
        self.enqueue(&frames)
    }

    /// False once a gateway has been seen on the bus.
    pub fn is_control_available(&self) -> bool {
        !self.state.announce.navilink_present
    }

    pub fn is_simulation(&self) -> bool {
        self.simulation
    }

    // ---- State access ----

    /// Copy of the decoded state.
    pub fn current_state(&self) -> DeviceState {
        self.state
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Frames waiting for the bus
    pub fn pending_frames(&self) -> usize {
        self.queue.len()
    }

    /// Time since bus traffic was last observed.
    pub fn silence(&self, now: Instant) -> Option<Duration> {
        self.arbiter.silence(now)
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            send_queue_len: self.queue.len(),
            ..self.stats.clone()
        }
    }

    pub fn reset_stats(&mut self) {
        self.stats = LinkStats::default();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ---- Listeners ----

    /// Receive every event.
    pub fn add_listener<L: Listener + 'static>(&mut self, listener: L) {
        self.subscriptions.push(Subscription::new(None, Box::new(listener)));
    }

    /// Receive only events of `kind`.
    pub fn subscribe<L: Listener + 'static>(&mut self, kind: EventKind, listener: L) {
        self.subscriptions
            .push(Subscription::new(Some(kind), Box::new(listener)));
    }

    pub fn on_water<L: Listener + 'static>(&mut self, listener: L) {
        self.subscribe(EventKind::Water, listener);
    }

    pub fn on_gas<L: Listener + 'static>(&mut self, listener: L) {
        self.subscribe(EventKind::Gas, listener);
    }

    pub fn on_command<L: Listener + 'static>(&mut self, listener: L) {
        self.subscribe(EventKind::Command, listener);
    }

    pub fn on_announce<L: Listener + 'static>(&mut self, listener: L) {
        self.subscribe(EventKind::Announce, listener);
    }

    pub fn on_error<L: Listener + 'static>(&mut self, listener: L) {
        self.subscribe(EventKind::Error, listener);
    }
}

fn notify(
    subscriptions: &mut [Subscription],
    state: &DeviceState,
    frame: &RawFrame,
    kind: PacketKind,
) {
    let event = match kind {
        PacketKind::Water { device_index } => Event::Water {
            device_index,
            state,
            frame,
        },
        PacketKind::Gas => Event::Gas { state, frame },
        PacketKind::Announce => Event::Announce { state, frame },
        PacketKind::Command => Event::Command { state, frame },
    };
    emit(subscriptions, &event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalink::MemoryTransport;
    use std::cell::RefCell;
    use std::rc::Rc;

    const WATER_FRAME: [u8; 24] = [
        0xF7, 0x01, 0x50, 0x52, 0x10, 0x11, 0x42, 0x00, 0x20, 0x05, 0x37, 0x5E, 0x5C, 0x1E, 0x00,
        0x00, 0x00, 0x3C, 0x2D, 0x00, 0x88, 0xC2, 0x00, 0x22,
    ];

    const ANNOUNCE_FRAME: [u8; 10] = [0xF7, 0x05, 0x0F, 0x50, 0x10, 0x03, 0x4A, 0x00, 0x01, 0x55];

    fn link() -> NavienLink<MemoryTransport> {
        NavienLink::new(MemoryTransport::new())
    }

    #[test]
    fn test_partial_header_waits() {
        let mut link = link();
        let now = Instant::now();

        link.transport_mut().push(&[0x00, 0x11, 0xF7, 0x01, 0x50]);
        assert_eq!(link.poll_at(now).unwrap(), 0);
        assert_eq!(link.link_state(), LinkState::HeaderAcquired);
        assert_eq!(link.stats().discarded_bytes, 2);

        link.transport_mut().push(&WATER_FRAME[3..10]);
        assert_eq!(link.poll_at(now).unwrap(), 0);
        assert_eq!(link.link_state(), LinkState::PayloadPending);

        link.transport_mut().push(&WATER_FRAME[10..]);
        assert_eq!(link.poll_at(now).unwrap(), 1);
        assert_eq!(link.link_state(), LinkState::Scanning);
        assert_eq!(link.state().water[2].set_temp, 47.0);
        assert_eq!(link.stats().rx_frames, 1);
    }

    #[test]
    fn test_invalid_length_resyncs() {
        let mut link = link();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        link.on_error(move |e: &Event<'_>| {
            if let Some(err) = e.error() {
                sink.borrow_mut().push(err.to_string());
            }
        });

        let mut bytes = vec![0xF7, 0x05, 0x50, 0x50, 0x90, 0xFF];
        bytes.extend_from_slice(&WATER_FRAME);
        link.transport_mut().push(&bytes);

        assert_eq!(link.poll_at(Instant::now()).unwrap(), 1);
        assert_eq!(errors.borrow().len(), 1);
        assert!(errors.borrow()[0].contains("wiring polarity"));
        assert_eq!(link.stats().framing_errors, 1);
        assert_eq!(link.stats().rx_frames, 1);
    }

    #[test]
    fn test_oversized_length_is_framing_error() {
        let mut link = link();
        link.transport_mut().push(&[0xF7, 0x05, 0x50, 0x50, 0x90, 0x7A]);
        link.poll_at(Instant::now()).unwrap();

        assert_eq!(link.stats().framing_errors, 1);
        assert_eq!(link.link_state(), LinkState::Scanning);
        assert_eq!(link.transport().pending(), 0);
    }

    #[test]
    fn test_power_queues_and_sends_when_idle() {
        let mut link = link();
        let start = Instant::now();

        assert_eq!(link.power(true), Ok(19));
        assert_eq!(link.pending_frames(), 1);

        link.poll_at(start).unwrap();
        assert_eq!(link.pending_frames(), 0);
        let written = link.transport_mut().take_written();
        assert_eq!(written, vec![command::power(true).as_bytes().to_vec()]);

        // Echoed through the command decoder
        assert!(link.state().command.power_command);
        assert!(link.state().command.power_on);
        assert_eq!(link.stats().tx_frames, 1);
    }

    #[test]
    fn test_send_waits_for_idle_gap() {
        let mut link = link();
        let start = Instant::now();

        link.transport_mut().push(&WATER_FRAME);
        link.poll_at(start).unwrap();
        link.power(false).unwrap();

        link.poll_at(start + Duration::from_millis(5)).unwrap();
        assert!(link.transport().written().is_empty());

        link.poll_at(start + Duration::from_millis(10)).unwrap();
        assert_eq!(link.transport().written().len(), 1);
    }

    #[test]
    fn test_flush_after_frame() {
        let config = EngineConfig::default()
            .with_idle_gap(Duration::from_secs(60))
            .with_flush_after_frame(true);
        let mut link = NavienLink::with_config(MemoryTransport::new(), config);
        let start = Instant::now();

        link.transport_mut().push(&WATER_FRAME);
        link.poll_at(start).unwrap();
        link.power(true).unwrap();
        assert!(link.transport().written().is_empty());

        link.transport_mut().push(&WATER_FRAME);
        link.poll_at(start).unwrap();
        assert_eq!(link.transport().written().len(), 1);
    }

    #[test]
    fn test_gateway_blocks_control() {
        let mut link = link();
        link.power(true).unwrap();
        link.transport_mut().push(&ANNOUNCE_FRAME);

        let start = Instant::now();
        link.poll_at(start).unwrap();
        assert!(!link.is_control_available());
        assert_eq!(link.power(true), Err(ControlError::GatewayPresent));
        assert_eq!(link.set_temperature(45.0), Err(ControlError::GatewayPresent));
        assert_eq!(link.press_hot_button(), Err(ControlError::GatewayPresent));
        assert_eq!(link.set_recirculation(true), Err(ControlError::GatewayPresent));

        // The frame queued before the announce is dropped, never written
        link.poll_at(start + Duration::from_secs(1)).unwrap();
        assert!(link.transport().written().is_empty());
        assert_eq!(link.stats().suppressed_frames, 1);
        assert_eq!(link.pending_frames(), 0);
    }

    #[test]
    fn test_short_write_is_not_echoed() {
        let mut link = link();
        link.transport_mut().set_write_limit(Some(4));
        link.power(true).unwrap();
        link.poll_at(Instant::now()).unwrap();

        assert_eq!(link.transport().written()[0].len(), 4);
        assert_eq!(link.stats().tx_frames, 0);
        assert!(!link.state().command.power_command);
    }

    #[test]
    fn test_simulation_mutates_state() {
        let config = EngineConfig::default().with_simulation(true);
        let mut link = NavienLink::with_config(MemoryTransport::new(), config);

        assert_eq!(link.power(true), Ok(19));
        assert!(link.state().water[0].system_power);

        assert_eq!(link.set_temperature(48.2), Ok(19));
        assert_eq!(link.state().water[0].set_temp, 48.0);
        assert_eq!(link.state().gas.set_temp, 48.0);

        assert_eq!(link.set_recirculation(true), Ok(38));
        assert!(link.state().water[0].recirculation_active);
        assert!(link.state().water[0].recirculation_running);
        assert_eq!(link.state().water[0].operating_capacity, 15.0);
        assert_eq!(link.state().gas.current_gas_usage, 200);

        assert_eq!(link.press_hot_button(), Ok(38));
        assert_eq!(link.pending_frames(), 0);
    }

    #[test]
    fn test_first_byte_leaves_simulation() {
        let config = EngineConfig::default().with_simulation(true);
        let mut link = NavienLink::with_config(MemoryTransport::new(), config);

        link.poll_at(Instant::now()).unwrap();
        assert!(link.is_simulation());

        link.transport_mut().push(&[0x00]);
        link.poll_at(Instant::now()).unwrap();
        assert!(!link.is_simulation());
        assert_eq!(link.power(true), Ok(19));
        assert_eq!(link.pending_frames(), 1);
    }

    #[test]
    fn test_reset_stats() {
        let mut link = link();
        link.transport_mut().push(&WATER_FRAME);
        link.poll_at(Instant::now()).unwrap();
        link.power(true).unwrap();

        assert_eq!(link.stats().rx_frames, 1);
        assert_eq!(link.stats().send_queue_len, 1);
        link.reset_stats();
        assert_eq!(link.stats().rx_frames, 0);
        assert_eq!(link.stats().send_queue_len, 1);
    }
}
