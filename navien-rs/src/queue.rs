//! Outbound send queue and bus arbitration.

use std::time::{Duration, Instant};

use heapless::Deque;
use log::{debug, trace};

use crate::error::ControlError;
use crate::frame::RawFrame;

/// Frames that can wait for the bus at once.
pub const SEND_QUEUE_CAPACITY: usize = 8;

/// Default quiet time required before transmitting.
pub const DEFAULT_IDLE_GAP: Duration = Duration::from_millis(10);

/// Bounded FIFO of sealed frames waiting for the bus.
///
/// Overflow is rejected; the oldest frame is never dropped to make room.
#[derive(Debug, Default)]
pub struct SendQueue {
    frames: Deque<RawFrame, SEND_QUEUE_CAPACITY>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self {
            frames: Deque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn free(&self) -> usize {
        SEND_QUEUE_CAPACITY - self.frames.len()
    }

    /// Queue a group of frames as one unit: either all fit or none is queued.
    ///
    /// Returns the number of bytes queued.
    pub fn push_all(&mut self, frames: &[RawFrame]) -> Result<usize, ControlError> {
        if frames.len() > self.free() {
            debug!(
                "QUEUE: full, {} frame(s) rejected (len={})",
                frames.len(),
                self.frames.len()
            );
            return Err(ControlError::QueueFull);
        }

        let mut bytes = 0;
        for frame in frames {
            bytes += frame.len();
            self.frames
                .push_back(*frame)
                .map_err(|_| ControlError::QueueFull)?;
        }
        debug!(
            "QUEUE: added {} frame(s), {} bytes, queue_len_after={}",
            frames.len(),
            bytes,
            self.frames.len()
        );
        Ok(bytes)
    }

    pub fn pop(&mut self) -> Option<RawFrame> {
        self.frames.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawFrame> {
        self.frames.iter()
    }
}

/// Decides when the half-duplex bus is free for us to talk.
///
/// The receive side is considered idle once no byte has been observed for at
/// least `idle_gap`. Nothing observed yet counts as idle.
#[derive(Debug, Clone)]
pub struct Arbiter {
    idle_gap: Duration,
    last_activity: Option<Instant>,
}

impl Arbiter {
    pub fn new(idle_gap: Duration) -> Self {
        Self {
            idle_gap,
            last_activity: None,
        }
    }

    /// Record bus traffic (received bytes or our own transmission).
    pub fn note_activity(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    /// Time since the last observed traffic.
    pub fn silence(&self, now: Instant) -> Option<Duration> {
        self.last_activity
            .map(|last| now.saturating_duration_since(last))
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        match self.silence(now) {
            Some(quiet) => {
                let idle = quiet >= self.idle_gap;
                if !idle {
                    trace!("ARB: bus busy, quiet for {:?} < {:?}", quiet, self.idle_gap);
                }
                idle
            }
            None => true,
        }
    }
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_GAP)
    }
}
