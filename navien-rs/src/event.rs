//! Notifications delivered synchronously from [`NavienLink::poll`].
//!
//! Events borrow the engine's state and frame buffer, so they are only valid
//! for the duration of the callback. Copy what you need to keep.
//!
//! [`NavienLink::poll`]: crate::NavienLink::poll

use crate::error::LinkError;
use crate::frame::RawFrame;
use crate::state::{CommandState, DeviceState, GasState, WaterState};

/// Event categories a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Water,
    Gas,
    Command,
    Announce,
    Error,
}

/// One decoded packet or bus fault.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// Water status of one sub-device was updated.
    Water {
        device_index: u8,
        state: &'a DeviceState,
        frame: &'a RawFrame,
    },
    /// Gas status was updated.
    Gas {
        state: &'a DeviceState,
        frame: &'a RawFrame,
    },
    /// A control command was seen on the bus or sent by this engine.
    Command {
        state: &'a DeviceState,
        frame: &'a RawFrame,
    },
    /// A gateway announced itself.
    Announce {
        state: &'a DeviceState,
        frame: &'a RawFrame,
    },
    /// A frame was dropped or could not be decoded.
    Error(&'a LinkError),
}

impl<'a> Event<'a> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Water { .. } => EventKind::Water,
            Event::Gas { .. } => EventKind::Gas,
            Event::Command { .. } => EventKind::Command,
            Event::Announce { .. } => EventKind::Announce,
            Event::Error(_) => EventKind::Error,
        }
    }

    /// State after the update, absent for errors.
    pub fn state(&self) -> Option<&'a DeviceState> {
        match *self {
            Event::Water { state, .. }
            | Event::Gas { state, .. }
            | Event::Command { state, .. }
            | Event::Announce { state, .. } => Some(state),
            Event::Error(_) => None,
        }
    }

    /// Frame the event was decoded from, absent for errors.
    pub fn frame(&self) -> Option<&'a RawFrame> {
        match *self {
            Event::Water { frame, .. }
            | Event::Gas { frame, .. }
            | Event::Command { frame, .. }
            | Event::Announce { frame, .. } => Some(frame),
            Event::Error(_) => None,
        }
    }

    /// The updated water record, for water events.
    pub fn water(&self) -> Option<&'a WaterState> {
        match *self {
            Event::Water {
                device_index,
                state,
                ..
            } => state.water.get(device_index as usize),
            _ => None,
        }
    }

    pub fn gas(&self) -> Option<&'a GasState> {
        match *self {
            Event::Gas { state, .. } => Some(&state.gas),
            _ => None,
        }
    }

    pub fn command(&self) -> Option<&'a CommandState> {
        match *self {
            Event::Command { state, .. } => Some(&state.command),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&'a LinkError> {
        match *self {
            Event::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Receiver of link events.
///
/// Implemented for any `FnMut(&Event)`, so closures can be registered
/// directly. Listeners must not call back into the engine.
pub trait Listener {
    fn on_event(&mut self, event: &Event<'_>);
}

impl<F> Listener for F
where
    F: FnMut(&Event<'_>),
{
    fn on_event(&mut self, event: &Event<'_>) {
        self(event)
    }
}

/// A registered listener and the events it wants.
pub(crate) struct Subscription {
    filter: Option<EventKind>,
    listener: Box<dyn Listener>,
}

impl Subscription {
    pub(crate) fn new(filter: Option<EventKind>, listener: Box<dyn Listener>) -> Self {
        Self { filter, listener }
    }
}

/// Deliver `event` to every subscription whose filter matches.
///
/// Takes the subscriptions apart from the engine so the event can borrow the
/// engine's state and frame at the same time.
pub(crate) fn emit(subscriptions: &mut [Subscription], event: &Event<'_>) {
    let kind = event.kind();
    for sub in subscriptions.iter_mut() {
        if sub.filter.map_or(true, |filter| filter == kind) {
            sub.listener.on_event(event);
        }
    }
}
