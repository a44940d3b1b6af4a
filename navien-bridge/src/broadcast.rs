//! UDP broadcast of decoded heater state
//!
//! Each water or gas update goes out as one JSON datagram on the local
//! broadcast address so loggers on the LAN can record it without talking to
//! the bus.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use navien_rs::Event;
use serde_json::{Map, Value};

pub struct StateBroadcaster {
    socket: UdpSocket,
    target: SocketAddr,
}

impl StateBroadcaster {
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_broadcast(true)?;
        let target = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port));
        info!("Broadcasting state to {}", target);
        Ok(Self { socket, target })
    }

    /// Send `event` if it carries water or gas state.
    pub fn publish(&self, event: &Event<'_>) -> io::Result<()> {
        let message = match event_json(event, Utc::now()) {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        };
        self.socket.send_to(message.as_bytes(), self.target)?;
        debug!("UDP {} bytes -> {}", message.len(), self.target);
        Ok(())
    }
}

/// JSON record for a water or gas event, `None` for anything else.
///
/// The record's fields are flattened next to `type` and `timestamp`.
pub fn event_json(event: &Event<'_>, timestamp: DateTime<Utc>) -> serde_json::Result<Option<String>> {
    let (kind, record) = if let Some(water) = event.water() {
        ("water", serde_json::to_value(water)?)
    } else if let Some(gas) = event.gas() {
        ("gas", serde_json::to_value(gas)?)
    } else {
        return Ok(None);
    };

    let mut fields = match record {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    fields.insert("type".into(), Value::from(kind));
    fields.insert(
        "timestamp".into(),
        Value::from(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    serde_json::to_string(&Value::Object(fields)).map(Some)
}
