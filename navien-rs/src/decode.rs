//! Packet dispatch and payload decoders.
//!
//! Each decoder reads fields by offset from the payload slice after a single
//! length check, so a short payload is reported instead of read past. Offsets
//! beyond the minimum length are optional and read as zero when absent.

use log::debug;

use crate::error::{LinkError, Result};
use crate::frame::{Direction, PacketKind, RawFrame, GAS_SUBTYPE, WATER_SUBTYPE};
use crate::state::{CommandState, DeviceState, GasState, WaterState};

/// Water payload offsets
mod water {
    pub const FLOW_STATE: usize = 2;
    pub const SYSTEM_POWER: usize = 3;
    pub const SET_TEMP: usize = 5;
    pub const OUTLET_TEMP: usize = 6;
    pub const INLET_TEMP: usize = 7;
    pub const OPERATING_CAPACITY: usize = 11;
    pub const WATER_FLOW: usize = 12;
    pub const SYSTEM_STATUS: usize = 18;
    pub const RECIRCULATION: usize = 27;

    pub const MIN_LEN: usize = WATER_FLOW + 1;
}

/// Gas payload offsets, 16-bit counters are stored low byte first
mod gas {
    pub const CONTROLLER_VERSION_LO: usize = 4;
    pub const CONTROLLER_VERSION_HI: usize = 5;
    pub const PANEL_VERSION_LO: usize = 6;
    pub const PANEL_VERSION_HI: usize = 7;
    pub const SET_TEMP: usize = 8;
    pub const OUTLET_TEMP: usize = 9;
    pub const INLET_TEMP: usize = 10;
    pub const CURRENT_GAS_LO: usize = 16;
    pub const CUMULATIVE_GAS_LO: usize = 18;
    pub const DOMESTIC_USAGE_LO: usize = 24;
    pub const OPERATING_TIME_LO: usize = 30;

    pub const MIN_LEN: usize = OPERATING_TIME_LO + 2;
}

/// Command payload offsets
mod command {
    pub const SYSTEM_POWER: usize = 2;
    pub const SET_TEMP: usize = 3;
    pub const BUTTONS: usize = 5;
    pub const CMD_DATA: usize = 6;

    pub const MIN_LEN: usize = CMD_DATA + 1;
}

/// Command system_power byte: power on
pub const POWER_ON: u8 = 0x0A;
/// Command system_power byte: power off
pub const POWER_OFF: u8 = 0x0B;
/// Command button bit: hot button pressed
pub const HOT_BUTTON_DOWN: u8 = 0x01;
/// Command button bit: recirculation on
pub const RECIRCULATION_ON: u8 = 0x08;
/// Command button bit: recirculation off
pub const RECIRCULATION_OFF: u8 = 0x10;

const FLOW_CONSUMPTION: u8 = 0x20;
const FLOW_RECIRCULATING: u8 = 0x08;
const POWER_MASK: u8 = 0x05;
const STATUS_METRIC: u8 = 0x08;
const STATUS_SCHEDULE: u8 = 0x02;
const RECIRCULATION_ENABLED: u8 = 0x02;

fn require(kind: &'static str, payload: &[u8], needed: usize) -> Result<()> {
    if payload.len() < needed {
        return Err(LinkError::ShortPayload {
            kind,
            len: payload.len(),
            needed,
        });
    }
    Ok(())
}

fn byte_at(payload: &[u8], offset: usize) -> u8 {
    payload.get(offset).copied().unwrap_or(0)
}

fn word_at(payload: &[u8], lo_offset: usize) -> u16 {
    u16::from_le_bytes([byte_at(payload, lo_offset), byte_at(payload, lo_offset + 1)])
}

/// Half-degree units to °C
fn half_degrees(raw: u8) -> f32 {
    raw as f32 / 2.0
}

/// Tenth-litre units to L/min
fn flow_lpm(raw: u8) -> f32 {
    raw as f32 / 10.0
}

/// Two version digits rendered as "hi.lo" and read back as a number.
fn version(hi: u8, lo: u8) -> f32 {
    format!("{}.{}", hi, lo).parse().unwrap_or(0.0)
}

/// Decode a water status payload for sub-device `device_index`.
pub fn decode_water(payload: &[u8], device_index: u8) -> Result<WaterState> {
    require("water", payload, water::MIN_LEN)?;

    let flow_state = payload[water::FLOW_STATE];
    let system_status = byte_at(payload, water::SYSTEM_STATUS);

    Ok(WaterState {
        device_index,
        system_power: payload[water::SYSTEM_POWER] & POWER_MASK != 0,
        set_temp: half_degrees(payload[water::SET_TEMP]),
        outlet_temp: half_degrees(payload[water::OUTLET_TEMP]),
        inlet_temp: half_degrees(payload[water::INLET_TEMP]),
        flow_lpm: flow_lpm(payload[water::WATER_FLOW]),
        recirculation_active: byte_at(payload, water::RECIRCULATION) & RECIRCULATION_ENABLED != 0,
        recirculation_running: flow_state & FLOW_RECIRCULATING != 0,
        display_metric: system_status & STATUS_METRIC != 0,
        schedule_active: system_status & STATUS_SCHEDULE != 0,
        hotbutton_active: system_status & STATUS_SCHEDULE == 0,
        operating_capacity: half_degrees(payload[water::OPERATING_CAPACITY]),
        consumption_active: flow_state & FLOW_CONSUMPTION != 0,
        flow_state,
    })
}

/// Decode a gas status payload.
pub fn decode_gas(payload: &[u8]) -> Result<GasState> {
    require("gas", payload, gas::MIN_LEN)?;

    let accumulated_gas_raw = word_at(payload, gas::CUMULATIVE_GAS_LO) as u32;
    let operating_time = word_at(payload, gas::OPERATING_TIME_LO) as u32;
    let domestic_usage = word_at(payload, gas::DOMESTIC_USAGE_LO) as u32;

    Ok(GasState {
        set_temp: half_degrees(payload[gas::SET_TEMP]),
        outlet_temp: half_degrees(payload[gas::OUTLET_TEMP]),
        inlet_temp: half_degrees(payload[gas::INLET_TEMP]),
        controller_version: version(
            payload[gas::CONTROLLER_VERSION_HI],
            payload[gas::CONTROLLER_VERSION_LO],
        ),
        panel_version: version(payload[gas::PANEL_VERSION_HI], payload[gas::PANEL_VERSION_LO]),
        accumulated_gas_usage: accumulated_gas_raw as f32 / 10.0,
        accumulated_gas_raw,
        current_gas_usage: word_at(payload, gas::CURRENT_GAS_LO),
        total_operating_time: operating_time * 60,
        accumulated_domestic_usage_cnt: domestic_usage * 10,
    })
}

/// Decode a control command payload.
///
/// Fields left at their "unset" value are reported as absent.
pub fn decode_command(payload: &[u8]) -> Result<CommandState> {
    require("command", payload, command::MIN_LEN)?;

    let mut cmd = CommandState {
        cmd_data: payload[command::CMD_DATA],
        ..Default::default()
    };

    match payload[command::SYSTEM_POWER] {
        POWER_ON => {
            cmd.power_command = true;
            cmd.power_on = true;
        }
        POWER_OFF => {
            cmd.power_command = true;
            cmd.power_on = false;
        }
        _ => {}
    }

    let set_temp = payload[command::SET_TEMP];
    if set_temp > 0 {
        cmd.set_temp_command = true;
        cmd.set_temp = half_degrees(set_temp);
    }

    let buttons = payload[command::BUTTONS];
    if buttons & HOT_BUTTON_DOWN != 0 {
        cmd.hot_button_command = true;
    }
    if buttons & RECIRCULATION_ON != 0 {
        cmd.recirculation_command = true;
        cmd.recirculation_on = true;
    } else if buttons & RECIRCULATION_OFF != 0 {
        cmd.recirculation_command = true;
        cmd.recirculation_on = false;
    }

    Ok(cmd)
}

fn unknown(direction: Direction, packet_type: u8, frame: &RawFrame) -> LinkError {
    LinkError::UnknownPacket {
        direction,
        packet_type,
        raw: frame.as_bytes().to_vec(),
    }
}

/// Route a checksum-verified frame to its decoder and fold the result into
/// `state`.
///
/// Returns the kind of packet that was applied. `state` is left untouched on
/// error.
pub fn dispatch(frame: &RawFrame, state: &mut DeviceState) -> Result<PacketKind> {
    let header = frame.header().ok_or(LinkError::BufferTooSmall { len: frame.len() })?;
    let direction = header.direction().ok_or_else(|| LinkError::UnknownDirection {
        direction: header.direction,
        raw: frame.as_bytes().to_vec(),
    })?;
    let payload = frame.payload();
    let cmd_type = payload.first().copied();

    let kind = PacketKind::classify(direction, header.packet_type, cmd_type)
        .ok_or_else(|| unknown(direction, cmd_type.unwrap_or(header.packet_type), frame))?;

    match kind {
        PacketKind::Water { device_index } => {
            // Cascaded units share the type range with a different sub-type
            if cmd_type != Some(WATER_SUBTYPE) {
                return Err(unknown(direction, header.packet_type, frame));
            }
            let water = decode_water(payload, device_index)?;
            state.water[device_index as usize] = water;
            if state.max_water_device_seen.map_or(true, |max| device_index > max) {
                state.max_water_device_seen = Some(device_index);
            }
            debug!(
                "water[{}]: power={} set={} out={} in={} flow={}",
                device_index,
                water.system_power,
                water.set_temp,
                water.outlet_temp,
                water.inlet_temp,
                water.flow_lpm
            );
        }
        PacketKind::Gas => {
            if cmd_type != Some(GAS_SUBTYPE) {
                return Err(unknown(direction, header.packet_type, frame));
            }
            state.gas = decode_gas(payload)?;
            debug!(
                "gas: set={} out={} in={} current={}kcal",
                state.gas.set_temp,
                state.gas.outlet_temp,
                state.gas.inlet_temp,
                state.gas.current_gas_usage
            );
        }
        PacketKind::Announce => {
            state.announce.navilink_present = true;
            debug!("announce: {}", frame.to_hex());
        }
        PacketKind::Command => {
            state.command = decode_command(payload)?;
            debug!("command: {:?}", state.command);
        }
    }

    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CONTROL_COMMAND;

    // Water, sub-device 2, set 47.0 out 46.0 in 15.0
    const WATER_FRAME: [u8; 24] = [
        0xF7, 0x01, 0x50, 0x52, 0x10, 0x11, 0x42, 0x00, 0x20, 0x05, 0x37, 0x5E, 0x5C, 0x1E, 0x00,
        0x00, 0x00, 0x3C, 0x2D, 0x00, 0x88, 0xC2, 0x00, 0x22,
    ];

    fn gas_payload() -> [u8; 42] {
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
        g
    }

    #[test]
    fn test_decode_water_fixture() {
        let frame = RawFrame::from_bytes(&WATER_FRAME).unwrap();
        let water = decode_water(frame.payload(), 2).unwrap();

        assert_eq!(water.device_index, 2);
        assert!(water.system_power);
        assert!(water.consumption_active);
        assert!(!water.recirculation_running);
        assert_eq!(water.set_temp, 47.0);
        assert_eq!(water.outlet_temp, 46.0);
        assert_eq!(water.inlet_temp, 15.0);
        assert_eq!(water.operating_capacity, 30.0);
        assert!((water.flow_lpm - 4.5).abs() < 1e-6);
        // Status byte lies beyond this short payload
        assert!(!water.schedule_active);
        assert!(water.hotbutton_active);
        assert!(!water.recirculation_active);
    }

    #[test]
    fn test_decode_water_status_flags() {
        let mut w = [0u8; 34];
        w[0] = 0x42;
        w[2] = 0x08;
        w[18] = 0x0A;
        w[27] = 0x02;
        let water = decode_water(&w, 0).unwrap();

        assert!(!water.system_power);
        assert!(water.recirculation_running);
        assert!(!water.consumption_active);
        assert!(water.display_metric);
        assert!(water.schedule_active);
        assert!(!water.hotbutton_active);
        assert!(water.recirculation_active);
        assert_eq!(water.flow_state, 0x08);
    }

    #[test]
    fn test_decode_water_short_payload() {
        let err = decode_water(&[0x42, 0, 0x20], 0).unwrap_err();
        assert!(matches!(
            err,
            LinkError::ShortPayload { kind: "water", len: 3, needed: 13 }
        ));
    }

    #[test]
    fn test_decode_gas_counters() {
        let gas = decode_gas(&gas_payload()).unwrap();

        assert_eq!(gas.set_temp, 60.0);
        assert_eq!(gas.outlet_temp, 59.0);
        assert_eq!(gas.inlet_temp, 16.0);
        assert!((gas.controller_version - 2.5).abs() < 1e-6);
        assert!((gas.panel_version - 1.12).abs() < 1e-6);
        assert_eq!(gas.current_gas_usage, 300);
        assert_eq!(gas.accumulated_gas_raw, 4660);
        assert!((gas.accumulated_gas_usage - 466.0).abs() < 1e-3);
        assert_eq!(gas.accumulated_domestic_usage_cnt, 10_000);
        // 0xFFFF minutes must not wrap
        assert_eq!(gas.total_operating_time, 3_932_100);
    }

    #[test]
    fn test_decode_gas_short_payload() {
        let payload = gas_payload();
        assert!(matches!(
            decode_gas(&payload[..31]),
            Err(LinkError::ShortPayload { kind: "gas", .. })
        ));
    }

    #[test]
    fn test_decode_command_fields() {
        let mut p = [0u8; 12];
        p[0] = CONTROL_COMMAND;

        let cmd = decode_command(&p).unwrap();
        assert_eq!(cmd, CommandState::default());

        p[2] = POWER_OFF;
        p[3] = 0x5E;
        p[5] = RECIRCULATION_OFF;
        p[6] = 0x01;
        let cmd = decode_command(&p).unwrap();
        assert!(cmd.power_command);
        assert!(!cmd.power_on);
        assert!(cmd.set_temp_command);
        assert_eq!(cmd.set_temp, 47.0);
        assert!(!cmd.hot_button_command);
        assert!(cmd.recirculation_command);
        assert!(!cmd.recirculation_on);
        assert_eq!(cmd.cmd_data, 0x01);

        p[5] = HOT_BUTTON_DOWN | RECIRCULATION_ON;
        let cmd = decode_command(&p).unwrap();
        assert!(cmd.hot_button_command);
        assert!(cmd.recirculation_on);
    }

    #[test]
    fn test_dispatch_water_tracks_device() {
        let frame = RawFrame::from_bytes(&WATER_FRAME).unwrap();
        let mut state = DeviceState::default();

        let kind = dispatch(&frame, &mut state).unwrap();
        assert_eq!(kind, PacketKind::Water { device_index: 2 });
        assert_eq!(state.max_water_device_seen, Some(2));
        assert_eq!(state.water[2].set_temp, 47.0);
        assert_eq!(state.water_devices().len(), 3);
    }

    #[test]
    fn test_dispatch_rejects_cascade_subtype() {
        let cascade = [0xF7, 0x13, 0x50, 0x52, 0x10, 0x03, 0x40, 0x00, 0x04, 0xA6];
        let frame = RawFrame::from_bytes(&cascade).unwrap();
        let mut state = DeviceState::default();

        match dispatch(&frame, &mut state) {
            Err(LinkError::UnknownPacket { packet_type, raw, .. }) => {
                assert_eq!(packet_type, 0x52);
                assert_eq!(raw, cascade.to_vec());
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(state, DeviceState::default());
    }

    #[test]
    fn test_dispatch_announce_sets_gateway() {
        let announce = [0xF7, 0x05, 0x0F, 0x50, 0x10, 0x03, 0x4A, 0x00, 0x01, 0x55];
        let frame = RawFrame::from_bytes(&announce).unwrap();
        let mut state = DeviceState::default();

        assert_eq!(dispatch(&frame, &mut state).unwrap(), PacketKind::Announce);
        assert!(state.announce.navilink_present);
    }

    #[test]
    fn test_dispatch_unknown_control() {
        let unknown = [0xF7, 0x05, 0x0F, 0x50, 0x10, 0x03, 0x55, 0x00, 0x01, 0x29];
        let frame = RawFrame::from_bytes(&unknown).unwrap();
        let mut state = DeviceState::default();

        assert!(matches!(
            dispatch(&frame, &mut state),
            Err(LinkError::UnknownPacket { direction: Direction::Control, packet_type: 0x55, .. })
        ));
    }
}
