//! Decoded, unit-converted view of the heater.
//!
//! The engine owns one [`DeviceState`] and updates it in place as packets are
//! decoded. Consumers get shared references during event delivery or a copy
//! through [`NavienLink::current_state`](crate::NavienLink::current_state).

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::frame::WATER_DEVICE_COUNT;

/// Water status of one sub-device
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct WaterState {
    pub device_index: u8,
    pub system_power: bool,
    /// °C
    pub set_temp: f32,
    /// °C
    pub outlet_temp: f32,
    /// °C
    pub inlet_temp: f32,
    /// Litres per minute, from a tap or the recirculation pump
    pub flow_lpm: f32,
    /// Recirculation mode is enabled
    pub recirculation_active: bool,
    /// Recirculation pump is running right now
    pub recirculation_running: bool,
    /// Panel shows °C
    pub display_metric: bool,
    pub schedule_active: bool,
    pub hotbutton_active: bool,
    /// Percent, 0.0 - 100.0
    pub operating_capacity: f32,
    /// A tap is open
    pub consumption_active: bool,
    pub flow_state: u8,
}

/// Gas status
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GasState {
    /// °C
    pub set_temp: f32,
    /// °C
    pub outlet_temp: f32,
    /// °C
    pub inlet_temp: f32,
    pub controller_version: f32,
    pub panel_version: f32,
    /// m³
    pub accumulated_gas_usage: f32,
    /// Accumulated usage counter as reported, tenths of m³
    pub accumulated_gas_raw: u32,
    /// kcal
    pub current_gas_usage: u16,
    /// Seconds
    pub total_operating_time: u32,
    /// Domestic usage count, reported by the heater in steps of ten
    pub accumulated_domestic_usage_cnt: u32,
}

/// Last control intent seen on the bus.
///
/// Every value is paired with a flag telling whether the frame carried it,
/// since zero is a valid value for several fields.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CommandState {
    pub power_command: bool,
    pub power_on: bool,

    pub set_temp_command: bool,
    /// °C
    pub set_temp: f32,

    pub hot_button_command: bool,

    pub recirculation_command: bool,
    pub recirculation_on: bool,

    pub cmd_data: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct AnnounceState {
    /// A NaviLink gateway is controlling the heater
    pub navilink_present: bool,
}

/// Aggregate state, mutated in place by the decoders
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DeviceState {
    pub water: [WaterState; WATER_DEVICE_COUNT],
    /// Highest water sub-device index observed so far
    pub max_water_device_seen: Option<u8>,
    pub gas: GasState,
    pub command: CommandState,
    pub announce: AnnounceState,
}

impl DeviceState {
    /// Water records of the sub-devices seen so far
    pub fn water_devices(&self) -> &[WaterState] {
        match self.max_water_device_seen {
            Some(max) => &self.water[..=max as usize],
            None => &[],
        }
    }
}
