//! Board configuration.

use serde::{Deserialize, Serialize};

/// Default I2C address of the motor hat.
pub const DEFAULT_ADDRESS: u8 = 0x60;
/// Default system I2C bus.
pub const DEFAULT_BUS_ID: u8 = 1;
/// Default PWM frequency, the usual rate for motor and servo control.
pub const DEFAULT_FREQUENCY_HZ: u16 = 50;

/// Where the hat lives and how its PWM expander is clocked.
///
/// Missing fields fall back to the defaults above when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HatConfig {
    pub address: u8,
    pub bus_id: u8,
    pub frequency_hz: u16,
}

impl HatConfig {
    /// Default configuration for a hat at `address`.
    pub fn at(address: u8) -> Self {
        HatConfig {
            address,
            ..Default::default()
        }
    }
}

impl Default for HatConfig {
    fn default() -> Self {
        HatConfig {
            address: DEFAULT_ADDRESS,
            bus_id: DEFAULT_BUS_ID,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
        }
    }
}
