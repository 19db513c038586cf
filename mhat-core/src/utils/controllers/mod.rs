//! Module Exports
//!
//! - `expander`: the bus and PWM expander seams the board is generic over.
//! - `pca9685`: the PCA9685 implementation of those seams.
//! - `motor`: per-motor speed and direction control.
//! - `hat`: the board controller that owns the shared hardware.

pub mod expander;
pub mod hat;
pub mod motor;
pub mod pca9685;

use core::fmt;
use serde::{Deserialize, Serialize};

pub use expander::{BusConnector, I2cTarget, PwmExpander, RefCellConnector};
pub use pca9685::{Pca9685Error, Pca9685Expander};

/// Errors raised by the motor hat.
///
/// `B` is the bus connector's error and `P` the PWM expander's.
#[derive(Debug)]
pub enum Error<B, P> {
    /// The bus connection could not be opened.
    Connect(B),
    /// The PWM expander rejected an operation.
    Pwm(P),
    /// Motor index outside `0..MAX_MOTORS`.
    ChannelOutOfRange(usize),
    /// Speed written to a motor whose channels are not bound.
    Uninitialized,
    /// NaN or infinite speed.
    InvalidSpeed(f64),
}

impl<B: fmt::Debug, P: fmt::Debug> fmt::Display for Error<B, P> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Error::Connect(e) => write!(f, "bus connection failed: {:?}", e),
            Error::Pwm(e) => write!(f, "PWM expander error: {:?}", e),
            Error::ChannelOutOfRange(index) => write!(
                f,
                "motor index {} out of range, expected 0..={}",
                index,
                hat::MAX_MOTORS - 1
            ),
            Error::Uninitialized => f.write_str("PWM channels not initialized"),
            Error::InvalidSpeed(value) => write!(f, "speed {} is not a finite number", value),
        }
    }
}

impl<B: fmt::Debug, P: fmt::Debug> core::error::Error for Error<B, P> {}

/// Motor hat command variants.
///
/// Serialized as JSON with tag `"mc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "mc", rename_all = "snake_case")]
pub enum MotorCommand {
    /// Bind the channels of motor `c`.
    Init { c: usize },
    /// Set the signed speed `s` of motor `c`.
    Speed { c: usize, s: f64 },
    /// Stop motor `c`.
    Stop { c: usize },
    /// Stop every initialized motor.
    Halt,
}

/// Decode a single JSON `MotorCommand`.
pub fn parse_command(json: &str) -> Result<MotorCommand, serde_json::Error> {
    serde_json::from_str(json)
}
