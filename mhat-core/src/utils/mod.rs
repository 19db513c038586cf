//! Utility re-exports for the motor hat driver.
//!
//! - `config`: board configuration and its defaults
//! - `controllers`: the board controller, per-motor controllers and the
//!   PCA9685 backend

pub mod config;
pub mod controllers;

pub use config::HatConfig;
pub use controllers::{
    hat::{Motor, MotorHat, Pca9685Hat},
    motor::MotorController,
    parse_command, Error, MotorCommand,
};
