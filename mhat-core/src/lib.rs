//! Driver for PCA9685-based dual H-bridge motor hats on no-std platforms.
//!
//! The `hat-cli` binary under `mhat-app/` drives this crate from JSON command lines.
#![cfg_attr(not(test), no_std)]

pub mod utils;
