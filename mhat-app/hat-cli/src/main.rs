use std::io::{self, BufRead};

use clap::Parser;
use embedded_hal::i2c::I2c;
use mhat_core::utils::{
    config::{DEFAULT_ADDRESS, DEFAULT_BUS_ID, DEFAULT_FREQUENCY_HZ},
    controllers::{BusConnector, I2cTarget, Pca9685Expander},
    parse_command, HatConfig, MotorHat,
};
use tracing::{error, info, warn};

mod bus;

#[derive(Parser)]
#[clap(version = "1.0", about = "Drive a PCA9685 motor hat from JSON commands on stdin")]
struct Opts {
    /// I2C address of the hat, decimal or 0x-prefixed hex
    #[clap(long, default_value_t = DEFAULT_ADDRESS, value_parser = parse_address)]
    address: u8,
    /// I2C bus number
    #[clap(long, default_value_t = DEFAULT_BUS_ID)]
    bus: u8,
    /// PWM frequency in Hz
    #[clap(long, default_value_t = DEFAULT_FREQUENCY_HZ)]
    frequency: u16,
    /// Motors to initialize before reading commands, e.g. `0,1`
    #[clap(long, value_delimiter = ',')]
    init: Vec<usize>,
    /// Talk to /dev/i2c-<bus> instead of logging bus traffic (needs the `linux` feature)
    #[clap(long)]
    device: bool,
}

fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid I2C address `{s}`: {e}"))
}

/// Execute command lines from stdin until EOF, then release the hat.
fn run<C, I2C>(
    config: HatConfig,
    connector: C,
    init: &[usize],
) where
    C: BusConnector<Connection = I2cTarget<I2C>>,
    I2C: I2c,
{
    let mut hat: MotorHat<C, Pca9685Expander<I2C>> = MotorHat::with_config(config, connector);

    for &index in init {
        match hat.init(index) {
            Ok(()) => info!(index, "Motor initialized"),
            Err(e) => error!("Motor {} init failed: {}", index, e),
        }
    }

    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Ignoring malformed command {:?}: {}", line, e);
                continue;
            }
        };
        info!("Received Motor Command: {:?}", command);
        match hat.execute_command(command) {
            Ok(()) => info!("Motor command executed successfully"),
            Err(e) => error!("Motor command failed: {}", e),
        }
    }

    if let Err(e) = hat.dispose() {
        error!("Motor hat teardown failed: {}", e);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts: Opts = Opts::parse();
    let config = HatConfig {
        address: opts.address,
        bus_id: opts.bus,
        frequency_hz: opts.frequency,
    };
    info!(?config, "Starting motor hat");

    if opts.device {
        #[cfg(feature = "linux")]
        {
            run(config, bus::DevConnector, &opts.init);
            return;
        }
        #[cfg(not(feature = "linux"))]
        warn!("Built without the `linux` feature, logging bus traffic instead");
    }

    run(config, bus::TraceConnector, &opts.init);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_parse_as_hex_or_decimal() {
        assert_eq!(parse_address("0x60"), Ok(0x60));
        assert_eq!(parse_address("0X6f"), Ok(0x6F));
        assert_eq!(parse_address("96"), Ok(96));
        assert!(parse_address("0x160").is_err());
        assert!(parse_address("hat").is_err());
    }

    #[test]
    fn defaults_match_core_config() {
        let opts = Opts::parse_from(["hat-cli"]);
        assert_eq!(opts.address, HatConfig::default().address);
        assert_eq!(opts.bus, HatConfig::default().bus_id);
        assert_eq!(opts.frequency, HatConfig::default().frequency_hz);
        assert!(opts.init.is_empty());

        let opts = Opts::parse_from(["hat-cli", "--address", "0x61", "--init", "0,2"]);
        assert_eq!(opts.address, 0x61);
        assert_eq!(opts.init, vec![0, 2]);
    }
}
