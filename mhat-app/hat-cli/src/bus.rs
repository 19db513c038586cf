//! Bus connectors for the CLI.

use std::convert::Infallible;

use embedded_hal::i2c::{ErrorType, I2c, Operation};
use mhat_core::utils::controllers::{BusConnector, I2cTarget};
use tracing::info;

/// I2C bus that logs every transfer instead of touching hardware.
pub struct TraceBus {
    bus_id: u8,
}

impl ErrorType for TraceBus {
    type Error = Infallible;
}

impl I2c for TraceBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    info!(bus = self.bus_id, "I2C 0x{:02X} <- {:02X?}", address, bytes)
                }
                Operation::Read(buffer) => {
                    buffer.fill(0);
                    info!(bus = self.bus_id, "I2C 0x{:02X} -> {} zero bytes", address, buffer.len())
                }
            }
        }
        Ok(())
    }
}

/// Hands out `TraceBus` connections.
pub struct TraceConnector;

impl BusConnector for TraceConnector {
    type Connection = I2cTarget<TraceBus>;
    type Error = Infallible;

    fn connect(
        &mut self,
        bus_id: u8,
        address: u8,
    ) -> Result<Self::Connection, Self::Error> {
        Ok(I2cTarget {
            bus: TraceBus { bus_id },
            address,
        })
    }
}

/// Opens `/dev/i2c-<bus>` through the Linux i2cdev interface.
#[cfg(feature = "linux")]
pub struct DevConnector;

#[cfg(feature = "linux")]
impl BusConnector for DevConnector {
    type Connection = I2cTarget<linux_embedded_hal::I2cdev>;
    type Error = linux_embedded_hal::i2cdev::linux::LinuxI2CError;

    fn connect(
        &mut self,
        bus_id: u8,
        address: u8,
    ) -> Result<Self::Connection, Self::Error> {
        let path = format!("/dev/i2c-{bus_id}");
        info!(%path, "Opening I2C device");
        Ok(I2cTarget {
            bus: linux_embedded_hal::I2cdev::new(path)?,
            address,
        })
    }
}
