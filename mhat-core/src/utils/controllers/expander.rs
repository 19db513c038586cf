//! Hardware seams consumed by the motor hat.
//!
//! The board never talks to a bus directly. It asks a [`BusConnector`] for a
//! connection once, hands that connection to a [`PwmExpander`], and from then
//! on only writes duty cycles through the expander's channel handles.

use core::{cell::RefCell, convert::Infallible, fmt::Debug};

use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;

/// A bus handle paired with the 7-bit address of the device behind it.
#[derive(Debug)]
pub struct I2cTarget<I2C> {
    pub bus: I2C,
    pub address: u8,
}

/// Factory for bus connections.
pub trait BusConnector {
    type Connection;
    type Error: Debug;

    /// Open a connection to `address` on bus `bus_id`.
    fn connect(
        &mut self,
        bus_id: u8,
        address: u8,
    ) -> Result<Self::Connection, Self::Error>;

    /// Release a connection previously returned by [`connect`](Self::connect).
    fn disconnect(
        &mut self,
        connection: Self::Connection,
    ) -> Result<(), Self::Error> {
        drop(connection);
        Ok(())
    }
}

/// A chip generating many independent PWM outputs.
///
/// Channel handles are exclusive: a sub-channel can only be created again
/// after its handle was given back through [`release_channel`](Self::release_channel).
pub trait PwmExpander: Sized {
    type Connection;
    type Channel;
    type Error: Debug;

    /// Take over `connection` and run the outputs at `frequency_hz`.
    ///
    /// On failure the connection is handed back when it is still intact, so
    /// the caller can return it to its connector.
    fn open(
        connection: Self::Connection,
        frequency_hz: u16,
    ) -> Result<Self, (Self::Error, Option<Self::Connection>)>;

    /// Claim output line `sub_channel`.
    fn create_channel(
        &mut self,
        sub_channel: u8,
    ) -> Result<Self::Channel, Self::Error>;

    /// Drive `channel` with `duty_cycle`, a fraction in `[0, 1]`.
    ///
    /// Anything outside that range is rejected with a range error.
    fn set_duty_cycle(
        &mut self,
        channel: &Self::Channel,
        duty_cycle: f64,
    ) -> Result<(), Self::Error>;

    fn release_channel(
        &mut self,
        channel: Self::Channel,
    ) -> Result<(), Self::Error>;

    /// Shut the expander down and hand the connection back.
    fn close(self) -> Result<Self::Connection, Self::Error>;
}

/// Connector over an I2C bus shared through a `RefCell`.
///
/// The bus stays usable by other drivers; the hat only borrows it for the
/// duration of each transfer.
pub struct RefCellConnector<'a, I2C> {
    bus: &'a RefCell<I2C>,
}

impl<'a, I2C> RefCellConnector<'a, I2C> {
    pub fn new(bus: &'a RefCell<I2C>) -> Self {
        RefCellConnector { bus }
    }
}

impl<'a, I2C: I2c> BusConnector for RefCellConnector<'a, I2C> {
    type Connection = I2cTarget<RefCellDevice<'a, I2C>>;
    type Error = Infallible;

    fn connect(
        &mut self,
        bus_id: u8,
        address: u8,
    ) -> Result<Self::Connection, Self::Error> {
        // The bus is already open; `bus_id` only identifies it in logs.
        tracing::debug!(bus_id, address, "Attaching to shared I2C bus");
        Ok(I2cTarget {
            bus: RefCellDevice::new(self.bus),
            address,
        })
    }
}
