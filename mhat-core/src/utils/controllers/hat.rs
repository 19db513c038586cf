//! Board-level controller for the motor hat.
//!
//! `MotorHat` owns the bus connection and the PWM expander and hands them to
//! its motors only for the duration of a write. Hardware is opened on the
//! first [`MotorHat::init`] and released by [`MotorHat::dispose`], or on drop.

use embedded_hal_bus::i2c::RefCellDevice;

use super::{
    expander::{BusConnector, PwmExpander, RefCellConnector},
    motor::{MotorChannels, MotorController},
    pca9685::Pca9685Expander,
    Error, MotorCommand,
};
use crate::utils::config::HatConfig;

/// Number of motor slots on the board.
pub const MAX_MOTORS: usize = 16;
/// Output lines bound per motor.
pub const CHANNELS_PER_MOTOR: u8 = 3;

/// Error type of a `MotorHat<C, X>`.
pub type HatError<C, X> =
    Error<<C as BusConnector>::Error, <X as PwmExpander>::Error>;

/// A hat driven by a PCA9685 on a `RefCell`-shared I2C bus.
pub type Pca9685Hat<'a, I2C> =
    MotorHat<RefCellConnector<'a, I2C>, Pca9685Expander<RefCellDevice<'a, I2C>>>;

/// Expander output lines (speed, direction A, direction B) for motor `index`.
///
/// `None` for an index outside `0..MAX_MOTORS`.
pub fn sub_channels(index: usize) -> Option<[u8; 3]> {
    if index >= MAX_MOTORS {
        return None;
    }
    let base = u8::try_from(index).ok()?.checked_mul(CHANNELS_PER_MOTOR)?;
    Some([base, base + 1, base + 2])
}

/// Controller for a whole motor hat.
///
/// Not safe for concurrent use; every mutating call takes `&mut self`.
pub struct MotorHat<C, X>
where
    C: BusConnector,
    X: PwmExpander<Connection = C::Connection>,
{
    config: HatConfig,
    connector: C,
    // Owns the connection while present.
    expander: Option<X>,
    motors: [Option<MotorController<X::Channel>>; MAX_MOTORS],
}

impl<C, X> MotorHat<C, X>
where
    C: BusConnector,
    X: PwmExpander<Connection = C::Connection>,
{
    /// Create a controller for the hat at `address`. No bus access happens here.
    pub fn new(
        address: u8,
        connector: C,
    ) -> Self {
        Self::with_config(HatConfig::at(address), connector)
    }

    pub fn with_config(
        config: HatConfig,
        connector: C,
    ) -> Self {
        MotorHat {
            config,
            connector,
            expander: None,
            motors: core::array::from_fn(|_| None),
        }
    }

    pub fn config(&self) -> &HatConfig {
        &self.config
    }

    /// True once the connection and expander have been opened.
    pub fn is_open(&self) -> bool {
        self.expander.is_some()
    }

    /// Bind the output lines of motor `index`, opening the hardware if needed.
    ///
    /// Calling it again for an initialized motor does nothing.
    pub fn init(
        &mut self,
        index: usize,
    ) -> Result<(), HatError<C, X>> {
        let lines = sub_channels(index).ok_or(Error::ChannelOutOfRange(index))?;
        if self.motors[index]
            .as_ref()
            .is_some_and(MotorController::is_initialized)
        {
            return Ok(());
        }

        let expander = open_expander(&mut self.expander, &mut self.connector, &self.config)?;
        let mut motor = self.motors[index].take().unwrap_or_default();
        let result = match bind_channels(expander, lines) {
            Ok(channels) => {
                motor.bind(channels);
                tracing::debug!(index, sub_channels = ?lines, "Motor initialized");
                Ok(())
            }
            Err(e) => {
                tracing::error!(index, ?e, "Motor init failed");
                Err(Error::Pwm(e))
            }
        };
        // A failed bind leaves an uninitialized controller to be reused.
        self.motors[index] = Some(motor);
        result
    }

    /// Motor in slot `index`, or `None` if the slot was never initialized.
    pub fn motor(
        &self,
        index: usize,
    ) -> Result<Option<&MotorController<X::Channel>>, HatError<C, X>> {
        check_index(index)?;
        Ok(self.motors[index].as_ref())
    }

    /// Mutable view of motor `index` that writes through this board.
    pub fn motor_mut(
        &mut self,
        index: usize,
    ) -> Result<Motor<'_, C, X>, HatError<C, X>> {
        check_index(index)?;
        Ok(Motor { hat: self, index })
    }

    /// Write a signed speed to motor `index`.
    pub fn set_speed(
        &mut self,
        index: usize,
        value: f64,
    ) -> Result<(), HatError<C, X>> {
        check_index(index)?;
        let motor = self.motors[index].as_mut().ok_or(Error::Uninitialized)?;
        let expander = self.expander.as_mut().ok_or(Error::Uninitialized)?;
        motor.set_speed(expander, value)
    }

    pub fn stop(
        &mut self,
        index: usize,
    ) -> Result<(), HatError<C, X>> {
        self.set_speed(index, 0.0)
    }

    /// Stop every initialized motor.
    pub fn halt(&mut self) -> Result<(), HatError<C, X>> {
        for index in 0..MAX_MOTORS {
            if self.motors[index]
                .as_ref()
                .is_some_and(MotorController::is_initialized)
            {
                self.stop(index)?;
            }
        }
        Ok(())
    }

    /// Execute a `MotorCommand` against the board.
    pub fn execute_command(
        &mut self,
        command: MotorCommand,
    ) -> Result<(), HatError<C, X>> {
        match command {
            MotorCommand::Init { c } => self.init(c),
            MotorCommand::Speed { c, s } => self.set_speed(c, s),
            MotorCommand::Stop { c } => self.stop(c),
            MotorCommand::Halt => self.halt(),
        }
    }

    /// Stop and release every motor, then the expander and the connection.
    ///
    /// Release is best-effort: every resource is attempted and the first error
    /// is returned.
    pub fn dispose(mut self) -> Result<(), HatError<C, X>> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), HatError<C, X>> {
        let mut first_error = None;
        let mut keep = |result: Result<(), HatError<C, X>>| {
            if let Err(e) = result {
                tracing::warn!(?e, "Teardown step failed");
                first_error.get_or_insert(e);
            }
        };

        // Empty slots are skipped; the remaining motors are still released.
        for (index, slot) in self.motors.iter_mut().enumerate() {
            let Some(mut motor) = slot.take() else {
                continue;
            };
            let (Some(channels), Some(expander)) = (motor.unbind(), self.expander.as_mut()) else {
                continue;
            };
            if motor.speed() != 0.0 {
                keep(expander.set_duty_cycle(&channels.speed, 0.0).map_err(Error::Pwm));
            }
            let MotorChannels {
                speed,
                direction_a,
                direction_b,
            } = channels;
            for channel in [speed, direction_a, direction_b] {
                keep(expander.release_channel(channel).map_err(Error::Pwm));
            }
            tracing::debug!(index, "Motor released");
        }

        if let Some(expander) = self.expander.take() {
            match expander.close() {
                Ok(connection) => keep(self.connector.disconnect(connection).map_err(Error::Connect)),
                Err(e) => keep(Err(Error::Pwm(e))),
            }
            tracing::info!(address = self.config.address, "Motor hat closed");
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl<C, X> Drop for MotorHat<C, X>
where
    C: BusConnector,
    X: PwmExpander<Connection = C::Connection>,
{
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::error!(?e, "Motor hat teardown on drop failed");
        }
    }
}

/// A motor slot borrowed from its board.
pub struct Motor<'a, C, X>
where
    C: BusConnector,
    X: PwmExpander<Connection = C::Connection>,
{
    hat: &'a mut MotorHat<C, X>,
    index: usize,
}

impl<C, X> Motor<'_, C, X>
where
    C: BusConnector,
    X: PwmExpander<Connection = C::Connection>,
{
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_initialized(&self) -> bool {
        self.controller().is_some_and(MotorController::is_initialized)
    }

    /// Last speed written, zero for an empty slot.
    pub fn speed(&self) -> f64 {
        self.controller().map_or(0.0, MotorController::speed)
    }

    pub fn set_speed(
        &mut self,
        value: f64,
    ) -> Result<(), HatError<C, X>> {
        self.hat.set_speed(self.index, value)
    }

    pub fn stop(&mut self) -> Result<(), HatError<C, X>> {
        self.hat.stop(self.index)
    }

    fn controller(&self) -> Option<&MotorController<X::Channel>> {
        self.hat.motors[self.index].as_ref()
    }
}

fn check_index<B, P>(index: usize) -> Result<(), Error<B, P>> {
    if index < MAX_MOTORS {
        Ok(())
    } else {
        Err(Error::ChannelOutOfRange(index))
    }
}

/// Open the connection and expander on first use.
fn open_expander<'e, C, X>(
    slot: &'e mut Option<X>,
    connector: &mut C,
    config: &HatConfig,
) -> Result<&'e mut X, HatError<C, X>>
where
    C: BusConnector,
    X: PwmExpander<Connection = C::Connection>,
{
    let expander = match slot.take() {
        Some(expander) => expander,
        None => {
            let connection = connector
                .connect(config.bus_id, config.address)
                .map_err(Error::Connect)?;
            let expander = match X::open(connection, config.frequency_hz) {
                Ok(expander) => expander,
                Err((e, connection)) => {
                    if let Some(connection) = connection {
                        if let Err(de) = connector.disconnect(connection) {
                            tracing::warn!(?de, "Disconnect after failed open failed");
                        }
                    }
                    return Err(Error::Pwm(e));
                }
            };
            tracing::info!(
                bus_id = config.bus_id,
                address = config.address,
                frequency_hz = config.frequency_hz,
                "Motor hat opened"
            );
            expander
        }
    };
    Ok(slot.insert(expander))
}

/// Claim the three lines of a motor and stop it, releasing what was claimed on failure.
fn bind_channels<X: PwmExpander>(
    expander: &mut X,
    [speed, direction_a, direction_b]: [u8; 3],
) -> Result<MotorChannels<X::Channel>, X::Error> {
    let speed = expander.create_channel(speed)?;
    let direction_a = match expander.create_channel(direction_a) {
        Ok(channel) => channel,
        Err(e) => {
            roll_back(expander, [speed]);
            return Err(e);
        }
    };
    let direction_b = match expander.create_channel(direction_b) {
        Ok(channel) => channel,
        Err(e) => {
            roll_back(expander, [speed, direction_a]);
            return Err(e);
        }
    };

    let channels = MotorChannels {
        speed,
        direction_a,
        direction_b,
    };
    if let Err(e) = expander.set_duty_cycle(&channels.speed, 0.0) {
        roll_back(
            expander,
            [channels.speed, channels.direction_a, channels.direction_b],
        );
        return Err(e);
    }
    Ok(channels)
}

/// Give back lines claimed by a failed bind. The bind error takes precedence.
fn roll_back<X: PwmExpander, const N: usize>(
    expander: &mut X,
    channels: [X::Channel; N],
) {
    for channel in channels {
        if let Err(e) = expander.release_channel(channel) {
            tracing::warn!(?e, "Release during init rollback failed");
        }
    }
}
