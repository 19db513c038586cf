//! PCA9685 backend for the motor hat.
//!
//! Wraps `pwm_pca9685::Pca9685` behind [`PwmExpander`]. Duty cycles are
//! translated to 12-bit on/off counts; channel ownership is tracked in a
//! bitmask so every output line has at most one live handle.

use core::fmt::Debug;

use embedded_hal::i2c::I2c;
use pwm_pca9685::{Address, Channel, Error as PwmError, Pca9685};

use super::expander::{I2cTarget, PwmExpander};

/// Internal oscillator frequency of the PCA9685.
pub const OSCILLATOR_HZ: u32 = 25_000_000;
/// Number of output lines on one chip.
pub const SUB_CHANNEL_COUNT: u8 = 16;
/// Counts per PWM period.
const RESOLUTION: u32 = 4096;

/// Errors from the PCA9685 backend.
#[derive(Debug)]
pub enum Pca9685Error<E> {
    PwmError(PwmError<E>),
    /// No prescale value in `3..=255` produces this frequency.
    InvalidFrequency(u16),
    SubChannelOutOfRange(u8),
    SubChannelInUse(u8),
    /// Duty cycle outside `[0, 1]`.
    DutyCycleOutOfRange(f64),
}

/// Exclusive handle to one PCA9685 output.
#[derive(Debug)]
pub struct Pca9685Channel {
    sub_channel: u8,
    channel: Channel,
}

impl Pca9685Channel {
    pub fn sub_channel(&self) -> u8 {
        self.sub_channel
    }
}

/// A PCA9685 driven through `pwm_pca9685`.
pub struct Pca9685Expander<I2C> {
    pwm: Pca9685<I2C>,
    address: u8,
    in_use: u16,
}

impl<I2C> Pca9685Expander<I2C> {
    /// Bitmask of currently claimed sub-channels.
    pub fn channels_in_use(&self) -> u16 {
        self.in_use
    }
}

impl<I2C, E> PwmExpander for Pca9685Expander<I2C>
where
    I2C: I2c<Error = E>,
    E: Debug,
{
    type Connection = I2cTarget<I2C>;
    type Channel = Pca9685Channel;
    type Error = Pca9685Error<E>;

    fn open(
        connection: Self::Connection,
        frequency_hz: u16,
    ) -> Result<Self, (Self::Error, Option<Self::Connection>)> {
        let Some(prescale) = prescale_for(frequency_hz) else {
            return Err((Pca9685Error::InvalidFrequency(frequency_hz), Some(connection)));
        };
        let address = connection.address;
        // `new` drops the bus when it rejects the address.
        let mut pwm = Pca9685::new(connection.bus, Address::from(address))
            .map_err(|e| (Pca9685Error::PwmError(e), None))?;
        if let Err(e) = pwm.enable().and_then(|()| pwm.set_prescale(prescale)) {
            let bus = pwm.destroy();
            return Err((Pca9685Error::PwmError(e), Some(I2cTarget { bus, address })));
        }
        tracing::info!(address, frequency_hz, prescale, "PCA9685 enabled");

        Ok(Pca9685Expander {
            pwm,
            address,
            in_use: 0,
        })
    }

    fn create_channel(
        &mut self,
        sub_channel: u8,
    ) -> Result<Self::Channel, Self::Error> {
        let channel =
            channel_for(sub_channel).ok_or(Pca9685Error::SubChannelOutOfRange(sub_channel))?;
        let bit = 1u16 << sub_channel;
        if self.in_use & bit != 0 {
            return Err(Pca9685Error::SubChannelInUse(sub_channel));
        }
        self.in_use |= bit;
        Ok(Pca9685Channel {
            sub_channel,
            channel,
        })
    }

    fn set_duty_cycle(
        &mut self,
        channel: &Self::Channel,
        duty_cycle: f64,
    ) -> Result<(), Self::Error> {
        if !(0.0..=1.0).contains(&duty_cycle) {
            return Err(Pca9685Error::DutyCycleOutOfRange(duty_cycle));
        }
        tracing::debug!(sub_channel = channel.sub_channel, duty_cycle, "PWM write");
        let result = if duty_cycle == 1.0 {
            self.pwm.set_channel_full_on(channel.channel, 0)
        } else {
            self.pwm
                .set_channel_on_off(channel.channel, 0, off_count(duty_cycle))
        };
        result.map_err(Pca9685Error::PwmError)
    }

    fn release_channel(
        &mut self,
        channel: Self::Channel,
    ) -> Result<(), Self::Error> {
        self.in_use &= !(1u16 << channel.sub_channel);
        Ok(())
    }

    fn close(self) -> Result<Self::Connection, Self::Error> {
        tracing::info!(address = self.address, "PCA9685 released");
        Ok(I2cTarget {
            bus: self.pwm.destroy(),
            address: self.address,
        })
    }
}

/// Prescale register value for `frequency_hz`, if the chip can produce it.
pub fn prescale_for(frequency_hz: u16) -> Option<u8> {
    if frequency_hz == 0 {
        return None;
    }
    let period = RESOLUTION * u32::from(frequency_hz);
    let prescale = ((OSCILLATOR_HZ + period / 2) / period).checked_sub(1)?;
    match prescale {
        3..=255 => Some(prescale as u8),
        _ => None,
    }
}

/// OFF count for a duty cycle in `[0, 1)`.
fn off_count(duty_cycle: f64) -> u16 {
    let count = libm::round(duty_cycle * RESOLUTION as f64) as u16;
    count.min(RESOLUTION as u16 - 1)
}

fn channel_for(sub_channel: u8) -> Option<Channel> {
    let channel = match sub_channel {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return None,
    };
    Some(channel)
}
