//! Per-motor speed control.
//!
//! Each motor on the hat is an H-bridge driven by three PWM lines: one carries
//! the speed magnitude, the other two select the direction. Direction lines are
//! only rewritten when the direction actually changes, and always before the
//! magnitude line so a reversal never runs at speed in the old direction.

use super::{expander::PwmExpander, Error};

/// Largest duty cycle the PCA9685 produces without the full-on bit.
pub const MAX_DUTY: f64 = 4095.0 / 4096.0;

/// Rotation direction. Zero counts as forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn of(speed: f64) -> Self {
        if speed >= 0.0 {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    /// Duty cycles for the (direction A, direction B) line pair.
    pub fn duty_cycles(self) -> (f64, f64) {
        let a = match self {
            Direction::Forward => 0.0,
            Direction::Reverse => MAX_DUTY,
        };
        (a, MAX_DUTY - a)
    }
}

/// The three output lines bound to one motor.
#[derive(Debug)]
pub struct MotorChannels<Ch> {
    pub speed: Ch,
    pub direction_a: Ch,
    pub direction_b: Ch,
}

/// One H-bridge channel of the hat.
#[derive(Debug)]
pub struct MotorController<Ch> {
    channels: Option<MotorChannels<Ch>>,
    speed: f64,
    // `None` until the direction lines have been written once.
    direction: Option<Direction>,
}

impl<Ch> Default for MotorController<Ch> {
    fn default() -> Self {
        MotorController {
            channels: None,
            speed: 0.0,
            direction: None,
        }
    }
}

impl<Ch> MotorController<Ch> {
    /// True once the output lines are bound.
    pub fn is_initialized(&self) -> bool {
        self.channels.is_some()
    }

    /// Last speed written.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Direction currently driven on the direction lines, if any was written.
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn channels(&self) -> Option<&MotorChannels<Ch>> {
        self.channels.as_ref()
    }

    pub(crate) fn bind(
        &mut self,
        channels: MotorChannels<Ch>,
    ) {
        self.channels = Some(channels);
        self.speed = 0.0;
        self.direction = None;
    }

    /// Take the output lines back, leaving the motor uninitialized.
    pub(crate) fn unbind(&mut self) -> Option<MotorChannels<Ch>> {
        self.direction = None;
        self.channels.take()
    }

    /// Write a signed speed to the motor.
    ///
    /// `value` is not clamped; a magnitude above 1 is rejected by the expander
    /// after the direction lines have been written. NaN and infinities are
    /// rejected before any write.
    pub(crate) fn set_speed<X, B>(
        &mut self,
        expander: &mut X,
        value: f64,
    ) -> Result<(), Error<B, X::Error>>
    where
        X: PwmExpander<Channel = Ch>,
    {
        let channels = self.channels.as_ref().ok_or(Error::Uninitialized)?;
        if !value.is_finite() {
            return Err(Error::InvalidSpeed(value));
        }

        let direction = Direction::of(value);
        // A fresh motor stopped again needs no direction.
        let unchanged = match self.direction {
            Some(current) => current == direction,
            None => value == 0.0,
        };
        if !unchanged {
            let (a, b) = direction.duty_cycles();
            // Unknown until both lines are written.
            self.direction = None;
            expander
                .set_duty_cycle(&channels.direction_a, a)
                .map_err(Error::Pwm)?;
            expander
                .set_duty_cycle(&channels.direction_b, b)
                .map_err(Error::Pwm)?;
            self.direction = Some(direction);
        }

        self.speed = value;
        expander
            .set_duty_cycle(&channels.speed, libm::fabs(value))
            .map_err(Error::Pwm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_buckets() {
        assert_eq!(Direction::of(0.0), Direction::Forward);
        assert_eq!(Direction::of(-0.0), Direction::Forward);
        assert_eq!(Direction::of(0.3), Direction::Forward);
        assert_eq!(Direction::of(-0.3), Direction::Reverse);
    }

    #[test]
    fn direction_lines_are_complementary() {
        assert_eq!(Direction::Forward.duty_cycles(), (0.0, MAX_DUTY));
        assert_eq!(Direction::Reverse.duty_cycles(), (MAX_DUTY, 0.0));
    }
}
