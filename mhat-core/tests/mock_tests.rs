use core::cell::RefCell;

use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use mhat_core::utils::{
    controllers::{Pca9685Error, RefCellConnector},
    Error, HatConfig, MotorHat, Pca9685Hat,
};

/// I2C address of the motor hat under test.
pub const HAT_ADDRESS: u8 = 0x60;

/// Create a write transaction for the given I2C address and data payload.
pub fn write(
    addr: u8,
    data: Vec<u8>,
) -> I2cTrans {
    I2cTrans::write(addr, data)
}

/// Enable the chip, then sleep, set the 50 Hz prescale (121) and wake.
fn open_transactions() -> Vec<I2cTrans> {
    vec![
        write(HAT_ADDRESS, vec![0x00, 0x01]),
        write(HAT_ADDRESS, vec![0x00, 0x11]),
        write(HAT_ADDRESS, vec![0xFE, 121]),
        write(HAT_ADDRESS, vec![0x00, 0x01]),
    ]
}

#[test]
fn init_opens_chip_and_stops_motor() {
    let mut expectations = open_transactions();
    expectations.extend([
        // Auto-increment, then LED0 fully off.
        write(HAT_ADDRESS, vec![0x00, 0x21]),
        write(HAT_ADDRESS, vec![0x06, 0x00, 0x00, 0x00, 0x00]),
    ]);

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut hat: Pca9685Hat<'_, I2cMock> =
        MotorHat::new(HAT_ADDRESS, RefCellConnector::new(&i2c_bus));
    hat.init(0).unwrap();
    hat.init(0).unwrap();
    hat.dispose().unwrap();
    i2c_bus.borrow_mut().done();
}

#[test]
fn reverse_speed_sets_direction_then_magnitude() {
    let mut expectations = open_transactions();
    expectations.extend([
        write(HAT_ADDRESS, vec![0x00, 0x21]),
        write(HAT_ADDRESS, vec![0x06, 0x00, 0x00, 0x00, 0x00]),
        // LED1 (direction A) at 4095/4096, LED2 (direction B) off.
        write(HAT_ADDRESS, vec![0x0A, 0x00, 0x00, 0xFF, 0x0F]),
        write(HAT_ADDRESS, vec![0x0E, 0x00, 0x00, 0x00, 0x00]),
        // LED0 at half duty.
        write(HAT_ADDRESS, vec![0x06, 0x00, 0x00, 0x00, 0x08]),
        // Same direction: magnitude only.
        write(HAT_ADDRESS, vec![0x06, 0x00, 0x00, 0x00, 0x04]),
        // Dispose stops the running motor.
        write(HAT_ADDRESS, vec![0x06, 0x00, 0x00, 0x00, 0x00]),
    ]);

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut hat: Pca9685Hat<'_, I2cMock> =
        MotorHat::new(HAT_ADDRESS, RefCellConnector::new(&i2c_bus));
    hat.init(0).unwrap();
    hat.set_speed(0, -0.5).unwrap();
    hat.set_speed(0, -0.25).unwrap();
    hat.dispose().unwrap();
    i2c_bus.borrow_mut().done();
}

#[test]
fn second_motor_uses_next_three_outputs() {
    let mut expectations = open_transactions();
    expectations.extend([
        write(HAT_ADDRESS, vec![0x00, 0x21]),
        // LED3 off.
        write(HAT_ADDRESS, vec![0x12, 0x00, 0x00, 0x00, 0x00]),
        // LED4 off, LED5 at 4095/4096, LED3 at a quarter.
        write(HAT_ADDRESS, vec![0x16, 0x00, 0x00, 0x00, 0x00]),
        write(HAT_ADDRESS, vec![0x1A, 0x00, 0x00, 0xFF, 0x0F]),
        write(HAT_ADDRESS, vec![0x12, 0x00, 0x00, 0x00, 0x04]),
        write(HAT_ADDRESS, vec![0x12, 0x00, 0x00, 0x00, 0x00]),
    ]);

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut hat: Pca9685Hat<'_, I2cMock> =
        MotorHat::new(HAT_ADDRESS, RefCellConnector::new(&i2c_bus));
    hat.init(1).unwrap();
    hat.set_speed(1, 0.25).unwrap();
    drop(hat);
    i2c_bus.borrow_mut().done();
}

#[test]
fn motor_beyond_one_chip_is_rejected() {
    let expectations = open_transactions();

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut hat: Pca9685Hat<'_, I2cMock> =
        MotorHat::new(HAT_ADDRESS, RefCellConnector::new(&i2c_bus));

    // Motor 5 needs outputs 15, 16 and 17; the chip stops at 15.
    assert!(matches!(
        hat.init(5),
        Err(Error::Pwm(Pca9685Error::SubChannelOutOfRange(16)))
    ));
    let motor = hat.motor(5).unwrap().unwrap();
    assert!(!motor.is_initialized());
    assert!(matches!(hat.set_speed(5, 0.5), Err(Error::Uninitialized)));
    hat.dispose().unwrap();
    i2c_bus.borrow_mut().done();
}

#[test]
fn speed_above_one_is_a_range_error() {
    let mut expectations = open_transactions();
    expectations.extend([
        write(HAT_ADDRESS, vec![0x00, 0x21]),
        write(HAT_ADDRESS, vec![0x06, 0x00, 0x00, 0x00, 0x00]),
        write(HAT_ADDRESS, vec![0x0A, 0x00, 0x00, 0x00, 0x00]),
        write(HAT_ADDRESS, vec![0x0E, 0x00, 0x00, 0xFF, 0x0F]),
        // The rejected speed is still recorded, so dispose stops the motor.
        write(HAT_ADDRESS, vec![0x06, 0x00, 0x00, 0x00, 0x00]),
    ]);

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut hat: Pca9685Hat<'_, I2cMock> =
        MotorHat::new(HAT_ADDRESS, RefCellConnector::new(&i2c_bus));
    hat.init(0).unwrap();
    assert!(matches!(
        hat.set_speed(0, 1.5),
        Err(Error::Pwm(Pca9685Error::DutyCycleOutOfRange(d))) if d == 1.5
    ));
    hat.dispose().unwrap();
    i2c_bus.borrow_mut().done();
}

#[test]
fn unreachable_frequency_opens_nothing() {
    let expectations: [I2cTrans; 0] = [];
    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let config = HatConfig {
        frequency_hz: 0,
        ..HatConfig::at(HAT_ADDRESS)
    };
    let mut hat: Pca9685Hat<'_, I2cMock> =
        MotorHat::with_config(config, RefCellConnector::new(&i2c_bus));

    assert!(matches!(
        hat.init(0),
        Err(Error::Pwm(Pca9685Error::InvalidFrequency(0)))
    ));
    assert!(!hat.is_open());
    drop(hat);
    i2c_bus.borrow_mut().done();
}
