//! MPU6050 reader over the Linux I2C bus.

use crate::sensor::types::Sample;
use crate::sensor::{ReadError, SampleSource};
use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use tracing::info;

// MPU6050 register map
const PWR_MGMT_1: u8 = 0x6B;
const SMPLRT_DIV: u8 = 0x19;
const CONFIG: u8 = 0x1A;
const GYRO_CONFIG: u8 = 0x1B;
const ACCEL_CONFIG: u8 = 0x1C;
const ACCEL_XOUT_H: u8 = 0x3B;
const GYRO_XOUT_H: u8 = 0x43;

/// LSB per g at the ±2 g accelerometer range.
const ACCEL_SCALE: f64 = 16384.0;
/// LSB per deg/s at the ±250 °/s gyroscope range.
const GYRO_SCALE: f64 = 131.0;

/// Hardware sample source for an MPU6050 on a Linux I2C bus.
pub struct Mpu6050Source {
    device: LinuxI2CDevice,
    bus: u8,
    address: u16,
    initialized: bool,
}

impl Mpu6050Source {
    /// Open the device node and run the wake/configure sequence.
    pub fn open(bus: u8, address: u16) -> Result<Self, ReadError> {
        let path = format!("/dev/i2c-{bus}");
        let device = LinuxI2CDevice::new(&path, address)
            .map_err(|e| ReadError::Bus(format!("open {path}: {e}")))?;

        let mut source = Self {
            device,
            bus,
            address,
            initialized: false,
        };
        source.initialize()?;
        Ok(source)
    }

    /// Wake from sleep, divide the 1 kHz internal rate by 8, select the
    /// ±2 g and ±250 °/s full-scale ranges, and enable the low-pass filter.
    fn initialize(&mut self) -> Result<(), ReadError> {
        self.write(PWR_MGMT_1, 0)?;
        self.write(SMPLRT_DIV, 7)?;
        self.write(ACCEL_CONFIG, 0)?;
        self.write(GYRO_CONFIG, 0)?;
        self.write(CONFIG, 6)?;
        self.initialized = true;
        info!(bus = self.bus, address = self.address, "mpu6050 initialized");
        Ok(())
    }

    fn write(&mut self, register: u8, value: u8) -> Result<(), ReadError> {
        self.device
            .smbus_write_byte_data(register, value)
            .map_err(|e| ReadError::Bus(format!("write 0x{register:02x}: {e}")))
    }

    /// Read a 16-bit two's-complement value from a high/low register pair.
    fn read_word(&mut self, register: u8) -> Result<i16, ReadError> {
        let high = self
            .device
            .smbus_read_byte_data(register)
            .map_err(|e| ReadError::Bus(format!("read 0x{register:02x}: {e}")))?;
        let low = self
            .device
            .smbus_read_byte_data(register + 1)
            .map_err(|e| ReadError::Bus(format!("read 0x{:02x}: {e}", register + 1)))?;
        Ok((((high as u16) << 8) | low as u16) as i16)
    }
}

impl SampleSource for Mpu6050Source {
    fn describe(&self) -> String {
        format!("mpu6050 on /dev/i2c-{} at 0x{:02x}", self.bus, self.address)
    }

    fn read(&mut self) -> Result<Sample, ReadError> {
        if !self.initialized {
            return Err(ReadError::NotInitialized);
        }

        let accel = [
            f64::from(self.read_word(ACCEL_XOUT_H)?) / ACCEL_SCALE,
            f64::from(self.read_word(ACCEL_XOUT_H + 2)?) / ACCEL_SCALE,
            f64::from(self.read_word(ACCEL_XOUT_H + 4)?) / ACCEL_SCALE,
        ];
        let gyro = [
            f64::from(self.read_word(GYRO_XOUT_H)?) / GYRO_SCALE,
            f64::from(self.read_word(GYRO_XOUT_H + 2)?) / GYRO_SCALE,
            f64::from(self.read_word(GYRO_XOUT_H + 4)?) / GYRO_SCALE,
        ];

        Ok(Sample::new(accel, gyro))
    }
}
