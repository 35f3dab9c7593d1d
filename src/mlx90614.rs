// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use rppal::i2c::I2c;
use canonical_error::{CanonicalError,
                      failed_precondition_error, internal_error,
                      invalid_argument_error, unavailable_error};
use log::{debug, info};

// MLX90614 constants.
const MLX90614_ADDR: u16 = 0x5A;

// RAM cells, read with SMBus read word (little-endian).
const RAM_TA: u8 = 0x06;     // Linearized ambient (die) temperature.
const RAM_TOBJ1: u8 = 0x07;  // Linearized object temperature.

// Factory-programmed ID words in EEPROM. The device has no WHO_AM_I
// register, so these double as the presence check.
const EEPROM_ID0: u8 = 0x3C;
const EEPROM_ID1: u8 = 0x3D;

// Linearized temperatures are in units of 0.02K.
const TEMP_SCALE: f64 = 0.02;
const KELVIN_OFFSET: f64 = 273.15;

// Bit 15 of an object temperature word is the sensor's invalid-data flag.
const ERROR_FLAG: u16 = 0x8000;

pub struct Mlx90614 {
    i2c: I2c,
}

/// Low level interface to the MLX90614 infrared thermometer. Provides the
/// linearized ambient (die) and object temperatures; emissivity and the rest
/// of the EEPROM configuration are left at their factory values.
impl Mlx90614 {
    /// Create a new MLX90614 instance on the given I2C bus; returns error if
    /// device presence could not be verified.
    pub fn new(bus: u8) -> Result<Self, CanonicalError> {
        let mut i2c = I2c::with_bus(bus)
            .map_err(|e| unavailable_error(
                &format!("Failed to initialize I2C: {:?}", e)))?;
        i2c.set_slave_address(MLX90614_ADDR)
            .map_err(|e| invalid_argument_error(
                &format!("Failed to set I2C slave address: {:?}", e)))?;

        let mut mlx = Mlx90614 { i2c };

        // Test communication and verify device.
        mlx.verify_device()?;

        info!("MLX90614 successfully initialized!");

        Ok(mlx)
    }

    /// Check that something MLX90614-shaped is answering at 0x5A.
    fn verify_device(&mut self) -> Result<(), CanonicalError> {
        let id0 = self.read_word(EEPROM_ID0)?;
        let id1 = self.read_word(EEPROM_ID1)?;

        // The ID words are a chip-unique serial, so there is no expected
        // value, but all zeros or all ones means nothing drove the bus.
        if (id0 == 0x0000 && id1 == 0x0000) || (id0 == 0xFFFF && id1 == 0xFFFF) {
            return Err(failed_precondition_error(
                &format!("Implausible MLX90614 ID words: 0x{:04X} 0x{:04X}",
                         id0, id1)));
        }
        debug!("Device verified: MLX90614 (ID words: 0x{:04X} 0x{:04X})",
               id0, id1);
        Ok(())
    }

    /// Read a single 16 bit register.
    fn read_word(&mut self, register: u8) -> Result<u16, CanonicalError> {
        self.i2c.smbus_read_word(register)
            .map_err(|e| internal_error(
                &format!("Failed to read register 0x{:02X}: {:?}", register, e)))
    }

    /// Get current ambient (die) temperature in °C.
    pub fn ambient_temperature(&mut self) -> Result<f64, CanonicalError> {
        let raw = self.read_word(RAM_TA)?;
        debug!("Raw ambient: 0x{:04X}", raw);
        Ok(temp_from_raw(raw))
    }

    /// Get current object temperature in °C.
    pub fn object_temperature(&mut self) -> Result<f64, CanonicalError> {
        let raw = self.read_word(RAM_TOBJ1)?;
        debug!("Raw object: 0x{:04X}", raw);
        if raw & ERROR_FLAG != 0 {
            return Err(internal_error(
                &format!("Object temperature flagged invalid: 0x{:04X}", raw)));
        }
        Ok(temp_from_raw(raw))
    }
}

// Convert a linearized temperature word to °C.
fn temp_from_raw(raw: u16) -> f64 {
    raw as f64 * TEMP_SCALE - KELVIN_OFFSET
}

#[cfg(test)]
mod tests {
    extern crate approx;
    use approx::assert_abs_diff_eq;
    use super::*;

    #[test]
    fn test_temp_from_raw() {
        // Zero counts is absolute zero.
        assert_abs_diff_eq!(temp_from_raw(0x0000), -273.15, epsilon = 1e-9);

        // 13658 counts * 0.02K = 273.16K, just above freezing.
        assert_abs_diff_eq!(temp_from_raw(13658), 0.01, epsilon = 1e-9);

        // Room temperature: 14908 counts * 0.02K = 298.16K.
        assert_abs_diff_eq!(temp_from_raw(14908), 25.01, epsilon = 1e-9);
    }
}
