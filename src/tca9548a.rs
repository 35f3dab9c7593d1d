// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::thread::sleep;
use std::time::Duration;

use rppal::i2c::I2c;
use canonical_error::{CanonicalError,
                      internal_error, invalid_argument_error,
                      unavailable_error};
use log::{debug, info, warn};

pub const DEFAULT_MUX_ADDR: u16 = 0x70;

const NUM_CHANNELS: u8 = 8;

// Probe range for scan_channels(). 7-bit addresses outside this range are
// reserved.
const SCAN_FIRST_ADDR: u16 = 0x08;
const SCAN_LAST_ADDR: u16 = 0x77;

// Let the downstream bus segment settle after switching channels.
const SELECT_SETTLE: Duration = Duration::from_millis(10);

pub struct Tca9548a {
    i2c: I2c,
    mux_addr: u16,
}

// The TCA9548A has a single control register: a bitmask byte enabling any
// subset of its eight downstream channels. Writing selects channels; reading
// reports what is currently enabled, so channel state can be verified against
// the hardware rather than against driver bookkeeping.
impl Tca9548a {
    /// Open the mux on the given bus and disable all channels so we start
    /// from a known state.
    pub fn new(bus: u8, mux_addr: u16) -> Result<Self, CanonicalError> {
        let mut i2c = I2c::with_bus(bus)
            .map_err(|e| unavailable_error(
                &format!("Failed to initialize I2C: {:?}", e)))?;
        i2c.set_slave_address(mux_addr)
            .map_err(|e| invalid_argument_error(
                &format!("Failed to set I2C slave address: {:?}", e)))?;

        let mut mux = Tca9548a { i2c, mux_addr };
        mux.disable_all_channels()?;

        info!("Mux at 0x{:02X} initialized, all channels disabled", mux_addr);

        Ok(mux)
    }

    /// Select a single channel, disabling all others.
    pub fn select_channel(&mut self, channel: u8) -> Result<(), CanonicalError> {
        if channel >= NUM_CHANNELS {
            return Err(invalid_argument_error(
                &format!("Invalid channel {} (must be 0-7)", channel)));
        }
        self.write_control(channel_mask(channel))?;
        sleep(SELECT_SETTLE);
        debug!("Mux channel {} selected", channel);
        Ok(())
    }

    /// Read back which single channel is enabled. Returns None unless exactly
    /// one channel bit is set in the control register.
    pub fn selected_channel(&mut self) -> Result<Option<u8>, CanonicalError> {
        let mask = self.read_control()?;
        Ok(single_channel(mask))
    }

    pub fn disable_all_channels(&mut self) -> Result<(), CanonicalError> {
        self.write_control(0x00)
    }

    /// Hold `channel` selected for the lifetime of the returned guard. All
    /// channels are disabled when the guard drops.
    pub fn channel_guard(&mut self, channel: u8)
                         -> Result<ChannelGuard, CanonicalError> {
        self.select_channel(channel)?;
        Ok(ChannelGuard { mux: self })
    }

    /// Probe every channel for responding devices. Returns, per channel, the
    /// 7-bit addresses that acknowledged. The mux is left with all channels
    /// disabled.
    pub fn scan_channels(&mut self)
                         -> Result<Vec<(u8, Vec<u16>)>, CanonicalError> {
        let mux_addr = self.mux_addr;
        let mut found = Vec::new();
        for channel in 0..NUM_CHANNELS {
            let mut addresses = Vec::new();
            let mut guard = self.channel_guard(channel)?;
            for addr in SCAN_FIRST_ADDR..=SCAN_LAST_ADDR {
                if addr == mux_addr {
                    continue;
                }
                if guard.probe(addr)? {
                    addresses.push(addr);
                }
            }
            drop(guard);
            if !addresses.is_empty() {
                found.push((channel, addresses));
            }
        }
        Ok(found)
    }

    // Address a device and attempt a one byte read. A NACK surfaces as an I/O
    // error, which we take as device-absent.
    fn probe(&mut self, addr: u16) -> Result<bool, CanonicalError> {
        self.i2c.set_slave_address(addr)
            .map_err(|e| invalid_argument_error(
                &format!("Failed to set I2C slave address: {:?}", e)))?;
        let present = self.i2c.smbus_receive_byte().is_ok();
        self.i2c.set_slave_address(self.mux_addr)
            .map_err(|e| invalid_argument_error(
                &format!("Failed to restore mux slave address: {:?}", e)))?;
        Ok(present)
    }

    fn write_control(&mut self, mask: u8) -> Result<(), CanonicalError> {
        self.i2c.write(&[mask])
            .map_err(|e| internal_error(
                &format!("Failed to write mux control register: {:?}", e)))?;
        Ok(())
    }

    fn read_control(&mut self) -> Result<u8, CanonicalError> {
        let mut buffer = [0u8; 1];
        self.i2c.read(&mut buffer)
            .map_err(|e| internal_error(
                &format!("Failed to read mux control register: {:?}", e)))?;
        Ok(buffer[0])
    }
}

/// Scoped channel acquisition; see Tca9548a::channel_guard().
pub struct ChannelGuard<'a> {
    mux: &'a mut Tca9548a,
}

impl ChannelGuard<'_> {
    /// Probe a device address on the guarded channel.
    pub fn probe(&mut self, addr: u16) -> Result<bool, CanonicalError> {
        self.mux.probe(addr)
    }
}

impl Drop for ChannelGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.mux.disable_all_channels() {
            warn!("Failed to release mux channel: {:?}", e);
        }
    }
}

fn channel_mask(channel: u8) -> u8 {
    1 << channel
}

fn single_channel(mask: u8) -> Option<u8> {
    if mask.count_ones() == 1 {
        Some(mask.trailing_zeros() as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_mask() {
        assert_eq!(channel_mask(0), 0x01);
        assert_eq!(channel_mask(3), 0x08);
        assert_eq!(channel_mask(7), 0x80);
    }

    #[test]
    fn test_single_channel() {
        // No channel enabled.
        assert_eq!(single_channel(0x00), None);

        // Exactly one channel enabled.
        assert_eq!(single_channel(0x01), Some(0));
        assert_eq!(single_channel(0x08), Some(3));
        assert_eq!(single_channel(0x80), Some(7));

        // Multiple channels enabled.
        assert_eq!(single_channel(0x03), None);
        assert_eq!(single_channel(0xFF), None);
    }

    #[test]
    fn test_mask_round_trip() {
        for channel in 0..NUM_CHANNELS {
            assert_eq!(single_channel(channel_mask(channel)), Some(channel));
        }
    }
}
