// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use canonical_error::CanonicalError;
use log::{info, warn};

use crate::mlx90614::Mlx90614;
use crate::sensor_log::SensorLog;
use crate::tca9548a::Tca9548a;

// A value outside these bounds is electrical noise, not a measurement.
const MIN_PLAUSIBLE_C: f64 = -40.0;
const MAX_PLAUSIBLE_C: f64 = 125.0;

// Settle time after a channel selection, and after rebuilding the sensor
// handle following a channel switch.
const CHANNEL_SETTLE: Duration = Duration::from_millis(100);
const REINIT_SETTLE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
pub struct FirReading {
    // °C.
    pub ambient: f64,
    pub object: f64,
}

impl FirReading {
    // Returned when a reading could not be taken or could not be trusted.
    fn fail_safe() -> Self {
        FirReading { ambient: 0.0, object: 0.0 }
    }
}

pub struct FirSensor {
    mux: Tca9548a,
    sensor: Mlx90614,
    bus: u8,
    channel: u8,
    // Calibration offsets in °C, subtracted from returned readings.
    ambient_offset: f64,
    object_offset: f64,
    log: SensorLog,
}

// An MLX90614 behind one channel of a TCA9548A mux. Other bus users can move
// the mux between our reads, so every read verifies the selected channel
// against the hardware and recovers before trusting the sensor.
impl FirSensor {
    pub fn new(bus: u8, mux_addr: u16, channel: u8, log_dir: &Path)
               -> Result<Self, CanonicalError> {
        let mut log = SensorLog::new(log_dir, "fir.txt")?;

        let mut mux = Tca9548a::new(bus, mux_addr)?;
        mux.select_channel(channel)?;
        sleep(CHANNEL_SETTLE);

        let sensor = Mlx90614::new(bus)?;
        sleep(CHANNEL_SETTLE);

        log.append(&format!("INIT,channel {}", channel));
        info!("FIR sensor initialized on mux channel {}", channel);

        Ok(FirSensor {
            mux, sensor, bus, channel,
            ambient_offset: 0.0,
            object_offset: 0.0,
            log,
        })
    }

    /// Offsets are subtracted from returned readings; the readings log always
    /// records raw values.
    pub fn set_offsets(&mut self, ambient_offset: f64, object_offset: f64) {
        self.ambient_offset = ambient_offset;
        self.object_offset = object_offset;
    }

    /// Take one reading. Never fails: any error is recorded in the readings
    /// log and the fail-safe value (0.0, 0.0) is returned instead.
    pub fn read(&mut self) -> FirReading {
        match self.read_checked() {
            Ok(reading) => reading,
            Err(e) => {
                warn!("FIR read failed: {:?}", e);
                self.log.append(&format!("READ_ERROR,{}", e.message));
                FirReading::fail_safe()
            }
        }
    }

    fn read_checked(&mut self) -> Result<FirReading, CanonicalError> {
        self.ensure_channel()?;

        let ambient = round2(self.sensor.ambient_temperature()?);
        let object = round2(self.sensor.object_temperature()?);

        if !plausible(ambient) || !plausible(object) {
            warn!("Implausible temperatures: amb={}, obj={}", ambient, object);
            self.log.append(&format!(
                "Invalid temperature values: amb={}, obj={}", ambient, object));
            return Ok(FirReading::fail_safe());
        }

        self.log.append(&format!("{:.2},{:.2}", ambient, object));
        Ok(FirReading {
            ambient: round2(ambient - self.ambient_offset),
            object: round2(object - self.object_offset),
        })
    }

    // Verify the mux still points at our channel; reselect and rebuild the
    // sensor handle if it drifted.
    fn ensure_channel(&mut self) -> Result<(), CanonicalError> {
        let selected = self.mux.selected_channel()?;
        if selected == Some(self.channel) {
            return Ok(());
        }

        warn!("Mux channel drifted: {:?} -> {}", selected, self.channel);
        self.log.append(&format!(
            "Channel switch: {:?} -> {}", selected, self.channel));
        self.mux.select_channel(self.channel)?;
        sleep(CHANNEL_SETTLE);

        // Whoever moved the mux may have left the sensor mid-transaction; a
        // fresh handle re-verifies it. If that fails, keep the old handle and
        // let the read decide.
        match Mlx90614::new(self.bus) {
            Ok(sensor) => {
                self.sensor = sensor;
                sleep(REINIT_SETTLE);
            }
            Err(e) => {
                warn!("Sensor reinit failed: {:?}", e);
                self.log.append(&format!("Sensor reinit error: {}", e.message));
            }
        }
        Ok(())
    }

    /// Counterpart to new(): disable the mux channels and close out the
    /// readings log. Errors here are logged, not propagated.
    pub fn stop(&mut self) {
        if let Err(e) = self.mux.disable_all_channels() {
            warn!("Failed to disable mux channels: {:?}", e);
        }
        self.log.append("TERMINATE");
        info!("FIR sensor stopped");
    }
}

fn plausible(temp_c: f64) -> bool {
    (MIN_PLAUSIBLE_C..=MAX_PLAUSIBLE_C).contains(&temp_c)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    extern crate approx;
    use approx::assert_abs_diff_eq;
    use super::*;

    #[test]
    fn test_plausible() {
        assert!(plausible(25.0));
        assert!(plausible(-40.0));
        assert!(plausible(125.0));
        assert!(!plausible(-40.01));
        assert!(!plausible(125.01));
        assert!(!plausible(f64::NAN));
    }

    #[test]
    fn test_round2() {
        assert_abs_diff_eq!(round2(25.014), 25.01, epsilon = 1e-9);
        assert_abs_diff_eq!(round2(25.016), 25.02, epsilon = 1e-9);
        assert_abs_diff_eq!(round2(-3.456), -3.46, epsilon = 1e-9);
        assert_abs_diff_eq!(round2(100.0), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fail_safe_value() {
        let reading = FirReading::fail_safe();
        assert_eq!(reading.ambient, 0.0);
        assert_eq!(reading.object, 0.0);
    }
}
