// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::Path;

use canonical_error::CanonicalError;
use env_logger;

use fir_monitor::fir::FirSensor;
use fir_monitor::tca9548a::DEFAULT_MUX_ADDR;

fn main() -> Result<(), CanonicalError> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Initializing MLX90614 behind mux channel 1...");
    let mut fir = FirSensor::new(
        /*bus=*/1, DEFAULT_MUX_ADDR, /*channel=*/1, Path::new("./sensorlogs"))?;
    log::info!("FIR sensor found and initialized successfully!");

    // Read some sample data.
    for i in 0..5 {
        let reading = fir.read();
        log::info!("Sample {}: Ambient: {:.2} °C  Object: {:.2} °C",
                   i+1, reading.ambient, reading.object);
        std::thread::sleep(std::time::Duration::from_millis(500));
    }

    fir.stop();
    Ok(())
}
