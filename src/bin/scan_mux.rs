// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use canonical_error::CanonicalError;
use env_logger;

use fir_monitor::tca9548a::{DEFAULT_MUX_ADDR, Tca9548a};

fn main() -> Result<(), CanonicalError> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Scanning mux at 0x{:02X} on I2C bus 1...", DEFAULT_MUX_ADDR);
    let mut mux = Tca9548a::new(/*bus=*/1, DEFAULT_MUX_ADDR)?;

    let found = mux.scan_channels()?;
    if found.is_empty() {
        log::warn!("No devices found on any mux channel");
        return Ok(());
    }
    for (channel, addresses) in found {
        let formatted: Vec<String> =
            addresses.iter().map(|a| format!("0x{:02X}", a)).collect();
        log::info!("Channel {}: {}", channel, formatted.join(" "));
    }
    Ok(())
}
