// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::thread::sleep;
use std::time::Duration;

use log::{error, info};
use pico_args::Arguments;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, registry, EnvFilter};
use tracing_appender::non_blocking::NonBlockingBuilder;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use fir_monitor::fir::FirSensor;
use fir_monitor::tca9548a::DEFAULT_MUX_ADDR;

struct AppArgs {
    i2c_bus: u8,
    mux_addr: u16,
    channel: u8,
    period: Duration,
    sensor_log_dir: String,
    amb_offset: f64,
    obj_offset: f64,
    log_dir: String,
    log_file: String,
}

fn parse_duration(arg: &str)
                  -> Result<std::time::Duration, std::num::ParseFloatError> {
    let seconds = arg.parse()?;
    Ok(std::time::Duration::from_secs_f64(seconds))
}

fn parse_hex_addr(arg: &str) -> Result<u16, std::num::ParseIntError> {
    let digits = arg.strip_prefix("0x").unwrap_or(arg);
    u16::from_str_radix(digits, 16)
}

fn main() {
    const HELP: &str = "\
    FLAGS:
      -h, --help                     Prints help information

    OPTIONS:
      --i2c_bus NUMBER               1
      --mux_addr HEX                 0x70
      --channel NUMBER               1
      --period NUMBER                1.0
      --sensor_log_dir <path>        ./sensorlogs
      --amb_offset NUMBER            0.0
      --obj_offset NUMBER            0.0
      --log_dir <path>               .
      --log_file <file>              fir_monitor_log.txt
    ";

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        println!("{}", HELP);
        std::process::exit(0);
    }
    let args = AppArgs {
        i2c_bus: pargs.value_from_str("--i2c_bus").
            unwrap_or(1),
        mux_addr: pargs.value_from_fn("--mux_addr", parse_hex_addr).
            unwrap_or(DEFAULT_MUX_ADDR),
        channel: pargs.value_from_str("--channel").
            unwrap_or(1),
        period: pargs.value_from_fn("--period", parse_duration).
            unwrap_or(parse_duration("1.0").unwrap()),
        sensor_log_dir: pargs.value_from_str("--sensor_log_dir").
            unwrap_or("./sensorlogs".to_string()),
        amb_offset: pargs.value_from_str("--amb_offset").
            unwrap_or(0.0),
        obj_offset: pargs.value_from_str("--obj_offset").
            unwrap_or(0.0),
        log_dir: pargs.value_from_str("--log_dir").
            unwrap_or(".".to_string()),
        log_file: pargs.value_from_str("--log_file").
            unwrap_or("fir_monitor_log.txt".to_string()),
    };
    let _remaining = pargs.finish();

    // Set up logging.
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&args.log_file)
        .max_log_files(10)
        .build(&args.log_dir).unwrap();

    // Create non-blocking writers for both the file and stdout.
    let (non_blocking_file, _guard1) = NonBlockingBuilder::default()
        .lossy(false)
        .finish(file_appender);
    let (non_blocking_stdout, _guard2) = NonBlockingBuilder::default()
        .lossy(false)
        .finish(std::io::stdout());
    let _subscriber = registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(non_blocking_stdout))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking_file))
        .init();

    let got_signal = Arc::new(AtomicBool::new(false));
    let got_signal2 = got_signal.clone();
    ctrlc::set_handler(move || {
        info!("Got control-c");
        got_signal2.store(true, AtomicOrdering::Relaxed);
        std::thread::sleep(Duration::from_secs(1));
        info!("Exiting");
        std::process::exit(-1);
    }).unwrap();

    let mut fir = match FirSensor::new(args.i2c_bus, args.mux_addr, args.channel,
                                       Path::new(&args.sensor_log_dir)) {
        Ok(fir) => fir,
        Err(e) => {
            error!("Could not initialize FIR sensor: {:?}", e);
            std::process::exit(1);
        }
    };

    if args.amb_offset != 0.0 || args.obj_offset != 0.0 {
        info!("Calibration offsets set to amb={}, obj={}",
              args.amb_offset, args.obj_offset);
    }
    fir.set_offsets(args.amb_offset, args.obj_offset);

    while !got_signal.load(AtomicOrdering::Relaxed) {
        let reading = fir.read();
        info!("Ambient: {:.2} °C  Object: {:.2} °C",
              reading.ambient, reading.object);
        sleep(args.period);
    }
    fir.stop();
}
