//! Logging Example
//!
//! Records snapshots at a fixed rate to a CSV file without touching the
//! supply's settings. Press Enter to stop early.
//!
//! Usage:
//!   cargo run --example log -- <port> [rate_hz] [duration_secs] [csv_path]
//!   cargo run --example log -- /dev/ttyACM0 2 600
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example log -- COM3

use korad_psu::{CancelToken, CsvSink, Korad, KoradError, Result};
use log::info;
use std::io::BufRead;

fn arg_f64(args: &[String], idx: usize, default: f64) -> Result<f64> {
    match args.get(idx) {
        Some(s) => s.parse().map_err(|_| {
            KoradError::InvalidParameter(format!("argument {} is not a number: {}", idx, s))
        }),
        None => Ok(default),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(port_name) = args.first() else {
        eprintln!("usage: log <port> [rate_hz] [duration_secs] [csv_path]");
        std::process::exit(2);
    };
    let rate = arg_f64(&args, 1, 1.0)?;
    let duration = arg_f64(&args, 2, 60.0)?;
    let csv_path = args.get(3).map(String::as_str).unwrap_or("psu-log.csv");

    info!("Connecting to power supply on {}...", port_name);
    let mut psu = Korad::new(port_name)?;

    let cancel = CancelToken::new();
    let stop = cancel.clone();
    std::thread::spawn(move || {
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_ok() {
            stop.cancel();
        }
    });

    let report = psu.sample(rate, duration, CsvSink::create(csv_path)?, &cancel)?;
    info!(
        "{} captures written to {} ({} late)",
        report.captures, csv_path, report.saturated
    );

    Ok(())
}
