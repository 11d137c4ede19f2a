//! Battery Charge Example
//!
//! Runs a CC/CV charge on a single lithium cell and logs every poll to CSV.
//! The charge ends once the current tapers below the cutoff or the time cap
//! runs out; pressing Enter stops it early. The output is switched off on
//! every exit path.
//!
//! Usage:
//!   cargo run --example charge -- <port> <capacity_ah> [rate_c] [cv_volts] [csv_path]
//!   cargo run --example charge -- /dev/ttyACM0 2.2
//!   cargo run --example charge -- COM3 3.0 0.3 4.1 cell7.csv
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example charge -- COM3 2.2

use korad_psu::{
    CancelToken, ChargePlan, ChargeState, CsvSink, Korad, KoradError, Result,
};
use log::{info, warn};
use std::io::BufRead;

fn arg_f64(args: &[String], idx: usize) -> Result<Option<f64>> {
    args.get(idx)
        .map(|s| {
            s.parse().map_err(|_| {
                KoradError::InvalidParameter(format!("argument {} is not a number: {}", idx, s))
            })
        })
        .transpose()
}

/// Fire `cancel` when a line arrives on stdin
fn cancel_on_enter(cancel: CancelToken) {
    std::thread::spawn(move || {
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_ok() {
            cancel.cancel();
        }
    });
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (Some(port_name), Some(capacity)) = (args.first(), arg_f64(&args, 1)?) else {
        eprintln!("usage: charge <port> <capacity_ah> [rate_c] [cv_volts] [csv_path]");
        std::process::exit(2);
    };

    let mut plan = ChargePlan::new(capacity);
    if let Some(rate) = arg_f64(&args, 2)? {
        plan = plan.with_rate(rate);
    }
    if let Some(cv) = arg_f64(&args, 3)? {
        plan = plan.with_cv_voltage(cv);
    }
    let csv_path = args
        .get(4)
        .cloned()
        .unwrap_or_else(|| format!("charge-{}.csv", chrono::Local::now().format("%Y%m%d-%H%M%S")));

    info!("Connecting to power supply on {}...", port_name);
    let mut psu = Korad::new(port_name)?;

    let cancel = CancelToken::new();
    cancel_on_enter(cancel.clone());
    info!("Press Enter to stop the charge early");

    let report = psu.charge(plan, CsvSink::create(&csv_path)?, &cancel)?;
    match report.outcome {
        ChargeState::Completed(reason) => info!(
            "Charge complete ({:?}) after {} polls, {:?}",
            reason, report.polls, report.elapsed
        ),
        other => warn!("Charge ended as {:?} after {} polls", other, report.polls),
    }
    if let Some(last) = &report.last_snapshot {
        info!("Last reading: {:.3} V, {:.3} A", last.meas_volts(), last.meas_curr());
    }
    info!("Log written to {}", csv_path);

    Ok(())
}
