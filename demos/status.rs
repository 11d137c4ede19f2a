//! Status Example
//!
//! Connects to a Korad supply, prints a snapshot of its state and optionally
//! changes a setpoint first:
//! - Listing and selecting serial ports
//! - Reading the status byte, setpoints and measured output
//! - Slewing the voltage or current to a new value
//! - Storing and recalling memory presets
//!
//! Usage:
//!   cargo run --example status                          # Interactive mode
//!   cargo run --example status -- /dev/ttyACM0         # Specify port
//!   cargo run --example status -- COM3 volts 12.0      # Slew voltage to 12 V
//!   cargo run --example status -- COM3 curr 0.5        # Slew current to 0.5 A
//!   cargo run --example status -- COM3 recall 2        # Recall preset M2
//!   cargo run --example status -- COM3 json            # Print as JSON
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example status

use inquire::Select;
use korad_psu::{Korad, KoradError, Parameter, Result};
use log::info;

/// Interactive serial port selection using inquire
fn select_port() -> Result<String> {
    let ports = Korad::list_ports()?;

    if ports.is_empty() {
        eprintln!("No serial ports found!");
        std::process::exit(1);
    }

    let port_names: Vec<String> = ports
        .iter()
        .map(|p| format!("{} - {:?}", p.port_name, p.port_type))
        .collect();

    let selection = Select::new("Select the power supply:", port_names)
        .prompt()
        .map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Selection cancelled: {}", e),
            )
        })?;

    Ok(selection
        .split(" - ")
        .next()
        .unwrap_or(&selection)
        .to_string())
}

fn parse_value(arg: Option<&String>) -> Result<f64> {
    arg.and_then(|s| s.parse().ok())
        .ok_or_else(|| KoradError::InvalidParameter("expected a number".to_string()))
}

fn parse_slot(arg: Option<&String>) -> Result<u8> {
    arg.and_then(|s| s.parse().ok())
        .ok_or_else(|| KoradError::InvalidParameter("expected a preset slot (1-5)".to_string()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let port_name = match args.first() {
        Some(port) => port.clone(),
        None => select_port()?,
    };

    info!("Connecting to power supply on {}...", port_name);
    let mut psu = Korad::new(&port_name)?;
    let id = psu.identity();
    info!("Found {} (firmware {}, serial {})", id.model, id.firmware_version, id.serial_number);

    let mut as_json = false;
    match args.get(1).map(String::as_str) {
        Some(selector @ ("volts" | "curr")) => {
            let parameter: Parameter = selector.parse()?;
            let target = parse_value(args.get(2))?;
            let plan = match parameter {
                Parameter::Voltage => psu.slew_voltage(target)?,
                Parameter::Current => psu.slew_current(target)?,
            };
            info!("Slewed {} from {:.3} to {:.3}", parameter, plan.start, plan.end);
        }
        Some("store") => {
            let slot = parse_slot(args.get(2))?;
            psu.store_preset(slot)?;
            info!("Stored settings in M{}", slot);
        }
        Some("recall") => {
            let slot = parse_slot(args.get(2))?;
            psu.recall_preset(slot)?;
            info!("Recalled M{}", slot);
        }
        Some("json") => as_json = true,
        Some(other) => {
            return Err(KoradError::InvalidParameter(format!(
                "unknown command '{}'",
                other
            )))
        }
        None => {}
    }

    let snapshot = psu.read_snapshot()?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", snapshot);
    }

    Ok(())
}
