//! # Korad PSU Library
//!
//! A Rust library for driving Korad KAxxxxP (and rebadged) bench power
//! supplies over their line-oriented serial protocol.
//!
//! ## Features
//!
//! - Identify the supply and read a full status snapshot (mode, tracking,
//!   protection/lock flags, setpoints, measured output)
//! - Set voltage/current limits, output, OVP/OCP, memory presets
//! - Slew a setpoint to a new value in timed, stepped increments
//! - Run a CC/CV battery charge that stops on current taper or a time cap
//! - Log snapshots at a fixed rate to CSV (or any [`SnapshotSink`])
//!
//! ## Example
//!
//! ```no_run
//! use korad_psu::{CancelToken, ChargePlan, CsvSink, Korad};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut psu = Korad::new("/dev/ttyACM0")?;
//!     let snap = psu.read_snapshot()?;
//!     println!("{}", snap);
//!
//!     let plan = ChargePlan::new(2.2).with_rate(0.5);
//!     let report = psu.charge(plan, CsvSink::create("charge.csv")?, &CancelToken::new())?;
//!     println!("{:?} after {} polls", report.outcome, report.polls);
//!     Ok(())
//! }
//! ```

pub mod charge;
pub mod clock;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod sampling;
pub mod sink;
pub mod slew;
pub mod status;
pub mod transport;
pub mod types;

#[cfg(test)]
mod mock_serial;

pub use charge::{AbortReason, ChargePlan, ChargeReport, ChargeState, CompletionReason};
pub use clock::{CancelToken, Clock, SystemClock};
pub use error::{KoradError, ProtocolError, Result};
pub use protocol::{ConnectionConfig, Korad};
pub use sampling::SamplingReport;
pub use sink::{CsvSink, Flattened, MemorySink, Recorder, SnapshotSink};
pub use slew::SlewPlan;
pub use status::parse_identity;
pub use types::*;
