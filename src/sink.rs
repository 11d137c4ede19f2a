//! Snapshot sinks and the flattening rule that feeds them.
//!
//! A snapshot is flattened through its JSON shape: nested field names are
//! joined with `_` (`output_curr`, `hw_serial`, ...) and the columns are
//! sorted by name, so the header and every row line up.

use crate::error::Result;
use crate::types::Snapshot;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;

/// Separator between nested field names
pub const FIELD_SEPARATOR: &str = "_";

/// Consumer of flattened snapshots (CSV file, console, ...)
pub trait SnapshotSink {
    /// Called once, before the first row
    fn on_header(&mut self, fields: &[String]) -> Result<()>;

    /// Called once per snapshot, values in header order
    fn on_row(&mut self, values: &[String]) -> Result<()>;

    /// Flush and release the sink. Called on every exit path.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: SnapshotSink + ?Sized> SnapshotSink for &mut S {
    fn on_header(&mut self, fields: &[String]) -> Result<()> {
        (**self).on_header(fields)
    }

    fn on_row(&mut self, values: &[String]) -> Result<()> {
        (**self).on_row(values)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Sorted `name -> value` view of a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Flattened(BTreeMap<String, String>);

impl Flattened {
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self> {
        let value = serde_json::to_value(snapshot)?;
        let mut fields = BTreeMap::new();
        flatten_into(&value, "", &mut fields);
        Ok(Self(fields))
    }

    /// Column names, sorted
    pub fn header(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Values in header order
    pub fn row(&self) -> Vec<String> {
        self.0.values().cloned().collect()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }
}

fn flatten_into(value: &Value, prefix: &str, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}{}{}", prefix, FIELD_SEPARATOR, key)
                };
                flatten_into(child, &name, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Null => {
            out.insert(prefix.to_string(), String::new());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

/// Feeds snapshots into a sink, emitting the header before the first row
pub struct Recorder<S> {
    sink: S,
    rows: usize,
}

impl<S: SnapshotSink> Recorder<S> {
    pub fn new(sink: S) -> Self {
        Self { sink, rows: 0 }
    }

    pub fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        let flat = Flattened::from_snapshot(snapshot)?;
        if self.rows == 0 {
            self.sink.on_header(&flat.header())?;
        }
        self.sink.on_row(&flat.row())?;
        self.rows += 1;
        Ok(())
    }

    /// Rows recorded so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(&mut self) -> Result<()> {
        self.sink.finish()
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

/// Writes the header and rows as CSV
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| std::io::Error::new(e.error().kind(), e.to_string()).into())
    }
}

impl CsvSink<std::fs::File> {
    /// Create (truncate) a CSV file at `path`
    pub fn create<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
        })
    }
}

impl<W: Write> SnapshotSink for CsvSink<W> {
    fn on_header(&mut self, fields: &[String]) -> Result<()> {
        self.writer.write_record(fields)?;
        Ok(())
    }

    fn on_row(&mut self, values: &[String]) -> Result<()> {
        self.writer.write_record(values)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps everything in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub headers_seen: usize,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `field` in every recorded row
    pub fn column(&self, field: &str) -> Vec<String> {
        let Some(idx) = self
            .header
            .as_ref()
            .and_then(|h| h.iter().position(|f| f == field))
        else {
            return Vec::new();
        };
        self.rows.iter().map(|r| r[idx].clone()).collect()
    }
}

impl SnapshotSink for MemorySink {
    fn on_header(&mut self, fields: &[String]) -> Result<()> {
        self.header = Some(fields.to_vec());
        self.headers_seen += 1;
        Ok(())
    }

    fn on_row(&mut self, values: &[String]) -> Result<()> {
        self.rows.push(values.to_vec());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
