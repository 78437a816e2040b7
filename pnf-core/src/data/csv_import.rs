//! CSV bar files for offline runs.
//!
//! One file per instrument at `<dir>/<SYMBOL>.csv` with the header
//! `timestamp,open,high,low,close,volume` and RFC 3339 timestamps. Rows may
//! be in any order; bars are returned oldest first.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::interval::Interval;
use super::provider::{BarSource, DataError};
use crate::domain::{Bar, Instrument};

/// Parse bars from CSV text.
pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>, DataError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for (i, record) in rdr.deserialize::<Bar>().enumerate() {
        // Header is line 1.
        let bar = record.map_err(|e| {
            DataError::ResponseFormatChanged(format!("csv row {}: {e}", i + 2))
        })?;
        bars.push(bar);
    }
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

/// Write bars as CSV with the same header `read_bars` expects.
pub fn write_bars<W: Write>(writer: W, bars: &[Bar]) -> Result<(), DataError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for bar in bars {
        wtr.serialize(bar)
            .map_err(|e| DataError::Other(format!("csv write: {e}")))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Bar source backed by a directory of CSV files.
///
/// The interval is not checked: a file holds whatever spacing it was
/// written with.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }
}

impl BarSource for CsvProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self, instrument: &Instrument, _interval: Interval) -> Result<Vec<Bar>, DataError> {
        let path = self.path_for(&instrument.symbol);
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DataError::InstrumentNotFound {
                    symbol: instrument.symbol.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let bars = read_bars(std::io::BufReader::new(file))?;
        log::debug!("{}: {} bars from {}", instrument.symbol, bars.len(), path.display());
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SAMPLE: &str = "\
timestamp,open,high,low,close,volume
2024-01-02T04:15:00Z,101,103,100,102,900
2024-01-02T03:45:00Z,100,102,99,101,1000
";

    #[test]
    fn reads_and_sorts() {
        let bars = read_bars(SAMPLE.as_bytes()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(
            bars[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 45, 0).unwrap()
        );
        assert_eq!(bars[0].close, 101.0);
        assert_eq!(bars[1].volume, 900);
    }

    #[test]
    fn bad_row_reports_line() {
        let text = "timestamp,open,high,low,close,volume\nnot-a-date,1,2,0,1,5\n";
        let err = read_bars(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("row 2"), "{err}");
    }

    #[test]
    fn provider_reads_symbol_file() {
        let dir = tempfile::tempdir().unwrap();
        let bars = read_bars(SAMPLE.as_bytes()).unwrap();
        let file = std::fs::File::create(dir.path().join("TCS.csv")).unwrap();
        write_bars(file, &bars).unwrap();

        let provider = CsvProvider::new(dir.path());
        let inst = Instrument::new("TCS", 2953213, "NSE");
        let fetched = provider.fetch(&inst, Interval::ThirtyMinute).unwrap();
        assert_eq!(fetched, bars);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CsvProvider::new(dir.path());
        let inst = Instrument::new("ITC", 424961, "NSE");
        assert!(matches!(
            provider.fetch(&inst, Interval::ThirtyMinute),
            Err(DataError::InstrumentNotFound { .. })
        ));
    }
}
