//! CSV input and labelled output
//!
//! Input needs `source` and `log_message` columns; any others are ignored.
//! A row with a blank `log_message` rejects the whole file. Output is `source,log_message,label,tier,confidence`.

use std::io::{Read, Write};
use thiserror::Error;
use vigilis_core::{ClassificationResult, LogRecord};

pub const MISSING_COLUMNS: &str = "CSV must contain 'source' and 'log_message' columns.";

const OUTPUT_HEADER: [&str; 5] = ["source", "log_message", "label", "tier", "confidence"];

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("{}", MISSING_COLUMNS)]
    MissingColumns,

    #[error("log_message is empty on data row {row}")]
    EmptyMessage { row: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read records from CSV with a header row
pub fn read_records<R: Read>(reader: R) -> Result<Vec<LogRecord>, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let (source_idx, message_idx) = match (column("source"), column("log_message")) {
        (Some(s), Some(m)) => (s, m),
        _ => return Err(CsvError::MissingColumns),
    };

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row?;
        let source = row.get(source_idx).unwrap_or_default();
        let message = row.get(message_idx).unwrap_or_default();
        if message.trim().is_empty() {
            return Err(CsvError::EmptyMessage { row: i + 1 });
        }
        records.push(LogRecord::with_source(source, message));
    }
    Ok(records)
}

/// Write records with their results
pub fn write_labelled<W: Write>(
    writer: W,
    records: &[LogRecord],
    results: &[ClassificationResult],
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(OUTPUT_HEADER)?;

    for (record, result) in records.iter().zip(results) {
        let confidence = format!("{:.4}", result.confidence);
        writer.write_record([
            record.source().unwrap_or_default(),
            record.raw(),
            result.label.as_str(),
            result.tier.as_str(),
            confidence.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Render labelled CSV into a string
pub fn labelled_to_string(
    records: &[LogRecord],
    results: &[ClassificationResult],
) -> Result<String, CsvError> {
    let mut buf = Vec::new();
    write_labelled(&mut buf, records, results)?;
    String::from_utf8(buf).map_err(|e| CsvError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}
