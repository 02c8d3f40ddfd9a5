// src/process/mod.rs
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use std::io::{self, Write};
use thiserror::Error;
use tracing::{debug, trace};

pub mod timestamp;
pub mod utils;

use timestamp::{format_timestamp, Clock};
use utils::{clean_field, normalize_header, skipped_blank_lines, strip_bom};

/// Name of the column appended to every transformed document.
pub const TIMESTAMP_COLUMN: &str = "processed_timestamp";

#[derive(Debug, Error)]
pub enum TransformError {
    /// The document has no rows at all, so there is no header to normalize.
    #[error("malformed input: CSV document has no header row")]
    MalformedInput,

    #[error("input is not valid UTF-8 (valid up to byte {valid_up_to})")]
    Decode {
        valid_up_to: usize,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("writing transformed CSV: {0}")]
    Io(#[from] io::Error),
}

/// What a single transform saw and produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Data rows written, header excluded.
    pub rows: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Byte sink wrapper that tallies what passes through it.
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Normalize a CSV document from `input` into `sink`.
///
/// - The first row is the header: each name is trimmed, lowercased and has
///   spaces replaced with underscores, then `processed_timestamp` is appended.
/// - Every following row has each field trimmed and lowercased, then the
///   current time from `clock` appended. The clock is read once per row.
/// - Output is re-serialized with minimal quoting and `\n` after every row.
///
/// Rows may carry differing field counts; they are passed through as-is.
/// An empty line is a row with no fields: as the first row it yields a header
/// of just `processed_timestamp`, later it yields a timestamp-only row.
#[tracing::instrument(level = "debug", skip_all, fields(bytes_in = input.len()))]
pub fn transform_csv<W: Write>(
    input: &[u8],
    sink: W,
    clock: &dyn Clock,
) -> Result<TransformStats, TransformError> {
    let text = std::str::from_utf8(input).map_err(|source| TransformError::Decode {
        valid_up_to: source.valid_up_to(),
        source,
    })?;
    let text = strip_bom(text);

    let bytes = text.as_bytes();
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut writer = WriterBuilder::new()
        .flexible(true)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(CountingWriter {
            inner: sink,
            written: 0,
        });

    // The reader drops empty lines; each one still counts as a row with no
    // fields, so they are recovered from the bytes between records.
    let mut header_written = false;
    let mut rows = 0u64;
    let mut emit = |fields: &[&str]| -> Result<(), TransformError> {
        if header_written {
            let mut out: Vec<String> = Vec::with_capacity(fields.len() + 1);
            out.extend(fields.iter().map(|f| clean_field(f)));
            out.push(format_timestamp(&clock.now()));
            writer.write_record(&out)?;
            rows += 1;
        } else {
            let out: Vec<String> = fields
                .iter()
                .map(|f| normalize_header(f))
                .chain(std::iter::once(TIMESTAMP_COLUMN.to_string()))
                .collect();
            trace!(columns = ?out, "normalized header");
            writer.write_record(&out)?;
            header_written = true;
        }
        Ok(())
    };

    let mut record = StringRecord::new();
    let mut prev_end = 0usize;
    loop {
        let found = reader.read_record(&mut record)?;
        for _ in 0..skipped_blank_lines(bytes, prev_end) {
            emit(&[])?;
        }
        if !found {
            break;
        }
        let fields: Vec<&str> = record.iter().collect();
        emit(&fields)?;
        prev_end = reader.position().byte() as usize;
    }
    drop(emit);

    if !header_written {
        return Err(TransformError::MalformedInput);
    }

    writer.flush()?;
    let counted = writer.into_inner().map_err(|e| e.into_error())?;

    let stats = TransformStats {
        rows,
        bytes_in: input.len() as u64,
        bytes_out: counted.written,
    };
    debug!(
        rows = stats.rows,
        bytes_out = stats.bytes_out,
        "transformed CSV document"
    );
    Ok(stats)
}

/// Convenience wrapper around [`transform_csv`] collecting the output in memory.
pub fn transform_to_vec(
    input: &[u8],
    clock: &dyn Clock,
) -> Result<(Vec<u8>, TransformStats), TransformError> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 4);
    let stats = transform_csv(input, &mut out, clock)?;
    Ok((out, stats))
}
