use std::{
    fs::File,
    io::{self, Write},
    path::Path,
    result,
    sync::{Mutex, MutexGuard},
};

use csv::{Writer, WriterBuilder};
use log::debug;
use serde::Serialize;

use crate::{core::item::ItemWriter, item::destination::Destination, BatchError};

struct CsvState<T: Write> {
    pending: Option<Destination<T>>,
    writer: Option<Writer<T>>,
}

/// Serializes items as CSV rows.
///
/// The destination is opened by `open` or by the first `write`, whichever
/// comes first.
pub struct CsvItemWriter<T: Write> {
    state: Mutex<CsvState<T>>,
    delimiter: u8,
    has_headers: bool,
}

impl<T: Write> CsvItemWriter<T> {
    fn new(destination: Destination<T>, delimiter: u8, has_headers: bool) -> Self {
        CsvItemWriter {
            state: Mutex::new(CsvState {
                pending: Some(destination),
                writer: None,
            }),
            delimiter,
            has_headers,
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, CsvState<T>>, BatchError> {
        self.state
            .lock()
            .map_err(|_| BatchError::ItemWriter("CSV writer poisoned".to_string()))
    }

    fn opened<'s>(&self, state: &'s mut CsvState<T>) -> Result<&'s mut Writer<T>, BatchError> {
        if state.writer.is_none() {
            let destination = state.pending.take().ok_or_else(|| {
                BatchError::ItemWriter("CSV destination lost by a failed open".to_string())
            })?;
            let target = destination.describe();
            let (output, has_content) = destination.open().map_err(|error| {
                BatchError::ItemWriter(format!("unable to open {}: {}", target, error))
            })?;
            if has_content {
                debug!("Appending to {}", target);
            }
            let writer = WriterBuilder::new()
                .flexible(false)
                .delimiter(self.delimiter)
                .has_headers(self.has_headers && !has_content)
                .from_writer(output);
            state.writer = Some(writer);
        }

        state
            .writer
            .as_mut()
            .ok_or_else(|| BatchError::ItemWriter("CSV writer is not open".to_string()))
    }

    pub fn into_inner(self) -> result::Result<T, BatchError> {
        let state = self
            .state
            .into_inner()
            .map_err(|_| BatchError::ItemWriter("CSV writer poisoned".to_string()))?;
        match state.writer {
            Some(writer) => writer
                .into_inner()
                .map_err(|error| BatchError::ItemWriter(error.to_string())),
            None => state
                .pending
                .and_then(Destination::into_writer)
                .ok_or_else(|| BatchError::ItemWriter("CSV writer has no output".to_string())),
        }
    }
}

impl<T: Write + Send, R: Serialize> ItemWriter<R> for CsvItemWriter<T> {
    fn write(&self, items: &[R]) -> Result<(), BatchError> {
        let mut state = self.state()?;
        let writer = self.opened(&mut state)?;
        for item in items {
            writer
                .serialize(item)
                .map_err(|error| BatchError::ItemWriter(error.to_string()))?;
        }
        Ok(())
    }

    /// Flush the contents of the internal buffer to the underlying writer.
    ///
    /// Note that this also flushes the underlying writer.
    fn flush(&self) -> Result<(), BatchError> {
        match self.state()?.writer.as_mut() {
            Some(writer) => writer
                .flush()
                .map_err(|error| BatchError::ItemWriter(error.to_string())),
            None => Ok(()),
        }
    }

    /// Creates the file, or truncates it unless appending.
    fn open(&self) -> Result<(), BatchError> {
        let mut state = self.state()?;
        self.opened(&mut state).map(|_| ())
    }

    fn close(&self) -> Result<(), BatchError> {
        ItemWriter::<R>::flush(self)
    }
}

pub struct CsvItemWriterBuilder {
    delimiter: u8,
    has_headers: bool,
    append: bool,
}

impl Default for CsvItemWriterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvItemWriterBuilder {
    pub fn new() -> CsvItemWriterBuilder {
        CsvItemWriterBuilder {
            delimiter: b',',
            has_headers: false,
            append: false,
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> CsvItemWriterBuilder {
        self.delimiter = delimiter;
        self
    }

    pub fn has_headers(mut self, yes: bool) -> CsvItemWriterBuilder {
        self.has_headers = yes;
        self
    }

    /// Keeps existing content and writes after it.
    ///
    /// The header row is only written when the file is empty.
    pub fn append(mut self, yes: bool) -> CsvItemWriterBuilder {
        self.append = yes;
        self
    }

    /// Targets the file at `path`, which is only touched once the writer opens.
    pub fn from_path<R: AsRef<Path>>(self, path: R) -> CsvItemWriter<File> {
        CsvItemWriter::new(
            Destination::file(path.as_ref(), self.append),
            self.delimiter,
            self.has_headers,
        )
    }

    /// Serialize records using Serde.
    ///
    /// The fields of the struct are used to write a header row when
    /// `has_headers` is enabled.
    ///
    /// ```
    /// # use std::error::Error;
    /// # use batch_pipeline::{item::csv::csv_writer::CsvItemWriterBuilder, core::item::ItemWriter};
    /// #[derive(serde::Serialize)]
    /// struct Row<'a> {
    ///     city: &'a str,
    ///     country: &'a str,
    ///     #[serde(rename = "popcount")]
    ///     population: u64,
    /// }
    ///
    /// # fn main() { example().unwrap(); }
    /// fn example() -> Result<(), Box<dyn Error>> {
    ///     let wtr = CsvItemWriterBuilder::new()
    ///         .has_headers(true)
    ///         .from_writer(vec![]);
    ///
    ///     wtr.write(&[
    ///         Row { city: "Boston", country: "United States", population: 4628910 },
    ///         Row { city: "Concord", country: "United States", population: 42695 },
    ///     ])?;
    ///
    ///     let data = String::from_utf8(wtr.into_inner()?)?;
    ///     assert_eq!(data, "\
    /// city,country,popcount
    /// Boston,United States,4628910
    /// Concord,United States,42695
    /// ");
    ///     Ok(())
    /// }
    /// ```
    pub fn from_writer<W: io::Write>(self, wtr: W) -> CsvItemWriter<W> {
        CsvItemWriter::new(Destination::Writer(wtr), self.delimiter, self.has_headers)
    }
}
