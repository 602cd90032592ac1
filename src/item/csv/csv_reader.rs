use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Terminator, Trim};
use serde::de::DeserializeOwned;
use std::{fs::File, io::Read, path::Path, sync::Mutex};

use crate::{
    core::item::{ItemReader, ItemReaderResult},
    error::BatchError,
};

struct CsvReaderState<R> {
    records: StringRecordsIntoIter<R>,
    /// Number of records pulled so far, headers excluded
    position: u64,
    /// Names rows are mapped with, explicit or taken from the header row
    names: Option<StringRecord>,
}

/// A CSV item reader that implements the `ItemReader` trait.
///
/// This reader deserializes CSV data into Rust structs row by row
/// using Serde's deserialization capabilities. It can process CSV
/// data from files, strings, or any source implementing the `Read` trait.
///
/// A row that cannot be parsed or deserialized is reported as
/// `BatchError::ItemReader` carrying its 1-based record position and
/// its raw fields joined with the delimiter.
///
/// # Examples
///
/// ```
/// use batch_pipeline::item::csv::csv_reader::CsvItemReaderBuilder;
/// use batch_pipeline::core::item::ItemReader;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Person {
///     last_name: String,
///     first_name: String,
/// }
///
/// let reader = CsvItemReaderBuilder::new()
///     .names(&["last_name", "first_name"])
///     .from_reader("Doe,Jon\nSmith,Anna".as_bytes());
///
/// let person: Person = reader.read().unwrap().unwrap();
/// assert_eq!(person.last_name, "Doe");
/// assert_eq!(person.first_name, "Jon");
/// ```
pub struct CsvItemReader<R> {
    state: Mutex<CsvReaderState<R>>,
    has_headers: bool,
    delimiter: u8,
}

impl<R> CsvItemReader<R> {
    fn raw(&self, record: &StringRecord) -> String {
        let delimiter = char::from(self.delimiter).to_string();
        record.iter().collect::<Vec<_>>().join(&delimiter)
    }
}

impl<R: Read + Send, T: DeserializeOwned> ItemReader<T> for CsvItemReader<R> {
    /// Reads the next item from the CSV source.
    ///
    /// # Returns
    /// - `Ok(Some(record))` if a record is successfully read
    /// - `Ok(None)` if there are no more records to read
    /// - `Err(BatchError::ItemReader { .. })` if the row is malformed
    fn read(&self) -> ItemReaderResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BatchError::read("CSV reader poisoned", 0, ""))?;

        if state.names.is_none() && self.has_headers {
            let headers = state
                .records
                .reader_mut()
                .headers()
                .map_err(|error| BatchError::read(error.to_string(), 0, ""))?
                .clone();
            state.names = Some(headers);
        }

        let Some(result) = state.records.next() else {
            return Ok(None);
        };
        state.position += 1;
        let position = state.position;

        match result {
            Ok(string_record) => string_record
                .deserialize(state.names.as_ref())
                .map(Some)
                .map_err(|error| {
                    BatchError::read(error.to_string(), position, self.raw(&string_record))
                }),
            Err(error) => Err(BatchError::read(error.to_string(), position, "")),
        }
    }
}

/// A builder for configuring CSV item reading.
///
/// # Default Configuration
///
/// - Delimiter: comma (,)
/// - Terminator: CRLF (CR, LF or CRLF accepted)
/// - Headers: disabled
/// - Trimming: All fields trimmed
pub struct CsvItemReaderBuilder {
    /// The delimiter character (default: comma ',')
    delimiter: u8,
    /// The line terminator (default: CRLF)
    terminator: Terminator,
    /// Whether the CSV has headers (default: false)
    has_headers: bool,
    trim: Trim,
    names: Option<Vec<String>>,
}

impl Default for CsvItemReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvItemReaderBuilder {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            terminator: Terminator::CRLF,
            has_headers: false,
            trim: Trim::All,
            names: None,
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn has_headers(mut self, yes: bool) -> Self {
        self.has_headers = yes;
        self
    }

    pub fn trim(mut self, trim: Trim) -> Self {
        self.trim = trim;
        self
    }

    /// Names the columns of the input, in order.
    ///
    /// Rows are then deserialized by these names. Without them, an input
    /// with headers is mapped by its header row.
    pub fn names(mut self, names: &[&str]) -> Self {
        self.names = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    fn reader_builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .trim(self.trim)
            .delimiter(self.delimiter)
            .terminator(self.terminator)
            .has_headers(self.has_headers);
        builder
    }

    fn build<R: Read>(self, rdr: csv::Reader<R>) -> CsvItemReader<R> {
        CsvItemReader {
            state: Mutex::new(CsvReaderState {
                records: rdr.into_records(),
                position: 0,
                names: self.names.map(StringRecord::from),
            }),
            has_headers: self.has_headers,
            delimiter: self.delimiter,
        }
    }

    /// Creates a reader over any `Read` source.
    pub fn from_reader<R: Read>(self, rdr: R) -> CsvItemReader<R> {
        let rdr = self.reader_builder().from_reader(rdr);
        self.build(rdr)
    }

    /// Opens the file at `path`.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<CsvItemReader<File>, BatchError> {
        let path = path.as_ref();
        let rdr = self.reader_builder().from_path(path).map_err(|error| {
            BatchError::read(
                format!("unable to open {}: {}", path.display(), error),
                0,
                "",
            )
        })?;
        Ok(self.build(rdr))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde::Deserialize;
    use tempfile::NamedTempFile;

    use super::CsvItemReaderBuilder;
    use crate::{core::item::ItemReader, error::BatchError};

    #[derive(Debug, Deserialize, PartialEq)]
    struct City {
        city: String,
        country: String,
        pop: u32,
    }

    #[test]
    fn content_with_headers_should_be_deserialized() {
        let data = "city,country,pop
        Boston,United States,4628910
        Concord,United States,42695";

        let reader = CsvItemReaderBuilder::new()
            .has_headers(true)
            .from_reader(data.as_bytes());

        let first: City = reader.read().unwrap().unwrap();
        assert_eq!(first.city, "Boston");
        assert_eq!(first.pop, 4628910);
        let second: City = reader.read().unwrap().unwrap();
        assert_eq!(second.city, "Concord");
        assert!(ItemReader::<City>::read(&reader).unwrap().is_none());
    }

    #[test]
    fn names_should_map_header_less_columns() {
        let reader = CsvItemReaderBuilder::new()
            .names(&["country", "city", "pop"])
            .from_reader("France,Paris,2102650".as_bytes());

        let city: City = reader.read().unwrap().unwrap();
        assert_eq!(
            city,
            City {
                city: "Paris".to_string(),
                country: "France".to_string(),
                pop: 2102650,
            }
        );
    }

    #[test]
    fn header_row_should_map_columns_by_name() {
        let data = "country,city,pop
        France,Paris,2102650";

        let reader = CsvItemReaderBuilder::new()
            .has_headers(true)
            .from_reader(data.as_bytes());

        let city: City = reader.read().unwrap().unwrap();
        assert_eq!(city.city, "Paris");
        assert_eq!(city.country, "France");
        assert_eq!(city.pop, 2102650);
    }

    #[test]
    fn empty_input_with_headers_should_end_immediately() {
        let reader = CsvItemReaderBuilder::new()
            .has_headers(true)
            .from_reader("".as_bytes());

        assert!(ItemReader::<City>::read(&reader).unwrap().is_none());
    }

    #[test]
    fn malformed_row_should_report_position_and_raw_input() {
        let data = "city,country,pop
        Boston,United States,4628910
        Concord,United States,many";

        let reader = CsvItemReaderBuilder::new()
            .has_headers(true)
            .from_reader(data.as_bytes());

        let _: City = reader.read().unwrap().unwrap();
        let error = ItemReader::<City>::read(&reader).unwrap_err();

        match error {
            BatchError::ItemReader { position, raw, .. } => {
                assert_eq!(position, 2);
                assert_eq!(raw, "Concord,United States,many");
            }
            other => panic!("Expected ItemReader error, got {:?}", other),
        }
    }

    #[test]
    fn semicolon_delimited_file_should_be_read() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "city;country;pop\nLyon;France;513275\n").unwrap();

        let reader = CsvItemReaderBuilder::new()
            .has_headers(true)
            .delimiter(b';')
            .from_path(file.path())
            .unwrap();

        let city: City = reader.read().unwrap().unwrap();
        assert_eq!(city.city, "Lyon");
    }

    #[test]
    fn missing_file_should_be_a_read_error() {
        let result = CsvItemReaderBuilder::new().from_path("/nonexistent/people.csv");
        assert!(matches!(result, Err(BatchError::ItemReader { .. })));
    }
}
