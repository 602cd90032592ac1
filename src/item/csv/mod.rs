/// CSV support for reading and writing tabular data.
///
/// The reader deserializes each row into a Rust struct with serde, either
/// by header name or, for header-less inputs, by the field names given to
/// the builder. The writer serializes items in struct field order and can
/// append to an existing file.
///
/// # Examples
///
/// ## Reading from CSV
///
/// ```
/// use batch_pipeline::item::csv::csv_reader::CsvItemReaderBuilder;
/// use batch_pipeline::core::item::ItemReader;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize, PartialEq)]
/// struct City {
///     city: String,
///     country: String,
///     pop: u32,
/// }
///
/// let csv_data = "\
/// city,country,pop
/// Boston,United States,4628910
/// Concord,United States,42695
/// ";
///
/// let reader = CsvItemReaderBuilder::new()
///     .has_headers(true)
///     .delimiter(b',')
///     .from_reader(csv_data.as_bytes());
///
/// let mut cities: Vec<City> = Vec::new();
/// while let Some(city) = reader.read().unwrap() {
///     cities.push(city);
/// }
///
/// assert_eq!(cities.len(), 2);
/// assert_eq!(cities[0].city, "Boston");
/// assert_eq!(cities[1].pop, 42695);
/// ```
///
/// ## Writing to CSV
///
/// ```
/// use batch_pipeline::item::csv::csv_writer::CsvItemWriterBuilder;
/// use batch_pipeline::core::item::ItemWriter;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Person {
///     name: String,
///     age: u8,
/// }
///
/// let people = vec![
///     Person { name: "Alice".to_string(), age: 28 },
///     Person { name: "Bob".to_string(), age: 35 },
/// ];
///
/// let mut buffer = Vec::new();
/// {
///     let writer = CsvItemWriterBuilder::new()
///         .has_headers(true)
///         .from_writer(&mut buffer);
///
///     writer.write(&people).unwrap();
///     ItemWriter::<Person>::flush(&writer).unwrap();
/// }
///
/// assert_eq!(String::from_utf8(buffer).unwrap(), "name,age\nAlice,28\nBob,35\n");
/// ```

/// A module providing facilities for reading CSV data records.
pub mod csv_reader;

/// A module providing facilities for writing CSV data records.
pub mod csv_writer;
