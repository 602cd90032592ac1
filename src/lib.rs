#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # Batch pipeline

 A single-process, chunk-oriented ETL engine. Records are pulled from a
 source, transformed one by one, buffered into chunks and every chunk is
 written to an ordered list of sinks. Job and step executions are recorded
 in a repository so that a failed job can be restarted.

 ## Core Concepts

- **Job:** an ordered sequence of `Step`s run as one unit. A job halts at the
  first step that does not complete and notifies its listeners once.
- **Step:** reads, transforms and writes items chunk by chunk, keeping
  read/write/skip counts in a `StepExecution`.
- **ItemReader:** retrieval of input, one item at a time.
- **ItemProcessor:** business logic applied to each item; it may return the
  transformed item, skip it, or reject it.
- **ItemWriter:** output of a step, one chunk at a time.
- **JobRepository:** storage of executions, in memory or in a JSON file.

 ## Features

| **Feature**   | **Description**                                               |
|---------------|---------------------------------------------------------------|
| csv           | Enables CSV `ItemReader` and `ItemWriter`                     |
| xml           | Enables XML `ItemWriter`                                      |
| rdbc-sqlite   | Enables RDBC `ItemWriter` for SQLite                          |
| logger        | Enables a logger `ItemWriter`, useful for debugging purposes  |
| people        | Enables the people import job and its TOML configuration      |
| cli           | Builds the `import-people` binary                             |
| full          | Enables all library features                                  |

 ## Getting Started

```rust
# use serde::{Deserialize, Serialize};
# use batch_pipeline::{
#     core::{
#         item::{ItemProcessor, ItemProcessorResult},
#         job::{Job, JobBuilder, JobParameters},
#         step::StepBuilder,
#         BatchStatus,
#     },
#     error::BatchError,
#     item::csv::{csv_reader::CsvItemReaderBuilder, csv_writer::CsvItemWriterBuilder},
# };
# #[derive(Deserialize, Serialize, Debug, Clone)]
# struct Car {
#     year: u16,
#     make: String,
#     model: String,
# }
# #[derive(Default)]
# struct UpperCaseProcessor {}
# impl ItemProcessor<Car, Car> for UpperCaseProcessor {
#     fn process(&self, item: &Car) -> ItemProcessorResult<Car> {
#         Ok(Some(Car {
#             year: item.year,
#             make: item.make.to_uppercase(),
#             model: item.model.to_uppercase(),
#         }))
#     }
# }
fn main() -> Result<(), BatchError> {
    let csv = "year,make,model
   1948,Porsche,356
   1995,Peugeot,205
   1967,Ford,Mustang fastback 1967";

    let reader = CsvItemReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv.as_bytes());

    let processor = UpperCaseProcessor::default();

    let writer = CsvItemWriterBuilder::new()
        .has_headers(true)
        .from_writer(std::io::sink());

    let step = StepBuilder::<Car, Car>::new()
        .name("upper-case")
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .chunk(2)
        .skip_limit(2)
        .build()?;

    let job = JobBuilder::new().name("cars".to_string()).start(&step).build();
    let execution = job.run(&JobParameters::new());

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.step_executions[0].write_count, 3);

    Ok(())
}
```

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.
 */

/// Core module for batch operations
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Set of items readers / writers (for example: csv reader and writer)
pub mod item;

#[cfg(feature = "people")]
/// TOML configuration of the people import job
pub mod config;

#[cfg(feature = "people")]
pub mod people;
