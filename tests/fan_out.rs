mod common;

use std::{
    io::{self, ErrorKind},
    sync::Mutex,
};

use batch_pipeline::{
    core::{
        item::{DefaultProcessor, ItemWriter, ItemWriterResult},
        job::{Job, JobBuilder, JobParameters},
        step::StepBuilder,
        BatchStatus,
    },
    item::csv::{csv_reader::CsvItemReaderBuilder, csv_writer::CsvItemWriterBuilder},
};
use common::MockFile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Car {
    year: u16,
    make: String,
    model: String,
}

const CARS: &str = "year,make,model
1948,Porsche,356
1995,Peugeot,205
2021,Mazda,CX-30";

#[derive(Default)]
struct CollectingWriter {
    items: Mutex<Vec<Car>>,
}

impl ItemWriter<Car> for CollectingWriter {
    fn write(&self, items: &[Car]) -> ItemWriterResult {
        self.items.lock().unwrap().extend_from_slice(items);
        Ok(())
    }
}

fn denied_file() -> MockFile {
    let mut file = MockFile::default();
    file.expect_write()
        .returning(|_buf| Err(io::Error::from(ErrorKind::PermissionDenied)));
    file.expect_flush().returning(|| Ok(()));
    file
}

#[test]
fn failing_second_writer_should_fail_the_chunk_after_the_first_wrote_it() {
    let reader = CsvItemReaderBuilder::new()
        .has_headers(true)
        .from_reader(CARS.as_bytes());
    let collected = CollectingWriter::default();
    let denied = CsvItemWriterBuilder::new().from_writer(denied_file());

    let step = StepBuilder::<Car, Car>::new()
        .name("fan-out")
        .reader(&reader)
        .processor(&DefaultProcessor)
        .writer(&collected)
        .writer(&denied)
        .chunk(2)
        .build()
        .unwrap();

    let job = JobBuilder::new().name("cars".to_string()).start(&step).build();
    let execution = job.run(&JobParameters::new());

    assert_eq!(execution.status, BatchStatus::Failed);
    let step = &execution.step_executions[0];
    assert_eq!(step.read_count, 2);
    assert_eq!(step.write_count, 0);
    assert_eq!(step.failed_count, 2);
    assert_eq!(step.commit_count, 0);
    assert!(step.failure.as_deref().unwrap().contains("ItemWriter"));

    // no rollback of the writer that acknowledged the chunk
    assert_eq!(collected.items.lock().unwrap().len(), 2);
}

#[test]
fn failing_first_writer_should_keep_later_writers_untouched() {
    let reader = CsvItemReaderBuilder::new()
        .has_headers(true)
        .from_reader(CARS.as_bytes());
    let denied = CsvItemWriterBuilder::new().from_writer(denied_file());
    let collected = CollectingWriter::default();

    let step = StepBuilder::<Car, Car>::new()
        .reader(&reader)
        .processor(&DefaultProcessor)
        .writer(&denied)
        .writer(&collected)
        .chunk(5)
        .retry_limit(2)
        .build()
        .unwrap();

    let job = JobBuilder::new().start(&step).build();
    let execution = job.run(&JobParameters::new());

    assert_eq!(execution.status, BatchStatus::Failed);
    assert_eq!(execution.step_executions[0].read_count, 3);
    assert_eq!(execution.step_executions[0].failed_count, 3);
    assert!(collected.items.lock().unwrap().is_empty());
}

#[test]
fn every_writer_should_receive_every_chunk_in_order() {
    let reader = CsvItemReaderBuilder::new()
        .has_headers(true)
        .from_reader(CARS.as_bytes());
    let first = CollectingWriter::default();
    let second = CollectingWriter::default();

    let step = StepBuilder::<Car, Car>::new()
        .reader(&reader)
        .processor(&DefaultProcessor)
        .writer(&first)
        .writer(&second)
        .chunk(2)
        .build()
        .unwrap();

    let execution = JobBuilder::new()
        .start(&step)
        .build()
        .run(&JobParameters::new());

    assert!(execution.is_success());
    assert_eq!(execution.step_executions[0].commit_count, 2);
    let first = first.items.lock().unwrap().clone();
    assert_eq!(first, *second.items.lock().unwrap());
    let models: Vec<&str> = first.iter().map(|car| car.model.as_str()).collect();
    assert_eq!(models, vec!["356", "205", "CX-30"]);
}
