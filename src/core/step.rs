use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc::{self, Sender},
        Mutex,
    },
    thread,
};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    chunk::{Chunk, ChunkReport, ChunkStatus},
    item::{ItemProcessor, ItemReader, ItemWriter, SkipPolicy},
    job::JobStopHandle,
    repository::JobRepository,
    BatchStatus,
};

/// Tracks one run of a step.
///
/// Every record read by the step ends up in exactly one of `write_count`,
/// `skip_count` or `failed_count`. Unreadable input absorbed by the skip
/// policy is not a record and is counted in `read_skip_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    /// Unique identifier for this step execution
    pub id: Uuid,
    /// Name of the step
    pub name: String,
    pub status: BatchStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Number of records pulled from the reader
    pub read_count: usize,
    /// Number of records acknowledged by every writer
    pub write_count: usize,
    /// Number of records dropped by the processor or absorbed by the skip policy
    pub skip_count: usize,
    /// Number of records belonging to the chunk that failed
    pub failed_count: usize,
    /// Number of unreadable inputs absorbed by the skip policy
    pub read_skip_count: usize,
    /// Number of non-empty chunks committed
    pub commit_count: usize,
    /// Error that failed the step, if any
    pub failure: Option<String>,
}

impl StepExecution {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: BatchStatus::Starting,
            start_time: None,
            end_time: None,
            read_count: 0,
            write_count: 0,
            skip_count: 0,
            failed_count: 0,
            read_skip_count: 0,
            commit_count: 0,
            failure: None,
        }
    }

    fn begin(&mut self) {
        self.status = BatchStatus::Executing;
        self.start_time = Some(Utc::now());
    }

    fn finish(&mut self, status: BatchStatus, failure: Option<String>) {
        self.status = status;
        self.failure = failure;
        self.end_time = Some(Utc::now());
    }

    fn apply(&mut self, report: &ChunkReport) {
        self.read_count += report.read_count;
        self.write_count += report.write_count;
        self.skip_count += report.skip_count;
        self.failed_count += report.failed_count;
        self.read_skip_count += report.read_skip_count;
        if report.committed {
            self.commit_count += 1;
        }
    }
}

/// What a step needs from the job running it.
pub struct StepContext<'a> {
    pub job_name: &'a str,
    pub run_id: u64,
    pub repository: &'a dyn JobRepository,
    pub stop: &'a JobStopHandle,
}

impl StepContext<'_> {
    fn save(&self, execution: &StepExecution) -> Result<(), BatchError> {
        self.repository
            .save_step_execution(self.job_name, self.run_id, execution)
    }
}

pub trait Step {
    fn name(&self) -> &str;

    /// Executes the step.
    ///
    /// The step owns the transitions of `execution`. It returns
    /// `Err(BatchError::Step)` when it ended `Failed`, the underlying error
    /// being kept in `execution.failure`.
    fn execute(
        &self,
        context: &StepContext,
        execution: &mut StepExecution,
    ) -> Result<(), BatchError>;
}

/// Shared count of failures absorbed by the skip policy.
struct SkipBudget {
    limit: Option<usize>,
    used: AtomicUsize,
}

impl SkipBudget {
    fn new(policy: SkipPolicy) -> Self {
        let limit = match policy {
            SkipPolicy::FailFast => None,
            SkipPolicy::SkipAndContinue { limit } => Some(limit),
        };
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    fn try_skip(&self, error: &BatchError) -> bool {
        match self.limit {
            Some(limit) if error.is_skippable() => self.used.fetch_add(1, Ordering::SeqCst) < limit,
            _ => false,
        }
    }
}

/// Reads, transforms and writes items chunk by chunk.
pub struct ChunkOrientedStep<'a, I, O> {
    name: String,
    reader: &'a dyn ItemReader<I>,
    processor: &'a dyn ItemProcessor<I, O>,
    /// Called in order for every chunk
    writers: Vec<&'a dyn ItemWriter<O>>,
    chunk_size: usize,
    skip_policy: SkipPolicy,
    /// Extra attempts granted to a failing writer
    retry_limit: usize,
    /// Number of chunk workers, 1 runs the step on the caller's thread
    concurrency: usize,
}

impl<I, O> Step for ChunkOrientedStep<'_, I, O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        context: &StepContext,
        execution: &mut StepExecution,
    ) -> Result<(), BatchError> {
        execution.begin();
        info!("Start of step: {}, id: {}", execution.name, execution.id);

        let outcome = self.open().and_then(|()| {
            if self.concurrency > 1 {
                self.run_concurrent(context, execution)
            } else {
                self.run_sequential(context, execution)
            }
        });

        let closed = self.close();
        let outcome = match (outcome, closed) {
            (Ok(status), Ok(())) => Ok(status),
            (Ok(_), Err(error)) => Err(error),
            (Err(error), Err(close_error)) => {
                warn!("Error while closing step {}: {}", self.name, close_error);
                Err(error)
            }
            (Err(error), Ok(())) => Err(error),
        };

        let result = match outcome {
            Ok(status) => {
                execution.finish(status, None);
                Ok(())
            }
            Err(error) => {
                error!("Step {} failed: {}", self.name, error);
                execution.finish(BatchStatus::Failed, Some(error.to_string()));
                Err(BatchError::Step(self.name.clone()))
            }
        };

        info!(
            "End of step: {}, id: {}, status: {:?}, read: {}, written: {}, skipped: {}",
            execution.name,
            execution.id,
            execution.status,
            execution.read_count,
            execution.write_count,
            execution.skip_count
        );

        result
    }
}

impl<I, O> ChunkOrientedStep<'_, I, O> {
    fn open(&self) -> Result<(), BatchError> {
        self.reader.open()?;
        for writer in &self.writers {
            writer.open()?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), BatchError> {
        let mut result = self.reader.close();
        for writer in &self.writers {
            let closed = writer.close();
            if result.is_ok() {
                result = closed;
            }
        }
        result
    }

    fn run_sequential(
        &self,
        context: &StepContext,
        execution: &mut StepExecution,
    ) -> Result<BatchStatus, BatchError> {
        let budget = SkipBudget::new(self.skip_policy);

        loop {
            if context.stop.is_stop_requested() {
                info!("Stop requested, step {} halts between chunks", self.name);
                return Ok(BatchStatus::Stopped);
            }

            let mut chunk = Chunk::new(self.chunk_size);
            let filled = self.fill_chunk(&mut chunk, &budget);
            let finished = matches!(filled, Ok(ChunkStatus::Finished));
            let outcome = filled.and_then(|_| self.write_chunk(chunk.get_items()));

            self.apply_report(context, execution, chunk.into_report(outcome))?;

            if finished {
                return Ok(BatchStatus::Completed);
            }
        }
    }

    /// Runs `concurrency` workers, each processing whole chunks.
    ///
    /// Workers take the read gate for the duration of one chunk read, so
    /// records of different chunks never interleave. Reports flow back over
    /// a channel and this thread alone updates `execution`.
    fn run_concurrent(
        &self,
        context: &StepContext,
        execution: &mut StepExecution,
    ) -> Result<BatchStatus, BatchError> {
        let budget = SkipBudget::new(self.skip_policy);
        let read_gate = Mutex::new(false);
        let halted = AtomicBool::new(false);
        let stop = context.stop;
        let (sender, receiver) = mpsc::channel::<ChunkReport>();

        let failure = thread::scope(|scope| {
            let mut failure = None;

            for worker in 0..self.concurrency {
                let sender = sender.clone();
                let (budget, read_gate, halted) = (&budget, &read_gate, &halted);
                let spawned = thread::Builder::new()
                    .name(format!("{}-worker-{}", self.name, worker))
                    .spawn_scoped(scope, move || {
                        self.work(stop, budget, read_gate, halted, sender)
                    });

                if let Err(error) = spawned {
                    halted.store(true, Ordering::SeqCst);
                    failure = Some(BatchError::Step(format!(
                        "{}: unable to spawn chunk worker: {}",
                        self.name, error
                    )));
                    break;
                }
            }
            drop(sender);

            for report in receiver {
                if let Err(error) = self.apply_report(context, execution, report) {
                    halted.store(true, Ordering::SeqCst);
                    match failure {
                        None => failure = Some(error),
                        Some(_) => warn!("Further chunk failure in step {}: {}", self.name, error),
                    }
                }
            }

            failure
        });

        if let Some(error) = failure {
            return Err(error);
        }

        let exhausted = read_gate
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if exhausted {
            Ok(BatchStatus::Completed)
        } else {
            info!("Stop requested, step {} halted its workers", self.name);
            Ok(BatchStatus::Stopped)
        }
    }

    fn work(
        &self,
        stop: &JobStopHandle,
        budget: &SkipBudget,
        read_gate: &Mutex<bool>,
        halted: &AtomicBool,
        sender: Sender<ChunkReport>,
    ) {
        loop {
            if halted.load(Ordering::SeqCst) || stop.is_stop_requested() {
                break;
            }

            let mut chunk = Chunk::new(self.chunk_size);
            let outcome = self
                .read_chunk(&mut chunk, budget, read_gate)
                .and_then(|(items, status)| {
                    items
                        .iter()
                        .try_for_each(|item| self.process_item(item, &mut chunk, budget))?;
                    self.write_chunk(chunk.get_items())?;
                    Ok(status)
                });

            let ended = !matches!(outcome, Ok(ChunkStatus::Full));

            if sender.send(chunk.into_report(outcome.map(|_| ()))).is_err() || ended {
                break;
            }
        }
    }

    /// Pulls up to `chunk_size` raw items while holding the read gate.
    fn read_chunk(
        &self,
        chunk: &mut Chunk<O>,
        budget: &SkipBudget,
        read_gate: &Mutex<bool>,
    ) -> Result<(Vec<I>, ChunkStatus), BatchError> {
        let mut exhausted = read_gate
            .lock()
            .map_err(|_| BatchError::Step(format!("{}: read gate poisoned", self.name)))?;

        let mut items = Vec::with_capacity(self.chunk_size);
        if *exhausted {
            return Ok((items, ChunkStatus::Finished));
        }

        debug!("Start reading chunk");
        while items.len() < self.chunk_size {
            match self.read_item(chunk, budget) {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {
                    *exhausted = true;
                    return Ok((items, ChunkStatus::Finished));
                }
                Err(error) => {
                    *exhausted = true;
                    return Err(error);
                }
            }
        }

        Ok((items, ChunkStatus::Full))
    }

    /// Reads and transforms items until the chunk is full or the reader
    /// is exhausted.
    fn fill_chunk(&self, chunk: &mut Chunk<O>, budget: &SkipBudget) -> Result<ChunkStatus, BatchError> {
        debug!("Start reading chunk");

        while !chunk.is_full() {
            match self.read_item(chunk, budget)? {
                Some(item) => self.process_item(&item, chunk, budget)?,
                None => {
                    debug!("End reading chunk: FINISHED");
                    return Ok(ChunkStatus::Finished);
                }
            }
        }

        debug!("End reading chunk: FULL");
        Ok(ChunkStatus::Full)
    }

    fn read_item(&self, chunk: &mut Chunk<O>, budget: &SkipBudget) -> Result<Option<I>, BatchError> {
        loop {
            match self.reader.read() {
                Ok(Some(item)) => {
                    chunk.inc_read_count();
                    return Ok(Some(item));
                }
                Ok(None) => return Ok(None),
                Err(error) if budget.try_skip(&error) => {
                    warn!("Skipping unreadable item: {}", error);
                    chunk.inc_read_skip_count();
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn process_item(&self, item: &I, chunk: &mut Chunk<O>, budget: &SkipBudget) -> Result<(), BatchError> {
        match self.processor.process(item) {
            Ok(Some(processed)) => chunk.add_item(processed),
            Ok(None) => {
                debug!("Item skipped by processor");
                chunk.inc_skip_count();
            }
            Err(error) if budget.try_skip(&error) => {
                warn!("Skipping item after processor error: {}", error);
                chunk.inc_skip_count();
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    /// Flushes a chunk to every writer, in order.
    ///
    /// Writers that succeeded before a failing one are not rolled back.
    fn write_chunk(&self, items: &[O]) -> Result<(), BatchError> {
        if items.is_empty() {
            debug!("No items to write, skipping write call");
            return Ok(());
        }

        debug!("Writing chunk of {} items", items.len());
        for (index, writer) in self.writers.iter().enumerate() {
            if let Err(error) = self.write_with_retry(*writer, items) {
                error!("Writer #{} of step {} failed: {}", index, self.name, error);
                return Err(error);
            }
        }
        Ok(())
    }

    fn write_with_retry(&self, writer: &dyn ItemWriter<O>, items: &[O]) -> Result<(), BatchError> {
        let mut attempt = 0;
        loop {
            match writer.write(items).and_then(|()| writer.flush()) {
                Ok(()) => return Ok(()),
                Err(error) if attempt < self.retry_limit => {
                    attempt += 1;
                    warn!(
                        "Retrying chunk write ({}/{}) after error: {}",
                        attempt, self.retry_limit, error
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn apply_report(
        &self,
        context: &StepContext,
        execution: &mut StepExecution,
        mut report: ChunkReport,
    ) -> Result<(), BatchError> {
        execution.apply(&report);

        if let Some(error) = report.error.take() {
            return Err(error);
        }

        if report.committed {
            debug!(
                "Chunk committed for step {}: {} items written",
                self.name, report.write_count
            );
        }

        context.save(execution)
    }
}

/// Builder for a [`ChunkOrientedStep`].
///
/// # Example
///
/// ```
/// use batch_pipeline::core::{
///     item::{DefaultProcessor, SkipPolicy},
///     step::StepBuilder,
/// };
/// use batch_pipeline::item::{csv::csv_reader::CsvItemReaderBuilder, logger::LoggerWriter};
///
/// let reader = CsvItemReaderBuilder::new().from_reader("Doe,Jon\nSmith,Anna".as_bytes());
/// let processor = DefaultProcessor;
/// let writer = LoggerWriter::default();
///
/// let step = StepBuilder::<Vec<String>, Vec<String>>::new()
///     .name("log-people")
///     .reader(&reader)
///     .processor(&processor)
///     .writer(&writer)
///     .chunk(5)
///     .skip_policy(SkipPolicy::SkipAndContinue { limit: 2 })
///     .build()
///     .unwrap();
/// ```
pub struct StepBuilder<'a, I, O> {
    name: Option<String>,
    reader: Option<&'a dyn ItemReader<I>>,
    processor: Option<&'a dyn ItemProcessor<I, O>>,
    writers: Vec<&'a dyn ItemWriter<O>>,
    chunk_size: usize,
    skip_policy: SkipPolicy,
    retry_limit: usize,
    concurrency: usize,
}

impl<I, O> Default for StepBuilder<'_, I, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, I, O> StepBuilder<'a, I, O> {
    pub fn new() -> StepBuilder<'a, I, O> {
        Self {
            name: None,
            reader: None,
            processor: None,
            writers: Vec::new(),
            chunk_size: 10,
            skip_policy: SkipPolicy::FailFast,
            retry_limit: 0,
            concurrency: 1,
        }
    }

    pub fn name(mut self, name: &str) -> StepBuilder<'a, I, O> {
        self.name = Some(name.to_string());
        self
    }

    pub fn reader(mut self, reader: &'a dyn ItemReader<I>) -> StepBuilder<'a, I, O> {
        self.reader = Some(reader);
        self
    }

    pub fn processor(mut self, processor: &'a dyn ItemProcessor<I, O>) -> StepBuilder<'a, I, O> {
        self.processor = Some(processor);
        self
    }

    /// Adds a writer; a chunk goes to writers in the order they were added.
    pub fn writer(mut self, writer: &'a dyn ItemWriter<O>) -> StepBuilder<'a, I, O> {
        self.writers.push(writer);
        self
    }

    /// Sets the commit interval.
    pub fn chunk(mut self, chunk_size: usize) -> StepBuilder<'a, I, O> {
        self.chunk_size = chunk_size;
        self
    }

    pub fn skip_policy(mut self, skip_policy: SkipPolicy) -> StepBuilder<'a, I, O> {
        self.skip_policy = skip_policy;
        self
    }

    /// Shorthand for `SkipPolicy::SkipAndContinue { limit }`.
    pub fn skip_limit(self, limit: usize) -> StepBuilder<'a, I, O> {
        self.skip_policy(SkipPolicy::SkipAndContinue { limit })
    }

    pub fn retry_limit(mut self, retry_limit: usize) -> StepBuilder<'a, I, O> {
        self.retry_limit = retry_limit;
        self
    }

    /// Number of chunks processed at the same time.
    pub fn concurrency(mut self, concurrency: usize) -> StepBuilder<'a, I, O> {
        self.concurrency = concurrency;
        self
    }

    pub fn build(self) -> Result<ChunkOrientedStep<'a, I, O>, BatchError> {
        let name = self.name.unwrap_or_else(build_name);

        let reader = self
            .reader
            .ok_or_else(|| BatchError::Configuration(format!("step {}: a reader is required", name)))?;
        let processor = self.processor.ok_or_else(|| {
            BatchError::Configuration(format!("step {}: a processor is required", name))
        })?;
        if self.writers.is_empty() {
            return Err(BatchError::Configuration(format!(
                "step {}: at least one writer is required",
                name
            )));
        }
        if self.chunk_size == 0 {
            return Err(BatchError::Configuration(format!(
                "step {}: chunk size must be at least 1",
                name
            )));
        }
        if self.concurrency == 0 {
            return Err(BatchError::Configuration(format!(
                "step {}: concurrency must be at least 1",
                name
            )));
        }

        Ok(ChunkOrientedStep {
            name,
            reader,
            processor,
            writers: self.writers,
            chunk_size: self.chunk_size,
            skip_policy: self.skip_policy,
            retry_limit: self.retry_limit,
            concurrency: self.concurrency,
        })
    }
}
