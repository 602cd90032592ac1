use std::fs::File;

use sqlx::SqlitePool;
use tokio::runtime::Handle;

use crate::{
    config::{delimiter_byte, is_sql_identifier, BatchConfig, InputConfig, Sink},
    core::{
        item::ItemWriter,
        job::{Job, JobBuilder, JobStopHandle},
        listener::LoggingCompletionListener,
        repository::JobRepository,
        step::{ChunkOrientedStep, StepBuilder},
    },
    item::{
        csv::{
            csv_reader::{CsvItemReader, CsvItemReaderBuilder},
            csv_writer::CsvItemWriterBuilder,
        },
        logger::LoggerWriter,
        rdbc::SqliteItemWriterBuilder,
        xml::XmlItemWriterBuilder,
    },
    BatchError,
};

use super::{PeopleVerificationListener, Person, PersonBinder, PersonItemProcessor};

/// Field names of a header-less people file, in column order.
const INPUT_NAMES: [&str; 2] = ["lastName", "firstName"];

/// What the import job borrows from its caller.
pub struct ImportResources<'a> {
    pub pool: &'a SqlitePool,
    /// Runtime the SQL writer and the verification listener block on
    pub handle: Handle,
    pub repository: &'a dyn JobRepository,
    pub stop: JobStopHandle,
}

/// Creates the people table when it does not exist yet.
pub async fn create_table(pool: &SqlitePool, table: &str) -> Result<(), BatchError> {
    if !is_sql_identifier(table) {
        return Err(BatchError::Configuration(format!(
            "{:?} is not a plain SQL identifier",
            table
        )));
    }

    let statement = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            person_id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name VARCHAR(20),
            last_name VARCHAR(20)
        )",
        table
    );
    sqlx::query(&statement)
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|error| BatchError::Configuration(format!("unable to create {}: {}", table, error)))
}

fn open_reader(input: &InputConfig) -> Result<CsvItemReader<File>, BatchError> {
    let builder = CsvItemReaderBuilder::new()
        .delimiter(delimiter_byte(input.delimiter)?)
        .has_headers(input.has_headers);
    let builder = if input.has_headers {
        builder
    } else {
        builder.names(&INPUT_NAMES)
    };
    builder.from_path(&input.path)
}

fn required<W>(writer: &Option<W>, sink: Sink) -> Result<&W, BatchError> {
    writer
        .as_ref()
        .ok_or_else(|| BatchError::Configuration(format!("sink {:?} was not built", sink)))
}

/// Assembles the people import job described by `config` and hands it to
/// `launch`.
///
/// Each step reads the whole input again through its own reader, transforms
/// it with [`PersonItemProcessor`] and writes to the sinks listed for it.
/// Writers and readers live for the duration of `launch` only.
///
/// ```no_run
/// use batch_pipeline::config::BatchConfig;
/// use batch_pipeline::core::job::{Job, JobParameters, JobStopHandle};
/// use batch_pipeline::core::repository::InMemoryJobRepository;
/// use batch_pipeline::people::{create_table, with_import_user_job, ImportResources};
/// use sqlx::SqlitePool;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = tokio::runtime::Runtime::new()?;
/// let config = BatchConfig::default();
/// let pool = runtime.block_on(SqlitePool::connect(&config.database.url))?;
/// runtime.block_on(create_table(&pool, &config.database.table))?;
///
/// let repository = InMemoryJobRepository::new();
/// let resources = ImportResources {
///     pool: &pool,
///     handle: runtime.handle().clone(),
///     repository: &repository,
///     stop: JobStopHandle::default(),
/// };
///
/// let execution = with_import_user_job(&config, &resources, |job| job.run(&JobParameters::new()))?;
/// assert!(execution.is_success());
/// # Ok(())
/// # }
/// ```
pub fn with_import_user_job<R>(
    config: &BatchConfig,
    resources: &ImportResources<'_>,
    launch: impl FnOnce(&dyn Job) -> R,
) -> Result<R, BatchError> {
    config.validate()?;
    let sinks = config.sinks();

    let readers = config
        .steps
        .iter()
        .map(|_| open_reader(&config.input))
        .collect::<Result<Vec<_>, _>>()?;
    let processor = PersonItemProcessor;
    let binder = PersonBinder;

    let database = if sinks.contains(&Sink::Database) {
        let mut builder = SqliteItemWriterBuilder::<Person>::new()
            .pool(resources.pool)
            .table(&config.database.table)
            .item_binder(&binder)
            .handle(resources.handle.clone());
        for column in PersonBinder::COLUMNS {
            builder = builder.add_column(column);
        }
        if let Some(timeout) = config.database.timeout() {
            builder = builder.timeout(timeout);
        }
        Some(builder.build()?)
    } else {
        None
    };

    let flat_file = if sinks.contains(&Sink::FlatFile) {
        Some(
            CsvItemWriterBuilder::new()
                .delimiter(delimiter_byte(config.flat_file.delimiter)?)
                .has_headers(config.flat_file.has_headers)
                .append(config.flat_file.append)
                .from_path(&config.flat_file.path),
        )
    } else {
        None
    };

    let xml = if sinks.contains(&Sink::Xml) {
        Some(
            XmlItemWriterBuilder::new()
                .root_tag(&config.xml.root_tag)
                .item_tag(&config.xml.item_tag)
                .from_path::<Person, _>(&config.xml.path),
        )
    } else {
        None
    };

    let logger = LoggerWriter::default();

    let steps = config
        .steps
        .iter()
        .zip(&readers)
        .map(|(step, reader)| {
            let mut builder = StepBuilder::<Person, Person>::new()
                .name(&step.name)
                .reader(reader)
                .processor(&processor)
                .chunk(config.chunk.size)
                .skip_policy(config.chunk.skip_policy)
                .retry_limit(config.chunk.retry_limit)
                .concurrency(config.chunk.concurrency);
            for sink in &step.sinks {
                let writer: &dyn ItemWriter<Person> = match sink {
                    Sink::Database => required(&database, *sink)?,
                    Sink::FlatFile => required(&flat_file, *sink)?,
                    Sink::Xml => required(&xml, *sink)?,
                    Sink::Logger => &logger,
                };
                builder = builder.writer(writer);
            }
            builder.build()
        })
        .collect::<Result<Vec<ChunkOrientedStep<Person, Person>>, BatchError>>()?;

    let summary = LoggingCompletionListener;
    let verification = PeopleVerificationListener::new(
        resources.pool,
        &config.database.table,
        resources.handle.clone(),
    );

    let mut job = JobBuilder::new()
        .name(config.job_name.clone())
        .repository(resources.repository)
        .stop_handle(resources.stop.clone())
        .listener(&summary);
    if sinks.contains(&Sink::Database) {
        job = job.listener(&verification);
    }
    for step in &steps {
        job = job.next(step);
    }

    Ok(launch(&job.build()))
}
