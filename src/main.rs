use std::{path::PathBuf, process};

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use sqlx::sqlite::SqlitePoolOptions;

use batch_pipeline::{
    config::BatchConfig,
    core::{
        item::SkipPolicy,
        job::{JobParameters, JobStopHandle},
        launcher::{JobLauncher, EXIT_FAILED},
        repository::{InMemoryJobRepository, JobRepository, JsonFileJobRepository},
    },
    people::{create_table, with_import_user_job, ImportResources},
};

#[derive(Parser, Debug)]
#[command(name = "import-people")]
#[command(version)]
#[command(about = "Imports people from a CSV file into SQLite, a flat file and an XML document.",
          long_about = None)]
struct Cli {
    /// TOML configuration file, defaults are used when absent
    #[arg(short, long, env = "IMPORT_PEOPLE_CONFIG")]
    config: Option<PathBuf>,

    /// Name of the job to launch, defaults to the configured one
    #[arg(short, long)]
    job_name: Option<String>,

    /// Explicit run id, must be greater than the last recorded one
    #[arg(long)]
    run_id: Option<u64>,

    /// Input CSV file
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[arg(long)]
    chunk_size: Option<usize>,

    /// Worker threads per step
    #[arg(long)]
    concurrency: Option<usize>,

    /// Tolerate up to this many rejected records per step
    #[arg(long)]
    skip_limit: Option<usize>,

    #[arg(long)]
    retry_limit: Option<usize>,

    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// JSON file recording executions, enables restarts across launches
    #[arg(long)]
    repository: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(BatchConfig, Option<String>, Option<u64>)> {
        let mut config = match &self.config {
            Some(path) => BatchConfig::from_path(path)?,
            None => BatchConfig::default(),
        };

        if let Some(input) = self.input {
            config.input.path = input;
        }
        if let Some(size) = self.chunk_size {
            config.chunk.size = size;
        }
        if let Some(concurrency) = self.concurrency {
            config.chunk.concurrency = concurrency;
        }
        if let Some(limit) = self.skip_limit {
            config.chunk.skip_policy = SkipPolicy::SkipAndContinue { limit };
        }
        if let Some(retry_limit) = self.retry_limit {
            config.chunk.retry_limit = retry_limit;
        }
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        if self.repository.is_some() {
            config.repository = self.repository;
        }
        config.validate()?;

        Ok((config, self.job_name, self.run_id))
    }
}

fn run() -> anyhow::Result<i32> {
    let (config, job_name, run_id) = Cli::parse().into_config()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("unable to start the tokio runtime")?;

    let pool = runtime
        .block_on(
            SqlitePoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect(&config.database.url),
        )
        .with_context(|| format!("unable to connect to {}", config.database.url))?;
    runtime.block_on(create_table(&pool, &config.database.table))?;

    let repository: Box<dyn JobRepository> = match &config.repository {
        Some(path) => Box::new(JsonFileJobRepository::open(path)?),
        None => Box::new(InMemoryJobRepository::new()),
    };

    let stop = JobStopHandle::default();
    let signal_stop = stop.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current chunk");
            signal_stop.stop();
        }
    });

    let mut parameters = JobParameters::new();
    if let Some(run_id) = run_id {
        parameters = parameters.with_run_id(run_id);
    }
    parameters = parameters.with("input", &config.input.path.display().to_string());

    let resources = ImportResources {
        pool: &pool,
        handle: runtime.handle().clone(),
        repository: repository.as_ref(),
        stop,
    };
    let job_name = job_name.unwrap_or_else(|| config.job_name.clone());

    let code = with_import_user_job(&config, &resources, |job| {
        JobLauncher::new().register(job).launch(&job_name, &parameters)
    })?;

    info!("Job {} exited with status {}", job_name, code);
    runtime.block_on(pool.close());
    Ok(code)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(code) => process::exit(code),
        Err(error) => {
            error!("{:#}", error);
            process::exit(EXIT_FAILED);
        }
    }
}
