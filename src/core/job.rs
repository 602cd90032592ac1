use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    listener::JobCompletionListener,
    repository::{InMemoryJobRepository, JobRepository},
    step::{Step, StepContext, StepExecution},
    BatchStatus,
};

/// Represents a job that can be executed.
///
/// A job is a container for a sequence of steps that are executed in order.
/// The job is responsible for orchestrating the steps and reporting the
/// overall result.
///
/// # Example Usage
///
/// ```ignore
/// use batch_pipeline::core::job::{Job, JobBuilder, JobParameters};
///
/// let job = JobBuilder::new()
///     .name("importUserJob".to_string())
///     .start(&step1)
///     .next(&step2)
///     .listener(&listener)
///     .build();
///
/// let execution = job.run(&JobParameters::new());
/// ```
pub trait Job {
    fn name(&self) -> &str;

    /// Runs the job to a terminal status.
    ///
    /// Failures are reported through the returned execution, never by
    /// panicking or by skipping the completion listeners.
    fn run(&self, parameters: &JobParameters) -> JobExecution;
}

/// Parameters of one launch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    /// Explicit run identifier, otherwise the last one plus one
    run_id: Option<u64>,
    values: BTreeMap<String, String>,
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, run_id: u64) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn run_id(&self) -> Option<u64> {
        self.run_id
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Represents the execution of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub job_name: String,
    /// Monotonically increasing per job name
    pub run_id: u64,
    pub status: BatchStatus,
    pub parameters: JobParameters,
    /// `true` when the previous run of the job did not complete
    pub restart: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Step executions in the order the steps ran
    pub step_executions: Vec<StepExecution>,
    pub failure: Option<String>,
}

impl JobExecution {
    pub fn new(job_name: &str, run_id: u64, parameters: JobParameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_name: job_name.to_string(),
            run_id,
            status: BatchStatus::Starting,
            parameters,
            restart: false,
            start_time: Utc::now(),
            end_time: None,
            step_executions: Vec::new(),
            failure: None,
        }
    }

    pub fn step_execution(&self, name: &str) -> Option<&StepExecution> {
        self.step_executions.iter().find(|step| step.name == name)
    }

    /// Replaces the execution of the same step, or appends it.
    pub fn upsert_step_execution(&mut self, execution: &StepExecution) {
        match self
            .step_executions
            .iter_mut()
            .find(|step| step.name == execution.name)
        {
            Some(step) => *step = execution.clone(),
            None => self.step_executions.push(execution.clone()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Completed
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// Requests a running job to stop at the next chunk boundary.
///
/// A request stays set once made: every later `run` sharing the handle
/// stops before its first chunk until [`JobStopHandle::reset`] is called.
#[derive(Debug, Clone, Default)]
pub struct JobStopHandle {
    requested: Arc<AtomicBool>,
}

impl JobStopHandle {
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Withdraws a stop request so the job can be launched again.
    pub fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Represents an instance of a job.
///
/// A job instance is created through the `JobBuilder` and executed by calling
/// the `run` method. The steps are executed in the order they were added.
pub struct JobInstance<'a> {
    /// Unique identifier for this job instance
    id: Uuid,
    /// Human-readable name for the job, key of its executions in the repository
    name: String,
    /// Collection of steps that make up this job, in execution order
    steps: Vec<&'a dyn Step>,
    listeners: Vec<&'a dyn JobCompletionListener>,
    repository: Option<&'a dyn JobRepository>,
    fallback_repository: InMemoryJobRepository,
    stop: JobStopHandle,
}

impl Job for JobInstance<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, parameters: &JobParameters) -> JobExecution {
        let repository = self.repository();

        info!("Start of job: {}, id: {}", self.name, self.id);

        let execution = match self.prepare(repository, parameters) {
            Ok((mut execution, completed_steps)) => {
                let outcome = self.execute_steps(repository, &mut execution, completed_steps);
                self.conclude(&mut execution, outcome);
                if let Err(error) = repository.save_job_execution(&execution) {
                    self.conclude(&mut execution, Err(error));
                }
                execution
            }
            Err(error) => {
                // the launch never started; nothing is recorded for it
                let run_id = parameters.run_id().unwrap_or_default();
                let mut execution = JobExecution::new(&self.name, run_id, parameters.clone());
                self.conclude(&mut execution, Err(error));
                execution
            }
        };

        info!(
            "End of job: {}, id: {}, run: {}, status: {:?}",
            self.name, self.id, execution.run_id, execution.status
        );

        for listener in &self.listeners {
            listener.on_complete(&execution);
        }

        execution
    }
}

impl JobInstance<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Handle to stop the job between two chunks, usable from another thread.
    pub fn stop_handle(&self) -> JobStopHandle {
        self.stop.clone()
    }

    fn repository(&self) -> &dyn JobRepository {
        self.repository.unwrap_or(&self.fallback_repository)
    }

    /// Picks the run id and, when the last run did not complete, the steps
    /// that need not run again.
    fn prepare(
        &self,
        repository: &dyn JobRepository,
        parameters: &JobParameters,
    ) -> Result<(JobExecution, Vec<StepExecution>), BatchError> {
        let last = repository.load(&self.name)?;
        let last_run_id = last.as_ref().map_or(0, |last| last.run_id);

        let run_id = match parameters.run_id() {
            Some(run_id) if run_id <= last_run_id => {
                return Err(BatchError::Configuration(format!(
                    "run id {} of job {} must be greater than the last run id {}",
                    run_id, self.name, last_run_id
                )));
            }
            Some(run_id) => run_id,
            None => last_run_id + 1,
        };

        let mut execution = JobExecution::new(&self.name, run_id, parameters.clone());

        let completed_steps = match last {
            Some(last) if last.status != BatchStatus::Completed => {
                info!(
                    "Restarting job {}: run {} ended {:?}",
                    self.name, last.run_id, last.status
                );
                execution.restart = true;
                last.step_executions
                    .into_iter()
                    .filter(|step| step.status == BatchStatus::Completed)
                    .collect()
            }
            _ => Vec::new(),
        };

        Ok((execution, completed_steps))
    }

    fn execute_steps(
        &self,
        repository: &dyn JobRepository,
        execution: &mut JobExecution,
        completed_steps: Vec<StepExecution>,
    ) -> Result<BatchStatus, BatchError> {
        execution.status = BatchStatus::Executing;
        repository.save_job_execution(execution)?;

        for step in &self.steps {
            if self.stop.is_stop_requested() {
                info!("Stop requested, job {} halts before step {}", self.name, step.name());
                return Ok(BatchStatus::Stopped);
            }

            if let Some(done) = completed_steps.iter().find(|done| done.name == step.name()) {
                info!(
                    "Step {} already completed in a previous run, not running it again",
                    step.name()
                );
                execution.step_executions.push(done.clone());
                repository.save_step_execution(&self.name, execution.run_id, done)?;
                continue;
            }

            let mut step_execution = StepExecution::new(step.name());
            repository.save_step_execution(&self.name, execution.run_id, &step_execution)?;

            let context = StepContext {
                job_name: &self.name,
                run_id: execution.run_id,
                repository,
                stop: &self.stop,
            };
            let result = step.execute(&context, &mut step_execution);
            let status = step_execution.status;

            let saved = repository.save_step_execution(&self.name, execution.run_id, &step_execution);
            execution.step_executions.push(step_execution);
            saved?;
            result?;

            if status == BatchStatus::Stopped {
                return Ok(BatchStatus::Stopped);
            }
        }

        Ok(BatchStatus::Completed)
    }

    fn conclude(&self, execution: &mut JobExecution, outcome: Result<BatchStatus, BatchError>) {
        execution.end_time = Some(Utc::now());
        match outcome {
            Ok(status) => execution.status = status,
            Err(error) => {
                error!("Job {} failed: {}", self.name, error);
                execution.status = BatchStatus::Failed;
                execution.failure = Some(error.to_string());
            }
        }
    }
}

/// Builder for creating a job instance.
///
/// # Example
///
/// ```ignore
/// use batch_pipeline::core::job::JobBuilder;
///
/// let job = JobBuilder::new()
///     .name("import-customers".to_string())
///     .repository(&repository)
///     .start(&read_step)
///     .next(&write_step)
///     .build();
/// ```
#[derive(Default)]
pub struct JobBuilder<'a> {
    /// Optional name for the job (generated randomly if not specified)
    name: Option<String>,
    /// Collection of steps to be executed, in order
    steps: Vec<&'a dyn Step>,
    listeners: Vec<&'a dyn JobCompletionListener>,
    repository: Option<&'a dyn JobRepository>,
    stop: Option<JobStopHandle>,
}

impl<'a> JobBuilder<'a> {
    pub fn new() -> Self {
        Self {
            name: None,
            steps: Vec::new(),
            listeners: Vec::new(),
            repository: None,
            stop: None,
        }
    }

    pub fn name(mut self, name: String) -> JobBuilder<'a> {
        self.name = Some(name);
        self
    }

    /// Sets the first step of the job.
    ///
    /// Identical to `next()`, reads better for the initial step.
    pub fn start(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    pub fn next(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    /// Adds a listener notified once the job reached a terminal status.
    pub fn listener(mut self, listener: &'a dyn JobCompletionListener) -> JobBuilder<'a> {
        self.listeners.push(listener);
        self
    }

    /// Sets where executions are recorded; an in-memory repository owned by
    /// the job is used otherwise.
    pub fn repository(mut self, repository: &'a dyn JobRepository) -> JobBuilder<'a> {
        self.repository = Some(repository);
        self
    }

    /// Shares a stop handle created before the job, e.g. by a signal handler.
    pub fn stop_handle(mut self, stop: JobStopHandle) -> JobBuilder<'a> {
        self.stop = Some(stop);
        self
    }

    pub fn build(self) -> JobInstance<'a> {
        JobInstance {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            steps: self.steps,
            listeners: self.listeners,
            repository: self.repository,
            fallback_repository: InMemoryJobRepository::new(),
            stop: self.stop.unwrap_or_default(),
        }
    }
}
