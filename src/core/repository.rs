use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::BatchError;

use super::{job::JobExecution, step::StepExecution};

/// Persists job and step executions, keyed by job name and run id.
///
/// The job reads the repository once at start to choose between a fresh
/// start and a restart, then writes to it as the run progresses.
pub trait JobRepository {
    /// Returns the execution with the highest run id for `job_name`.
    fn load(&self, job_name: &str) -> Result<Option<JobExecution>, BatchError>;

    /// Inserts or replaces the execution with the same job name and run id.
    fn save_job_execution(&self, execution: &JobExecution) -> Result<(), BatchError>;

    /// Inserts or replaces a step of an execution already saved.
    fn save_step_execution(
        &self,
        job_name: &str,
        run_id: u64,
        execution: &StepExecution,
    ) -> Result<(), BatchError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ExecutionStore {
    executions: Vec<JobExecution>,
}

impl ExecutionStore {
    fn last(&self, job_name: &str) -> Option<&JobExecution> {
        self.executions
            .iter()
            .filter(|execution| execution.job_name == job_name)
            .max_by_key(|execution| execution.run_id)
    }

    fn upsert_job(&mut self, execution: &JobExecution) {
        match self.executions.iter_mut().find(|stored| {
            stored.job_name == execution.job_name && stored.run_id == execution.run_id
        }) {
            Some(stored) => *stored = execution.clone(),
            None => self.executions.push(execution.clone()),
        }
    }

    fn upsert_step(
        &mut self,
        job_name: &str,
        run_id: u64,
        execution: &StepExecution,
    ) -> Result<(), BatchError> {
        let stored = self
            .executions
            .iter_mut()
            .find(|stored| stored.job_name == job_name && stored.run_id == run_id)
            .ok_or_else(|| {
                BatchError::Repository(format!(
                    "no execution of job {} with run id {}",
                    job_name, run_id
                ))
            })?;
        stored.upsert_step_execution(execution);
        Ok(())
    }
}

fn lock(store: &Mutex<ExecutionStore>) -> Result<MutexGuard<'_, ExecutionStore>, BatchError> {
    store
        .lock()
        .map_err(|_| BatchError::Repository("execution store poisoned".to_string()))
}

/// Keeps executions for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    store: Mutex<ExecutionStore>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All executions of `job_name`, ordered by run id.
    pub fn executions(&self, job_name: &str) -> Vec<JobExecution> {
        let mut executions: Vec<JobExecution> = match self.store.lock() {
            Ok(store) => store
                .executions
                .iter()
                .filter(|execution| execution.job_name == job_name)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        };
        executions.sort_by_key(|execution| execution.run_id);
        executions
    }
}

impl JobRepository for InMemoryJobRepository {
    fn load(&self, job_name: &str) -> Result<Option<JobExecution>, BatchError> {
        Ok(lock(&self.store)?.last(job_name).cloned())
    }

    fn save_job_execution(&self, execution: &JobExecution) -> Result<(), BatchError> {
        lock(&self.store)?.upsert_job(execution);
        Ok(())
    }

    fn save_step_execution(
        &self,
        job_name: &str,
        run_id: u64,
        execution: &StepExecution,
    ) -> Result<(), BatchError> {
        lock(&self.store)?.upsert_step(job_name, run_id, execution)
    }
}

/// Stores executions as a JSON document, rewritten on every save.
///
/// The document is first written to a sibling temporary file then renamed
/// over the previous one, so a crash leaves either the old or the new state.
#[derive(Debug)]
pub struct JsonFileJobRepository {
    path: PathBuf,
    store: Mutex<ExecutionStore>,
}

impl JsonFileJobRepository {
    /// Opens the repository at `path`; a missing file is an empty repository.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let path = path.as_ref().to_path_buf();
        let store = Self::read(&path)?;
        Ok(Self {
            path,
            store: Mutex::new(store),
        })
    }

    fn read(path: &Path) -> Result<ExecutionStore, BatchError> {
        if !path.exists() {
            return Ok(ExecutionStore::default());
        }

        let file = File::open(path).map_err(|error| {
            BatchError::Repository(format!("unable to open {}: {}", path.display(), error))
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|error| {
            BatchError::Repository(format!("unable to parse {}: {}", path.display(), error))
        })
    }

    fn write(&self, store: &ExecutionStore) -> Result<(), BatchError> {
        let temporary = self.path.with_extension("json.tmp");
        let to_error = |error: std::io::Error| {
            BatchError::Repository(format!("unable to write {}: {}", self.path.display(), error))
        };

        let file = File::create(&temporary).map_err(to_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, store)
            .map_err(|error| BatchError::Repository(error.to_string()))?;
        writer.flush().map_err(to_error)?;
        fs::rename(&temporary, &self.path).map_err(to_error)?;

        debug!("Job repository saved to {}", self.path.display());
        Ok(())
    }
}

impl JobRepository for JsonFileJobRepository {
    fn load(&self, job_name: &str) -> Result<Option<JobExecution>, BatchError> {
        let mut store = lock(&self.store)?;
        *store = Self::read(&self.path)?;
        Ok(store.last(job_name).cloned())
    }

    fn save_job_execution(&self, execution: &JobExecution) -> Result<(), BatchError> {
        let mut store = lock(&self.store)?;
        store.upsert_job(execution);
        self.write(&store)
    }

    fn save_step_execution(
        &self,
        job_name: &str,
        run_id: u64,
        execution: &StepExecution,
    ) -> Result<(), BatchError> {
        let mut store = lock(&self.store)?;
        store.upsert_step(job_name, run_id, execution)?;
        self.write(&store)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::core::{job::JobParameters, BatchStatus};

    fn execution(job_name: &str, run_id: u64) -> JobExecution {
        JobExecution::new(job_name, run_id, JobParameters::new())
    }

    #[test]
    fn load_should_return_the_highest_run_of_the_job() {
        let repository = InMemoryJobRepository::new();
        repository.save_job_execution(&execution("import", 1)).unwrap();
        repository.save_job_execution(&execution("import", 3)).unwrap();
        repository.save_job_execution(&execution("export", 7)).unwrap();

        assert_eq!(repository.load("import").unwrap().unwrap().run_id, 3);
        assert_eq!(repository.load("export").unwrap().unwrap().run_id, 7);
        assert!(repository.load("unknown").unwrap().is_none());
    }

    #[test]
    fn step_executions_should_be_upserted_by_name() {
        let repository = InMemoryJobRepository::new();
        repository.save_job_execution(&execution("import", 1)).unwrap();

        let mut step = StepExecution::new("step1");
        repository.save_step_execution("import", 1, &step).unwrap();
        step.status = BatchStatus::Completed;
        step.write_count = 4;
        repository.save_step_execution("import", 1, &step).unwrap();

        let stored = repository.load("import").unwrap().unwrap();
        assert_eq!(stored.step_executions.len(), 1);
        assert_eq!(stored.step_executions[0].write_count, 4);
        assert_eq!(stored.step_executions[0].status, BatchStatus::Completed);
    }

    #[test]
    fn saving_a_step_of_an_unknown_run_should_fail() {
        let repository = InMemoryJobRepository::new();
        let result = repository.save_step_execution("import", 1, &StepExecution::new("step1"));
        assert!(matches!(result, Err(BatchError::Repository(_))));
    }

    #[test]
    fn json_repository_should_survive_reopening() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("executions.json");

        {
            let repository = JsonFileJobRepository::open(&path).unwrap();
            let mut job = execution("import", 1);
            job.status = BatchStatus::Failed;
            repository.save_job_execution(&job).unwrap();
            let mut step = StepExecution::new("step1");
            step.status = BatchStatus::Completed;
            repository.save_step_execution("import", 1, &step).unwrap();
        }

        let repository = JsonFileJobRepository::open(&path).unwrap();
        let last = repository.load("import").unwrap().unwrap();
        assert_eq!(last.status, BatchStatus::Failed);
        assert_eq!(last.step_execution("step1").unwrap().status, BatchStatus::Completed);
        assert!(!dir.path().join("executions.json.tmp").exists());
    }

    #[test]
    fn json_repository_should_reject_corrupt_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("executions.json");
        fs::write(&path, "{ not json").unwrap();

        let result = JsonFileJobRepository::open(&path);
        assert!(matches!(result, Err(BatchError::Repository(_))));
    }
}
