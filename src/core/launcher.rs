use log::error;

use super::{
    job::{Job, JobExecution, JobParameters},
    BatchStatus,
};

/// Exit status of a completed job.
pub const EXIT_COMPLETED: i32 = 0;
/// Exit status of a failed or stopped job.
pub const EXIT_FAILED: i32 = 1;
/// Exit status when no registered job has the requested name.
pub const EXIT_UNKNOWN_JOB: i32 = 2;

/// Launches registered jobs by name and maps their outcome to an exit status.
#[derive(Default)]
pub struct JobLauncher<'a> {
    jobs: Vec<&'a dyn Job>,
}

impl<'a> JobLauncher<'a> {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn register(mut self, job: &'a dyn Job) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn launch(&self, job_name: &str, parameters: &JobParameters) -> i32 {
        match self.jobs.iter().find(|job| job.name() == job_name) {
            Some(job) => Self::exit_status(&job.run(parameters)),
            None => {
                error!("No job named {} is registered", job_name);
                EXIT_UNKNOWN_JOB
            }
        }
    }

    pub fn exit_status(execution: &JobExecution) -> i32 {
        match execution.status {
            BatchStatus::Completed => EXIT_COMPLETED,
            _ => EXIT_FAILED,
        }
    }
}
