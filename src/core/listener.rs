use log::{info, warn};

use super::job::JobExecution;

/// Notified once per run, after the job reached a terminal status.
pub trait JobCompletionListener {
    fn on_complete(&self, execution: &JobExecution);
}

/// Logs a summary of the run and of each of its steps.
#[derive(Default)]
pub struct LoggingCompletionListener;

impl JobCompletionListener for LoggingCompletionListener {
    fn on_complete(&self, execution: &JobExecution) {
        let duration = execution
            .duration()
            .map(|duration| duration.num_milliseconds())
            .unwrap_or_default();

        if execution.is_success() {
            info!(
                "Job {} run {} completed in {} ms",
                execution.job_name, execution.run_id, duration
            );
        } else {
            warn!(
                "Job {} run {} ended {:?} after {} ms: {}",
                execution.job_name,
                execution.run_id,
                execution.status,
                duration,
                execution.failure.as_deref().unwrap_or("no failure recorded")
            );
        }

        for step in &execution.step_executions {
            info!(
                "  step {}: {:?}, read={}, written={}, skipped={}, failed={}",
                step.name,
                step.status,
                step.read_count,
                step.write_count,
                step.skip_count,
                step.failed_count
            );
        }
    }
}
