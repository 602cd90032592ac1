use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};

pub mod chunk;

pub mod item;

pub mod job;

pub mod launcher;

pub mod listener;

pub mod repository;

pub mod step;

/// Lifecycle status shared by jobs and steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Created, not yet running.
    Starting,
    /// Running.
    Executing,
    /// Finished successfully.
    Completed,
    /// Finished on an unrecoverable error.
    Failed,
    /// Halted between two chunks on request.
    Stopped,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Stopped
        )
    }
}

/// Generates a random name consisting of alphanumeric characters.
///
/// # Returns
///
/// A `String` containing the generated random name.
fn build_name() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 8)
}

#[cfg(test)]
mod tests {
    use super::{build_name, BatchStatus};

    #[test]
    fn generated_names_are_eight_alphanumerics() {
        let name = build_name();
        assert_eq!(name.len(), 8);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn only_finished_statuses_are_terminal() {
        assert!(!BatchStatus::Starting.is_terminal());
        assert!(!BatchStatus::Executing.is_terminal());
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(BatchStatus::Stopped.is_terminal());
    }
}
