use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
/// Batch error
pub enum BatchError {
    /// Malformed or unavailable input.
    ///
    /// `position` is the 1-based record number within the source and `raw`
    /// holds the offending input when the adapter could capture it.
    #[error("ItemReader from: {message} (record {position}, input: {raw:?})")]
    ItemReader {
        message: String,
        position: u64,
        raw: String,
    },

    #[error("ItemProcessor from: {0}")]
    ItemProcessor(String),

    #[error("ItemWriter from: {0}")]
    ItemWriter(String),

    /// Execution metadata could not be loaded or persisted.
    #[error("JobRepository from: {0}")]
    Repository(String),

    #[error("Step failed: {0}")]
    Step(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl BatchError {
    /// Builds a read error carrying the offending input and its position.
    pub fn read(message: impl Into<String>, position: u64, raw: impl Into<String>) -> Self {
        BatchError::ItemReader {
            message: message.into(),
            position,
            raw: raw.into(),
        }
    }

    /// Returns `true` when the skip policy is allowed to absorb this error.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            BatchError::ItemReader { .. } | BatchError::ItemProcessor(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::BatchError;

    #[test]
    fn read_error_should_expose_position_and_raw_input() {
        let error = BatchError::read("invalid digit", 7, "19x8,Porsche");
        assert_eq!(
            error.to_string(),
            "ItemReader from: invalid digit (record 7, input: \"19x8,Porsche\")"
        );
        assert!(error.is_skippable());
    }

    #[test]
    fn write_and_repository_errors_are_never_skippable() {
        assert!(!BatchError::ItemWriter("disk full".to_string()).is_skippable());
        assert!(!BatchError::Repository("locked".to_string()).is_skippable());
        assert!(BatchError::ItemProcessor("blank".to_string()).is_skippable());
    }
}
