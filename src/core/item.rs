use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Result of reading one item: `Ok(None)` marks the end of the stream.
pub type ItemReaderResult<I> = Result<Option<I>, BatchError>;

/// Result of transforming one item: `Ok(None)` skips the item.
pub type ItemProcessorResult<O> = Result<Option<O>, BatchError>;

pub type ItemWriterResult = Result<(), BatchError>;

/// Lazily produces the items of a step, one at a time.
///
/// Readers are shared by the workers of a concurrent step, so they must be
/// `Sync`; the step serializes calls to `read` at chunk granularity.
pub trait ItemReader<I>: Sync {
    fn read(&self) -> ItemReaderResult<I>;

    fn open(&self) -> Result<(), BatchError> {
        Ok(())
    }

    fn close(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Maps one input item to zero or one output item.
///
/// Implementations must be stateless: the same input yields the same output,
/// and calls on different items may run in parallel.
pub trait ItemProcessor<I, O>: Sync {
    fn process(&self, item: &I) -> ItemProcessorResult<O>;
}

/// Persists a chunk of items to one destination.
pub trait ItemWriter<O>: Sync {
    fn write(&self, items: &[O]) -> ItemWriterResult;

    fn flush(&self) -> ItemWriterResult {
        Ok(())
    }

    fn open(&self) -> ItemWriterResult {
        Ok(())
    }

    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}

/// Identity processor.
#[derive(Default)]
pub struct DefaultProcessor;

impl<T: Clone> ItemProcessor<T, T> for DefaultProcessor {
    fn process(&self, item: &T) -> ItemProcessorResult<T> {
        Ok(Some(item.clone()))
    }
}

/// What a step does when reading or transforming an item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipPolicy {
    /// The first failure fails the chunk and the step.
    #[default]
    FailFast,
    /// Failures are counted as skips until `limit` skips have been absorbed.
    SkipAndContinue { limit: usize },
}
