#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ChunkStatus {
    /// The buffer holds `chunk_size` items.
    Full,
    /// The source is exhausted; the buffer may hold fewer items, or none.
    Finished,
}

/// Buffer of transformed items committed as one unit.
///
/// Besides the items, a chunk keeps the bookkeeping needed to account for
/// every record it consumed: `read_count` records were pulled from the
/// source, `skip_count` of them were skipped, the rest are in `items`
/// (or, when the chunk fails, are reported as failed).
pub struct Chunk<O> {
    items: Vec<O>,
    chunk_size: usize,
    read_count: usize,
    skip_count: usize,
    read_skip_count: usize,
}

impl<O> Chunk<O> {
    pub fn new(chunk_size: usize) -> Chunk<O> {
        Chunk {
            items: Vec::with_capacity(chunk_size),
            chunk_size,
            read_count: 0,
            skip_count: 0,
            read_skip_count: 0,
        }
    }

    pub fn add_item(&mut self, item: O) {
        self.items.push(item);
    }

    pub fn inc_read_count(&mut self) {
        self.read_count += 1;
    }

    pub fn inc_skip_count(&mut self) {
        self.skip_count += 1;
    }

    pub fn inc_read_skip_count(&mut self) {
        self.read_skip_count += 1;
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.chunk_size
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get_items(&self) -> &[O] {
        &self.items
    }

    pub fn read_count(&self) -> usize {
        self.read_count
    }

    /// Closes the chunk into the report sent to the step.
    ///
    /// A successful chunk counts its items as written; a failed one counts
    /// every read record that was not skipped as failed.
    pub fn into_report(self, outcome: Result<(), crate::BatchError>) -> ChunkReport {
        let consumed = self.read_count - self.skip_count;
        let (write_count, failed_count, error) = match outcome {
            Ok(()) => (self.items.len(), 0, None),
            Err(error) => (0, consumed, Some(error)),
        };

        ChunkReport {
            read_count: self.read_count,
            write_count,
            skip_count: self.skip_count,
            read_skip_count: self.read_skip_count,
            failed_count,
            committed: error.is_none() && !self.items.is_empty(),
            error,
        }
    }
}

/// Accounting of one processed chunk, applied to the `StepExecution`.
#[derive(Debug, Default, PartialEq)]
pub struct ChunkReport {
    pub read_count: usize,
    pub write_count: usize,
    pub skip_count: usize,
    pub read_skip_count: usize,
    pub failed_count: usize,
    /// `true` when a non-empty chunk reached every writer.
    pub committed: bool,
    pub error: Option<crate::BatchError>,
}
