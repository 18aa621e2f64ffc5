use crate::{BenchErr, Result, model::Batch};

/// A restartable, sequential producer of batches.
///
/// A source is finite until reset and single-pass between resets. Pulling a batch may block
/// on I/O.
pub trait BatchSource: Send {
    /// Returns true if `next_batch` would yield a batch.
    fn has_next(&mut self) -> bool;

    /// Pulls the next batch.
    ///
    /// # Errors
    /// `BenchErr::SourceExhausted` if there is nothing left, or whatever the underlying
    /// storage failed with.
    fn next_batch(&mut self) -> Result<Batch>;

    /// Rewinds to the first batch.
    fn reset(&mut self) -> Result<()>;
}

impl<S: BatchSource + ?Sized> BatchSource for Box<S> {
    fn has_next(&mut self) -> bool {
        (**self).has_next()
    }

    fn next_batch(&mut self) -> Result<Batch> {
        (**self).next_batch()
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }
}

/// An in-memory batch source over pre-built batches.
#[derive(Debug, Clone)]
pub struct VecSource {
    batches: Vec<Batch>,
    cursor: usize,
}

impl VecSource {
    /// Creates a new `VecSource`.
    ///
    /// # Arguments
    /// * `batches` - The batches to yield, in order.
    ///
    /// # Returns
    /// A new `VecSource` positioned at its first batch.
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches, cursor: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl BatchSource for VecSource {
    fn has_next(&mut self) -> bool {
        self.cursor < self.batches.len()
    }

    fn next_batch(&mut self) -> Result<Batch> {
        let batch = self
            .batches
            .get(self.cursor)
            .cloned()
            .ok_or(BenchErr::SourceExhausted)?;

        self.cursor += 1;
        Ok(batch)
    }

    fn reset(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}
