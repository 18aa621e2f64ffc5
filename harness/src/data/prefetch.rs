use std::thread::{self, JoinHandle};

use log::debug;
use tokio::sync::mpsc;

use super::BatchSource;
use crate::{BenchErr, Result, model::Batch};

type Loaded = Result<Batch>;

/// Wraps a batch source and loads the upcoming batches on a background thread.
///
/// At most `depth` batches are buffered ahead of the consumer. `reset` stops the loader,
/// rewinds the wrapped source and starts a new loader.
pub struct PrefetchSource<S: BatchSource + 'static> {
    depth: usize,
    peeked: Option<Loaded>,
    rx: Option<mpsc::Receiver<Loaded>>,
    loader: Option<JoinHandle<S>>,
}

impl<S: BatchSource + 'static> PrefetchSource<S> {
    /// Creates a new `PrefetchSource` and starts loading right away.
    ///
    /// # Arguments
    /// * `source` - The source to load from.
    /// * `depth` - How many batches may be buffered ahead, at least one.
    ///
    /// # Returns
    /// A new `PrefetchSource` or an io error if the loader thread could not be spawned.
    pub fn new(source: S, depth: usize) -> Result<Self> {
        let depth = depth.max(1);
        let (rx, loader) = spawn_loader(source, depth)?;

        Ok(Self {
            depth,
            peeked: None,
            rx: Some(rx),
            loader: Some(loader),
        })
    }

    /// Stops the loader and returns the wrapped source, positioned wherever the loader left it.
    pub fn into_inner(mut self) -> Result<S> {
        self.stop()
    }

    fn stop(&mut self) -> Result<S> {
        self.peeked = None;
        // Dropping the receiver makes the loader's pending send fail, which ends its loop.
        self.rx = None;

        self.loader
            .take()
            .ok_or(BenchErr::LoaderPanicked)?
            .join()
            .map_err(|_| BenchErr::LoaderPanicked)
    }
}

impl<S: BatchSource + 'static> BatchSource for PrefetchSource<S> {
    fn has_next(&mut self) -> bool {
        if self.peeked.is_none() {
            self.peeked = self.rx.as_mut().and_then(|rx| rx.blocking_recv());
        }

        self.peeked.is_some()
    }

    fn next_batch(&mut self) -> Result<Batch> {
        if !self.has_next() {
            return Err(BenchErr::SourceExhausted);
        }

        self.peeked.take().ok_or(BenchErr::SourceExhausted)?
    }

    fn reset(&mut self) -> Result<()> {
        let mut source = self.stop()?;
        source.reset()?;

        let (rx, loader) = spawn_loader(source, self.depth)?;
        self.rx = Some(rx);
        self.loader = Some(loader);
        debug!(depth = self.depth; "prefetch loader restarted");
        Ok(())
    }
}

fn spawn_loader<S: BatchSource + 'static>(
    mut source: S,
    depth: usize,
) -> Result<(mpsc::Receiver<Loaded>, JoinHandle<S>)> {
    let (tx, rx) = mpsc::channel(depth);

    let loader = thread::Builder::new()
        .name("batch-prefetch".into())
        .spawn(move || {
            while source.has_next() {
                let batch = source.next_batch();
                let failed = batch.is_err();

                if tx.blocking_send(batch).is_err() || failed {
                    break;
                }
            }

            source
        })?;

    Ok((rx, loader))
}
