use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tokio::sync::Barrier;

use crate::{
    error::{ModelErr, ModelResult},
    model::Model,
};

/// One slice of the parameter vector: the running sum of contributions and the last mean.
#[derive(Debug)]
struct AveragingShard {
    sum: Mutex<Box<[f32]>>,
    mean: RwLock<Box<[f32]>>,
}

impl AveragingShard {
    fn new(len: usize) -> Self {
        Self {
            sum: Mutex::new(vec![0.; len].into_boxed_slice()),
            mean: RwLock::new(vec![0.; len].into_boxed_slice()),
        }
    }

    fn accumulate(&self, params: &[f32]) {
        self.sum
            .lock()
            .iter_mut()
            .zip(params)
            .for_each(|(acc, p)| *acc += p);
    }

    /// Stores `sum / contributors` as the new mean and clears the sum.
    fn average(&self, contributors: usize) {
        let mut sum = self.sum.lock();
        let mut mean = self.mean.write();
        let n = contributors as f32;

        mean.iter_mut()
            .zip(sum.iter())
            .for_each(|(m, s)| *m = s / n);

        sum.fill(0.);
    }

    fn pull(&self, out: &mut [f32]) {
        out.copy_from_slice(&self.mean.read());
    }
}

/// Averages the parameters of every replica at a barrier.
///
/// Each worker contributes its parameters, the barrier leader computes the mean once all of
/// them arrived, and every worker pulls the mean after a second barrier. Nobody proceeds
/// before the mean of a consistent snapshot is in place.
#[derive(Debug)]
pub struct ParamAverager {
    nparams: usize,
    shard_size: NonZeroUsize,
    shards: Box<[AveragingShard]>,
    contributors: AtomicUsize,
    has_mean: AtomicBool,
    barrier: Barrier,
}

impl ParamAverager {
    /// Creates a new `ParamAverager`.
    ///
    /// # Arguments
    /// * `nparams` - The length of every replica's parameter vector.
    /// * `shard_size` - The maximum amount of parameters per shard.
    /// * `workers` - The amount of workers taking part in every sync.
    ///
    /// # Returns
    /// A new `ParamAverager` instance.
    pub fn new(nparams: usize, shard_size: NonZeroUsize, workers: usize) -> Self {
        let shard_size_ = shard_size.get();
        let shards = (0..nparams)
            .step_by(shard_size_)
            .map(|start| AveragingShard::new(shard_size_.min(nparams - start)))
            .collect();

        Self {
            nparams,
            shard_size,
            shards,
            contributors: AtomicUsize::new(0),
            has_mean: AtomicBool::new(false),
            barrier: Barrier::new(workers),
        }
    }

    /// Takes part in one sync.
    ///
    /// # Arguments
    /// * `replica` - The worker's replica, `None` if the worker lost it.
    /// * `contribute` - Whether the replica's parameters go into the mean.
    ///
    /// # Returns
    /// A size mismatch if the replica's parameters don't match this averager.
    pub async fn sync(
        &self,
        replica: Option<&mut Box<dyn Model>>,
        contribute: bool,
    ) -> ModelResult<()> {
        let mut result = Ok(());

        if let Some(model) = replica.as_deref().filter(|_| contribute) {
            result = self.accumulate(&model.params());
        }

        if self.barrier.wait().await.is_leader() {
            self.average();
        }

        self.barrier.wait().await;
        result?;

        let Some(model) = replica else {
            return Ok(());
        };

        let mut mean = vec![0.; self.nparams];
        if self.pull(&mut mean) {
            model.set_params(&mean)?;
        }

        Ok(())
    }

    fn accumulate(&self, params: &[f32]) -> ModelResult<()> {
        if params.len() != self.nparams {
            return Err(ModelErr::SizeMismatch {
                what: "averaged parameters",
                got: params.len(),
                expected: self.nparams,
            });
        }

        self.shards
            .par_iter()
            .zip(params.par_chunks(self.shard_size.get()))
            .for_each(|(shard, chunk)| shard.accumulate(chunk));

        self.contributors.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn average(&self) {
        let contributors = self.contributors.swap(0, Ordering::AcqRel);
        self.has_mean.store(contributors > 0, Ordering::Release);

        if contributors == 0 {
            return;
        }

        self.shards
            .par_iter()
            .for_each(|shard| shard.average(contributors));
    }

    /// Copies the last mean into `out`.
    ///
    /// # Returns
    /// `false` if the last sync had no contributors, leaving `out` untouched.
    fn pull(&self, out: &mut [f32]) -> bool {
        if !self.has_mean.load(Ordering::Acquire) {
            return false;
        }

        self.shards
            .par_iter()
            .zip(out.par_chunks_mut(self.shard_size.get()))
            .for_each(|(shard, chunk)| shard.pull(chunk));

        true
    }
}
