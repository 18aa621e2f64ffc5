#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use harness::{
    BatchSource, DataShape, DatasetKind, DatasetLoader, DeviceDescriptor, DeviceInventory,
    ManualClock, Model, ModelErr, ModelResult, Result, VecSource,
    model::Batch,
};
use ndarray::{ArrayD, ArrayViewD, IxDyn};

/// Marks a batch the mock model fails on.
pub const POISON: f32 = -1.0;

/// A model that takes a fixed amount of (manual) time per operation.
#[derive(Clone)]
pub struct MockModel {
    pub clock: Option<Arc<ManualClock>>,
    pub step_time: Duration,
    pub forward_time: Duration,
    pub backward_time: Duration,
    pub params: Vec<f32>,
    pub input: Option<ArrayD<f32>>,
    pub aux_input: Option<ArrayD<f32>>,
    pub steps: u64,
}

impl MockModel {
    pub fn new(nparams: usize) -> Self {
        Self {
            clock: None,
            step_time: Duration::ZERO,
            forward_time: Duration::ZERO,
            backward_time: Duration::ZERO,
            params: vec![0.; nparams],
            input: None,
            aux_input: None,
            steps: 0,
        }
    }

    pub fn timed(clock: Arc<ManualClock>, step_time: Duration) -> Self {
        Self {
            clock: Some(clock),
            step_time,
            ..Self::new(4)
        }
    }

    /// Reports a second, differently sized input after every step.
    pub fn with_aux_input(mut self, aux: ArrayD<f32>) -> Self {
        self.aux_input = Some(aux);
        self
    }

    fn advance(&self, by: Duration) {
        if let Some(clock) = &self.clock {
            clock.advance(by);
        }
    }
}

impl Model for MockModel {
    fn train_step(&mut self, batch: &Batch) -> ModelResult<f32> {
        if batch.features.iter().next() == Some(&POISON) {
            return Err(ModelErr::Failure("out of device memory".into()));
        }

        self.steps += 1;
        self.advance(self.step_time);
        self.input = Some(batch.features.clone());
        self.params.iter_mut().for_each(|p| *p += 1.);
        Ok(0.5)
    }

    fn forward(&mut self, input: ArrayViewD<'_, f32>) -> ModelResult<ArrayD<f32>> {
        self.advance(self.forward_time);
        Ok(input.to_owned())
    }

    fn backward(
        &mut self,
        _input: ArrayViewD<'_, f32>,
        _labels: ArrayViewD<'_, f32>,
    ) -> ModelResult<Vec<f32>> {
        self.advance(self.backward_time);
        Ok(vec![0.; self.params.len()])
    }

    fn param_count(&self) -> usize {
        self.params.len()
    }

    fn layer_count(&self) -> usize {
        2
    }

    fn summary(&self) -> String {
        format!("MockModel with {} parameters", self.params.len())
    }

    fn current_inputs(&self) -> Vec<ArrayViewD<'_, f32>> {
        self.input
            .iter()
            .chain(self.aux_input.iter())
            .map(|a| a.view())
            .collect()
    }

    fn params(&self) -> Vec<f32> {
        self.params.clone()
    }

    fn set_params(&mut self, params: &[f32]) -> ModelResult<()> {
        if params.len() != self.params.len() {
            return Err(ModelErr::SizeMismatch {
                what: "mock parameters",
                got: params.len(),
                expected: self.params.len(),
            });
        }

        self.params.copy_from_slice(params);
        Ok(())
    }

    fn replicate(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

pub fn batch(batch_size: usize, value: f32) -> Batch {
    Batch::new(
        ArrayD::from_elem(IxDyn(&[batch_size, 1, 2, 2]), value),
        ArrayD::zeros(IxDyn(&[batch_size, 10])),
    )
}

pub fn source(batches: usize, batch_size: usize) -> VecSource {
    VecSource::new((0..batches).map(|i| batch(batch_size, i as f32)).collect())
}

pub fn inventory(devices: usize) -> DeviceInventory {
    DeviceInventory {
        backend: "CPU".into(),
        cpu_cores: 4,
        blas_vendor: "matrixmultiply".into(),
        os: "TestOS".into(),
        devices: (0..devices)
            .map(|i| DeviceDescriptor::new(i, format!("host:{i}")))
            .collect(),
    }
}

/// A dataset loader counting how many times it was opened.
pub struct CountingLoader {
    pub kind: DatasetKind,
    pub batches: usize,
    pub batch_size: usize,
    pub loads: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn new(kind: DatasetKind, batches: usize, batch_size: usize) -> Self {
        Self {
            kind,
            batches,
            batch_size,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DatasetLoader for CountingLoader {
    fn kind(&self) -> DatasetKind {
        self.kind
    }

    fn shape(&self) -> DataShape {
        DataShape {
            batch_size: self.batch_size,
            example: vec![1, 2, 2],
            labels: 10,
        }
    }

    fn load(&mut self) -> Result<Box<dyn BatchSource>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(source(self.batches, self.batch_size)))
    }
}

/// Runs `f` on its own thread and fails the test if it doesn't finish within `deadline`.
pub fn within<T, F>(deadline: Duration, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });

    rx.recv_timeout(deadline)
        .expect("the run did not finish in time")
}
