use std::{
    fs,
    path::{Path, PathBuf},
};

use harness::{Batch, BatchSource, BenchErr};
use log::debug;
use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

const FEATURES: &str = "features";
const LABELS: &str = "labels";
const EXTENSION: &str = "safetensors";

/// Reads pre-serialized mini-batches from a directory, one file per batch.
///
/// Files are named `<prefix>-<index>.safetensors` and hold an `f32` tensor named `features`
/// and another named `labels`. Batches are yielded in index order and read lazily.
pub struct MiniBatchDirSource {
    files: Vec<PathBuf>,
    cursor: usize,
}

impl MiniBatchDirSource {
    /// Lists the mini-batches in `dir`.
    ///
    /// # Errors
    /// * `BenchErr::DatasetMissing` if `dir` isn't a directory.
    /// * `BenchErr::DatasetCorrupt` if it holds no `<prefix>-<index>.safetensors` file.
    pub fn open(dir: impl AsRef<Path>, prefix: &str) -> harness::Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(BenchErr::DatasetMissing {
                path: dir.to_path_buf(),
            });
        }

        let mut indexed = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(index) = batch_index(&path, prefix) {
                indexed.push((index, path));
            }
        }

        if indexed.is_empty() {
            return Err(BenchErr::DatasetCorrupt {
                path: dir.to_path_buf(),
                msg: format!("no {prefix}-<index>.{EXTENSION} files found"),
            });
        }

        indexed.sort_unstable_by_key(|(index, _)| *index);
        debug!(batches = indexed.len(); "found mini-batches in {}", dir.display());

        Ok(Self {
            files: indexed.into_iter().map(|(_, path)| path).collect(),
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl BatchSource for MiniBatchDirSource {
    fn has_next(&mut self) -> bool {
        self.cursor < self.files.len()
    }

    fn next_batch(&mut self) -> harness::Result<Batch> {
        let path = self.files.get(self.cursor).ok_or(BenchErr::SourceExhausted)?;
        let batch = read_batch(path)?;

        self.cursor += 1;
        Ok(batch)
    }

    fn reset(&mut self) -> harness::Result<()> {
        self.cursor = 0;
        Ok(())
    }
}

/// Writes `batch` into `dir` as `<prefix>-<index>.safetensors`.
///
/// # Returns
/// The path of the written file.
pub fn save_batch(
    dir: impl AsRef<Path>,
    prefix: &str,
    index: usize,
    batch: &Batch,
) -> harness::Result<PathBuf> {
    let path = dir.as_ref().join(format!("{prefix}-{index}.{EXTENSION}"));
    let corrupt = |msg: String| BenchErr::DatasetCorrupt {
        path: path.clone(),
        msg,
    };

    let features = standard_bytes(&batch.features);
    let labels = standard_bytes(&batch.labels);

    let views = [
        (FEATURES, view(&batch.features, &features).map_err(corrupt)?),
        (LABELS, view(&batch.labels, &labels).map_err(corrupt)?),
    ];
    let bytes = safetensors::serialize(views, &None).map_err(|e| corrupt(e.to_string()))?;

    fs::write(&path, bytes)?;
    Ok(path)
}

/// The index of a `<prefix>-<index>.safetensors` file.
fn batch_index(path: &Path, prefix: &str) -> Option<usize> {
    if path.extension()? != EXTENSION {
        return None;
    }

    path.file_stem()?
        .to_str()?
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

fn read_batch(path: &Path) -> harness::Result<Batch> {
    let corrupt = |msg: String| BenchErr::DatasetCorrupt {
        path: path.to_path_buf(),
        msg,
    };

    let bytes = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes).map_err(|e| corrupt(e.to_string()))?;

    let features = read_tensor(&tensors, FEATURES).map_err(corrupt)?;
    let labels = read_tensor(&tensors, LABELS).map_err(corrupt)?;

    if features.shape().first() != labels.shape().first() {
        return Err(corrupt(format!(
            "{} feature rows and {} label rows",
            features.shape().first().copied().unwrap_or(0),
            labels.shape().first().copied().unwrap_or(0)
        )));
    }

    Ok(Batch::new(features, labels))
}

fn read_tensor(tensors: &SafeTensors<'_>, name: &str) -> Result<ArrayD<f32>, String> {
    let tensor = tensors.tensor(name).map_err(|e| format!("{name}: {e}"))?;
    if tensor.dtype() != Dtype::F32 {
        return Err(format!("{name} is {:?}, expected F32", tensor.dtype()));
    }

    // The tensor data isn't guaranteed to be aligned for f32.
    let data: Vec<f32> = tensor
        .data()
        .chunks_exact(size_of::<f32>())
        .map(bytemuck::pod_read_unaligned)
        .collect();

    ArrayD::from_shape_vec(IxDyn(tensor.shape()), data).map_err(|e| format!("{name}: {e}"))
}

fn standard_bytes(a: &ArrayD<f32>) -> Vec<u8> {
    let data: Vec<f32> = a.iter().copied().collect();
    bytemuck::cast_slice(data.as_slice()).to_vec()
}

fn view<'a>(a: &ArrayD<f32>, bytes: &'a [u8]) -> Result<TensorView<'a>, String> {
    TensorView::new(Dtype::F32, a.shape().to_vec(), bytes).map_err(|e| e.to_string())
}
