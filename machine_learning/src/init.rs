use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal, Uniform};

use crate::{MlErr, Result, arch::Sequential};

/// How a layer's weights are initialized. Biases always start at zero.
#[derive(Debug, Clone, Copy)]
pub enum ParamGen {
    Const { value: f32 },
    /// Uniform in `[-sqrt(6 / (fan_in + fan_out)), +sqrt(6 / (fan_in + fan_out))]`.
    XavierUniform,
    /// Normal with a standard deviation of `sqrt(2 / (fan_in + fan_out))`.
    Xavier,
}

impl ParamGen {
    /// Fills `weights` for a layer with `fan_in` inputs and `fan_out` outputs.
    pub fn fill<R: Rng>(
        &self,
        weights: &mut [f32],
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> Result<()> {
        let fan = (fan_in + fan_out).max(1) as f32;

        match *self {
            ParamGen::Const { value } => weights.fill(value),
            ParamGen::XavierUniform => {
                let limit = (6. / fan).sqrt();
                let dist = Uniform::new_inclusive(-limit, limit)
                    .map_err(|e| MlErr::Distribution(e.to_string()))?;
                sample_into(weights, &dist, rng);
            }
            ParamGen::Xavier => {
                let dist = Normal::new(0., (2. / fan).sqrt())
                    .map_err(|e| MlErr::Distribution(e.to_string()))?;
                sample_into(weights, &dist, rng);
            }
        }

        Ok(())
    }
}

fn sample_into<D: Distribution<f32>, R: Rng>(out: &mut [f32], dist: &D, rng: &mut R) {
    out.iter_mut().for_each(|w| *w = dist.sample(rng));
}

/// Builds the initial parameters of `model`, seeded so that equal seeds give equal parameters.
pub fn init_params(model: &Sequential, param_gen: ParamGen, seed: u64) -> Result<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut params = vec![0.; model.size()];
    let mut rest = params.as_mut_slice();

    for layer in model.layers() {
        let (layer_params, tail) = std::mem::take(&mut rest).split_at_mut(layer.size());
        rest = tail;

        let (fan_in, fan_out) = layer.dim();
        param_gen.fill(&mut layer_params[..fan_in * fan_out], fan_in, fan_out, &mut rng)?;
    }

    Ok(params)
}
