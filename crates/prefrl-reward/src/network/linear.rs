use rand::Rng;

use super::{BoxedRewardNetwork, NetworkSpec, RewardNetwork, init, pool};

const INIT_SCALE: f32 = 0.01;

/// `r(o) = w · pool(o) + b`
///
/// Parameter layout: `[w (bins), b]`.
#[derive(Debug, Clone)]
pub struct PooledLinear {
    bins: usize,
    params: Vec<f32>,
}

impl PooledLinear {
    pub fn new<R>(bins: usize, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut params = init::uniform(rng, INIT_SCALE, bins);
        params.push(0.0);
        Self { bins, params }
    }
}

impl RewardNetwork for PooledLinear {
    fn spec(&self) -> NetworkSpec {
        NetworkSpec::PooledLinear { bins: self.bins }
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    fn forward(&self, obs: &[f32]) -> f32 {
        let mut features = vec![0.0; self.bins];
        pool(obs, &mut features);
        let (w, b) = self.params.split_at(self.bins);
        w.iter().zip(&features).map(|(w, x)| w * x).sum::<f32>() + b[0]
    }

    fn backward(&self, obs: &[f32], grad_out: f32, grads: &mut [f32]) {
        let mut features = vec![0.0; self.bins];
        pool(obs, &mut features);
        let (gw, gb) = grads.split_at_mut(self.bins);
        for (g, x) in gw.iter_mut().zip(&features) {
            *g += grad_out * x;
        }
        gb[0] += grad_out;
    }

    fn clone_boxed(&self) -> BoxedRewardNetwork {
        Box::new(self.clone())
    }
}
