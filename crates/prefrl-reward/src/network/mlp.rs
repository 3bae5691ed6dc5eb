use rand::Rng;

use super::{BoxedRewardNetwork, NetworkSpec, RewardNetwork, init, pool};

const LEAKY_SLOPE: f32 = 0.01;

/// Pooled features followed by one leaky-ReLU hidden layer.
///
/// Parameter layout: `[W1 (hidden x bins, row-major), b1 (hidden), w2 (hidden), b2]`.
#[derive(Debug, Clone)]
pub struct PooledMlp {
    bins: usize,
    hidden: usize,
    params: Vec<f32>,
}

/// Views into the flat parameter (or gradient) vector.
struct Layers<'a> {
    w1: &'a [f32],
    b1: &'a [f32],
    w2: &'a [f32],
    b2: f32,
}

impl PooledMlp {
    pub fn new<R>(bins: usize, hidden: usize, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut params = init::he_normal(rng, bins, hidden * bins);
        params.extend(init::from_fn(|_| 0.0, hidden));
        params.extend(init::he_normal(rng, hidden, hidden));
        params.push(0.0);
        Self {
            bins,
            hidden,
            params,
        }
    }

    fn layers(&self) -> Layers<'_> {
        let (w1, rest) = self.params.split_at(self.hidden * self.bins);
        let (b1, rest) = rest.split_at(self.hidden);
        let (w2, b2) = rest.split_at(self.hidden);
        Layers { w1, b1, w2, b2: b2[0] }
    }

    /// Returns the pooled input and the hidden pre-activations.
    fn hidden_layer(&self, obs: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let mut x = vec![0.0; self.bins];
        pool(obs, &mut x);
        let Layers { w1, b1, .. } = self.layers();
        let z = w1
            .chunks_exact(self.bins)
            .zip(b1)
            .map(|(row, b)| row.iter().zip(&x).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();
        (x, z)
    }
}

fn leaky_relu(z: f32) -> f32 {
    if z > 0.0 { z } else { LEAKY_SLOPE * z }
}

fn leaky_relu_grad(z: f32) -> f32 {
    if z > 0.0 { 1.0 } else { LEAKY_SLOPE }
}

impl RewardNetwork for PooledMlp {
    fn spec(&self) -> NetworkSpec {
        NetworkSpec::PooledMlp {
            bins: self.bins,
            hidden: self.hidden,
        }
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    fn forward(&self, obs: &[f32]) -> f32 {
        let (_, z) = self.hidden_layer(obs);
        let Layers { w2, b2, .. } = self.layers();
        z.iter().zip(w2).map(|(z, w)| leaky_relu(*z) * w).sum::<f32>() + b2
    }

    fn backward(&self, obs: &[f32], grad_out: f32, grads: &mut [f32]) {
        let (x, z) = self.hidden_layer(obs);
        let w2 = self.layers().w2;

        let (gw1, rest) = grads.split_at_mut(self.hidden * self.bins);
        let (gb1, rest) = rest.split_at_mut(self.hidden);
        let (gw2, gb2) = rest.split_at_mut(self.hidden);

        gb2[0] += grad_out;
        for (h, (row, z)) in gw1.chunks_exact_mut(self.bins).zip(&z).enumerate() {
            gw2[h] += grad_out * leaky_relu(*z);
            let dz = grad_out * w2[h] * leaky_relu_grad(*z);
            gb1[h] += dz;
            for (g, x) in row.iter_mut().zip(&x) {
                *g += dz * x;
            }
        }
    }

    fn clone_boxed(&self) -> BoxedRewardNetwork {
        Box::new(self.clone())
    }
}
